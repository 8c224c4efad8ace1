//! Degrees/minutes/seconds → signed decimal degrees.
//!
//! GPS metadata stores each axis as three rationals (degrees, minutes,
//! seconds) plus a single-letter hemisphere reference.

use crate::error::{GeotagError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An unsigned EXIF-style rational. Serialized as a `[num, denom]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Rational {
    pub num: u32,
    pub denom: u32,
}

impl Rational {
    pub fn new(num: u32, denom: u32) -> Self {
        Self { num, denom }
    }

    pub fn to_f64(self) -> Result<f64> {
        if self.denom == 0 {
            return Err(GeotagError::MalformedRational(format!(
                "zero denominator in {}/{}",
                self.num, self.denom
            )));
        }
        Ok(self.num as f64 / self.denom as f64)
    }
}

impl From<(u32, u32)> for Rational {
    fn from((num, denom): (u32, u32)) -> Self {
        Self { num, denom }
    }
}

impl From<Rational> for (u32, u32) {
    fn from(r: Rational) -> Self {
        (r.num, r.denom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hemisphere {
    N,
    S,
    E,
    W,
}

impl Hemisphere {
    /// South and west are negative.
    pub fn sign(self) -> f64 {
        match self {
            Self::N | Self::E => 1.0,
            Self::S | Self::W => -1.0,
        }
    }
}

impl FromStr for Hemisphere {
    type Err = GeotagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "N" => Ok(Self::N),
            "S" => Ok(Self::S),
            "E" => Ok(Self::E),
            "W" => Ok(Self::W),
            other => Err(GeotagError::MalformedRational(format!(
                "unknown hemisphere reference '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Self::N => 'N',
            Self::S => 'S',
            Self::E => 'E',
            Self::W => 'W',
        };
        write!(f, "{}", c)
    }
}

const DMS_DIVISORS: [f64; 3] = [1.0, 60.0, 3600.0];

/// Convert a degrees/minutes/seconds triple to decimal degrees.
///
/// Extra trailing rationals beyond the third are ignored.
pub fn to_decimal_degrees(triple: &[Rational], hemisphere: Hemisphere) -> Result<f64> {
    if triple.len() < 3 {
        return Err(GeotagError::MalformedRational(format!(
            "expected 3 rationals, got {}",
            triple.len()
        )));
    }

    let mut value = 0.0;
    for (r, divisor) in triple.iter().zip(DMS_DIVISORS) {
        value += r.to_f64()? / divisor;
    }

    Ok(value * hemisphere.sign())
}
