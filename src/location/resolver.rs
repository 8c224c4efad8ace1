//! Location resolver: cache first, then the rate-limited provider.
//!
//! Flow: quantize → cache → (bucket, back off) → provider → extract → store.

use super::cache::CoordinateCache;
use super::providers::{extract_record, Geocoder};
use super::types::{CacheKey, Coordinate, LocationRecord};
use crate::bucket::{Clock, SystemClock, TokenBucket};
use crate::cancel::CancelToken;
use crate::config::GeotagConfig;
use crate::error::{GeotagError, Result};
use tracing::{debug, info, warn};

/// Resolves coordinates for one batch. Owns the open cache handle and the
/// token bucket until `close`.
pub struct LocationResolver<P: Geocoder, C: Clock = SystemClock> {
    provider: P,
    cache: CoordinateCache,
    bucket: TokenBucket<C>,
    precision: usize,
    sensor: bool,
    offline: bool,
    cancel: CancelToken,
}

impl<P: Geocoder> LocationResolver<P, SystemClock> {
    /// Open the configured cache and pace lookups by wall-clock time.
    pub fn from_config(config: &GeotagConfig, provider: P) -> Result<Self> {
        Self::from_config_with_clock(config, provider, SystemClock)
    }
}

impl<P: Geocoder, C: Clock> LocationResolver<P, C> {
    pub fn from_config_with_clock(config: &GeotagConfig, provider: P, clock: C) -> Result<Self> {
        config.validate()?;
        let bucket = TokenBucket::with_tokens(config.burst, config.rate, config.initial_tokens, clock)?;
        let cache = CoordinateCache::open(&config.storage)?;
        Ok(Self::new(provider, cache, bucket, config.precision).with_sensor(config.sensor))
    }

    pub fn new(provider: P, cache: CoordinateCache, bucket: TokenBucket<C>, precision: usize) -> Self {
        Self {
            provider,
            cache,
            bucket,
            precision,
            sensor: true,
            offline: false,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_sensor(mut self, sensor: bool) -> Self {
        self.sensor = sensor;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set offline mode: cache misses fail instead of calling the provider.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn cache(&self) -> &CoordinateCache {
        &self.cache
    }

    pub fn bucket(&self) -> &TokenBucket<C> {
        &self.bucket
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn key_for(&self, coord: Coordinate) -> CacheKey {
        CacheKey::quantize(coord, self.precision)
    }

    /// Return the cached record for `coord`, or fetch, store and return it.
    ///
    /// A throttled request sleeps the full back-off once and then proceeds
    /// without asking the bucket again.
    pub fn resolve(&mut self, coord: Coordinate) -> Result<LocationRecord> {
        let key = self.key_for(coord);

        if let Some(record) = self.cache.get_record(&key)? {
            debug!("Cache hit for {}", key);
            return Ok(record);
        }

        if self.offline {
            return Err(GeotagError::LookupFailed(format!("{} is not cached (offline)", key)));
        }

        self.cancel.check()?;
        let wait = self.bucket.consume(1.0);
        if !wait.is_zero() {
            warn!(
                "Backing off for {:.1} seconds to be nice to {}",
                wait.as_secs_f64(),
                self.provider.name()
            );
            self.bucket.clock().sleep(wait, &self.cancel)?;
        }
        self.cancel.check()?;

        info!("Fetching geolocation for {}", key);
        let result = self.provider.get_by_position(coord.lat, coord.lng, self.sensor)?;
        let record = extract_record(&result)?;

        info!("Setting key {} to {}", key, record.display_line());
        self.cache.put_record(&key, &record)?;
        Ok(record)
    }

    /// Flush and release the cache.
    pub fn close(self) -> Result<()> {
        self.cache.close()
    }
}
