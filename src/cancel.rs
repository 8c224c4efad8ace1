//! Cooperative cancellation for a tagging batch.

use crate::error::{GeotagError, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// A cloneable cancellation flag. All clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *lock(flag) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *lock(&self.inner.0)
    }

    /// Fail with `Cancelled` if the signal has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(GeotagError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Block for `duration`, waking early (with `Cancelled`) if cancelled.
    pub fn wait(&self, duration: Duration) -> Result<()> {
        let (flag, cvar) = &*self.inner;
        let guard = lock(flag);
        let (guard, _) = cvar
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
        if *guard {
            Err(GeotagError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn lock(m: &Mutex<bool>) -> MutexGuard<'_, bool> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
