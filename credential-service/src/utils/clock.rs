//! Process-wide time source.
//!
//! All time comparisons go through one injectable clock so tests can pin
//! the instant instead of racing the system clock.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct Clock {
    inner: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl Clock {
    /// The real system clock.
    pub fn system() -> Self {
        Self {
            inner: Arc::new(Utc::now),
        }
    }

    /// A clock pinned to a single instant, for tests.
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(move || at),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.inner)()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_is_stable() {
        let at = Utc::now();
        let clock = Clock::fixed(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), at);
    }
}
