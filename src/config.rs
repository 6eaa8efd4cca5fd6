//! # Engine configuration.
//!
//! Provides [`Config`], the small set of knobs shared by callback subscribers
//! and the ticker registry.
//!
//! Config is used in two ways:
//! 1. **Subscriber creation**: `Subscriber::with_config(&config, on_next)`
//! 2. **Ticker registry**: `TickerRegistry::new(config)`
//!
//! ## Sentinel values
//! - `request_batch = 0` → treated as `1` (a subscriber must ask for something)
//! - `tick_period = 0s` → clamped to 1ms (an interval cannot be zero)

use std::time::Duration;

/// Minimum period accepted by the ticker registry.
pub(crate) const MIN_TICK: Duration = Duration::from_millis(1);

/// Configuration for subscribers and tickers.
///
/// ## Field semantics
/// - `request_batch`: credits requested by a callback subscriber on attach and
///   after every `request_batch` delivered items (`1` = strict pull-one)
/// - `tick_period`: period of [`TickerRegistry::default_ticker`](crate::TickerRegistry::default_ticker)
///
/// ## Notes
/// All fields are public. Prefer the clamped accessors over reading the fields
/// directly so sentinel checks stay in one place.
#[derive(Clone, Debug)]
pub struct Config {
    /// Auto-pull batch size for [`Subscriber`](crate::Subscriber).
    pub request_batch: u64,

    /// Default ticker period.
    pub tick_period: Duration,
}

impl Config {
    /// Returns the request batch clamped to a minimum of 1.
    #[inline]
    pub fn request_batch_clamped(&self) -> u64 {
        self.request_batch.max(1)
    }

    /// Returns the tick period clamped to a minimum of 1ms.
    #[inline]
    pub fn tick_period_clamped(&self) -> Duration {
        self.tick_period.max(MIN_TICK)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `request_batch = 1` (request one, then one more per delivered item)
    /// - `tick_period = 1s` (wall-clock displays)
    fn default() -> Self {
        Self {
            request_batch: 1,
            tick_period: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pull_one() {
        let cfg = Config::default();
        assert_eq!(cfg.request_batch_clamped(), 1);
        assert_eq!(cfg.tick_period_clamped(), Duration::from_secs(1));
    }

    #[test]
    fn test_sentinels_are_clamped() {
        let cfg = Config {
            request_batch: 0,
            tick_period: Duration::ZERO,
        };
        assert_eq!(cfg.request_batch_clamped(), 1);
        assert_eq!(cfg.tick_period_clamped(), Duration::from_millis(1));
    }
}
