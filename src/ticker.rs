//! # Time tickers: shared wall-clock publishers keyed by period.
//!
//! [`TickerRegistry`] hands out one [`Publisher<SystemTime>`] per period. The
//! interval task behind a ticker runs only while the ticker has subscribers:
//!
//! ```text
//! ticker(period) ──► cached Publisher (same period → same publisher)
//!
//! 0 → 1 subscribers ──► spawn interval task (child of the registry token)
//!                          loop { tick ──► submit(SystemTime::now()) }
//! 1 → 0 subscribers ──► cancel child token ──► task exits
//!
//! shutdown() ──► cancel registry token ──► complete every ticker
//! ```
//!
//! The registry is an ordinary value owned by the caller; dropping it stops
//! every running interval task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, MIN_TICK};
use crate::core::guard::lock;
use crate::core::lifecycle::Lifecycle;
use crate::core::{Publisher, WeakPublisher};

struct TickerNode {
    period: Duration,
    root: CancellationToken,
    output: WeakPublisher<SystemTime>,
    running: Mutex<Option<CancellationToken>>,
}

impl Lifecycle for TickerNode {
    fn after_subscribe(self: Arc<Self>) {
        if self.root.is_cancelled() {
            return;
        }
        let token = self.root.child_token();
        if let Some(previous) = lock(&self.running).replace(token.clone()) {
            previous.cancel();
        }

        let (period, output) = (self.period, self.output.clone());
        tracing::debug!(?period, "ticker started");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if output.submit(SystemTime::now()).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(?period, "ticker stopped");
        });
    }

    fn after_unsubscribe(self: Arc<Self>) {
        if let Some(token) = lock(&self.running).take() {
            token.cancel();
        }
    }
}

/// Caller-owned registry of periodic time publishers.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use livepub::{Config, TickerRegistry};
///
/// # #[tokio::main]
/// # async fn main() {
/// let clocks = TickerRegistry::new(Config::default());
/// let every_second = clocks.ticker(Duration::from_secs(1));
/// assert!(every_second.ptr_eq(&clocks.default_ticker()));
///
/// let sub = every_second.subscribe(|now| println!("{now:?}"));
/// sub.unsubscribe();
/// clocks.shutdown();
/// # }
/// ```
pub struct TickerRegistry {
    cfg: Config,
    root: CancellationToken,
    tickers: Mutex<HashMap<Duration, Publisher<SystemTime>>>,
}

impl TickerRegistry {
    /// Creates an empty registry.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            root: CancellationToken::new(),
            tickers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the shared ticker for `period` (clamped to at least 1ms).
    ///
    /// After [`shutdown`](Self::shutdown) this returns a completed publisher.
    pub fn ticker(&self, period: Duration) -> Publisher<SystemTime> {
        let period = period.max(MIN_TICK);
        if self.root.is_cancelled() {
            return Publisher::completed();
        }
        let mut tickers = lock(&self.tickers);
        tickers
            .entry(period)
            .or_insert_with(|| {
                let root = self.root.clone();
                Publisher::with_hooks(|output| {
                    Arc::new(TickerNode {
                        period,
                        root,
                        output,
                        running: Mutex::new(None),
                    })
                })
            })
            .clone()
    }

    /// Ticker with [`Config::tick_period`].
    pub fn default_ticker(&self) -> Publisher<SystemTime> {
        self.ticker(self.cfg.tick_period_clamped())
    }

    /// Stops every interval task and completes every ticker. Idempotent.
    pub fn shutdown(&self) {
        self.root.cancel();
        let tickers: Vec<_> = lock(&self.tickers).drain().map(|(_, t)| t).collect();
        tracing::debug!(tickers = tickers.len(), "ticker registry shut down");
        for ticker in tickers {
            ticker.complete();
        }
    }
}

impl Drop for TickerRegistry {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorder, settle};

    const FAST: Duration = Duration::from_millis(10);

    #[tokio::test(flavor = "multi_thread")]
    async fn test_same_period_shares_publisher() {
        let reg = TickerRegistry::new(Config::default());
        assert!(reg.ticker(FAST).ptr_eq(&reg.ticker(FAST)));
        assert!(!reg.ticker(FAST).ptr_eq(&reg.ticker(FAST * 2)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_default_ticker_uses_config_period() {
        let reg = TickerRegistry::new(Config {
            tick_period: FAST,
            ..Config::default()
        });
        assert!(reg.default_ticker().ptr_eq(&reg.ticker(FAST)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ticks_while_subscribed() {
        let reg = TickerRegistry::new(Config::default());
        let rec = Recorder::new();
        let _s = rec.record(&reg.ticker(FAST));
        rec.wait_len(3).await;

        let ticks = rec.values();
        assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stops_without_subscribers_and_restarts() {
        let reg = TickerRegistry::new(Config::default());
        let ticker = reg.ticker(FAST);
        let rec = Recorder::new();
        let s = rec.record(&ticker);
        rec.wait_len(2).await;
        s.cancel();

        settle().await;
        let frozen = ticker.latest();
        settle().await;
        assert_eq!(ticker.latest(), frozen);

        let again = Recorder::new();
        let _s2 = again.record(&ticker);
        again.wait_len(3).await;
        assert_ne!(ticker.latest(), frozen);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_completes_tickers() {
        let reg = TickerRegistry::new(Config::default());
        let rec = Recorder::new();
        let _s = rec.record(&reg.ticker(FAST));
        rec.wait_len(1).await;

        reg.shutdown();
        rec.wait_completed().await;
        assert!(reg.ticker(FAST).is_completed());
    }
}
