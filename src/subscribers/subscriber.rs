//! # Callback subscriber (`Subscriber`)
//!
//! [`Subscriber`] adapts a plain `Fn(T)` (plus optional completion and error
//! callbacks) into the [`Subscribe`] protocol with self-regulating pull:
//!
//! ```text
//! on_subscribe ──► request(batch)
//! on_next(v)   ──► callback(v) ──► every `batch` items: request(batch)
//! ```
//!
//! With the default batch of 1 this is "request 1, then 1 more after each
//! delivered item", the flow-control policy used by every combinator.
//!
//! A panic inside the callback is logged and the item counted as delivered, so
//! the stream keeps flowing.
//!
//! ## Example
//! ```rust
//! use livepub::{Publisher, Subscriber};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let turnout = Publisher::with_value(0.61_f64);
//! let sub = turnout.subscribe_with(
//!     Subscriber::new(|t: f64| println!("turnout {t:.1}"))
//!         .on_complete(|| println!("final"))
//!         .named("turnout-label"),
//! );
//! sub.unsubscribe();
//! # }
//! ```

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::config::Config;
use crate::core::Subscription;
use crate::core::guard::catch;
use crate::error::PubSubError;
use crate::subscribers::Subscribe;

type NextFn<T> = Box<dyn Fn(T) + Send + Sync>;
type CompleteFn = Box<dyn Fn() + Send + Sync>;
type ErrorFn = Box<dyn Fn(PubSubError) + Send + Sync>;

/// Callback-backed subscriber with auto-pull flow control.
pub struct Subscriber<T: Send + 'static> {
    name: &'static str,
    batch: u64,
    delivered: AtomicU64,
    next: NextFn<T>,
    complete: Option<CompleteFn>,
    error: Option<ErrorFn>,
    subscription: OnceLock<Subscription<T>>,
}

impl<T: Send + 'static> Subscriber<T> {
    /// Creates a subscriber that requests one item at a time.
    pub fn new<F>(on_next: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            name: "subscriber",
            batch: 1,
            delivered: AtomicU64::new(0),
            next: Box::new(on_next),
            complete: None,
            error: None,
            subscription: OnceLock::new(),
        }
    }

    /// Creates a subscriber using [`Config::request_batch`].
    pub fn with_config<F>(config: &Config, on_next: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let mut me = Self::new(on_next);
        me.batch = config.request_batch_clamped();
        me
    }

    /// Sets the completion callback.
    #[must_use]
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.complete = Some(Box::new(f));
        self
    }

    /// Sets the error callback (default: log).
    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(PubSubError) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }

    /// Sets the name reported in logs.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Cancels the underlying subscription, if attached.
    pub fn unsubscribe(&self) {
        if let Some(subscription) = self.subscription.get() {
            subscription.cancel();
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Subscribe<T> for Subscriber<T> {
    fn on_subscribe(&self, subscription: Subscription<T>) {
        let _ = self.subscription.set(subscription.clone());
        subscription.request(self.batch);
    }

    async fn on_next(&self, item: T) {
        // Caught here, not only in the delivery loop, so the re-request below
        // still runs after a panicking callback.
        if let Err(info) = catch(|| (self.next)(item)) {
            let err = PubSubError::SubscriberPanicked {
                subscriber: self.name,
                info,
            };
            tracing::warn!(label = err.as_label(), "{err}");
        }

        let delivered = self.delivered.fetch_add(1, Ordering::Relaxed) + 1;
        if delivered % self.batch == 0 {
            if let Some(subscription) = self.subscription.get() {
                subscription.request(self.batch);
            }
        }
    }

    async fn on_error(&self, error: PubSubError) {
        match &self.error {
            Some(f) => {
                if let Err(info) = catch(|| f(error)) {
                    tracing::warn!(subscriber = self.name, "error callback panicked: {info}");
                }
            }
            None => tracing::warn!(
                subscriber = self.name,
                label = error.as_label(),
                "subscriber error: {error}"
            ),
        }
    }

    async fn on_complete(&self) {
        if let Some(f) = &self.complete {
            if let Err(info) = catch(|| f()) {
                tracing::warn!(subscriber = self.name, "completion callback panicked: {info}");
            }
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
