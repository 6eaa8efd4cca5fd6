//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for observing a [`Publisher`](crate::Publisher).
//! Each subscriber is attached through its own [`Subscription`], which owns a
//! FIFO queue, a credit counter and a single in-flight delivery task.
//!
//! ## Contract
//! - `on_subscribe` is called synchronously inside `subscribe`, after the
//!   subscription is registered. Nothing is delivered until it requests credit.
//! - `on_next` consumes one credit; `on_error` and `on_complete` need none.
//! - Callbacks for one subscription never run concurrently and always observe
//!   values in submission order.
//! - Implementations may be slow; they do **not** block the publisher nor other
//!   subscribers. A panic is caught, logged and delivery continues.
//!
//! ## Example (skeleton)
//! ```rust
//! use livepub::{PubSubError, Subscribe, Subscription};
//!
//! struct Seats;
//!
//! #[async_trait::async_trait]
//! impl Subscribe<u32> for Seats {
//!     fn on_subscribe(&self, subscription: Subscription<u32>) {
//!         subscription.request(16);
//!     }
//!     async fn on_next(&self, seats: u32) {
//!         let _ = seats; // repaint...
//!     }
//!     fn name(&self) -> &'static str { "seats" }
//! }
//! ```

use async_trait::async_trait;

use crate::core::Subscription;
use crate::error::PubSubError;

/// Contract for value subscribers.
///
/// Called from a subscription-dedicated delivery task. Implementations should
/// avoid blocking the async runtime for long periods.
#[async_trait]
pub trait Subscribe<T: Send + 'static>: Send + Sync + 'static {
    /// Called once when the subscription is created.
    ///
    /// The default requests a single item. Keep a clone of the subscription and
    /// request more from `on_next`, or delivery stops after the first item.
    fn on_subscribe(&self, subscription: Subscription<T>) {
        subscription.request(1);
    }

    /// Handle a single value.
    async fn on_next(&self, item: T);

    /// Handle an error signalled to this subscriber only.
    async fn on_error(&self, error: PubSubError) {
        tracing::warn!(
            subscriber = self.name(),
            label = error.as_label(),
            "subscriber error: {error}"
        );
    }

    /// Handle the terminal completion signal.
    async fn on_complete(&self) {}

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
