//! Engine core: publishers, subscriptions and reference-counted lifecycle.
//!
//! The public API from this module is [`Publisher`], [`WeakPublisher`],
//! [`Subscription`] and the [`Subscribable`] capability trait.
//!
//! Internal modules:
//! - [`publisher`]: replay cache, broadcast, completion, count transitions;
//! - [`subscription`]: per-subscriber queue, credits and ordered delivery task;
//! - [`lifecycle`]: hooks fired on 0→1 / 1→0 and upstream attachment holder;
//! - [`guard`]: poison-tolerant locking and panic capture.
//!
//! ## Wiring
//! ```text
//! root Publisher ──► Subscription ──► combinator (Subscriber) ──► output Publisher ──► ...
//!       ▲                                                               │
//!       └──────────── Lifecycle::after_subscribe / after_unsubscribe ◄──┘
//! ```

pub(crate) mod guard;
pub(crate) mod lifecycle;
mod publisher;
mod subscription;

pub use publisher::{Publisher, Subscribable, WeakPublisher};
pub use subscription::{Subscription, SubscriptionGuard};
