//! # Subscribers for the value-propagation engine.
//!
//! This module provides the [`Subscribe`] trait and built-in implementations
//! for observing a [`Publisher`](crate::Publisher).
//!
//! ## Architecture
//! ```text
//! Value flow:
//!   producer ── submit(v) ──► Publisher ──► Subscription (queue + credits)
//!                                                │
//!                                                └──► Subscribe::on_next(v)
//!                                                          │
//!                                                ┌─────────┼──────────┐
//!                                                ▼         ▼          ▼
//!                                           Subscriber  LogWriter  combinators
//!                                          (callbacks)   (tap)    (map, combine, ...)
//! ```
//!
//! ## Subscriber types
//! - **Callback subscribers** - [`Subscriber`] adapts closures, auto-pulls one item at a time
//! - **Protocol subscribers** - implement [`Subscribe`] directly to control `request(n)`

#[cfg(feature = "logging")]
mod log;
mod subscribe;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber::Subscriber;
