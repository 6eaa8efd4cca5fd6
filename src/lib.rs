//! # livepub
//!
//! **livepub** is an in-process reactive value pipeline for Rust.
//!
//! Producers [`submit`](Publisher::submit) values into cached publishers;
//! subscribers receive the latest value on attach and every later value in
//! order, under credit-based flow control. Combinators (map, merge, combine,
//! reduce, switch-latest, tickers) derive new publishers from existing ones and
//! attach to their upstreams only while someone is observing them.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  producers (any thread)
//!       │ submit(v)
//!       ▼
//! ┌──────────────┐   ┌──────────────┐            ┌──────────────┐
//! │  Publisher   │   │  Publisher   │    ...     │  Publisher   │
//! │ (cache + set)│   │ (cache + set)│            │ (cache + set)│
//! └──────┬───────┘   └──────┬───────┘            └──────┬───────┘
//!        │ Subscription     │ Subscription              │
//!        ▼ (queue, credits) ▼                           ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  combinator nodes (map / merge / combine / reduce / switch)   │
//! │  - subscribe upstream on 0 → 1 downstream subscribers         │
//! │  - cancel upstream on 1 → 0                                   │
//! └──────┬───────────────────────────────────────────────┬────────┘
//!        ▼                                               ▼
//!   output Publisher ──► Subscription ──► Subscriber (callback, on a Tokio task)
//! ```
//!
//! ### Delivery
//! ```text
//! submit(v) ──► cache = v ──► for each subscription: queue.push(v)
//!                                          │
//!                   credits > 0 && no task in flight ?
//!                                          │ yes
//!                                          ▼
//!                       spawn deliver(): pop ──► on_next(v) ──► request(1) ──► ...
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / functions                          |
//! |-------------------|---------------------------------------------------------------|------------------------------------------------|
//! | **Publishers**    | Cached values, late-join replay, completion.                  | [`Publisher`], [`WeakPublisher`]               |
//! | **Subscribers**   | Callback adapter or the full request protocol.                | [`Subscriber`], [`Subscribe`], [`Subscription`]|
//! | **Combinators**   | Derived values with reference-counted upstream attachment.    | [`map`], [`merge`], [`combine`], [`reduce`], [`switch_latest`] |
//! | **Async mapping** | Latest-wins transforms on Tokio tasks or the blocking pool.   | [`map_async`], [`map_blocking`]                |
//! | **Time**          | Shared periodic wall-clock publishers.                        | [`TickerRegistry`]                             |
//! | **Errors**        | Typed errors with stable labels.                              | [`PubSubError`]                                |
//! | **Configuration** | Pull batch and default tick period.                           | [`Config`]                                     |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use livepub::{Publisher, combine, reduce};
//!
//! #[tokio::main]
//! async fn main() {
//!     let constituencies: Vec<Publisher<u32>> =
//!         (0..3).map(|_| Publisher::with_value(0)).collect();
//!
//!     let seats = combine(constituencies.clone());
//!     let total = reduce(
//!         constituencies.clone(),
//!         0u32,
//!         |acc: &u32, v: &u32| acc + v,
//!         |acc: &u32, v: &u32| acc - v,
//!     );
//!     let label = total.map(|t: u32| format!("{t} votes counted"));
//!
//!     let _seats = seats.subscribe(|s| println!("per constituency: {s:?}"));
//!     let _label = label.subscribe(|l| println!("{l}"));
//!
//!     constituencies[1].submit(1200).unwrap();
//! }
//! ```
mod config;
mod core;
mod error;
mod ops;
mod subscribers;
mod ticker;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{Publisher, Subscribable, Subscription, SubscriptionGuard, WeakPublisher};
pub use error::PubSubError;
pub use ops::{
    combine, compose, map, map_async, map_blocking, merge, reduce, switch_latest, try_map,
};
pub use subscribers::{Subscribe, Subscriber};
pub use ticker::TickerRegistry;

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
