//! # Reference-counted upstream attachment.
//!
//! A combinator is a publisher whose core carries a [`Lifecycle`] hook. The core
//! fires the hook exactly at its subscriber-count transitions:
//!
//! ```text
//! subscribe()   0 ─► 1  ──► after_subscribe()   ──► Attachments::attach(subscribe upstreams)
//! cancel()      1 ─► 0  ──► after_unsubscribe() ──► Attachments::detach(cancel upstreams)
//! complete()    n ─► 0  ──► after_unsubscribe()
//! ```
//!
//! Because each hook subscribes to upstream publishers (which fire their own
//! hooks on *their* 0→1 transition), attachment composes transitively: a chain
//! of combinators subscribes to its root exactly once, no matter how many leaf
//! subscribers attach downstream.
//!
//! ## Rules
//! - Hooks of one core are serialized by that core's transition lock.
//! - Hooks may subscribe to or cancel **upstream** publishers only; upstreams
//!   never call back into a downstream synchronously, so lock acquisition always
//!   runs downstream → upstream.

use std::sync::{Arc, Mutex};

use crate::core::Subscription;
use crate::core::guard::lock;

/// Transition hooks installed on a publisher core by combinators.
pub(crate) trait Lifecycle: Send + Sync + 'static {
    /// Subscriber count went 0 → 1.
    fn after_subscribe(self: Arc<Self>);
    /// Subscriber count went 1 → 0 (cancel or completion).
    fn after_unsubscribe(self: Arc<Self>);
}

/// Type-erased cancel, so one combinator can hold upstreams of different item types.
pub(crate) trait Cancel: Send + Sync {
    fn cancel(&self);
}

impl<T: Send + 'static> Cancel for Subscription<T> {
    fn cancel(&self) {
        Subscription::cancel(self);
    }
}

/// Upstream subscriptions held while a combinator has downstream subscribers.
pub(crate) struct Attachments {
    stage: &'static str,
    active: Mutex<Vec<Box<dyn Cancel>>>,
}

impl Attachments {
    pub(crate) fn new(stage: &'static str) -> Self {
        Self {
            stage,
            active: Mutex::new(Vec::new()),
        }
    }

    /// Subscribes upstream via `connect` unless already attached.
    pub(crate) fn attach(&self, connect: impl FnOnce() -> Vec<Box<dyn Cancel>>) {
        let mut active = lock(&self.active);
        if !active.is_empty() {
            return;
        }
        *active = connect();
        tracing::debug!(stage = self.stage, upstreams = active.len(), "attached upstream");
    }

    /// Cancels every upstream subscription. Idempotent.
    pub(crate) fn detach(&self) {
        let upstreams = std::mem::take(&mut *lock(&self.active));
        if upstreams.is_empty() {
            return;
        }
        tracing::debug!(stage = self.stage, upstreams = upstreams.len(), "detached upstream");
        for upstream in upstreams {
            upstream.cancel();
        }
    }
}
