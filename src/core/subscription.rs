//! # Subscription: per-subscriber flow control and ordered delivery.
//!
//! A [`Subscription`] connects one [`Publisher`](crate::Publisher) to one
//! [`Subscribe`] implementation. It owns a FIFO queue of signals, a credit
//! counter and at most one in-flight delivery task.
//!
//! ## Architecture
//! ```text
//! Publisher::submit(v) ──► send(v) ──► [queue] ──┐
//!                                                ├─ credits > 0 ? ──► spawn deliver()
//! Subscription::request(n) ──► credits += n ─────┘   (only if none in flight)
//!
//! deliver():
//!   loop {
//!     pop front while ready ──► on_next / on_error / on_complete
//!   }   (exits when nothing deliverable; clears in-flight flag)
//! ```
//!
//! ## Rules
//! - **Strict FIFO**: one delivery task at a time, so item *k+1* is never
//!   handed to the subscriber before item *k* finished.
//! - **Credits**: `Next` consumes one credit; `Error`/`Complete` need none.
//! - **Non-blocking**: `send`, `request` and `cancel` only touch the queue and
//!   schedule a task; user code never runs inline.
//! - **Cancellation**: drops queued items; an item already being delivered
//!   completes normally.
//! - **Panic isolation**: a panicking callback is logged; delivery continues.

use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tokio::runtime::Handle;

use crate::core::guard::{lock, panic_message};
use crate::core::publisher::PublisherCore;
use crate::error::PubSubError;
use crate::subscribers::Subscribe;

/// A queued signal for one subscriber.
pub(crate) enum Signal<T> {
    Next(T),
    Error(PubSubError),
    Complete,
}

/// Mutable per-subscription state, guarded by the subscription's own lock.
struct State<T: Send + 'static> {
    credits: u64,
    queue: VecDeque<Signal<T>>,
    cancelled: bool,
    terminated: bool,
    in_flight: bool,
    /// Cleared on cancel/complete so the subscriber (and whatever it captures) is released.
    subscriber: Option<Arc<dyn Subscribe<T>>>,
}

impl<T: Send + 'static> State<T> {
    /// True when the front signal may be delivered now.
    fn ready(&self) -> bool {
        match self.queue.front() {
            Some(Signal::Next(_)) => self.credits > 0,
            Some(_) => true,
            None => false,
        }
    }
}

struct Inner<T: Send + 'static> {
    id: u64,
    name: &'static str,
    state: Mutex<State<T>>,
    owner: Arc<PublisherCore<T>>,
    runtime: Handle,
}

/// Handle to a single publisher→subscriber channel.
///
/// Cheap to clone; all clones refer to the same channel. An active subscription
/// keeps its publisher alive until it is cancelled or the publisher completes.
///
/// Dropping every handle does **not** cancel: the publisher and the
/// subscription reference each other, so a subscription that is neither
/// cancelled nor completed stays registered (with its subscriber) for as long
/// as the process runs. Call [`cancel`](Self::cancel), or wrap the handle with
/// [`drop_guard`](Self::drop_guard) to cancel on scope exit.
pub struct Subscription<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = lock(&self.inner.state);
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("subscriber", &self.inner.name)
            .field("credits", &st.credits)
            .field("queued", &st.queue.len())
            .field("cancelled", &st.cancelled)
            .field("terminated", &st.terminated)
            .finish()
    }
}

impl<T: Send + 'static> Subscription<T> {
    /// Creates a subscription pre-filled with `initial` signals.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime, like `tokio::spawn`.
    pub(crate) fn new(
        id: u64,
        owner: Arc<PublisherCore<T>>,
        subscriber: Arc<dyn Subscribe<T>>,
        initial: VecDeque<Signal<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                name: subscriber.name(),
                state: Mutex::new(State {
                    credits: 0,
                    queue: initial,
                    cancelled: false,
                    terminated: false,
                    in_flight: false,
                    subscriber: Some(subscriber),
                }),
                owner,
                runtime: Handle::current(),
            }),
        }
    }

    /// Requests `n` more items.
    ///
    /// `n == 0` is a contract violation: [`PubSubError::InvalidRequest`] is
    /// delivered to this subscriber's `on_error`; other subscribers are unaffected
    /// and the subscription stays open.
    pub fn request(&self, n: u64) {
        let mut st = lock(&self.inner.state);
        if st.cancelled || st.terminated {
            return;
        }
        if n == 0 {
            st.queue
                .push_front(Signal::Error(PubSubError::InvalidRequest { requested: n }));
        } else {
            st.credits = st.credits.saturating_add(n);
        }
        self.schedule(st);
    }

    /// Cancels the subscription. Idempotent.
    ///
    /// Drops queued items and credits, then unregisters from the publisher
    /// (which detaches upstreams when this was its last subscriber).
    pub fn cancel(&self) {
        let released = {
            let mut st = lock(&self.inner.state);
            if st.cancelled || st.terminated {
                return;
            }
            st.cancelled = true;
            st.credits = 0;
            st.queue.clear();
            st.subscriber.take()
        };
        drop(released);
        tracing::trace!(subscription = self.inner.id, subscriber = self.inner.name, "cancelled");
        self.inner.owner.unregister(self.inner.id);
    }

    /// Returns a guard that cancels this subscription when dropped.
    pub fn drop_guard(self) -> SubscriptionGuard<T> {
        SubscriptionGuard {
            subscription: self,
            armed: true,
        }
    }

    /// Alias for [`cancel`](Self::cancel).
    #[inline]
    pub fn unsubscribe(&self) {
        self.cancel();
    }

    /// Returns true once the subscription was cancelled.
    pub fn is_cancelled(&self) -> bool {
        lock(&self.inner.state).cancelled
    }

    /// Returns true once completion has been delivered.
    pub fn is_terminated(&self) -> bool {
        lock(&self.inner.state).terminated
    }

    /// Enqueues a value (publisher side).
    pub(crate) fn send(&self, item: T) {
        self.push(Signal::Next(item));
    }

    /// Enqueues completion (publisher side).
    pub(crate) fn complete(&self) {
        self.push(Signal::Complete);
    }

    /// Starts delivery of whatever is already deliverable.
    pub(crate) fn flush(&self) {
        let st = lock(&self.inner.state);
        self.schedule(st);
    }

    fn push(&self, signal: Signal<T>) {
        let mut st = lock(&self.inner.state);
        if st.cancelled || st.terminated {
            return;
        }
        st.queue.push_back(signal);
        self.schedule(st);
    }

    /// Spawns a delivery task unless one is in flight or nothing is ready.
    fn schedule(&self, mut st: MutexGuard<'_, State<T>>) {
        if st.in_flight || st.cancelled || !st.ready() {
            return;
        }
        st.in_flight = true;
        drop(st);

        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(inner.deliver());
    }
}

/// Cancels the wrapped [`Subscription`] on drop, unless disarmed.
#[must_use = "dropping the guard cancels the subscription immediately"]
pub struct SubscriptionGuard<T: Send + 'static> {
    subscription: Subscription<T>,
    armed: bool,
}

impl<T: Send + 'static> SubscriptionGuard<T> {
    /// Returns the subscription without cancelling it.
    pub fn disarm(mut self) -> Subscription<T> {
        self.armed = false;
        self.subscription.clone()
    }
}

impl<T: Send + 'static> std::ops::Deref for SubscriptionGuard<T> {
    type Target = Subscription<T>;

    fn deref(&self) -> &Subscription<T> {
        &self.subscription
    }
}

impl<T: Send + 'static> Drop for SubscriptionGuard<T> {
    fn drop(&mut self) {
        if self.armed {
            self.subscription.cancel();
        }
    }
}

impl<T: Send + 'static> Inner<T> {
    /// Delivery loop; the only place subscriber callbacks run.
    async fn deliver(self: Arc<Self>) {
        loop {
            let (signal, subscriber) = {
                let mut st = lock(&self.state);
                if st.cancelled || !st.ready() {
                    st.in_flight = false;
                    return;
                }
                let Some(signal) = st.queue.pop_front() else {
                    st.in_flight = false;
                    return;
                };
                let subscriber = match &signal {
                    Signal::Next(_) => {
                        st.credits -= 1;
                        st.subscriber.clone()
                    }
                    Signal::Error(_) => st.subscriber.clone(),
                    Signal::Complete => {
                        st.terminated = true;
                        st.credits = 0;
                        st.queue.clear();
                        st.subscriber.take()
                    }
                };
                (signal, subscriber)
            };

            let Some(subscriber) = subscriber else {
                continue;
            };
            let fut = match signal {
                Signal::Next(item) => subscriber.on_next(item),
                Signal::Error(err) => subscriber.on_error(err),
                Signal::Complete => subscriber.on_complete(),
            };
            // `Subscriber` contains its own callback panics; this covers
            // arbitrary `Subscribe` implementations.
            if let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await {
                let err = PubSubError::SubscriberPanicked {
                    subscriber: self.name,
                    info: panic_message(&*payload),
                };
                tracing::warn!(subscription = self.id, label = err.as_label(), "{err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::Publisher;
    use crate::testing::{Recorder, settle, wait_until};

    /// Subscriber that never requests on its own.
    struct Manual {
        seen: Arc<Mutex<Vec<u32>>>,
        errors: Arc<AtomicUsize>,
        handle: Mutex<Option<Subscription<u32>>>,
    }

    #[async_trait]
    impl Subscribe<u32> for Manual {
        fn on_subscribe(&self, subscription: Subscription<u32>) {
            *lock(&self.handle) = Some(subscription);
        }
        async fn on_next(&self, item: u32) {
            lock(&self.seen).push(item);
        }
        async fn on_error(&self, _error: PubSubError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manual() -> (Arc<Manual>, Arc<Mutex<Vec<u32>>>, Arc<AtomicUsize>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(AtomicUsize::new(0));
        let sub = Arc::new(Manual {
            seen: seen.clone(),
            errors: errors.clone(),
            handle: Mutex::new(None),
        });
        (sub, seen, errors)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_nothing_delivered_without_credit() {
        let p = Publisher::with_value(1u32);
        let (sub, seen, _) = manual();
        let s = p.subscribe_arc(sub);
        p.submit(2).unwrap();
        settle().await;
        assert!(lock(&seen).is_empty());

        s.request(1);
        wait_until(|| lock(&seen).len() == 1).await;
        settle().await;
        assert_eq!(*lock(&seen), vec![1]);

        s.request(5);
        wait_until(|| lock(&seen).len() == 2).await;
        assert_eq!(*lock(&seen), vec![1, 2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zero_request_errors_only_that_subscriber() {
        let p = Publisher::with_value(3u32);
        let (bad, _, bad_errors) = manual();
        let (good, good_seen, good_errors) = manual();
        let bad_sub = p.subscribe_arc(bad);
        let good_sub = p.subscribe_arc(good);

        bad_sub.request(0);
        good_sub.request(1);

        wait_until(|| bad_errors.load(Ordering::SeqCst) == 1).await;
        wait_until(|| lock(&good_seen).len() == 1).await;
        assert_eq!(good_errors.load(Ordering::SeqCst), 0);
        assert!(!bad_sub.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_is_idempotent_and_drops_queue() {
        let p = Publisher::new();
        let (sub, seen, _) = manual();
        let s = p.subscribe_arc(sub);
        p.submit(1u32).unwrap();
        p.submit(2).unwrap();
        s.cancel();
        s.cancel();
        s.request(10);
        settle().await;
        assert!(lock(&seen).is_empty());
        assert!(s.is_cancelled());
        assert_eq!(p.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panicking_callback_does_not_stop_delivery() {
        let p = Publisher::new();
        let rec = Recorder::new();
        let sink = rec.clone();
        let _s = p.subscribe(move |v: u32| {
            if v == 2 {
                panic!("bad value");
            }
            sink.push(v);
        });
        for v in 1..=4 {
            p.submit(v).unwrap();
        }
        rec.wait_len(3).await;
        assert_eq!(rec.values(), vec![1, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_completion_delivered_without_credit() {
        let p: Publisher<u32> = Publisher::new();
        let (sub, _, _) = manual();
        let s = p.subscribe_arc(sub);
        p.complete();
        wait_until(|| s.is_terminated()).await;
        assert!(!s.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drop_guard_cancels_and_frees_publisher() {
        let p = Publisher::with_value(1u32);
        let weak = p.downgrade();
        let guard = p.subscribe(|_| {}).drop_guard();
        assert_eq!(p.subscriber_count(), 1);
        assert!(!guard.is_cancelled());

        drop(guard);
        assert_eq!(p.subscriber_count(), 0);
        drop(p);
        wait_until(|| weak.upgrade().is_none()).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disarmed_guard_keeps_subscription() {
        let p = Publisher::with_value(1u32);
        let s = p.subscribe(|_| {}).drop_guard().disarm();
        assert_eq!(p.subscriber_count(), 1);
        assert!(!s.is_cancelled());
        s.cancel();
        assert_eq!(p.subscriber_count(), 0);
    }
}
