//! # Publisher: cached value holder and broadcaster.
//!
//! A [`Publisher`] keeps the last submitted value (the replay cache) and the set
//! of active [`Subscription`]s. Every value is enqueued on every subscription in
//! submission order; delivery itself happens later on each subscription's own
//! task.
//!
//! ## Architecture
//! ```text
//! producer ── submit(v) ──► PublisherCore
//!                            ├─ cached = v
//!                            └─ for each subscription (under the publisher lock):
//!                                   send(v) ──► [queue S1] [queue S2] ... [queue SN]
//!
//! subscribe(s) ──► new Subscription (queue pre-filled with cached value)
//!                  ├─ completed? → also enqueue Complete, do not register
//!                  └─ count 0 → 1 ? → Lifecycle::after_subscribe()
//! ```
//!
//! ## Rules
//! - **Late join**: a new subscriber first sees the cached value, before any
//!   value submitted afterwards.
//! - **Terminal**: after [`complete`](Publisher::complete), `submit` fails with
//!   [`PubSubError::AlreadyCompleted`]; new subscribers get the cached value and
//!   completion.
//! - **Lock order**: publisher state → subscription state, never the reverse.
//! - The cache persists with or without subscribers.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::config::Config;
use crate::core::guard::lock;
use crate::core::lifecycle::Lifecycle;
use crate::core::subscription::{Signal, Subscription};
use crate::error::PubSubError;
use crate::subscribers::{Subscribe, Subscriber};

/// Capability shared by everything that can be observed.
///
/// Combinators accept their upstreams through this trait.
pub trait Subscribable<T: Send + 'static>: Send + Sync + 'static {
    /// Attaches a subscriber implementing the full request protocol.
    fn subscribe_arc(&self, subscriber: Arc<dyn Subscribe<T>>) -> Subscription<T>;
}

struct State<T: Send + 'static> {
    cached: Option<T>,
    subscriptions: BTreeMap<u64, Subscription<T>>,
    completed: bool,
    next_id: u64,
}

/// Shared interior of a [`Publisher`].
pub(crate) struct PublisherCore<T: Send + 'static> {
    state: Mutex<State<T>>,
    /// Serializes subscriber-count transitions and the hooks they fire.
    transitions: Mutex<()>,
    hooks: Option<Arc<dyn Lifecycle>>,
}

impl<T: Clone + Send + 'static> PublisherCore<T> {
    fn new(cached: Option<T>, completed: bool, hooks: Option<Arc<dyn Lifecycle>>) -> Self {
        Self {
            state: Mutex::new(State {
                cached,
                subscriptions: BTreeMap::new(),
                completed,
                next_id: 0,
            }),
            transitions: Mutex::new(()),
            hooks,
        }
    }

    fn submit(&self, value: T) -> Result<(), PubSubError> {
        let mut st = lock(&self.state);
        if st.completed {
            return Err(PubSubError::AlreadyCompleted);
        }
        tracing::trace!(subscribers = st.subscriptions.len(), "submit");
        for subscription in st.subscriptions.values() {
            subscription.send(value.clone());
        }
        st.cached = Some(value);
        Ok(())
    }

    fn complete(&self) {
        let _transition = lock(&self.transitions);
        let drained = {
            let mut st = lock(&self.state);
            if st.completed {
                return;
            }
            st.completed = true;
            std::mem::take(&mut st.subscriptions)
        };
        tracing::trace!(subscribers = drained.len(), "complete");
        for subscription in drained.values() {
            subscription.complete();
        }
        if !drained.is_empty() {
            if let Some(hooks) = &self.hooks {
                Arc::clone(hooks).after_unsubscribe();
            }
        }
    }

    fn subscribe(self: &Arc<Self>, subscriber: Arc<dyn Subscribe<T>>) -> Subscription<T> {
        let transition = lock(&self.transitions);
        let (subscription, first) = {
            let mut st = lock(&self.state);
            let id = st.next_id;
            st.next_id += 1;

            let mut initial = VecDeque::new();
            if let Some(value) = &st.cached {
                initial.push_back(Signal::Next(value.clone()));
            }
            if st.completed {
                initial.push_back(Signal::Complete);
            }
            let subscription =
                Subscription::new(id, Arc::clone(self), Arc::clone(&subscriber), initial);

            if st.completed {
                (subscription, false)
            } else {
                st.subscriptions.insert(id, subscription.clone());
                (subscription, st.subscriptions.len() == 1)
            }
        };
        if first {
            if let Some(hooks) = &self.hooks {
                Arc::clone(hooks).after_subscribe();
            }
        }
        drop(transition);

        subscriber.on_subscribe(subscription.clone());
        subscription.flush();
        subscription
    }
}

impl<T: Send + 'static> PublisherCore<T> {
    /// Removes a cancelled subscription; fires `after_unsubscribe` on 1 → 0.
    pub(crate) fn unregister(&self, id: u64) {
        let _transition = lock(&self.transitions);
        let last = {
            let mut st = lock(&self.state);
            st.subscriptions.remove(&id).is_some() && st.subscriptions.is_empty()
        };
        if last {
            if let Some(hooks) = &self.hooks {
                Arc::clone(hooks).after_unsubscribe();
            }
        }
    }
}

/// Root value holder: caches the latest value and broadcasts updates.
///
/// Cloning a `Publisher` creates a new handle to the **same** publisher.
///
/// # Example
/// ```rust
/// use livepub::Publisher;
///
/// # #[tokio::main]
/// # async fn main() {
/// let votes = Publisher::with_value(5);
/// let sub = votes.subscribe(|v| println!("votes: {v}"));
/// votes.submit(6).unwrap();
/// sub.unsubscribe();
/// # }
/// ```
pub struct Publisher<T: Send + 'static> {
    core: Arc<PublisherCore<T>>,
}

impl<T: Send + 'static> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug + Send + 'static> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = lock(&self.core.state);
        f.debug_struct("Publisher")
            .field("cached", &st.cached)
            .field("subscribers", &st.subscriptions.len())
            .field("completed", &st.completed)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Publisher<T> {
    /// Creates an empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Arc::new(PublisherCore::new(None, false, None)),
        }
    }

    /// Creates a publisher pre-seeded with `value`.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self {
            core: Arc::new(PublisherCore::new(Some(value), false, None)),
        }
    }

    /// Creates a completed publisher holding `value`.
    ///
    /// Every subscriber receives `value` followed immediately by completion.
    /// Used for constants and one-time snapshots.
    #[must_use]
    pub fn one_shot(value: T) -> Self {
        Self {
            core: Arc::new(PublisherCore::new(Some(value), true, None)),
        }
    }

    /// Creates a completed publisher without a value.
    #[must_use]
    pub fn completed() -> Self {
        Self {
            core: Arc::new(PublisherCore::new(None, true, None)),
        }
    }

    /// Creates a combinator output whose hooks are built from a weak handle to itself.
    pub(crate) fn with_hooks<L>(build: impl FnOnce(WeakPublisher<T>) -> Arc<L>) -> Self
    where
        L: Lifecycle,
    {
        let core = Arc::new_cyclic(|weak: &Weak<PublisherCore<T>>| {
            let hooks: Arc<dyn Lifecycle> = build(WeakPublisher { core: weak.clone() });
            PublisherCore::new(None, false, Some(hooks))
        });
        Self { core }
    }

    /// Caches `value` and enqueues it on every active subscription.
    ///
    /// # Errors
    /// [`PubSubError::AlreadyCompleted`] if [`complete`](Self::complete) was called.
    pub fn submit(&self, value: T) -> Result<(), PubSubError> {
        self.core.submit(value)
    }

    /// Terminal signal: notifies every subscriber and clears the subscription set.
    ///
    /// Idempotent. Later subscribers receive the cached value (if any) and completion.
    pub fn complete(&self) {
        self.core.complete();
    }

    /// Subscribes a callback using the default auto-pull protocol (request 1 per item).
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn subscribe<F>(&self, on_next: F) -> Subscription<T>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe_with(Subscriber::new(on_next))
    }

    /// Subscribes a callback with the auto-pull batch from `config`.
    pub fn subscribe_with_config<F>(&self, config: &Config, on_next: F) -> Subscription<T>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe_with(Subscriber::with_config(config, on_next))
    }

    /// Subscribes any [`Subscribe`] implementation.
    pub fn subscribe_with<S>(&self, subscriber: S) -> Subscription<T>
    where
        S: Subscribe<T>,
    {
        self.core.subscribe(Arc::new(subscriber))
    }

    /// Subscribes a shared [`Subscribe`] implementation.
    pub fn subscribe_arc(&self, subscriber: Arc<dyn Subscribe<T>>) -> Subscription<T> {
        self.core.subscribe(subscriber)
    }

    /// Returns a clone of the cached value.
    pub fn latest(&self) -> Option<T> {
        lock(&self.core.state).cached.clone()
    }

    /// Returns true once [`complete`](Self::complete) was called.
    pub fn is_completed(&self) -> bool {
        lock(&self.core.state).completed
    }

    /// Number of currently registered subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.core.state).subscriptions.len()
    }

    /// Returns a handle that does not keep the publisher alive.
    pub fn downgrade(&self) -> WeakPublisher<T> {
        WeakPublisher {
            core: Arc::downgrade(&self.core),
        }
    }

    /// Returns true when both handles refer to the same publisher.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<T: Clone + Send + 'static> Subscribable<T> for Publisher<T> {
    fn subscribe_arc(&self, subscriber: Arc<dyn Subscribe<T>>) -> Subscription<T> {
        self.core.subscribe(subscriber)
    }
}

/// Non-owning publisher handle used by combinators to emit into their output.
pub struct WeakPublisher<T: Send + 'static> {
    core: Weak<PublisherCore<T>>,
}

impl<T: Send + 'static> Clone for WeakPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> WeakPublisher<T> {
    /// Upgrades to a full handle if the publisher is still alive.
    pub fn upgrade(&self) -> Option<Publisher<T>> {
        self.core.upgrade().map(|core| Publisher { core })
    }

    /// Submits through the handle; a dropped publisher swallows the value.
    ///
    /// # Errors
    /// [`PubSubError::AlreadyCompleted`] if the publisher completed.
    pub fn submit(&self, value: T) -> Result<(), PubSubError> {
        match self.core.upgrade() {
            Some(core) => core.submit(value),
            None => Ok(()),
        }
    }

    /// Completes the publisher if it is still alive.
    pub fn complete(&self) {
        if let Some(core) = self.core.upgrade() {
            core.complete();
        }
    }
}
