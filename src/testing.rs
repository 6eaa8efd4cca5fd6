//! Test helpers: a recording subscriber and polling waits.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::guard::lock;
use crate::{Publisher, Subscriber, Subscription};

const WAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(2);

/// Polls `cond` until it holds; panics after five seconds.
pub(crate) async fn wait_until(cond: impl Fn() -> bool) {
    let polled = tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(POLL).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not met within {WAIT:?}");
}

/// Gives in-flight deliveries time to land before asserting absence.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Records every value and the completion flag of one or more subscriptions.
pub(crate) struct Recorder<T> {
    values: Arc<Mutex<Vec<T>>>,
    completed: Arc<AtomicBool>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            completed: self.completed.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub(crate) fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn record(&self, publisher: &Publisher<T>) -> Subscription<T> {
        let sink = self.clone();
        let done = self.completed.clone();
        publisher.subscribe_with(
            Subscriber::new(move |v: T| sink.push(v))
                .on_complete(move || done.store(true, Ordering::SeqCst))
                .named("recorder"),
        )
    }

    pub(crate) fn push(&self, value: T) {
        lock(&self.values).push(value);
    }

    pub(crate) fn values(&self) -> Vec<T> {
        lock(&self.values).clone()
    }

    pub(crate) fn last(&self) -> Option<T> {
        lock(&self.values).last().cloned()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_len(&self, n: usize) {
        wait_until(|| self.len() >= n).await;
    }

    pub(crate) async fn wait_completed(&self) {
        wait_until(|| self.is_completed()).await;
    }
}

impl<T: Clone + PartialEq + Debug + Send + 'static> Recorder<T> {
    /// Waits until the most recent value equals `expected`.
    pub(crate) async fn wait_last(&self, expected: T) {
        let polled = tokio::time::timeout(WAIT, async {
            while self.last().as_ref() != Some(&expected) {
                tokio::time::sleep(POLL).await;
            }
        })
        .await;
        assert!(
            polled.is_ok(),
            "last value {:?} never became {expected:?}",
            self.last()
        );
    }
}
