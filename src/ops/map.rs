//! # Map: synchronous per-value transform.
//!
//! ```text
//! source ──► [MapNode: f(v)] ──► output (cached, late-join)
//! ```
//!
//! The node subscribes to its source only while the output has subscribers
//! (see [`Lifecycle`]). A transform that panics or returns an error is logged
//! and that single emission is suppressed.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::core::guard::{catch, lock};
use crate::core::lifecycle::{Attachments, Cancel, Lifecycle};
use crate::core::{Publisher, Subscribable, WeakPublisher};
use crate::error::PubSubError;
use crate::subscribers::Subscriber;

struct MapNode<S, T, U: Send + 'static, F> {
    stage: &'static str,
    source: S,
    f: F,
    output: WeakPublisher<U>,
    /// Attachment epoch; values from an older attachment are ignored.
    epoch: Mutex<u64>,
    attachments: Attachments,
    _item: PhantomData<fn(T)>,
}

impl<S, T, U, F> MapNode<S, T, U, F>
where
    S: Subscribable<T>,
    T: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(T) -> Result<U, PubSubError> + Send + Sync + 'static,
{
    fn on_value(&self, epoch: u64, value: T) {
        let mapped = match catch(|| (self.f)(value)) {
            Ok(Ok(mapped)) => mapped,
            Ok(Err(err)) => {
                tracing::warn!(stage = self.stage, label = err.as_label(), "{err}");
                return;
            }
            Err(reason) => {
                let err = PubSubError::TransformFailed {
                    stage: self.stage,
                    reason,
                };
                tracing::warn!(stage = self.stage, label = err.as_label(), "{err}");
                return;
            }
        };

        let current = lock(&self.epoch);
        if *current != epoch {
            return;
        }
        if let Err(err) = self.output.submit(mapped) {
            tracing::debug!(stage = self.stage, "dropped value: {err}");
        }
    }

    fn on_done(&self, epoch: u64) {
        let current = *lock(&self.epoch);
        if current == epoch {
            self.output.complete();
        }
    }
}

impl<S, T, U, F> Lifecycle for MapNode<S, T, U, F>
where
    S: Subscribable<T>,
    T: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(T) -> Result<U, PubSubError> + Send + Sync + 'static,
{
    fn after_subscribe(self: Arc<Self>) {
        let epoch = {
            let mut current = lock(&self.epoch);
            *current += 1;
            *current
        };
        let on_value = Arc::clone(&self);
        let on_done = Arc::clone(&self);
        self.attachments.attach(|| {
            let upstream = self.source.subscribe_arc(Arc::new(
                Subscriber::new(move |v: T| on_value.on_value(epoch, v))
                    .on_complete(move || on_done.on_done(epoch))
                    .named(self.stage),
            ));
            vec![Box::new(upstream) as Box<dyn Cancel>]
        });
    }

    fn after_unsubscribe(self: Arc<Self>) {
        self.attachments.detach();
    }
}

fn build<S, T, U, F>(stage: &'static str, source: S, f: F) -> Publisher<U>
where
    S: Subscribable<T>,
    T: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(T) -> Result<U, PubSubError> + Send + Sync + 'static,
{
    Publisher::with_hooks(|output| {
        Arc::new(MapNode {
            stage,
            source,
            f,
            output,
            epoch: Mutex::new(0),
            attachments: Attachments::new(stage),
            _item: PhantomData,
        })
    })
}

/// Applies `f` to every value of `source`.
pub fn map<S, T, U, F>(source: S, f: F) -> Publisher<U>
where
    S: Subscribable<T>,
    T: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    build("map", source, move |v| Ok(f(v)))
}

/// Applies a fallible `f`; errors are logged and the emission is suppressed.
pub fn try_map<S, T, U, E, F>(source: S, f: F) -> Publisher<U>
where
    S: Subscribable<T>,
    T: Send + 'static,
    U: Clone + Send + 'static,
    E: std::fmt::Display,
    F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
{
    build("try_map", source, move |v| {
        f(v).map_err(|e| PubSubError::TransformFailed {
            stage: "try_map",
            reason: e.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorder, settle};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_map_transforms_and_caches() {
        let source = Publisher::with_value(2);
        let doubled = map(source.clone(), |v: i32| v * 2);
        let rec = Recorder::new();
        let _s = rec.record(&doubled);
        rec.wait_last(4).await;

        source.submit(5).unwrap();
        rec.wait_last(10).await;
        assert_eq!(rec.values(), vec![4, 10]);

        let late = Recorder::new();
        let _l = late.record(&doubled);
        late.wait_last(10).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_map_attaches_only_while_observed() {
        let source = Publisher::with_value(1);
        let mapped = map(source.clone(), |v: i32| v + 1);
        assert_eq!(source.subscriber_count(), 0);

        let s = mapped.subscribe(|_| {});
        assert_eq!(source.subscriber_count(), 1);
        s.unsubscribe();
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_many_downstream_one_upstream() {
        let source = Publisher::with_value(1);
        let mapped = map(source.clone(), |v: i32| v + 1);
        let subs: Vec<_> = (0..3).map(|_| mapped.subscribe(|_| {})).collect();
        assert_eq!(source.subscriber_count(), 1);
        for s in &subs[..2] {
            s.cancel();
        }
        assert_eq!(source.subscriber_count(), 1);
        subs[2].cancel();
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deep_chain_subscribes_root_once() {
        let root = Publisher::with_value(0);
        let mut tail = root.clone();
        for _ in 0..10 {
            tail = map(tail, |v: i32| v + 1);
        }
        let recs: Vec<Recorder<i32>> = (0..5).map(|_| Recorder::new()).collect();
        let subs: Vec<_> = recs.iter().map(|r| r.record(&tail)).collect();
        assert_eq!(root.subscriber_count(), 1);
        for rec in &recs {
            rec.wait_last(10).await;
        }

        root.submit(5).unwrap();
        for rec in &recs {
            rec.wait_last(15).await;
        }

        for s in subs {
            s.cancel();
        }
        assert_eq!(root.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panicking_transform_suppresses_one_emission() {
        let source = Publisher::new();
        let mapped = map(source.clone(), |v: i32| {
            if v == 2 {
                panic!("cannot map two");
            }
            v * 10
        });
        let rec = Recorder::new();
        let _s = rec.record(&mapped);
        for v in 1..=3 {
            source.submit(v).unwrap();
        }
        rec.wait_last(30).await;
        assert_eq!(rec.values(), vec![10, 30]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_try_map_drops_errors() {
        let source = Publisher::new();
        let parsed = try_map(source.clone(), |s: &'static str| s.parse::<u32>());
        let rec = Recorder::new();
        let _s = rec.record(&parsed);
        for s in ["1", "x", "3"] {
            source.submit(s).unwrap();
        }
        rec.wait_last(3).await;
        assert_eq!(rec.values(), vec![1, 3]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_source_completion_completes_map() {
        let source = Publisher::with_value(1);
        let mapped = map(source.clone(), |v: i32| v);
        let rec = Recorder::new();
        let _s = rec.record(&mapped);
        source.complete();
        rec.wait_completed().await;
        assert!(mapped.is_completed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resubscribe_replays_latest_source_value() {
        let source = Publisher::with_value(1);
        let mapped = map(source.clone(), |v: i32| v * 100);
        let first = Recorder::new();
        let s = first.record(&mapped);
        first.wait_last(100).await;
        s.cancel();

        source.submit(2).unwrap();
        settle().await;
        assert_eq!(mapped.latest(), Some(100));

        let second = Recorder::new();
        let _s2 = second.record(&mapped);
        second.wait_last(200).await;
    }
}
