//! # Merge: combine-latest over two sources of different types.
//!
//! ```text
//! left  ──► slot L ─┐
//!                   ├─ both filled? ──► f(&L, &R) ──► output
//! right ──► slot R ─┘
//! ```
//!
//! Completes once both sources completed.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::core::guard::{catch, lock};
use crate::core::lifecycle::{Attachments, Cancel, Lifecycle};
use crate::core::{Publisher, Subscribable, WeakPublisher};
use crate::error::PubSubError;
use crate::subscribers::Subscriber;

struct Slots<A, B> {
    epoch: u64,
    left: Option<A>,
    right: Option<B>,
    left_done: bool,
    right_done: bool,
}

enum Side<A, B> {
    Left(A),
    Right(B),
}

struct MergeNode<SA, SB, A, B, U: Send + 'static, F> {
    left: SA,
    right: SB,
    f: F,
    output: WeakPublisher<U>,
    slots: Mutex<Slots<A, B>>,
    attachments: Attachments,
    _items: PhantomData<fn(A, B)>,
}

impl<SA, SB, A, B, U, F> MergeNode<SA, SB, A, B, U, F>
where
    SA: Subscribable<A>,
    SB: Subscribable<B>,
    A: Send + 'static,
    B: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(&A, &B) -> U + Send + Sync + 'static,
{
    fn on_value(&self, epoch: u64, value: Side<A, B>) {
        let mut slots = lock(&self.slots);
        if slots.epoch != epoch {
            return;
        }
        match value {
            Side::Left(a) => slots.left = Some(a),
            Side::Right(b) => slots.right = Some(b),
        }
        let (Some(a), Some(b)) = (&slots.left, &slots.right) else {
            return;
        };
        match catch(|| (self.f)(a, b)) {
            Ok(merged) => {
                if let Err(err) = self.output.submit(merged) {
                    tracing::debug!(stage = "merge", "dropped value: {err}");
                }
            }
            Err(reason) => {
                let err = PubSubError::TransformFailed {
                    stage: "merge",
                    reason,
                };
                tracing::warn!(label = err.as_label(), "{err}");
            }
        }
    }

    fn on_done(&self, epoch: u64, left: bool) {
        let finished = {
            let mut slots = lock(&self.slots);
            if slots.epoch != epoch {
                return;
            }
            if left {
                slots.left_done = true;
            } else {
                slots.right_done = true;
            }
            slots.left_done && slots.right_done
        };
        if finished {
            self.output.complete();
        }
    }
}

impl<SA, SB, A, B, U, F> Lifecycle for MergeNode<SA, SB, A, B, U, F>
where
    SA: Subscribable<A>,
    SB: Subscribable<B>,
    A: Send + 'static,
    B: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(&A, &B) -> U + Send + Sync + 'static,
{
    fn after_subscribe(self: Arc<Self>) {
        let epoch = {
            let mut slots = lock(&self.slots);
            slots.epoch += 1;
            slots.left = None;
            slots.right = None;
            slots.left_done = false;
            slots.right_done = false;
            slots.epoch
        };
        self.attachments.attach(|| {
            let (next, done) = (Arc::clone(&self), Arc::clone(&self));
            let left = self.left.subscribe_arc(Arc::new(
                Subscriber::new(move |a: A| next.on_value(epoch, Side::Left(a)))
                    .on_complete(move || done.on_done(epoch, true))
                    .named("merge-left"),
            ));
            let (next, done) = (Arc::clone(&self), Arc::clone(&self));
            let right = self.right.subscribe_arc(Arc::new(
                Subscriber::new(move |b: B| next.on_value(epoch, Side::Right(b)))
                    .on_complete(move || done.on_done(epoch, false))
                    .named("merge-right"),
            ));
            vec![
                Box::new(left) as Box<dyn Cancel>,
                Box::new(right) as Box<dyn Cancel>,
            ]
        });
    }

    fn after_unsubscribe(self: Arc<Self>) {
        self.attachments.detach();
    }
}

/// Emits `f(left, right)` whenever either side changes, once both have a value.
pub fn merge<SA, SB, A, B, U, F>(left: SA, right: SB, f: F) -> Publisher<U>
where
    SA: Subscribable<A>,
    SB: Subscribable<B>,
    A: Send + 'static,
    B: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(&A, &B) -> U + Send + Sync + 'static,
{
    Publisher::with_hooks(|output| {
        Arc::new(MergeNode {
            left,
            right,
            f,
            output,
            slots: Mutex::new(Slots {
                epoch: 0,
                left: None,
                right: None,
                left_done: false,
                right_done: false,
            }),
            attachments: Attachments::new("merge"),
            _items: PhantomData,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorder, settle};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_merge_waits_for_both_sides() {
        let votes = Publisher::new();
        let seats = Publisher::new();
        let label = merge(votes.clone(), seats.clone(), |v: &u32, s: &&str| {
            format!("{v} votes, {s}")
        });
        let rec = Recorder::new();
        let _s = rec.record(&label);

        votes.submit(10).unwrap();
        settle().await;
        assert!(rec.values().is_empty());

        seats.submit("held").unwrap();
        rec.wait_last("10 votes, held".to_string()).await;
        votes.submit(12).unwrap();
        rec.wait_last("12 votes, held".to_string()).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_merge_completes_after_both_sources() {
        let left = Publisher::with_value(1);
        let right = Publisher::with_value(2);
        let sum = merge(left.clone(), right.clone(), |a: &i32, b: &i32| a + b);
        let rec = Recorder::new();
        let _s = rec.record(&sum);
        rec.wait_last(3).await;

        left.complete();
        settle().await;
        assert!(!rec.is_completed());

        right.submit(5).unwrap();
        rec.wait_last(6).await;
        right.complete();
        rec.wait_completed().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_merge_refcounts_both_upstreams() {
        let left = Publisher::with_value(1);
        let right = Publisher::with_value(2);
        let sum = merge(left.clone(), right.clone(), |a: &i32, b: &i32| a + b);
        let a = sum.subscribe(|_| {});
        let b = sum.subscribe(|_| {});
        assert_eq!((left.subscriber_count(), right.subscriber_count()), (1, 1));
        a.cancel();
        b.cancel();
        assert_eq!((left.subscriber_count(), right.subscriber_count()), (0, 0));
    }
}
