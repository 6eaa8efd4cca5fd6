//! # Combine: combine-latest over N sources of one type.
//!
//! ```text
//! source[0] ──► slot[0] ─┐
//! source[1] ──► slot[1] ─┼─ all filled? ──► vec![slot[0], .., slot[n-1]] ──► output
//!    ...                 │
//! source[n] ──► slot[n] ─┘
//! ```
//!
//! ## Rules
//! - Nothing is emitted until every slot holds a value.
//! - The output completes once **every** source completed; a source finishing
//!   early is only recorded.
//! - No sources: a one-shot empty list.

use std::sync::{Arc, Mutex};

use crate::core::guard::lock;
use crate::core::lifecycle::{Attachments, Cancel, Lifecycle};
use crate::core::{Publisher, Subscribable, WeakPublisher};
use crate::subscribers::Subscriber;

struct Slots<T> {
    epoch: u64,
    values: Vec<Option<T>>,
    done: Vec<bool>,
}

struct CombineNode<S, T: Send + 'static> {
    sources: Vec<S>,
    output: WeakPublisher<Vec<T>>,
    slots: Mutex<Slots<T>>,
    attachments: Attachments,
}

impl<S, T> CombineNode<S, T>
where
    S: Subscribable<T>,
    T: Clone + Send + 'static,
{
    fn on_value(&self, epoch: u64, index: usize, value: T) {
        let mut slots = lock(&self.slots);
        if slots.epoch != epoch {
            return;
        }
        slots.values[index] = Some(value);
        let Some(latest) = slots.values.iter().cloned().collect::<Option<Vec<T>>>() else {
            return;
        };
        if let Err(err) = self.output.submit(latest) {
            tracing::debug!(stage = "combine", "dropped value: {err}");
        }
    }

    fn on_done(&self, epoch: u64, index: usize) {
        let finished = {
            let mut slots = lock(&self.slots);
            if slots.epoch != epoch {
                return;
            }
            slots.done[index] = true;
            slots.done.iter().all(|d| *d)
        };
        if finished {
            self.output.complete();
        }
    }
}

impl<S, T> Lifecycle for CombineNode<S, T>
where
    S: Subscribable<T>,
    T: Clone + Send + 'static,
{
    fn after_subscribe(self: Arc<Self>) {
        let n = self.sources.len();
        let epoch = {
            let mut slots = lock(&self.slots);
            slots.epoch += 1;
            slots.values = vec![None; n];
            slots.done = vec![false; n];
            slots.epoch
        };
        self.attachments.attach(|| {
            self.sources
                .iter()
                .enumerate()
                .map(|(index, source)| {
                    let (next, done) = (Arc::clone(&self), Arc::clone(&self));
                    let upstream = source.subscribe_arc(Arc::new(
                        Subscriber::new(move |v: T| next.on_value(epoch, index, v))
                            .on_complete(move || done.on_done(epoch, index))
                            .named("combine"),
                    ));
                    Box::new(upstream) as Box<dyn Cancel>
                })
                .collect()
        });
    }

    fn after_unsubscribe(self: Arc<Self>) {
        self.attachments.detach();
    }
}

/// Emits the latest value of every source, in source order, whenever any changes.
pub fn combine<S, T>(sources: Vec<S>) -> Publisher<Vec<T>>
where
    S: Subscribable<T>,
    T: Clone + Send + 'static,
{
    if sources.is_empty() {
        return Publisher::one_shot(Vec::new());
    }
    let n = sources.len();
    Publisher::with_hooks(|output| {
        Arc::new(CombineNode {
            sources,
            output,
            slots: Mutex::new(Slots {
                epoch: 0,
                values: vec![None; n],
                done: vec![false; n],
            }),
            attachments: Attachments::new("combine"),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorder, settle};

    fn constituencies(n: i32) -> Vec<Publisher<i32>> {
        (1..=n).map(Publisher::with_value).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_combine_emits_all_slots_in_order() {
        let sources = constituencies(10);
        let combined = combine(sources.clone());
        let rec = Recorder::new();
        let _s = rec.record(&combined);
        rec.wait_last((1..=10).collect()).await;

        sources[2].submit(30).unwrap();
        rec.wait_last(vec![1, 2, 30, 4, 5, 6, 7, 8, 9, 10]).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_combine_waits_for_every_slot() {
        let a = Publisher::with_value(1);
        let b = Publisher::new();
        let combined = combine(vec![a.clone(), b.clone()]);
        let rec = Recorder::new();
        let _s = rec.record(&combined);
        settle().await;
        assert!(rec.values().is_empty());

        b.submit(2).unwrap();
        rec.wait_last(vec![1, 2]).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_completes_only_after_every_source() {
        let sources = constituencies(4);
        let combined = combine(sources.clone());
        let rec = Recorder::new();
        let _s = rec.record(&combined);
        rec.wait_last(vec![1, 2, 3, 4]).await;

        for source in &sources[..3] {
            source.complete();
        }
        settle().await;
        assert!(!rec.is_completed());

        sources[3].complete();
        rec.wait_completed().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_early_completion_is_recorded() {
        let early = Publisher::with_value(1);
        early.complete();
        let late = Publisher::new();
        let combined = combine(vec![early, late.clone()]);
        let rec = Recorder::new();
        let _s = rec.record(&combined);

        late.submit(2).unwrap();
        rec.wait_last(vec![1, 2]).await;
        late.complete();
        rec.wait_completed().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_combine_is_one_shot() {
        let combined = combine(Vec::<Publisher<u8>>::new());
        let rec = Recorder::new();
        let _s = rec.record(&combined);
        rec.wait_completed().await;
        assert_eq!(rec.values(), vec![Vec::<u8>::new()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_combine_attaches_each_source_once() {
        let sources = constituencies(3);
        let combined = combine(sources.clone());
        let subs: Vec<_> = (0..3).map(|_| combined.subscribe(|_| {})).collect();
        assert!(sources.iter().all(|s| s.subscriber_count() == 1));
        for s in subs {
            s.cancel();
        }
        assert!(sources.iter().all(|s| s.subscriber_count() == 0));
    }
}
