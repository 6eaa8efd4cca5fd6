//! # Reduce: incremental aggregation over N sources.
//!
//! Keeps a running accumulator and the last value each source contributed.
//! An update from source `i` costs one `remove` and one `add`, never a rescan:
//!
//! ```text
//! source[i] ──► v ──► v == last[i] ? ──yes──► (skip)
//!                         │no
//!                         ▼
//!          acc = add(remove(acc, last[i]?), v); last[i] = v
//!                         │
//!                         ▼
//!                 output.submit(acc)
//! ```
//!
//! A source that has not produced a value yet contributes nothing, so the
//! accumulator is emitted from the first value on.
//!
//! `add` and `remove` must be inverses; that contract is the caller's.
//! A panicking `add`/`remove` leaves the accumulator and `last[i]` untouched.

use std::sync::{Arc, Mutex};

use crate::core::guard::{catch, lock};
use crate::core::lifecycle::{Attachments, Cancel, Lifecycle};
use crate::core::{Publisher, Subscribable, WeakPublisher};
use crate::error::PubSubError;
use crate::subscribers::Subscriber;

struct Accumulator<T, A> {
    epoch: u64,
    identity: A,
    acc: A,
    last: Vec<Option<T>>,
    done: Vec<bool>,
}

struct ReduceNode<S, T, A: Send + 'static, Add, Rem> {
    sources: Vec<S>,
    add: Add,
    remove: Rem,
    output: WeakPublisher<A>,
    state: Mutex<Accumulator<T, A>>,
    attachments: Attachments,
}

impl<S, T, A, Add, Rem> ReduceNode<S, T, A, Add, Rem>
where
    S: Subscribable<T>,
    T: Clone + PartialEq + Send + 'static,
    A: Clone + Send + 'static,
    Add: Fn(&A, &T) -> A + Send + Sync + 'static,
    Rem: Fn(&A, &T) -> A + Send + Sync + 'static,
{
    fn on_value(&self, epoch: u64, index: usize, value: T) {
        let mut st = lock(&self.state);
        if st.epoch != epoch || st.last[index].as_ref() == Some(&value) {
            return;
        }
        let folded = catch(|| {
            let base = match &st.last[index] {
                Some(old) => (self.remove)(&st.acc, old),
                None => st.acc.clone(),
            };
            (self.add)(&base, &value)
        });
        match folded {
            Ok(acc) => {
                st.acc = acc;
                st.last[index] = Some(value);
            }
            Err(reason) => {
                let err = PubSubError::TransformFailed {
                    stage: "reduce",
                    reason,
                };
                tracing::warn!(source = index, label = err.as_label(), "{err}");
                return;
            }
        }
        if let Err(err) = self.output.submit(st.acc.clone()) {
            tracing::debug!(stage = "reduce", "dropped value: {err}");
        }
    }

    fn on_done(&self, epoch: u64, index: usize) {
        let finished = {
            let mut st = lock(&self.state);
            if st.epoch != epoch {
                return;
            }
            st.done[index] = true;
            st.done.iter().all(|d| *d)
        };
        if finished {
            self.output.complete();
        }
    }
}

impl<S, T, A, Add, Rem> Lifecycle for ReduceNode<S, T, A, Add, Rem>
where
    S: Subscribable<T>,
    T: Clone + PartialEq + Send + 'static,
    A: Clone + Send + 'static,
    Add: Fn(&A, &T) -> A + Send + Sync + 'static,
    Rem: Fn(&A, &T) -> A + Send + Sync + 'static,
{
    fn after_subscribe(self: Arc<Self>) {
        let n = self.sources.len();
        let epoch = {
            let mut st = lock(&self.state);
            st.epoch += 1;
            st.acc = st.identity.clone();
            st.last = vec![None; n];
            st.done = vec![false; n];
            st.epoch
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
                            .named("reduce"),
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

/// Aggregates `sources` incrementally with `add`/`remove`, starting from `identity`.
///
/// Emits the accumulator after every effective change, starting with the first
/// value any source produces.
/// No sources: a one-shot `identity`.
///
/// # Example
/// ```rust
/// use livepub::{Publisher, reduce};
///
/// # #[tokio::main]
/// # async fn main() {
/// let seats: Vec<_> = (0..3).map(|_| Publisher::with_value(1u32)).collect();
/// let total = reduce(
///     seats.clone(),
///     0u32,
///     |acc: &u32, v: &u32| acc + v,
///     |acc: &u32, v: &u32| acc - v,
/// );
/// let _sub = total.subscribe(|t| println!("total seats: {t}"));
/// seats[0].submit(4).unwrap();
/// # }
/// ```
pub fn reduce<S, T, A, Add, Rem>(sources: Vec<S>, identity: A, add: Add, remove: Rem) -> Publisher<A>
where
    S: Subscribable<T>,
    T: Clone + PartialEq + Send + 'static,
    A: Clone + Send + 'static,
    Add: Fn(&A, &T) -> A + Send + Sync + 'static,
    Rem: Fn(&A, &T) -> A + Send + Sync + 'static,
{
    if sources.is_empty() {
        return Publisher::one_shot(identity);
    }
    let n = sources.len();
    Publisher::with_hooks(|output| {
        Arc::new(ReduceNode {
            sources,
            add,
            remove,
            output,
            state: Mutex::new(Accumulator {
                epoch: 0,
                acc: identity.clone(),
                identity,
                last: vec![None; n],
                done: vec![false; n],
            }),
            attachments: Attachments::new("reduce"),
        })
    })
}
