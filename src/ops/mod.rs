//! # Combinators.
//!
//! Every combinator is a [`Publisher`] whose core carries lifecycle hooks: it
//! subscribes to its upstream(s) when it gains its first subscriber and cancels
//! them when it loses its last. Its output keeps the usual replay cache, so late
//! subscribers of a derived value see the latest derived value.
//!
//! | Combinator          | Upstreams          | Emits                                        |
//! |---------------------|--------------------|----------------------------------------------|
//! | [`map()`]           | 1                  | `f(v)` per value                             |
//! | [`try_map()`]       | 1                  | `f(v)` when it returns `Ok`                  |
//! | [`map_async()`]     | 1                  | result of the newest input's future          |
//! | [`map_blocking()`]  | 1                  | `f(v)` run on the blocking pool, newest wins |
//! | [`merge()`]         | 2 (mixed types)    | `f(&l, &r)` once both have a value           |
//! | [`combine()`]       | N                  | `Vec` of latest values once all have one     |
//! | [`reduce()`]        | N                  | incrementally folded accumulator             |
//! | [`switch_latest()`] | outer of inners    | values of the most recent inner              |
//! | [`compose()`]       | 1                  | `switch_latest(map(source, f))`              |
//!
//! ## Rules
//! - Node state is guarded by one mutex per node; emission into the output
//!   happens under it so concurrent upstream deliveries cannot reorder results.
//! - Completion into the output is signalled after that mutex is released.
//! - Transform failures are logged and suppress one emission.
//! - Each (re)attachment starts a new epoch; callbacks from an older attachment
//!   are ignored.

mod combine;
mod compose;
mod map;
mod map_async;
mod merge;
mod reduce;

pub use combine::combine;
pub use compose::{compose, switch_latest};
pub use map::{map, try_map};
pub use map_async::{map_async, map_blocking};
pub use merge::merge;
pub use reduce::reduce;

use crate::core::{Publisher, Subscribable};

impl<T: Clone + Send + 'static> Publisher<T> {
    /// See [`map()`].
    pub fn map<U, F>(&self, f: F) -> Publisher<U>
    where
        U: Clone + Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        map(self.clone(), f)
    }

    /// See [`try_map()`].
    pub fn try_map<U, E, F>(&self, f: F) -> Publisher<U>
    where
        U: Clone + Send + 'static,
        E: std::fmt::Display,
        F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
    {
        try_map(self.clone(), f)
    }

    /// See [`map_async()`].
    pub fn map_async<U, F, Fut>(&self, f: F) -> Publisher<U>
    where
        U: Clone + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = U> + Send + 'static,
    {
        map_async(self.clone(), f)
    }

    /// See [`map_blocking()`].
    pub fn map_blocking<U, F>(&self, f: F) -> Publisher<U>
    where
        U: Clone + Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        map_blocking(self.clone(), f)
    }

    /// See [`merge()`]; `self` is the left side.
    pub fn merge<B, U, SB, F>(&self, right: SB, f: F) -> Publisher<U>
    where
        B: Send + 'static,
        U: Clone + Send + 'static,
        SB: Subscribable<B>,
        F: Fn(&T, &B) -> U + Send + Sync + 'static,
    {
        merge(self.clone(), right, f)
    }

    /// See [`compose()`].
    pub fn compose<I, U, F>(&self, f: F) -> Publisher<U>
    where
        I: Subscribable<U> + Clone,
        U: Clone + Send + 'static,
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        compose(self.clone(), f)
    }
}

impl<T: Clone + Send + 'static> Publisher<Publisher<T>> {
    /// See [`switch_latest()`].
    pub fn switch_latest(&self) -> Publisher<T> {
        switch_latest(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_method_chain_builds_one_pipeline() {
        let turnout = Publisher::with_value(600u32);
        let electorate = Publisher::with_value(1000u32);
        let percent = turnout
            .merge(electorate.clone(), |t: &u32, e: &u32| t * 100 / e)
            .map(|p: u32| format!("{p}%"));
        let rec = Recorder::new();
        let _s = rec.record(&percent);
        rec.wait_last("60%".to_string()).await;

        turnout.submit(750).unwrap();
        rec.wait_last("75%".to_string()).await;
        assert_eq!(electorate.subscriber_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_switch_latest_method() {
        let first = Publisher::with_value('a');
        let outer = Publisher::with_value(first);
        let rec = Recorder::new();
        let _s = rec.record(&outer.switch_latest());
        rec.wait_last('a').await;

        outer.submit(Publisher::with_value('b')).unwrap();
        rec.wait_last('b').await;
    }
}
