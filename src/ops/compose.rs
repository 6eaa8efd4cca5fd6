//! # Compose / switch-latest: follow the most recent inner publisher.
//!
//! ```text
//! outer ──► inner₁ ──► subscribe(inner₁, generation 1) ──► output
//!       ──► inner₂ ──► cancel inner₁; subscribe(inner₂, generation 2) ──► output
//!                       inner₁ values now fail the generation check
//! ```
//!
//! ## Rules
//! - The switch (generation bump + resubscribe) and every forwarded value run
//!   under the node lock, so once inner₂ took over nothing from inner₁ can reach
//!   the output, even if inner₁ emits concurrently.
//! - Completion needs the outer source **and** the current inner to complete.
//!   A superseded inner completing is ignored; an outer that completes before
//!   emitting any inner completes the output.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::core::guard::lock;
use crate::core::lifecycle::{Attachments, Cancel, Lifecycle};
use crate::core::{Publisher, Subscribable, Subscription, WeakPublisher};
use crate::ops::map;
use crate::subscribers::Subscriber;

struct Switch<T: Send + 'static> {
    epoch: u64,
    generation: u64,
    inner: Option<Subscription<T>>,
    outer_done: bool,
    inner_done: bool,
}

struct SwitchNode<S, I, T: Send + 'static> {
    outer: S,
    output: WeakPublisher<T>,
    switch: Mutex<Switch<T>>,
    attachments: Attachments,
    _inner: PhantomData<fn(I)>,
}

impl<S, I, T> SwitchNode<S, I, T>
where
    S: Subscribable<I>,
    I: Subscribable<T>,
    T: Clone + Send + 'static,
{
    fn on_inner_publisher(self: &Arc<Self>, epoch: u64, inner: I) {
        let superseded = {
            let mut sw = lock(&self.switch);
            if sw.epoch != epoch {
                return;
            }
            sw.generation += 1;
            sw.inner_done = false;
            let generation = sw.generation;
            let superseded = sw.inner.take();

            let (next, done) = (Arc::clone(self), Arc::clone(self));
            let subscription = inner.subscribe_arc(Arc::new(
                Subscriber::new(move |v: T| next.on_inner_value(epoch, generation, v))
                    .on_complete(move || done.on_inner_done(epoch, generation))
                    .named("switch-inner"),
            ));
            sw.inner = Some(subscription);
            tracing::debug!(generation, "switched inner publisher");
            superseded
        };
        if let Some(superseded) = superseded {
            superseded.cancel();
        }
    }

    fn on_inner_value(&self, epoch: u64, generation: u64, value: T) {
        let sw = lock(&self.switch);
        if sw.epoch != epoch || sw.generation != generation {
            return;
        }
        if let Err(err) = self.output.submit(value) {
            tracing::debug!(stage = "switch_latest", "dropped value: {err}");
        }
    }

    fn on_inner_done(&self, epoch: u64, generation: u64) {
        let finished = {
            let mut sw = lock(&self.switch);
            if sw.epoch != epoch || sw.generation != generation {
                return;
            }
            sw.inner_done = true;
            sw.outer_done
        };
        if finished {
            self.output.complete();
        }
    }

    fn on_outer_done(&self, epoch: u64) {
        let finished = {
            let mut sw = lock(&self.switch);
            if sw.epoch != epoch {
                return;
            }
            sw.outer_done = true;
            sw.inner_done
        };
        if finished {
            self.output.complete();
        }
    }
}

impl<S, I, T> Lifecycle for SwitchNode<S, I, T>
where
    S: Subscribable<I>,
    I: Subscribable<T>,
    T: Clone + Send + 'static,
{
    fn after_subscribe(self: Arc<Self>) {
        let epoch = {
            let mut sw = lock(&self.switch);
            sw.epoch += 1;
            sw.outer_done = false;
            sw.inner_done = true;
            sw.epoch
        };
        self.attachments.attach(|| {
            let (next, done) = (Arc::clone(&self), Arc::clone(&self));
            let outer = self.outer.subscribe_arc(Arc::new(
                Subscriber::new(move |inner: I| next.on_inner_publisher(epoch, inner))
                    .on_complete(move || done.on_outer_done(epoch))
                    .named("switch-outer"),
            ));
            vec![Box::new(outer) as Box<dyn Cancel>]
        });
    }

    fn after_unsubscribe(self: Arc<Self>) {
        self.attachments.detach();
        let inner = {
            let mut sw = lock(&self.switch);
            sw.epoch += 1;
            sw.inner.take()
        };
        if let Some(inner) = inner {
            inner.cancel();
        }
    }
}

/// Flattens a publisher of publishers, always following the latest inner one.
pub fn switch_latest<S, I, T>(outer: S) -> Publisher<T>
where
    S: Subscribable<I>,
    I: Subscribable<T>,
    T: Clone + Send + 'static,
{
    Publisher::with_hooks(|output| {
        Arc::new(SwitchNode {
            outer,
            output,
            switch: Mutex::new(Switch {
                epoch: 0,
                generation: 0,
                inner: None,
                outer_done: false,
                inner_done: true,
            }),
            attachments: Attachments::new("switch_latest"),
            _inner: PhantomData,
        })
    })
}

/// Maps every value to a publisher and follows the latest one.
///
/// # Example
/// ```rust
/// use livepub::{Publisher, compose};
///
/// # #[tokio::main]
/// # async fn main() {
/// let north = Publisher::with_value("north: 12 seats");
/// let south = Publisher::with_value("south: 7 seats");
/// let selected = Publisher::with_value(0u8);
///
/// let (n, s) = (north.clone(), south.clone());
/// let panel = compose(selected.clone(), move |i: u8| if i == 0 { n.clone() } else { s.clone() });
/// let _sub = panel.subscribe(|line| println!("{line}"));
/// selected.submit(1).unwrap();
/// # }
/// ```
pub fn compose<S, T, I, U, F>(source: S, f: F) -> Publisher<U>
where
    S: Subscribable<T>,
    T: Send + 'static,
    I: Subscribable<U> + Clone,
    U: Clone + Send + 'static,
    F: Fn(T) -> I + Send + Sync + 'static,
{
    switch_latest(map(source, f))
}
