//! # Async map: per-value transform off the delivery task.
//!
//! ```text
//! source ──► on_value(v) ──► abort previous ──► spawn f(v) ─┐
//!                                                           ▼
//!                              settle(generation) ──► output.submit(u)
//!                                   (only if no newer value arrived)
//! ```
//!
//! ## Rules
//! - Latest input wins: a new source value aborts the running computation and
//!   bumps the generation. Abort is best-effort (blocking work runs to the end),
//!   so results are additionally checked against the generation before
//!   publication.
//! - Failed or panicking computations are logged and publish nothing.
//! - Source completion completes the output once the live computation settles.

use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::AbortHandle;

use crate::core::guard::{catch, lock, panic_message};
use crate::core::lifecycle::{Attachments, Cancel, Lifecycle};
use crate::core::{Publisher, Subscribable, WeakPublisher};
use crate::error::PubSubError;
use crate::subscribers::Subscriber;

type Outcome<U> = Result<Result<U, PubSubError>, Box<dyn Any + Send>>;

struct Flight {
    epoch: u64,
    generation: u64,
    running: Option<AbortHandle>,
    source_done: bool,
}

impl Flight {
    fn abort(&mut self) {
        if let Some(running) = self.running.take() {
            running.abort();
        }
    }
}

struct AsyncMapNode<S, T, U: Send + 'static, F> {
    stage: &'static str,
    source: S,
    f: F,
    output: WeakPublisher<U>,
    flight: Mutex<Flight>,
    attachments: Attachments,
    _item: PhantomData<fn(T)>,
}

impl<S, T, U, F> AsyncMapNode<S, T, U, F>
where
    S: Subscribable<T>,
    T: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(T) -> BoxFuture<'static, Result<U, PubSubError>> + Send + Sync + 'static,
{
    fn on_value(self: &Arc<Self>, epoch: u64, value: T) {
        let mut flight = lock(&self.flight);
        if flight.epoch != epoch || flight.source_done {
            return;
        }
        flight.generation += 1;
        let generation = flight.generation;
        flight.abort();

        let fut = match catch(|| (self.f)(value)) {
            Ok(fut) => fut,
            Err(reason) => {
                self.report(PubSubError::TransformFailed {
                    stage: self.stage,
                    reason,
                });
                return;
            }
        };
        let node = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(fut).catch_unwind().await;
            node.settle(epoch, generation, outcome);
        });
        flight.running = Some(task.abort_handle());
    }

    fn settle(&self, epoch: u64, generation: u64, outcome: Outcome<U>) {
        let finish = {
            let mut flight = lock(&self.flight);
            if flight.epoch != epoch || flight.generation != generation {
                tracing::trace!(stage = self.stage, generation, "discarded stale result");
                return;
            }
            flight.running = None;
            match outcome {
                Ok(Ok(value)) => {
                    if let Err(err) = self.output.submit(value) {
                        tracing::debug!(stage = self.stage, "dropped value: {err}");
                    }
                }
                Ok(Err(err)) => self.report(err),
                Err(payload) => self.report(PubSubError::TransformFailed {
                    stage: self.stage,
                    reason: panic_message(&*payload),
                }),
            }
            flight.source_done
        };
        if finish {
            self.output.complete();
        }
    }

    fn on_done(&self, epoch: u64) {
        let idle = {
            let mut flight = lock(&self.flight);
            if flight.epoch != epoch {
                return;
            }
            flight.source_done = true;
            flight.running.is_none()
        };
        if idle {
            self.output.complete();
        }
    }

    fn report(&self, err: PubSubError) {
        tracing::warn!(stage = self.stage, label = err.as_label(), "{err}");
    }
}

impl<S, T, U, F> Lifecycle for AsyncMapNode<S, T, U, F>
where
    S: Subscribable<T>,
    T: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(T) -> BoxFuture<'static, Result<U, PubSubError>> + Send + Sync + 'static,
{
    fn after_subscribe(self: Arc<Self>) {
        let epoch = {
            let mut flight = lock(&self.flight);
            flight.abort();
            flight.epoch += 1;
            flight.source_done = false;
            flight.epoch
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
        lock(&self.flight).abort();
    }
}

fn build<S, T, U, F>(stage: &'static str, source: S, f: F) -> Publisher<U>
where
    S: Subscribable<T>,
    T: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(T) -> BoxFuture<'static, Result<U, PubSubError>> + Send + Sync + 'static,
{
    Publisher::with_hooks(|output| {
        Arc::new(AsyncMapNode {
            stage,
            source,
            f,
            output,
            flight: Mutex::new(Flight {
                epoch: 0,
                generation: 0,
                running: None,
                source_done: false,
            }),
            attachments: Attachments::new(stage),
            _item: PhantomData,
        })
    })
}

/// Maps every value through an async function; only the newest input's result
/// is published.
pub fn map_async<S, T, U, F, Fut>(source: S, f: F) -> Publisher<U>
where
    S: Subscribable<T>,
    T: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = U> + Send + 'static,
{
    build("map_async", source, move |v| f(v).map(Ok).boxed())
}

/// Runs a synchronous, possibly slow `f` on Tokio's blocking pool.
pub fn map_blocking<S, T, U, F>(source: S, f: F) -> Publisher<U>
where
    S: Subscribable<T>,
    T: Send + 'static,
    U: Clone + Send + 'static,
    F: Fn(T) -> U + Send + Sync + 'static,
{
    let f = Arc::new(f);
    build("map_blocking", source, move |v| {
        let f = Arc::clone(&f);
        async move {
            tokio::task::spawn_blocking(move || (*f)(v))
                .await
                .map_err(|e| PubSubError::TransformFailed {
                    stage: "map_blocking",
                    reason: e.to_string(),
                })
        }
        .boxed()
    })
}
