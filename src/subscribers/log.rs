//! # LogWriter: value tap
//!
//! A minimal subscriber that logs every value it receives through `tracing`.
//! Use it for tests or demos to watch a derived publisher.
//!
//! ## Example output
//! ```text
//! INFO livepub: next stream="seats" value=326
//! INFO livepub: next stream="seats" value=327
//! INFO livepub: completed stream="seats"
//! ```

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::OnceLock;

use async_trait::async_trait;

use crate::core::Subscription;
use crate::error::PubSubError;
use crate::subscribers::Subscribe;

/// Value-logging subscriber.
pub struct LogWriter<T: Send + 'static> {
    stream: &'static str,
    subscription: OnceLock<Subscription<T>>,
    _item: PhantomData<fn(T)>,
}

impl<T: Send + 'static> LogWriter<T> {
    /// Construct a new [`LogWriter`] labelled `stream`.
    #[must_use]
    pub fn new(stream: &'static str) -> Self {
        Self {
            stream,
            subscription: OnceLock::new(),
            _item: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Debug + Send + 'static> Subscribe<T> for LogWriter<T> {
    fn on_subscribe(&self, subscription: Subscription<T>) {
        let _ = self.subscription.set(subscription.clone());
        subscription.request(1);
    }

    async fn on_next(&self, item: T) {
        tracing::info!(stream = self.stream, value = ?item, "next");
        if let Some(subscription) = self.subscription.get() {
            subscription.request(1);
        }
    }

    async fn on_error(&self, error: PubSubError) {
        tracing::warn!(stream = self.stream, label = error.as_label(), "error: {error}");
    }

    async fn on_complete(&self) {
        tracing::info!(stream = self.stream, "completed");
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Publisher;
    use crate::testing::wait_until;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_log_writer_pulls_until_complete() {
        let p = Publisher::new();
        let s = p.subscribe_with(LogWriter::new("seats"));
        for v in 0..5u32 {
            p.submit(v).unwrap();
        }
        p.complete();
        wait_until(|| s.is_terminated()).await;
    }
}
