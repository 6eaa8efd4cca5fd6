//! Error types used by publishers, subscriptions and combinators.
//!
//! All failures are local to the publisher or subscription where they occur:
//! - [`PubSubError::AlreadyCompleted`] is returned to the caller of `submit`;
//! - [`PubSubError::InvalidRequest`] is delivered to the offending subscriber only;
//! - [`PubSubError::TransformFailed`] and [`PubSubError::SubscriberPanicked`] are
//!   logged and the single emission is suppressed, the pipeline keeps running.
//!
//! Both helpers (`as_label`, `as_message`) exist for logs/metrics.

use thiserror::Error;

/// # Errors produced by the value-propagation engine.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PubSubError {
    /// `submit` was called on a publisher that has already completed.
    #[error("publisher already completed; submit rejected")]
    AlreadyCompleted,

    /// `request(n)` was called with a non-positive amount.
    #[error("invalid request of {requested} items; demand must be positive")]
    InvalidRequest {
        /// The amount that was requested.
        requested: u64,
    },

    /// A map/reduce function failed for one value; that emission was dropped.
    #[error("transform failed in {stage}: {reason}")]
    TransformFailed {
        /// Combinator that ran the function (`map`, `reduce`, ...).
        stage: &'static str,
        /// Panic message or error text.
        reason: String,
    },

    /// A subscriber callback panicked while handling a signal.
    #[error("subscriber {subscriber} panicked: {info}")]
    SubscriberPanicked {
        /// Subscriber name as reported by `Subscribe::name`.
        subscriber: &'static str,
        /// Panic message.
        info: String,
    },
}

impl PubSubError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use livepub::PubSubError;
    ///
    /// let err = PubSubError::InvalidRequest { requested: 0 };
    /// assert_eq!(err.as_label(), "invalid_request");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PubSubError::AlreadyCompleted => "already_completed",
            PubSubError::InvalidRequest { .. } => "invalid_request",
            PubSubError::TransformFailed { .. } => "transform_failed",
            PubSubError::SubscriberPanicked { .. } => "subscriber_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            PubSubError::AlreadyCompleted => "submit after complete".to_string(),
            PubSubError::InvalidRequest { requested } => format!("requested={requested}"),
            PubSubError::TransformFailed { stage, reason } => format!("{stage}: {reason}"),
            PubSubError::SubscriberPanicked { subscriber, info } => {
                format!("subscriber={subscriber} info={info}")
            }
        }
    }

    /// Indicates whether the error is a caller contract violation
    /// (as opposed to a failure inside user code that was contained).
    ///
    /// # Example
    /// ```
    /// use livepub::PubSubError;
    ///
    /// assert!(PubSubError::AlreadyCompleted.is_contract_violation());
    /// let failed = PubSubError::TransformFailed { stage: "map", reason: "boom".into() };
    /// assert!(!failed.is_contract_violation());
    /// ```
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            PubSubError::AlreadyCompleted | PubSubError::InvalidRequest { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(PubSubError::AlreadyCompleted.as_label(), "already_completed");
        assert_eq!(
            PubSubError::TransformFailed {
                stage: "map",
                reason: "x".into()
            }
            .as_label(),
            "transform_failed"
        );
        assert_eq!(
            PubSubError::SubscriberPanicked {
                subscriber: "ui",
                info: "x".into()
            }
            .as_label(),
            "subscriber_panicked"
        );
    }

    #[test]
    fn test_display_includes_details() {
        let err = PubSubError::TransformFailed {
            stage: "reduce",
            reason: "overflow".into(),
        };
        assert_eq!(err.to_string(), "transform failed in reduce: overflow");
        assert_eq!(err.as_message(), "reduce: overflow");
    }
}
