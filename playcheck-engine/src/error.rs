use std::time::Duration;
use thiserror::Error;

use crate::issue::{ErrorContext, IssueType, classify};
use crate::retry::is_retryable_message;

/// Failure raised while executing a single step.
///
/// Messages are phrased so that [`classify`] and the default retry
/// classifier pick the right bucket from the text alone.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("timeout after {}ms while {operation}", .after.as_millis())]
    Timeout {
        operation: String,
        after: Duration,
    },
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid step: {0}")]
    Validation(#[from] crate::step::StepValidationError),
    #[error("total timeout of {}ms exhausted", .budget.as_millis())]
    Budget { budget: Duration },
    #[error("{0:#}")]
    Backend(anyhow::Error),
}

impl ActionError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Configuration and validation problems never improve on retry,
    /// everything else defers to the message classifier.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::Validation(_) | Self::Budget { .. } => false,
            Self::Timeout { .. } => true,
            Self::NotFound(_) | Self::Backend(_) => is_retryable_message(&self.to_string()),
        }
    }

    #[must_use]
    pub fn issue_type(&self) -> IssueType {
        match self {
            Self::Budget { .. } => IssueType::TotalTimeout,
            Self::Validation(_) | Self::Configuration(_) => IssueType::ActionFailed,
            _ => classify(&self.to_string(), ErrorContext::Action),
        }
    }
}

impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        Self::Backend(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable_and_classified() {
        let err = ActionError::timeout("clicking start", Duration::from_millis(250));
        assert!(err.to_string().contains("timeout after 250ms"));
        assert!(err.is_retryable());
        assert_eq!(err.issue_type(), IssueType::ActionTimeout);
    }

    #[test]
    fn configuration_errors_are_final() {
        let err = ActionError::Configuration("agent mode requested without an agent".into());
        assert!(!err.is_retryable());
        assert_eq!(err.issue_type(), IssueType::ActionFailed);
    }

    #[test]
    fn backend_errors_use_message_classifier() {
        let err = ActionError::from(anyhow::anyhow!("socket hang up"));
        assert!(err.is_retryable());
        let err = ActionError::from(anyhow::anyhow!("element obscured"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn not_found_maps_to_selector_issue() {
        let err = ActionError::NotFound("start button".into());
        assert_eq!(err.issue_type(), IssueType::SelectorNotFound);
        assert!(!err.is_retryable());
    }
}
