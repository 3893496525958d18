//! Error types for the communication planner.

use std::time::Duration;

use crate::model::Channel;

/// Top-level error type for a planning run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Configuration-time errors. Any of these aborts a run before the first
/// customer is processed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid cost scenario '{scenario}': {reason}")]
    InvalidScenario { scenario: String, reason: String },

    #[error("Cost scenario '{0}' is not configured")]
    UnknownScenario(String),

    #[error("Invalid rule configuration: {0}")]
    InvalidRuleConfiguration(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while planning a single customer.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Customer {customer_id} opted out of mandatory channel(s) {}", join_channels(.channels))]
    IrreconcilableConstraint {
        customer_id: String,
        channels: Vec<Channel>,
    },

    #[error("Customer {customer_id} cannot receive mandatory channel {channel}")]
    UnreachableMandatoryChannel { customer_id: String, channel: Channel },

    #[error("Channel {channel} has no cost under scenario '{scenario}'")]
    UnknownChannel { channel: Channel, scenario: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PlanError {
    /// Whether this error must abort the whole run rather than skip one customer.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// External classifier failures.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Classifier timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Classifier {classifier} failed: {reason}")]
    Failed { classifier: String, reason: String },

    #[error("Invalid classifier verdict: {0}")]
    InvalidVerdict(String),
}

fn join_channels(channels: &[Channel]) -> String {
    channels
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for the planner.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irreconcilable_lists_channels() {
        let err = PlanError::IrreconcilableConstraint {
            customer_id: "C1".into(),
            channels: vec![Channel::Letter, Channel::Email],
        };
        assert_eq!(
            err.to_string(),
            "Customer C1 opted out of mandatory channel(s) letter, email"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn config_errors_are_fatal() {
        let err = PlanError::from(ConfigError::InvalidRuleConfiguration("bad".into()));
        assert!(err.is_fatal());
    }
}
