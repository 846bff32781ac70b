use thiserror::Error;

/// Failure taxonomy for the classification and workflow engine.
///
/// None of these are fatal to a run: matching errors degrade to non-matches
/// with a diagnostic, and action errors are captured into the workflow log.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed regex in a match rule. Fails closed (no match) and is
    /// surfaced to the administrator as a configuration warning.
    #[error("invalid regex pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// An action references an entity that no longer exists in the catalog.
    #[error("unknown {kind} id {id}")]
    UnknownEntityReference { kind: &'static str, id: i64 },

    /// An external call (auto scorer, webhook, email) exceeded its budget.
    #[error("{what} timed out after {seconds}s")]
    ExternalTimeout { what: &'static str, seconds: u64 },

    /// Webhook non-2xx response or SMTP delivery failure.
    #[error("delivery failed: {0}")]
    TransportFailure(String),

    /// An action payload that should have been rejected at save time,
    /// e.g. an email action with no recipients.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
}
