/// Engine error taxonomy
///
/// Every failure mode the trigger-evaluation core can produce. Errors raised
/// while evaluating one Area never escape that Area's unit of work; the
/// scheduler catches them, logs them, and moves on to the next Area.

use thiserror::Error;

/// Errors produced by the automation engine core.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A stored Area configuration could not be resolved into a typed
    /// per-service config (missing required fields after normalization).
    /// Recoverable: the Area is skipped for the current tick.
    #[error("config resolution failed for area {area_id}: {reason}")]
    ConfigResolution { area_id: i64, reason: String },

    /// An Area references a service id that no registered integration
    /// provides. Recoverable: the Area is skipped and logged.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// A stored config carries a field name the integration never declared.
    /// Recoverable: the field is ignored with a logged warning.
    #[error("unknown field '{field}' for service '{service}'")]
    UnknownField { service: String, field: String },

    /// Two integrations tried to register under the same service id.
    /// Startup-time programming error.
    #[error("duplicate service registration: {0}")]
    DuplicateService(String),

    /// The stored refresh token is missing or was rejected by the provider.
    /// Surfaced to the Area owner; the Area is flagged inactive rather than
    /// retried automatically.
    #[error("reauthorization required for connection {connection_id}")]
    ReauthorizationRequired { connection_id: i64 },

    /// A network/timeout/remote failure during a trigger check, token
    /// refresh, or reaction execution. Retried naturally on the next tick.
    #[error("integration call failed: {0}")]
    IntegrationCall(String),

    /// Repository/storage failure. Fatal to the current tick only; the
    /// loop resumes on its next scheduled interval.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::IntegrationCall(err.to_string())
    }
}

impl EngineError {
    /// Whether this error should flag the owning Area inactive instead of
    /// being retried on the next tick.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, EngineError::ReauthorizationRequired { .. })
    }
}
