/// Service integration layer
///
/// Every external service is modeled as one implementation of the
/// `ServiceIntegration` trait: declared actions/reactions with field
/// schemas, OAuth requirements, and the two runtime operations the
/// scheduler and dispatcher consume (trigger check, reaction execution).
/// New services plug in by implementing the trait and registering; the
/// scheduler never changes.

pub mod discord;
pub mod github;
pub mod gmail;
pub mod oauth;
pub mod registry;
pub mod schema;
pub mod timer;

use crate::area::config::{ActionKind, ReactionKind};
use crate::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub use oauth::{ConnectionManager, OAuthConfig};
pub use registry::ServiceRegistry;
pub use schema::{ActionDefinition, FieldDefinition, FieldKind, ReactionDefinition};

/// Payload captured when a trigger fires
///
/// Carries the template substitution values reactions draw from
/// (e.g. sender, subject, issue title) plus a human-readable summary for
/// the execution log.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    /// One-line description for logs ("New issue #42: ...")
    pub summary: String,
    /// Server-side creation time of the underlying event
    pub occurred_at: DateTime<Utc>,
    /// Placeholder name -> value for template rendering
    pub values: HashMap<String, String>,
}

impl TriggerEvent {
    pub fn new(summary: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            summary: summary.into(),
            occurred_at,
            values: HashMap::new(),
        }
    }

    pub fn with_value(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }
}

/// Credentials handed to an integration when executing a reaction
#[derive(Debug, Clone)]
pub enum ReactionCredential {
    /// A currently-valid OAuth access token
    OAuth(String),
    /// A static webhook URL
    Webhook(String),
    /// The reaction needs no credentials
    None,
}

/// The uniform capability contract every external service implements
///
/// Identity and schema methods are cheap and synchronous; the two runtime
/// operations suspend only at network boundaries. Implementations must be
/// safe to share across concurrent Area evaluations.
#[async_trait]
pub trait ServiceIntegration: Send + Sync {
    /// Stable lowercase identifier, the join key used everywhere else
    fn service_id(&self) -> &'static str;

    fn service_name(&self) -> &'static str;

    fn service_description(&self) -> &'static str;

    /// Actions (triggers) this service offers; empty for reaction-only
    /// services
    fn actions(&self) -> Vec<ActionDefinition>;

    /// Reactions this service offers; empty for trigger-only services
    fn reactions(&self) -> Vec<ReactionDefinition>;

    fn requires_oauth(&self) -> bool {
        true
    }

    fn supports_webhooks(&self) -> bool {
        false
    }

    /// OAuth endpoints and client credentials, when `requires_oauth`
    fn oauth_config(&self) -> Option<OAuthConfig> {
        None
    }

    /// Check whether the trigger condition holds for the given typed
    /// config. "New" means a server-side creation time strictly after
    /// `since`. Returns the newest matching event, or None.
    async fn check_trigger(
        &self,
        action: &ActionKind,
        access_token: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Option<TriggerEvent>, EngineError> {
        let _ = (action, access_token, since);
        Ok(None)
    }

    /// Execute a reaction with already-rendered fields.
    async fn execute_reaction(
        &self,
        reaction: &ReactionKind,
        credential: &ReactionCredential,
        event: &TriggerEvent,
    ) -> Result<(), EngineError> {
        let _ = (credential, event);
        Err(EngineError::IntegrationCall(format!(
            "service '{}' offers no reactions (got {:?})",
            self.service_id(),
            reaction
        )))
    }
}
