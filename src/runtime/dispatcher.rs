/// Reaction dispatch
///
/// Takes a fired trigger event and drives the Area's reaction to
/// completion: resolve the typed reaction config, render its templated
/// fields against the event payload, pick the right credential, and hand
/// off to the owning integration with a call timeout.

use crate::area::config::ReactionKind;
use crate::area::types::Area;
use crate::error::EngineError;
use crate::integration::{
    ConnectionManager, ReactionCredential, ServiceRegistry, TriggerEvent,
};
use crate::runtime::resolver;
use std::sync::Arc;
use std::time::Duration;

/// Substitute `{{placeholder}}` markers in a template with event values.
///
/// Unknown placeholders are left in the output as literal text, so a typo
/// in a template is visible in the delivered message instead of silently
/// producing an empty hole.
pub fn render_template(template: &str, event: &TriggerEvent) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let name = after_open[..end].trim();
                match event.values.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        // Keep the marker verbatim.
                        out.push_str(&rest[start..start + 2 + end + 2]);
                    }
                }
                rest = &after_open[end + 2..];
            }
            None => {
                // Unterminated marker: emit the tail as-is.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render every templated field of a resolved reaction config.
fn render_reaction(reaction: ReactionKind, event: &TriggerEvent) -> ReactionKind {
    match reaction {
        ReactionKind::Discord(mut config) => {
            config.message_template = config
                .message_template
                .map(|t| render_template(&t, event));
            ReactionKind::Discord(config)
        }
        ReactionKind::GitHub(mut config) => {
            config.issue_title = config.issue_title.map(|t| render_template(&t, event));
            config.issue_body = config.issue_body.map(|t| render_template(&t, event));
            ReactionKind::GitHub(config)
        }
        ReactionKind::Generic(mut config) => {
            for value in config.fields.values_mut() {
                *value = render_template(value, event);
            }
            ReactionKind::Generic(config)
        }
    }
}

/// Executes reactions for fired Areas
pub struct ReactionDispatcher {
    registry: Arc<ServiceRegistry>,
    connections: Arc<ConnectionManager>,
    call_timeout: Duration,
}

impl ReactionDispatcher {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        connections: Arc<ConnectionManager>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            connections,
            call_timeout,
        }
    }

    /// Run the Area's reaction for one fired trigger event.
    pub async fn dispatch(&self, area: &Area, event: &TriggerEvent) -> Result<(), EngineError> {
        let reaction = render_reaction(resolver::resolve_reaction(area)?, event);
        let service_id = area.reaction_service().to_string();
        let integration = self.registry.lookup(&service_id)?;

        let credential = match area.reaction_connection_id {
            Some(connection_id) if integration.requires_oauth() => {
                let oauth = integration.oauth_config().ok_or_else(|| {
                    EngineError::IntegrationCall(format!(
                        "service '{service_id}' requires OAuth but has no OAuth configuration"
                    ))
                })?;
                let token = self
                    .connections
                    .valid_access_token(connection_id, &oauth)
                    .await?;
                ReactionCredential::OAuth(token)
            }
            Some(connection_id) => {
                // Webhook-style connection: the credential lives in the
                // connection metadata.
                let connection = self.connections.connection(connection_id).await?;
                match connection.metadata_str("webhook_url") {
                    Some(url) => ReactionCredential::Webhook(url),
                    None => ReactionCredential::None,
                }
            }
            None => ReactionCredential::None,
        };

        tracing::debug!(
            "Dispatching reaction {} for area {} ({})",
            area.reaction_type,
            area.id,
            event.summary
        );

        tokio::time::timeout(
            self.call_timeout,
            integration.execute_reaction(&reaction, &credential, event),
        )
        .await
        .map_err(|_| {
            EngineError::IntegrationCall(format!(
                "reaction {} for area {} timed out after {:?}",
                area.reaction_type, area.id, self.call_timeout
            ))
        })?
    }
}
