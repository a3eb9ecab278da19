/// Discord integration: webhook message delivery
///
/// Reaction-only and credential-light: no OAuth, just a webhook URL taken
/// from the reaction config or from the connection metadata. The URL is
/// validated against Discord's webhook endpoint shape before any request
/// leaves the process.

use crate::area::config::ReactionKind;
use crate::error::EngineError;
use crate::integration::schema::{ActionDefinition, FieldDefinition, FieldKind, ReactionDefinition};
use crate::integration::{ReactionCredential, ServiceIntegration, TriggerEvent};
use async_trait::async_trait;
use serde_json::json;

const WEBHOOK_HOSTS: [&str; 2] = ["discord.com", "discordapp.com"];

/// Check that a URL points at a Discord webhook endpoint.
///
/// Accepts `https://discord.com/api/webhooks/{id}/{token}` (and the
/// discordapp.com alias); rejects everything else so misconfigured Areas
/// cannot be used to POST arbitrary payloads at arbitrary hosts.
pub fn is_valid_webhook_url(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("https://") else {
        return false;
    };
    let Some((host, path)) = rest.split_once('/') else {
        return false;
    };
    if !WEBHOOK_HOSTS.contains(&host) {
        return false;
    }
    let Some(webhook_path) = path.strip_prefix("api/webhooks/") else {
        return false;
    };
    // Expect "{id}/{token}" with both segments present.
    matches!(
        webhook_path.split_once('/'),
        Some((id, token)) if !id.is_empty() && !token.is_empty()
    )
}

/// Discord service integration
pub struct DiscordIntegration {
    http: reqwest::Client,
}

impl DiscordIntegration {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ServiceIntegration for DiscordIntegration {
    fn service_id(&self) -> &'static str {
        "discord"
    }

    fn service_name(&self) -> &'static str {
        "Discord"
    }

    fn service_description(&self) -> &'static str {
        "Send messages to Discord channels through webhooks"
    }

    fn actions(&self) -> Vec<ActionDefinition> {
        Vec::new()
    }

    fn reactions(&self) -> Vec<ReactionDefinition> {
        vec![ReactionDefinition::builder("discord.send_webhook", "Send Webhook Message")
            .description("Post a templated message to a Discord channel webhook")
            .field(
                FieldDefinition::builder("webhookUrl", FieldKind::Url)
                    .label("Webhook URL")
                    .description("Discord webhook URL; may instead be stored on the connection")
                    .build(),
            )
            .field(
                FieldDefinition::builder("message", FieldKind::Text)
                    .label("Message")
                    .required()
                    .description("Message content (supports {{placeholder}} substitution)")
                    .build(),
            )
            .build()]
    }

    fn requires_oauth(&self) -> bool {
        false
    }

    fn supports_webhooks(&self) -> bool {
        true
    }

    async fn execute_reaction(
        &self,
        reaction: &ReactionKind,
        credential: &ReactionCredential,
        _event: &TriggerEvent,
    ) -> Result<(), EngineError> {
        let ReactionKind::Discord(config) = reaction else {
            return Err(EngineError::IntegrationCall(
                "Discord integration received a non-Discord reaction config".to_string(),
            ));
        };

        // Config-level URL wins; the connection-held URL is the fallback.
        let webhook_url = match (&config.webhook_url, credential) {
            (Some(url), _) => url.as_str(),
            (None, ReactionCredential::Webhook(url)) => url.as_str(),
            (None, _) => {
                return Err(EngineError::IntegrationCall(
                    "Discord reaction has no webhook URL in config or connection".to_string(),
                ))
            }
        };
        if !is_valid_webhook_url(webhook_url) {
            return Err(EngineError::IntegrationCall(
                "not a valid Discord webhook URL".to_string(),
            ));
        }

        let content = config
            .message_template
            .as_deref()
            .unwrap_or("AREA triggered");
        let response = self
            .http
            .post(webhook_url)
            .json(&json!({ "content": content }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::IntegrationCall(format!(
                "Discord webhook returned {status}"
            )));
        }

        tracing::debug!("Delivered Discord webhook message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_webhook_urls() {
        assert!(is_valid_webhook_url(
            "https://discord.com/api/webhooks/123456/abcdef-token"
        ));
        assert!(is_valid_webhook_url(
            "https://discordapp.com/api/webhooks/123456/abcdef-token"
        ));
    }

    #[test]
    fn rejects_non_webhook_urls() {
        assert!(!is_valid_webhook_url("http://discord.com/api/webhooks/1/t"));
        assert!(!is_valid_webhook_url("https://example.com/api/webhooks/1/t"));
        assert!(!is_valid_webhook_url("https://discord.com/api/channels/1"));
        assert!(!is_valid_webhook_url("https://discord.com/api/webhooks/only-id"));
        assert!(!is_valid_webhook_url("https://discord.com/api/webhooks//token"));
        assert!(!is_valid_webhook_url("not a url"));
    }
}
