/// Gmail integration: new-mail trigger with field-matching filters
///
/// OAuth-backed, trigger-only. The email_received check searches the
/// user's mailbox with a query built from the configured filters plus an
/// `after:` bound, then inspects the newest hit's metadata for the
/// substitution payload.

use crate::area::config::ActionKind;
use crate::config::ProviderCredentials;
use crate::error::EngineError;
use crate::integration::schema::{ActionDefinition, FieldDefinition, FieldKind, ReactionDefinition};
use crate::integration::{OAuthConfig, ServiceIntegration, TriggerEvent};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    #[serde(default)]
    snippet: String,
    /// Millisecond epoch as a string
    internal_date: String,
    payload: MessagePayload,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

impl Message {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn received_at(&self) -> Option<DateTime<Utc>> {
        let millis: i64 = self.internal_date.parse().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }
}

/// Gmail service integration
pub struct GmailIntegration {
    http: reqwest::Client,
    credentials: ProviderCredentials,
}

impl GmailIntegration {
    pub fn new(http: reqwest::Client, credentials: ProviderCredentials) -> Self {
        Self { http, credentials }
    }

    /// Build the Gmail search query for the configured filters and the
    /// freshness bound.
    fn build_query(config: &crate::area::config::GmailActionConfig, since: DateTime<Utc>) -> String {
        let mut parts = Vec::new();
        if let Some(label) = &config.label {
            parts.push(format!("label:{label}"));
        }
        if let Some(from) = &config.from_address {
            parts.push(format!("from:{from}"));
        }
        if let Some(subject) = &config.subject_contains {
            parts.push(format!("subject:\"{subject}\""));
        }
        // Gmail's after: operator has second granularity.
        parts.push(format!("after:{}", since.timestamp()));
        parts.join(" ")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
    ) -> Result<T, EngineError> {
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::IntegrationCall(format!(
                "Gmail API returned {status} for {url}"
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ServiceIntegration for GmailIntegration {
    fn service_id(&self) -> &'static str {
        "gmail"
    }

    fn service_name(&self) -> &'static str {
        "Gmail"
    }

    fn service_description(&self) -> &'static str {
        "Watch a mailbox for new messages matching simple filters"
    }

    fn actions(&self) -> Vec<ActionDefinition> {
        vec![ActionDefinition::builder("gmail.email_received", "New Email Received")
            .description("Triggers when a new email matching the filters arrives")
            .field(
                FieldDefinition::builder("label", FieldKind::String)
                    .label("Label")
                    .description("Only match messages with this Gmail label")
                    .build(),
            )
            .field(
                FieldDefinition::builder("fromAddress", FieldKind::String)
                    .label("From")
                    .description("Only match messages from this sender")
                    .build(),
            )
            .field(
                FieldDefinition::builder("subjectContains", FieldKind::String)
                    .label("Subject contains")
                    .description("Only match messages whose subject contains this text")
                    .build(),
            )
            .build()]
    }

    fn reactions(&self) -> Vec<ReactionDefinition> {
        Vec::new()
    }

    fn oauth_config(&self) -> Option<OAuthConfig> {
        Some(OAuthConfig {
            client_id: self.credentials.client_id.clone(),
            client_secret: self.credentials.client_secret.clone(),
            authorization_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            redirect_uri: self.credentials.redirect_uri.clone(),
            scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
        })
    }

    async fn check_trigger(
        &self,
        action: &ActionKind,
        access_token: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Option<TriggerEvent>, EngineError> {
        let ActionKind::Gmail(config) = action else {
            return Ok(None);
        };
        let token = access_token.ok_or_else(|| {
            EngineError::IntegrationCall("Gmail trigger check requires an access token".to_string())
        })?;

        let query = Self::build_query(config, since);
        let list_url = format!(
            "{API_BASE}/messages?q={}&maxResults=10",
            urlencode(&query)
        );
        let list: MessageList = self.get_json(&list_url, token).await?;

        // Results are newest-first; the first strictly-newer hit wins.
        for message_ref in list.messages {
            let detail_url = format!(
                "{API_BASE}/messages/{}?format=metadata&metadataHeaders=From&metadataHeaders=Subject",
                message_ref.id
            );
            let message: Message = self.get_json(&detail_url, token).await?;
            let Some(received_at) = message.received_at() else {
                continue;
            };
            if received_at <= since {
                continue;
            }

            let from = message.header("From").unwrap_or("unknown").to_string();
            let subject = message.header("Subject").unwrap_or("(no subject)").to_string();
            let event = TriggerEvent::new(format!("New email: {subject}"), received_at)
                .with_value("from", from)
                .with_value("subject", subject)
                .with_value("snippet", message.snippet.clone());
            return Ok(Some(event));
        }

        Ok(None)
    }
}

/// Percent-encode a Gmail search query for use in a URL query parameter.
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::config::GmailActionConfig;
    use chrono::TimeZone;

    #[test]
    fn query_combines_filters_and_freshness_bound() {
        let config = GmailActionConfig {
            label: Some("INBOX".to_string()),
            from_address: Some("boss@example.com".to_string()),
            subject_contains: Some("urgent".to_string()),
        };
        let since = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        let query = GmailIntegration::build_query(&config, since);
        assert_eq!(
            query,
            format!(
                "label:INBOX from:boss@example.com subject:\"urgent\" after:{}",
                since.timestamp()
            )
        );
    }

    #[test]
    fn empty_config_still_bounds_by_time() {
        let since = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let query = GmailIntegration::build_query(&GmailActionConfig::default(), since);
        assert_eq!(query, format!("after:{}", since.timestamp()));
    }

    #[test]
    fn urlencode_escapes_query_characters() {
        assert_eq!(urlencode("label:INBOX after:123"), "label%3AINBOX%20after%3A123");
    }
}
