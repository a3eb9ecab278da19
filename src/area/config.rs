/// Typed per-service config views
///
/// Resolved, strongly-typed views over the free-form field maps stored in
/// WorkflowData. Constructed fresh per evaluation by the workflow config
/// resolver; never persisted in this form. Each constructor applies the
/// field-shape normalization rules for its service (combined vs. legacy
/// fields) so downstream code only sees one canonical shape.

use crate::area::types::TimerActionConfig;
use serde_json::Value;
use std::collections::HashMap;

type FieldMap = HashMap<String, Value>;

fn field_str(config: &FieldMap, key: &str) -> Option<String> {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolved trigger config, one variant per recognized service
///
/// Unrecognized services resolve to `Generic` rather than erroring, so the
/// engine stays forward-compatible with integrations it has no typed view
/// for yet.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Timer(TimerActionConfig),
    GitHub(GitHubActionConfig),
    Gmail(GmailActionConfig),
    Generic(GenericConfig),
}

/// Resolved reaction config, one variant per recognized service
#[derive(Debug, Clone, PartialEq)]
pub enum ReactionKind {
    Discord(DiscordReactionConfig),
    GitHub(GitHubReactionConfig),
    Generic(GenericConfig),
}

/// Untyped fallback view for services without a dedicated config type
#[derive(Debug, Clone, PartialEq)]
pub struct GenericConfig {
    pub service: String,
    pub full_type: String,
    pub fields: HashMap<String, String>,
}

impl GenericConfig {
    pub fn from_fields(service: &str, full_type: &str, config: &FieldMap) -> Self {
        let fields = config
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        Self {
            service: service.to_string(),
            full_type: full_type.to_string(),
            fields,
        }
    }
}

/// Config for GitHub triggers (issue_created / pr_created)
///
/// Two stored shapes are tolerated for backward compatibility: a single
/// combined `repository` field ("owner/repo", split on the first `/`) and
/// the legacy `repositoryOwner`/`repositoryName` pair. The combined field
/// wins if both are present; either alone is sufficient.
#[derive(Debug, Clone, PartialEq)]
pub struct GitHubActionConfig {
    /// Trigger type without the service prefix, e.g. "issue_created"
    pub action_type: String,
    pub repository_owner: String,
    pub repository_name: String,
}

impl GitHubActionConfig {
    /// Normalize the stored field map into owner + name.
    ///
    /// Returns None when no repository can be derived from either shape.
    pub fn from_fields(action_type: &str, config: &FieldMap) -> Option<Self> {
        let (owner, name) = parse_repository_fields(config)?;
        Some(Self {
            action_type: action_type.to_string(),
            repository_owner: owner,
            repository_name: name,
        })
    }
}

/// Config for GitHub reactions (create_issue)
#[derive(Debug, Clone, PartialEq)]
pub struct GitHubReactionConfig {
    pub reaction_type: String,
    pub repository_owner: String,
    pub repository_name: String,
    pub issue_title: Option<String>,
    pub issue_body: Option<String>,
    /// Comma-separated label list
    pub labels: Option<String>,
}

impl GitHubReactionConfig {
    pub fn from_fields(reaction_type: &str, config: &FieldMap) -> Option<Self> {
        let (owner, name) = parse_repository_fields(config)?;
        Some(Self {
            reaction_type: reaction_type.to_string(),
            repository_owner: owner,
            repository_name: name,
            issue_title: field_str(config, "issueTitle"),
            issue_body: field_str(config, "issueBody"),
            labels: field_str(config, "labels"),
        })
    }
}

/// Shared repository normalization for GitHub configs.
///
/// Precedence: combined `repository` field first, legacy split fields
/// second.
fn parse_repository_fields(config: &FieldMap) -> Option<(String, String)> {
    if let Some(combined) = field_str(config, "repository") {
        if let Some((owner, name)) = combined.split_once('/') {
            if !owner.is_empty() && !name.is_empty() {
                return Some((owner.to_string(), name.to_string()));
            }
        }
        // A combined value without a slash is unusable; fall through to
        // the legacy fields rather than guessing.
    }
    let owner = field_str(config, "repositoryOwner")?;
    let name = field_str(config, "repositoryName")?;
    Some((owner, name))
}

/// Config for the Gmail email_received trigger
///
/// All filters are optional; an empty config matches every new message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GmailActionConfig {
    pub label: Option<String>,
    pub from_address: Option<String>,
    pub subject_contains: Option<String>,
}

impl GmailActionConfig {
    pub fn from_fields(config: &FieldMap) -> Self {
        Self {
            // Older clients stored the label under "labelName".
            label: field_str(config, "label").or_else(|| field_str(config, "labelName")),
            from_address: field_str(config, "fromAddress"),
            subject_contains: field_str(config, "subjectContains"),
        }
    }
}

/// Config for the Discord send_webhook reaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscordReactionConfig {
    /// Target webhook URL; may instead live in the connection metadata
    pub webhook_url: Option<String>,
    /// Message template with {{placeholder}} substitution
    pub message_template: Option<String>,
}

impl DiscordReactionConfig {
    pub fn from_fields(config: &FieldMap) -> Self {
        // Historical configs stored the template under several names;
        // first match wins.
        let message_template = ["message", "messageTemplate", "message_template", "body", "content"]
            .iter()
            .find_map(|key| field_str(config, key));
        Self {
            webhook_url: field_str(config, "webhookUrl"),
            message_template,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn github_config_splits_combined_repository_field() {
        let config = fields(&[("repository", "test-owner/test-repo")]);
        let resolved = GitHubActionConfig::from_fields("issue_created", &config).unwrap();
        assert_eq!(resolved.repository_owner, "test-owner");
        assert_eq!(resolved.repository_name, "test-repo");
        assert_eq!(resolved.action_type, "issue_created");
    }

    #[test]
    fn github_config_accepts_legacy_split_fields() {
        let config = fields(&[
            ("repositoryOwner", "legacy-owner"),
            ("repositoryName", "legacy-repo"),
        ]);
        let resolved = GitHubActionConfig::from_fields("pr_created", &config).unwrap();
        assert_eq!(resolved.repository_owner, "legacy-owner");
        assert_eq!(resolved.repository_name, "legacy-repo");
    }

    #[test]
    fn combined_repository_field_wins_over_legacy_fields() {
        let config = fields(&[
            ("repository", "new-owner/new-repo"),
            ("repositoryOwner", "legacy-owner"),
            ("repositoryName", "legacy-repo"),
        ]);
        let resolved = GitHubActionConfig::from_fields("issue_created", &config).unwrap();
        assert_eq!(resolved.repository_owner, "new-owner");
        assert_eq!(resolved.repository_name, "new-repo");
    }

    #[test]
    fn github_config_splits_on_first_slash_only() {
        let config = fields(&[("repository", "owner/nested/repo")]);
        let resolved = GitHubActionConfig::from_fields("issue_created", &config).unwrap();
        assert_eq!(resolved.repository_owner, "owner");
        assert_eq!(resolved.repository_name, "nested/repo");
    }

    #[test]
    fn github_config_requires_a_repository() {
        let config = fields(&[("repositoryOwner", "half-configured")]);
        assert!(GitHubActionConfig::from_fields("issue_created", &config).is_none());
        assert!(GitHubActionConfig::from_fields("issue_created", &FieldMap::new()).is_none());
    }

    #[test]
    fn gmail_config_tolerates_label_alias() {
        let config = fields(&[("labelName", "INBOX"), ("fromAddress", "boss@example.com")]);
        let resolved = GmailActionConfig::from_fields(&config);
        assert_eq!(resolved.label.as_deref(), Some("INBOX"));
        assert_eq!(resolved.from_address.as_deref(), Some("boss@example.com"));
        assert_eq!(resolved.subject_contains, None);
    }

    #[test]
    fn discord_template_aliases_resolve_in_precedence_order() {
        let config = fields(&[
            ("content", "from content"),
            ("messageTemplate", "from messageTemplate"),
        ]);
        let resolved = DiscordReactionConfig::from_fields(&config);
        assert_eq!(
            resolved.message_template.as_deref(),
            Some("from messageTemplate")
        );
    }
}
