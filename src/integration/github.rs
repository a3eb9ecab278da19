/// GitHub integration: repository monitoring triggers and issue creation
///
/// OAuth-backed. Triggers poll the REST API and treat an item as "new" when
/// its server-side creation time is strictly after the Area's last-checked
/// bound.

use crate::area::config::{ActionKind, ReactionKind};
use crate::config::ProviderCredentials;
use crate::error::EngineError;
use crate::integration::schema::{ActionDefinition, FieldDefinition, FieldKind, ReactionDefinition};
use crate::integration::{OAuthConfig, ReactionCredential, ServiceIntegration, TriggerEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "areaflow";

#[derive(Debug, Deserialize)]
struct Issue {
    number: i64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    user: Option<User>,
    /// Present when an item from the issues API is actually a pull request
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: i64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

/// GitHub service integration
pub struct GitHubIntegration {
    http: reqwest::Client,
    credentials: ProviderCredentials,
}

impl GitHubIntegration {
    pub fn new(http: reqwest::Client, credentials: ProviderCredentials) -> Self {
        Self { http, credentials }
    }

    async fn fetch_new_issues(
        &self,
        owner: &str,
        repo: &str,
        token: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<TriggerEvent>, EngineError> {
        let url = format!(
            "{API_BASE}/repos/{owner}/{repo}/issues?state=all&sort=created&direction=desc&per_page=20"
        );
        let issues: Vec<Issue> = self.get_json(&url, token).await?;

        // The issues API interleaves pull requests; drop them here.
        let newest = issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .find(|issue| issue.created_at > since);

        Ok(newest.map(|issue| {
            let author = issue
                .user
                .map(|u| u.login)
                .unwrap_or_else(|| "unknown".to_string());
            TriggerEvent::new(
                format!("New issue #{}: {}", issue.number, issue.title),
                issue.created_at,
            )
            .with_value("issue_number", issue.number.to_string())
            .with_value("issue_title", issue.title)
            .with_value("issue_body", issue.body.unwrap_or_default())
            .with_value("issue_url", issue.html_url)
            .with_value("issue_author", author)
            .with_value("repository", format!("{owner}/{repo}"))
        }))
    }

    async fn fetch_new_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        token: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<TriggerEvent>, EngineError> {
        let url = format!(
            "{API_BASE}/repos/{owner}/{repo}/pulls?state=all&sort=created&direction=desc&per_page=20"
        );
        let pulls: Vec<PullRequest> = self.get_json(&url, token).await?;

        let newest = pulls.into_iter().find(|pr| pr.created_at > since);

        Ok(newest.map(|pr| {
            let author = pr
                .user
                .map(|u| u.login)
                .unwrap_or_else(|| "unknown".to_string());
            TriggerEvent::new(
                format!("New pull request #{}: {}", pr.number, pr.title),
                pr.created_at,
            )
            .with_value("pr_number", pr.number.to_string())
            .with_value("pr_title", pr.title)
            .with_value("pr_body", pr.body.unwrap_or_default())
            .with_value("pr_url", pr.html_url)
            .with_value("pr_author", author)
            .with_value("repository", format!("{owner}/{repo}"))
        }))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
    ) -> Result<T, EngineError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::IntegrationCall(format!(
                "GitHub API returned {status} for {url}"
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ServiceIntegration for GitHubIntegration {
    fn service_id(&self) -> &'static str {
        "github"
    }

    fn service_name(&self) -> &'static str {
        "GitHub"
    }

    fn service_description(&self) -> &'static str {
        "Monitor repositories and automate issue creation"
    }

    fn actions(&self) -> Vec<ActionDefinition> {
        let repository_field = || {
            FieldDefinition::builder("repository", FieldKind::Select)
                .label("Repository")
                .required()
                .description("Repository to monitor (format: owner/repo)")
                .build()
        };
        vec![
            ActionDefinition::builder("github.issue_created", "New Issue Created")
                .description("Triggers when a new issue is created in a repository")
                .field(repository_field())
                .build(),
            ActionDefinition::builder("github.pr_created", "New Pull Request Created")
                .description("Triggers when a new pull request is created in a repository")
                .field(repository_field())
                .build(),
        ]
    }

    fn reactions(&self) -> Vec<ReactionDefinition> {
        vec![ReactionDefinition::builder("github.create_issue", "Create Issue")
            .description("Create a new issue with templated content")
            .field(
                FieldDefinition::builder("repository", FieldKind::Select)
                    .label("Repository")
                    .required()
                    .description("Target repository (format: owner/repo)")
                    .build(),
            )
            .field(
                FieldDefinition::builder("issueTitle", FieldKind::String)
                    .label("Issue Title")
                    .required()
                    .description("Title of the issue (supports {{placeholder}} substitution)")
                    .build(),
            )
            .field(
                FieldDefinition::builder("issueBody", FieldKind::Text)
                    .label("Issue Body")
                    .description("Body of the issue (supports {{placeholder}} substitution)")
                    .build(),
            )
            .field(
                FieldDefinition::builder("labels", FieldKind::String)
                    .label("Labels")
                    .description("Comma-separated list of labels (e.g. 'bug,urgent')")
                    .build(),
            )
            .build()]
    }

    fn oauth_config(&self) -> Option<OAuthConfig> {
        Some(OAuthConfig {
            client_id: self.credentials.client_id.clone(),
            client_secret: self.credentials.client_secret.clone(),
            authorization_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            redirect_uri: self.credentials.redirect_uri.clone(),
            scopes: vec!["repo".to_string()],
        })
    }

    async fn check_trigger(
        &self,
        action: &ActionKind,
        access_token: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<Option<TriggerEvent>, EngineError> {
        let ActionKind::GitHub(config) = action else {
            return Ok(None);
        };
        let token = access_token.ok_or_else(|| {
            EngineError::IntegrationCall("GitHub trigger check requires an access token".to_string())
        })?;

        match config.action_type.as_str() {
            "issue_created" => {
                self.fetch_new_issues(
                    &config.repository_owner,
                    &config.repository_name,
                    token,
                    since,
                )
                .await
            }
            "pr_created" => {
                self.fetch_new_pull_requests(
                    &config.repository_owner,
                    &config.repository_name,
                    token,
                    since,
                )
                .await
            }
            other => Err(EngineError::IntegrationCall(format!(
                "unsupported GitHub trigger type: {other}"
            ))),
        }
    }

    async fn execute_reaction(
        &self,
        reaction: &ReactionKind,
        credential: &ReactionCredential,
        _event: &TriggerEvent,
    ) -> Result<(), EngineError> {
        let ReactionKind::GitHub(config) = reaction else {
            return Err(EngineError::IntegrationCall(
                "GitHub integration received a non-GitHub reaction config".to_string(),
            ));
        };
        let ReactionCredential::OAuth(token) = credential else {
            return Err(EngineError::IntegrationCall(
                "GitHub reaction requires an OAuth access token".to_string(),
            ));
        };
        if config.reaction_type != "create_issue" {
            return Err(EngineError::IntegrationCall(format!(
                "unsupported GitHub reaction type: {}",
                config.reaction_type
            )));
        }

        let labels: Vec<&str> = config
            .labels
            .as_deref()
            .map(|raw| raw.split(',').map(str::trim).filter(|l| !l.is_empty()).collect())
            .unwrap_or_default();

        let url = format!(
            "{API_BASE}/repos/{}/{}/issues",
            config.repository_owner, config.repository_name
        );
        let body = json!({
            "title": config.issue_title.as_deref().unwrap_or("Automated issue"),
            "body": config.issue_body.as_deref().unwrap_or_default(),
            "labels": labels,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::IntegrationCall(format!(
                "GitHub issue creation returned {status}"
            )));
        }

        tracing::debug!(
            "Created issue in {}/{}",
            config.repository_owner,
            config.repository_name
        );
        Ok(())
    }
}
