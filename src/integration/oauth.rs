/// OAuth connection management with refresh-on-demand
///
/// Given a stored ServiceConnection, hands out a currently-valid access
/// token, transparently refreshing against the provider's token endpoint
/// when the stored token is expired or inside the skew window.
///
/// Concurrency: many Area evaluations may share one connection. Reads go
/// through a lock-free ArcSwap snapshot; a per-connection async mutex
/// serializes refreshes, and a double-check after acquiring it collapses
/// concurrent refresh attempts into one network round trip. Authorization-
/// code exchange (the user-facing OAuth flow) is not handled here.

use crate::area::store::ConnectionStore;
use crate::area::types::ServiceConnection;
use crate::error::EngineError;
use arc_swap::ArcSwap;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// OAuth 2.0 endpoints and client credentials for one provider
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorization_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Wire shape of a token endpoint refresh response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Per-connection shared state: lock-free token snapshot + refresh gate
struct ConnectionHandle {
    snapshot: ArcSwap<ServiceConnection>,
    refresh_gate: Mutex<()>,
}

/// Hands out valid access tokens for stored connections
pub struct ConnectionManager {
    store: ConnectionStore,
    http: reqwest::Client,
    /// Refresh when expiry is closer than this
    skew: Duration,
    handles: Mutex<HashMap<i64, Arc<ConnectionHandle>>>,
}

impl ConnectionManager {
    pub fn new(store: ConnectionStore, http: reqwest::Client, skew: Duration) -> Self {
        Self {
            store,
            http,
            skew,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Current snapshot of a connection (tokens may be stale; use
    /// `valid_access_token` when a usable OAuth token is needed).
    pub async fn connection(&self, connection_id: i64) -> Result<Arc<ServiceConnection>, EngineError> {
        let handle = self.handle(connection_id).await?;
        Ok(handle.snapshot.load_full())
    }

    /// Return a currently-valid access token for the connection,
    /// refreshing it first when expired or near-expiry.
    pub async fn valid_access_token(
        &self,
        connection_id: i64,
        oauth: &OAuthConfig,
    ) -> Result<String, EngineError> {
        let handle = self.handle(connection_id).await?;

        // Fast path: lock-free snapshot read.
        let snapshot = handle.snapshot.load_full();
        if !snapshot.needs_refresh(self.skew, Utc::now()) {
            if let Some(token) = snapshot.access_token.clone() {
                return Ok(token);
            }
        }

        // Slow path: serialize refreshes per connection.
        let _gate = handle.refresh_gate.lock().await;

        // Double-check: a concurrent evaluation may have refreshed while
        // we waited on the gate.
        let snapshot = handle.snapshot.load_full();
        if !snapshot.needs_refresh(self.skew, Utc::now()) {
            if let Some(token) = snapshot.access_token.clone() {
                return Ok(token);
            }
        }

        self.refresh(&handle, &snapshot, oauth).await
    }

    async fn refresh(
        &self,
        handle: &ConnectionHandle,
        connection: &ServiceConnection,
        oauth: &OAuthConfig,
    ) -> Result<String, EngineError> {
        let refresh_token = connection.refresh_token.as_deref().ok_or(
            EngineError::ReauthorizationRequired {
                connection_id: connection.id,
            },
        )?;

        if oauth.client_id.is_empty() || oauth.client_secret.is_empty() {
            // No client credentials configured: fall back to whatever
            // token is stored rather than failing the whole evaluation.
            tracing::warn!(
                "OAuth client credentials not configured for connection {}, skipping refresh",
                connection.id
            );
            return connection.access_token.clone().ok_or(
                EngineError::ReauthorizationRequired {
                    connection_id: connection.id,
                },
            );
        }

        tracing::info!("Refreshing access token for connection {}", connection.id);

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", oauth.client_id.as_str()),
            ("client_secret", oauth.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        let response = self
            .http
            .post(&oauth.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED
        {
            // The provider rejected the refresh token itself; only a new
            // user authorization can recover this connection.
            tracing::warn!(
                "Refresh token rejected for connection {} (status {})",
                connection.id,
                status
            );
            return Err(EngineError::ReauthorizationRequired {
                connection_id: connection.id,
            });
        }
        if !status.is_success() {
            return Err(EngineError::IntegrationCall(format!(
                "token refresh for connection {} failed with status {}",
                connection.id, status
            )));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));

        // Persist, then swap the snapshot so concurrent readers see the
        // new token atomically.
        self.store
            .update_tokens(connection.id, &token.access_token, expires_at)
            .await
            .map_err(EngineError::Storage)?;

        let mut updated = connection.clone();
        updated.access_token = Some(token.access_token.clone());
        updated.expires_at = expires_at;
        handle.snapshot.store(Arc::new(updated));

        tracing::info!("Refreshed access token for connection {}", connection.id);
        Ok(token.access_token)
    }

    /// Get or create the shared handle for a connection, loading it from
    /// the store on first use.
    async fn handle(&self, connection_id: i64) -> Result<Arc<ConnectionHandle>, EngineError> {
        {
            let handles = self.handles.lock().await;
            if let Some(handle) = handles.get(&connection_id) {
                return Ok(Arc::clone(handle));
            }
        }

        let connection = self
            .store
            .get_connection(connection_id)
            .await
            .map_err(EngineError::Storage)?
            .ok_or_else(|| {
                EngineError::IntegrationCall(format!("connection {connection_id} not found"))
            })?;

        let mut handles = self.handles.lock().await;
        let handle = handles
            .entry(connection_id)
            .or_insert_with(|| {
                Arc::new(ConnectionHandle {
                    snapshot: ArcSwap::new(Arc::new(connection)),
                    refresh_gate: Mutex::new(()),
                })
            });
        Ok(Arc::clone(handle))
    }

    /// Drop the cached handle for a deleted connection.
    pub async fn forget(&self, connection_id: i64) {
        self.handles.lock().await.remove(&connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::store::NewConnection;

    async fn manager_with_connection(
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> (ConnectionManager, i64) {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = ConnectionStore::new(pool);
        store.init_schema().await.unwrap();
        let conn = store
            .create_connection(NewConnection {
                service_id: "github".to_string(),
                access_token: Some("stored-token".to_string()),
                refresh_token: Some("refresh".to_string()),
                expires_at,
                metadata: None,
            })
            .await
            .unwrap();
        let manager = ConnectionManager::new(
            store,
            reqwest::Client::new(),
            Duration::seconds(60),
        );
        (manager, conn.id)
    }

    fn oauth() -> OAuthConfig {
        OAuthConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            authorization_url: "https://example.com/authorize".to_string(),
            token_url: "https://example.com/token".to_string(),
            redirect_uri: "https://example.com/callback".to_string(),
            scopes: vec![],
        }
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_refresh() {
        let future = Utc::now() + Duration::hours(1);
        let (manager, id) = manager_with_connection(Some(future)).await;

        let token = manager.valid_access_token(id, &oauth()).await.unwrap();
        assert_eq!(token, "stored-token");
    }

    #[tokio::test]
    async fn token_without_expiry_is_assumed_valid() {
        let (manager, id) = manager_with_connection(None).await;

        let token = manager.valid_access_token(id, &oauth()).await.unwrap();
        assert_eq!(token, "stored-token");
    }

    #[tokio::test]
    async fn unknown_connection_is_an_error() {
        let (manager, _) = manager_with_connection(None).await;
        let err = manager.valid_access_token(999, &oauth()).await.unwrap_err();
        assert!(matches!(err, EngineError::IntegrationCall(_)));
    }

    #[tokio::test]
    async fn unconfigured_client_falls_back_to_stored_token() {
        // Expired token but no client credentials: the stored token is
        // returned rather than failing the evaluation.
        let past = Utc::now() - Duration::hours(1);
        let (manager, id) = manager_with_connection(Some(past)).await;

        let mut unconfigured = oauth();
        unconfigured.client_id.clear();
        unconfigured.client_secret.clear();

        let token = manager.valid_access_token(id, &unconfigured).await.unwrap();
        assert_eq!(token, "stored-token");
    }
}
