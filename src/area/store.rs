/// SQLite persistence layer for Areas, connections, and execution logs
///
/// Areas keep their config envelope as a JSON column for flexibility while
/// the columns the schedulers filter and update (active, timer_config,
/// bookkeeping timestamps) stay queryable. Timestamps are stored as RFC 3339
/// TEXT.

use crate::area::types::{Area, ServiceConnection, TimerActionConfig, WorkflowData};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

/// Outcome of one Area evaluation, recorded in the execution log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failure,
    Skipped,
}

impl ExecutionStatus {
    fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
            ExecutionStatus::Skipped => "skipped",
        }
    }
}

/// One recorded evaluation outcome
#[derive(Debug, Clone)]
pub struct ExecutionLogEntry {
    pub id: String,
    pub area_id: i64,
    pub executed_at: DateTime<Utc>,
    pub status: String,
    pub message: Option<String>,
    pub duration_ms: i64,
}

/// Fields needed to create a new Area
#[derive(Debug, Clone)]
pub struct NewArea {
    pub name: String,
    pub action_type: String,
    pub action_connection_id: Option<i64>,
    pub reaction_type: String,
    pub reaction_connection_id: Option<i64>,
    pub workflow_data: WorkflowData,
    pub timer_config: Option<TimerActionConfig>,
}

/// SQLite-backed Area repository
#[derive(Debug, Clone)]
pub struct AreaStore {
    pool: SqlitePool,
}

impl AreaStore {
    /// Create new store instance with database connection
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the Area and execution-log schema
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS areas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                action_type TEXT NOT NULL,
                action_connection_id INTEGER,
                reaction_type TEXT NOT NULL,
                reaction_connection_id INTEGER,
                workflow_data JSON NOT NULL,
                timer_config JSON,
                active INTEGER NOT NULL DEFAULT 1,
                last_checked_at TEXT,
                last_fired_at TEXT,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_areas_active
            ON areas(active)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS execution_logs (
                id TEXT PRIMARY KEY,
                area_id INTEGER NOT NULL,
                executed_at TEXT NOT NULL,
                status TEXT NOT NULL,
                message TEXT,
                duration_ms INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a new Area and return it with its assigned id
    pub async fn create_area(&self, new_area: NewArea) -> Result<Area, sqlx::Error> {
        let workflow_json = to_json(&new_area.workflow_data)?;
        let timer_json = new_area
            .timer_config
            .as_ref()
            .map(to_json)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO areas (name, action_type, action_connection_id,
                               reaction_type, reaction_connection_id,
                               workflow_data, timer_config)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new_area.name)
        .bind(&new_area.action_type)
        .bind(new_area.action_connection_id)
        .bind(&new_area.reaction_type)
        .bind(new_area.reaction_connection_id)
        .bind(&workflow_json)
        .bind(&timer_json)
        .execute(&self.pool)
        .await?;

        Ok(Area {
            id: result.last_insert_rowid(),
            name: new_area.name,
            action_type: new_area.action_type,
            action_connection_id: new_area.action_connection_id,
            reaction_type: new_area.reaction_type,
            reaction_connection_id: new_area.reaction_connection_id,
            workflow_data: new_area.workflow_data,
            timer_config: new_area.timer_config,
            active: true,
            last_checked_at: None,
            last_fired_at: None,
            consecutive_failures: 0,
        })
    }

    /// Retrieve an Area by id
    pub async fn get_area(&self, id: i64) -> Result<Option<Area>, sqlx::Error> {
        let row = sqlx::query(AREA_COLUMNS_WHERE_ID)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(parse_area_row).transpose()
    }

    /// List every Area (management API)
    pub async fn list_areas(&self) -> Result<Vec<Area>, sqlx::Error> {
        let rows = sqlx::query(&format!("{AREA_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(parse_area_row).collect()
    }

    /// Active Areas whose action is timer-based (timer loop batch)
    pub async fn find_active_timer_areas(&self) -> Result<Vec<Area>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "{AREA_COLUMNS} WHERE active = 1 AND timer_config IS NOT NULL"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(parse_area_row).collect()
    }

    /// Active Areas whose action is service-backed (non-timer loop batch)
    ///
    /// Disjoint from the timer batch by construction: the split key is
    /// whether timer_config is set.
    pub async fn find_active_service_areas(&self) -> Result<Vec<Area>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "{AREA_COLUMNS} WHERE active = 1 AND timer_config IS NULL"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(parse_area_row).collect()
    }

    /// Advance the "last checked" lower bound for an Area
    pub async fn update_last_checked(
        &self,
        id: i64,
        checked_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE areas SET last_checked_at = ? WHERE id = ?")
            .bind(checked_at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a successful fire: advances both bookkeeping timestamps and
    /// resets the failure counter
    pub async fn update_after_fire(
        &self,
        id: i64,
        fired_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE areas
            SET last_fired_at = ?, last_checked_at = ?, consecutive_failures = 0
            WHERE id = ?
            "#,
        )
        .bind(fired_at.to_rfc3339())
        .bind(fired_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bump the circuit-breaker counter after a failed evaluation
    pub async fn record_failure(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE areas SET consecutive_failures = consecutive_failures + 1 WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reset the circuit-breaker counter after a clean evaluation
    pub async fn reset_failures(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE areas SET consecutive_failures = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Activate or deactivate an Area
    pub async fn set_active(&self, id: i64, active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE areas SET active = ? WHERE id = ?")
            .bind(active as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deactivate every Area that references the given connection
    ///
    /// Called when a connection is deleted so orphaned Areas stop being
    /// evaluated instead of failing on every tick.
    pub async fn deactivate_by_connection(&self, connection_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE areas SET active = 0
            WHERE action_connection_id = ? OR reaction_connection_id = ?
            "#,
        )
        .bind(connection_id)
        .bind(connection_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record one evaluation outcome. Best-effort: callers log and ignore
    /// failures here rather than failing the evaluation itself.
    pub async fn log_execution(
        &self,
        area_id: i64,
        status: ExecutionStatus,
        message: Option<&str>,
        duration_ms: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO execution_logs (id, area_id, executed_at, status, message, duration_ms)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(area_id)
        .bind(Utc::now().to_rfc3339())
        .bind(status.as_str())
        .bind(message)
        .bind(duration_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent execution log entries for an Area, newest first
    pub async fn recent_executions(
        &self,
        area_id: i64,
        limit: i64,
    ) -> Result<Vec<ExecutionLogEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, area_id, executed_at, status, message, duration_ms
            FROM execution_logs
            WHERE area_id = ?
            ORDER BY executed_at DESC
            LIMIT ?
            "#,
        )
        .bind(area_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let executed_at: String = row.get("executed_at");
                Ok(ExecutionLogEntry {
                    id: row.get("id"),
                    area_id: row.get("area_id"),
                    executed_at: parse_timestamp(&executed_at)?,
                    status: row.get("status"),
                    message: row.get("message"),
                    duration_ms: row.get("duration_ms"),
                })
            })
            .collect()
    }
}

const AREA_COLUMNS: &str = r#"
    SELECT id, name, action_type, action_connection_id,
           reaction_type, reaction_connection_id,
           workflow_data, timer_config, active,
           last_checked_at, last_fired_at, consecutive_failures
    FROM areas
"#;

const AREA_COLUMNS_WHERE_ID: &str = r#"
    SELECT id, name, action_type, action_connection_id,
           reaction_type, reaction_connection_id,
           workflow_data, timer_config, active,
           last_checked_at, last_fired_at, consecutive_failures
    FROM areas
    WHERE id = ?
"#;

fn parse_area_row(row: sqlx::sqlite::SqliteRow) -> Result<Area, sqlx::Error> {
    let workflow_json: String = row.get("workflow_data");
    let workflow_data: WorkflowData = from_json(&workflow_json)?;

    let timer_json: Option<String> = row.get("timer_config");
    let timer_config = timer_json.as_deref().map(from_json).transpose()?;

    let last_checked_at: Option<String> = row.get("last_checked_at");
    let last_fired_at: Option<String> = row.get("last_fired_at");

    Ok(Area {
        id: row.get("id"),
        name: row.get("name"),
        action_type: row.get("action_type"),
        action_connection_id: row.get("action_connection_id"),
        reaction_type: row.get("reaction_type"),
        reaction_connection_id: row.get("reaction_connection_id"),
        workflow_data,
        timer_config,
        active: row.get::<i64, _>("active") != 0,
        last_checked_at: last_checked_at.as_deref().map(parse_timestamp).transpose()?,
        last_fired_at: last_fired_at.as_deref().map(parse_timestamp).transpose()?,
        consecutive_failures: row.get("consecutive_failures"),
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Fields needed to create a new service connection
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub service_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Option<Value>,
}

/// SQLite-backed connection repository
#[derive(Debug, Clone)]
pub struct ConnectionStore {
    pool: SqlitePool,
}

impl ConnectionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the connections schema
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                service_id TEXT NOT NULL,
                access_token TEXT,
                refresh_token TEXT,
                expires_at TEXT,
                metadata JSON,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a new connection and return it with its assigned id
    pub async fn create_connection(
        &self,
        new_conn: NewConnection,
    ) -> Result<ServiceConnection, sqlx::Error> {
        let metadata_json = new_conn.metadata.as_ref().map(to_json).transpose()?;
        let result = sqlx::query(
            r#"
            INSERT INTO connections (service_id, access_token, refresh_token, expires_at, metadata)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new_conn.service_id)
        .bind(&new_conn.access_token)
        .bind(&new_conn.refresh_token)
        .bind(new_conn.expires_at.map(|t| t.to_rfc3339()))
        .bind(&metadata_json)
        .execute(&self.pool)
        .await?;

        Ok(ServiceConnection {
            id: result.last_insert_rowid(),
            service_id: new_conn.service_id,
            access_token: new_conn.access_token,
            refresh_token: new_conn.refresh_token,
            expires_at: new_conn.expires_at,
            metadata: new_conn.metadata,
        })
    }

    /// Retrieve a connection by id
    pub async fn get_connection(&self, id: i64) -> Result<Option<ServiceConnection>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, service_id, access_token, refresh_token, expires_at, metadata
            FROM connections WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let expires_at: Option<String> = row.get("expires_at");
                let metadata: Option<String> = row.get("metadata");
                Ok(Some(ServiceConnection {
                    id: row.get("id"),
                    service_id: row.get("service_id"),
                    access_token: row.get("access_token"),
                    refresh_token: row.get("refresh_token"),
                    expires_at: expires_at.as_deref().map(parse_timestamp).transpose()?,
                    metadata: metadata.as_deref().map(from_json).transpose()?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Persist refreshed tokens for a connection
    pub async fn update_tokens(
        &self,
        id: i64,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE connections SET access_token = ?, expires_at = ? WHERE id = ?")
            .bind(access_token)
            .bind(expires_at.map(|t| t.to_rfc3339()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a connection by id
    ///
    /// Callers must cascade-disable dependent Areas via
    /// `AreaStore::deactivate_by_connection`.
    pub async fn delete_connection(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
