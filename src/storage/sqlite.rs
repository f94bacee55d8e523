use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::Storage;
use crate::config::DatabaseConfig;
use crate::decision::Payload;
use crate::error::{StorageError, StorageResult};
use crate::observer::{DecisionRecord, Session, SessionCounters, SUCCESS_KEY};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        Self::connect(options, config.max_connections).await
    }

    /// Private in-memory database; a single connection keeps it alive.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        Self::connect(options, 1).await
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save_session(&self, session: &Session) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, started_at, ended_at, total_tokens, total_time, success_count, failure_count)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                started_at = excluded.started_at,
                ended_at = excluded.ended_at,
                total_tokens = excluded.total_tokens,
                total_time = excluded.total_time,
                success_count = excluded.success_count,
                failure_count = excluded.failure_count
            "#,
        )
        .bind(&session.id)
        .bind(session.started_at.to_rfc3339())
        .bind(session.ended_at.map(|t| t.to_rfc3339()))
        .bind(to_i64(session.counters.total_tokens))
        .bind(session.counters.total_time)
        .bind(to_i64(session.counters.success_count))
        .bind(to_i64(session.counters.failure_count))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM decisions WHERE session_id = ?")
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;

        for (seq, decision) in session.decisions.iter().enumerate() {
            let success = decision.metadata.get(SUCCESS_KEY).and_then(|v| v.as_bool());

            sqlx::query(
                r#"
                INSERT INTO decisions (session_id, seq, agent_id, timestamp, inputs, outputs, metadata, success)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&session.id)
            .bind(seq as i64)
            .bind(&decision.agent_id)
            .bind(decision.timestamp.to_rfc3339())
            .bind(serde_json::to_string(&decision.inputs)?)
            .bind(serde_json::to_string(&decision.outputs)?)
            .bind(serde_json::to_string(&decision.metadata)?)
            .bind(success)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            session_id = %session.id,
            decisions = session.decisions.len(),
            "Session saved"
        );
        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, started_at, ended_at, total_tokens, total_time, success_count, failure_count
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let decisions = self.get_session_decisions(id).await?;
        let mut session = Session::try_from(row)?;
        session.decisions = decisions;
        Ok(Some(session))
    }

    async fn get_session_decisions(&self, session_id: &str) -> StorageResult<Vec<DecisionRecord>> {
        let rows: Vec<DecisionRow> = sqlx::query_as(
            r#"
            SELECT agent_id, timestamp, inputs, outputs, metadata
            FROM decisions
            WHERE session_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DecisionRecord::try_from).collect()
    }

    async fn list_session_ids(&self) -> StorageResult<Vec<String>> {
        let ids: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM sessions ORDER BY started_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn agent_success_rates(
        &self,
        agent_id: Option<&str>,
    ) -> StorageResult<BTreeMap<String, f64>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT agent_id,
                   COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0) AS successes,
                   COUNT(*) AS total
            FROM decisions
            WHERE ?1 IS NULL OR agent_id = ?1
            GROUP BY agent_id
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|(_, _, total)| *total > 0)
            .map(|(agent, successes, total)| (agent, successes as f64 / total as f64))
            .collect())
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Query {
            message: format!("Invalid timestamp '{}': {}", value, e),
        })
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    started_at: String,
    ended_at: Option<String>,
    total_tokens: i64,
    total_time: f64,
    success_count: i64,
    failure_count: i64,
}

impl TryFrom<SessionRow> for Session {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> StorageResult<Self> {
        Ok(Self {
            started_at: parse_timestamp(&row.started_at)?,
            ended_at: row.ended_at.as_deref().map(parse_timestamp).transpose()?,
            decisions: Vec::new(),
            counters: SessionCounters {
                total_tokens: row.total_tokens.max(0) as u64,
                total_time: row.total_time,
                success_count: row.success_count.max(0) as u64,
                failure_count: row.failure_count.max(0) as u64,
            },
            id: row.id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DecisionRow {
    agent_id: String,
    timestamp: String,
    inputs: String,
    outputs: String,
    metadata: String,
}

impl TryFrom<DecisionRow> for DecisionRecord {
    type Error = StorageError;

    fn try_from(row: DecisionRow) -> StorageResult<Self> {
        Ok(Self {
            timestamp: parse_timestamp(&row.timestamp)?,
            inputs: serde_json::from_str::<Payload>(&row.inputs)?,
            outputs: serde_json::from_str::<Payload>(&row.outputs)?,
            metadata: serde_json::from_str::<Payload>(&row.metadata)?,
            agent_id: row.agent_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Observer;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        serde_json::from_value(value).unwrap()
    }

    fn recorded_session(name: &str) -> Session {
        let observer = Observer::new();
        let handle = observer.open_session(Some(name)).unwrap();
        observer
            .track_decision(
                &handle,
                "agentA",
                payload(json!({"task": "triage", "z": 1, "a": 2})),
                payload(json!({"result": "escalate"})),
                Some(payload(json!({"success": true, "response_time": 1.25, "token_usage": 40}))),
            )
            .unwrap();
        observer
            .track_decision(
                &handle,
                "agentB",
                Payload::new(),
                payload(json!({"error": "timeout"})),
                Some(payload(json!({"success": false}))),
            )
            .unwrap();
        observer.close_session(&handle).unwrap();
        observer.session(name).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get_session_round_trip() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let session = recorded_session("s1");

        storage.save_session(&session).await.unwrap();
        let loaded = storage.get_session("s1").await.unwrap().unwrap();

        assert_eq!(loaded, session);
        let keys: Vec<_> = loaded.decisions[0].inputs.keys().cloned().collect();
        assert_eq!(keys, vec!["task", "z", "a"]);
    }

    #[tokio::test]
    async fn test_get_missing_session() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        assert!(storage.get_session("nope").await.unwrap().is_none());
        assert!(storage.get_session_decisions("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_session_replaces_decisions() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let mut session = recorded_session("s1");
        storage.save_session(&session).await.unwrap();

        session.decisions.truncate(1);
        storage.save_session(&session).await.unwrap();

        let decisions = storage.get_session_decisions("s1").await.unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].agent_id, "agentA");
        assert_eq!(storage.list_session_ids().await.unwrap(), vec!["s1"]);
    }

    #[tokio::test]
    async fn test_open_session_persists_without_end() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let observer = Observer::new();
        observer.open_session(Some("live")).unwrap();
        let session = observer.session("live").unwrap();

        storage.save_session(&session).await.unwrap();
        let loaded = storage.get_session("live").await.unwrap().unwrap();
        assert!(loaded.ended_at.is_none());
        assert_eq!(loaded.started_at, session.started_at);
    }

    #[tokio::test]
    async fn test_agent_success_rates() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        storage.save_session(&recorded_session("s1")).await.unwrap();
        storage.save_session(&recorded_session("s2")).await.unwrap();

        let rates = storage.agent_success_rates(None).await.unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates["agentA"], 1.0);
        assert_eq!(rates["agentB"], 0.0);

        let only_a = storage.agent_success_rates(Some("agentA")).await.unwrap();
        assert_eq!(only_a.keys().collect::<Vec<_>>(), vec!["agentA"]);
        assert!(storage
            .agent_success_rates(Some("ghost"))
            .await
            .unwrap()
            .is_empty());
    }
}
