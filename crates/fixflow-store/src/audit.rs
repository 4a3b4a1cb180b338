//! Append-only audit sink for automated sweep actions.
//!
//! The sink is a fire-and-forget collaborator: callers log a failed
//! `record` and move on, so losing an audit entry never blocks or rolls
//! back the state mutation that triggered it. There are no update or
//! delete paths.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fixflow_types::{AuditAction, AuditEvent, AuditQuery};
use rusqlite::{params, Connection};
use tokio::sync::RwLock;

use crate::{slice_page, StoreError, StoreResult};

/// Async contract for the audit trail.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one event.
    async fn record(&self, event: AuditEvent) -> StoreResult<()>;
    /// Reads events matching the filter, newest first.
    async fn query(&self, query: AuditQuery) -> StoreResult<Vec<AuditEvent>>;
}

fn event_matches_query(event: &AuditEvent, query: &AuditQuery) -> bool {
    query
        .tenant_id
        .as_deref()
        .is_none_or(|tenant| event.tenant_id == tenant)
        && query.action.is_none_or(|action| event.action == action)
        && query
            .entity_id
            .as_deref()
            .is_none_or(|entity| event.entity_id == entity)
        && query.since.is_none_or(|since| event.recorded_at >= since)
        && query.until.is_none_or(|until| event.recorded_at <= until)
}

/// In-memory implementation for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> StoreResult<()> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn query(&self, query: AuditQuery) -> StoreResult<Vec<AuditEvent>> {
        let events = self.events.read().await;
        let matched: Vec<AuditEvent> = events
            .iter()
            .rev()
            .filter(|event| event_matches_query(event, &query))
            .cloned()
            .collect();
        Ok(slice_page(matched, query.offset, query.limit))
    }
}

/// Persistent SQLite-backed audit sink.
#[derive(Debug)]
pub struct SqliteAuditSink {
    db_path: PathBuf,
}

impl SqliteAuditSink {
    /// Creates a sink at `path`, creating schema if needed. The audit table
    /// can share a database file with `SqliteIssueStore`; each value opens
    /// its own connections.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let sink = Self { db_path };
        let connection = sink.open_connection()?;
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                audit_row_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                detail_json TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_tenant
                ON audit_events (tenant_id, audit_row_id);
            "#,
        )?;
        Ok(sink)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )?;
        Ok(connection)
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(&self, event: AuditEvent) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO audit_events (tenant_id, action, entity_id, detail_json, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                event.tenant_id,
                audit_action_to_db(event.action),
                event.entity_id,
                serde_json::to_string(&event.detail)?,
                timestamp_to_db(event.recorded_at),
            ],
        )?;
        Ok(())
    }

    async fn query(&self, query: AuditQuery) -> StoreResult<Vec<AuditEvent>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT tenant_id, action, entity_id, detail_json, recorded_at
            FROM audit_events
            ORDER BY audit_row_id DESC
            "#,
        )?;
        let mut rows = statement.query([])?;

        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            let event = AuditEvent {
                tenant_id: row.get(0)?,
                action: audit_action_from_db(&row.get::<_, String>(1)?)?,
                entity_id: row.get(2)?,
                detail: serde_json::from_str(&row.get::<_, String>(3)?)?,
                recorded_at: timestamp_from_db(&row.get::<_, String>(4)?)?,
            };
            if event_matches_query(&event, &query) {
                events.push(event);
            }
        }
        Ok(slice_page(events, query.offset, query.limit))
    }
}

fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn timestamp_from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn audit_action_to_db(action: AuditAction) -> &'static str {
    match action {
        AuditAction::SlaResponseBreach => "sla_response_breach",
        AuditAction::SlaResolutionBreach => "sla_resolution_breach",
        AuditAction::IssueAutoClosed => "issue_auto_closed",
    }
}

fn audit_action_from_db(value: &str) -> StoreResult<AuditAction> {
    match value {
        "sla_response_breach" => Ok(AuditAction::SlaResponseBreach),
        "sla_resolution_breach" => Ok(AuditAction::SlaResolutionBreach),
        "issue_auto_closed" => Ok(AuditAction::IssueAutoClosed),
        _ => Err(StoreError::InvalidPersistedValue {
            field: "audit_action",
            value: value.to_string(),
        }),
    }
}
