//! SQLite-backed `IssueStore` implementation with durable persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::{
    issue_matches_query, round_percentage, slice_page, violation_to_error, Actor, Assignment,
    Category, Issue, IssueQuery, IssueStatus, NewIssue, Priority, SlaStats, StoreError,
    StoreResult, TransitionRequest,
};
use fixflow_types::{apply_assignment, apply_transition, compute_deadlines, validate_transition};

/// Persistent SQLite store backend.
#[derive(Debug)]
pub struct SqliteIssueStore {
    db_path: PathBuf,
}

const ISSUE_COLUMNS: &str = "issue_id, tenant_id, issue_number, title, description, location, \
     priority, status, category_id, created_by, assigned_to, resolution_notes, created_at, \
     sla_response_deadline, sla_resolution_deadline, assigned_at, first_response_at, resolved_at, \
     verified_at, closed_at, sla_response_breached, sla_response_breached_at, \
     sla_resolution_breached, sla_resolution_breached_at, deleted_at";

impl SqliteIssueStore {
    /// Creates a SQLite-backed store at `path`, creating schema if needed.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        Ok(store)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                category_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                sla_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS issues (
                issue_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                issue_number INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                location TEXT NOT NULL,
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                category_id TEXT NOT NULL,
                created_by TEXT NOT NULL,
                assigned_to TEXT NULL,
                resolution_notes TEXT NULL,
                created_at TEXT NOT NULL,
                sla_response_deadline TEXT NOT NULL,
                sla_resolution_deadline TEXT NOT NULL,
                assigned_at TEXT NULL,
                first_response_at TEXT NULL,
                resolved_at TEXT NULL,
                verified_at TEXT NULL,
                closed_at TEXT NULL,
                sla_response_breached INTEGER NOT NULL DEFAULT 0,
                sla_response_breached_at TEXT NULL,
                sla_resolution_breached INTEGER NOT NULL DEFAULT 0,
                sla_resolution_breached_at TEXT NULL,
                deleted_at TEXT NULL,
                UNIQUE(tenant_id, issue_number),
                FOREIGN KEY(category_id) REFERENCES categories(category_id)
            );

            CREATE INDEX IF NOT EXISTS idx_issues_response_sweep
                ON issues (status, sla_response_breached, deleted_at);
            CREATE INDEX IF NOT EXISTS idx_issues_resolution_sweep
                ON issues (status, sla_resolution_breached, deleted_at);
            CREATE INDEX IF NOT EXISTS idx_issues_tenant ON issues (tenant_id, issue_number);

            CREATE TABLE IF NOT EXISTS assignments (
                assignment_row_id INTEGER PRIMARY KEY AUTOINCREMENT,
                issue_id TEXT NOT NULL,
                assigned_to TEXT NOT NULL,
                assigned_by TEXT NOT NULL,
                assigned_at TEXT NOT NULL,
                note TEXT NULL,
                FOREIGN KEY(issue_id) REFERENCES issues(issue_id)
            );

            CREATE INDEX IF NOT EXISTS idx_assignments_issue
                ON assignments (issue_id, assignment_row_id);
            "#,
        )?;
        Ok(())
    }
}

struct IssueRow {
    issue_id: String,
    tenant_id: String,
    issue_number: i64,
    title: String,
    description: String,
    location: String,
    priority: String,
    status: String,
    category_id: String,
    created_by: String,
    assigned_to: Option<String>,
    resolution_notes: Option<String>,
    created_at: String,
    sla_response_deadline: String,
    sla_resolution_deadline: String,
    assigned_at: Option<String>,
    first_response_at: Option<String>,
    resolved_at: Option<String>,
    verified_at: Option<String>,
    closed_at: Option<String>,
    sla_response_breached: i64,
    sla_response_breached_at: Option<String>,
    sla_resolution_breached: i64,
    sla_resolution_breached_at: Option<String>,
    deleted_at: Option<String>,
}

fn issue_row(row: &Row<'_>) -> rusqlite::Result<IssueRow> {
    Ok(IssueRow {
        issue_id: row.get(0)?,
        tenant_id: row.get(1)?,
        issue_number: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        location: row.get(5)?,
        priority: row.get(6)?,
        status: row.get(7)?,
        category_id: row.get(8)?,
        created_by: row.get(9)?,
        assigned_to: row.get(10)?,
        resolution_notes: row.get(11)?,
        created_at: row.get(12)?,
        sla_response_deadline: row.get(13)?,
        sla_resolution_deadline: row.get(14)?,
        assigned_at: row.get(15)?,
        first_response_at: row.get(16)?,
        resolved_at: row.get(17)?,
        verified_at: row.get(18)?,
        closed_at: row.get(19)?,
        sla_response_breached: row.get(20)?,
        sla_response_breached_at: row.get(21)?,
        sla_resolution_breached: row.get(22)?,
        sla_resolution_breached_at: row.get(23)?,
        deleted_at: row.get(24)?,
    })
}

fn issue_from_row(row: IssueRow) -> StoreResult<Issue> {
    Ok(Issue {
        issue_id: row.issue_id,
        tenant_id: row.tenant_id,
        issue_number: i64_to_u64("issue_number", row.issue_number)?,
        title: row.title,
        description: row.description,
        location: row.location,
        priority: priority_from_db(&row.priority)?,
        status: issue_status_from_db(&row.status)?,
        category_id: row.category_id,
        created_by: row.created_by,
        assigned_to: row.assigned_to,
        resolution_notes: row.resolution_notes,
        created_at: timestamp_from_db(&row.created_at)?,
        sla_response_deadline: timestamp_from_db(&row.sla_response_deadline)?,
        sla_resolution_deadline: timestamp_from_db(&row.sla_resolution_deadline)?,
        assigned_at: option_timestamp_from_db(row.assigned_at)?,
        first_response_at: option_timestamp_from_db(row.first_response_at)?,
        resolved_at: option_timestamp_from_db(row.resolved_at)?,
        verified_at: option_timestamp_from_db(row.verified_at)?,
        closed_at: option_timestamp_from_db(row.closed_at)?,
        sla_response_breached: row.sla_response_breached != 0,
        sla_response_breached_at: option_timestamp_from_db(row.sla_response_breached_at)?,
        sla_resolution_breached: row.sla_resolution_breached != 0,
        sla_resolution_breached_at: option_timestamp_from_db(row.sla_resolution_breached_at)?,
        deleted_at: option_timestamp_from_db(row.deleted_at)?,
    })
}

fn read_issue(connection: &Connection, issue_id: &str) -> StoreResult<Option<Issue>> {
    let row = connection
        .query_row(
            &format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE issue_id = ?1"),
            params![issue_id],
            issue_row,
        )
        .optional()?;
    row.map(issue_from_row).transpose()
}

fn read_live_issue(connection: &Connection, issue_id: &str) -> StoreResult<Issue> {
    read_issue(connection, issue_id)?
        .filter(|issue| issue.deleted_at.is_none())
        .ok_or_else(|| StoreError::IssueNotFound(issue_id.to_string()))
}

fn write_issue(connection: &Connection, issue: &Issue) -> StoreResult<()> {
    connection.execute(
        r#"
        UPDATE issues
        SET status = ?1, assigned_to = ?2, resolution_notes = ?3, assigned_at = ?4,
            first_response_at = ?5, resolved_at = ?6, verified_at = ?7, closed_at = ?8,
            sla_response_breached = ?9, sla_response_breached_at = ?10,
            sla_resolution_breached = ?11, sla_resolution_breached_at = ?12, deleted_at = ?13
        WHERE issue_id = ?14
        "#,
        params![
            issue_status_to_db(issue.status),
            issue.assigned_to,
            issue.resolution_notes,
            option_timestamp_to_db(issue.assigned_at),
            option_timestamp_to_db(issue.first_response_at),
            option_timestamp_to_db(issue.resolved_at),
            option_timestamp_to_db(issue.verified_at),
            option_timestamp_to_db(issue.closed_at),
            issue.sla_response_breached as i64,
            option_timestamp_to_db(issue.sla_response_breached_at),
            issue.sla_resolution_breached as i64,
            option_timestamp_to_db(issue.sla_resolution_breached_at),
            option_timestamp_to_db(issue.deleted_at),
            issue.issue_id,
        ],
    )?;
    Ok(())
}

fn load_issues_where(connection: &Connection, predicate: &str) -> StoreResult<Vec<Issue>> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE {predicate} ORDER BY issue_id ASC");
    let mut statement = connection.prepare(&sql)?;
    let mut rows = statement.query([])?;

    let mut issues = Vec::new();
    while let Some(row) = rows.next()? {
        issues.push(issue_from_row(issue_row(row)?)?);
    }
    Ok(issues)
}

#[async_trait]
impl crate::IssueStore for SqliteIssueStore {
    async fn register_category(&self, category: Category) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO categories (category_id, tenant_id, name, sla_json)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(category_id) DO UPDATE SET
                tenant_id = excluded.tenant_id,
                name = excluded.name,
                sla_json = excluded.sla_json
            "#,
            params![
                category.category_id,
                category.tenant_id,
                category.name,
                serde_json::to_string(&category.sla)?,
            ],
        )?;
        Ok(())
    }

    async fn get_category(&self, category_id: &str) -> StoreResult<Option<Category>> {
        let connection = self.open_connection()?;
        let row: Option<(String, String, String, String)> = connection
            .query_row(
                "SELECT category_id, tenant_id, name, sla_json FROM categories WHERE category_id = ?1",
                params![category_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        row.map(|(category_id, tenant_id, name, sla_json)| -> StoreResult<Category> {
            Ok(Category {
                category_id,
                tenant_id,
                name,
                sla: serde_json::from_str(&sla_json)?,
            })
        })
        .transpose()
    }

    async fn create_issue(&self, new_issue: NewIssue) -> StoreResult<Issue> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let category_row: Option<(String, String)> = transaction
            .query_row(
                "SELECT tenant_id, sla_json FROM categories WHERE category_id = ?1",
                params![new_issue.category_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((category_tenant, sla_json)) = category_row else {
            return Err(StoreError::CategoryNotFound(new_issue.category_id));
        };
        if category_tenant != new_issue.tenant_id {
            return Err(StoreError::CategoryNotFound(new_issue.category_id));
        }

        let sla = serde_json::from_str(&sla_json)?;
        let created_at = Utc::now();
        let deadlines = compute_deadlines(&sla, new_issue.priority, created_at)?;

        // Number allocation and insert share the immediate transaction;
        // UNIQUE(tenant_id, issue_number) backs it up.
        let issue_number: i64 = transaction.query_row(
            "SELECT COALESCE(MAX(issue_number), 0) + 1 FROM issues WHERE tenant_id = ?1",
            params![new_issue.tenant_id],
            |row| row.get(0),
        )?;

        let issue_id = format!("{}:issue-{}", new_issue.tenant_id, issue_number);
        let issue = Issue::submitted(
            issue_id,
            i64_to_u64("issue_number", issue_number)?,
            new_issue,
            deadlines,
            created_at,
        );

        transaction.execute(
            &format!(
                "INSERT INTO issues ({ISSUE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, \
                 ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)"
            ),
            params![
                issue.issue_id,
                issue.tenant_id,
                issue_number,
                issue.title,
                issue.description,
                issue.location,
                priority_to_db(issue.priority),
                issue_status_to_db(issue.status),
                issue.category_id,
                issue.created_by,
                issue.assigned_to,
                issue.resolution_notes,
                timestamp_to_db(issue.created_at),
                timestamp_to_db(issue.sla_response_deadline),
                timestamp_to_db(issue.sla_resolution_deadline),
                option_timestamp_to_db(issue.assigned_at),
                option_timestamp_to_db(issue.first_response_at),
                option_timestamp_to_db(issue.resolved_at),
                option_timestamp_to_db(issue.verified_at),
                option_timestamp_to_db(issue.closed_at),
                issue.sla_response_breached as i64,
                option_timestamp_to_db(issue.sla_response_breached_at),
                issue.sla_resolution_breached as i64,
                option_timestamp_to_db(issue.sla_resolution_breached_at),
                option_timestamp_to_db(issue.deleted_at),
            ],
        )?;
        transaction.commit()?;
        Ok(issue)
    }

    async fn get_issue(&self, issue_id: &str) -> StoreResult<Option<Issue>> {
        let connection = self.open_connection()?;
        Ok(read_issue(&connection, issue_id)?.filter(|issue| issue.deleted_at.is_none()))
    }

    async fn query_issues(&self, query: IssueQuery) -> StoreResult<Vec<Issue>> {
        let connection = self.open_connection()?;
        let mut issues = load_issues_where(&connection, "deleted_at IS NULL")?;
        issues.retain(|issue| issue_matches_query(issue, &query));
        issues.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| left.issue_id.cmp(&right.issue_id))
        });
        Ok(slice_page(issues, query.offset, query.limit))
    }

    async fn transition_issue(
        &self,
        issue_id: &str,
        next: IssueStatus,
        actor: &Actor,
        request: TransitionRequest,
    ) -> StoreResult<Issue> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut issue = read_live_issue(&transaction, issue_id)?;
        if issue.tenant_id != actor.tenant_id {
            return Err(StoreError::IssueNotFound(issue_id.to_string()));
        }

        validate_transition(&issue, next, actor, &request)
            .map_err(|violation| violation_to_error(issue.status, next, violation))?;
        apply_transition(&mut issue, next, request, Utc::now());

        write_issue(&transaction, &issue)?;
        transaction.commit()?;
        Ok(issue)
    }

    async fn assign_issue(
        &self,
        issue_id: &str,
        assignee: &Actor,
        assigner: &Actor,
        note: Option<String>,
    ) -> StoreResult<Issue> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut issue = read_live_issue(&transaction, issue_id)?;
        if issue.tenant_id != assigner.tenant_id {
            return Err(StoreError::IssueNotFound(issue_id.to_string()));
        }
        if issue.status.is_terminal() {
            return Err(StoreError::Validation(
                "closed issues cannot be assigned".to_string(),
            ));
        }
        if assignee.tenant_id != issue.tenant_id || !assignee.role.can_receive_assignments() {
            return Err(StoreError::InvalidAssignee(assignee.user_id.clone()));
        }

        let now = Utc::now();
        transaction.execute(
            r#"
            INSERT INTO assignments (issue_id, assigned_to, assigned_by, assigned_at, note)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                issue_id,
                assignee.user_id,
                assigner.user_id,
                timestamp_to_db(now),
                note,
            ],
        )?;

        apply_assignment(&mut issue, &assignee.user_id, now);
        write_issue(&transaction, &issue)?;
        transaction.commit()?;
        Ok(issue)
    }

    async fn list_assignments(&self, issue_id: &str) -> StoreResult<Vec<Assignment>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            r#"
            SELECT issue_id, assigned_to, assigned_by, assigned_at, note
            FROM assignments
            WHERE issue_id = ?1
            ORDER BY assignment_row_id DESC
            "#,
        )?;
        let mut rows = statement.query(params![issue_id])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Assignment {
                issue_id: row.get(0)?,
                assigned_to: row.get(1)?,
                assigned_by: row.get(2)?,
                assigned_at: timestamp_from_db(&row.get::<_, String>(3)?)?,
                note: row.get(4)?,
            });
        }
        Ok(records)
    }

    async fn tombstone_issue(&self, issue_id: &str) -> StoreResult<()> {
        let connection = self.open_connection()?;
        let changed = connection.execute(
            "UPDATE issues SET deleted_at = ?1 WHERE issue_id = ?2 AND deleted_at IS NULL",
            params![timestamp_to_db(Utc::now()), issue_id],
        )?;
        if changed == 0 {
            return Err(StoreError::IssueNotFound(issue_id.to_string()));
        }
        Ok(())
    }

    async fn find_response_breach_candidates(&self, now: DateTime<Utc>) -> StoreResult<Vec<Issue>> {
        let connection = self.open_connection()?;
        let mut issues = load_issues_where(
            &connection,
            "deleted_at IS NULL AND status = 'submitted' AND sla_response_breached = 0",
        )?;
        issues.retain(|issue| issue.sla_response_deadline < now);
        Ok(issues)
    }

    async fn claim_response_breach(
        &self,
        issue_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        // A lost race changes zero rows and degrades to a no-op.
        let changed = connection.execute(
            r#"
            UPDATE issues
            SET sla_response_breached = 1, sla_response_breached_at = ?1
            WHERE issue_id = ?2 AND sla_response_breached = 0
              AND status = 'submitted' AND deleted_at IS NULL
            "#,
            params![timestamp_to_db(now), issue_id],
        )?;
        Ok(changed > 0)
    }

    async fn find_resolution_breach_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Issue>> {
        let connection = self.open_connection()?;
        let mut issues = load_issues_where(
            &connection,
            "deleted_at IS NULL AND status IN ('assigned', 'in_progress') \
             AND sla_resolution_breached = 0",
        )?;
        issues.retain(|issue| issue.sla_resolution_deadline < now);
        Ok(issues)
    }

    async fn claim_resolution_breach(
        &self,
        issue_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let changed = connection.execute(
            r#"
            UPDATE issues
            SET sla_resolution_breached = 1, sla_resolution_breached_at = ?1
            WHERE issue_id = ?2 AND sla_resolution_breached = 0
              AND status IN ('assigned', 'in_progress') AND deleted_at IS NULL
            "#,
            params![timestamp_to_db(now), issue_id],
        )?;
        Ok(changed > 0)
    }

    async fn find_auto_close_candidates(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Issue>> {
        let connection = self.open_connection()?;
        let mut issues =
            load_issues_where(&connection, "deleted_at IS NULL AND status = 'resolved'")?;
        issues.retain(|issue| issue.resolved_at.is_some_and(|resolved| resolved < cutoff));
        Ok(issues)
    }

    async fn auto_close_issue(&self, issue_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let changed = connection.execute(
            r#"
            UPDATE issues
            SET status = 'closed', verified_at = ?1, closed_at = ?1
            WHERE issue_id = ?2 AND status = 'resolved' AND deleted_at IS NULL
            "#,
            params![timestamp_to_db(now), issue_id],
        )?;
        Ok(changed > 0)
    }

    async fn sla_stats(&self, tenant_id: &str) -> StoreResult<SlaStats> {
        let connection = self.open_connection()?;
        let total: i64 = connection.query_row(
            "SELECT COUNT(*) FROM issues WHERE tenant_id = ?1 AND deleted_at IS NULL",
            params![tenant_id],
            |row| row.get(0),
        )?;
        let response_breaches: i64 = connection.query_row(
            "SELECT COUNT(*) FROM issues WHERE tenant_id = ?1 AND deleted_at IS NULL \
             AND sla_response_breached = 1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        let resolution_breaches: i64 = connection.query_row(
            "SELECT COUNT(*) FROM issues WHERE tenant_id = ?1 AND deleted_at IS NULL \
             AND sla_resolution_breached = 1",
            params![tenant_id],
            |row| row.get(0),
        )?;

        let total = i64_to_u64("total_issues", total)?;
        let response_breaches = i64_to_u64("response_breaches", response_breaches)?;
        let resolution_breaches = i64_to_u64("resolution_breaches", resolution_breaches)?;
        Ok(SlaStats {
            total_issues: total,
            response_breaches,
            resolution_breaches,
            response_compliance: round_percentage(total - response_breaches, total),
            resolution_compliance: round_percentage(total - resolution_breaches, total),
        })
    }
}

fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn option_timestamp_to_db(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(timestamp_to_db)
}

fn timestamp_from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn option_timestamp_from_db(value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    value.as_deref().map(timestamp_from_db).transpose()
}

fn issue_status_to_db(status: IssueStatus) -> &'static str {
    match status {
        IssueStatus::Submitted => "submitted",
        IssueStatus::Assigned => "assigned",
        IssueStatus::InProgress => "in_progress",
        IssueStatus::Resolved => "resolved",
        IssueStatus::Verified => "verified",
        IssueStatus::Closed => "closed",
    }
}

fn issue_status_from_db(value: &str) -> StoreResult<IssueStatus> {
    match value {
        "submitted" => Ok(IssueStatus::Submitted),
        "assigned" => Ok(IssueStatus::Assigned),
        "in_progress" => Ok(IssueStatus::InProgress),
        "resolved" => Ok(IssueStatus::Resolved),
        "verified" => Ok(IssueStatus::Verified),
        "closed" => Ok(IssueStatus::Closed),
        _ => Err(StoreError::InvalidPersistedValue {
            field: "issue_status",
            value: value.to_string(),
        }),
    }
}

fn priority_to_db(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Critical => "critical",
    }
}

fn priority_from_db(value: &str) -> StoreResult<Priority> {
    match value {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "critical" => Ok(Priority::Critical),
        _ => Err(StoreError::InvalidPersistedValue {
            field: "priority",
            value: value.to_string(),
        }),
    }
}

fn i64_to_u64(field: &'static str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}
