//! Issue store abstractions and in-memory backend.
//!
//! The `IssueStore` trait is the transactional engine surface: every
//! mutating operation reads current state, validates, and writes the new
//! state plus side effects as one unit. Both backends enforce identical
//! semantics through the pure rules in `fixflow-types`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

mod audit;
mod sqlite;

pub use audit::{AuditSink, InMemoryAuditSink, SqliteAuditSink};
pub use fixflow_types::{
    apply_assignment, apply_transition, compute_deadlines, validate_transition, Actor, Assignment,
    AuditAction, AuditEvent, AuditQuery, Category, Issue, IssueQuery, IssueStatus, NewIssue,
    Priority, Role, SlaConfigError, SlaStats, TransitionRequest, TransitionViolation,
};
pub use sqlite::SqliteIssueStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("issue '{0}' not found")]
    IssueNotFound(String),
    #[error("category '{0}' not found")]
    CategoryNotFound(String),
    #[error(transparent)]
    SlaConfig(#[from] SlaConfigError),
    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: IssueStatus, to: IssueStatus },
    #[error("transition to {to:?} requires the current assignee or an elevated role")]
    ForbiddenTransition { to: IssueStatus },
    #[error("{0}")]
    Validation(String),
    #[error("assignee '{0}' is not eligible for assignment")]
    InvalidAssignee(String),
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Async store contract consumed by the CRUD/API layer and the sweeps.
#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn register_category(&self, category: Category) -> StoreResult<()>;
    async fn get_category(&self, category_id: &str) -> StoreResult<Option<Category>>;

    /// Creates an issue in `Submitted` with both SLA deadlines stamped and a
    /// per-tenant sequential number allocated atomically. Fails without
    /// writing anything when the category's SLA table has no budget for the
    /// requested priority.
    async fn create_issue(&self, new_issue: NewIssue) -> StoreResult<Issue>;
    async fn get_issue(&self, issue_id: &str) -> StoreResult<Option<Issue>>;
    async fn query_issues(&self, query: IssueQuery) -> StoreResult<Vec<Issue>>;

    /// Applies one status transition with its side effects, atomically with
    /// the validation against the current state.
    async fn transition_issue(
        &self,
        issue_id: &str,
        next: IssueStatus,
        actor: &Actor,
        request: TransitionRequest,
    ) -> StoreResult<Issue>;

    /// Appends an assignment record and points the issue at the assignee,
    /// transitioning `Submitted` issues to `Assigned`. Later calls are pure
    /// reassignments: pointer plus record, no status change.
    async fn assign_issue(
        &self,
        issue_id: &str,
        assignee: &Actor,
        assigner: &Actor,
        note: Option<String>,
    ) -> StoreResult<Issue>;
    /// Assignment history, newest first.
    async fn list_assignments(&self, issue_id: &str) -> StoreResult<Vec<Assignment>>;

    /// Soft-deletes an issue; it disappears from every query and sweep.
    async fn tombstone_issue(&self, issue_id: &str) -> StoreResult<()>;

    /// Issues still `Submitted` whose response deadline elapsed before `now`
    /// and whose breach flag is unset.
    async fn find_response_breach_candidates(&self, now: DateTime<Utc>) -> StoreResult<Vec<Issue>>;
    /// Conditionally flips the response breach flag. Returns false when a
    /// concurrent sweep already claimed it or the status moved on.
    async fn claim_response_breach(&self, issue_id: &str, now: DateTime<Utc>)
        -> StoreResult<bool>;
    /// Issues in `Assigned`/`InProgress` whose resolution deadline elapsed
    /// before `now` and whose breach flag is unset.
    async fn find_resolution_breach_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Issue>>;
    async fn claim_resolution_breach(
        &self,
        issue_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Issues `Resolved` before `cutoff` and never confirmed by the creator.
    async fn find_auto_close_candidates(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Issue>>;
    /// Conditionally closes a still-`Resolved` issue, stamping both
    /// `verified_at` and `closed_at` to `now`. Returns false when the issue
    /// no longer matches.
    async fn auto_close_issue(&self, issue_id: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    async fn sla_stats(&self, tenant_id: &str) -> StoreResult<SlaStats>;
}

pub(crate) fn violation_to_error(
    from: IssueStatus,
    next: IssueStatus,
    violation: TransitionViolation,
) -> StoreError {
    match violation {
        TransitionViolation::NotAllowed => StoreError::InvalidTransition { from, to: next },
        TransitionViolation::Forbidden => StoreError::ForbiddenTransition { to: next },
        TransitionViolation::AssignmentRequired => StoreError::Validation(
            "issue has no current assignee; use assign to enter the assigned status".to_string(),
        ),
        TransitionViolation::MissingResolutionNotes => {
            StoreError::Validation("resolution notes are required to resolve an issue".to_string())
        }
    }
}

pub(crate) fn round_percentage(compliant: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let raw = (compliant as f64 / total as f64) * 100.0;
    (raw * 100.0).round() / 100.0
}

pub(crate) fn issue_matches_query(issue: &Issue, query: &IssueQuery) -> bool {
    query
        .tenant_id
        .as_deref()
        .is_none_or(|tenant| issue.tenant_id == tenant)
        && query
            .statuses
            .as_ref()
            .is_none_or(|statuses| statuses.contains(&issue.status))
        && query
            .priority
            .is_none_or(|priority| issue.priority == priority)
        && query
            .assigned_to
            .as_deref()
            .is_none_or(|assignee| issue.assigned_to.as_deref() == Some(assignee))
        && query
            .created_by
            .as_deref()
            .is_none_or(|creator| issue.created_by == creator)
}

pub(crate) fn slice_page<T>(mut rows: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    let start = offset.min(rows.len());
    let mut sliced = rows.split_off(start);
    if let Some(limit) = limit {
        sliced.truncate(limit);
    }
    sliced
}

/// In-memory implementation for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryIssueStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    categories: HashMap<String, Category>,
    issues: HashMap<String, Issue>,
    assignments: HashMap<String, Vec<Assignment>>,
}

impl InMemoryIssueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn live_issue<'a>(inner: &'a StoreInner, issue_id: &str) -> StoreResult<&'a Issue> {
    inner
        .issues
        .get(issue_id)
        .filter(|issue| issue.deleted_at.is_none())
        .ok_or_else(|| StoreError::IssueNotFound(issue_id.to_string()))
}

fn live_issue_mut<'a>(inner: &'a mut StoreInner, issue_id: &str) -> StoreResult<&'a mut Issue> {
    inner
        .issues
        .get_mut(issue_id)
        .filter(|issue| issue.deleted_at.is_none())
        .ok_or_else(|| StoreError::IssueNotFound(issue_id.to_string()))
}

#[async_trait]
impl IssueStore for InMemoryIssueStore {
    async fn register_category(&self, category: Category) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .categories
            .insert(category.category_id.clone(), category);
        Ok(())
    }

    async fn get_category(&self, category_id: &str) -> StoreResult<Option<Category>> {
        let inner = self.inner.read().await;
        Ok(inner.categories.get(category_id).cloned())
    }

    async fn create_issue(&self, new_issue: NewIssue) -> StoreResult<Issue> {
        let mut inner = self.inner.write().await;

        let category = inner
            .categories
            .get(&new_issue.category_id)
            .filter(|category| category.tenant_id == new_issue.tenant_id)
            .ok_or_else(|| StoreError::CategoryNotFound(new_issue.category_id.clone()))?;

        let created_at = Utc::now();
        let deadlines = compute_deadlines(&category.sla, new_issue.priority, created_at)?;

        // Tombstoned issues keep their number, so the scan must include them.
        let issue_number = inner
            .issues
            .values()
            .filter(|issue| issue.tenant_id == new_issue.tenant_id)
            .map(|issue| issue.issue_number)
            .max()
            .unwrap_or(0)
            + 1;

        let issue_id = format!("{}:issue-{}", new_issue.tenant_id, issue_number);
        let issue = Issue::submitted(issue_id.clone(), issue_number, new_issue, deadlines, created_at);
        inner.issues.insert(issue_id, issue.clone());
        Ok(issue)
    }

    async fn get_issue(&self, issue_id: &str) -> StoreResult<Option<Issue>> {
        let inner = self.inner.read().await;
        Ok(inner
            .issues
            .get(issue_id)
            .filter(|issue| issue.deleted_at.is_none())
            .cloned())
    }

    async fn query_issues(&self, query: IssueQuery) -> StoreResult<Vec<Issue>> {
        let inner = self.inner.read().await;
        let mut issues: Vec<Issue> = inner
            .issues
            .values()
            .filter(|issue| issue.deleted_at.is_none())
            .filter(|issue| issue_matches_query(issue, &query))
            .cloned()
            .collect();
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
        let mut inner = self.inner.write().await;
        let issue = live_issue_mut(&mut inner, issue_id)?;
        if issue.tenant_id != actor.tenant_id {
            return Err(StoreError::IssueNotFound(issue_id.to_string()));
        }

        validate_transition(issue, next, actor, &request)
            .map_err(|violation| violation_to_error(issue.status, next, violation))?;
        apply_transition(issue, next, request, Utc::now());
        Ok(issue.clone())
    }

    async fn assign_issue(
        &self,
        issue_id: &str,
        assignee: &Actor,
        assigner: &Actor,
        note: Option<String>,
    ) -> StoreResult<Issue> {
        let mut inner = self.inner.write().await;
        let issue = live_issue(&inner, issue_id)?;
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
        let record = Assignment {
            issue_id: issue_id.to_string(),
            assigned_to: assignee.user_id.clone(),
            assigned_by: assigner.user_id.clone(),
            assigned_at: now,
            note,
        };
        inner
            .assignments
            .entry(issue_id.to_string())
            .or_default()
            .push(record);

        let issue = live_issue_mut(&mut inner, issue_id)?;
        apply_assignment(issue, &assignee.user_id, now);
        Ok(issue.clone())
    }

    async fn list_assignments(&self, issue_id: &str) -> StoreResult<Vec<Assignment>> {
        let inner = self.inner.read().await;
        let mut records = inner
            .assignments
            .get(issue_id)
            .cloned()
            .unwrap_or_default();
        records.reverse();
        Ok(records)
    }

    async fn tombstone_issue(&self, issue_id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let issue = live_issue_mut(&mut inner, issue_id)?;
        issue.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn find_response_breach_candidates(&self, now: DateTime<Utc>) -> StoreResult<Vec<Issue>> {
        let inner = self.inner.read().await;
        let mut issues: Vec<Issue> = inner
            .issues
            .values()
            .filter(|issue| issue.deleted_at.is_none())
            .filter(|issue| issue.status == IssueStatus::Submitted)
            .filter(|issue| !issue.sla_response_breached)
            .filter(|issue| issue.sla_response_deadline < now)
            .cloned()
            .collect();
        issues.sort_by(|left, right| left.issue_id.cmp(&right.issue_id));
        Ok(issues)
    }

    async fn claim_response_breach(
        &self,
        issue_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(issue) = inner
            .issues
            .get_mut(issue_id)
            .filter(|issue| issue.deleted_at.is_none())
        else {
            return Ok(false);
        };
        if issue.sla_response_breached || issue.status != IssueStatus::Submitted {
            return Ok(false);
        }
        issue.sla_response_breached = true;
        issue.sla_response_breached_at = Some(now);
        Ok(true)
    }

    async fn find_resolution_breach_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Issue>> {
        let inner = self.inner.read().await;
        let mut issues: Vec<Issue> = inner
            .issues
            .values()
            .filter(|issue| issue.deleted_at.is_none())
            .filter(|issue| {
                matches!(
                    issue.status,
                    IssueStatus::Assigned | IssueStatus::InProgress
                )
            })
            .filter(|issue| !issue.sla_resolution_breached)
            .filter(|issue| issue.sla_resolution_deadline < now)
            .cloned()
            .collect();
        issues.sort_by(|left, right| left.issue_id.cmp(&right.issue_id));
        Ok(issues)
    }

    async fn claim_resolution_breach(
        &self,
        issue_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(issue) = inner
            .issues
            .get_mut(issue_id)
            .filter(|issue| issue.deleted_at.is_none())
        else {
            return Ok(false);
        };
        let in_scope = matches!(
            issue.status,
            IssueStatus::Assigned | IssueStatus::InProgress
        );
        if issue.sla_resolution_breached || !in_scope {
            return Ok(false);
        }
        issue.sla_resolution_breached = true;
        issue.sla_resolution_breached_at = Some(now);
        Ok(true)
    }

    async fn find_auto_close_candidates(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Issue>> {
        let inner = self.inner.read().await;
        let mut issues: Vec<Issue> = inner
            .issues
            .values()
            .filter(|issue| issue.deleted_at.is_none())
            .filter(|issue| issue.status == IssueStatus::Resolved)
            .filter(|issue| issue.resolved_at.is_some_and(|resolved| resolved < cutoff))
            .cloned()
            .collect();
        issues.sort_by(|left, right| left.issue_id.cmp(&right.issue_id));
        Ok(issues)
    }

    async fn auto_close_issue(&self, issue_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(issue) = inner
            .issues
            .get_mut(issue_id)
            .filter(|issue| issue.deleted_at.is_none())
        else {
            return Ok(false);
        };
        if issue.status != IssueStatus::Resolved {
            return Ok(false);
        }
        issue.status = IssueStatus::Closed;
        issue.verified_at = Some(now);
        issue.closed_at = Some(now);
        Ok(true)
    }

    async fn sla_stats(&self, tenant_id: &str) -> StoreResult<SlaStats> {
        let inner = self.inner.read().await;
        let mut total = 0u64;
        let mut response_breaches = 0u64;
        let mut resolution_breaches = 0u64;
        for issue in inner
            .issues
            .values()
            .filter(|issue| issue.deleted_at.is_none())
            .filter(|issue| issue.tenant_id == tenant_id)
        {
            total += 1;
            if issue.sla_response_breached {
                response_breaches += 1;
            }
            if issue.sla_resolution_breached {
                resolution_breaches += 1;
            }
        }

        Ok(SlaStats {
            total_issues: total,
            response_breaches,
            resolution_breaches,
            response_compliance: round_percentage(total - response_breaches, total),
            resolution_compliance: round_percentage(total - resolution_breaches, total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fixflow_types::{SlaBudget, SlaTable};

    fn category(category_id: &str, tenant_id: &str, sla: SlaTable) -> Category {
        Category {
            category_id: category_id.to_string(),
            tenant_id: tenant_id.to_string(),
            name: "Electrical".to_string(),
            sla,
        }
    }

    fn new_issue(tenant_id: &str, category_id: &str, priority: Priority) -> NewIssue {
        NewIssue {
            tenant_id: tenant_id.to_string(),
            created_by: "student-1".to_string(),
            category_id: category_id.to_string(),
            priority,
            title: "Broken socket".to_string(),
            description: "Sparks near desk 4".to_string(),
            location: "Library, floor 2".to_string(),
        }
    }

    async fn seeded_store() -> InMemoryIssueStore {
        let store = InMemoryIssueStore::new();
        store
            .register_category(category("cat-electrical", "campus-a", SlaTable::standard()))
            .await
            .expect("register category");
        store
    }

    fn staff(user_id: &str) -> Actor {
        Actor::new(user_id, "campus-a", Role::Staff)
    }

    fn admin() -> Actor {
        Actor::new("admin-1", "campus-a", Role::Admin)
    }

    async fn issue_in_progress(store: &InMemoryIssueStore) -> Issue {
        let issue = store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::High))
            .await
            .expect("create issue");
        store
            .assign_issue(&issue.issue_id, &staff("staff-1"), &admin(), None)
            .await
            .expect("assign");
        store
            .transition_issue(
                &issue.issue_id,
                IssueStatus::InProgress,
                &staff("staff-1"),
                TransitionRequest::default(),
            )
            .await
            .expect("start work")
    }

    #[tokio::test]
    async fn creates_issue_with_deadlines_and_sequential_numbers() {
        let store = seeded_store().await;
        store
            .register_category(category("cat-plumbing", "campus-b", SlaTable::standard()))
            .await
            .expect("register second tenant category");

        let first = store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::High))
            .await
            .expect("first issue");
        let second = store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::Low))
            .await
            .expect("second issue");
        let other_tenant = store
            .create_issue(new_issue("campus-b", "cat-plumbing", Priority::High))
            .await
            .expect("other tenant issue");

        assert_eq!(first.issue_number, 1);
        assert_eq!(second.issue_number, 2);
        assert_eq!(other_tenant.issue_number, 1);
        assert_eq!(first.status, IssueStatus::Submitted);
        assert_eq!(
            first.sla_response_deadline,
            first.created_at + Duration::minutes(240)
        );
        assert_eq!(
            first.sla_resolution_deadline,
            first.created_at + Duration::hours(24)
        );
    }

    #[tokio::test]
    async fn missing_sla_budget_blocks_creation() {
        let store = InMemoryIssueStore::new();
        let mut sla = SlaTable::new();
        sla.set(
            Priority::Critical,
            SlaBudget {
                response_minutes: 60,
                resolution_hours: 4,
            },
        );
        store
            .register_category(category("cat-sparse", "campus-a", sla))
            .await
            .expect("register category");

        let error = store
            .create_issue(new_issue("campus-a", "cat-sparse", Priority::Low))
            .await
            .expect_err("creation must fail");
        assert!(matches!(
            error,
            StoreError::SlaConfig(SlaConfigError::MissingPriority(Priority::Low))
        ));
        assert!(store
            .query_issues(IssueQuery::default())
            .await
            .expect("query")
            .is_empty());
    }

    #[tokio::test]
    async fn category_from_another_tenant_is_invisible() {
        let store = seeded_store().await;
        let error = store
            .create_issue(new_issue("campus-b", "cat-electrical", Priority::High))
            .await
            .expect_err("cross-tenant category must fail");
        assert!(matches!(error, StoreError::CategoryNotFound(_)));
    }

    #[tokio::test]
    async fn full_lifecycle_stamps_timestamps() {
        let store = seeded_store().await;
        let issue = issue_in_progress(&store).await;
        assert!(issue.first_response_at.is_some());
        assert!(issue.assigned_at.is_some());

        let resolved = store
            .transition_issue(
                &issue.issue_id,
                IssueStatus::Resolved,
                &staff("staff-1"),
                TransitionRequest {
                    resolution_notes: Some("Replaced the socket".to_string()),
                },
            )
            .await
            .expect("resolve");
        assert!(resolved.resolved_at.is_some());
        assert_eq!(
            resolved.resolution_notes.as_deref(),
            Some("Replaced the socket")
        );

        let verified = store
            .transition_issue(
                &issue.issue_id,
                IssueStatus::Verified,
                &Actor::new("student-1", "campus-a", Role::Student),
                TransitionRequest::default(),
            )
            .await
            .expect("verify");
        assert!(verified.verified_at.is_some());

        let closed = store
            .transition_issue(
                &issue.issue_id,
                IssueStatus::Closed,
                &Actor::new("student-1", "campus-a", Role::Student),
                TransitionRequest::default(),
            )
            .await
            .expect("close");
        assert!(closed.closed_at.is_some());
        assert_eq!(closed.status, IssueStatus::Closed);
    }

    #[tokio::test]
    async fn invalid_transition_leaves_issue_unchanged() {
        let store = seeded_store().await;
        let issue = store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::High))
            .await
            .expect("create issue");

        let error = store
            .transition_issue(
                &issue.issue_id,
                IssueStatus::Resolved,
                &admin(),
                TransitionRequest {
                    resolution_notes: Some("skipping ahead".to_string()),
                },
            )
            .await
            .expect_err("skip must fail");
        assert!(matches!(
            error,
            StoreError::InvalidTransition {
                from: IssueStatus::Submitted,
                to: IssueStatus::Resolved,
            }
        ));

        let unchanged = store
            .get_issue(&issue.issue_id)
            .await
            .expect("get")
            .expect("issue exists");
        assert_eq!(unchanged, issue);
    }

    #[tokio::test]
    async fn non_assignee_is_forbidden_and_issue_unchanged() {
        let store = seeded_store().await;
        let issue = store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::High))
            .await
            .expect("create issue");
        let assigned = store
            .assign_issue(&issue.issue_id, &staff("staff-1"), &admin(), None)
            .await
            .expect("assign");

        let error = store
            .transition_issue(
                &issue.issue_id,
                IssueStatus::InProgress,
                &staff("staff-2"),
                TransitionRequest::default(),
            )
            .await
            .expect_err("other staff must be rejected");
        assert!(matches!(
            error,
            StoreError::ForbiddenTransition {
                to: IssueStatus::InProgress
            }
        ));

        let unchanged = store
            .get_issue(&issue.issue_id)
            .await
            .expect("get")
            .expect("issue exists");
        assert_eq!(unchanged, assigned);
    }

    #[tokio::test]
    async fn resolving_without_notes_is_rejected() {
        let store = seeded_store().await;
        let issue = issue_in_progress(&store).await;

        let error = store
            .transition_issue(
                &issue.issue_id,
                IssueStatus::Resolved,
                &staff("staff-1"),
                TransitionRequest::default(),
            )
            .await
            .expect_err("notes are required");
        assert!(matches!(error, StoreError::Validation(_)));

        let unchanged = store
            .get_issue(&issue.issue_id)
            .await
            .expect("get")
            .expect("issue exists");
        assert_eq!(unchanged.status, IssueStatus::InProgress);
        assert!(unchanged.resolved_at.is_none());
    }

    #[tokio::test]
    async fn students_cannot_receive_assignments() {
        let store = seeded_store().await;
        let issue = store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::High))
            .await
            .expect("create issue");

        let error = store
            .assign_issue(
                &issue.issue_id,
                &Actor::new("student-2", "campus-a", Role::Student),
                &admin(),
                None,
            )
            .await
            .expect_err("students are ineligible");
        assert!(matches!(error, StoreError::InvalidAssignee(_)));

        let cross_tenant = store
            .assign_issue(
                &issue.issue_id,
                &Actor::new("staff-9", "campus-b", Role::Staff),
                &admin(),
                None,
            )
            .await
            .expect_err("cross-tenant assignee is ineligible");
        assert!(matches!(cross_tenant, StoreError::InvalidAssignee(_)));
    }

    #[tokio::test]
    async fn reassignment_appends_log_without_status_change() {
        let store = seeded_store().await;
        let issue = issue_in_progress(&store).await;

        let reassigned = store
            .assign_issue(
                &issue.issue_id,
                &staff("staff-2"),
                &admin(),
                Some("handing over".to_string()),
            )
            .await
            .expect("reassign");
        assert_eq!(reassigned.status, IssueStatus::InProgress);
        assert_eq!(reassigned.assigned_to.as_deref(), Some("staff-2"));

        let log = store
            .list_assignments(&issue.issue_id)
            .await
            .expect("list assignments");
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].assigned_to, "staff-2");
        assert_eq!(log[0].note.as_deref(), Some("handing over"));
        assert_eq!(log[1].assigned_to, "staff-1");
    }

    #[tokio::test]
    async fn closed_issues_cannot_be_assigned() {
        let store = seeded_store().await;
        let issue = store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::High))
            .await
            .expect("create issue");
        store
            .transition_issue(
                &issue.issue_id,
                IssueStatus::Closed,
                &Actor::new("student-1", "campus-a", Role::Student),
                TransitionRequest::default(),
            )
            .await
            .expect("withdraw");

        let error = store
            .assign_issue(&issue.issue_id, &staff("staff-1"), &admin(), None)
            .await
            .expect_err("closed issues stay closed");
        assert!(matches!(error, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn tombstoned_issues_vanish_from_queries_and_sweeps() {
        let store = seeded_store().await;
        let issue = store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::High))
            .await
            .expect("create issue");
        store
            .tombstone_issue(&issue.issue_id)
            .await
            .expect("tombstone");

        assert!(store
            .get_issue(&issue.issue_id)
            .await
            .expect("get")
            .is_none());
        assert!(store
            .query_issues(IssueQuery::default())
            .await
            .expect("query")
            .is_empty());

        let far_future = Utc::now() + Duration::days(365);
        assert!(store
            .find_response_breach_candidates(far_future)
            .await
            .expect("candidates")
            .is_empty());
        assert!(!store
            .claim_response_breach(&issue.issue_id, far_future)
            .await
            .expect("claim"));

        let error = store
            .tombstone_issue(&issue.issue_id)
            .await
            .expect_err("double tombstone");
        assert!(matches!(error, StoreError::IssueNotFound(_)));
    }

    #[tokio::test]
    async fn breach_claims_are_idempotent() {
        let store = seeded_store().await;
        let issue = store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::High))
            .await
            .expect("create issue");

        let after_deadline = issue.sla_response_deadline + Duration::minutes(1);
        let candidates = store
            .find_response_breach_candidates(after_deadline)
            .await
            .expect("candidates");
        assert_eq!(candidates.len(), 1);

        assert!(store
            .claim_response_breach(&issue.issue_id, after_deadline)
            .await
            .expect("first claim"));
        assert!(!store
            .claim_response_breach(&issue.issue_id, after_deadline)
            .await
            .expect("second claim"));

        let flagged = store
            .get_issue(&issue.issue_id)
            .await
            .expect("get")
            .expect("issue exists");
        assert!(flagged.sla_response_breached);
        assert_eq!(flagged.sla_response_breached_at, Some(after_deadline));
        assert!(store
            .find_response_breach_candidates(after_deadline)
            .await
            .expect("candidates after claim")
            .is_empty());
    }

    #[tokio::test]
    async fn resolution_breach_scope_is_assigned_and_in_progress() {
        let store = seeded_store().await;
        let submitted = store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::High))
            .await
            .expect("submitted issue");
        let working = issue_in_progress(&store).await;

        let after_deadline = working.sla_resolution_deadline + Duration::minutes(1);
        let candidates = store
            .find_resolution_breach_candidates(after_deadline)
            .await
            .expect("candidates");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].issue_id, working.issue_id);

        // A submitted issue is out of scope even past its resolution deadline.
        assert!(!store
            .claim_resolution_breach(&submitted.issue_id, after_deadline)
            .await
            .expect("claim out of scope"));
    }

    #[tokio::test]
    async fn auto_close_matches_only_resolved_issues() {
        let store = seeded_store().await;
        let issue = issue_in_progress(&store).await;
        store
            .transition_issue(
                &issue.issue_id,
                IssueStatus::Resolved,
                &staff("staff-1"),
                TransitionRequest {
                    resolution_notes: Some("done".to_string()),
                },
            )
            .await
            .expect("resolve");

        let sweep_time = Utc::now() + Duration::hours(49);
        let candidates = store
            .find_auto_close_candidates(sweep_time - Duration::hours(48))
            .await
            .expect("candidates");
        assert_eq!(candidates.len(), 1);

        assert!(store
            .auto_close_issue(&issue.issue_id, sweep_time)
            .await
            .expect("auto close"));
        let closed = store
            .get_issue(&issue.issue_id)
            .await
            .expect("get")
            .expect("issue exists");
        assert_eq!(closed.status, IssueStatus::Closed);
        assert_eq!(closed.verified_at, Some(sweep_time));
        assert_eq!(closed.closed_at, Some(sweep_time));

        // No longer resolved, so a second pass skips it.
        assert!(!store
            .auto_close_issue(&issue.issue_id, sweep_time + Duration::hours(1))
            .await
            .expect("second auto close"));
    }

    #[tokio::test]
    async fn stats_report_breach_compliance() {
        let store = seeded_store().await;
        let first = store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::High))
            .await
            .expect("first");
        store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::High))
            .await
            .expect("second");

        let after_deadline = first.sla_response_deadline + Duration::minutes(1);
        assert!(store
            .claim_response_breach(&first.issue_id, after_deadline)
            .await
            .expect("claim"));

        let stats = store.sla_stats("campus-a").await.expect("stats");
        assert_eq!(stats.total_issues, 2);
        assert_eq!(stats.response_breaches, 1);
        assert_eq!(stats.resolution_breaches, 0);
        assert_eq!(stats.response_compliance, 50.0);
        assert_eq!(stats.resolution_compliance, 100.0);

        let empty = store.sla_stats("campus-z").await.expect("empty stats");
        assert_eq!(empty.total_issues, 0);
        assert_eq!(empty.response_compliance, 100.0);
    }

    #[tokio::test]
    async fn queries_filter_by_assignee_and_creator() {
        let store = seeded_store().await;
        let mine = issue_in_progress(&store).await;
        store
            .create_issue(new_issue("campus-a", "cat-electrical", Priority::Low))
            .await
            .expect("unassigned issue");

        let assigned = store
            .query_issues(IssueQuery {
                assigned_to: Some("staff-1".to_string()),
                ..IssueQuery::default()
            })
            .await
            .expect("assigned query");
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].issue_id, mine.issue_id);

        let created = store
            .query_issues(IssueQuery {
                created_by: Some("student-1".to_string()),
                statuses: Some(vec![IssueStatus::Submitted]),
                ..IssueQuery::default()
            })
            .await
            .expect("creator query");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, IssueStatus::Submitted);
    }
}
