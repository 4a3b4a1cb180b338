//! Shared domain types for the fixflow issue lifecycle engine.
//!
//! Holds the issue state machine, priority/role enums, entity structs, and
//! the pure transition rules both store backends enforce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod sla;

pub use sla::{compute_deadlines, SlaBudget, SlaConfigError, SlaDeadlines, SlaTable};

/// Lifecycle state for an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Submitted,
    Assigned,
    InProgress,
    Resolved,
    Verified,
    Closed,
}

impl IssueStatus {
    /// Returns true when this status can transition to `next`.
    ///
    /// The table is exact: back-edges (`Assigned→Submitted`,
    /// `InProgress→Assigned`, `Resolved→InProgress`) and the withdrawal
    /// shortcut `Submitted→Closed` are the only non-forward edges, `Closed`
    /// has no outgoing edges, and a status never transitions to itself.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Submitted, Self::Assigned)
                | (Self::Submitted, Self::Closed)
                | (Self::Assigned, Self::InProgress)
                | (Self::Assigned, Self::Submitted)
                | (Self::InProgress, Self::Resolved)
                | (Self::InProgress, Self::Assigned)
                | (Self::Resolved, Self::Verified)
                | (Self::Resolved, Self::InProgress)
                | (Self::Verified, Self::Closed)
        )
    }

    /// Returns true when no further transitions are expected.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Issue urgency, ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Role held by a user within a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl Role {
    /// Returns true when users with this role may be assigned issues.
    pub fn can_receive_assignments(self) -> bool {
        matches!(self, Self::Staff | Self::Admin)
    }

    /// Returns true when the role bypasses the current-assignee ownership
    /// check on transitions into `InProgress`/`Resolved`.
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Acting or referenced user, resolved by the external auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub tenant_id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, tenant_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            role,
        }
    }
}

/// Issue category owning an SLA configuration.
///
/// The budgets an issue was created under never retroactively change its
/// deadlines; editing a category affects only future issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub category_id: String,
    pub tenant_id: String,
    pub name: String,
    pub sla: SlaTable,
}

/// Central ticketing entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub issue_id: String,
    pub tenant_id: String,
    /// Sequential per tenant, allocated atomically at creation.
    pub issue_number: u64,
    pub title: String,
    pub description: String,
    pub location: String,
    pub priority: Priority,
    pub status: IssueStatus,
    pub category_id: String,
    pub created_by: String,
    pub assigned_to: Option<String>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Fixed at creation; never recomputed.
    pub sla_response_deadline: DateTime<Utc>,
    /// Fixed at creation; never recomputed.
    pub sla_resolution_deadline: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub sla_response_breached: bool,
    pub sla_response_breached_at: Option<DateTime<Utc>>,
    pub sla_resolution_breached: bool,
    pub sla_resolution_breached_at: Option<DateTime<Utc>>,
    /// Tombstone; a stamped issue is excluded from every query and sweep.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// Creates a submitted issue with both deadlines stamped.
    pub fn submitted(
        issue_id: impl Into<String>,
        issue_number: u64,
        new_issue: NewIssue,
        deadlines: SlaDeadlines,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            tenant_id: new_issue.tenant_id,
            issue_number,
            title: new_issue.title,
            description: new_issue.description,
            location: new_issue.location,
            priority: new_issue.priority,
            status: IssueStatus::Submitted,
            category_id: new_issue.category_id,
            created_by: new_issue.created_by,
            assigned_to: None,
            resolution_notes: None,
            created_at,
            sla_response_deadline: deadlines.response_deadline,
            sla_resolution_deadline: deadlines.resolution_deadline,
            assigned_at: None,
            first_response_at: None,
            resolved_at: None,
            verified_at: None,
            closed_at: None,
            sla_response_breached: false,
            sla_response_breached_at: None,
            sla_resolution_breached: false,
            sla_resolution_breached_at: None,
            deleted_at: None,
        }
    }
}

/// Input for issue creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    pub tenant_id: String,
    pub created_by: String,
    pub category_id: String,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub location: String,
}

/// Append-only staff assignment log entry. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub issue_id: String,
    pub assigned_to: String,
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Automated action kinds recorded by the sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SlaResponseBreach,
    SlaResolutionBreach,
    IssueAutoClosed,
}

/// Append-only record of an automated sweep action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub tenant_id: String,
    pub action: AuditAction,
    pub entity_id: String,
    /// Structured detail sufficient to reconstruct why the action fired.
    pub detail: Value,
    pub recorded_at: DateTime<Utc>,
}

/// Filter used when listing issues. Tombstoned issues never match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueQuery {
    pub tenant_id: Option<String>,
    pub statuses: Option<Vec<IssueStatus>>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
    pub created_by: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Filter used when reading the audit trail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub tenant_id: Option<String>,
    pub action: Option<AuditAction>,
    pub entity_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Per-tenant SLA compliance summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaStats {
    pub total_issues: u64,
    pub response_breaches: u64,
    pub resolution_breaches: u64,
    /// Percentage of issues without a response breach, rounded to 2 decimals.
    pub response_compliance: f64,
    /// Percentage of issues without a resolution breach, rounded to 2 decimals.
    pub resolution_compliance: f64,
}

/// Caller-supplied extras for a status transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub resolution_notes: Option<String>,
}

/// Reason a requested transition was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionViolation {
    /// The (from, to) pair is not an edge of the transition table.
    NotAllowed,
    /// Actor is neither the current assignee nor elevated.
    Forbidden,
    /// Entering `Assigned` requires an existing assignment record.
    AssignmentRequired,
    /// Entering `Resolved` requires non-empty resolution notes.
    MissingResolutionNotes,
}

/// Validates a status transition against the table, the ownership rule, and
/// per-target requirements. Leaves the issue untouched.
pub fn validate_transition(
    issue: &Issue,
    next: IssueStatus,
    actor: &Actor,
    request: &TransitionRequest,
) -> Result<(), TransitionViolation> {
    if !issue.status.can_transition_to(next) {
        return Err(TransitionViolation::NotAllowed);
    }

    if matches!(next, IssueStatus::InProgress | IssueStatus::Resolved) {
        let is_assignee = issue.assigned_to.as_deref() == Some(actor.user_id.as_str());
        if !is_assignee && !actor.role.is_elevated() {
            return Err(TransitionViolation::Forbidden);
        }
    }

    // The only append path for assignment records is assign(); a bare
    // transition may re-enter Assigned only when one already exists.
    if next == IssueStatus::Assigned && issue.assigned_to.is_none() {
        return Err(TransitionViolation::AssignmentRequired);
    }

    if next == IssueStatus::Resolved {
        let has_notes = request
            .resolution_notes
            .as_deref()
            .is_some_and(|notes| !notes.trim().is_empty());
        if !has_notes {
            return Err(TransitionViolation::MissingResolutionNotes);
        }
    }

    Ok(())
}

/// Applies a validated transition: sets the status and stamps the
/// per-target side effects. `first_response_at` is stamped only on the
/// first entry into `InProgress`; `resolved_at` re-stamps on every entry
/// into `Resolved` so the auto-close grace window tracks the latest
/// resolution.
pub fn apply_transition(
    issue: &mut Issue,
    next: IssueStatus,
    request: TransitionRequest,
    now: DateTime<Utc>,
) {
    issue.status = next;
    match next {
        IssueStatus::Submitted => {}
        IssueStatus::Assigned => {
            issue.assigned_at = Some(now);
        }
        IssueStatus::InProgress => {
            if issue.first_response_at.is_none() {
                issue.first_response_at = Some(now);
            }
        }
        IssueStatus::Resolved => {
            issue.resolved_at = Some(now);
            issue.resolution_notes = request.resolution_notes;
        }
        IssueStatus::Verified => {
            issue.verified_at = Some(now);
        }
        IssueStatus::Closed => {
            issue.closed_at = Some(now);
        }
    }
}

/// Points the issue at `assignee_id` and, when the issue is still
/// `Submitted`, performs the `Assigned` transition. Returns true when the
/// status changed (false for a pure reassignment).
pub fn apply_assignment(issue: &mut Issue, assignee_id: &str, now: DateTime<Utc>) -> bool {
    issue.assigned_to = Some(assignee_id.to_string());
    if issue.status == IssueStatus::Submitted {
        issue.status = IssueStatus::Assigned;
        issue.assigned_at = Some(now);
        true
    } else {
        false
    }
}
