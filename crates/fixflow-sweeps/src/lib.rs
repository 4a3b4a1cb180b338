//! Periodic SLA sweeps: breach detection and auto-closure.
//!
//! The sweep bodies are plain async functions taking an explicit `now`, so
//! they unit-test without a timer; `SweepScheduler` owns the tickers and
//! drives them against the wall clock. Every per-issue update is an
//! independently committed conditional claim, so overlapping runs degrade
//! to no-ops and a failed run is simply retried wholesale on the next tick.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use fixflow_store::{AuditAction, AuditEvent, AuditSink, IssueStore, StoreResult};
use fixflow_types::IssueStatus;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;

/// Cadence and grace settings for both sweeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// Interval between breach-detection runs.
    pub breach_interval: Duration,
    /// Interval between auto-close runs.
    pub auto_close_interval: Duration,
    /// How long a resolved issue waits for confirmation before implicit
    /// acceptance closes it.
    pub auto_close_grace: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            breach_interval: Duration::from_secs(60 * 60),
            auto_close_interval: Duration::from_secs(24 * 60 * 60),
            auto_close_grace: Duration::from_secs(48 * 60 * 60),
        }
    }
}

impl SweepConfig {
    /// Returns an error when any interval is zero or the grace window does
    /// not fit a chrono duration.
    pub fn validate(&self) -> Result<()> {
        if self.breach_interval.is_zero() {
            anyhow::bail!("breach sweep interval must be greater than zero");
        }
        if self.auto_close_interval.is_zero() {
            anyhow::bail!("auto-close sweep interval must be greater than zero");
        }
        if chrono::Duration::from_std(self.auto_close_grace).is_err() {
            anyhow::bail!("auto-close grace window is out of range");
        }
        Ok(())
    }
}

/// Outcome of one breach-detection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachSweepReport {
    pub response_breaches: u64,
    pub resolution_breaches: u64,
}

/// Outcome of one auto-close run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoCloseReport {
    pub closed: u64,
}

/// Runs both breach passes once against `now`.
///
/// Response pass: issues still `Submitted` past their response deadline.
/// Resolution pass: issues in `Assigned`/`InProgress` past their resolution
/// deadline. The flag check is both the filter and the double-processing
/// guard, so re-running immediately reports zero additional breaches.
#[tracing::instrument(skip(store, sink), fields(now = %now))]
pub async fn run_breach_sweep(
    store: &dyn IssueStore,
    sink: &dyn AuditSink,
    now: DateTime<Utc>,
) -> StoreResult<BreachSweepReport> {
    let mut report = BreachSweepReport::default();

    for issue in store.find_response_breach_candidates(now).await? {
        if !store.claim_response_breach(&issue.issue_id, now).await? {
            continue;
        }
        report.response_breaches += 1;
        tracing::warn!(
            issue_id = %issue.issue_id,
            issue_number = issue.issue_number,
            priority = ?issue.priority,
            "response sla breached"
        );
        record_audit(
            sink,
            AuditEvent {
                tenant_id: issue.tenant_id.clone(),
                action: AuditAction::SlaResponseBreach,
                entity_id: issue.issue_id.clone(),
                detail: json!({
                    "issue_number": issue.issue_number,
                    "priority": issue.priority,
                    "deadline": issue.sla_response_deadline,
                    "breached_at": now,
                }),
                recorded_at: now,
            },
        )
        .await;
    }

    for issue in store.find_resolution_breach_candidates(now).await? {
        if !store.claim_resolution_breach(&issue.issue_id, now).await? {
            continue;
        }
        report.resolution_breaches += 1;
        tracing::warn!(
            issue_id = %issue.issue_id,
            issue_number = issue.issue_number,
            priority = ?issue.priority,
            assigned_to = issue.assigned_to.as_deref().unwrap_or(""),
            "resolution sla breached"
        );
        record_audit(
            sink,
            AuditEvent {
                tenant_id: issue.tenant_id.clone(),
                action: AuditAction::SlaResolutionBreach,
                entity_id: issue.issue_id.clone(),
                detail: json!({
                    "issue_number": issue.issue_number,
                    "priority": issue.priority,
                    "assigned_to": issue.assigned_to,
                    "deadline": issue.sla_resolution_deadline,
                    "breached_at": now,
                }),
                recorded_at: now,
            },
        )
        .await;
    }

    tracing::info!(
        response_breaches = report.response_breaches,
        resolution_breaches = report.resolution_breaches,
        "sla breach sweep completed"
    );
    Ok(report)
}

/// Closes issues resolved more than `grace` before `now` without student
/// confirmation, treating silence as implicit acceptance. Skips `Verified`
/// on purpose and stamps both `verified_at` and `closed_at` to the sweep
/// time, since no human confirmed verification.
#[tracing::instrument(skip(store, sink), fields(now = %now))]
pub async fn run_auto_close_sweep(
    store: &dyn IssueStore,
    sink: &dyn AuditSink,
    now: DateTime<Utc>,
    grace: Duration,
) -> StoreResult<AutoCloseReport> {
    let grace = chrono::Duration::from_std(grace).map_err(|_| {
        fixflow_store::StoreError::Validation("auto-close grace window is out of range".to_string())
    })?;
    let cutoff = now - grace;

    let mut report = AutoCloseReport::default();
    for issue in store.find_auto_close_candidates(cutoff).await? {
        if !store.auto_close_issue(&issue.issue_id, now).await? {
            continue;
        }
        report.closed += 1;
        tracing::info!(
            issue_id = %issue.issue_id,
            issue_number = issue.issue_number,
            "issue auto-closed after grace window"
        );
        record_audit(
            sink,
            AuditEvent {
                tenant_id: issue.tenant_id.clone(),
                action: AuditAction::IssueAutoClosed,
                entity_id: issue.issue_id.clone(),
                detail: json!({
                    "from": IssueStatus::Resolved,
                    "to": IssueStatus::Closed,
                    "resolved_at": issue.resolved_at,
                    "reason": "auto-closed after grace window without confirmation",
                }),
                recorded_at: now,
            },
        )
        .await;
    }

    tracing::info!(closed = report.closed, "auto-close sweep completed");
    Ok(report)
}

// A failed audit write is logged and never fails the sweep.
async fn record_audit(sink: &dyn AuditSink, event: AuditEvent) {
    let action = event.action;
    let entity_id = event.entity_id.clone();
    if let Err(error) = sink.record(event).await {
        tracing::warn!(%error, ?action, %entity_id, "audit write failed; continuing");
    }
}

/// Process-level owner of the sweep timers.
pub struct SweepScheduler {
    store: Arc<dyn IssueStore>,
    sink: Arc<dyn AuditSink>,
    config: SweepConfig,
}

impl SweepScheduler {
    /// Creates a scheduler bound to a store/sink pair.
    pub fn new(store: Arc<dyn IssueStore>, sink: Arc<dyn AuditSink>, config: SweepConfig) -> Self {
        config
            .validate()
            .expect("invalid sweep config: intervals must be non-zero");
        Self {
            store,
            sink,
            config,
        }
    }

    /// Runs both sweeps on their intervals until `shutdown` flips to true.
    ///
    /// A run that fails partway is abandoned and fully retried on the next
    /// tick; already-claimed issues are excluded by the candidate filters,
    /// so the retry never double-flags.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut breach = tokio::time::interval(self.config.breach_interval);
        let mut auto_close = tokio::time::interval(self.config.auto_close_interval);
        breach.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        auto_close.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = breach.tick() => {
                    if let Err(error) =
                        run_breach_sweep(self.store.as_ref(), self.sink.as_ref(), Utc::now()).await
                    {
                        tracing::warn!(%error, "sla breach sweep aborted; retrying on next tick");
                    }
                }
                _ = auto_close.tick() => {
                    if let Err(error) = run_auto_close_sweep(
                        self.store.as_ref(),
                        self.sink.as_ref(),
                        Utc::now(),
                        self.config.auto_close_grace,
                    )
                    .await
                    {
                        tracing::warn!(%error, "auto-close sweep aborted; retrying on next tick");
                    }
                }
            }
        }

        Ok(())
    }
}
