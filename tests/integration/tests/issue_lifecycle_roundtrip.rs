//! End-to-end lifecycle and sweep round-trip against the SQLite backend.

use chrono::{Duration, Utc};
use fixflow_store::{
    Actor, AuditAction, AuditQuery, AuditSink, Category, IssueQuery, IssueStore, NewIssue, Role,
    SqliteAuditSink, SqliteIssueStore, TransitionRequest,
};
use fixflow_sweeps::{run_auto_close_sweep, run_breach_sweep};
use fixflow_types::{IssueStatus, Priority, SlaBudget, SlaTable};
use tempfile::tempdir;

fn student() -> Actor {
    Actor::new("student-1", "campus-a", Role::Student)
}

fn staff() -> Actor {
    Actor::new("staff-1", "campus-a", Role::Staff)
}

fn admin() -> Actor {
    Actor::new("admin-1", "campus-a", Role::Admin)
}

async fn seed_category(store: &SqliteIssueStore, sla: SlaTable) {
    store
        .register_category(Category {
            category_id: "cat-electrical".to_string(),
            tenant_id: "campus-a".to_string(),
            name: "Electrical".to_string(),
            sla,
        })
        .await
        .expect("register category");
}

fn report_issue(title: &str) -> NewIssue {
    NewIssue {
        tenant_id: "campus-a".to_string(),
        created_by: "student-1".to_string(),
        category_id: "cat-electrical".to_string(),
        priority: Priority::High,
        title: title.to_string(),
        description: "Sparks near desk 4".to_string(),
        location: "Library, floor 2".to_string(),
    }
}

#[tokio::test]
async fn lifecycle_sweeps_and_stats_survive_reopen() {
    let temp = tempdir().expect("create tempdir");
    let db_path = temp.path().join("fixflow.sqlite");
    let store = SqliteIssueStore::new(&db_path).expect("create store");
    let sink = SqliteAuditSink::new(&db_path).expect("create sink");

    // Zero budgets make every issue breach as soon as a sweep looks at it.
    let mut sla = SlaTable::new();
    sla.set(
        Priority::High,
        SlaBudget {
            response_minutes: 0,
            resolution_hours: 0,
        },
    );
    seed_category(&store, sla).await;

    let worked = store
        .create_issue(report_issue("Broken socket"))
        .await
        .expect("create worked issue");
    let neglected = store
        .create_issue(report_issue("Flickering light"))
        .await
        .expect("create neglected issue");

    store
        .assign_issue(&worked.issue_id, &staff(), &admin(), Some("urgent".to_string()))
        .await
        .expect("assign");
    store
        .transition_issue(
            &worked.issue_id,
            IssueStatus::InProgress,
            &staff(),
            TransitionRequest::default(),
        )
        .await
        .expect("start work");
    store
        .transition_issue(
            &worked.issue_id,
            IssueStatus::Resolved,
            &staff(),
            TransitionRequest {
                resolution_notes: Some("Replaced the socket".to_string()),
            },
        )
        .await
        .expect("resolve");

    // Breach sweep: the neglected issue misses its response deadline; the
    // worked one is already resolved and out of both breach scopes.
    let sweep_time = Utc::now() + Duration::minutes(5);
    let breach = run_breach_sweep(&store, &sink, sweep_time)
        .await
        .expect("breach sweep");
    assert_eq!(breach.response_breaches, 1);
    assert_eq!(breach.resolution_breaches, 0);

    let repeat = run_breach_sweep(&store, &sink, sweep_time + Duration::hours(1))
        .await
        .expect("repeat breach sweep");
    assert_eq!(repeat.response_breaches, 0);
    assert_eq!(repeat.resolution_breaches, 0);

    // Auto-close: 49 hours after resolution the worked issue closes without
    // student confirmation.
    let late = Utc::now() + Duration::hours(49);
    let auto_close = run_auto_close_sweep(
        &store,
        &sink,
        late,
        std::time::Duration::from_secs(48 * 60 * 60),
    )
    .await
    .expect("auto-close sweep");
    assert_eq!(auto_close.closed, 1);

    let closed = store
        .get_issue(&worked.issue_id)
        .await
        .expect("get worked issue")
        .expect("worked issue exists");
    assert_eq!(closed.status, IssueStatus::Closed);
    assert_eq!(closed.verified_at, Some(late));
    assert_eq!(closed.closed_at, Some(late));

    // Everything above survives a close/reopen of the database.
    drop(store);
    drop(sink);
    let store = SqliteIssueStore::new(&db_path).expect("reopen store");
    let sink = SqliteAuditSink::new(&db_path).expect("reopen sink");

    let flagged = store
        .get_issue(&neglected.issue_id)
        .await
        .expect("get neglected issue")
        .expect("neglected issue exists");
    assert!(flagged.sla_response_breached);
    assert_eq!(flagged.status, IssueStatus::Submitted);

    let stats = store.sla_stats("campus-a").await.expect("stats");
    assert_eq!(stats.total_issues, 2);
    assert_eq!(stats.response_breaches, 1);
    assert_eq!(stats.response_compliance, 50.0);

    let audit = sink
        .query(AuditQuery {
            tenant_id: Some("campus-a".to_string()),
            ..AuditQuery::default()
        })
        .await
        .expect("audit query");
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].action, AuditAction::IssueAutoClosed);
    assert_eq!(audit[1].action, AuditAction::SlaResponseBreach);

    let assignments = store
        .list_assignments(&worked.issue_id)
        .await
        .expect("assignments");
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].assigned_by, "admin-1");
}

#[tokio::test]
async fn withdrawal_and_back_edges_round_trip() {
    let temp = tempdir().expect("create tempdir");
    let store = SqliteIssueStore::new(temp.path().join("fixflow.sqlite")).expect("create store");
    seed_category(&store, SlaTable::standard()).await;

    // Student withdraws a fresh report.
    let withdrawn = store
        .create_issue(report_issue("Wrong building"))
        .await
        .expect("create withdrawn issue");
    let withdrawn = store
        .transition_issue(
            &withdrawn.issue_id,
            IssueStatus::Closed,
            &student(),
            TransitionRequest::default(),
        )
        .await
        .expect("withdraw");
    assert_eq!(withdrawn.status, IssueStatus::Closed);
    assert!(withdrawn.closed_at.is_some());

    // Staff cycles work back and forth; first_response_at stays put.
    let cycled = store
        .create_issue(report_issue("Broken socket"))
        .await
        .expect("create cycled issue");
    store
        .assign_issue(&cycled.issue_id, &staff(), &admin(), None)
        .await
        .expect("assign");
    let started = store
        .transition_issue(
            &cycled.issue_id,
            IssueStatus::InProgress,
            &staff(),
            TransitionRequest::default(),
        )
        .await
        .expect("start work");
    let first_response_at = started.first_response_at.expect("first response stamped");

    store
        .transition_issue(
            &cycled.issue_id,
            IssueStatus::Resolved,
            &staff(),
            TransitionRequest {
                resolution_notes: Some("first fix".to_string()),
            },
        )
        .await
        .expect("resolve");
    store
        .transition_issue(
            &cycled.issue_id,
            IssueStatus::InProgress,
            &staff(),
            TransitionRequest::default(),
        )
        .await
        .expect("reopen work");
    let resolved_again = store
        .transition_issue(
            &cycled.issue_id,
            IssueStatus::Resolved,
            &staff(),
            TransitionRequest {
                resolution_notes: Some("second fix".to_string()),
            },
        )
        .await
        .expect("resolve again");

    assert_eq!(resolved_again.first_response_at, Some(first_response_at));
    assert_eq!(resolved_again.resolution_notes.as_deref(), Some("second fix"));

    // Deadlines never moved through any of it.
    assert_eq!(
        resolved_again.sla_response_deadline,
        cycled.sla_response_deadline
    );
    assert_eq!(
        resolved_again.sla_resolution_deadline,
        cycled.sla_resolution_deadline
    );

    let listing = store
        .query_issues(IssueQuery {
            tenant_id: Some("campus-a".to_string()),
            statuses: Some(vec![IssueStatus::Resolved]),
            ..IssueQuery::default()
        })
        .await
        .expect("query resolved");
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].issue_id, cycled.issue_id);
}
