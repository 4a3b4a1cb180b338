//! SLA budgets and the pure deadline calculator.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Priority;

/// Error raised when an SLA table cannot answer for a priority.
///
/// Surfaces as a hard failure at issue creation; a silently-missing budget
/// would make breach detection meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SlaConfigError {
    #[error("no sla budget configured for priority {0:?}")]
    MissingPriority(Priority),
}

/// Time budget promised for one priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaBudget {
    pub response_minutes: u32,
    pub resolution_hours: u32,
}

/// Mapping from priority to its SLA budget, owned by a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlaTable {
    budgets: HashMap<Priority, SlaBudget>,
}

impl SlaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard campus budgets used by seeded categories.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.set(
            Priority::Critical,
            SlaBudget {
                response_minutes: 60,
                resolution_hours: 4,
            },
        );
        table.set(
            Priority::High,
            SlaBudget {
                response_minutes: 240,
                resolution_hours: 24,
            },
        );
        table.set(
            Priority::Medium,
            SlaBudget {
                response_minutes: 1440,
                resolution_hours: 72,
            },
        );
        table.set(
            Priority::Low,
            SlaBudget {
                response_minutes: 2880,
                resolution_hours: 168,
            },
        );
        table
    }

    pub fn set(&mut self, priority: Priority, budget: SlaBudget) {
        self.budgets.insert(priority, budget);
    }

    pub fn get(&self, priority: Priority) -> Option<SlaBudget> {
        self.budgets.get(&priority).copied()
    }
}

/// Absolute deadlines stamped onto an issue at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaDeadlines {
    pub response_deadline: DateTime<Utc>,
    pub resolution_deadline: DateTime<Utc>,
}

/// Computes both deadlines from a category's SLA table. Pure and
/// deterministic; fails fast when the table has no entry for `priority`
/// rather than falling back to a default.
pub fn compute_deadlines(
    table: &SlaTable,
    priority: Priority,
    created_at: DateTime<Utc>,
) -> Result<SlaDeadlines, SlaConfigError> {
    let budget = table
        .get(priority)
        .ok_or(SlaConfigError::MissingPriority(priority))?;

    Ok(SlaDeadlines {
        response_deadline: created_at + Duration::minutes(i64::from(budget.response_minutes)),
        resolution_deadline: created_at + Duration::hours(i64::from(budget.resolution_hours)),
    })
}
