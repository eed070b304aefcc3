//! Zone health for monitoring collaborators.

use serde::{Deserialize, Serialize};
use thermlern_analysis::CycleStatistics;
use thermlern_core::{LearningRecord, LearningState};

/// Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneHealth {
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl ZoneHealth {
    /// Assesses a zone from its record and, when a run just produced them,
    /// its cycle statistics.
    #[must_use]
    pub fn assess(record: &LearningRecord, statistics: Option<&CycleStatistics>) -> Self {
        let mut health = Self::default();

        match record.state {
            LearningState::Degraded => health.raise(
                HealthStatus::Critical,
                record
                    .degradation_reason
                    .as_deref()
                    .map_or_else(|| "degraded".to_string(), |r| format!("degraded: {r}")),
            ),
            LearningState::Uninitialized => {
                health.raise(HealthStatus::Warning, "never analyzed".to_string());
            }
            LearningState::Learning | LearningState::Tuned => {}
        }

        if let Some(stats) = statistics {
            if stats.very_short_cycles > 0 {
                health.raise(
                    HealthStatus::Critical,
                    format!("{} very short heating cycles", stats.very_short_cycles),
                );
            } else if stats.short_cycles > 0 {
                health.raise(
                    HealthStatus::Warning,
                    format!("{} short heating cycles", stats.short_cycles),
                );
            }
        }

        health
    }

    fn raise(&mut self, status: HealthStatus, issue: String) {
        self.status = self.status.max(status);
        self.issues.push(issue);
    }
}
