//! The per-zone learning run.
//!
//! A run takes a zone's configuration and an already materialized sample
//! window, analyzes it without holding any lock and commits the outcome to
//! the [`LearningStateStore`] in one step:
//!
//! | input | state | recommendation |
//! |---|---|---|
//! | invalid zone configuration | unchanged (error) | unchanged |
//! | history missing or invalid | `Degraded` | last known good, baseline if none |
//! | fewer cycles than `min_learning_events` | `Learning` | unchanged, baseline if none |
//! | enough cycles | `Tuned` | adjusted from applied settings or baseline |
//! | zone not heating | unchanged (skipped) | unchanged |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thermlern_analysis::{
    CycleExtractor, CycleStatistics, PhysicsBaseline, ResponseAnalyzer, ResponseOutcome,
    ThermalRateEstimator,
};
use thermlern_core::{
    ConfigError, ControllerSettings, DataError, LearningConfig, LearningRecord, LearningState,
    ResponseMetrics, Result, Sample, SampleWindow, ThermalRates, ZoneConfig, RECORD_SCHEMA_VERSION,
};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::adjust::{AdaptiveAdjustmentEngine, Adjustment, BoundsCorrection, PwmChange};
use crate::health::ZoneHealth;
use crate::store::LearningStateStore;

/// Operating mode of the zone's climate entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    #[default]
    Heat,
    Cool,
    HeatCool,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Committed,
    InsufficientData,
    Degraded,
    Skipped,
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub zone: &'a ZoneConfig,
    /// The history window, or why it could not be read.
    pub samples: std::result::Result<Vec<Sample>, DataError>,
    /// Settings the control loop currently runs with, when known.
    pub applied: Option<ControllerSettings>,
    pub mode: HvacMode,
    pub now: OffsetDateTime,
}

/// What a run did, for callers and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub zone_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub outcome: RunOutcome,
    pub state: LearningState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<ControllerSettings>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fired_rules: Vec<String>,
    #[serde(default)]
    pub pwm_change: PwmChange,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounds_corrections: Vec<BoundsCorrection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ResponseMetrics>,
    #[serde(default)]
    pub rates: ThermalRates,
    pub analyzed_event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<CycleStatistics>,
    pub health: ZoneHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degradation_reason: Option<String>,
}

impl RunReport {
    fn from_record(
        zone_id: &str,
        now: OffsetDateTime,
        outcome: RunOutcome,
        record: &LearningRecord,
        statistics: Option<CycleStatistics>,
    ) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            ts: now,
            outcome,
            state: record.state,
            recommendation: record.recommended,
            fired_rules: Vec::new(),
            pwm_change: PwmChange::Unchanged,
            bounds_corrections: Vec::new(),
            metrics: record.metrics.clone(),
            rates: record.rates,
            analyzed_event_count: record.analyzed_event_count,
            health: ZoneHealth::assess(record, statistics.as_ref()),
            statistics,
            degradation_reason: record.degradation_reason.clone(),
        }
    }
}

/// Runs learning for zones against a shared store.
#[derive(Debug, Clone)]
pub struct LearningEngine {
    config: LearningConfig,
    store: Arc<LearningStateStore>,
}

impl LearningEngine {
    pub fn new(config: LearningConfig, store: Arc<LearningStateStore>) -> Result<Self> {
        config.validate().map_err(ConfigError::Learning)?;
        Ok(Self { config, store })
    }

    #[must_use]
    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<LearningStateStore> {
        &self.store
    }

    /// Learns from one zone's window and commits the result.
    ///
    /// Returns an error only for invalid configuration or a rejected commit;
    /// the zone's record is untouched in both cases. Bad history is not an
    /// error: the zone degrades and the report says so.
    pub fn run_zone(&self, request: RunRequest<'_>) -> Result<RunReport> {
        let zone = request.zone;
        let now = request.now;

        if request.mode != HvacMode::Heat {
            info!(zone = %zone.zone_id, mode = ?request.mode, "zone not heating, skipped");
            let record = self.store.snapshot(&zone.zone_id);
            return Ok(RunReport::from_record(
                &zone.zone_id,
                now,
                RunOutcome::Skipped,
                &record,
                None,
            ));
        }

        let baseline = PhysicsBaseline::derive(zone, self.config.design_delta_c)?;
        let rules = self.config.rules_for(zone);

        let window = match request.samples.and_then(SampleWindow::new) {
            Ok(window) => window,
            Err(err) => return self.degrade(zone, &baseline, &err, now),
        };

        let cycles = CycleExtractor::from_config(&self.config).extract(&window);
        let statistics = CycleStatistics::from_cycles(
            &cycles,
            window.span(),
            zone.short_cycle_warning_minutes,
            zone.very_short_cycle_minutes,
        );
        let analysis = ResponseAnalyzer::from_config(&self.config).analyze(
            &window,
            &cycles,
            zone.min_learning_events,
        );
        let measured_rates = ThermalRateEstimator::from_config(&self.config).estimate(&cycles);

        let base = request.applied.unwrap_or_else(|| baseline.settings());
        let adjustment = AdaptiveAdjustmentEngine::from_config(&self.config).adjust(
            zone,
            rules,
            &analysis.outcome,
            &statistics,
            base,
        );

        let analyzed = analysis.outcome.analyzed();
        let record = self.store.commit(zone, |prev| {
            let (state, metrics, recommended) = match &analysis.outcome {
                // Uninitialized enters Learning and leaves it in the same
                // commit when the first window already holds enough cycles.
                ResponseOutcome::Measured(metrics) => (
                    LearningState::Tuned,
                    Some(metrics.clone()),
                    adjustment.settings,
                ),
                ResponseOutcome::InsufficientData { .. } => (
                    LearningState::Learning,
                    prev.metrics.clone(),
                    known_good(zone, prev, &baseline),
                ),
            };
            Ok(LearningRecord {
                schema_version: RECORD_SCHEMA_VERSION,
                state,
                metrics,
                rates: baseline
                    .rates
                    .merged_with(prev.rates)
                    .merged_with(measured_rates),
                analyzed_event_count: analyzed,
                recommended: Some(recommended),
                last_updated: Some(now),
                degradation_reason: None,
            })
        })?;

        let outcome = match analysis.outcome {
            ResponseOutcome::Measured(_) => RunOutcome::Committed,
            ResponseOutcome::InsufficientData { analyzed, required } => {
                info!(zone = %zone.zone_id, analyzed, required, "not enough cycles yet");
                RunOutcome::InsufficientData
            }
        };
        info!(
            zone = %zone.zone_id,
            state = %record.state,
            fired = adjustment.fired_rules.len(),
            "learning run committed"
        );

        let Adjustment {
            fired_rules,
            pwm_change,
            bounds_corrections,
            ..
        } = adjustment;
        Ok(RunReport {
            fired_rules,
            pwm_change,
            bounds_corrections,
            ..RunReport::from_record(&zone.zone_id, now, outcome, &record, Some(statistics))
        })
    }

    fn degrade(
        &self,
        zone: &ZoneConfig,
        baseline: &PhysicsBaseline,
        err: &DataError,
        now: OffsetDateTime,
    ) -> Result<RunReport> {
        warn!(zone = %zone.zone_id, error = %err, "history unusable, zone degraded");
        let record = self.store.commit(zone, |prev| {
            Ok(LearningRecord {
                schema_version: RECORD_SCHEMA_VERSION,
                state: LearningState::Degraded,
                rates: baseline.rates.merged_with(prev.rates),
                recommended: Some(known_good(zone, prev, baseline)),
                last_updated: Some(now),
                degradation_reason: Some(err.to_string()),
                ..prev.clone()
            })
        })?;
        Ok(RunReport::from_record(
            &zone.zone_id,
            now,
            RunOutcome::Degraded,
            &record,
            None,
        ))
    }
}

/// The record's last recommendation, or the baseline for a fresh zone.
/// Clamped, since the zone's bounds may have moved since it was stored.
fn known_good(zone: &ZoneConfig, prev: &LearningRecord, baseline: &PhysicsBaseline) -> ControllerSettings {
    prev.recommended
        .map_or_else(|| baseline.settings(), |s| s.clamped_to(zone))
}
