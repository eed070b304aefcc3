//! Sole owner of the per-zone learning records.
//!
//! Each zone's record sits behind its own mutex. Runs lock it twice: briefly
//! to snapshot the prior record and once more for the commit. Analysis
//! happens between the two without holding any lock, so zones never block
//! each other and a slow zone never blocks a reader.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thermlern_core::{
    ControllerSettings, LearningError, LearningRecord, LearningState, Result, ZoneConfig,
    RECORD_SCHEMA_VERSION,
};
use tracing::{info, warn};

/// Persisted form of all records, keyed by zone id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFile {
    pub schema_version: u32,
    pub records: BTreeMap<String, LearningRecord>,
}

#[derive(Debug, Default)]
pub struct LearningStateStore {
    zones: RwLock<HashMap<String, Arc<Mutex<LearningRecord>>>>,
}

impl LearningStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores records from their persisted form.
    ///
    /// Records written by a newer schema are kept best-effort: their known
    /// fields are used and everything else was already dropped on parse.
    #[must_use]
    pub fn from_file(file: RecordFile) -> Self {
        if file.schema_version > RECORD_SCHEMA_VERSION {
            warn!(
                found = file.schema_version,
                supported = RECORD_SCHEMA_VERSION,
                "record file written by a newer version, reading known fields only"
            );
        }
        let zones = file
            .records
            .into_iter()
            .map(|(zone_id, record)| {
                if record.is_newer_schema() {
                    warn!(zone = %zone_id, version = record.schema_version, "record has newer schema");
                }
                (zone_id, Arc::new(Mutex::new(record)))
            })
            .collect();
        Self {
            zones: RwLock::new(zones),
        }
    }

    #[must_use]
    pub fn to_file(&self) -> RecordFile {
        RecordFile {
            schema_version: RECORD_SCHEMA_VERSION,
            records: self.export(),
        }
    }

    /// Copy of every record, ordered by zone id.
    #[must_use]
    pub fn export(&self) -> BTreeMap<String, LearningRecord> {
        let zones = self.zones.read();
        zones
            .iter()
            .map(|(id, slot)| (id.clone(), slot.lock().clone()))
            .collect()
    }

    #[must_use]
    pub fn zone_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.zones.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Current record of a zone; an uninitialized one if it was never analyzed.
    #[must_use]
    pub fn snapshot(&self, zone_id: &str) -> LearningRecord {
        let slot = self.zones.read().get(zone_id).cloned();
        slot.map_or_else(LearningRecord::uninitialized, |slot| slot.lock().clone())
    }

    #[must_use]
    pub fn state(&self, zone_id: &str) -> LearningState {
        self.snapshot(zone_id).state
    }

    /// What the control loop should apply, if anything was ever recommended.
    #[must_use]
    pub fn recommendation(&self, zone_id: &str) -> Option<ControllerSettings> {
        self.snapshot(zone_id).recommended
    }

    /// Replaces a zone's record with what `update` builds from the current one.
    ///
    /// `update` runs under the zone's lock. The new record is checked before
    /// it is stored; if `update` fails or the check rejects the record, the
    /// previous record stays in place untouched.
    pub fn commit<F>(&self, zone: &ZoneConfig, update: F) -> Result<LearningRecord>
    where
        F: FnOnce(&LearningRecord) -> Result<LearningRecord>,
    {
        let slot = self.slot(&zone.zone_id);
        let mut current = slot.lock();

        let next = update(&current)?;
        check(zone, &next)?;

        if current.state != next.state {
            info!(
                zone = %zone.zone_id,
                from = %current.state,
                to = %next.state,
                "learning state changed"
            );
        }
        *current = next.clone();
        Ok(next)
    }

    fn slot(&self, zone_id: &str) -> Arc<Mutex<LearningRecord>> {
        if let Some(slot) = self.zones.read().get(zone_id) {
            return Arc::clone(slot);
        }
        let mut zones = self.zones.write();
        Arc::clone(
            zones
                .entry(zone_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(LearningRecord::uninitialized()))),
        )
    }
}

fn check(zone: &ZoneConfig, record: &LearningRecord) -> Result<()> {
    if let Some(settings) = &record.recommended {
        if !settings.within_bounds(zone) {
            return Err(LearningError::Commit(format!(
                "recommendation {settings:?} outside bounds of zone '{}'",
                zone.zone_id
            )));
        }
    }
    if record.state == LearningState::Tuned && record.analyzed_event_count < zone.min_learning_events {
        return Err(LearningError::Commit(format!(
            "tuned with {} analyzed events, {} required",
            record.analyzed_event_count, zone.min_learning_events
        )));
    }
    if record.state == LearningState::Degraded && record.degradation_reason.is_none() {
        return Err(LearningError::Commit("degraded without a reason".to_string()));
    }
    Ok(())
}
