//! Files the CLI reads and writes: zone configuration, applied controller
//! settings and the persisted learning records.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thermlern_adaptive::{HvacMode, RecordFile};
use thermlern_core::{ControllerSettings, LearningConfig, ZoneConfig};

/// One configured zone and the mode its climate entity is in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneEntry {
    #[serde(flatten)]
    pub zone: ZoneConfig,
    #[serde(default)]
    pub hvac_mode: HvacMode,
}

/// A configured zone that could not be parsed or failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidZone {
    pub zone_id: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct RawZonesFile {
    #[serde(default)]
    learning: LearningConfig,
    zones: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ZonesFile {
    pub learning: LearningConfig,
    pub zones: Vec<ZoneEntry>,
    /// Zones kept aside so the others still run.
    pub invalid: Vec<InvalidZone>,
}

impl ZonesFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open zones file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to parse zones file {}", path.display()))
    }

    /// The learning section and the file layout must be valid. Zones are
    /// checked one by one and the bad ones end up in `invalid`.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawZonesFile = serde_json::from_str(text)?;
        raw.learning
            .validate()
            .map_err(|reason| anyhow::anyhow!("Invalid learning configuration: {reason}"))?;

        let mut file = ZonesFile {
            learning: raw.learning,
            ..Default::default()
        };
        let mut seen = HashSet::new();
        for (idx, value) in raw.zones.into_iter().enumerate() {
            let zone_id = value
                .get("zone_id")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .with_context(|| format!("Zone entry {idx} has no zone_id"))?;
            if !seen.insert(zone_id.clone()) {
                anyhow::bail!("Duplicate zone id '{zone_id}'");
            }

            let checked = serde_json::from_value::<ZoneEntry>(value)
                .map_err(|e| e.to_string())
                .and_then(|entry| entry.zone.validate().map(|()| entry).map_err(|e| e.to_string()));
            match checked {
                Ok(entry) => file.zones.push(entry),
                Err(reason) => file.invalid.push(InvalidZone { zone_id, reason }),
            }
        }
        Ok(file)
    }

    pub fn find(&self, zone_id: &str) -> Option<&ZoneEntry> {
        self.zones.iter().find(|e| e.zone.zone_id == zone_id)
    }

    pub fn find_invalid(&self, zone_id: &str) -> Option<&InvalidZone> {
        self.invalid.iter().find(|z| z.zone_id == zone_id)
    }
}

/// Settings the control loop currently runs with, keyed by zone id.
pub type AppliedSettings = BTreeMap<String, ControllerSettings>;

pub fn load_applied(path: Option<&Path>) -> Result<AppliedSettings> {
    let Some(path) = path else {
        return Ok(AppliedSettings::new());
    };
    let file = File::open(path)
        .with_context(|| format!("Failed to open applied settings {}", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("Failed to parse applied settings {}", path.display()))
}

/// Reads the record file; a missing file is an empty store.
pub fn load_records(path: &Path) -> Result<RecordFile> {
    if !path.exists() {
        return Ok(RecordFile::default());
    }
    let file = File::open(path)
        .with_context(|| format!("Failed to open state file {}", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("Failed to parse state file {}", path.display()))
}

/// Writes the record file next to its destination, then renames it into
/// place so readers never see a half-written file.
pub fn save_records(path: &Path, records: &RecordFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let tmp = temp_path(path);
    {
        let file = File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.write_all(b"\n")?;
        writer
            .into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move state file into place at {}", path.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermlern_core::{LearningRecord, LearningState};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("thermlern_state_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_state_file_is_empty() {
        let dir = scratch("missing");
        let records = load_records(&dir.join("records.json")).unwrap();
        assert!(records.records.is_empty());
    }

    #[test]
    fn save_then_load_records() {
        let dir = scratch("roundtrip");
        let path = dir.join("nested").join("records.json");
        let mut file = RecordFile::default();
        file.records.insert(
            "bath".to_string(),
            LearningRecord {
                state: LearningState::Learning,
                analyzed_event_count: 2,
                ..LearningRecord::uninitialized()
            },
        );

        save_records(&path, &file).unwrap();
        assert!(!temp_path(&path).exists());
        let restored = load_records(&path).unwrap();
        assert_eq!(restored.records, file.records);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn zone_entries_default_to_heat_mode() {
        let json = r#"{
            "zones": [{
                "zone_id": "bath",
                "area_m2": 8,
                "heating_type": "floor_electric",
                "energy_class": "B",
                "pid_bounds": {
                    "kp": {"min": 0.5, "max": 8},
                    "ki": {"min": 0.01, "max": 0.5},
                    "kd": {"min": 0.5, "max": 20}
                },
                "pwm_bounds": {"min": 10, "max": 60}
            }]
        }"#;
        let zones = ZonesFile::parse(json).unwrap();
        assert!(zones.invalid.is_empty());
        assert_eq!(zones.zones[0].hvac_mode, HvacMode::Heat);
        assert_eq!(zones.zones[0].zone.min_learning_events, 3);
        assert!(zones.find("bath").is_some());
    }

    #[test]
    fn duplicate_zone_ids_are_rejected() {
        let dir = scratch("dupes");
        std::fs::create_dir_all(&dir).unwrap();
        let zone = r#"{"zone_id":"bath","area_m2":8,"heating_type":"radiator","energy_class":"C",
            "pid_bounds":{"kp":{"min":0.5,"max":8},"ki":{"min":0.01,"max":0.5},"kd":{"min":0.5,"max":20}},
            "pwm_bounds":{"min":10,"max":60}}"#;
        let path = dir.join("zones.json");
        std::fs::write(&path, format!(r#"{{"zones":[{zone},{zone}]}}"#)).unwrap();

        let err = ZonesFile::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Duplicate zone id"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_zones_are_set_aside() {
        let json = r#"{
            "zones": [
                {"zone_id":"bath","area_m2":0,"heating_type":"radiator","energy_class":"C",
                 "pid_bounds":{"kp":{"min":0.5,"max":8},"ki":{"min":0.01,"max":0.5},"kd":{"min":0.5,"max":20}},
                 "pwm_bounds":{"min":10,"max":60}},
                {"zone_id":"hall","area_m2":12,"heating_type":"steam","energy_class":"C",
                 "pid_bounds":{"kp":{"min":0.5,"max":8},"ki":{"min":0.01,"max":0.5},"kd":{"min":0.5,"max":20}},
                 "pwm_bounds":{"min":10,"max":60}},
                {"zone_id":"kitchen","area_m2":15,"heating_type":"radiator","energy_class":"C",
                 "pid_bounds":{"kp":{"min":0.5,"max":8},"ki":{"min":0.01,"max":0.5},"kd":{"min":0.5,"max":20}},
                 "pwm_bounds":{"min":10,"max":60}}
            ]
        }"#;
        let zones = ZonesFile::parse(json).unwrap();
        assert_eq!(zones.zones.len(), 1);
        assert!(zones.find("kitchen").is_some());

        let bath = zones.find_invalid("bath").unwrap();
        assert!(bath.reason.contains("area_m2"), "{}", bath.reason);
        let hall = zones.find_invalid("hall").unwrap();
        assert!(hall.reason.contains("steam"), "{}", hall.reason);
    }

    #[test]
    fn zone_without_id_fails_the_file() {
        let err = ZonesFile::parse(r#"{"zones":[{"area_m2":8}]}"#).unwrap_err();
        assert!(err.to_string().contains("no zone_id"));
    }
}
