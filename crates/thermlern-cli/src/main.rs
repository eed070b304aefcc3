//! CLI for thermlern.
//!
//! Runs learning passes over zone history, persists the learning records and
//! reports zone status and controller recommendations as JSON lines.

mod history;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use thermlern_adaptive::{LearningEngine, LearningStateStore, RunReport, RunRequest, ZoneHealth};
use thermlern_analysis::PhysicsBaseline;
use thermlern_core::{
    ControllerSettings, LearningRecord, LearningState, ResponseMetrics, ThermalRates,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::history::HistorySource;
use crate::state::{load_applied, load_records, save_records, InvalidZone, ZoneEntry, ZonesFile};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze each zone's recent history and update its learning record
    Learn {
        /// Zones file: `{ "learning": {...}, "zones": [...] }`
        #[arg(long)]
        zones: PathBuf,

        /// Directory with one `<zone_id>.jsonl` sample file per zone
        #[arg(long)]
        history_dir: Option<PathBuf>,

        /// Base URL of the recorder service
        #[arg(long, env = "THERMLERN_RECORDER_URL")]
        recorder_url: Option<String>,

        /// Bearer token for the recorder service
        #[arg(long, env = "THERMLERN_RECORDER_TOKEN", hide_env_values = true)]
        recorder_token: Option<String>,

        /// Only run this zone
        #[arg(long)]
        zone: Option<String>,

        /// Settings the controllers currently run with, keyed by zone id
        #[arg(long)]
        applied: Option<PathBuf>,

        #[arg(long, default_value = "data/thermlern.state.json")]
        state_file: PathBuf,

        /// End of the analyzed window (defaults to the current time)
        #[arg(long, value_parser = parse_timestamp)]
        now: Option<OffsetDateTime>,
    },
    /// Show state and health of every recorded zone
    Status {
        #[arg(long, default_value = "data/thermlern.state.json")]
        state_file: PathBuf,

        /// Also list configured zones without a record
        #[arg(long)]
        zones: Option<PathBuf>,
    },
    /// Print the recommended controller settings per zone
    Recommend {
        #[arg(long)]
        zones: PathBuf,

        #[arg(long, default_value = "data/thermlern.state.json")]
        state_file: PathBuf,

        #[arg(long)]
        applied: Option<PathBuf>,
    },
}

fn parse_timestamp(value: &str) -> std::result::Result<OffsetDateTime, String> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|e| format!("invalid RFC 3339 timestamp: {e}"))
}

/// Emits one JSON document per line on stdout.
fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ZoneFailure {
    zone_id: String,
    #[serde(with = "time::serde::rfc3339")]
    ts: OffsetDateTime,
    error: String,
}

struct LearnArgs {
    zones: PathBuf,
    source: HistorySource,
    zone: Option<String>,
    applied: Option<PathBuf>,
    state_file: PathBuf,
    now: OffsetDateTime,
}

async fn learn(args: LearnArgs) -> Result<()> {
    let zones = ZonesFile::load(&args.zones)?;
    let applied = load_applied(args.applied.as_deref())?;
    let records = load_records(&args.state_file)?;
    let store = Arc::new(LearningStateStore::from_file(records));
    let engine = LearningEngine::new(zones.learning.clone(), Arc::clone(&store))
        .context("Invalid learning configuration")?;

    let (selected, rejected): (Vec<ZoneEntry>, Vec<&InvalidZone>) = match &args.zone {
        Some(id) => match (zones.find(id), zones.find_invalid(id)) {
            (Some(entry), _) => (vec![entry.clone()], Vec::new()),
            (None, Some(invalid)) => (Vec::new(), vec![invalid]),
            (None, None) => anyhow::bail!("Zone '{id}' is not configured"),
        },
        None => (zones.zones.clone(), zones.invalid.iter().collect()),
    };

    let now = args.now;
    let mut failures = 0usize;
    for invalid in rejected {
        failures += 1;
        error!(zone = %invalid.zone_id, error = %invalid.reason, "invalid zone configuration");
        emit(&ZoneFailure {
            zone_id: invalid.zone_id.clone(),
            ts: now,
            error: format!("Invalid zone configuration: {}", invalid.reason),
        })?;
    }

    let mut tasks = Vec::with_capacity(selected.len());
    for entry in selected {
        let zone_id = entry.zone.zone_id.clone();
        let engine = engine.clone();
        let source = args.source.clone();
        let applied = applied.get(&zone_id).copied();
        let task = tokio::spawn(async move {
            let start = now - time::Duration::days(i64::from(entry.zone.learning_window_days));
            let samples = source.fetch(&entry.zone.zone_id, start, now).await;
            tokio::task::spawn_blocking(move || {
                engine.run_zone(RunRequest {
                    zone: &entry.zone,
                    samples,
                    applied,
                    mode: entry.hvac_mode,
                    now,
                })
            })
            .await
        });
        tasks.push((zone_id, task));
    }

    for (zone_id, task) in tasks {
        let outcome: Result<RunReport> = match task.await {
            Ok(Ok(Ok(report))) => Ok(report),
            Ok(Ok(Err(err))) => Err(err.into()),
            Ok(Err(join)) | Err(join) => Err(anyhow::anyhow!("learning task failed: {join}")),
        };
        match outcome {
            Ok(report) => emit(&report)?,
            Err(err) => {
                failures += 1;
                error!(zone = %zone_id, error = %err, "learning run failed");
                emit(&ZoneFailure {
                    zone_id,
                    ts: now,
                    error: format!("{err:#}"),
                })?;
            }
        }
    }

    save_records(&args.state_file, &store.to_file())?;
    info!(
        state_file = %args.state_file.display(),
        zones = store.zone_ids().len(),
        failures,
        "learning records saved"
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct ZoneStatus {
    zone_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    state: LearningState,
    analyzed_event_count: usize,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    last_updated: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    degradation_reason: Option<String>,
    health: ZoneHealth,
}

impl ZoneStatus {
    fn new(zone_id: &str, name: Option<String>, record: &LearningRecord) -> Self {
        Self {
            zone_id: zone_id.to_string(),
            name,
            state: record.state,
            analyzed_event_count: record.analyzed_event_count,
            last_updated: record.last_updated,
            degradation_reason: record.degradation_reason.clone(),
            health: ZoneHealth::assess(record, None),
        }
    }
}

fn status(state_file: &Path, zones: Option<&Path>) -> Result<()> {
    let mut records = load_records(state_file)?.records;

    if let Some(path) = zones {
        let zones = ZonesFile::load(path)?;
        for invalid in &zones.invalid {
            warn!(zone = %invalid.zone_id, error = %invalid.reason, "invalid zone configuration");
        }
        for entry in &zones.zones {
            let record = records
                .remove(&entry.zone.zone_id)
                .unwrap_or_else(LearningRecord::uninitialized);
            let name = Some(entry.zone.display_name().to_string());
            emit(&ZoneStatus::new(&entry.zone.zone_id, name, &record))?;
        }
    }
    // Records of zones no longer configured are still shown.
    for (zone_id, record) in &records {
        emit(&ZoneStatus::new(zone_id, None, record))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum RecommendationSource {
    /// Adjusted from measured responses.
    Adaptive,
    /// Kept from an earlier run while the zone learns or is degraded.
    Retained,
    /// Straight from the physics baseline.
    Physics,
}

/// Relative change of each setting against the applied one, in percent.
#[derive(Debug, Serialize)]
struct ChangePercent {
    kp: f64,
    ki: f64,
    kd: f64,
    pwm_minutes: f64,
}

impl ChangePercent {
    fn between(applied: &ControllerSettings, recommended: &ControllerSettings) -> Self {
        let pct = |from: f64, to: f64| {
            if from.abs() < f64::EPSILON {
                0.0
            } else {
                ((to - from) / from * 1000.0).round() / 10.0
            }
        };
        Self {
            kp: pct(applied.gains.kp, recommended.gains.kp),
            ki: pct(applied.gains.ki, recommended.gains.ki),
            kd: pct(applied.gains.kd, recommended.gains.kd),
            pwm_minutes: pct(applied.pwm_minutes, recommended.pwm_minutes),
        }
    }
}

#[derive(Debug, Serialize)]
struct Recommendation {
    zone_id: String,
    state: LearningState,
    source: RecommendationSource,
    tau_hours: f64,
    recommended: ControllerSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<ControllerSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    change_percent: Option<ChangePercent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<ResponseMetrics>,
    rates: ThermalRates,
}

fn recommend(zones: &Path, state_file: &Path, applied: Option<&Path>) -> Result<()> {
    let zones = ZonesFile::load(zones)?;
    let records = load_records(state_file)?.records;
    let applied = load_applied(applied)?;

    for invalid in &zones.invalid {
        warn!(zone = %invalid.zone_id, error = %invalid.reason, "invalid zone configuration, no recommendation");
    }
    for entry in &zones.zones {
        let zone = &entry.zone;
        let baseline = PhysicsBaseline::derive(zone, zones.learning.design_delta_c)
            .with_context(|| format!("Failed to derive baseline for zone '{}'", zone.zone_id))?;
        let record = records
            .get(&zone.zone_id)
            .cloned()
            .unwrap_or_else(LearningRecord::uninitialized);

        let (source, recommended) = match record.recommended {
            Some(settings) if record.state == LearningState::Tuned => {
                (RecommendationSource::Adaptive, settings.clamped_to(zone))
            }
            Some(settings) => (RecommendationSource::Retained, settings.clamped_to(zone)),
            None => (RecommendationSource::Physics, baseline.settings()),
        };
        let current = applied.get(&zone.zone_id).copied();

        emit(&Recommendation {
            zone_id: zone.zone_id.clone(),
            state: record.state,
            source,
            tau_hours: baseline.tau_hours,
            recommended,
            applied: current,
            change_percent: current.map(|a| ChangePercent::between(&a, &recommended)),
            metrics: record.metrics.clone(),
            rates: baseline.rates.merged_with(record.rates),
        })?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("THERMLERN_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Learn {
            zones,
            history_dir,
            recorder_url,
            recorder_token,
            zone,
            applied,
            state_file,
            now,
        } => {
            let source = match (history_dir, recorder_url) {
                (Some(dir), _) => HistorySource::Directory(dir),
                (None, Some(url)) => HistorySource::recorder(&url, recorder_token)?,
                (None, None) => {
                    anyhow::bail!("Either --history-dir or --recorder-url must be given")
                }
            };
            learn(LearnArgs {
                zones,
                source,
                zone,
                applied,
                state_file,
                now: now.unwrap_or_else(OffsetDateTime::now_utc),
            })
            .await?;
        }
        Commands::Status { state_file, zones } => status(&state_file, zones.as_deref())?,
        Commands::Recommend {
            zones,
            state_file,
            applied,
        } => recommend(&zones, &state_file, applied.as_deref())?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use thermlern_core::PidGains;

    fn settings(kp: f64, ki: f64, kd: f64, pwm: f64) -> ControllerSettings {
        ControllerSettings {
            gains: PidGains { kp, ki, kd },
            pwm_minutes: pwm,
        }
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2024-01-10T06:00:00Z").unwrap();
        assert_eq!(ts.unix_timestamp(), 1_704_866_400);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_change_percent() {
        let change = ChangePercent::between(&settings(10.0, 1.0, 50.0, 30.0), &settings(8.5, 1.2, 50.0, 25.0));
        assert!((change.kp + 15.0).abs() < 1e-9);
        assert!((change.ki - 20.0).abs() < 1e-9);
        assert!(change.kd.abs() < 1e-9);
        assert!((change.pwm_minutes + 16.7).abs() < 1e-9);
    }

    #[test]
    fn test_change_percent_from_zero() {
        let change = ChangePercent::between(&settings(0.0, 1.0, 1.0, 10.0), &settings(2.0, 1.0, 1.0, 10.0));
        assert_eq!(change.kp, 0.0);
    }

    #[test]
    fn test_status_of_unconfigured_record() {
        let record = LearningRecord {
            state: LearningState::Degraded,
            degradation_reason: Some("history unavailable: gone".to_string()),
            ..LearningRecord::uninitialized()
        };
        let status = ZoneStatus::new("attic", None, &record);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "degraded");
        assert_eq!(json["health"]["status"], "critical");
        assert!(json.get("name").is_none());
    }
}
