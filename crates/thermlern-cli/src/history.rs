//! Fetching a zone's sample window from local files or a recorder service.
//!
//! Failures here are not fatal to the run: they become a [`DataError`] that
//! degrades the affected zone only.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use thermlern_core::{DataError, Sample};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

/// Where zone history comes from.
#[derive(Debug, Clone)]
pub enum HistorySource {
    /// `<dir>/<zone_id>.jsonl`, one sample per line.
    Directory(PathBuf),
    /// `GET <base>/zones/<zone_id>/samples?start=..&end=..` answering a JSON array.
    Recorder {
        client: reqwest::Client,
        base: String,
        token: Option<String>,
    },
}

impl HistorySource {
    pub fn recorder(base: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::Recorder {
            client,
            base: base.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Samples of `zone_id` with `start <= ts <= end`, in file/service order.
    pub async fn fetch(
        &self,
        zone_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> std::result::Result<Vec<Sample>, DataError> {
        let samples = match self {
            HistorySource::Directory(dir) => read_jsonl(dir.join(format!("{zone_id}.jsonl"))).await?,
            HistorySource::Recorder {
                client,
                base,
                token,
            } => fetch_recorder(client, base, token.as_deref(), zone_id, start, end).await?,
        };
        let total = samples.len();
        let windowed: Vec<Sample> = samples
            .into_iter()
            .filter(|s| s.ts >= start && s.ts <= end)
            .collect();
        debug!(zone = zone_id, total, kept = windowed.len(), "history fetched");
        Ok(windowed)
    }
}

async fn read_jsonl(path: PathBuf) -> std::result::Result<Vec<Sample>, DataError> {
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| DataError::SourceUnavailable(format!("{}: {e}", path.display())))?;
    parse_jsonl(&text).map_err(|e| DataError::SourceUnavailable(format!("{}: {e}", path.display())))
}

/// Parses JSON lines, skipping blank ones.
fn parse_jsonl(text: &str) -> std::result::Result<Vec<Sample>, String> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| format!("line {}: {e}", idx + 1))
        })
        .collect()
}

async fn fetch_recorder(
    client: &reqwest::Client,
    base: &str,
    token: Option<&str>,
    zone_id: &str,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> std::result::Result<Vec<Sample>, DataError> {
    let unavailable = |e: &dyn std::fmt::Display| DataError::SourceUnavailable(format!("recorder: {e}"));
    let stamp = |ts: OffsetDateTime| ts.format(&Rfc3339).map_err(|e| unavailable(&e));

    let url = format!("{base}/zones/{zone_id}/samples");
    let mut request = client
        .get(&url)
        .query(&[("start", stamp(start)?), ("end", stamp(end)?)]);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| unavailable(&e))?;
    response
        .json::<Vec<Sample>>()
        .await
        .map_err(|e| unavailable(&e))
}
