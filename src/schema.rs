use serde::{Deserialize, Serialize};

use crate::harness::MeasurementResult;

/// Bumped whenever [`ContractReport`] changes shape.
pub const SCHEMA_VERSION: u32 = 1;

/// The one-line machine-readable record printed to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub name: String,
    pub iterations: u64,
    pub avg_ms: f64,
    pub exit_code: i32,
    pub note: String,
}

impl SummaryRecord {
    /// Render as a single JSON line with `avg_ms` fixed to three decimals.
    pub fn to_line(&self) -> serde_json::Result<String> {
        Ok(format!(
            "{{\"name\": {}, \"iterations\": {}, \"avg_ms\": {:.3}, \"exit_code\": {}, \"note\": {}}}",
            serde_json::to_string(&self.name)?,
            self.iterations,
            self.avg_ms,
            self.exit_code,
            serde_json::to_string(&self.note)?,
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub harness_version: String,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
}

impl RunMeta {
    pub fn current() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp_utc: now_utc_unix(),
            git_sha: git_sha_short(),
        }
    }
}

/// Full report written with `--out`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractReport {
    pub run: RunMeta,
    /// SHA-256 of the target executable at measurement time.
    pub target_sha256: Option<String>,
    pub measurement: MeasurementResult,
    pub note: String,
}

fn now_utc_unix() -> String {
    // Format: unix:<seconds>
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    // Best-effort: read from environment set by CI/build scripts.
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}
