//! Run diagnostics: per-stage timing and cache behaviour.
//!
//! Every completed background run carries a [`RunDiagnostics`] that
//! records which stage the run resumed from (everything upstream was
//! served from cache) and how long each executed stage took.
//!
//! Timestamps come from `web-time`. Durations serialize as fractional
//! seconds.

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::runner::RunId;

mod seconds {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}

/// How a stage produced its output in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAction {
    /// The filter ran.
    Processed,
    /// The stage is bypassed; input passed through.
    Bypassed,
    /// The stage holds a broken placeholder; input passed through.
    Broken,
}

/// Diagnostics for one executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Position in the list.
    pub index: usize,
    pub filter_id: String,
    pub action: StageAction,
    /// Wall-clock time spent producing the output.
    #[serde(with = "seconds")]
    pub duration: Duration,
}

/// Diagnostics for one completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub run: RunId,
    /// First stage that was recomputed. Stages before it were cached.
    pub start_stage: usize,
    /// Stages in the list when the run was planned.
    pub stage_count: usize,
    pub image_width: u32,
    pub image_height: u32,
    /// Only the stages this run executed, in order.
    pub stages: Vec<StageDiagnostics>,
    #[serde(with = "seconds")]
    pub total_duration: Duration,
}

impl RunDiagnostics {
    /// Stages served from cache.
    #[must_use]
    pub const fn cached_stages(&self) -> usize {
        self.start_stage
    }

    /// Diagnostics for stage `index`, if this run executed it.
    #[must_use]
    pub fn stage(&self, index: usize) -> Option<&StageDiagnostics> {
        self.stages.iter().find(|s| s.index == index)
    }

    /// Human-readable table.
    #[must_use]
    pub fn report(&self) -> String {
        let total_ms = millis(self.total_duration);
        let mut out = format!("Run {} Diagnostics\n{}\n", self.run, "=".repeat(60));
        let _ = writeln!(
            out,
            "Image: {}x{}  |  Stages: {} ({} cached)",
            self.image_width,
            self.image_height,
            self.stage_count,
            self.cached_stages(),
        );
        let _ = writeln!(out, "Total duration: {total_ms:.3}ms\n");
        let _ = writeln!(
            out,
            "{:<6} {:<32} {:>10} {:>10}  Action",
            "Stage", "Filter", "Duration", "% Total"
        );
        out.push_str(&"-".repeat(80));

        for stage in &self.stages {
            let ms = millis(stage.duration);
            let share = if total_ms > 0.0 { ms / total_ms * 100.0 } else { 0.0 };
            let action = match stage.action {
                StageAction::Processed => "processed",
                StageAction::Bypassed => "bypassed",
                StageAction::Broken => "broken (passthrough)",
            };
            let _ = write!(
                out,
                "\n{:<6} {:<32} {ms:>8.3}ms {share:>9.1}%  {action}",
                stage.index, stage.filter_id,
            );
        }
        out
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}
