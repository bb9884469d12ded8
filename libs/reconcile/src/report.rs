//! Run reporting.
//!
//! The [`Reporter`] is a cloneable handle shared by every unit of a run.
//! [`Reporter::finish`] turns what was recorded into an [`AggregateReport`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use netsync_id::RunId;
use serde::Serialize;

use crate::error::{DataQualityWarning, UnitError, WriteError};
use crate::reconciler::ReconciliationResult;

/// What happened to one target.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TargetOutcome {
    Succeeded {
        result: ReconciliationResult,
    },
    Failed {
        kind: String,
        error: String,
        /// Present when the unit got as far as applying a plan.
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<ReconciliationResult>,
    },
    Skipped {
        reason: String,
    },
}

impl TargetOutcome {
    /// Build a failure outcome from a unit error.
    pub fn failed(error: &UnitError, result: Option<ReconciliationResult>) -> Self {
        Self::Failed {
            kind: error.kind().to_string(),
            error: error.to_string(),
            result,
        }
    }

    pub fn result(&self) -> Option<&ReconciliationResult> {
        match self {
            Self::Succeeded { result } => Some(result),
            Self::Failed { result, .. } => result.as_ref(),
            Self::Skipped { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "ok",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// One target's entry in the report.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target: String,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub outcome: TargetOutcome,
}

/// Run-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed_writes: usize,
    pub warnings: usize,
    pub targets_succeeded: usize,
    pub targets_failed: usize,
    pub targets_skipped: usize,
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub targets: Vec<TargetReport>,
    pub totals: Totals,
}

impl AggregateReport {
    /// Every data-quality warning with the target it was raised for.
    pub fn warnings(&self) -> Vec<(&str, &DataQualityWarning)> {
        self.targets
            .iter()
            .filter_map(|t| t.outcome.result().map(|r| (t.target.as_str(), r)))
            .flat_map(|(target, r)| r.warnings.iter().map(move |w| (target, w)))
            .collect()
    }

    /// Every failed write with the target it belongs to.
    pub fn write_failures(&self) -> Vec<(&str, &WriteError)> {
        self.targets
            .iter()
            .filter_map(|t| t.outcome.result().map(|r| (t.target.as_str(), r)))
            .flat_map(|(target, r)| r.failures.iter().map(move |f| (target, f)))
            .collect()
    }

    /// True when any target failed or any write failed.
    pub fn has_failures(&self) -> bool {
        self.totals.targets_failed > 0 || self.totals.failed_writes > 0
    }

    pub fn target(&self, name: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.target == name)
    }
}

struct ReporterState {
    run_id: RunId,
    started_at: DateTime<Utc>,
    started: Instant,
    targets: Vec<TargetReport>,
}

/// Thread-safe accumulator of per-target outcomes.
#[derive(Clone)]
pub struct Reporter {
    state: Arc<Mutex<ReporterState>>,
}

impl Reporter {
    /// Start a new run.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ReporterState {
                run_id: RunId::new(),
                started_at: Utc::now(),
                started: Instant::now(),
                targets: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn run_id(&self) -> RunId {
        self.lock().run_id
    }

    /// Record a target's outcome.
    pub fn record(&self, target: impl Into<String>, outcome: TargetOutcome, elapsed: Duration) {
        self.lock().targets.push(TargetReport {
            target: target.into(),
            elapsed_ms: elapsed.as_millis() as u64,
            outcome,
        });
    }

    pub fn record_skipped(&self, target: impl Into<String>, reason: impl Into<String>) {
        self.record(
            target,
            TargetOutcome::Skipped {
                reason: reason.into(),
            },
            Duration::ZERO,
        );
    }

    /// Produce the aggregate report. Targets are ordered by name.
    pub fn finish(&self) -> AggregateReport {
        let state = self.lock();
        let mut targets = state.targets.clone();
        targets.sort_by(|a, b| a.target.cmp(&b.target));

        let mut totals = Totals::default();
        for target in &targets {
            match &target.outcome {
                TargetOutcome::Succeeded { .. } => totals.targets_succeeded += 1,
                TargetOutcome::Failed { .. } => totals.targets_failed += 1,
                TargetOutcome::Skipped { .. } => totals.targets_skipped += 1,
            }
            if let Some(result) = target.outcome.result() {
                totals.created += result.created;
                totals.updated += result.updated;
                totals.deleted += result.deleted;
                totals.unchanged += result.unchanged;
                totals.failed_writes += result.failed();
                totals.warnings += result.warnings.len();
            }
        }

        AggregateReport {
            run_id: state.run_id,
            started_at: state.started_at,
            elapsed_ms: state.started.elapsed().as_millis() as u64,
            targets,
            totals,
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}
