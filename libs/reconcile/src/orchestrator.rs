//! Bounded, failure-isolated execution of reconciliation units.
//!
//! One unit runs per target on a semaphore-gated task set. A unit that
//! fails or panics is recorded and its siblings keep running. When the
//! optional deadline passes, targets not yet started are reported as
//! skipped while in-flight units finish.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::UnitError;
use crate::reconciler::ReconciliationResult;
use crate::report::{AggregateReport, Reporter, TargetOutcome};

/// Default worker pool size.
pub const DEFAULT_MAX_PARALLELISM: usize = 50;

/// Upper bound on the worker pool size.
pub const MAX_PARALLELISM_LIMIT: usize = 256;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum units in flight.
    pub max_parallelism: usize,

    /// Stop scheduling new units after this long.
    pub deadline: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            deadline: None,
        }
    }
}

/// Runs one reconciliation unit per target.
pub struct Orchestrator {
    config: OrchestratorConfig,
    reporter: Reporter,
}

impl Orchestrator {
    /// Create an orchestrator with a fresh reporter.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_reporter(config, Reporter::new())
    }

    /// Create an orchestrator that records into an existing reporter.
    pub fn with_reporter(config: OrchestratorConfig, reporter: Reporter) -> Self {
        Self { config, reporter }
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Run `unit` for every target and return the aggregate report.
    pub async fn run<T, F, Fut>(&self, targets: Vec<T>, unit: F) -> AggregateReport
    where
        T: Display + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReconciliationResult, UnitError>> + Send + 'static,
    {
        let parallelism = self.config.max_parallelism.clamp(1, MAX_PARALLELISM_LIMIT);
        let deadline = self.config.deadline.map(|d| Instant::now() + d);
        let semaphore = Arc::new(Semaphore::new(parallelism));
        let unit = Arc::new(unit);
        let mut tasks = JoinSet::new();

        info!(
            targets = targets.len(),
            parallelism,
            deadline_secs = self.config.deadline.map(|d| d.as_secs()),
            "Starting run"
        );

        let mut pending = targets.into_iter();
        while let Some(target) = pending.next() {
            let Some(permit) = acquire(&semaphore, deadline).await else {
                warn!(target = %target, "Deadline reached, skipping remaining targets");
                for target in std::iter::once(target).chain(pending.by_ref()) {
                    self.reporter
                        .record_skipped(target.to_string(), "deadline reached before start");
                }
                break;
            };

            let label = target.to_string();
            let unit = Arc::clone(&unit);
            let reporter = self.reporter.clone();
            let span = info_span!("unit", target = %label);

            tasks.spawn(
                async move {
                    let _permit = permit;
                    let started = std::time::Instant::now();
                    let outcome = AssertUnwindSafe(async move { unit(target).await })
                        .catch_unwind()
                        .await;
                    let outcome = match outcome {
                        Ok(Ok(result)) if result.is_total_failure() => {
                            let err = UnitError::WritesFailed(result.failed());
                            error!(error = %err, "Unit failed");
                            TargetOutcome::failed(&err, Some(result))
                        }
                        Ok(Ok(result)) => {
                            info!(
                                created = result.created,
                                updated = result.updated,
                                deleted = result.deleted,
                                failed = result.failed(),
                                "Unit finished"
                            );
                            TargetOutcome::Succeeded { result }
                        }
                        Ok(Err(err)) => {
                            error!(error = %err, "Unit failed");
                            TargetOutcome::failed(&err, None)
                        }
                        Err(payload) => {
                            let err = UnitError::Panicked(panic_message(payload.as_ref()));
                            error!(error = %err, "Unit panicked");
                            TargetOutcome::failed(&err, None)
                        }
                    };
                    reporter.record(label, outcome, started.elapsed());
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Unit task did not complete");
            }
        }

        let report = self.reporter.finish();
        info!(
            run_id = %report.run_id,
            succeeded = report.totals.targets_succeeded,
            failed = report.totals.targets_failed,
            skipped = report.totals.targets_skipped,
            elapsed_ms = report.elapsed_ms,
            "Run finished"
        );
        report
    }
}

/// Wait for a worker slot, giving up at the deadline.
async fn acquire(semaphore: &Arc<Semaphore>, deadline: Option<Instant>) -> Option<OwnedSemaphorePermit> {
    match deadline {
        Some(at) if Instant::now() >= at => None,
        Some(at) => tokio::time::timeout_at(at, Arc::clone(semaphore).acquire_owned())
            .await
            .ok()?
            .ok(),
        None => Arc::clone(semaphore).acquire_owned().await.ok(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::CollectionError;
    use crate::gateway::ScopeStatus;
    use crate::plan::PlanFingerprint;
    use crate::record::Scope;

    fn ok_result(name: &str) -> ReconciliationResult {
        ReconciliationResult {
            scope: Scope::vlan_group(name),
            scope_status: ScopeStatus::Existing,
            created: 1,
            updated: 0,
            deleted: 0,
            unchanged: 0,
            quarantined: 0,
            detached: 0,
            failures: vec![],
            warnings: vec![],
            dry_run: false,
            fingerprint: PlanFingerprint::from_json(&serde_json::json!(name)),
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        let targets = vec!["sw1", "sw2", "sw3", "sw4"];

        let report = orchestrator
            .run(targets, |target: &'static str| async move {
                match target {
                    "sw2" => Err(UnitError::Collection(CollectionError::Unreachable(
                        "10.0.0.2:22".into(),
                    ))),
                    "sw3" => panic!("parser blew up"),
                    _ => Ok(ok_result(target)),
                }
            })
            .await;

        assert_eq!(report.totals.targets_succeeded, 2);
        assert_eq!(report.totals.targets_failed, 2);
        assert_eq!(report.totals.created, 2);

        match &report.target("sw3").unwrap().outcome {
            TargetOutcome::Failed { kind, error, .. } => {
                assert_eq!(kind, "panicked");
                assert!(error.contains("parser blew up"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(report.target("sw2").unwrap().outcome.is_failure());
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let orchestrator = Orchestrator::new(OrchestratorConfig {
            max_parallelism: 3,
            deadline: None,
        });

        let (inf, pk) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let report = orchestrator
            .run((0..12).collect::<Vec<u32>>(), move |i| {
                let (inf, pk) = (Arc::clone(&inf), Arc::clone(&pk));
                async move {
                    let now = inf.fetch_add(1, Ordering::SeqCst) + 1;
                    pk.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    inf.fetch_sub(1, Ordering::SeqCst);
                    Ok(ok_result(&i.to_string()))
                }
            })
            .await;

        assert_eq!(report.totals.targets_succeeded, 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_deadline_skips_unscheduled_targets() {
        let orchestrator = Orchestrator::new(OrchestratorConfig {
            max_parallelism: 1,
            deadline: Some(Duration::from_millis(100)),
        });

        let report = orchestrator
            .run(vec!["a", "b", "c", "d"], |target: &'static str| async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(ok_result(target))
            })
            .await;

        // The in-flight unit finishes; the rest never start.
        assert_eq!(report.totals.targets_succeeded, 1);
        assert_eq!(report.totals.targets_skipped, 3);
        assert!(matches!(
            report.target("a").unwrap().outcome,
            TargetOutcome::Succeeded { .. }
        ));
    }

    #[tokio::test]
    async fn test_total_write_failure_fails_unit() {
        use crate::error::{WriteError, WriteOp};
        use crate::record::Identity;

        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        let report = orchestrator
            .run(vec!["sw1"], |target: &'static str| async move {
                let mut result = ok_result(target);
                result.created = 0;
                result.failures.push(WriteError::new(
                    Identity::Name("x".into()),
                    WriteOp::Create,
                    "HTTP 500",
                ));
                Ok(result)
            })
            .await;

        let outcome = &report.target("sw1").unwrap().outcome;
        assert!(outcome.is_failure());
        assert_eq!(outcome.result().unwrap().failed(), 1);
        assert_eq!(report.totals.failed_writes, 1);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
