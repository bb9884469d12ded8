//! Output formatting for CLI commands.

use colored::Colorize;
use netsync_reconcile::{AggregateReport, TargetOutcome, TargetReport};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// One row of the per-target report table.
#[derive(Debug, Clone, PartialEq, Eq, Tabled)]
pub struct TargetRow {
    #[tabled(rename = "Target")]
    pub target: String,

    #[tabled(rename = "Outcome")]
    pub outcome: &'static str,

    #[tabled(rename = "Created")]
    pub created: usize,

    #[tabled(rename = "Updated")]
    pub updated: usize,

    #[tabled(rename = "Deleted")]
    pub deleted: usize,

    #[tabled(rename = "Unchanged")]
    pub unchanged: usize,

    #[tabled(rename = "Failed")]
    pub failed: usize,

    #[tabled(rename = "Warnings")]
    pub warnings: usize,

    #[tabled(rename = "ms")]
    pub elapsed_ms: u64,

    #[tabled(rename = "Detail")]
    pub detail: String,
}

impl From<&TargetReport> for TargetRow {
    fn from(report: &TargetReport) -> Self {
        let result = report.outcome.result();
        let count = |f: fn(&netsync_reconcile::ReconciliationResult) -> usize| result.map_or(0, f);

        let detail = match &report.outcome {
            TargetOutcome::Failed { error, .. } => error.clone(),
            TargetOutcome::Skipped { reason } => reason.clone(),
            TargetOutcome::Succeeded { result } => {
                let mut notes = Vec::new();
                if result.dry_run {
                    notes.push("dry run".to_string());
                }
                if result.scope_created() {
                    notes.push(format!("created {}", result.scope));
                }
                if result.quarantined > 0 {
                    notes.push(format!("{} quarantined", result.quarantined));
                }
                notes.join(", ")
            }
        };

        Self {
            target: report.target.clone(),
            outcome: report.outcome.label(),
            created: count(|r| r.created),
            updated: count(|r| r.updated),
            deleted: count(|r| r.deleted),
            unchanged: count(|r| r.unchanged),
            failed: count(|r| r.failed()),
            warnings: count(|r| r.warnings.len()),
            elapsed_ms: report.elapsed_ms,
            detail,
        }
    }
}

/// Print a run report.
pub fn print_report(report: &AggregateReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_single(report),
        OutputFormat::Table => {
            if report.targets.is_empty() {
                println!("{}", "No targets.".dimmed());
                return;
            }
            let rows: Vec<TargetRow> = report.targets.iter().map(TargetRow::from).collect();
            println!("{}", Table::new(rows));

            let warnings = report.warnings();
            if !warnings.is_empty() {
                println!();
                for (target, warning) in warnings {
                    println!("{} {}: {}", "Warning:".yellow().bold(), target, warning);
                }
            }

            let failures = report.write_failures();
            if !failures.is_empty() {
                println!();
                for (target, failure) in failures {
                    println!("{} {}: {}", "Failed:".red().bold(), target, failure);
                }
            }

            println!();
            let totals = &report.totals;
            let summary = format!(
                "run {}: {} created, {} updated, {} deleted, {} unchanged, {} failed writes; \
                 {} targets ok, {} failed, {} skipped",
                report.run_id,
                totals.created,
                totals.updated,
                totals.deleted,
                totals.unchanged,
                totals.failed_writes,
                totals.targets_succeeded,
                totals.targets_failed,
                totals.targets_skipped,
            );
            if report.has_failures() {
                println!("{} {}", "Finished with failures:".red().bold(), summary);
            } else {
                print_success(&summary);
            }
        }
    }
}

/// Print a single item as JSON.
pub fn print_single<T: Serialize + ?Sized>(data: &T) {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    println!("{}", json);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsync_reconcile::{
        ApplyMode, Attributes, EntityRecord, FieldPolicies, InMemoryGateway, Reconciler, Reporter,
        Scope, UnitError,
    };
    use netsync_id::VlanId;
    use std::time::Duration;

    async fn report() -> AggregateReport {
        let gateway = InMemoryGateway::new();
        let scope = Scope::vlan_group("sw1");
        let observed = vec![EntityRecord::new(
            VlanId::new(10).unwrap(),
            scope.clone(),
            Attributes::new().with("name", "a").with("status", "active"),
        )];
        let result = Reconciler::new(FieldPolicies::vlan())
            .with_mode(ApplyMode::DryRun)
            .reconcile(&gateway, &scope, observed)
            .await
            .unwrap();

        let reporter = Reporter::new();
        reporter.record("sw1", TargetOutcome::Succeeded { result }, Duration::from_millis(12));
        reporter.record(
            "sw2",
            TargetOutcome::failed(&UnitError::Other("connection refused".into()), None),
            Duration::from_millis(3),
        );
        reporter.record_skipped("sw3", "deadline reached before start");
        reporter.finish()
    }

    #[tokio::test]
    async fn test_rows_from_report() {
        let report = report().await;
        let rows: Vec<TargetRow> = report.targets.iter().map(TargetRow::from).collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].target, "sw1");
        assert_eq!(rows[0].outcome, "ok");
        assert_eq!(rows[0].created, 1);
        assert!(rows[0].detail.contains("dry run"));
        assert_eq!(rows[1].outcome, "failed");
        assert_eq!(rows[1].detail, "connection refused");
        assert_eq!(rows[1].created, 0);
        assert_eq!(rows[2].outcome, "skipped");
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let report = report().await;
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["totals"]["targets_failed"], 1);
        assert_eq!(value["targets"][0]["outcome"], "succeeded");
    }
}
