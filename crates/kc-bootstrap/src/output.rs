//! Output formatting utilities.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::graph::{AudienceGraph, ChainReport};
use crate::orchestrator::{EntityStatus, ReportEntry, RunReport};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Colored lines and tables.
    #[default]
    Table,
    /// Pretty-printed JSON.
    Json,
}

/// Prints a success message.
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Prints an error message.
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Prints a warning message.
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Prints an info message.
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Prints a value as pretty JSON.
pub fn json<T: Serialize + ?Sized>(value: &T) -> crate::BootstrapResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Report row for display.
#[derive(Debug, Tabled)]
struct EntryRow {
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&ReportEntry> for EntryRow {
    fn from(entry: &ReportEntry) -> Self {
        Self {
            phase: entry.phase.to_string(),
            kind: entry.kind.to_string(),
            key: entry.key.clone(),
            status: entry.status.to_string(),
        }
    }
}

fn print_entry(entry: &ReportEntry) {
    let line = format!("{} '{}' {}", entry.kind, entry.key, entry.status);
    match (entry.status, entry.detail.as_deref()) {
        (EntityStatus::Created | EntityStatus::Bound, _) => success(&line),
        (EntityStatus::Existing, _) => info(&line),
        (EntityStatus::AlreadyBound, Some(note)) => info(&format!("{line} (note: {note})")),
        (EntityStatus::AlreadyBound, None) => info(&line),
        (EntityStatus::Failed, detail) => error(&format!("{line}: {}", detail.unwrap_or("unknown error"))),
        (EntityStatus::Skipped, detail) => warning(&format!("{line}: {}", detail.unwrap_or("dependency failed"))),
    }
}

/// Prints every outcome of a run, a summary table and the revealed secrets.
pub fn print_report(report: &RunReport, format: OutputFormat) -> crate::BootstrapResult<()> {
    match format {
        OutputFormat::Json => json(report),
        OutputFormat::Table => {
            for entry in &report.entries {
                print_entry(entry);
            }

            let rows: Vec<EntryRow> = report.entries.iter().map(EntryRow::from).collect();
            println!();
            println!("{}", Table::new(rows).with(Style::rounded()));

            let summary = format!(
                "Realm '{}': {} created, {} existing, {} failed, {} skipped",
                report.realm,
                report.created(),
                report.existing(),
                report.failed(),
                report.skipped()
            );
            if report.is_converged() {
                success(&summary);
            } else {
                warning(&summary);
                warning("Run again to repair the failed entities.");
            }

            for (client_id, secret) in &report.secrets {
                println!();
                println!("{}", format!("--- {client_id} client credentials ---").bold());
                println!("Client ID:     {client_id}");
                println!("Client Secret: {secret}");
            }
            Ok(())
        }
    }
}

/// Planned entity for display.
#[derive(Debug, Serialize, Tabled)]
struct PlanRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Key")]
    key: String,
}

/// Prints the entities and bindings of a graph.
pub fn print_plan(graph: &AudienceGraph, format: OutputFormat) -> crate::BootstrapResult<()> {
    let rows: Vec<PlanRow> = graph
        .entities()
        .iter()
        .map(|e| PlanRow {
            kind: e.kind().to_string(),
            key: e.key(),
        })
        .chain(graph.bindings.iter().map(|b| PlanRow {
            kind: crate::EntityKind::ScopeBinding.to_string(),
            key: b.key(),
        }))
        .collect();

    match format {
        OutputFormat::Json => json(&rows),
        OutputFormat::Table => {
            info(&format!("Caller: {}", graph.caller));
            println!("{}", Table::new(rows).with(Style::rounded()));
            Ok(())
        }
    }
}

/// Chain step for display.
#[derive(Debug, Tabled)]
struct StepRow {
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "Expects")]
    audience: String,
    #[tabled(rename = "Requested")]
    requested: String,
    #[tabled(rename = "Token audiences")]
    granted: String,
    #[tabled(rename = "OK")]
    ok: bool,
}

/// Prints every step of a chain evaluation.
pub fn print_chain(report: &ChainReport, format: OutputFormat) -> crate::BootstrapResult<()> {
    match format {
        OutputFormat::Json => json(report),
        OutputFormat::Table => {
            let rows: Vec<StepRow> = report
                .steps
                .iter()
                .map(|s| StepRow {
                    from: s.from.clone(),
                    audience: s.audience.clone(),
                    requested: s.requested.clone().unwrap_or_else(|| "-".to_string()),
                    granted: s.granted.iter().cloned().collect::<Vec<_>>().join(", "),
                    ok: s.ok,
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::rounded()));

            for leak in &report.leaks {
                error(&format!(
                    "Exchange-only audience '{}' appears in unrequested tokens of '{}'",
                    leak.audience, leak.client
                ));
            }
            if report.is_valid() {
                success("Every hop receives its expected audience.");
            } else {
                error("The exchange chain is broken.");
            }
            Ok(())
        }
    }
}

/// Prompts for password input (hidden).
pub fn prompt_password(prompt: &str) -> crate::BootstrapResult<String> {
    Ok(rpassword::prompt_password(prompt)?)
}
