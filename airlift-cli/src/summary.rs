//! Run summary output
//!
//! After all requested builds, prints one table row per addon plus totals:
//! versioned archives, `-latest` archives, and any staging directories left
//! behind by archive failures so operators can retry selectively.

use std::path::PathBuf;

use anyhow::Result;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use airlift_core::bundle::BuildReport;
use airlift_core::catalog::Addon;

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Addon")]
    addon: String,
    #[tabled(rename = "Images")]
    images: String,
    #[tabled(rename = "Chart")]
    chart: String,
    #[tabled(rename = "Archive")]
    archive: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub fn print_summary(
    version: &str,
    outcomes: &[(Addon, Result<BuildReport>)],
    leftover_staging: &[PathBuf],
) {
    println!("\nBundle run summary (version {version}):\n");

    let rows: Vec<SummaryRow> = outcomes
        .iter()
        .map(|(addon, outcome)| match outcome {
            Ok(report) => SummaryRow {
                addon: addon.display_name().to_string(),
                images: format!("{}/{}", report.succeeded, report.total),
                chart: if report.chart_included {
                    "included".to_string()
                } else {
                    "-".to_string()
                },
                archive: report
                    .archives
                    .first()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                status: if report.archived() {
                    "ok".to_string()
                } else {
                    "incomplete".to_string()
                },
            },
            Err(_) => SummaryRow {
                addon: addon.display_name().to_string(),
                images: "-".to_string(),
                chart: "-".to_string(),
                archive: "-".to_string(),
                status: "failed".to_string(),
            },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();
    println!("{table}");

    let reports: Vec<&BuildReport> = outcomes
        .iter()
        .filter_map(|(_, outcome)| outcome.as_ref().ok())
        .collect();

    let versioned = reports.iter().filter(|r| r.archived()).count();
    let latest = reports
        .iter()
        .filter(|r| r.archives.len() > 1)
        .count();

    println!("\nVersioned archives: {versioned}");
    println!("Latest archives:    {latest}");

    let failed_refs: Vec<&String> = reports.iter().flat_map(|r| &r.failed).collect();
    if !failed_refs.is_empty() {
        println!("\nFailed images:");
        for source_ref in failed_refs {
            println!("  {source_ref}");
        }
    }

    if !leftover_staging.is_empty() {
        println!("\nStaging directories still on disk (retry or inspect manually):");
        for path in leftover_staging {
            println!("  {}", path.display());
        }
    }
}
