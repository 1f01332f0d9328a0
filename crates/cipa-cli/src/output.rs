//! Output formatting for the consistency report

use anyhow::Result;
use cipa_core::consistency::FleetVerdict;
use cipa_core::types::{MetricKind, ServerReport};
use clap::ValueEnum;
use comfy_table::{presets, Cell, ContentArrangement, Table};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table, one column per server
    #[default]
    Table,
    /// Reports and verdict as JSON
    Json,
}

/// Table rendering switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStyle {
    /// Print the header row
    pub header: bool,
    /// Draw borders
    pub border: bool,
}

impl Default for TableStyle {
    fn default() -> Self {
        Self {
            header: true,
            border: true,
        }
    }
}

/// Builds the per-metric comparison table.
pub fn render_table(reports: &[ServerReport], verdict: &FleetVerdict, style: TableStyle) -> Table {
    let mut table = Table::new();
    table
        .load_preset(if style.border {
            presets::ASCII_FULL
        } else {
            presets::NOTHING
        })
        .set_content_arrangement(ContentArrangement::Dynamic);

    if style.header {
        let mut header = vec![Cell::new("FreeIPA servers:")];
        header.extend(reports.iter().map(|report| Cell::new(&report.hostname_short)));
        header.push(Cell::new("STATE"));
        table.set_header(header);
    }

    for &kind in MetricKind::all() {
        let mut row = vec![Cell::new(kind.label())];
        row.extend(reports.iter().map(|report| Cell::new(report.get(kind))));
        row.push(Cell::new(state(verdict, kind)));
        table.add_row(row);
    }

    table
}

fn state(verdict: &FleetVerdict, kind: MetricKind) -> &'static str {
    match verdict.check(kind) {
        Some(check) if check.consistent => "OK",
        _ => "FAIL",
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    reports: &'a [ServerReport],
    verdict: &'a FleetVerdict,
}

/// Serializes reports and verdict as pretty-printed JSON.
pub fn render_json(reports: &[ServerReport], verdict: &FleetVerdict) -> Result<String> {
    Ok(serde_json::to_string_pretty(&JsonOutput { reports, verdict })?)
}
