use std::{fs, path::Path};

use comfy_table::{
    Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use tilesmith::{
    Engine, EngineConfig,
    backends::Device,
    testbed::{
        VerificationOutcome,
        scenario::{ScenarioOutcome, ScenarioStatus, run_row},
    },
};

use super::scenario_rows;

fn status_label(outcome: &ScenarioOutcome) -> (&'static str, Color) {
    match &outcome.status {
        ScenarioStatus::Verified(report) => match report.outcome {
            VerificationOutcome::Pass => ("pass", Color::Green),
            VerificationOutcome::Fail(_) => ("fail", Color::Red),
            VerificationOutcome::Skipped(_) => ("skipped", Color::Yellow),
        },
        ScenarioStatus::BuildFailed(_) => ("build failed", Color::Red),
        ScenarioStatus::TestbedFailed(_) => ("testbed error", Color::Red),
    }
}

fn detail(outcome: &ScenarioOutcome) -> String {
    match &outcome.status {
        ScenarioStatus::Verified(report) if !report.is_skipped() && !report.skipped_problems.is_empty() => {
            let skipped = report.skipped_problems.len();
            let verified = match &report.outcome {
                VerificationOutcome::Fail(failures) => {
                    format!("{} of {} runs mismatched", failures.len(), report.runs.len())
                },
                _ => format!("{} runs", report.runs.len()),
            };
            format!("{verified}, {skipped} problem sizes skipped")
        },
        ScenarioStatus::Verified(report) => match &report.outcome {
            VerificationOutcome::Pass => format!(
                "{} runs, max abs {:.3e}, max rel {:.3e}",
                report.runs.len(),
                report.max_absolute_deviation(),
                report.max_relative_deviation()
            ),
            VerificationOutcome::Fail(failures) => {
                format!("{} of {} runs mismatched", failures.len(), report.runs.len())
            },
            VerificationOutcome::Skipped(reason) => reason.clone(),
        },
        ScenarioStatus::BuildFailed(error) => error.to_string(),
        ScenarioStatus::TestbedFailed(error) => error.to_string(),
    }
}

fn outcome_json(outcome: &ScenarioOutcome) -> Result<Value, serde_json::Error> {
    let (status, _) = status_label(outcome);
    let mut value = json!({
        "name": outcome.name,
        "key": outcome.key.as_str(),
        "status": status,
    });
    match &outcome.status {
        ScenarioStatus::Verified(report) => value["report"] = serde_json::to_value(report)?,
        ScenarioStatus::BuildFailed(error) => value["error"] = json!(error.to_string()),
        ScenarioStatus::TestbedFailed(error) => value["error"] = json!(error.to_string()),
    }
    Ok(value)
}

pub fn handle_run(
    config_path: Option<&Path>,
    rows_path: Option<&Path>,
    seed: u64,
    output_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    }
    .with_env_overrides()?;
    let rows = scenario_rows(rows_path)?;
    let engine = Engine::new(config)?;

    let style_header = Style::new().bold();
    println!(
        "{}",
        style_header.apply_to(format!(
            "Device: {} (sm{}), {} rows, seed {}",
            engine.device().name(),
            engine.device().compute_capability(),
            rows.len(),
            seed
        ))
    );

    let progress_bar = ProgressBar::new(rows.len() as u64);
    progress_bar.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);
    let mut outcomes = Vec::with_capacity(rows.len());
    for row in &rows {
        progress_bar.set_message(row.name.clone());
        outcomes.push(run_row(&engine, row, seed));
        progress_bar.inc(1);
    }
    progress_bar.finish_and_clear();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Row", "Status", "Detail"]);
    for outcome in &outcomes {
        let (status, color) = status_label(outcome);
        table.add_row(vec![Cell::new(&outcome.name), Cell::new(status).fg(color), Cell::new(detail(outcome))]);
    }
    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Center);
    }
    println!("{table}");

    let statistics = engine.pool().statistics();
    println!(
        "{}",
        style_header.apply_to(format!(
            "{} kernels compiled, {} cache hits, peak pool usage {} bytes",
            engine.cache().compilations(),
            engine.cache().hits(),
            statistics.peak_bytes
        ))
    );

    if let Some(path) = output_path {
        let rows_json = outcomes.iter().map(outcome_json).collect::<Result<Vec<_>, _>>()?;
        let report = json!({
            "seed": seed,
            "compute_capability": engine.device().compute_capability(),
            "rows": rows_json,
        });
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        log::info!("Report written to {}", path.display());
    }

    let failed = outcomes.iter().filter(|outcome| !outcome.passed() && !outcome.skipped()).count();
    engine.shutdown();
    if failed > 0 {
        return Err(format!("{failed} of {} rows failed", outcomes.len()).into());
    }
    Ok(())
}
