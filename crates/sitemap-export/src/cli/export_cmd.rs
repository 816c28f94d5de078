//! The export command: resolve configuration, then run the orchestrator.

use super::output::{self, format_count, format_duration, Styled};
use super::progress::SpinnerProgress;
use super::Cli;
use crate::config::{ExportConfig, FilterSettings};
use crate::export::{ExportOrchestrator, ExportSummary, RunSettings};
use crate::search::OpenSearchClient;
use crate::sitemap::{SitemapIndexBuilder, SitemapWriter};
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::time::Instant;
use tracing::info;

/// Merge the optional config file with command-line overrides and validate.
pub fn resolve_config(cli: &Cli) -> crate::error::Result<ExportConfig> {
    let mut config = match &cli.config {
        Some(path) => ExportConfig::load(path)?,
        None => ExportConfig::default(),
    };

    if let Some(node) = &cli.db_uri {
        config.search.node = node.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.output.base_url = Some(base_url.clone());
    }
    if let Some(location) = &cli.location {
        config.output.location = Some(location.clone());
    }
    if let Some(dir) = &cli.output_dir {
        config.output.directory = dir.clone();
    }
    if let Some(path) = &cli.countries {
        config.countries_file = Some(path.clone());
    }
    if let Some(country) = &cli.country {
        config.filter = Some(FilterSettings::country(country));
    }
    if cli.dry_run {
        config.output.dry_run = true;
    }

    config.validate()?;
    Ok(config)
}

/// Run a full export as described by `cli`.
pub async fn run(cli: &Cli) -> Result<()> {
    let started = Instant::now();
    let config = resolve_config(cli)?;
    let countries = crate::load_country_lookup(&config)?;

    let client = OpenSearchClient::new(&config.search)?;
    let writer = SitemapWriter::new(&config.output.directory, config.output.dry_run);
    let index = SitemapIndexBuilder::new(
        config.static_sitemap()?,
        config.base_url()?,
        config.location()?,
        config.paging.index_cap,
    );
    let settings = run_settings(&config)?;

    info!(
        node = %client.node(),
        output = %config.output.directory.display(),
        dry_run = config.output.dry_run,
        targets = config.targets.len(),
        "starting export"
    );

    let show_progress = !cli.quiet && !cli.json;
    let progress = if show_progress {
        SpinnerProgress::new()
    } else {
        SpinnerProgress::hidden()
    };

    let orchestrator =
        ExportOrchestrator::new(&client, &writer, &countries, settings).with_progress(&progress);
    let result = orchestrator.run_export(&config.targets, &index).await;
    progress.finish();
    let summary = result.context("export failed")?;

    if cli.json {
        output::print_json(&summary_json(&summary, config.output.dry_run));
    } else if !cli.quiet {
        print_summary(&summary, config.output.dry_run, started.elapsed().as_secs());
    }
    Ok(())
}

/// Run-wide settings derived from a validated configuration.
pub fn run_settings(config: &ExportConfig) -> crate::error::Result<RunSettings> {
    Ok(RunSettings {
        base_url: config.base_url()?,
        page_size: config.paging.page_size,
        keep_alive: config.paging.scroll_keep_alive.clone(),
        item_cap: config.paging.item_cap,
        query: config.query(),
        fallback: config.fallback()?,
        countries_sitemap: config.output.countries_sitemap,
        now: Utc::now(),
    })
}

fn print_summary(summary: &ExportSummary, dry_run: bool, elapsed_secs: u64) {
    let s = Styled::new();
    eprintln!();
    output::print_header(&s);
    for report in &summary.reports {
        let skipped = report.skipped.total();
        let symbol = if skipped > 0 { s.warn_sym() } else { s.ok_sym() };
        let mut value = format!(
            "{} urls, {} files",
            format_count(report.emitted),
            report.files.len()
        );
        if skipped > 0 {
            value.push_str(&s.yellow(&format!(" ({} skipped)", format_count(skipped))));
        }
        output::print_line(symbol, &report.type_name, &value);
    }
    if summary.countries > 0 {
        output::print_line(s.ok_sym(), "countries", &summary.countries.to_string());
    }
    output::print_line(
        s.ok_sym(),
        "index",
        &format!("{} ({} entries)", summary.index.filename, summary.index.entries),
    );
    eprintln!();
    let status = if dry_run { s.yellow("dry run, nothing written") } else { s.green("done") };
    eprintln!("  {}: {status} in {}", s.bold("Status"), format_duration(elapsed_secs));
}

fn summary_json(summary: &ExportSummary, dry_run: bool) -> serde_json::Value {
    json!({
        "dry_run": dry_run,
        "index": summary.index.filename,
        "files": summary.files.iter().map(|f| json!({
            "filename": f.filename,
            "entries": f.entries,
        })).collect::<Vec<_>>(),
        "targets": summary.reports.iter().map(|r| json!({
            "type": r.type_name,
            "seen": r.seen,
            "emitted": r.emitted,
            "skipped": r.skipped.total(),
            "files": r.files.len(),
        })).collect::<Vec<_>>(),
        "countries": summary.countries,
    })
}
