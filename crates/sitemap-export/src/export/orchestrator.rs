//! Sequencing of a full export.
//!
//! Targets run one after another, each with its own [`ExportRun`] and its
//! own partition buffers. A target moves through
//! `Idle → Paging → Projecting → Batching → … → Flushed → Done`; the next
//! page is only requested once every record of the current page has been
//! projected and batched. The first error aborts the whole export, so the
//! index is never written for a partial run.

use super::batcher::PartitionedBatcher;
use super::countries::{write_country_sitemap, CountryLookup, ObservedCountries};
use super::projector::{RecordProjector, SkipReason};
use crate::config::{CursorFields, EntityFields, ExportTarget, RecordKind, UnitFields};
use crate::error::Result;
use crate::search::aggregation::{fetch_activity_cache, fetch_buckets, flatten};
use crate::search::{AggregationSpec, CursorPager, CursorRequest, SearchBackend};
use crate::sitemap::{FrequencyRule, LastModified, SitemapFile, SitemapIndexBuilder, SitemapWriter};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Default path segment between an entity and its units.
const DEFAULT_UNIT_SEGMENT: &str = "unit";

/// Phase of one target run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Paging,
    Projecting,
    Batching,
    Flushed,
    Done,
}

impl RunPhase {
    /// Forward transitions only. Paging repeats once per page.
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Idle, Paging)
                | (Paging, Paging)
                | (Paging, Projecting)
                | (Paging, Flushed)
                | (Projecting, Projecting)
                | (Projecting, Batching)
                | (Projecting, Paging)
                | (Batching, Projecting)
                | (Batching, Paging)
                | (Flushed, Done)
        )
    }
}

/// Skipped-record counts by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipCounts(HashMap<SkipReason, u64>);

impl SkipCounts {
    pub fn record(&mut self, reason: SkipReason) {
        *self.0.entry(reason).or_default() += 1;
    }

    pub fn get(&self, reason: SkipReason) -> u64 {
        self.0.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

/// Mutable progress of one target.
#[derive(Debug)]
pub struct ExportRun {
    type_name: String,
    phase: RunPhase,
    seen: u64,
    emitted: u64,
    skipped: SkipCounts,
}

impl ExportRun {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            phase: RunPhase::Idle,
            seen: 0,
            emitted: 0,
            skipped: SkipCounts::default(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn advance(&mut self, next: RunPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.phase,
            next
        );
        self.phase = next;
    }

    fn record_emitted(&mut self) {
        self.seen += 1;
        self.emitted += 1;
    }

    fn record_skip(&mut self, reason: SkipReason) {
        debug!(target_type = %self.type_name, %reason, "skipping record");
        self.seen += 1;
        self.skipped.record(reason);
    }

    fn finish(mut self, files: Vec<SitemapFile>) -> TargetReport {
        self.advance(RunPhase::Done);
        TargetReport {
            type_name: self.type_name,
            files,
            seen: self.seen,
            emitted: self.emitted,
            skipped: self.skipped,
        }
    }
}

/// Outcome of one target.
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub type_name: String,
    pub files: Vec<SitemapFile>,
    /// Records or buckets consumed, emitted or not.
    pub seen: u64,
    pub emitted: u64,
    pub skipped: SkipCounts,
}

/// Outcome of a whole export.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Content files in the order they were produced.
    pub files: Vec<SitemapFile>,
    pub index: SitemapFile,
    pub reports: Vec<TargetReport>,
    /// Number of distinct countries observed.
    pub countries: usize,
}

/// Receives progress notifications. Every method defaults to a no-op.
pub trait Progress: Send + Sync {
    fn target_started(&self, _type_name: &str, _total: Option<u64>) {}
    fn records_seen(&self, _type_name: &str, _seen: u64) {}
    fn target_finished(&self, _report: &TargetReport) {}
}

/// Discards progress.
pub struct NoProgress;

impl Progress for NoProgress {}

/// Run-wide parameters shared by all targets.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub base_url: Url,
    pub page_size: usize,
    pub keep_alive: String,
    pub item_cap: usize,
    pub query: Value,
    pub fallback: Option<LastModified>,
    /// Write `sitemap_countries.xml` for the observed countries.
    pub countries_sitemap: bool,
    /// Reference time for classification and index stamps.
    pub now: DateTime<Utc>,
}

/// Drives every target, then the countries sitemap, then the index.
pub struct ExportOrchestrator<'a> {
    backend: &'a dyn SearchBackend,
    writer: &'a SitemapWriter,
    countries: &'a CountryLookup,
    settings: RunSettings,
    progress: &'a dyn Progress,
}

impl<'a> ExportOrchestrator<'a> {
    pub fn new(
        backend: &'a dyn SearchBackend,
        writer: &'a SitemapWriter,
        countries: &'a CountryLookup,
        settings: RunSettings,
    ) -> Self {
        Self {
            backend,
            writer,
            countries,
            settings,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Export every target, the countries sitemap, and finally the index.
    pub async fn run_export(
        &self,
        targets: &[ExportTarget],
        index: &SitemapIndexBuilder,
    ) -> Result<ExportSummary> {
        self.writer.prepare()?;

        let mut observed = ObservedCountries::default();
        let mut files = Vec::new();
        let mut reports = Vec::with_capacity(targets.len());

        for target in targets {
            let report = self.run_target(target, &mut observed).await?;
            files.extend(report.files.iter().cloned());
            reports.push(report);
        }

        if self.settings.countries_sitemap {
            if let Some(file) = write_country_sitemap(&observed, &self.settings.base_url, self.writer)? {
                files.push(file);
            }
        }

        let index = index.build(&files, self.writer, self.settings.now)?;
        info!(files = files.len(), index = %index.filename, "export complete");

        Ok(ExportSummary {
            files,
            index,
            reports,
            countries: observed.len(),
        })
    }

    /// Export one target. Countries seen in partitioned records are added to `observed`.
    pub async fn run_target(
        &self,
        target: &ExportTarget,
        observed: &mut ObservedCountries,
    ) -> Result<TargetReport> {
        let started = Instant::now();
        info!(
            target_type = %target.type_name,
            index = %target.index,
            kind = target.kind.label(),
            "exporting"
        );

        let rule = target.kind.frequency_rule();
        let report = match &target.kind {
            RecordKind::Provider(fields) | RecordKind::Transactional(fields) => {
                self.run_cursor(target, fields, rule, observed).await?
            }
            RecordKind::Entity(fields) => self.run_aggregation(target, fields, rule).await?,
        };

        info!(
            target_type = %report.type_name,
            seen = report.seen,
            emitted = report.emitted,
            skipped = report.skipped.total(),
            files = report.files.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "target done"
        );
        self.progress.target_finished(&report);
        Ok(report)
    }

    async fn run_cursor(
        &self,
        target: &ExportTarget,
        fields: &CursorFields,
        rule: FrequencyRule,
        observed: &mut ObservedCountries,
    ) -> Result<TargetReport> {
        let mut run = ExportRun::new(&target.type_name);
        run.advance(RunPhase::Paging);

        let cache = match &fields.activity_cache {
            Some(spec) => {
                let cache =
                    fetch_activity_cache(self.backend, &spec.index, &spec.terms(), &self.settings.query)
                        .await?;
                info!(index = %spec.index, keys = cache.len(), "loaded activity cache");
                Some(cache)
            }
            None => None,
        };

        let mut projector = RecordProjector::new(
            &self.settings.base_url,
            &target.type_name,
            rule,
            self.countries,
            self.settings.now,
        )
        .with_fallback(self.settings.fallback);
        if let Some(cache) = &cache {
            projector = projector.with_cache(cache);
        }

        let request = CursorRequest {
            index: target.index.clone(),
            query: self.settings.query.clone(),
            fields: fields.requested(),
            page_size: self.settings.page_size,
            keep_alive: self.settings.keep_alive.clone(),
        };
        let mut batcher = PartitionedBatcher::new(self.writer, &target.type_name, self.settings.item_cap);

        let (mut pager, first) = CursorPager::open(self.backend, &request).await?;
        self.progress.target_started(&target.type_name, Some(pager.total()));

        let mut page = Some(first);
        while let Some(current) = page {
            for record in &current.records {
                run.advance(RunPhase::Projecting);
                match projector.project_hit(record, fields) {
                    Ok(projected) => {
                        if let Some((code, slug)) = &projected.country {
                            observed.observe(code, slug, projected.descriptor.last_modified());
                        }
                        run.advance(RunPhase::Batching);
                        batcher.add(projected.descriptor)?;
                        run.record_emitted();
                    }
                    Err(reason) => run.record_skip(reason),
                }
            }
            self.progress.records_seen(&target.type_name, run.seen);
            run.advance(RunPhase::Paging);
            page = pager.next_page().await?;
        }

        if pager.delivered() < pager.total() {
            warn!(
                target_type = %target.type_name,
                delivered = pager.delivered(),
                total = pager.total(),
                "cursor ended short of the reported total"
            );
        }

        run.advance(RunPhase::Flushed);
        let files = batcher.flush_all()?;
        Ok(run.finish(files))
    }

    async fn run_aggregation(
        &self,
        target: &ExportTarget,
        fields: &EntityFields,
        rule: FrequencyRule,
    ) -> Result<TargetReport> {
        let mut run = ExportRun::new(&target.type_name);
        run.advance(RunPhase::Paging);

        let spec = AggregationSpec {
            groups: fields.groups.clone(),
            units: fields.units.as_ref().map(UnitFields::terms),
        };
        let buckets = fetch_buckets(self.backend, &target.index, &spec, &self.settings.query).await?;
        let keys = flatten(&buckets);
        self.progress.target_started(&target.type_name, Some(keys.len() as u64));

        let unit_segment = fields
            .units
            .as_ref()
            .map(|u| u.path_segment.as_str())
            .unwrap_or(DEFAULT_UNIT_SEGMENT);
        let projector = RecordProjector::new(
            &self.settings.base_url,
            &target.type_name,
            rule,
            self.countries,
            self.settings.now,
        )
        .with_fallback(self.settings.fallback);
        let mut batcher = PartitionedBatcher::new(self.writer, &target.type_name, self.settings.item_cap);

        for key in &keys {
            run.advance(RunPhase::Projecting);
            match projector.project_group(key, unit_segment) {
                Ok(descriptor) => {
                    run.advance(RunPhase::Batching);
                    batcher.add(descriptor)?;
                    run.record_emitted();
                }
                Err(reason) => run.record_skip(reason),
            }
        }
        self.progress.records_seen(&target.type_name, run.seen);

        run.advance(RunPhase::Paging);
        run.advance(RunPhase::Flushed);
        let files = batcher.flush_all()?;
        Ok(run.finish(files))
    }
}
