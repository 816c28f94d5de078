//! The top-level sitemap index.

use super::lastmod::LastModified;
use super::locator::{Locator, LocatorError};
use super::types::{DocumentKind, SitemapFile, UrlDescriptor};
use super::writer::SitemapWriter;
use crate::error::{ExportError, Result};
use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

/// Filename of the generated index document.
pub const INDEX_FILENAME: &str = "sitemap_index.xml";

/// Largest number of entries a sitemap index may hold.
pub const DEFAULT_INDEX_CAP: usize = 50_000;

/// Builds `sitemap_index.xml` from the files produced by a run.
#[derive(Debug, Clone)]
pub struct SitemapIndexBuilder {
    static_sitemap: Locator,
    base_url: Url,
    location: Vec<String>,
    cap: usize,
}

impl SitemapIndexBuilder {
    /// `location` is the directory tag under `/static/` where the files are served.
    pub fn new(static_sitemap: Locator, base_url: Url, location: &str, cap: usize) -> Self {
        Self {
            static_sitemap,
            base_url,
            location: location
                .split('/')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            cap,
        }
    }

    /// Public URL of a produced file: `base/static/{location}/{filename}`.
    pub fn file_locator(&self, filename: &str) -> std::result::Result<Locator, LocatorError> {
        let mut segments: Vec<&str> = Vec::with_capacity(self.location.len() + 2);
        segments.push("static");
        segments.extend(self.location.iter().map(String::as_str));
        segments.push(filename);
        Locator::from_segments(&self.base_url, &segments)
    }

    /// Write the index. The static sitemap comes first, then every file in order.
    pub fn build(
        &self,
        files: &[SitemapFile],
        writer: &SitemapWriter,
        now: DateTime<Utc>,
    ) -> Result<SitemapFile> {
        let stamp = LastModified::from(now);
        let mut entries = Vec::with_capacity(files.len() + 1);
        entries.push(UrlDescriptor::index_entry(self.static_sitemap.clone(), stamp));

        for file in files {
            let locator = self.file_locator(&file.filename).map_err(|e| {
                ExportError::write(INDEX_FILENAME, format!("cannot list {}: {e}", file.filename))
            })?;
            debug!(url = %locator, "index entry");
            entries.push(UrlDescriptor::index_entry(locator, stamp));
        }

        if entries.len() > self.cap {
            return Err(ExportError::IndexCapacity {
                entries: entries.len(),
                cap: self.cap,
            });
        }

        writer.write(&entries, INDEX_FILENAME, DocumentKind::Index)
    }
}
