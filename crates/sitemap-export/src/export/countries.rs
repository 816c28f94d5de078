//! Country reference data and the set of countries seen during a run.

use crate::error::{ExportError, Result};
use crate::sitemap::{
    is_filename_token, sitemap_filename, DocumentKind, LastModified, Locator, SitemapFile,
    SitemapWriter, UrlDescriptor,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

/// Type name of the synthesized countries sitemap.
pub const COUNTRIES_TYPE: &str = "countries";

/// One entry of the reference file. Extra keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CountryEntry {
    pub slug: String,
}

/// Read-only country code → slug mapping.
#[derive(Debug, Clone, Default)]
pub struct CountryLookup {
    entries: HashMap<String, CountryEntry>,
}

impl CountryLookup {
    /// Load `{"MX": {"slug": "mexico"}, ...}` from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let reference_error = |reason: String| ExportError::ReferenceData {
            path: path.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| reference_error(e.to_string()))?;
        let lookup = Self::from_json(&text).map_err(|e| reference_error(e.to_string()))?;
        if let Some(code) = lookup.entries.keys().find(|code| !is_filename_token(code)) {
            return Err(reference_error(format!(
                "country code {code:?} cannot be used in a sitemap filename"
            )));
        }
        info!(path = %path.display(), countries = lookup.len(), "loaded country reference data");
        Ok(lookup)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let entries: HashMap<String, CountryEntry> = serde_json::from_str(text)?;
        Ok(Self { entries })
    }

    pub fn slug(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(|e| e.slug.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for CountryLookup {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(code, slug)| (code, CountryEntry { slug }))
                .collect(),
        }
    }
}

/// A country that appeared in exported records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedCountry {
    pub code: String,
    pub slug: String,
    /// Latest sitemap-valid last-modified value among its records.
    pub latest: Option<LastModified>,
}

/// Countries seen so far, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ObservedCountries {
    countries: Vec<ObservedCountry>,
    positions: HashMap<String, usize>,
}

impl ObservedCountries {
    pub fn observe(&mut self, code: &str, slug: &str, last_modified: Option<&LastModified>) {
        let candidate = last_modified.copied().filter(LastModified::is_sitemap_valid);
        match self.positions.get(code) {
            Some(&pos) => {
                let entry = &mut self.countries[pos];
                entry.latest = LastModified::latest(entry.latest, candidate);
            }
            None => {
                self.positions.insert(code.to_string(), self.countries.len());
                self.countries.push(ObservedCountry {
                    code: code.to_string(),
                    slug: slug.to_string(),
                    latest: candidate,
                });
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservedCountry> {
        self.countries.iter()
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

/// Write `sitemap_countries.xml` with one landing page per observed country.
///
/// Returns `None` when no country was observed.
pub fn write_country_sitemap(
    observed: &ObservedCountries,
    base_url: &Url,
    writer: &SitemapWriter,
) -> Result<Option<SitemapFile>> {
    if observed.is_empty() {
        info!("no countries observed, skipping countries sitemap");
        return Ok(None);
    }

    let entries: Vec<UrlDescriptor> = observed
        .iter()
        .filter_map(|country| match Locator::from_segments(base_url, &[&country.slug]) {
            Ok(locator) => Some(UrlDescriptor::new(locator, country.latest, None, None)),
            Err(e) => {
                warn!(code = %country.code, "skipping country page: {e}");
                None
            }
        })
        .collect();

    let filename = sitemap_filename(None, COUNTRIES_TYPE, 1);
    writer.write(&entries, &filename, DocumentKind::UrlSet).map(Some)
}
