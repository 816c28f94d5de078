//! Sitemap entries and produced files.

use super::changefreq::ChangeFrequency;
use super::lastmod::LastModified;
use super::locator::Locator;

/// One `<url>` (or `<sitemap>`) entry.
///
/// Built once, never mutated. The last-modified value is dropped at
/// construction when it fails the sitemap year floor, so rendering never has
/// to re-validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlDescriptor {
    locator: Locator,
    last_modified: Option<LastModified>,
    change_frequency: Option<ChangeFrequency>,
    partition_key: Option<String>,
}

impl UrlDescriptor {
    pub fn new(
        locator: Locator,
        last_modified: Option<LastModified>,
        change_frequency: Option<ChangeFrequency>,
        partition_key: Option<String>,
    ) -> Self {
        Self {
            locator,
            last_modified: last_modified.filter(LastModified::is_sitemap_valid),
            change_frequency,
            partition_key,
        }
    }

    /// Entry for a sitemap index document.
    pub fn index_entry(locator: Locator, last_modified: LastModified) -> Self {
        Self::new(locator, Some(last_modified), None, None)
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn last_modified(&self) -> Option<&LastModified> {
        self.last_modified.as_ref()
    }

    pub fn change_frequency(&self) -> Option<ChangeFrequency> {
        self.change_frequency
    }

    /// Routing key for partitioned output. Never serialized.
    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }
}

/// Which root element a document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// `<urlset>` of `<url>` entries.
    UrlSet,
    /// `<sitemapindex>` of `<sitemap>` entries.
    Index,
}

/// A finished output artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapFile {
    pub filename: String,
    pub kind: DocumentKind,
    pub entries: usize,
}

/// Whether `token` can sit between the `_` separators of a filename.
pub fn is_filename_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Build a deterministic sitemap filename.
///
/// `sequence` starts at 1; only overflow files (2, 3, ...) carry a suffix.
pub fn sitemap_filename(partition: Option<&str>, type_name: &str, sequence: u32) -> String {
    let mut name = String::from("sitemap_");
    if let Some(partition) = partition.filter(|p| !p.is_empty()) {
        name.push_str(partition);
        name.push('_');
    }
    name.push_str(type_name);
    if sequence > 1 {
        name.push('_');
        name.push_str(&sequence.to_string());
    }
    name.push_str(".xml");
    name
}
