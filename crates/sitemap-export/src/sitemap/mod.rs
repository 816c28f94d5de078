//! Sitemap documents: entries, URL encoding, classification, rendering and the index.

pub mod changefreq;
pub mod index;
pub mod lastmod;
pub mod locator;
pub mod types;
pub mod writer;

pub use changefreq::{classify, classify_unparseable, ChangeFrequency, FrequencyRule};
pub use index::SitemapIndexBuilder;
pub use lastmod::LastModified;
pub use locator::{Locator, LocatorError, MAX_LOCATOR_LEN};
pub use types::{is_filename_token, sitemap_filename, DocumentKind, SitemapFile, UrlDescriptor};
pub use writer::SitemapWriter;
