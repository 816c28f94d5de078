//! Render and persist sitemap 0.9 documents.

use super::types::{DocumentKind, SitemapFile, UrlDescriptor};
use crate::error::{ExportError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::path::PathBuf;
use tracing::{debug, info};

/// XML namespace of the sitemap protocol.
pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Writes finished sitemap documents into one output directory.
#[derive(Debug, Clone)]
pub struct SitemapWriter {
    output_dir: PathBuf,
    dry_run: bool,
}

impl SitemapWriter {
    pub fn new(output_dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            dry_run,
        }
    }

    /// Create the output directory. No-op in dry run.
    pub fn prepare(&self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| ExportError::write(self.output_dir.display().to_string(), e))
    }

    /// Render `entries` and store them under `filename`.
    ///
    /// In dry run the document is still rendered, so rendering failures
    /// surface, but nothing touches the disk.
    pub fn write(
        &self,
        entries: &[UrlDescriptor],
        filename: &str,
        kind: DocumentKind,
    ) -> Result<SitemapFile> {
        let bytes = render(entries, kind, filename)?;

        if self.dry_run {
            info!(filename, entries = entries.len(), "dry run, not writing sitemap");
        } else {
            let path = self.output_dir.join(filename);
            std::fs::write(&path, &bytes).map_err(|e| ExportError::write(filename, e))?;
            info!(filename, entries = entries.len(), "wrote sitemap");
            debug!(path = %path.display(), bytes = bytes.len());
        }

        Ok(SitemapFile {
            filename: filename.to_string(),
            kind,
            entries: entries.len(),
        })
    }
}

/// Serialize entries into a complete XML document.
pub fn render(entries: &[UrlDescriptor], kind: DocumentKind, filename: &str) -> Result<Vec<u8>> {
    let fail = |e: std::io::Error| ExportError::write(filename, e);
    let (root, item) = match kind {
        DocumentKind::UrlSet => ("urlset", "url"),
        DocumentKind::Index => ("sitemapindex", "sitemap"),
    };

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(fail)?;
    writer
        .write_event(Event::Start(
            BytesStart::new(root).with_attributes([("xmlns", SITEMAP_NS)]),
        ))
        .map_err(fail)?;

    for entry in entries {
        writer
            .write_event(Event::Start(BytesStart::new(item)))
            .map_err(fail)?;
        writer
            .create_element("loc")
            .write_text_content(BytesText::new(entry.locator().as_str()))
            .map_err(fail)?;
        if let Some(last_modified) = entry.last_modified() {
            writer
                .create_element("lastmod")
                .write_text_content(BytesText::new(&last_modified.to_string()))
                .map_err(fail)?;
        }
        if kind == DocumentKind::UrlSet {
            if let Some(freq) = entry.change_frequency() {
                writer
                    .create_element("changefreq")
                    .write_text_content(BytesText::new(freq.as_str()))
                    .map_err(fail)?;
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(item)))
            .map_err(fail)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(root)))
        .map_err(fail)?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}
