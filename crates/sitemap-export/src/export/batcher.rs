//! Per-partition buffering with a hard cap on entries per file.

use crate::error::Result;
use crate::sitemap::{sitemap_filename, DocumentKind, SitemapFile, SitemapWriter, UrlDescriptor};
use std::collections::HashMap;
use tracing::debug;

struct PartitionBuffer {
    key: Option<String>,
    /// Sequence of the next file this partition writes. Starts at 1.
    sequence: u32,
    entries: Vec<UrlDescriptor>,
}

/// Routes descriptors of one target into per-partition files.
///
/// A buffer is written as soon as it reaches the cap, so no file ever holds
/// more than `cap` entries. Buffers are owned by one target run; two targets
/// never share a batcher.
pub struct PartitionedBatcher<'w> {
    writer: &'w SitemapWriter,
    type_name: String,
    cap: usize,
    buffers: Vec<PartitionBuffer>,
    positions: HashMap<Option<String>, usize>,
    files: Vec<SitemapFile>,
}

impl<'w> PartitionedBatcher<'w> {
    pub fn new(writer: &'w SitemapWriter, type_name: impl Into<String>, cap: usize) -> Self {
        Self {
            writer,
            type_name: type_name.into(),
            cap: cap.max(1),
            buffers: Vec::new(),
            positions: HashMap::new(),
            files: Vec::new(),
        }
    }

    pub fn add(&mut self, descriptor: UrlDescriptor) -> Result<()> {
        let key = descriptor.partition_key().map(String::from);
        let pos = match self.positions.get(&key) {
            Some(&pos) => pos,
            None => {
                let pos = self.buffers.len();
                self.buffers.push(PartitionBuffer {
                    key: key.clone(),
                    sequence: 1,
                    entries: Vec::new(),
                });
                self.positions.insert(key, pos);
                pos
            }
        };

        let buffer = &mut self.buffers[pos];
        buffer.entries.push(descriptor);
        if buffer.entries.len() >= self.cap {
            let file = flush_buffer(self.writer, &self.type_name, buffer)?;
            self.files.push(file);
        }
        Ok(())
    }

    /// Files written so far by cap-triggered flushes.
    pub fn files(&self) -> &[SitemapFile] {
        &self.files
    }

    /// Write every non-empty buffer in partition insertion order.
    pub fn flush_all(mut self) -> Result<Vec<SitemapFile>> {
        for buffer in &mut self.buffers {
            if !buffer.entries.is_empty() {
                let file = flush_buffer(self.writer, &self.type_name, buffer)?;
                self.files.push(file);
            }
        }
        Ok(self.files)
    }
}

fn flush_buffer(
    writer: &SitemapWriter,
    type_name: &str,
    buffer: &mut PartitionBuffer,
) -> Result<SitemapFile> {
    let filename = sitemap_filename(buffer.key.as_deref(), type_name, buffer.sequence);
    let entries = std::mem::take(&mut buffer.entries);
    debug!(filename = %filename, entries = entries.len(), "flushing partition");
    let file = writer.write(&entries, &filename, DocumentKind::UrlSet)?;
    buffer.sequence += 1;
    Ok(file)
}
