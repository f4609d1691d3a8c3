use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ptc_core::metadata::accumulate_bounds;
use ptc_core::{BBox, Metadata, RecordHandle, Schema};
use xxhash_rust::xxh3::xxh3_64;

use crate::codec::BlockCodec;
use crate::format::{
    encode_metadata, records_to_bytes, BlockEntry, PtcHeader, BLOCK_ENTRY_SIZE, FLAG_HAS_BBOX,
    FLAG_HAS_CHECKSUM, HEADER_SIZE,
};

/// Streaming writer for PTC1 files.
///
/// # Write contract
/// Call [`write_records`](Self::write_records) any number of times. The writer
/// accumulates records and flushes an independent compressed block whenever
/// `block_records` records have been gathered. Call [`finish`](Self::finish)
/// to flush the trailing partial block, append the block index and footer,
/// and write back the final header with the point count and bounding box.
///
/// # Format layout written
/// ```text
/// [HEADER: 72 bytes placeholder]
/// [METADATA: transforms, format, schema]
/// [BLOCK 0] [BLOCK 1] ... [BLOCK N-1]      ← independent compressed blocks
/// [BLOCK INDEX: 32 bytes × N]
/// [FOOTER: 8 bytes, u64 LE offset of block index]
/// ← seek back to 0, overwrite header with real values
/// ```
pub struct ContainerWriter {
    path: PathBuf,
    file: File,
    codec: Arc<dyn BlockCodec>,
    stride: usize,
    block_records: u32,
    metadata_len: u32,
    /// Records not yet flushed into a block.
    pending: Vec<f32>,
    /// In-memory block index, appended to file on `finish()`.
    entries: Vec<BlockEntry>,
    /// Current write position in the file (mirrors the file cursor).
    current_offset: u64,
    npoints: u64,
    bbox: Option<BBox>,
    finished: bool,
}

impl ContainerWriter {
    /// Create a new PTC1 file at `path` and write its metadata section.
    ///
    /// Overwrites any existing file. If the metadata cannot be written the
    /// partial file is removed again.
    pub fn create(
        path: impl AsRef<Path>,
        codec: Arc<dyn BlockCodec>,
        block_records: u32,
        schema: &Schema,
        metadata: &Metadata,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if block_records == 0 {
            anyhow::bail!("block_records must be at least 1");
        }
        // Block lengths are stored as u32 in the index.
        let block_bytes = block_records as u64 * schema.stride() as u64 * 4;
        if block_bytes > u32::MAX as u64 {
            anyhow::bail!(
                "{} records of stride {} make a {} byte block; blocks are limited to {} bytes",
                block_records,
                schema.stride(),
                block_bytes,
                u32::MAX
            );
        }
        let section = encode_metadata(schema, metadata)?;
        let metadata_len = u32::try_from(section.len()).context("metadata section too large")?;

        let mut file = File::create(path).with_context(|| format!("creating {:?}", path))?;
        // Write placeholder header (will be overwritten in finish())
        let written = file
            .write_all(&[0u8; HEADER_SIZE as usize])
            .and_then(|()| file.write_all(&section));
        if let Err(e) = written {
            drop(file);
            if let Err(remove_err) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), "removing partial file failed: {remove_err}");
            }
            return Err(e).with_context(|| format!("writing metadata to {:?}", path));
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            codec,
            stride: schema.stride(),
            block_records,
            metadata_len,
            pending: Vec::new(),
            entries: Vec::new(),
            current_offset: HEADER_SIZE + metadata_len as u64,
            npoints: 0,
            bbox: None,
            finished: false,
        })
    }

    /// Records written so far.
    pub fn npoints(&self) -> u64 {
        self.npoints
    }

    /// Buffer `count` records and flush complete blocks as they fill up.
    ///
    /// Either every record is taken or none is: when a block fails to flush,
    /// blocks already flushed by this call are cut from the file again and the
    /// pending buffer is restored.
    pub fn write_records(&mut self, count: usize, records: &[f32]) -> anyhow::Result<()> {
        if self.finished {
            anyhow::bail!("{:?} has already been finished", self.path);
        }
        if records.len() != count * self.stride {
            anyhow::bail!(
                "expected {} floats for {} records of stride {}, got {}",
                count * self.stride,
                count,
                self.stride,
                records.len()
            );
        }

        let kept = self.pending.len();
        let entries_before = self.entries.len();
        let offset_before = self.current_offset;
        self.pending.extend_from_slice(records);

        let block_len = self.block_records as usize * self.stride;
        let pending = std::mem::take(&mut self.pending);
        let mut flushed = 0;
        let mut result = Ok(());
        while pending.len() - flushed >= block_len {
            result = self.flush_block(&pending[flushed..flushed + block_len]);
            if result.is_err() {
                break;
            }
            flushed += block_len;
        }

        if let Err(e) = result {
            self.pending = pending;
            self.pending.truncate(kept);
            self.rollback(entries_before, offset_before)?;
            return Err(e);
        }

        self.pending = pending;
        self.pending.drain(..flushed);
        accumulate_bounds(&mut self.bbox, records, self.stride);
        self.npoints += count as u64;
        Ok(())
    }

    /// Cut the file back to `offset` and forget the index entries past `entries`.
    fn rollback(&mut self, entries: usize, offset: u64) -> anyhow::Result<()> {
        self.entries.truncate(entries);
        self.current_offset = offset;
        let cut = self
            .file
            .set_len(offset)
            .and_then(|()| self.file.seek(SeekFrom::Start(offset)).map(|_| ()));
        if let Err(e) = cut {
            // The file no longer matches the index; refuse to seal it.
            self.finished = true;
            return Err(e)
                .with_context(|| format!("rolling back {:?} after a failed block", self.path));
        }
        Ok(())
    }

    /// Compress `records` as a single block and write it to the file.
    fn flush_block(&mut self, records: &[f32]) -> anyhow::Result<()> {
        let raw = records_to_bytes(records);
        let raw_len = u32::try_from(raw.len()).context("block exceeds 4 GiB")?;
        let compressed = self.codec.compress_block(&raw)?;
        let compressed_len =
            u32::try_from(compressed.len()).context("compressed block exceeds 4 GiB")?;
        let checksum = xxh3_64(&compressed);

        let block_offset = self.current_offset;
        self.file.write_all(&compressed)?;
        self.current_offset += compressed_len as u64;

        let record_count = (records.len() / self.stride) as u32;
        tracing::debug!(
            block = self.entries.len(),
            records = record_count,
            raw = raw_len,
            compressed = compressed_len,
            "flushed block"
        );
        self.entries.push(BlockEntry {
            offset: block_offset,
            compressed_len,
            raw_len,
            checksum,
            record_count,
        });
        Ok(())
    }

    /// Flush remaining buffered records, write the block index + footer, and
    /// seal the file by writing the final header.
    ///
    /// Returns the number of blocks written. Calling it again is a no-op.
    pub fn finish(&mut self) -> anyhow::Result<u64> {
        if self.finished {
            return Ok(self.entries.len() as u64);
        }
        self.finished = true;

        // Flush any partial trailing block
        if !self.pending.is_empty() {
            let remaining = std::mem::take(&mut self.pending);
            self.flush_block(&remaining)?;
        }

        // ── Block index ────────────────────────────────────────────────────
        let index_offset = self.current_offset;
        for entry in &self.entries {
            self.file.write_all(&entry.to_bytes())?;
        }
        self.current_offset += self.entries.len() as u64 * BLOCK_ENTRY_SIZE;

        // ── Footer: 8-byte u64 LE offset of block index start ──────────────
        self.file.write_all(&index_offset.to_le_bytes())?;

        // ── Seek back to 0 and write the real header ────────────────────────
        let block_count = self.entries.len() as u64;
        let mut flags = FLAG_HAS_CHECKSUM;
        if self.bbox.is_some() {
            flags |= FLAG_HAS_BBOX;
        }
        let header = PtcHeader {
            version: 1,
            codec_id: self.codec.id(),
            block_records: self.block_records,
            metadata_len: self.metadata_len,
            npoints: self.npoints,
            block_count,
            flags,
            bbox: self.bbox.map(BBox::to_array).unwrap_or_default(),
        };
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.to_bytes())?;
        self.file.flush()?;

        tracing::debug!(
            path = %self.path.display(),
            npoints = self.npoints,
            blocks = block_count,
            codec = self.codec.name(),
            "sealed PTC1 file"
        );
        Ok(block_count)
    }
}

impl RecordHandle for ContainerWriter {
    fn write_records(&mut self, count: usize, records: &[f32]) -> anyhow::Result<()> {
        ContainerWriter::write_records(self, count, records)
    }

    fn read_records(&mut self, _count: usize, _out: &mut [f32]) -> anyhow::Result<usize> {
        anyhow::bail!("{:?} is open for writing", self.path)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.finish().map(|_| ())
    }
}
