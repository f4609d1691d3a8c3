use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ptc_core::{BBox, Metadata, RecordHandle, Schema};
use xxhash_rust::xxh3::xxh3_64;

use crate::codec::BlockCodec;
use crate::format::{
    bytes_to_records, decode_metadata, BlockEntry, PtcHeader, BLOCK_ENTRY_SIZE, FLAG_HAS_BBOX,
    FLAG_HAS_CHECKSUM, FOOTER_SIZE, HEADER_SIZE,
};

/// Read only the fixed header of a PTC1 file.
///
/// Used to pick the codec of an unknown file before opening it.
pub fn read_header(path: impl AsRef<Path>) -> anyhow::Result<PtcHeader> {
    let path = path.as_ref();
    let mut file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let mut buf = [0u8; HEADER_SIZE as usize];
    file.read_exact(&mut buf)
        .with_context(|| format!("reading header of {:?}", path))?;
    PtcHeader::from_bytes(&buf)
}

/// Reader for PTC1 files.
///
/// # Open sequence
/// 1. Read the 72-byte header (magic check, codec_id, npoints, block_count).
/// 2. Read the metadata section that follows it (transforms, format, schema).
/// 3. Seek to `file_end - 8`, read the `index_offset` u64.
/// 4. Seek to `index_offset`, load the full block index into RAM.
///
/// # Access pattern
/// [`read_block`](Self::read_block) seeks directly to one block and decodes
/// only that block. [`read_records`](Self::read_records) walks the blocks in
/// order, decoding each one lazily when the previous one is used up.
pub struct ContainerReader {
    path: PathBuf,
    file: File,
    pub header: PtcHeader,
    schema: Schema,
    metadata: Metadata,
    entries: Vec<BlockEntry>,
    codec: Arc<dyn BlockCodec>,
    stride: usize,
    /// Next block to decode for sequential reads.
    next_block: u64,
    /// Records of the most recently decoded block.
    decoded: Vec<f32>,
    /// Float offset of the next unread record in `decoded`.
    decoded_pos: usize,
}

impl ContainerReader {
    /// Open a PTC1 file.
    ///
    /// `codec` must match the `codec_id` stored in the file header. Use
    /// [`open_detect`](Self::open_detect) when the codec is not known up front.
    pub fn open(path: impl AsRef<Path>, codec: Arc<dyn BlockCodec>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).with_context(|| format!("opening {:?}", path))?;
        let file_len = file.metadata()?.len();

        // ── Read and validate header ────────────────────────────────────────
        let mut header_buf = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header_buf)
            .context("file too short for a PTC1 header")?;
        let header = PtcHeader::from_bytes(&header_buf)?;

        if header.version != 1 {
            anyhow::bail!(
                "unsupported PTC version {} (only version 1 is supported)",
                header.version
            );
        }
        if header.codec_id != codec.id() {
            anyhow::bail!(
                "codec mismatch: file uses codec {} but provided codec has id {}",
                header.codec_id,
                codec.id()
            );
        }
        if HEADER_SIZE + header.metadata_len as u64 + FOOTER_SIZE > file_len {
            anyhow::bail!("file is truncated ({} bytes)", file_len);
        }

        // ── Metadata section ────────────────────────────────────────────────
        let mut section = vec![0u8; header.metadata_len as usize];
        file.read_exact(&mut section)?;
        let (schema, mut metadata) = decode_metadata(&section)?;
        metadata.npoints = header.npoints;
        metadata.bbox = header
            .has_flag(FLAG_HAS_BBOX)
            .then(|| BBox::from_array(header.bbox));

        // ── Read footer → index offset ──────────────────────────────────────
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer_buf = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer_buf)?;
        let index_offset = u64::from_le_bytes(footer_buf);
        let index_len = header
            .block_count
            .checked_mul(BLOCK_ENTRY_SIZE)
            .context("block count overflows")?;
        let index_end = index_offset
            .checked_add(index_len)
            .and_then(|end| end.checked_add(FOOTER_SIZE));
        if index_end != Some(file_len) {
            anyhow::bail!(
                "block index at {} with {} entries does not end at the footer",
                index_offset,
                header.block_count
            );
        }

        // ── Load block index ────────────────────────────────────────────────
        let data_start = HEADER_SIZE + header.metadata_len as u64;
        let stride = schema.stride();
        file.seek(SeekFrom::Start(index_offset))?;
        let mut entries = Vec::with_capacity(header.block_count as usize);
        let mut entry_buf = [0u8; BLOCK_ENTRY_SIZE as usize];
        for idx in 0..header.block_count {
            file.read_exact(&mut entry_buf)?;
            let entry = BlockEntry::from_bytes(&entry_buf)?;
            // Every block must lie between the metadata section and the index.
            let block_end = entry.offset.checked_add(entry.compressed_len as u64);
            if entry.offset < data_start || block_end.map_or(true, |end| end > index_offset) {
                anyhow::bail!(
                    "block {} at {} (+{} bytes) lies outside the data section",
                    idx,
                    entry.offset,
                    entry.compressed_len
                );
            }
            let expected_raw = (entry.record_count as u64).checked_mul(stride as u64 * 4);
            if expected_raw != Some(entry.raw_len as u64) {
                anyhow::bail!(
                    "block {} holds {} records but {} raw bytes",
                    idx,
                    entry.record_count,
                    entry.raw_len
                );
            }
            entries.push(entry);
        }

        let indexed: u64 = entries.iter().map(|e| e.record_count as u64).sum();
        if indexed != header.npoints {
            anyhow::bail!(
                "header reports {} points but the block index holds {}",
                header.npoints,
                indexed
            );
        }

        tracing::debug!(
            path = %path.display(),
            npoints = header.npoints,
            blocks = header.block_count,
            codec = codec.name(),
            "opened PTC1 file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            stride,
            schema,
            metadata,
            entries,
            codec,
            next_block: 0,
            decoded: Vec::new(),
            decoded_pos: 0,
        })
    }

    /// Open a PTC1 file with whichever bundled codec its header names.
    pub fn open_detect(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let header = read_header(&path)?;
        let codec = crate::codec_by_id(header.codec_id)?;
        Self::open(path, codec)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Stored metadata including `npoints` and `bbox`.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn codec(&self) -> &Arc<dyn BlockCodec> {
        &self.codec
    }

    /// Total number of blocks in the file.
    #[inline]
    pub fn block_count(&self) -> u64 {
        self.header.block_count
    }

    /// Access the raw `BlockEntry` slice.
    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    /// Total uncompressed size of all blocks in bytes.
    pub fn raw_size(&self) -> u64 {
        self.entries.iter().map(|e| e.raw_len as u64).sum()
    }

    /// Total compressed size of all blocks in bytes (excluding index/header).
    pub fn compressed_size(&self) -> u64 {
        self.entries.iter().map(|e| e.compressed_len as u64).sum()
    }

    /// Compression ratio (raw / compressed).
    pub fn ratio(&self) -> f64 {
        let raw = self.raw_size();
        let compressed = self.compressed_size();
        if compressed == 0 {
            return 1.0;
        }
        raw as f64 / compressed as f64
    }

    /// Decompress and return the records of block `idx`.
    ///
    /// Only the single block at `entries[idx].offset` is read from disk.
    pub fn read_block(&mut self, idx: u64) -> anyhow::Result<Vec<f32>> {
        let entry = self
            .entries
            .get(idx as usize)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "block index {} out of range (total {})",
                    idx,
                    self.header.block_count
                )
            })?
            .clone();

        self.file.seek(SeekFrom::Start(entry.offset))?;
        let mut compressed = vec![0u8; entry.compressed_len as usize];
        self.file.read_exact(&mut compressed)?;

        // Verify checksum if the flag is set
        if self.header.has_flag(FLAG_HAS_CHECKSUM) {
            let computed = xxh3_64(&compressed);
            if computed != entry.checksum {
                anyhow::bail!(
                    "block {} checksum mismatch: expected {:016x}, got {:016x}",
                    idx,
                    entry.checksum,
                    computed
                );
            }
        }

        let raw = self
            .codec
            .decompress_block(&compressed, entry.raw_len as usize)?;
        let expected_raw = entry.record_count as usize * self.stride * 4;
        if raw.len() != entry.raw_len as usize || raw.len() != expected_raw {
            anyhow::bail!(
                "block {} decompressed to {} bytes but index says {} ({} records)",
                idx,
                raw.len(),
                entry.raw_len,
                entry.record_count
            );
        }

        let mut records = Vec::new();
        bytes_to_records(&raw, &mut records)?;
        tracing::debug!(
            block = idx,
            records = entry.record_count,
            compressed = entry.compressed_len,
            "loaded block"
        );
        Ok(records)
    }

    /// Copy up to `count` records, in file order, into the front of `out`.
    ///
    /// Returns how many records were copied; `0` once every block is consumed.
    pub fn read_records(&mut self, count: usize, out: &mut [f32]) -> anyhow::Result<usize> {
        let wanted = count * self.stride;
        if out.len() < wanted {
            anyhow::bail!(
                "output holds {} floats, {} records need {}",
                out.len(),
                count,
                wanted
            );
        }

        let mut filled = 0;
        while filled < wanted {
            if self.decoded_pos == self.decoded.len() {
                if self.next_block == self.block_count() {
                    break;
                }
                self.decoded = self.read_block(self.next_block)?;
                self.decoded_pos = 0;
                self.next_block += 1;
                continue;
            }
            let n = (wanted - filled).min(self.decoded.len() - self.decoded_pos);
            out[filled..filled + n]
                .copy_from_slice(&self.decoded[self.decoded_pos..self.decoded_pos + n]);
            filled += n;
            self.decoded_pos += n;
        }
        Ok(filled / self.stride)
    }
}

impl RecordHandle for ContainerReader {
    fn write_records(&mut self, _count: usize, _records: &[f32]) -> anyhow::Result<()> {
        anyhow::bail!("{:?} is open for reading", self.path)
    }

    fn read_records(&mut self, count: usize, out: &mut [f32]) -> anyhow::Result<usize> {
        ContainerReader::read_records(self, count, out)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.decoded = Vec::new();
        self.decoded_pos = 0;
        Ok(())
    }
}
