use anyhow::Context;
use ptc_core::{Format, Metadata, Schema, VarType, Variable};

/// Magic bytes for PTC version 1 files: "PTC1\n" followed by 3 null bytes.
pub const MAGIC: &[u8; 8] = b"PTC1\n\x00\x00\x00";

/// Fixed size of the PTC1 file header in bytes.
///   magic[8] + version:u16 + codec_id:u16 + block_records:u32
///   + metadata_len:u32 + reserved[4] + npoints:u64 + block_count:u64
///   + flags:u64 + bbox:f32×6
///   = 8 + 2 + 2 + 4 + 4 + 4 + 8 + 8 + 8 + 24 = 72
pub const HEADER_SIZE: u64 = 72;

/// Size of each BlockEntry in the block index, in bytes.
///   offset:u64 + compressed_len:u32 + raw_len:u32
///   + checksum:u64 + record_count:u32 + _pad[4]
///   = 8 + 4 + 4 + 8 + 4 + 4 = 32
pub const BLOCK_ENTRY_SIZE: u64 = 32;

/// Size of the index footer (single u64 offset) in bytes.
pub const FOOTER_SIZE: u64 = 8;

/// Default number of records per block.
pub const DEFAULT_BLOCK_RECORDS: u32 = 4096;

// ── Flags ──────────────────────────────────────────────────────────────────

/// Each block carries an xxhash3-64 checksum of its compressed bytes.
pub const FLAG_HAS_CHECKSUM: u64 = 1 << 0;

/// The header bbox field is valid (at least one point was written).
pub const FLAG_HAS_BBOX: u64 = 1 << 1;

// ── Codec IDs ──────────────────────────────────────────────────────────────

pub const CODEC_RAW: u16 = 0;
pub const CODEC_ZSTD: u16 = 1;
pub const CODEC_LZ4: u16 = 2;
pub const CODEC_DEFLATE: u16 = 3;

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 72-byte PTC1 file header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PtcHeader {
    pub version: u16,
    pub codec_id: u16,
    /// Nominal records per block (the last block may hold fewer).
    pub block_records: u32,
    /// Length of the metadata section that follows the header.
    pub metadata_len: u32,
    pub npoints: u64,
    pub block_count: u64,
    pub flags: u64,
    /// `[min_x, min_y, min_z, max_x, max_y, max_z]`, valid with [`FLAG_HAS_BBOX`].
    pub bbox: [f32; 6],
}

impl PtcHeader {
    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[..8].copy_from_slice(MAGIC);
        buf[8..10].copy_from_slice(&self.version.to_le_bytes());
        buf[10..12].copy_from_slice(&self.codec_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.block_records.to_le_bytes());
        buf[16..20].copy_from_slice(&self.metadata_len.to_le_bytes());
        // reserved[4] stays zero
        buf[24..32].copy_from_slice(&self.npoints.to_le_bytes());
        buf[32..40].copy_from_slice(&self.block_count.to_le_bytes());
        buf[40..48].copy_from_slice(&self.flags.to_le_bytes());
        for (i, v) in self.bbox.iter().enumerate() {
            buf[48 + i * 4..52 + i * 4].copy_from_slice(&v.to_le_bytes());
        }
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes, checking the magic.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> anyhow::Result<Self> {
        if &buf[..8] != MAGIC {
            anyhow::bail!("invalid PTC magic bytes; not a PTC1 file");
        }
        let mut bbox = [0f32; 6];
        for (i, v) in bbox.iter_mut().enumerate() {
            *v = f32::from_le_bytes(buf[48 + i * 4..52 + i * 4].try_into()?);
        }
        Ok(Self {
            version: u16::from_le_bytes(buf[8..10].try_into()?),
            codec_id: u16::from_le_bytes(buf[10..12].try_into()?),
            block_records: u32::from_le_bytes(buf[12..16].try_into()?),
            metadata_len: u32::from_le_bytes(buf[16..20].try_into()?),
            npoints: u64::from_le_bytes(buf[24..32].try_into()?),
            block_count: u64::from_le_bytes(buf[32..40].try_into()?),
            flags: u64::from_le_bytes(buf[40..48].try_into()?),
            bbox,
        })
    }

    pub fn has_flag(&self, flag: u64) -> bool {
        self.flags & flag != 0
    }
}

// ── Block index entry ───────────────────────────────────────────────────────

/// One entry in the block index: locates and describes a single compressed block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockEntry {
    /// Byte offset of this block from the start of the file.
    pub offset: u64,
    /// Length of the compressed block payload in bytes.
    pub compressed_len: u32,
    /// Length of the uncompressed records in bytes.
    pub raw_len: u32,
    /// xxhash3-64 of the compressed bytes.
    pub checksum: u64,
    /// Number of records stored in the block.
    pub record_count: u32,
}

impl BlockEntry {
    /// Serialize to exactly `BLOCK_ENTRY_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; BLOCK_ENTRY_SIZE as usize] {
        let mut buf = [0u8; BLOCK_ENTRY_SIZE as usize];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.compressed_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.raw_len.to_le_bytes());
        buf[16..24].copy_from_slice(&self.checksum.to_le_bytes());
        buf[24..28].copy_from_slice(&self.record_count.to_le_bytes());
        // buf[28..32] = 4 bytes padding, stays zero
        buf
    }

    /// Deserialize from `BLOCK_ENTRY_SIZE` bytes.
    pub fn from_bytes(buf: &[u8; BLOCK_ENTRY_SIZE as usize]) -> anyhow::Result<Self> {
        Ok(Self {
            offset: u64::from_le_bytes(buf[0..8].try_into()?),
            compressed_len: u32::from_le_bytes(buf[8..12].try_into()?),
            raw_len: u32::from_le_bytes(buf[12..16].try_into()?),
            checksum: u64::from_le_bytes(buf[16..24].try_into()?),
            record_count: u32::from_le_bytes(buf[24..28].try_into()?),
        })
    }
}

// ── Metadata section ────────────────────────────────────────────────────────
//
//   world2eye:f32×16 + world2ndc:f32×16 + format:f32×3 + var_count:u32
//   then per variable: tag_len:u8 + tag + name_len:u16 + name

/// Encode the writer-supplied metadata and the schema.
pub fn encode_metadata(schema: &Schema, metadata: &Metadata) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(35 * 4 + 4 + schema.len() * 16);
    let format = metadata.format.to_array();
    let floats = metadata
        .world2eye
        .iter()
        .chain(&metadata.world2ndc)
        .chain(&format);
    for v in floats {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf.extend_from_slice(&(schema.len() as u32).to_le_bytes());
    for var in schema.variables() {
        let tag = var.ty.as_str().as_bytes();
        buf.push(tag.len() as u8);
        buf.extend_from_slice(tag);
        let name = var.name.as_bytes();
        let name_len = u16::try_from(name.len())
            .with_context(|| format!("variable name '{}' is too long", var.name))?;
        buf.extend_from_slice(&name_len.to_le_bytes());
        buf.extend_from_slice(name);
    }
    Ok(buf)
}

/// Decode a metadata section. `npoints` and `bbox` are left unset; they live
/// in the header.
pub fn decode_metadata(buf: &[u8]) -> anyhow::Result<(Schema, Metadata)> {
    let mut r = SectionReader { buf, pos: 0 };
    let mut world2eye = [0f32; 16];
    let mut world2ndc = [0f32; 16];
    for v in world2eye.iter_mut().chain(world2ndc.iter_mut()) {
        *v = r.f32()?;
    }
    let format = Format::new(r.f32()?, r.f32()?, r.f32()?);

    let var_count = r.u32()?;
    let mut variables = Vec::with_capacity(var_count.min(1024) as usize);
    for _ in 0..var_count {
        let tag_len = r.u8()? as usize;
        let tag = std::str::from_utf8(r.take(tag_len)?).context("variable type is not UTF-8")?;
        let ty: VarType = tag.parse()?;
        let name_len = r.u16()? as usize;
        let name = std::str::from_utf8(r.take(name_len)?).context("variable name is not UTF-8")?;
        variables.push(Variable::new(ty, name));
    }
    if r.pos != buf.len() {
        anyhow::bail!(
            "metadata section has {} trailing bytes",
            buf.len() - r.pos
        );
    }

    let schema = Schema::new(variables)?;
    Ok((schema, Metadata::new(world2eye, world2ndc, format)))
}

struct SectionReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SectionReader<'a> {
    fn take(&mut self, n: usize) -> anyhow::Result<&'a [u8]> {
        let end = self.pos + n;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| anyhow::anyhow!("metadata section truncated at byte {}", self.pos))?;
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> anyhow::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> anyhow::Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into()?))
    }

    fn u32(&mut self) -> anyhow::Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into()?))
    }

    fn f32(&mut self) -> anyhow::Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into()?))
    }
}

// ── Record payloads ─────────────────────────────────────────────────────────

/// Little-endian bytes of a run of records.
pub fn records_to_bytes(records: &[f32]) -> Vec<u8> {
    records.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian `f32`s, appending them to `out`.
pub fn bytes_to_records(bytes: &[u8], out: &mut Vec<f32>) -> anyhow::Result<()> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!("record payload of {} bytes is not a whole number of floats", bytes.len());
    }
    out.reserve(bytes.len() / 4);
    out.extend(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
    );
    Ok(())
}
