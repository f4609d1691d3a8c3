use crate::codec::BlockCodec;
use crate::format::CODEC_RAW;

/// No-op codec: stores record blocks verbatim, with no compression.
///
/// The resulting file is a plain little-endian `f32` dump between the
/// metadata section and the block index, which makes it the easiest backend to
/// inspect and the reference for the compressed ones.
pub struct PassThroughCodec;

impl BlockCodec for PassThroughCodec {
    fn id(&self) -> u16 {
        CODEC_RAW
    }

    fn name(&self) -> &'static str {
        "raw"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, compressed: &[u8], _raw_len: usize) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}
