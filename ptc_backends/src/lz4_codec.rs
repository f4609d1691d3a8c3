use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::codec::BlockCodec;
use crate::format::CODEC_LZ4;

/// LZ4 block codec.
///
/// Fastest decompression of the bundled codecs. Best for clouds that are
/// re-read many times, e.g. by a renderer's lookup pass.
pub struct Lz4Codec;

impl BlockCodec for Lz4Codec {
    fn id(&self) -> u16 {
        CODEC_LZ4
    }

    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compress_prepend_size(raw))
    }

    fn decompress_block(&self, compressed: &[u8], _raw_len: usize) -> anyhow::Result<Vec<u8>> {
        let raw = decompress_size_prepended(compressed)
            .map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))?;
        Ok(raw)
    }
}
