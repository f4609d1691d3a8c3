use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::codec::BlockCodec;
use crate::format::CODEC_DEFLATE;

/// Raw DEFLATE block codec.
///
/// Slower than zstd at a similar ratio, but readable by any zlib-capable tool
/// once a block has been located through the index.
pub struct DeflateCodec {
    /// Compression level (0 = store, 9 = best).
    pub level: u32,
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl DeflateCodec {
    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

impl BlockCodec for DeflateCodec {
    fn id(&self) -> u16 {
        CODEC_DEFLATE
    }

    fn name(&self) -> &'static str {
        "deflate"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(raw_len);
        DeflateDecoder::new(compressed).read_to_end(&mut raw)?;
        Ok(raw)
    }
}
