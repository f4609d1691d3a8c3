pub mod block;
pub mod codec;
mod deflate_codec;
pub mod format;
mod lz4_codec;
mod memory;
mod passthrough;
pub mod reader;
pub mod writer;
mod zstd_codec;

pub use block::{BlockBackend, BlockOptions};
pub use codec::BlockCodec;
pub use deflate_codec::DeflateCodec;
pub use lz4_codec::Lz4Codec;
pub use memory::MemoryBackend;
pub use passthrough::PassThroughCodec;
pub use reader::{read_header, ContainerReader};
pub use writer::ContainerWriter;
pub use zstd_codec::ZstdCodec;

use std::sync::Arc;

use format::{CODEC_DEFLATE, CODEC_LZ4, CODEC_RAW, CODEC_ZSTD};
use ptc_core::BackendRegistry;

/// Resolve a codec from its on-disk `codec_id`.
///
/// Used when opening a PTC1 file whose codec is not known in advance.
pub fn codec_by_id(id: u16) -> anyhow::Result<Arc<dyn BlockCodec>> {
    match id {
        CODEC_RAW => Ok(Arc::new(PassThroughCodec)),
        CODEC_ZSTD => Ok(Arc::new(ZstdCodec::default())),
        CODEC_LZ4 => Ok(Arc::new(Lz4Codec)),
        CODEC_DEFLATE => Ok(Arc::new(DeflateCodec::default())),
        _ => anyhow::bail!(
            "unknown codec id {}; supported: 0 (raw), 1 (zstd), 2 (lz4), 3 (deflate)",
            id
        ),
    }
}

/// Registry holding every bundled backend under its default name:
/// `memory`, `raw`, `zstd`, `lz4` and `deflate`.
pub fn default_registry() -> BackendRegistry {
    BackendRegistry::new()
        .with(Arc::new(MemoryBackend::new()))
        .with(Arc::new(BlockBackend::new(Arc::new(PassThroughCodec))))
        .with(Arc::new(BlockBackend::new(Arc::new(ZstdCodec::default()))))
        .with(Arc::new(BlockBackend::new(Arc::new(Lz4Codec))))
        .with(Arc::new(BlockBackend::new(Arc::new(DeflateCodec::default()))))
}
