/// Block compression abstraction used by the PTC1 container.
///
/// Each `BlockCodec` implementation:
/// - Is identified by a stable numeric `id()` stored in the PTC1 header.
/// - Must compress/decompress individual blocks independently. No cross-block
///   state is permitted, so any block can be decoded on its own.
pub trait BlockCodec: Send + Sync {
    /// Stable codec ID stored in the PTC1 file header.
    fn id(&self) -> u16;

    /// Codec name, also the default registry name of its backend.
    fn name(&self) -> &'static str;

    /// Compress a single independent block of record bytes.
    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Decompress a single independent block.
    ///
    /// `raw_len` is the uncompressed size recorded in the block index.
    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>>;
}
