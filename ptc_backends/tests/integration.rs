/// Integration tests for the PTC1 container: records survive every codec
/// across block boundaries, single blocks decode on their own, and damaged
/// files are rejected instead of yielding wrong points.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ptc_backends::format::{CODEC_LZ4, CODEC_RAW, HEADER_SIZE};
use ptc_backends::{
    default_registry, read_header, BlockBackend, BlockCodec, BlockOptions, ContainerReader,
    ContainerWriter, DeflateCodec, Lz4Codec, PassThroughCodec, ZstdCodec,
};
use ptc_core::{ErrorKind, Metadata, PointCloud, RecordHandle, Schema};
use tempfile::TempDir;

// ── helpers ───────────────────────────────────────────────────────────────

fn schema() -> Schema {
    Schema::parse([("float", "area"), ("color", "Cs")]).unwrap()
}

/// `n` deterministic records of stride 11 for [`schema`].
fn records(n: usize) -> Vec<f32> {
    (0..n)
        .flat_map(|i| {
            let f = i as f32;
            [
                f, -f, f * 0.5, // position
                0.0, 1.0, 0.0, // normal
                0.25 + f * 0.01, // radius
                f * f, // area
                (i % 7) as f32, 0.5, 1.0, // Cs
            ]
        })
        .collect()
}

/// Pseudo-random records, hard to compress.
fn noisy_records(n: usize, seed: u64) -> Vec<f32> {
    let mut rng = seed;
    (0..n * 11)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            f32::from_bits(((rng >> 40) as u32) | 0x3f80_0000)
        })
        .collect()
}

fn write_file(path: &Path, codec: Arc<dyn BlockCodec>, block_records: u32, data: &[f32]) -> u64 {
    let mut w = ContainerWriter::create(path, codec, block_records, &schema(), &Metadata::default())
        .unwrap();
    w.write_records(data.len() / 11, data).unwrap();
    w.finish().unwrap()
}

fn read_all(reader: &mut ContainerReader) -> Vec<f32> {
    let mut out = Vec::new();
    let mut buf = vec![0.0; 33 * 11];
    loop {
        let n = reader.read_records(33, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n * 11]);
    }
    out
}

/// Stores blocks verbatim like the raw codec, but fails one compression.
struct FlakyCodec {
    calls: AtomicUsize,
    fail_on: usize,
}

impl FlakyCodec {
    /// Fail the `call`-th compression (zero-based), succeed on every other.
    fn failing_on(call: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: call,
        }
    }
}

impl BlockCodec for FlakyCodec {
    fn id(&self) -> u16 {
        CODEC_RAW
    }

    fn name(&self) -> &'static str {
        "flaky"
    }

    fn compress_block(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            anyhow::bail!("transient");
        }
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, compressed: &[u8], _raw_len: usize) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}

fn scratch() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloud.ptc");
    (dir, path)
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_every_codec_across_blocks() {
    let codecs: Vec<Arc<dyn BlockCodec>> = vec![
        Arc::new(PassThroughCodec),
        Arc::new(ZstdCodec::default()),
        Arc::new(Lz4Codec),
        Arc::new(DeflateCodec::default()),
    ];
    let data = records(1000);

    for codec in codecs {
        let (_dir, path) = scratch();
        let blocks = write_file(&path, codec.clone(), 128, &data);
        assert_eq!(blocks, 8, "{}: 7 full blocks + 1 partial", codec.name());

        let mut r = ContainerReader::open(&path, codec.clone()).unwrap();
        assert_eq!(r.metadata().npoints, 1000);
        assert_eq!(r.schema(), &schema());
        assert_eq!(read_all(&mut r), data, "{} round-trip should be exact", codec.name());
    }
}

#[test]
fn test_single_block_decodes_alone() {
    let (_dir, path) = scratch();
    let data = records(640);
    write_file(&path, Arc::new(ZstdCodec::default()), 64, &data);

    let mut r = ContainerReader::open(&path, Arc::new(ZstdCodec::default())).unwrap();
    let block = r.read_block(7).unwrap();
    assert_eq!(block.as_slice(), &data[7 * 64 * 11..8 * 64 * 11]);
    assert!(r.read_block(10).is_err());
}

#[test]
fn test_header_carries_count_and_bounds() {
    let (_dir, path) = scratch();
    write_file(&path, Arc::new(Lz4Codec), 100, &records(10));

    let header = read_header(&path).unwrap();
    assert_eq!(header.codec_id, CODEC_LZ4);
    assert_eq!(header.npoints, 10);

    let r = ContainerReader::open_detect(&path).unwrap();
    assert_eq!(r.codec().name(), "lz4");
    let bbox = r.metadata().bbox.unwrap();
    assert_eq!(bbox.min, [0.0, -9.0, 0.0]);
    assert_eq!(bbox.max, [9.0, 0.0, 4.5]);
}

#[test]
fn test_empty_file() {
    let (_dir, path) = scratch();
    let blocks = write_file(&path, Arc::new(PassThroughCodec), 16, &[]);
    assert_eq!(blocks, 0);

    let mut r = ContainerReader::open(&path, Arc::new(PassThroughCodec)).unwrap();
    assert_eq!(r.metadata().npoints, 0);
    assert!(r.metadata().bbox.is_none());
    let mut buf = [0.0; 11];
    assert_eq!(r.read_records(1, &mut buf).unwrap(), 0);
}

#[test]
fn test_codec_mismatch_error() {
    let (_dir, path) = scratch();
    write_file(&path, Arc::new(ZstdCodec::default()), 16, &records(3));

    let result = ContainerReader::open(&path, Arc::new(Lz4Codec));
    let err = result.err().unwrap().to_string();
    assert!(err.contains("codec mismatch"), "got: {err}");
}

#[test]
fn test_bad_magic_rejected() {
    let (_dir, path) = scratch();
    std::fs::write(&path, vec![0u8; 256]).unwrap();
    let err = ContainerReader::open(&path, Arc::new(PassThroughCodec))
        .err()
        .unwrap();
    assert!(err.to_string().contains("magic"));
}

#[test]
fn test_corrupted_block_fails_checksum() {
    let (_dir, path) = scratch();
    write_file(&path, Arc::new(PassThroughCodec), 4, &records(8));

    let r = ContainerReader::open(&path, Arc::new(PassThroughCodec)).unwrap();
    let second = r.entries()[1].offset as usize;
    drop(r);

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[second + 5] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    let mut r = ContainerReader::open(&path, Arc::new(PassThroughCodec)).unwrap();
    let mut buf = vec![0.0; 8 * 11];
    // First block is intact.
    assert_eq!(r.read_records(4, &mut buf).unwrap(), 4);
    let err = r.read_records(4, &mut buf).unwrap_err();
    assert!(err.to_string().contains("checksum mismatch"), "got: {err}");
}

#[test]
fn test_truncated_file_rejected() {
    let (_dir, path) = scratch();
    write_file(&path, Arc::new(PassThroughCodec), 4, &records(8));
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 20]).unwrap();
    assert!(ContainerReader::open(&path, Arc::new(PassThroughCodec)).is_err());

    std::fs::write(&path, &bytes[..HEADER_SIZE as usize - 1]).unwrap();
    assert!(ContainerReader::open(&path, Arc::new(PassThroughCodec)).is_err());
}

#[test]
fn test_compressible_records_shrink() {
    let (_dir, path) = scratch();
    let mut data = Vec::new();
    for _ in 0..500 {
        data.extend_from_slice(&records(1));
    }
    write_file(&path, Arc::new(ZstdCodec::default()), 256, &data);
    let r = ContainerReader::open(&path, Arc::new(ZstdCodec::default())).unwrap();
    assert!(r.ratio() > 2.0, "repeated records should compress: {:.2}x", r.ratio());

    let (_dir2, noisy) = scratch();
    write_file(&noisy, Arc::new(ZstdCodec::default()), 256, &noisy_records(500, 0xDEAD_BEEF));
    let r = ContainerReader::open(&noisy, Arc::new(ZstdCodec::default())).unwrap();
    assert!(r.ratio() < 1.5, "noise should barely compress: {:.4}x", r.ratio());
}

#[test]
fn test_writer_handle_contract() {
    let (_dir, path) = scratch();
    let mut w = ContainerWriter::create(
        &path,
        Arc::new(PassThroughCodec),
        16,
        &schema(),
        &Metadata::default(),
    )
    .unwrap();
    let handle: &mut dyn RecordHandle = &mut w;
    assert!(handle.write_records(2, &records(1)).is_err(), "length must match count");
    handle.write_record(&records(1)).unwrap();
    assert!(handle.read_records(1, &mut [0.0; 11]).is_err());
    handle.close().unwrap();
    handle.close().unwrap();
    assert!(handle.write_record(&records(1)).is_err());
    assert_eq!(w.npoints(), 1);
}

#[test]
fn test_zero_block_records_rejected() {
    let (_dir, path) = scratch();
    let result = ContainerWriter::create(
        &path,
        Arc::new(PassThroughCodec),
        0,
        &schema(),
        &Metadata::default(),
    );
    assert!(result.is_err());
    assert!(!path.exists());
}

#[test]
fn test_custom_block_backend_through_session() {
    let (_dir, path) = scratch();
    let small = BlockBackend::new(Arc::new(ZstdCodec::new(19)))
        .with_name("zstd-small")
        .with_options(BlockOptions { block_records: 3 });
    assert_eq!(small.options().block_records, 3);
    let registry = default_registry().with(Arc::new(small));
    assert!(registry.contains("zstd-small"));

    let mut ptc =
        PointCloud::create(&registry, &path, "zstd-small", schema(), Metadata::default()).unwrap();
    ptc.write_points(10, &records(10)).unwrap();
    ptc.close();

    let r = ContainerReader::open_detect(&path).unwrap();
    assert_eq!(r.header.block_records, 3);
    assert_eq!(r.block_count(), 4);

    // Block size is a writer setting; the stock zstd backend reads the file.
    let mut ptc = PointCloud::open(&registry, &path, "zstd").unwrap();
    let mut buf = vec![0.0f32; 10 * 11];
    assert_eq!(ptc.read_points(10, &mut buf).unwrap(), 10);
    assert_eq!(buf, records(10));
}

#[test]
fn test_footer_offset_overflow_rejected() {
    let (_dir, path) = scratch();
    write_file(&path, Arc::new(PassThroughCodec), 4, &records(1));
    let mut bytes = std::fs::read(&path).unwrap();
    let footer = bytes.len() - 8;
    bytes[footer..].copy_from_slice(&u64::MAX.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    assert!(ContainerReader::open(&path, Arc::new(PassThroughCodec)).is_err());
    let err = PointCloud::open(&default_registry(), &path, "raw").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Open);
}

#[test]
fn test_block_entry_outside_data_rejected() {
    let (_dir, path) = scratch();
    write_file(&path, Arc::new(PassThroughCodec), 4, &records(8));
    let r = ContainerReader::open(&path, Arc::new(PassThroughCodec)).unwrap();
    let index_offset = r.entries()[1].offset + r.entries()[1].compressed_len as u64;
    drop(r);

    // Point the second entry's offset far past the end of the file.
    let mut bytes = std::fs::read(&path).unwrap();
    let entry = index_offset as usize + 32;
    bytes[entry..entry + 8].copy_from_slice(&(u64::MAX - 4).to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let err = ContainerReader::open(&path, Arc::new(PassThroughCodec))
        .err()
        .unwrap();
    assert!(err.to_string().contains("outside the data section"), "got: {err}");
}

#[test]
fn test_failed_block_flush_keeps_file_consistent() {
    let (_dir, path) = scratch();
    let flaky = BlockBackend::new(Arc::new(FlakyCodec::failing_on(0)))
        .with_options(BlockOptions { block_records: 2 });
    let registry = default_registry().with(Arc::new(flaky));

    let mut ptc =
        PointCloud::create(&registry, &path, "flaky", schema(), Metadata::default()).unwrap();
    let mut far = records(2);
    far[0] = 1000.0;
    let err = ptc.write_points(2, &far).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Codec);
    assert!(err.to_string().contains("transient"));
    assert_eq!(ptc.npoints(), 0);

    let data = records(3);
    ptc.write_points(1, &data[..11]).unwrap();
    ptc.write_points(2, &data[11..]).unwrap();
    assert_eq!(ptc.npoints(), 3);
    ptc.close();

    let mut ptc = PointCloud::open(&registry, &path, "raw").unwrap();
    assert_eq!(ptc.npoints(), 3);
    assert_eq!(ptc.bbox().unwrap().max[0], 2.0, "rejected records must not widen the bounds");
    let mut buf = vec![0.0f32; 3 * 11];
    assert_eq!(ptc.read_points(3, &mut buf).unwrap(), 3);
    assert_eq!(buf, data);
}

#[test]
fn test_failed_flush_rolls_back_earlier_blocks_of_the_call() {
    let (_dir, path) = scratch();
    let mut w = ContainerWriter::create(
        &path,
        Arc::new(FlakyCodec::failing_on(1)),
        2,
        &schema(),
        &Metadata::default(),
    )
    .unwrap();
    w.write_records(1, &records(1)).unwrap();

    // Three blocks' worth: the first flushes, the second fails.
    let batch = records(6);
    assert!(w.write_records(5, &batch[11..]).is_err());
    assert_eq!(w.npoints(), 1);

    w.write_records(1, &records(2)[11..]).unwrap();
    assert_eq!(w.npoints(), 2);
    assert_eq!(w.finish().unwrap(), 1);

    let mut r = ContainerReader::open(&path, Arc::new(PassThroughCodec)).unwrap();
    assert_eq!(r.metadata().npoints, 2);
    assert_eq!(read_all(&mut r), records(2));
}

#[test]
fn test_oversized_block_rejected() {
    let (_dir, path) = scratch();
    // 11 floats per record: 100M records make a 4.4 GB block.
    let result = ContainerWriter::create(
        &path,
        Arc::new(PassThroughCodec),
        100_000_000,
        &schema(),
        &Metadata::default(),
    );
    let err = result.err().unwrap();
    assert!(err.to_string().contains("blocks are limited"), "got: {err}");
    assert!(!path.exists());

    let wide = BlockBackend::new(Arc::new(PassThroughCodec))
        .with_name("wide")
        .with_options(BlockOptions { block_records: u32::MAX });
    let registry = default_registry().with(Arc::new(wide));
    let err = PointCloud::create(&registry, &path, "wide", schema(), Metadata::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Open);
}
