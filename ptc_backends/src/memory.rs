use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use ptc_core::metadata::accumulate_bounds;
use ptc_core::{Backend, Metadata, ReadOpened, RecordHandle, Schema};

/// A finished cloud as published by a closed write handle.
struct StoredCloud {
    schema: Schema,
    metadata: Metadata,
    records: Arc<Vec<f32>>,
}

type Store = Arc<Mutex<HashMap<PathBuf, StoredCloud>>>;

/// In-process reference backend.
///
/// Clouds are kept in a map owned by the backend instance and keyed by path;
/// nothing touches the filesystem. A write session becomes visible to readers
/// when it is closed, replacing any earlier cloud at the same path.
#[derive(Default)]
pub struct MemoryBackend {
    store: Store,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a cloud has been published at `path`.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.store.lock().contains_key(path.as_ref())
    }

    /// Forget the cloud at `path`.
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.store.lock().remove(path.as_ref()).is_some()
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn open_for_write(
        &self,
        path: &Path,
        schema: &Schema,
        metadata: &Metadata,
    ) -> anyhow::Result<Box<dyn RecordHandle>> {
        let mut metadata = metadata.clone();
        metadata.npoints = 0;
        metadata.bbox = None;
        Ok(Box::new(MemoryWriter {
            store: self.store.clone(),
            path: path.to_path_buf(),
            stride: schema.stride(),
            schema: schema.clone(),
            metadata,
            records: Vec::new(),
            closed: false,
        }))
    }

    fn open_for_read(&self, path: &Path) -> anyhow::Result<ReadOpened> {
        let store = self.store.lock();
        let cloud = store
            .get(path)
            .ok_or_else(|| anyhow::anyhow!("no point cloud stored at {:?}", path))?;
        Ok(ReadOpened {
            handle: Box::new(MemoryReader {
                records: cloud.records.clone(),
                stride: cloud.schema.stride(),
                pos: 0,
            }),
            schema: cloud.schema.clone(),
            metadata: cloud.metadata.clone(),
        })
    }
}

struct MemoryWriter {
    store: Store,
    path: PathBuf,
    stride: usize,
    schema: Schema,
    metadata: Metadata,
    records: Vec<f32>,
    closed: bool,
}

impl RecordHandle for MemoryWriter {
    fn write_records(&mut self, count: usize, records: &[f32]) -> anyhow::Result<()> {
        if self.closed {
            anyhow::bail!("{:?} has already been closed", self.path);
        }
        if records.len() != count * self.stride {
            anyhow::bail!(
                "expected {} floats for {} records, got {}",
                count * self.stride,
                count,
                records.len()
            );
        }
        accumulate_bounds(&mut self.metadata.bbox, records, self.stride);
        self.metadata.npoints += count as u64;
        self.records.extend_from_slice(records);
        Ok(())
    }

    fn read_records(&mut self, _count: usize, _out: &mut [f32]) -> anyhow::Result<usize> {
        anyhow::bail!("{:?} is open for writing", self.path)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let cloud = StoredCloud {
            schema: self.schema.clone(),
            metadata: self.metadata.clone(),
            records: Arc::new(std::mem::take(&mut self.records)),
        };
        tracing::debug!(path = %self.path.display(), npoints = cloud.metadata.npoints, "stored cloud in memory");
        self.store.lock().insert(self.path.clone(), cloud);
        Ok(())
    }
}

struct MemoryReader {
    records: Arc<Vec<f32>>,
    stride: usize,
    /// Float offset of the next unread record.
    pos: usize,
}

impl RecordHandle for MemoryReader {
    fn write_records(&mut self, _count: usize, _records: &[f32]) -> anyhow::Result<()> {
        anyhow::bail!("memory cloud is open for reading")
    }

    fn read_records(&mut self, count: usize, out: &mut [f32]) -> anyhow::Result<usize> {
        let available = (self.records.len() - self.pos) / self.stride;
        let n = count.min(available);
        let len = n * self.stride;
        if out.len() < len {
            anyhow::bail!("output holds {} floats, {} records need {}", out.len(), n, len);
        }
        out[..len].copy_from_slice(&self.records[self.pos..self.pos + len]);
        self.pos += len;
        Ok(n)
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_published_on_close() {
        let backend = MemoryBackend::new();
        let schema = Schema::parse([("float", "a")]).unwrap();
        let mut handle = backend
            .open_for_write(Path::new("mem.ptc"), &schema, &Metadata::default())
            .unwrap();
        handle
            .write_records(2, &[1.0, 2.0, 3.0, 0.0, 0.0, 1.0, 0.5, 9.0, -1.0, -2.0, -3.0, 0.0, 0.0, 1.0, 0.5, 8.0])
            .unwrap();
        assert!(!backend.contains("mem.ptc"));
        assert!(backend.open_for_read(Path::new("mem.ptc")).is_err());

        handle.close().unwrap();
        assert!(backend.contains("mem.ptc"));

        let mut opened = backend.open_for_read(Path::new("mem.ptc")).unwrap();
        assert_eq!(opened.schema, schema);
        assert_eq!(opened.metadata.npoints, 2);
        let bbox = opened.metadata.bbox.unwrap();
        assert_eq!(bbox.min, [-1.0, -2.0, -3.0]);
        assert_eq!(bbox.max, [1.0, 2.0, 3.0]);

        let mut out = [0.0; 24];
        assert_eq!(opened.handle.read_records(3, &mut out).unwrap(), 2);
        assert_eq!(out[7], 9.0);
        assert_eq!(out[15], 8.0);
        assert_eq!(opened.handle.read_records(3, &mut out).unwrap(), 0);

        assert!(backend.remove("mem.ptc"));
        assert!(!backend.contains("mem.ptc"));
    }

    #[test]
    fn test_wrong_record_length_rejected() {
        let backend = MemoryBackend::new();
        let mut handle = backend
            .open_for_write(Path::new("bad.ptc"), &Schema::empty(), &Metadata::default())
            .unwrap();
        assert!(handle.write_records(1, &[0.0; 6]).is_err());
    }
}
