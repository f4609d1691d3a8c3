use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::metadata::Metadata;
use crate::schema::Schema;

/// Everything a backend hands back when a file is opened for reading.
pub struct ReadOpened {
    pub handle: Box<dyn RecordHandle>,
    pub schema: Schema,
    /// Stored metadata, including `npoints` and `bbox`.
    pub metadata: Metadata,
}

/// A persistence backend for point-cloud files.
///
/// Each `Backend`:
/// - Is registered under a stable `name()` in a [`BackendRegistry`].
/// - Stores records exactly as given, in the canonical per-point order
///   `[position(3), normal(3), radius(1), aux(datasize)]`, and returns them
///   in write order.
/// - Persists the schema, the writer-supplied metadata, the point count and
///   the bounding box of all written positions.
pub trait Backend: Send + Sync {
    /// Registry key for this backend.
    fn name(&self) -> &str;

    /// Create `path` for writing and persist the schema and metadata.
    ///
    /// A failed open must not leave a handle or a partial file behind.
    fn open_for_write(
        &self,
        path: &Path,
        schema: &Schema,
        metadata: &Metadata,
    ) -> anyhow::Result<Box<dyn RecordHandle>>;

    /// Open an existing file and report its schema and metadata.
    fn open_for_read(&self, path: &Path) -> anyhow::Result<ReadOpened>;
}

/// One open file inside a backend.
///
/// All buffers are flat `f32` slices in canonical record order; a record is
/// `stride = 7 + datasize` floats for the schema the handle was opened with.
pub trait RecordHandle: Send {
    /// Append `count` records from `records` (`count * stride` floats).
    fn write_records(&mut self, count: usize, records: &[f32]) -> anyhow::Result<()>;

    /// Fill up to `count` records into the front of `out`.
    ///
    /// Returns the number of records written to `out`; fewer than `count`
    /// means the stream ended, `0` means it was already exhausted.
    fn read_records(&mut self, count: usize, out: &mut [f32]) -> anyhow::Result<usize>;

    /// Append a single record.
    fn write_record(&mut self, record: &[f32]) -> anyhow::Result<()> {
        self.write_records(1, record)
    }

    /// Read a single record into `out`; `false` once the stream is exhausted.
    fn read_record(&mut self, out: &mut [f32]) -> anyhow::Result<bool> {
        Ok(self.read_records(1, out)? == 1)
    }

    /// Flush pending data and release the underlying resources.
    ///
    /// Called at most once per handle.
    fn close(&mut self) -> anyhow::Result<()>;
}

/// Named set of backends available to [`crate::PointCloud`] sessions.
///
/// There is no process-wide registry: callers build one, register what they
/// need, and pass it to every open call.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` under its own name, replacing any previous entry.
    pub fn register(&mut self, backend: Arc<dyn Backend>) -> Option<Arc<dyn Backend>> {
        self.backends.insert(backend.name().to_string(), backend)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, backend: Arc<dyn Backend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.backends.keys()).finish()
    }
}
