use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::backend::{BackendRegistry, ReadOpened, RecordHandle};
use crate::error::{Error, Result};
use crate::iter::{Batches, Points};
use crate::metadata::{accumulate_bounds, BBox, Format, Metadata};
use crate::record::{self, Point};
use crate::schema::{Schema, Variable};
use crate::transfer::{Sink, Source};

/// Direction a session was opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "read" => Ok(Mode::Read),
            "w" | "write" => Ok(Mode::Write),
            other => Err(Error::InvalidArgument(format!(
                "unknown open mode '{other}', expected \"r\" or \"w\""
            ))),
        }
    }
}

/// Lifecycle state of a [`PointCloud`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    OpenForWrite,
    OpenForRead,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Closed => "closed",
            State::OpenForWrite => "open for write",
            State::OpenForRead => "open for read",
        })
    }
}

/// Parameters for opening a [`PointCloud`].
///
/// Write sessions need a schema and metadata; read sessions get both from the
/// file and must not supply them.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    mode: Mode,
    backend: String,
    schema: Option<Schema>,
    metadata: Option<Metadata>,
}

impl OpenOptions {
    pub fn new(mode: Mode, backend: impl Into<String>) -> Self {
        Self {
            mode,
            backend: backend.into(),
            schema: None,
            metadata: None,
        }
    }

    pub fn read(backend: impl Into<String>) -> Self {
        Self::new(Mode::Read, backend)
    }

    pub fn write(backend: impl Into<String>) -> Self {
        Self::new(Mode::Write, backend)
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn open(self, registry: &BackendRegistry, path: impl AsRef<Path>) -> Result<PointCloud> {
        PointCloud::open_with(registry, path.as_ref(), self)
    }
}

/// An open point-cloud file.
///
/// # Lifecycle
/// A session starts open for reading or writing and ends [`State::Closed`]
/// after [`close`](Self::close) (or on drop). Closing releases the backend
/// handle exactly once; every later read or write fails with
/// [`Error::InvalidState`], while the metadata accessors keep working.
///
/// # Cursor
/// `cursor()` counts the points read or written so far and never exceeds
/// `npoints()`. In write mode both grow together; in read mode `npoints()` is
/// fixed at open and the cursor only moves forward.
pub struct PointCloud {
    path: PathBuf,
    backend: String,
    mode: Mode,
    schema: Schema,
    metadata: Metadata,
    cursor: u64,
    handle: Option<Box<dyn RecordHandle>>,
    /// Reused flat record buffer for single-point and gathered batch transfers.
    scratch: Vec<f32>,
}

impl PointCloud {
    /// Create `path` for writing through the backend named `backend`.
    ///
    /// `metadata.npoints` and `metadata.bbox` are ignored; they are derived
    /// from the points written.
    pub fn create(
        registry: &BackendRegistry,
        path: impl AsRef<Path>,
        backend: &str,
        schema: Schema,
        metadata: Metadata,
    ) -> Result<Self> {
        OpenOptions::write(backend)
            .schema(schema)
            .metadata(metadata)
            .open(registry, path)
    }

    /// Open `path` for reading through the backend named `backend`.
    pub fn open(registry: &BackendRegistry, path: impl AsRef<Path>, backend: &str) -> Result<Self> {
        OpenOptions::read(backend).open(registry, path)
    }

    fn open_with(registry: &BackendRegistry, path: &Path, options: OpenOptions) -> Result<Self> {
        let OpenOptions {
            mode,
            backend: backend_name,
            schema,
            metadata,
        } = options;

        let backend = registry.get(&backend_name).ok_or_else(|| {
            Error::open(
                path,
                &backend_name,
                anyhow::anyhow!("no backend registered under this name (known: {registry:?})"),
            )
        })?;

        let (handle, schema, metadata) = match mode {
            Mode::Write => {
                let (Some(schema), Some(mut metadata)) = (schema, metadata) else {
                    return Err(Error::InvalidArgument(
                        "opening for write requires a schema and metadata".into(),
                    ));
                };
                metadata.npoints = 0;
                metadata.bbox = None;
                let handle = backend
                    .open_for_write(path, &schema, &metadata)
                    .map_err(|e| Error::open(path, &backend_name, e))?;
                (handle, schema, metadata)
            }
            Mode::Read => {
                if schema.is_some() || metadata.is_some() {
                    return Err(Error::InvalidArgument(
                        "schema and metadata are read from the file in read mode".into(),
                    ));
                }
                let ReadOpened {
                    mut handle,
                    schema,
                    metadata,
                } = backend
                    .open_for_read(path)
                    .map_err(|e| Error::open(path, &backend_name, e))?;
                if (metadata.npoints == 0) != metadata.bbox.is_none() {
                    if let Err(e) = handle.close() {
                        tracing::warn!(path = %path.display(), "closing rejected handle failed: {e:#}");
                    }
                    return Err(Error::open(
                        path,
                        &backend_name,
                        anyhow::anyhow!(
                            "header reports {} points but bounding box is {}",
                            metadata.npoints,
                            if metadata.bbox.is_some() { "set" } else { "unset" }
                        ),
                    ));
                }
                (handle, schema, metadata)
            }
        };

        tracing::debug!(
            path = %path.display(),
            backend = %backend_name,
            ?mode,
            npoints = metadata.npoints,
            datasize = schema.datasize(),
            "opened point cloud"
        );

        Ok(Self {
            path: path.to_path_buf(),
            backend: backend_name,
            mode,
            schema,
            metadata,
            cursor: 0,
            handle: Some(handle),
            scratch: Vec::new(),
        })
    }

    // ── accessors ──────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> State {
        match (&self.handle, self.mode) {
            (None, _) => State::Closed,
            (Some(_), Mode::Write) => State::OpenForWrite,
            (Some(_), Mode::Read) => State::OpenForRead,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn variables(&self) -> &[Variable] {
        self.schema.variables()
    }

    pub fn datasize(&self) -> usize {
        self.schema.datasize()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn npoints(&self) -> u64 {
        self.metadata.npoints
    }

    /// Bounding box of all positions, `None` when the cloud is empty.
    pub fn bbox(&self) -> Option<BBox> {
        self.metadata.bbox
    }

    /// Bounding box as `[min_x, min_y, min_z, max_x, max_y, max_z]`, all zeros
    /// when the cloud is empty.
    pub fn bbox_array(&self) -> [f32; 6] {
        self.metadata.bbox.map(BBox::to_array).unwrap_or_default()
    }

    pub fn world2eye(&self) -> &[f32; 16] {
        &self.metadata.world2eye
    }

    pub fn world2ndc(&self) -> &[f32; 16] {
        &self.metadata.world2ndc
    }

    pub fn format(&self) -> Format {
        self.metadata.format
    }

    /// Points read or written so far.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Points left to read; always zero in write mode.
    pub fn remaining(&self) -> u64 {
        self.metadata.npoints - self.cursor
    }

    // ── write path ─────────────────────────────────────────────────────────

    /// Append one structured point.
    pub fn write_point(&mut self, point: &Point) -> Result<()> {
        self.require(State::OpenForWrite, "write a point")?;
        let mut record = std::mem::take(&mut self.scratch);
        record.clear();
        let result = record::encode_into(point, &self.schema, &mut record)
            .and_then(|()| self.handle_mut()?.write_record(&record).map_err(Error::Codec));
        if result.is_ok() {
            self.commit_written(&record, 1);
        }
        self.scratch = record;
        result
    }

    /// Append `count` points from any supported buffer shape.
    ///
    /// The buffer must hold exactly `count` points; a mismatch is rejected
    /// before anything reaches the backend.
    pub fn write_points<'a>(&mut self, count: usize, points: impl Into<Source<'a>>) -> Result<()> {
        self.require(State::OpenForWrite, "write points")?;
        let records = points.into().to_flat(count, &self.schema)?;
        if count == 0 {
            return Ok(());
        }
        self.handle_mut()?
            .write_records(count, &records)
            .map_err(Error::Codec)?;
        self.commit_written(&records, count);
        tracing::trace!(count, npoints = self.metadata.npoints, "wrote point batch");
        Ok(())
    }

    fn commit_written(&mut self, records: &[f32], count: usize) {
        accumulate_bounds(&mut self.metadata.bbox, records, self.schema.stride());
        self.metadata.npoints += count as u64;
        self.cursor = self.metadata.npoints;
    }

    // ── read path ──────────────────────────────────────────────────────────

    /// Read the next point.
    ///
    /// Fails with [`Error::Eof`] once every point has been read.
    pub fn read_point(&mut self) -> Result<Point> {
        self.require(State::OpenForRead, "read a point")?;
        if self.remaining() == 0 {
            return Err(Error::Eof);
        }
        let stride = self.schema.stride();
        let mut record = std::mem::take(&mut self.scratch);
        record.resize(stride, 0.0);
        let result = self.handle_mut().and_then(|handle| {
            handle.read_record(&mut record).map_err(Error::Codec)
        });
        let result = match result {
            Ok(true) => record::decode(&record, &self.schema),
            Ok(false) => Err(self.truncated()),
            Err(e) => Err(e),
        };
        self.scratch = record;
        let point = result?;
        self.cursor += 1;
        Ok(point)
    }

    /// Read up to `count` points into `out`.
    ///
    /// `out` must have room for `count` points. Returns the number of points
    /// actually read: less than `count` for the final partial batch and `0`
    /// once the cloud is exhausted. Only that many points are written into
    /// `out`; the rest of the buffer is left as it was.
    pub fn read_points<'a>(&mut self, count: usize, out: impl Into<Sink<'a>>) -> Result<usize> {
        self.require(State::OpenForRead, "read points")?;
        let mut sink = out.into();
        sink.validate(count, &self.schema)?;

        let wanted = count.min(usize::try_from(self.remaining()).unwrap_or(usize::MAX));
        if wanted == 0 {
            return Ok(0);
        }

        let stride = self.schema.stride();
        let mut records = std::mem::take(&mut self.scratch);
        records.resize(wanted * stride, 0.0);
        let result = self.handle_mut().and_then(|handle| {
            handle
                .read_records(wanted, &mut records)
                .map_err(Error::Codec)
        });
        let result = match result {
            Ok(n) if n > wanted => Err(Error::Codec(anyhow::anyhow!(
                "backend returned {n} records for a request of {wanted}"
            ))),
            Ok(0) => Err(self.truncated()),
            Ok(n) => {
                sink.scatter(&records[..n * stride], &self.schema);
                Ok(n)
            }
            Err(e) => Err(e),
        };
        self.scratch = records;
        let n = result?;
        self.cursor += n as u64;
        tracing::trace!(requested = count, read = n, cursor = self.cursor, "read point batch");
        Ok(n)
    }

    /// Lazy sequence of batches of up to `batch_size` points.
    pub fn batches(&mut self, batch_size: usize) -> Result<Batches<'_>> {
        self.require(State::OpenForRead, "iterate batches")?;
        if batch_size == 0 {
            return Err(Error::InvalidArgument("batch size must be at least 1".into()));
        }
        Ok(Batches::new(self, batch_size))
    }

    /// Lazy sequence of the remaining points, one at a time.
    pub fn points(&mut self) -> Result<Points<'_>> {
        self.require(State::OpenForRead, "iterate points")?;
        Ok(Points::new(self))
    }

    fn truncated(&self) -> Error {
        Error::Codec(anyhow::anyhow!(
            "backend ran out of records after {} of {} points",
            self.cursor,
            self.metadata.npoints
        ))
    }

    // ── lifecycle ──────────────────────────────────────────────────────────

    /// Flush and release the backend handle.
    ///
    /// Safe to call any number of times. Backend failures while flushing are
    /// logged, not returned.
    pub fn close(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        match handle.close() {
            Ok(()) => tracing::debug!(
                path = %self.path.display(),
                npoints = self.metadata.npoints,
                "closed point cloud"
            ),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                backend = %self.backend,
                "closing point cloud failed: {e:#}"
            ),
        }
    }

    fn require(&self, wanted: State, operation: &'static str) -> Result<()> {
        let state = self.state();
        if state == wanted {
            Ok(())
        } else {
            Err(Error::InvalidState { operation, state })
        }
    }

    fn handle_mut(&mut self) -> Result<&mut Box<dyn RecordHandle>> {
        let state = self.state();
        self.handle.as_mut().ok_or(Error::InvalidState {
            operation: "access backend",
            state,
        })
    }
}

impl Drop for PointCloud {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for PointCloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointCloud")
            .field("path", &self.path)
            .field("backend", &self.backend)
            .field("state", &self.state())
            .field("schema", &self.schema)
            .field("npoints", &self.metadata.npoints)
            .field("cursor", &self.cursor)
            .finish()
    }
}
