//! Point-cloud container I/O.
//!
//! A point cloud is an ordered sequence of points, each with a position, a
//! normal, a radius and a fixed set of named auxiliary values declared by a
//! [`Schema`], plus file metadata ([`Metadata`]). Persistence is delegated to
//! a [`Backend`] looked up by name in an explicit [`BackendRegistry`].
//!
//! ```ignore
//! let registry = ptc_backends::default_registry();
//! let schema = Schema::parse([("float", "area"), ("color", "Cs")])?;
//!
//! let mut ptc = PointCloud::create(&registry, "bake.ptc", "zstd", schema, Metadata::default())?;
//! ptc.write_point(&Point::new([0.0; 3], [0.0, 1.0, 0.0], 0.5)
//!     .with("area", 1.0)
//!     .with("Cs", [1.0, 0.5, 0.25]))?;
//! ptc.close();
//!
//! let mut ptc = PointCloud::open(&registry, "bake.ptc", "zstd")?;
//! for batch in ptc.batches(1024)? {
//!     let batch = batch?;
//!     // ...
//! }
//! ```

pub mod backend;
pub mod error;
pub mod iter;
pub mod metadata;
pub mod record;
pub mod schema;
pub mod session;
pub mod transfer;

pub use backend::{Backend, BackendRegistry, ReadOpened, RecordHandle};
pub use error::{Error, ErrorKind, Result};
pub use iter::{Batch, Batches, Points};
pub use metadata::{BBox, Format, Metadata};
pub use record::{Point, Value};
pub use schema::{Schema, VarType, Variable};
pub use session::{Mode, OpenOptions, PointCloud, State};
pub use transfer::{Sink, Source, Split, SplitBuffers, SplitMut};
