use std::path::Path;
use std::sync::Arc;

use ptc_core::{Backend, Metadata, ReadOpened, RecordHandle, Schema};

use crate::codec::BlockCodec;
use crate::format::DEFAULT_BLOCK_RECORDS;
use crate::reader::ContainerReader;
use crate::writer::ContainerWriter;

/// Tuning for the PTC1 file backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOptions {
    /// Records per compressed block. Larger blocks compress better; smaller
    /// blocks keep less decoded data in memory while reading.
    pub block_records: u32,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            block_records: DEFAULT_BLOCK_RECORDS,
        }
    }
}

/// Backend storing point clouds as PTC1 files compressed with one [`BlockCodec`].
pub struct BlockBackend {
    name: String,
    codec: Arc<dyn BlockCodec>,
    options: BlockOptions,
}

impl BlockBackend {
    /// Backend registered under the codec's own name.
    pub fn new(codec: Arc<dyn BlockCodec>) -> Self {
        Self {
            name: codec.name().to_string(),
            codec,
            options: BlockOptions::default(),
        }
    }

    /// Register under `name` instead of the codec name, e.g. to expose the
    /// same codec at two block sizes.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_options(mut self, options: BlockOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> BlockOptions {
        self.options
    }
}

impl Backend for BlockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_for_write(
        &self,
        path: &Path,
        schema: &Schema,
        metadata: &Metadata,
    ) -> anyhow::Result<Box<dyn RecordHandle>> {
        let writer = ContainerWriter::create(
            path,
            self.codec.clone(),
            self.options.block_records,
            schema,
            metadata,
        )?;
        Ok(Box::new(writer))
    }

    fn open_for_read(&self, path: &Path) -> anyhow::Result<ReadOpened> {
        let reader = ContainerReader::open(path, self.codec.clone())?;
        Ok(ReadOpened {
            schema: reader.schema().clone(),
            metadata: reader.metadata().clone(),
            handle: Box::new(reader),
        })
    }
}
