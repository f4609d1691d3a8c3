use std::iter::FusedIterator;

use crate::error::{Error, Result};
use crate::record::{self, Point};
use crate::schema::Schema;
use crate::session::PointCloud;
use crate::transfer::SplitBuffers;

/// Points read in one batch, stored in the canonical flat layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    records: Vec<f32>,
    stride: usize,
}

impl Batch {
    /// Number of points in the batch.
    pub fn len(&self) -> usize {
        self.records.len() / self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Floats per point.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Combined flat buffer, `len() * stride()` floats.
    pub fn as_flat(&self) -> &[f32] {
        &self.records
    }

    pub fn into_flat(self) -> Vec<f32> {
        self.records
    }

    /// One `stride()`-wide slice per point.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        self.records.chunks_exact(self.stride)
    }

    pub fn into_rows(self) -> Vec<Vec<f32>> {
        self.rows().map(<[f32]>::to_vec).collect()
    }

    /// Separate position, normal, radius and auxiliary-data buffers.
    pub fn to_split(&self) -> SplitBuffers {
        SplitBuffers::from_records(&self.records, self.stride)
    }

    /// Decode point `index` of the batch.
    pub fn point(&self, index: usize, schema: &Schema) -> Result<Point> {
        let start = index * self.stride;
        let record = self.records.get(start..start + self.stride).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "point {index} out of range for a batch of {}",
                self.len()
            ))
        })?;
        record::decode(record, schema)
    }
}

/// Iterator over fixed-size batches of a read session.
///
/// Created by [`PointCloud::batches`]. Every batch holds `batch_size` points
/// except possibly the last one. The sequence ends at the first empty read and
/// cannot be restarted; reading again requires reopening the file. After an
/// error is yielded the iterator is finished.
pub struct Batches<'a> {
    cloud: &'a mut PointCloud,
    batch_size: usize,
    done: bool,
}

impl<'a> Batches<'a> {
    pub(crate) fn new(cloud: &'a mut PointCloud, batch_size: usize) -> Self {
        Self {
            cloud,
            batch_size,
            done: false,
        }
    }
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let stride = self.cloud.schema().stride();
        let wanted = self
            .batch_size
            .min(usize::try_from(self.cloud.remaining()).unwrap_or(usize::MAX));
        let mut records = vec![0.0; wanted * stride];

        match self.cloud.read_points(wanted, &mut records) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => {
                if n < self.batch_size {
                    self.done = true;
                }
                records.truncate(n * stride);
                Some(Ok(Batch { records, stride }))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = usize::try_from(self.cloud.remaining()).unwrap_or(usize::MAX);
        let batches = remaining.div_ceil(self.batch_size);
        (0, Some(batches))
    }
}

impl FusedIterator for Batches<'_> {}

/// Iterator over the remaining points of a read session, one at a time.
///
/// Created by [`PointCloud::points`]; ends at end of file.
pub struct Points<'a> {
    cloud: &'a mut PointCloud,
    done: bool,
}

impl<'a> Points<'a> {
    pub(crate) fn new(cloud: &'a mut PointCloud) -> Self {
        Self { cloud, done: false }
    }
}

impl Iterator for Points<'_> {
    type Item = Result<Point>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cloud.read_point() {
            Ok(point) => Some(Ok(point)),
            Err(Error::Eof) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Points<'_> {}
