//! Caller buffer shapes for batch transfers.
//!
//! Every batch moves through one canonical flat layout (`count * stride`
//! floats, see [`crate::record`]). The three shapes a caller may hand in are
//! thin adapters around it:
//!
//! - [`Source::Flat`] / [`Sink::Flat`]: the canonical layout itself.
//! - [`Source::Rows`] / [`Sink::Rows`]: one `stride`-wide row per point.
//! - [`Source::Split`] / [`Sink::Split`]: separate position, normal, radius
//!   and auxiliary-data buffers.

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::schema::{Schema, FIXED_FIELDS};

/// Separate per-field input buffers.
#[derive(Debug, Clone, Copy)]
pub struct Split<'a> {
    /// 3 floats per point.
    pub positions: &'a [f32],
    /// 3 floats per point.
    pub normals: &'a [f32],
    /// 1 float per point.
    pub radii: &'a [f32],
    /// `datasize` floats per point.
    pub data: &'a [f32],
}

/// Separate per-field output buffers.
#[derive(Debug)]
pub struct SplitMut<'a> {
    pub positions: &'a mut [f32],
    pub normals: &'a mut [f32],
    pub radii: &'a mut [f32],
    pub data: &'a mut [f32],
}

/// Owned per-field buffers, e.g. a batch taken apart with
/// [`Batch::to_split`](crate::Batch::to_split).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitBuffers {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub radii: Vec<f32>,
    pub data: Vec<f32>,
}

impl SplitBuffers {
    /// Take flat records of `stride` floats apart into per-field buffers.
    pub(crate) fn from_records(records: &[f32], stride: usize) -> Self {
        let count = records.len() / stride;
        let mut out = Self {
            positions: Vec::with_capacity(count * 3),
            normals: Vec::with_capacity(count * 3),
            radii: Vec::with_capacity(count),
            data: Vec::with_capacity(count * (stride - FIXED_FIELDS)),
        };
        for record in records.chunks_exact(stride) {
            out.positions.extend_from_slice(&record[0..3]);
            out.normals.extend_from_slice(&record[3..6]);
            out.radii.push(record[6]);
            out.data.extend_from_slice(&record[FIXED_FIELDS..]);
        }
        out
    }

    /// Borrow as a write source.
    pub fn as_split(&self) -> Split<'_> {
        Split {
            positions: &self.positions,
            normals: &self.normals,
            radii: &self.radii,
            data: &self.data,
        }
    }
}

/// Points handed to a batch write.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Flat(&'a [f32]),
    Rows(&'a [Vec<f32>]),
    Split(Split<'a>),
}

/// Destination of a batch read.
#[derive(Debug)]
pub enum Sink<'a> {
    Flat(&'a mut [f32]),
    Rows(&'a mut [Vec<f32>]),
    Split(SplitMut<'a>),
}

fn exact(buffer: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::buffer_size(buffer, expected, actual))
    }
}

fn at_least(buffer: &'static str, expected: usize, actual: usize) -> Result<()> {
    if actual >= expected {
        Ok(())
    } else {
        Err(Error::buffer_size(buffer, expected, actual))
    }
}

impl<'a> Source<'a> {
    /// Check that the buffer holds exactly `count` points.
    pub fn validate(&self, count: usize, schema: &Schema) -> Result<()> {
        let stride = schema.stride();
        match self {
            Source::Flat(flat) => exact("flat", count * stride, flat.len()),
            Source::Rows(rows) => {
                exact("row", count, rows.len())?;
                rows.iter().try_for_each(|row| exact("row", stride, row.len()))
            }
            Source::Split(split) => {
                exact("positions", count * 3, split.positions.len())?;
                exact("normals", count * 3, split.normals.len())?;
                exact("radii", count, split.radii.len())?;
                exact("data", count * schema.datasize(), split.data.len())
            }
        }
    }

    /// Validate and convert to the canonical flat layout.
    ///
    /// Flat input is borrowed as-is; the other shapes are gathered into a new
    /// buffer.
    pub fn to_flat(&self, count: usize, schema: &Schema) -> Result<Cow<'a, [f32]>> {
        self.validate(count, schema)?;
        let stride = schema.stride();
        match *self {
            Source::Flat(flat) => Ok(Cow::Borrowed(flat)),
            Source::Rows(rows) => {
                let mut out = Vec::with_capacity(count * stride);
                rows.iter().for_each(|row| out.extend_from_slice(row));
                Ok(Cow::Owned(out))
            }
            Source::Split(split) => {
                let datasize = schema.datasize();
                let mut out = Vec::with_capacity(count * stride);
                for i in 0..count {
                    out.extend_from_slice(&split.positions[i * 3..i * 3 + 3]);
                    out.extend_from_slice(&split.normals[i * 3..i * 3 + 3]);
                    out.push(split.radii[i]);
                    out.extend_from_slice(&split.data[i * datasize..(i + 1) * datasize]);
                }
                Ok(Cow::Owned(out))
            }
        }
    }
}

impl Sink<'_> {
    /// Check that the buffer has room for `count` points.
    pub fn validate(&self, count: usize, schema: &Schema) -> Result<()> {
        let stride = schema.stride();
        match self {
            Sink::Flat(flat) => at_least("flat", count * stride, flat.len()),
            Sink::Rows(rows) => {
                at_least("row", count, rows.len())?;
                rows[..count]
                    .iter()
                    .try_for_each(|row| exact("row", stride, row.len()))
            }
            Sink::Split(split) => {
                at_least("positions", count * 3, split.positions.len())?;
                at_least("normals", count * 3, split.normals.len())?;
                at_least("radii", count, split.radii.len())?;
                at_least("data", count * schema.datasize(), split.data.len())
            }
        }
    }

    /// Copy the flat `records` into the front of the buffer.
    ///
    /// Only `records.len() / stride` points are touched; anything after them
    /// keeps its previous contents.
    pub fn scatter(&mut self, records: &[f32], schema: &Schema) {
        let stride = schema.stride();
        match self {
            Sink::Flat(flat) => flat[..records.len()].copy_from_slice(records),
            Sink::Rows(rows) => {
                for (row, record) in rows.iter_mut().zip(records.chunks_exact(stride)) {
                    row.copy_from_slice(record);
                }
            }
            Sink::Split(split) => {
                let datasize = schema.datasize();
                for (i, record) in records.chunks_exact(stride).enumerate() {
                    split.positions[i * 3..i * 3 + 3].copy_from_slice(&record[0..3]);
                    split.normals[i * 3..i * 3 + 3].copy_from_slice(&record[3..6]);
                    split.radii[i] = record[6];
                    split.data[i * datasize..(i + 1) * datasize]
                        .copy_from_slice(&record[FIXED_FIELDS..]);
                }
            }
        }
    }
}

impl<'a> From<&'a [f32]> for Source<'a> {
    fn from(flat: &'a [f32]) -> Self {
        Source::Flat(flat)
    }
}

impl<'a> From<&'a Vec<f32>> for Source<'a> {
    fn from(flat: &'a Vec<f32>) -> Self {
        Source::Flat(flat)
    }
}

impl<'a, const N: usize> From<&'a [f32; N]> for Source<'a> {
    fn from(flat: &'a [f32; N]) -> Self {
        Source::Flat(flat)
    }
}

impl<'a> From<&'a [Vec<f32>]> for Source<'a> {
    fn from(rows: &'a [Vec<f32>]) -> Self {
        Source::Rows(rows)
    }
}

impl<'a> From<&'a Vec<Vec<f32>>> for Source<'a> {
    fn from(rows: &'a Vec<Vec<f32>>) -> Self {
        Source::Rows(rows)
    }
}

impl<'a> From<Split<'a>> for Source<'a> {
    fn from(split: Split<'a>) -> Self {
        Source::Split(split)
    }
}

impl<'a> From<&'a mut [f32]> for Sink<'a> {
    fn from(flat: &'a mut [f32]) -> Self {
        Sink::Flat(flat)
    }
}

impl<'a> From<&'a mut Vec<f32>> for Sink<'a> {
    fn from(flat: &'a mut Vec<f32>) -> Self {
        Sink::Flat(flat)
    }
}

impl<'a, const N: usize> From<&'a mut [f32; N]> for Sink<'a> {
    fn from(flat: &'a mut [f32; N]) -> Self {
        Sink::Flat(flat)
    }
}

impl<'a> From<&'a mut [Vec<f32>]> for Sink<'a> {
    fn from(rows: &'a mut [Vec<f32>]) -> Self {
        Sink::Rows(rows)
    }
}

impl<'a> From<&'a mut Vec<Vec<f32>>> for Sink<'a> {
    fn from(rows: &'a mut Vec<Vec<f32>>) -> Self {
        Sink::Rows(rows)
    }
}

impl<'a> From<SplitMut<'a>> for Sink<'a> {
    fn from(split: SplitMut<'a>) -> Self {
        Sink::Split(split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn spam_schema() -> Schema {
        Schema::parse([("float", "fspam"), ("vector", "vspam")]).unwrap()
    }

    const FLAT: [f32; 22] = [
        0.4, 0.8, 1.0, 1.0, 0.0, 0.0, 0.4, 12.0, 1.0, 2.0, 3.0, //
        0.9, 0.7, 0.6, 0.0, 0.0, 1.0, 0.5, 42.0, -1.0, -2.0, -3.0,
    ];

    #[test]
    fn test_split_gathers_into_canonical_order() {
        let split = Split {
            positions: &[0.4, 0.8, 1.0, 0.9, 0.7, 0.6],
            normals: &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            radii: &[0.4, 0.5],
            data: &[12.0, 1.0, 2.0, 3.0, 42.0, -1.0, -2.0, -3.0],
        };
        let flat = Source::from(split).to_flat(2, &spam_schema()).unwrap();
        assert_eq!(&*flat, &FLAT[..]);
    }

    #[test]
    fn test_rows_gather_and_flat_is_borrowed() {
        let rows: Vec<Vec<f32>> = FLAT.chunks(11).map(<[f32]>::to_vec).collect();
        let flat = Source::from(&rows).to_flat(2, &spam_schema()).unwrap();
        assert_eq!(&*flat, &FLAT[..]);

        let borrowed = Source::from(&FLAT).to_flat(2, &spam_schema()).unwrap();
        assert!(matches!(borrowed, Cow::Borrowed(_)));
    }

    #[test]
    fn test_write_sizes_must_match_exactly() {
        let schema = spam_schema();
        let err = Source::from(&FLAT).validate(1, &schema).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferSize);

        let rows = vec![vec![0.0; 11], vec![0.0; 10]];
        assert!(Source::from(&rows).validate(2, &schema).is_err());

        let split = Split {
            positions: &[0.0; 6],
            normals: &[0.0; 6],
            radii: &[0.0; 2],
            data: &[0.0; 7],
        };
        let err = Source::from(split).validate(2, &schema).unwrap_err();
        assert!(matches!(err, Error::BufferSize { buffer: "data", expected: 8, actual: 7 }));
    }

    #[test]
    fn test_scatter_into_split() {
        let schema = spam_schema();
        let (mut ps, mut ns, mut rs, mut ds) = ([0.0; 6], [0.0; 6], [0.0; 2], [0.0; 8]);
        let mut sink = Sink::from(SplitMut {
            positions: &mut ps,
            normals: &mut ns,
            radii: &mut rs,
            data: &mut ds,
        });
        sink.validate(2, &schema).unwrap();
        sink.scatter(&FLAT, &schema);
        assert_eq!(ps, [0.4, 0.8, 1.0, 0.9, 0.7, 0.6]);
        assert_eq!(ns, [1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(rs, [0.4, 0.5]);
        assert_eq!(ds, [12.0, 1.0, 2.0, 3.0, 42.0, -1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_scatter_leaves_trailing_rows_untouched() {
        let schema = spam_schema();
        let mut rows = vec![vec![-7.0; 11]; 3];
        let mut sink = Sink::from(&mut rows);
        sink.validate(3, &schema).unwrap();
        sink.scatter(&FLAT[..11], &schema);
        assert_eq!(rows[0], FLAT[..11].to_vec());
        assert_eq!(rows[1], vec![-7.0; 11]);
        assert_eq!(rows[2], vec![-7.0; 11]);
    }

    #[test]
    fn test_read_buffers_may_be_larger() {
        let schema = spam_schema();
        let mut big = vec![0.0; 40];
        assert!(Sink::from(&mut big).validate(3, &schema).is_ok());
        let mut small = vec![0.0; 21];
        assert!(Sink::from(&mut small).validate(2, &schema).is_err());
    }
}
