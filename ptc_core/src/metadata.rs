//! File-level metadata carried alongside the points.

/// Row-major 4x4 identity.
pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Output image resolution and pixel aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Format {
    pub width: f32,
    pub height: f32,
    pub aspect: f32,
}

impl Format {
    pub fn new(width: f32, height: f32, aspect: f32) -> Self {
        Self {
            width,
            height,
            aspect,
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.width, self.height, self.aspect]
    }
}

impl Default for Format {
    fn default() -> Self {
        Self::new(640.0, 480.0, 1.0)
    }
}

impl From<(f32, f32, f32)> for Format {
    fn from((width, height, aspect): (f32, f32, f32)) -> Self {
        Self::new(width, height, aspect)
    }
}

/// Axis-aligned bounding box of point positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BBox {
    /// Box containing exactly one position.
    pub fn from_point(p: [f32; 3]) -> Self {
        Self { min: p, max: p }
    }

    /// Grow to contain `p`.
    pub fn include(&mut self, p: [f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(p[axis]);
            self.max[axis] = self.max[axis].max(p[axis]);
        }
    }

    /// `[min_x, min_y, min_z, max_x, max_y, max_z]`.
    pub fn to_array(self) -> [f32; 6] {
        let [x0, y0, z0] = self.min;
        let [x1, y1, z1] = self.max;
        [x0, y0, z0, x1, y1, z1]
    }

    pub fn from_array(a: [f32; 6]) -> Self {
        Self {
            min: [a[0], a[1], a[2]],
            max: [a[3], a[4], a[5]],
        }
    }
}

/// Fold the positions of `records` (flat, `stride` floats each) into `bbox`.
///
/// An unset box is initialized from the first position.
pub fn accumulate_bounds(bbox: &mut Option<BBox>, records: &[f32], stride: usize) {
    for record in records.chunks_exact(stride) {
        let p = [record[0], record[1], record[2]];
        match bbox {
            Some(b) => b.include(p),
            None => *bbox = Some(BBox::from_point(p)),
        }
    }
}

/// Metadata of a point-cloud file.
///
/// `world2eye`, `world2ndc` and `format` are supplied by the writer. `npoints`
/// and `bbox` are derived from the written points and only meaningful once the
/// file has been read back or while a write session is tracking them.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub world2eye: [f32; 16],
    pub world2ndc: [f32; 16],
    pub format: Format,
    pub npoints: u64,
    pub bbox: Option<BBox>,
}

impl Metadata {
    pub fn new(world2eye: [f32; 16], world2ndc: [f32; 16], format: impl Into<Format>) -> Self {
        Self {
            world2eye,
            world2ndc,
            format: format.into(),
            npoints: 0,
            bbox: None,
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new(IDENTITY, IDENTITY, Format::default())
    }
}
