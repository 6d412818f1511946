//! Strided views over labeled voxel volumes

use crate::{Error, GridScalar, Point3f, Result, Vector3f};

/// Read-only strided view over a caller-owned 3D scalar volume.
///
/// The volume is a flat slice of samples addressed by per-axis element
/// strides, with an optional interleaved component count for multi-component
/// images. Geometry is described by a signed extent minimum per axis plus an
/// origin and per-axis spacing; the sample at grid index `(i, j, k)` sits at
/// world position `origin + spacing * (extent_min + (i, j, k))`.
///
/// Bounds are validated once at construction: the maximal reachable offset
/// must lie inside the data slice, so the per-sample accessors can index
/// without further checks.
#[derive(Debug, Clone, Copy)]
pub struct VolumeView<'a, T> {
    data: &'a [T],
    dims: [usize; 3],
    strides: [usize; 3],
    components: usize,
    extent_min: [i64; 3],
    origin: Point3f,
    spacing: Vector3f,
}

impl<'a, T: GridScalar> VolumeView<'a, T> {
    /// Create a view over a dense, single-component, x-fastest volume.
    pub fn new(data: &'a [T], dims: [usize; 3]) -> Result<Self> {
        Self::with_layout(data, dims, [1, dims[0], dims[0] * dims[1]], 1)
    }

    /// Create a dense view from inclusive per-axis extent bounds
    /// `[x0, x1, y0, y1, z0, z1]`.
    pub fn from_extent(data: &'a [T], extent: [i64; 6]) -> Result<Self> {
        let mut dims = [0usize; 3];
        for axis in 0..3 {
            let (lo, hi) = (extent[2 * axis], extent[2 * axis + 1]);
            if hi < lo {
                return Err(Error::InvalidData(format!(
                    "Extent [{}, {}] is empty on axis {}",
                    lo, hi, axis
                )));
            }
            dims[axis] = (hi - lo + 1) as usize;
        }
        let mut view = Self::with_layout(data, dims, [1, dims[0], dims[0] * dims[1]], 1)?;
        view.extent_min = [extent[0], extent[2], extent[4]];
        Ok(view)
    }

    /// Create a view with explicit element strides and an interleaved
    /// component count.
    pub fn with_layout(
        data: &'a [T],
        dims: [usize; 3],
        strides: [usize; 3],
        components: usize,
    ) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::MissingInput("Volume has no sample data".to_string()));
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(Error::InvalidData(format!(
                "Volume dimensions {:?} contain an empty axis",
                dims
            )));
        }
        if components == 0 {
            return Err(Error::InvalidData(
                "Volume sample arrays need at least one component".to_string(),
            ));
        }
        let max_offset = (dims[0] - 1) * strides[0]
            + (dims[1] - 1) * strides[1]
            + (dims[2] - 1) * strides[2]
            + (components - 1);
        if max_offset >= data.len() {
            return Err(Error::InvalidData(format!(
                "Volume layout addresses offset {} but only {} samples are present",
                max_offset,
                data.len()
            )));
        }
        Ok(Self {
            data,
            dims,
            strides,
            components,
            extent_min: [0; 3],
            origin: Point3f::origin(),
            spacing: Vector3f::new(1.0, 1.0, 1.0),
        })
    }

    /// Set the world origin of the sample at the extent minimum.
    pub fn with_origin(mut self, origin: Point3f) -> Self {
        self.origin = origin;
        self
    }

    /// Set the physical spacing between adjacent samples on each axis.
    pub fn with_spacing(mut self, spacing: Vector3f) -> Self {
        self.spacing = spacing;
        self
    }

    /// Grid dimensions in samples per axis
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Number of interleaved components per sample
    pub fn components(&self) -> usize {
        self.components
    }

    /// Total number of grid points
    pub fn point_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn origin(&self) -> Point3f {
        self.origin
    }

    pub fn spacing(&self) -> Vector3f {
        self.spacing
    }

    #[inline]
    fn offset(&self, i: usize, j: usize, k: usize) -> usize {
        i * self.strides[0] + j * self.strides[1] + k * self.strides[2]
    }

    /// Sample value at a grid index (component 0)
    #[inline]
    pub fn value(&self, i: usize, j: usize, k: usize) -> T {
        self.data[self.offset(i, j, k)]
    }

    /// Sample value of one component at a grid index
    #[inline]
    pub fn value_component(&self, i: usize, j: usize, k: usize, component: usize) -> T {
        self.data[self.offset(i, j, k) + component]
    }

    /// Dense index of a grid point, used to address point-attached attribute
    /// arrays laid out x-fastest.
    #[inline]
    pub fn point_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    /// Map fractional grid coordinates to world coordinates.
    #[inline]
    pub fn world_point(&self, x: f32, y: f32, z: f32) -> Point3f {
        Point3f::new(
            self.origin.x + (self.extent_min[0] as f32 + x) * self.spacing.x,
            self.origin.y + (self.extent_min[1] as f32 + y) * self.spacing.y,
            self.origin.z + (self.extent_min[2] as f32 + z) * self.spacing.z,
        )
    }

    /// Collect the distinct sample values of component 0.
    ///
    /// Linear scan with a membership check per sample; intended for
    /// segmentation masks carrying a handful of labels.
    pub fn unique_labels(&self) -> Vec<T> {
        let mut labels: Vec<T> = Vec::new();
        for k in 0..self.dims[2] {
            for j in 0..self.dims[1] {
                for i in 0..self.dims[0] {
                    let v = self.value(i, j, k);
                    if !labels.contains(&v) {
                        labels.push(v);
                    }
                }
            }
        }
        labels
    }
}

/// A named scalar array attached to the grid points of a volume, candidate
/// for interpolation onto the extracted surface.
#[derive(Debug, Clone, Copy)]
pub struct PointAttribute<'a> {
    pub name: &'a str,
    pub values: &'a [f32],
}
