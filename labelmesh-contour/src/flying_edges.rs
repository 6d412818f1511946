//! Discrete flying-edges surface extraction
//!
//! Extracts the triangulated boundary of one or more label values from a
//! voxel volume in four passes: classify every x-edge against the label,
//! count each voxel row's output from the four bounding edge rows, scan the
//! counts into disjoint output offsets, then generate points and triangles
//! in parallel directly into preallocated buffers. Samples are compared by
//! exact equality and crossing points always sit at edge midpoints; label
//! data is categorical, so there is no value interpolation.

use crate::case_table::CaseTable;
use crate::parallel;
use labelmesh_core::{
    Error, GridScalar, Point3f, PointAttribute, Result, ScalarAttribute, SurfaceMesh, Vector3f,
    VolumeView,
};
use rayon::prelude::*;
use std::marker::PhantomData;

// X-edge classification: bit 0 set when the left sample matches the label,
// bit 1 when the right sample does.
const BOTH_OUTSIDE: u8 = 0;
const RIGHT_OUTSIDE: u8 = 1;
const LEFT_OUTSIDE: u8 = 2;
const BOTH_INSIDE: u8 = 3;

#[inline]
fn crossing(class: u8) -> bool {
    class == RIGHT_OUTSIDE || class == LEFT_OUTSIDE
}

/// Compose a voxel's 8-bit case from the classifications of its four
/// bounding x-edges (own row, +y, +z, +y+z). With corners numbered
/// x + 2y + 4z, bit c of the result is "corner c on-label".
#[inline]
fn compose_case(rows: &[&[u8]; 4], i: usize) -> u8 {
    rows[0][i] | (rows[1][i] << 2) | (rows[2][i] << 4) | (rows[3][i] << 6)
}

/// Configuration for discrete flying-edges extraction
#[derive(Debug, Clone)]
pub struct DiscreteFlyingEdgesConfig {
    /// Whether to compute per-vertex unit normals (negated gradients)
    pub compute_normals: bool,
    /// Whether to attach the raw per-vertex gradients
    pub compute_gradients: bool,
    /// Whether to attach the originating label value per vertex
    pub compute_scalars: bool,
    /// Whether to interpolate supplied point-data arrays onto the surface
    pub interpolate_attributes: bool,
    /// Which interleaved component of the volume to classify
    pub component: usize,
}

impl Default for DiscreteFlyingEdgesConfig {
    fn default() -> Self {
        Self {
            compute_normals: true,
            compute_gradients: false,
            compute_scalars: true,
            interpolate_attributes: false,
            component: 0,
        }
    }
}

impl DiscreteFlyingEdgesConfig {
    pub fn with_normals(mut self, compute_normals: bool) -> Self {
        self.compute_normals = compute_normals;
        self
    }

    pub fn with_gradients(mut self, compute_gradients: bool) -> Self {
        self.compute_gradients = compute_gradients;
        self
    }

    pub fn with_scalars(mut self, compute_scalars: bool) -> Self {
        self.compute_scalars = compute_scalars;
        self
    }

    pub fn with_interpolate_attributes(mut self, interpolate: bool) -> Self {
        self.interpolate_attributes = interpolate;
        self
    }

    pub fn with_component(mut self, component: usize) -> Self {
        self.component = component;
        self
    }
}

/// Per x-row bookkeeping, six integers per (row, slice) pair.
///
/// After pass 1, `x_pts` holds the row's x-crossing count and
/// `x_min`/`x_max` its crossing span (sentinel: `x_min` = edge count,
/// `x_max` = 0 when the row has none). The offset scan rewrites
/// `x_pts`/`y_pts`/`z_pts`/`tris` in place into the absolute starting
/// offsets of the row's x-point, y-point, z-point, and triangle ranges.
#[derive(Debug, Clone, Copy, Default)]
struct EdgeMeta {
    x_pts: usize,
    y_pts: usize,
    z_pts: usize,
    tris: usize,
    x_min: usize,
    x_max: usize,
}

/// Output of pass 2 for one voxel row: crossings of the row's own y/z voxel
/// axes and its triangle count, plus the crossings of volume-face edges the
/// trailing +y/+z boundary rows own.
#[derive(Debug, Clone, Copy, Default)]
struct RowCounts {
    y_pts: usize,
    z_pts: usize,
    tris: usize,
    /// y-edge crossings on the +z volume face, owned by the +z neighbor row
    face_y_pts: usize,
    /// z-edge crossings on the +y volume face, owned by the +y neighbor row
    face_z_pts: usize,
}

/// Running output totals, carried across labels so that every label of one
/// invocation writes into disjoint ranges of the same buffers.
#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    points: usize,
    triangles: usize,
}

/// Raw view over a preallocated output buffer shared across worker threads.
///
/// The offset scan assigns every row disjoint point and triangle ranges and
/// every id within them is produced by exactly one voxel of exactly one row,
/// so parallel writes through this view never alias. No locks or atomics.
struct DisjointSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

unsafe impl<T: Send> Send for DisjointSlice<'_, T> {}
unsafe impl<T: Send> Sync for DisjointSlice<'_, T> {}

impl<'a, T> DisjointSlice<'a, T> {
    fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    /// # Safety
    ///
    /// `index` must be in bounds and owned by the calling row.
    unsafe fn write(&self, index: usize, value: T) {
        debug_assert!(index < self.len);
        unsafe { self.ptr.add(index).write(value) }
    }
}

/// The output buffers of one label's generation pass.
struct SharedOut<'a> {
    points: DisjointSlice<'a, Point3f>,
    faces: DisjointSlice<'a, [usize; 3]>,
    normals: Option<DisjointSlice<'a, Vector3f>>,
    gradients: Option<DisjointSlice<'a, Vector3f>>,
    attributes: Vec<(DisjointSlice<'a, f32>, &'a [f32])>,
}

impl SharedOut<'_> {
    fn needs_gradients(&self) -> bool {
        self.normals.is_some() || self.gradients.is_some()
    }

    fn set_point(&self, id: usize, p: Point3f) {
        // Safety: point ids are disjoint per row (offset scan).
        unsafe { self.points.write(id, p) }
    }

    fn set_face(&self, id: usize, face: [usize; 3]) {
        // Safety: triangle ids are disjoint per row (offset scan).
        unsafe { self.faces.write(id, face) }
    }

    fn set_gradient_data(&self, id: usize, g: Vector3f) {
        // Safety: same ownership as the point id.
        if let Some(gradients) = &self.gradients {
            unsafe { gradients.write(id, g) }
        }
        if let Some(normals) = &self.normals {
            let n = if g.magnitude() > 1e-6 {
                -g.normalize()
            } else {
                Vector3f::new(0.0, 0.0, 1.0)
            };
            unsafe { normals.write(id, n) }
        }
    }

    fn set_attributes(&self, id: usize, pa: usize, pb: usize) {
        // Safety: same ownership as the point id.
        for (dst, src) in &self.attributes {
            unsafe { dst.write(id, 0.5 * (src[pa] + src[pb])) }
        }
    }
}

/// One label's extraction over one volume.
struct LabelPass<'g, T: GridScalar> {
    grid: VolumeView<'g, T>,
    label: T,
    component: usize,
    dims: [usize; 3],
    nx_edges: usize,
}

impl<'g, T: GridScalar> LabelPass<'g, T> {
    #[inline]
    fn on_label(&self, i: usize, j: usize, k: usize) -> bool {
        self.grid.value_component(i, j, k, self.component) == self.label
    }

    /// Pass 1: classify every x-edge of every row, recording per row the
    /// crossing count and the trimmed crossing span.
    fn classify_x_edges(&self, cases: &mut [u8], meta: &mut [EdgeMeta]) {
        let ny = self.dims[1];
        let slab = self.nx_edges * ny;
        parallel::execute_parallel(|| {
            cases
                .par_chunks_mut(slab)
                .zip(meta.par_chunks_mut(ny))
                .enumerate()
                .for_each(|(k, (case_slab, meta_slab))| {
                    for j in 0..ny {
                        let row = &mut case_slab[j * self.nx_edges..(j + 1) * self.nx_edges];
                        self.classify_row(j, k, row, &mut meta_slab[j]);
                    }
                });
        });
    }

    fn classify_row(&self, j: usize, k: usize, row: &mut [u8], meta: &mut EdgeMeta) {
        let mut x_min = self.nx_edges; // sentinel: no crossings
        let mut x_max = 0usize;
        let mut cuts = 0usize;
        let mut left = self.on_label(0, j, k);
        for (i, class_slot) in row.iter_mut().enumerate() {
            let right = self.on_label(i + 1, j, k);
            let class = match (left, right) {
                (false, false) => BOTH_OUTSIDE,
                (true, false) => RIGHT_OUTSIDE,
                (false, true) => LEFT_OUTSIDE,
                (true, true) => BOTH_INSIDE,
            };
            *class_slot = class;
            if crossing(class) {
                cuts += 1;
                if x_min > i {
                    x_min = i;
                }
                x_max = i + 1;
            }
            left = right;
        }
        meta.x_pts = cuts;
        meta.x_min = x_min;
        meta.x_max = x_max;
    }

    fn case_rows<'c>(&self, cases: &'c [u8], j: usize, k: usize) -> [&'c [u8]; 4] {
        let ny = self.dims[1];
        let ne = self.nx_edges;
        let row = |jj: usize, kk: usize| {
            let r = (kk * ny + jj) * ne;
            &cases[r..r + ne]
        };
        [row(j, k), row(j + 1, k), row(j, k + 1), row(j + 1, k + 1)]
    }

    fn meta_rows<'m>(&self, meta: &'m [EdgeMeta], j: usize, k: usize) -> [&'m EdgeMeta; 4] {
        let ny = self.dims[1];
        let r = k * ny + j;
        [&meta[r], &meta[r + 1], &meta[r + ny], &meta[r + ny + 1]]
    }

    /// The voxel-row trim range, derived identically in passes 2 and 4 from
    /// the immutable pass-1 spans: the union of the four bounding rows'
    /// crossing spans, widened to a volume end whenever the rows' on-label
    /// states disagree at the trim boundary (the contour then passes between
    /// rows without crossing any x-edge there). With no x-crossings at all
    /// the full range is used.
    fn trim_bounds(&self, rows: &[&[u8]; 4], meta: &[&EdgeMeta; 4]) -> (usize, usize) {
        let ne = self.nx_edges;
        if meta.iter().all(|m| m.x_min >= m.x_max) {
            return (0, ne);
        }
        let mut xl = meta.iter().map(|m| m.x_min).min().unwrap_or(0);
        let mut xr = meta.iter().map(|m| m.x_max).max().unwrap_or(ne);
        if xl > 0 {
            let state = rows[0][xl] & 1;
            if rows.iter().any(|row| row[xl] & 1 != state) {
                xl = 0;
            }
        }
        if xr < ne {
            let state = rows[0][xr] & 1;
            if rows.iter().any(|row| row[xr] & 1 != state) {
                xr = ne;
            }
        }
        (xl, xr)
    }

    /// Pass 2: a pure parallel map over all rows producing each voxel row's
    /// y/z crossing and triangle counts. Rows on the +y/+z volume faces
    /// bound no voxels and return empty counts; the crossings of the face
    /// edges they own are counted for them by the voxel row one step inward.
    fn accumulate_row_counts(
        &self,
        cases: &[u8],
        meta: &[EdgeMeta],
        table: &CaseTable,
    ) -> Vec<RowCounts> {
        let [_, ny, nz] = self.dims;
        let rows: Vec<(usize, usize)> = (0..nz)
            .flat_map(|k| (0..ny).map(move |j| (j, k)))
            .collect();
        parallel::parallel_map(&rows, |&(j, k)| {
            if j + 1 == ny || k + 1 == nz {
                return RowCounts::default();
            }
            self.count_voxel_row(j, k, cases, meta, table)
        })
    }

    fn count_voxel_row(
        &self,
        j: usize,
        k: usize,
        cases: &[u8],
        meta: &[EdgeMeta],
        table: &CaseTable,
    ) -> RowCounts {
        let rows = self.case_rows(cases, j, k);
        let m = self.meta_rows(meta, j, k);

        // No x-crossings and one uniform state across the four bounding
        // rows: the whole voxel row is inside or outside, nothing to count.
        if m.iter().all(|row_meta| row_meta.x_min >= row_meta.x_max)
            && rows[0][0] == rows[1][0]
            && rows[1][0] == rows[2][0]
            && rows[2][0] == rows[3][0]
        {
            return RowCounts::default();
        }

        let (xl, xr) = self.trim_bounds(&rows, &m);
        let on_y_max = j + 2 == self.dims[1];
        let on_z_max = k + 2 == self.dims[2];
        let mut counts = RowCounts::default();

        for i in xl..xr {
            let case = compose_case(&rows, i);
            let tris = table.triangle_count(case);
            if tris == 0 {
                continue;
            }
            counts.tris += tris;

            // Crossings on the voxel's own axes; boundary voxels also own
            // the edges of the +x/+y/+z volume faces they touch.
            let uses = table.edge_uses(case);
            counts.y_pts += uses[4] as usize;
            counts.z_pts += uses[8] as usize;
            let on_x_max = i + 2 == self.dims[0];
            if on_x_max {
                counts.y_pts += uses[5] as usize;
                counts.z_pts += uses[9] as usize;
            }
            if on_y_max {
                counts.face_z_pts += uses[10] as usize;
                if on_x_max {
                    counts.face_z_pts += uses[11] as usize;
                }
            }
            if on_z_max {
                counts.face_y_pts += uses[6] as usize;
                if on_x_max {
                    counts.face_y_pts += uses[7] as usize;
                }
            }
        }
        counts
    }

    /// Pass 4: regenerate each voxel row's cases exactly as pass 2 and write
    /// triangles and points into the disjoint ranges assigned by the scan.
    fn generate(&self, cases: &[u8], meta: &[EdgeMeta], table: &CaseTable, out: &SharedOut<'_>) {
        let [_, ny, nz] = self.dims;
        parallel::execute_parallel(|| {
            (0..nz - 1).into_par_iter().for_each(|k| {
                for j in 0..ny - 1 {
                    self.generate_voxel_row(j, k, cases, meta, table, out);
                }
            });
        });
    }

    fn generate_voxel_row(
        &self,
        j: usize,
        k: usize,
        cases: &[u8],
        meta: &[EdgeMeta],
        table: &CaseTable,
        out: &SharedOut<'_>,
    ) {
        let ny = self.dims[1];
        let r0 = k * ny + j;
        // A row whose triangle offset equals its successor's is degenerate.
        if meta[r0].tris == meta[r0 + 1].tris {
            return;
        }

        let rows = self.case_rows(cases, j, k);
        let m = self.meta_rows(meta, j, k);
        let (xl, xr) = self.trim_bounds(&rows, &m);
        let on_y_max = j + 2 == self.dims[1];
        let on_z_max = k + 2 == self.dims[2];

        let mut tri_id = meta[r0].tris;

        // Running point ids of the 12 voxel edges, seeded from the four
        // rows' scan offsets at the trim start. Edges 5/7/9/11 are the +x
        // shared edges: their crossing state equals that of edges 4/6/8/10
        // of the +x neighbor, which is what keeps the running ids exact.
        let first = table.edge_uses(compose_case(&rows, xl));
        let mut ids = [0usize; 12];
        ids[0] = m[0].x_pts;
        ids[1] = m[1].x_pts;
        ids[2] = m[2].x_pts;
        ids[3] = m[3].x_pts;
        ids[4] = m[0].y_pts;
        ids[5] = ids[4] + first[4] as usize;
        ids[6] = m[2].y_pts;
        ids[7] = ids[6] + first[6] as usize;
        ids[8] = m[0].z_pts;
        ids[9] = ids[8] + first[8] as usize;
        ids[10] = m[1].z_pts;
        ids[11] = ids[10] + first[10] as usize;

        for i in xl..xr {
            let case = compose_case(&rows, i);
            if table.triangle_count(case) == 0 {
                continue;
            }
            let uses = table.edge_uses(case);

            for tri in table.triangles(case).chunks_exact(3) {
                out.set_face(
                    tri_id,
                    [
                        ids[tri[0] as usize],
                        ids[tri[1] as usize],
                        ids[tri[2] as usize],
                    ],
                );
                tri_id += 1;
            }

            let on_x_max = i + 2 == self.dims[0];
            if table.includes_axes(case) || on_x_max || on_y_max || on_z_max {
                self.emit_voxel_points(i, j, k, uses, &ids, on_x_max, on_y_max, on_z_max, out);
            }

            ids[0] += uses[0] as usize;
            ids[1] += uses[1] as usize;
            ids[2] += uses[2] as usize;
            ids[3] += uses[3] as usize;
            ids[4] += uses[4] as usize;
            ids[5] = ids[4] + uses[5] as usize;
            ids[6] += uses[6] as usize;
            ids[7] = ids[6] + uses[7] as usize;
            ids[8] += uses[8] as usize;
            ids[9] = ids[8] + uses[9] as usize;
            ids[10] += uses[10] as usize;
            ids[11] = ids[10] + uses[11] as usize;
        }
    }

    /// Emit the crossing points of the edges this voxel owns: its three
    /// origin axes, plus the edges of any +x/+y/+z volume face it touches.
    /// Every crossing edge in the volume has exactly one owner.
    #[allow(clippy::too_many_arguments)]
    fn emit_voxel_points(
        &self,
        i: usize,
        j: usize,
        k: usize,
        uses: &[u8; 12],
        ids: &[usize; 12],
        on_x_max: bool,
        on_y_max: bool,
        on_z_max: bool,
        out: &SharedOut<'_>,
    ) {
        let emit = |edge: usize, a: [usize; 3], b: [usize; 3]| {
            if uses[edge] == 1 {
                self.emit_edge_point(ids[edge], a, b, out);
            }
        };
        emit(0, [i, j, k], [i + 1, j, k]);
        emit(4, [i, j, k], [i, j + 1, k]);
        emit(8, [i, j, k], [i, j, k + 1]);
        if on_x_max {
            emit(5, [i + 1, j, k], [i + 1, j + 1, k]);
            emit(9, [i + 1, j, k], [i + 1, j, k + 1]);
        }
        if on_y_max {
            emit(1, [i, j + 1, k], [i + 1, j + 1, k]);
            emit(10, [i, j + 1, k], [i, j + 1, k + 1]);
        }
        if on_z_max {
            emit(2, [i, j, k + 1], [i + 1, j, k + 1]);
            emit(6, [i, j, k + 1], [i, j + 1, k + 1]);
        }
        if on_x_max && on_y_max {
            emit(11, [i + 1, j + 1, k], [i + 1, j + 1, k + 1]);
        }
        if on_x_max && on_z_max {
            emit(7, [i + 1, j, k + 1], [i + 1, j + 1, k + 1]);
        }
        if on_y_max && on_z_max {
            emit(3, [i, j + 1, k + 1], [i + 1, j + 1, k + 1]);
        }
    }

    fn emit_edge_point(&self, id: usize, a: [usize; 3], b: [usize; 3], out: &SharedOut<'_>) {
        // Discrete labels are categorical: the crossing always sits at the
        // geometric midpoint of the edge, never at a value-derived fraction.
        let mid = self.grid.world_point(
            (a[0] + b[0]) as f32 * 0.5,
            (a[1] + b[1]) as f32 * 0.5,
            (a[2] + b[2]) as f32 * 0.5,
        );
        out.set_point(id, mid);

        if out.needs_gradients() {
            let g = (self.gradient_at(a) + self.gradient_at(b)) * 0.5;
            out.set_gradient_data(id, g);
        }
        if !out.attributes.is_empty() {
            let pa = self.grid.point_index(a[0], a[1], a[2]);
            let pb = self.grid.point_index(b[0], b[1], b[2]);
            out.set_attributes(id, pa, pb);
        }
    }

    /// Central-difference gradient of the classified component, one-sided on
    /// the volume faces.
    fn gradient_at(&self, p: [usize; 3]) -> Vector3f {
        let [i, j, k] = p;
        let [nx, ny, nz] = self.dims;
        let spacing = self.grid.spacing();
        let s = |i: usize, j: usize, k: usize| -> f32 {
            self.grid.value_component(i, j, k, self.component).to_f32()
        };
        let gx = if i == 0 {
            (s(i + 1, j, k) - s(i, j, k)) / spacing.x
        } else if i + 1 == nx {
            (s(i, j, k) - s(i - 1, j, k)) / spacing.x
        } else {
            (s(i + 1, j, k) - s(i - 1, j, k)) / (2.0 * spacing.x)
        };
        let gy = if j == 0 {
            (s(i, j + 1, k) - s(i, j, k)) / spacing.y
        } else if j + 1 == ny {
            (s(i, j, k) - s(i, j - 1, k)) / spacing.y
        } else {
            (s(i, j + 1, k) - s(i, j - 1, k)) / (2.0 * spacing.y)
        };
        let gz = if k == 0 {
            (s(i, j, k + 1) - s(i, j, k)) / spacing.z
        } else if k + 1 == nz {
            (s(i, j, k) - s(i, j, k - 1)) / spacing.z
        } else {
            (s(i, j, k + 1) - s(i, j, k - 1)) / (2.0 * spacing.z)
        };
        Vector3f::new(gx, gy, gz)
    }
}

/// Pass 3: the serial exclusive scan. In slice-major row order, fold the
/// boundary-face contributions into their owning rows and rewrite each row's
/// counts in place into absolute output offsets, advancing the running
/// totals. After this, every row's write targets are disjoint and known,
/// which is what lets pass 4 run without synchronization.
fn scan_offsets(
    meta: &mut [EdgeMeta],
    counts: &[RowCounts],
    dims: [usize; 3],
    totals: &mut Totals,
) {
    let [_, ny, nz] = dims;
    for k in 0..nz {
        for j in 0..ny {
            let r = k * ny + j;
            let x_cuts = meta[r].x_pts;
            let mut y_cuts = counts[r].y_pts;
            let mut z_cuts = counts[r].z_pts;
            if k + 1 == nz {
                y_cuts += counts[r - ny].face_y_pts;
            }
            if j + 1 == ny {
                z_cuts += counts[r - 1].face_z_pts;
            }
            meta[r].x_pts = totals.points;
            meta[r].y_pts = totals.points + x_cuts;
            meta[r].z_pts = totals.points + x_cuts + y_cuts;
            meta[r].tris = totals.triangles;
            totals.points += x_cuts + y_cuts + z_cuts;
            totals.triangles += counts[r].tris;
        }
    }
}

/// Discrete flying-edges extraction of label boundaries
pub struct DiscreteFlyingEdges {
    config: DiscreteFlyingEdgesConfig,
}

impl Default for DiscreteFlyingEdges {
    fn default() -> Self {
        Self::new(DiscreteFlyingEdgesConfig::default())
    }
}

impl DiscreteFlyingEdges {
    /// Create a new extraction instance
    pub fn new(config: DiscreteFlyingEdgesConfig) -> Self {
        Self { config }
    }

    /// Extract the boundary surfaces of the given labels.
    ///
    /// All labels share one output buffer set; each label's vertex range is
    /// marked with its value when scalars are enabled. An empty label list
    /// yields an empty mesh.
    pub fn extract<T: GridScalar>(
        &self,
        grid: &VolumeView<'_, T>,
        labels: &[T],
    ) -> Result<SurfaceMesh> {
        self.extract_with_attributes(grid, labels, &[])
    }

    /// Extract label boundaries, interpolating the supplied point-data
    /// arrays onto the surface when attribute interpolation is enabled.
    pub fn extract_with_attributes<T: GridScalar>(
        &self,
        grid: &VolumeView<'_, T>,
        labels: &[T],
        attributes: &[PointAttribute<'_>],
    ) -> Result<SurfaceMesh> {
        let dims = grid.dims();
        if dims.iter().any(|&d| d < 2) {
            return Err(Error::InvalidData(format!(
                "Extraction requires a three-dimensional volume with at least 2 samples per axis, got {:?}",
                dims
            )));
        }
        if self.config.component >= grid.components() {
            return Err(Error::InvalidData(format!(
                "Component {} requested but the volume stores {} per sample",
                self.config.component,
                grid.components()
            )));
        }
        let attributes: &[PointAttribute<'_>] = if self.config.interpolate_attributes {
            attributes
        } else {
            &[]
        };
        for attr in attributes {
            if attr.values.len() != grid.point_count() {
                return Err(Error::InvalidData(format!(
                    "Attribute '{}' has {} values for {} grid points",
                    attr.name,
                    attr.values.len(),
                    grid.point_count()
                )));
            }
        }

        log::debug!(
            "flying edges: extracting {} label(s) from a {}x{}x{} volume",
            labels.len(),
            dims[0],
            dims[1],
            dims[2]
        );

        let [_, ny, nz] = dims;
        let nx_edges = dims[0] - 1;
        let num_rows = ny * nz;
        let table = CaseTable::global();

        let mut edge_cases = vec![BOTH_OUTSIDE; nx_edges * num_rows];
        let mut meta = vec![EdgeMeta::default(); num_rows];

        let mut vertices: Vec<Point3f> = Vec::new();
        let mut faces: Vec<[usize; 3]> = Vec::new();
        let mut normals: Option<Vec<Vector3f>> = self.config.compute_normals.then(Vec::new);
        let mut gradients: Option<Vec<Vector3f>> = self.config.compute_gradients.then(Vec::new);
        let mut scalars: Option<Vec<f32>> = self.config.compute_scalars.then(Vec::new);
        let mut attr_values: Vec<Vec<f32>> = attributes.iter().map(|_| Vec::new()).collect();

        let mut totals = Totals::default();
        for &label in labels {
            let pass = LabelPass {
                grid: *grid,
                label,
                component: self.config.component,
                dims,
                nx_edges,
            };

            pass.classify_x_edges(&mut edge_cases, &mut meta);
            let counts = pass.accumulate_row_counts(&edge_cases, &meta, table);
            let label_start = totals.points;
            scan_offsets(&mut meta, &counts, dims, &mut totals);

            vertices.resize(totals.points, Point3f::origin());
            faces.resize(totals.triangles, [0; 3]);
            if let Some(v) = normals.as_mut() {
                v.resize(totals.points, Vector3f::zeros());
            }
            if let Some(v) = gradients.as_mut() {
                v.resize(totals.points, Vector3f::zeros());
            }
            for v in attr_values.iter_mut() {
                v.resize(totals.points, 0.0);
            }

            if totals.points > label_start {
                let out = SharedOut {
                    points: DisjointSlice::new(vertices.as_mut_slice()),
                    faces: DisjointSlice::new(faces.as_mut_slice()),
                    normals: normals.as_mut().map(|v| DisjointSlice::new(v.as_mut_slice())),
                    gradients: gradients
                        .as_mut()
                        .map(|v| DisjointSlice::new(v.as_mut_slice())),
                    attributes: attr_values
                        .iter_mut()
                        .zip(attributes)
                        .map(|(dst, src)| (DisjointSlice::new(dst.as_mut_slice()), src.values))
                        .collect(),
                };
                pass.generate(&edge_cases, &meta, table, &out);
            }

            if let Some(s) = scalars.as_mut() {
                s.resize(totals.points, 0.0);
                s[label_start..].fill(label.to_f32());
            }
        }

        log::debug!(
            "flying edges: generated {} points, {} triangles",
            totals.points,
            totals.triangles
        );

        let mut mesh = SurfaceMesh::from_vertices_and_faces(vertices, faces);
        mesh.normals = normals;
        mesh.gradients = gradients;
        mesh.scalars = scalars;
        mesh.attributes = attributes
            .iter()
            .zip(attr_values)
            .map(|(a, values)| ScalarAttribute {
                name: a.name.to_string(),
                values,
            })
            .collect();
        Ok(mesh)
    }
}

/// Convenience function extracting the boundary surface of a single label
pub fn extract_label_surface<T: GridScalar>(
    grid: &VolumeView<'_, T>,
    label: T,
) -> Result<SurfaceMesh> {
    DiscreteFlyingEdges::default().extract(grid, &[label])
}

/// Convenience function extracting the boundary surfaces of several labels
/// into one shared mesh
pub fn extract_label_surfaces<T: GridScalar>(
    grid: &VolumeView<'_, T>,
    labels: &[T],
) -> Result<SurfaceMesh> {
    DiscreteFlyingEdges::default().extract(grid, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn volume_from_fn(dims: [usize; 3], f: impl Fn(usize, usize, usize) -> u8) -> Vec<u8> {
        let mut data = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for k in 0..dims[2] {
            for j in 0..dims[1] {
                for i in 0..dims[0] {
                    data.push(f(i, j, k));
                }
            }
        }
        data
    }

    /// Every vertex of a midpoint-rule surface on a unit grid has exactly
    /// one half-integral coordinate.
    fn assert_midpoint_vertices(mesh: &SurfaceMesh) {
        for v in &mesh.vertices {
            let halves = [v.x, v.y, v.z]
                .iter()
                .filter(|c| (c.fract().abs() - 0.5).abs() < 1e-6)
                .count();
            assert_eq!(halves, 1, "vertex {:?} is not an edge midpoint", v);
        }
    }

    fn assert_valid_faces(mesh: &SurfaceMesh) {
        for face in &mesh.faces {
            for &idx in face {
                assert!(idx < mesh.vertex_count());
            }
            assert!(face[0] != face[1] && face[1] != face[2] && face[0] != face[2]);
        }
    }

    #[test]
    fn test_uniform_volume_produces_nothing() {
        let data = vec![3u8; 4 * 4 * 4];
        let vol = VolumeView::new(&data, [4, 4, 4]).unwrap();

        // Every sample on the label, and no sample on the label.
        let on = extract_label_surface(&vol, 3).unwrap();
        assert_eq!(on.vertex_count(), 0);
        assert_eq!(on.face_count(), 0);

        let off = extract_label_surface(&vol, 7).unwrap();
        assert_eq!(off.vertex_count(), 0);
        assert_eq!(off.face_count(), 0);
    }

    #[test]
    fn test_corner_sample() {
        let data = volume_from_fn([3, 3, 3], |i, j, k| u8::from(i == 0 && j == 0 && k == 0));
        let vol = VolumeView::new(&data, [3, 3, 3]).unwrap();
        let mesh = extract_label_surface(&vol, 1).unwrap();

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);
        assert_valid_faces(&mesh);
        assert_midpoint_vertices(&mesh);

        let mut coords: Vec<[f32; 3]> = mesh.vertices.iter().map(|p| [p.x, p.y, p.z]).collect();
        coords.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(
            coords,
            vec![[0.0, 0.0, 0.5], [0.0, 0.5, 0.0], [0.5, 0.0, 0.0]]
        );

        let scalars = mesh.scalars.as_ref().unwrap();
        assert!(scalars.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_minimum_volume_executes() {
        let data = volume_from_fn([2, 2, 2], |i, j, k| u8::from(i == 1 && j == 1 && k == 1));
        let vol = VolumeView::new(&data, [2, 2, 2]).unwrap();

        let config = DiscreteFlyingEdgesConfig::default()
            .with_gradients(true)
            .with_normals(true);
        let mesh = DiscreteFlyingEdges::new(config).extract(&vol, &[1u8]).unwrap();

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);
        assert_valid_faces(&mesh);
        assert_midpoint_vertices(&mesh);
        assert_eq!(mesh.gradients.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn test_planar_interface() {
        // Label on the x < 2 half: one quad of interface per unit area, all
        // vertices on the x = 1.5 plane.
        let dims = [4, 3, 3];
        let data = volume_from_fn(dims, |i, _, _| if i < 2 { 7 } else { 0 });
        let vol = VolumeView::new(&data, dims).unwrap();
        let mesh = extract_label_surface(&vol, 7).unwrap();

        assert_eq!(mesh.vertex_count(), 9); // one crossing per (j, k) row
        assert_eq!(mesh.face_count(), 8); // two triangles per voxel face
        assert_valid_faces(&mesh);
        for v in &mesh.vertices {
            assert_relative_eq!(v.x, 1.5);
        }
    }

    #[test]
    fn test_planar_interface_normals() {
        let dims = [4, 3, 3];
        let data = volume_from_fn(dims, |i, _, _| if i < 2 { 7 } else { 0 });
        let vol = VolumeView::new(&data, dims).unwrap();

        let config = DiscreteFlyingEdgesConfig::default().with_gradients(true);
        let mesh = DiscreteFlyingEdges::new(config).extract(&vol, &[7u8]).unwrap();

        let normals = mesh.normals.as_ref().unwrap();
        assert_eq!(normals.len(), mesh.vertex_count());
        for n in normals {
            assert_relative_eq!(n.magnitude(), 1.0, epsilon = 1e-5);
            // The label decreases across +x, so the outward normal points +x.
            assert!(n.x > 0.9);
        }
        let gradients = mesh.gradients.as_ref().unwrap();
        for g in gradients {
            assert!(g.x < 0.0);
            assert_relative_eq!(g.y, 0.0);
            assert_relative_eq!(g.z, 0.0);
        }
    }

    #[test]
    fn test_trim_widening_between_rows() {
        // The contour runs between x-rows without crossing x-edges near the
        // left end; the trim range must widen or the row undercounts.
        let dims = [4, 2, 2];
        let data = volume_from_fn(dims, |i, j, k| match (j, k) {
            (0, 0) => 1,
            (0, 1) => u8::from(i < 2),
            _ => 0,
        });
        let vol = VolumeView::new(&data, dims).unwrap();
        let mesh = extract_label_surface(&vol, 1).unwrap();

        // Crossings: 4 y-edges at k=0, 2 y-edges at k=1, 2 z-edges at j=0,
        // 1 x-edge in row (0,1).
        assert_eq!(mesh.vertex_count(), 9);
        assert_valid_faces(&mesh);
        assert_midpoint_vertices(&mesh);
    }

    #[test]
    fn test_multi_label_shared_buffers() {
        // Two labels split by the x = 1.5 plane; each extraction sees the
        // same interface from its own side.
        let dims = [4, 3, 3];
        let data = volume_from_fn(dims, |i, _, _| if i < 2 { 1 } else { 2 });
        let vol = VolumeView::new(&data, dims).unwrap();
        let mesh = extract_label_surfaces(&vol, &[1, 2]).unwrap();

        assert_eq!(mesh.vertex_count(), 18);
        assert_eq!(mesh.face_count(), 16);
        assert_valid_faces(&mesh);

        let scalars = mesh.scalars.as_ref().unwrap();
        assert!(scalars[..9].iter().all(|&s| s == 1.0));
        assert!(scalars[9..].iter().all(|&s| s == 2.0));
    }

    #[test]
    fn test_empty_label_list() {
        let data = vec![1u8; 27];
        let vol = VolumeView::new(&data, [3, 3, 3]).unwrap();
        let mesh = extract_label_surfaces(&vol, &[]).unwrap();
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_rejects_two_dimensional_volume() {
        let data = vec![0u8; 16];
        let vol = VolumeView::new(&data, [4, 4, 1]).unwrap();
        assert!(matches!(
            extract_label_surface(&vol, 1),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_rejects_component_out_of_range() {
        let data = vec![0u8; 8];
        let vol = VolumeView::new(&data, [2, 2, 2]).unwrap();
        let config = DiscreteFlyingEdgesConfig::default().with_component(1);
        assert!(matches!(
            DiscreteFlyingEdges::new(config).extract(&vol, &[1u8]),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_rejects_short_attribute_array() {
        let data = vec![0u8; 27];
        let vol = VolumeView::new(&data, [3, 3, 3]).unwrap();
        let short = vec![0.0f32; 26];
        let config = DiscreteFlyingEdgesConfig::default().with_interpolate_attributes(true);
        let result = DiscreteFlyingEdges::new(config).extract_with_attributes(
            &vol,
            &[1u8],
            &[PointAttribute {
                name: "density",
                values: &short,
            }],
        );
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_world_transform_applies_to_output() {
        let dims = [4, 3, 3];
        let data = volume_from_fn(dims, |i, _, _| if i < 2 { 5 } else { 0 });
        let vol = VolumeView::new(&data, dims)
            .unwrap()
            .with_origin(Point3f::new(100.0, 0.0, 0.0))
            .with_spacing(Vector3f::new(2.0, 1.0, 1.0));
        let mesh = extract_label_surface(&vol, 5).unwrap();

        for v in &mesh.vertices {
            assert_relative_eq!(v.x, 103.0); // 100 + 1.5 * 2.0
        }
    }
}
