//! Surface mesh data structures and functionality

use crate::traits::Bounded;
use crate::{Point3f, Vector3f};
use serde::{Deserialize, Serialize};

/// A triangulated boundary surface with optional per-vertex data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    /// Unit normals derived from the negated scalar gradient
    pub normals: Option<Vec<Vector3f>>,
    /// Raw central-difference gradients of the label field
    pub gradients: Option<Vec<Vector3f>>,
    /// The label value each vertex originated from
    pub scalars: Option<Vec<f32>>,
    /// Point-data arrays interpolated onto the surface
    pub attributes: Vec<ScalarAttribute>,
}

/// A named per-vertex scalar array interpolated from volume point data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarAttribute {
    pub name: String,
    pub values: Vec<f32>,
}

impl SurfaceMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            gradients: None,
            scalars: None,
            attributes: Vec::new(),
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            gradients: None,
            scalars: None,
            attributes: Vec::new(),
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Calculate face normals
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        self.faces
            .iter()
            .map(|face| {
                let v0 = self.vertices[face[0]];
                let v1 = self.vertices[face[1]];
                let v2 = self.vertices[face[2]];

                let edge1 = v1 - v0;
                let edge2 = v2 - v0;

                edge1.cross(&edge2).normalize()
            })
            .collect()
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.faces.clear();
        self.normals = None;
        self.gradients = None;
        self.scalars = None;
        self.attributes.clear();
    }
}

impl Default for SurfaceMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Bounded for SurfaceMesh {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        if self.vertices.is_empty() {
            return (Point3f::origin(), Point3f::origin());
        }

        let mut min = self.vertices[0];
        let mut max = self.vertices[0];

        for vertex in &self.vertices {
            min.x = min.x.min(vertex.x);
            min.y = min.y.min(vertex.y);
            min.z = min.z.min(vertex.z);

            max.x = max.x.max(vertex.x);
            max.y = max.y.max(vertex.y);
            max.z = max.z.max(vertex.z);
        }

        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> SurfaceMesh {
        SurfaceMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_mesh_counts() {
        let mesh = unit_quad();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        assert!(!mesh.is_empty());
        assert!(SurfaceMesh::new().is_empty());
    }

    #[test]
    fn test_face_normals() {
        let mesh = unit_quad();
        for n in mesh.calculate_face_normals() {
            assert_eq!(n, Vector3f::new(0.0, 0.0, 1.0));
        }
    }

    #[test]
    fn test_set_normals_rejects_mismatched_length() {
        let mut mesh = unit_quad();
        mesh.set_normals(vec![Vector3f::new(0.0, 0.0, 1.0); 3]);
        assert!(mesh.normals.is_none());
        mesh.set_normals(vec![Vector3f::new(0.0, 0.0, 1.0); 4]);
        assert!(mesh.normals.is_some());
    }

    #[test]
    fn test_bounding_box() {
        let mesh = unit_quad();
        let (min, max) = mesh.bounding_box();
        assert_eq!(min, Point3f::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3f::new(1.0, 1.0, 0.0));
        assert_eq!(mesh.center(), Point3f::new(0.5, 0.5, 0.0));
    }
}
