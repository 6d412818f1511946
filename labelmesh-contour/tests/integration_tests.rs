//! Integration tests for labelmesh-contour
//!
//! End-to-end properties of discrete flying-edges extraction: conservation
//! of counted vs. generated primitives, closed-surface topology, midpoint
//! placement, determinism, and multi-label behavior.

use labelmesh_contour::{
    extract_label_surface, extract_label_surfaces, DiscreteFlyingEdges, DiscreteFlyingEdgesConfig,
};
use labelmesh_core::{PointAttribute, SurfaceMesh, VolumeView};
use std::collections::{HashMap, HashSet};

/// Build a dense x-fastest volume from a per-sample labeling function
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

/// A 6x6x6 volume with a 2x2x2 block of label 1 in the middle
fn boxed_core() -> Vec<u8> {
    volume_from_fn([6, 6, 6], |i, j, k| {
        u8::from((2..=3).contains(&i) && (2..=3).contains(&j) && (2..=3).contains(&k))
    })
}

fn undirected_edge_counts(faces: &[[usize; 3]]) -> HashMap<(usize, usize), usize> {
    let mut counts = HashMap::new();
    for face in faces {
        for (a, b) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
            let key = (a.min(b), a.max(b));
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}

/// Assert the face set is a closed 2-manifold of sphere topology.
fn assert_closed_sphere(faces: &[[usize; 3]]) {
    let edges = undirected_edge_counts(faces);
    for (edge, count) in &edges {
        assert_eq!(
            *count, 2,
            "edge {:?} is shared by {} triangles, expected 2",
            edge, count
        );
    }
    let vertices: HashSet<usize> = faces.iter().flatten().copied().collect();
    let euler = vertices.len() as i64 - edges.len() as i64 + faces.len() as i64;
    assert_eq!(euler, 2, "closed surface should have Euler characteristic 2");
}

fn assert_midpoint_vertices(mesh: &SurfaceMesh) {
    for v in &mesh.vertices {
        let halves = [v.x, v.y, v.z]
            .iter()
            .filter(|c| (c.fract().abs() - 0.5).abs() < 1e-6)
            .count();
        assert_eq!(halves, 1, "vertex {:?} is not an edge midpoint", v);
    }
}

#[test]
fn test_boxed_core_is_closed_manifold() {
    let data = boxed_core();
    let vol = VolumeView::new(&data, [6, 6, 6]).unwrap();
    let mesh = extract_label_surface(&vol, 1).unwrap();

    // 8 interior samples with 3 outward crossings each; 8 corner voxels of
    // one triangle, 12 edge voxels and 6 face voxels of two.
    assert_eq!(mesh.vertex_count(), 24);
    assert_eq!(mesh.face_count(), 44);
    assert_midpoint_vertices(&mesh);
    assert_closed_sphere(&mesh.faces);
}

#[test]
fn test_extraction_is_deterministic() {
    let data = boxed_core();
    let vol = VolumeView::new(&data, [6, 6, 6]).unwrap();

    let first = extract_label_surface(&vol, 1).unwrap();
    let second = extract_label_surface(&vol, 1).unwrap();

    assert_eq!(first.vertices, second.vertices);
    assert_eq!(first.faces, second.faces);
}

#[test]
fn test_patterned_volume_conservation() {
    // A deterministic multi-region labeling exercising trims and boundary
    // voxels; every face index must land in the generated vertex range and
    // every vertex must be written (unwritten slots could not lie on an edge
    // midpoint).
    let dims = [7, 6, 5];
    let data = volume_from_fn(dims, |i, j, k| ((i * 7 + j * 3 + k * 11) % 4) as u8);
    let vol = VolumeView::new(&data, dims).unwrap();

    for label in 0..4u8 {
        let mesh = extract_label_surface(&vol, label).unwrap();
        assert_midpoint_vertices(&mesh);
        for face in &mesh.faces {
            for &idx in face {
                assert!(idx < mesh.vertex_count());
            }
        }
        let used: HashSet<usize> = mesh.faces.iter().flatten().copied().collect();
        assert_eq!(
            used.len(),
            mesh.vertex_count(),
            "every generated point should be referenced by a triangle"
        );
    }
}

#[test]
fn test_nested_labels_share_interface_points() {
    // Label 1 core inside a label 2 shell: the core boundary and the inner
    // shell boundary are the same surface, so every core vertex position
    // recurs among the shell's vertices.
    let dims = [6, 6, 6];
    let data = volume_from_fn(dims, |i, j, k| {
        let core = (2..=3).contains(&i) && (2..=3).contains(&j) && (2..=3).contains(&k);
        let shell = (1..=4).contains(&i) && (1..=4).contains(&j) && (1..=4).contains(&k);
        if core {
            1
        } else if shell {
            2
        } else {
            0
        }
    });
    let vol = VolumeView::new(&data, dims).unwrap();

    let core = extract_label_surface(&vol, 1).unwrap();
    let shell = extract_label_surface(&vol, 2).unwrap();

    let shell_points: HashSet<[i64; 3]> = shell
        .vertices
        .iter()
        .map(|p| [(p.x * 2.0) as i64, (p.y * 2.0) as i64, (p.z * 2.0) as i64])
        .collect();
    for p in &core.vertices {
        let key = [(p.x * 2.0) as i64, (p.y * 2.0) as i64, (p.z * 2.0) as i64];
        assert!(
            shell_points.contains(&key),
            "core vertex {:?} missing from the shell boundary",
            p
        );
    }
}

#[test]
fn test_multi_label_invocation_matches_separate_runs() {
    let dims = [6, 6, 6];
    let data = volume_from_fn(dims, |i, j, k| {
        let core = (2..=3).contains(&i) && (2..=3).contains(&j) && (2..=3).contains(&k);
        let shell = (1..=4).contains(&i) && (1..=4).contains(&j) && (1..=4).contains(&k);
        if core {
            1
        } else if shell {
            2
        } else {
            0
        }
    });
    let vol = VolumeView::new(&data, dims).unwrap();

    let combined = extract_label_surfaces(&vol, &[1, 2]).unwrap();
    let first = extract_label_surface(&vol, 1).unwrap();
    let second = extract_label_surface(&vol, 2).unwrap();

    assert_eq!(
        combined.vertex_count(),
        first.vertex_count() + second.vertex_count()
    );
    assert_eq!(combined.face_count(), first.face_count() + second.face_count());

    // Each label's vertex range carries its own scalar value.
    let scalars = combined.scalars.as_ref().unwrap();
    assert!(scalars[..first.vertex_count()].iter().all(|&s| s == 1.0));
    assert!(scalars[first.vertex_count()..].iter().all(|&s| s == 2.0));

    // The first label's portion is bitwise identical to its separate run.
    assert_eq!(&combined.vertices[..first.vertex_count()], &first.vertices[..]);
    assert_eq!(&combined.faces[..first.face_count()], &first.faces[..]);
}

#[test]
fn test_unique_labels_drive_extraction() {
    let dims = [6, 6, 6];
    let data = volume_from_fn(dims, |i, _, _| if i < 3 { 0 } else { 4 });
    let vol = VolumeView::new(&data, dims).unwrap();

    let labels = vol.unique_labels();
    assert_eq!(labels, vec![0, 4]);

    let mesh = extract_label_surfaces(&vol, &labels).unwrap();
    assert!(!mesh.is_empty());
    // Both labels trace the same planar interface from opposite sides.
    for v in &mesh.vertices {
        assert_eq!(v.x, 2.5);
    }
}

#[test]
fn test_attribute_interpolation_uses_midpoint_weights() {
    let dims = [4, 3, 3];
    let data = volume_from_fn(dims, |i, _, _| u8::from(i < 2));
    let vol = VolumeView::new(&data, dims).unwrap();

    // Attribute equal to the x index: midpoint interpolation across the
    // crossing between i = 1 and i = 2 must give 1.5 everywhere.
    let attr: Vec<f32> = (0..vol.point_count()).map(|p| (p % 4) as f32).collect();

    let config = DiscreteFlyingEdgesConfig::default().with_interpolate_attributes(true);
    let mesh = DiscreteFlyingEdges::new(config)
        .extract_with_attributes(
            &vol,
            &[1u8],
            &[PointAttribute {
                name: "xindex",
                values: &attr,
            }],
        )
        .unwrap();

    assert_eq!(mesh.attributes.len(), 1);
    assert_eq!(mesh.attributes[0].name, "xindex");
    assert_eq!(mesh.attributes[0].values.len(), mesh.vertex_count());
    for &v in &mesh.attributes[0].values {
        assert_eq!(v, 1.5);
    }
}

#[test]
fn test_gradient_output_on_closed_region() {
    let data = boxed_core();
    let vol = VolumeView::new(&data, [6, 6, 6]).unwrap();

    let config = DiscreteFlyingEdgesConfig::default().with_gradients(true);
    let mesh = DiscreteFlyingEdges::new(config).extract(&vol, &[1u8]).unwrap();

    let normals = mesh.normals.as_ref().unwrap();
    let gradients = mesh.gradients.as_ref().unwrap();
    assert_eq!(normals.len(), mesh.vertex_count());
    assert_eq!(gradients.len(), mesh.vertex_count());
    for n in normals {
        assert!((n.magnitude() - 1.0).abs() < 1e-5);
    }
}

#[test]
fn test_failure_produces_no_output() {
    let data = vec![0u8; 12];
    let flat = VolumeView::new(&data, [4, 3, 1]).unwrap();
    assert!(extract_label_surface(&flat, 1).is_err());

    let vol = VolumeView::new(&data, [2, 3, 2]).unwrap();
    let config = DiscreteFlyingEdgesConfig::default().with_component(5);
    assert!(DiscreteFlyingEdges::new(config).extract(&vol, &[1u8]).is_err());
}

#[test]
fn test_parallel_pool_integration() {
    use labelmesh_contour::parallel::{init_thread_pool, ThreadPoolConfig};

    let config = ThreadPoolConfig::default().with_threads(2);
    // Ignore the error if another test initialized the pool first.
    let _ = init_thread_pool(config);

    let data = boxed_core();
    let vol = VolumeView::new(&data, [6, 6, 6]).unwrap();
    let mesh = extract_label_surface(&vol, 1).unwrap();
    assert_eq!(mesh.vertex_count(), 24);
    assert_eq!(mesh.face_count(), 44);
}
