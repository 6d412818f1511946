//! Core data structures and traits for labelmesh
//!
//! This crate provides the fundamental types for boundary surface extraction
//! from labeled voxel volumes: strided volume views, output surface meshes,
//! and the scalar trait shared by all extraction algorithms.

pub mod error;
pub mod mesh;
pub mod traits;
pub mod volume;

pub use error::*;
pub use mesh::*;
pub use traits::*;
pub use volume::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// Common result type for labelmesh operations
pub type Result<T> = std::result::Result<T, Error>;
