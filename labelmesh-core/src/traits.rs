//! Core traits for labelmesh

use crate::Point3f;

/// Scalar sample types a labeled volume can store.
///
/// Label comparisons use exact equality on the concrete stored type; the
/// lossy `to_f32` conversion is only used for derived output such as
/// gradients and per-vertex scalar values, never for classification.
pub trait GridScalar: Copy + PartialEq + Send + Sync + 'static {
    /// Lossy conversion used when deriving floating-point output.
    fn to_f32(self) -> f32;
}

macro_rules! impl_grid_scalar {
    ($($t:ty),*) => {
        $(impl GridScalar for $t {
            #[inline]
            fn to_f32(self) -> f32 {
                self as f32
            }
        })*
    };
}

impl_grid_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Trait for objects with a spatial extent
pub trait Bounded {
    /// Get the bounding box of the object
    fn bounding_box(&self) -> (Point3f, Point3f);

    /// Get the center point of the object
    fn center(&self) -> Point3f {
        let (min, max) = self.bounding_box();
        Point3f::new(
            (min.x + max.x) / 2.0,
            (min.y + max.y) / 2.0,
            (min.z + max.z) / 2.0,
        )
    }
}
