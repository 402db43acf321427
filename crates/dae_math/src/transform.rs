// Transform utilities for Mat4
//
// Extends glam::Mat4 with the conventions COLLADA documents use.
// COLLADA writes matrices row-major; glam stores them column-major.

use glam::{Mat4, Vec3};

/// Extension trait for Mat4 covering COLLADA transform elements.
pub trait Mat4Ext: Sized {
    /// Build a matrix from 16 values written in row-major order.
    fn from_row_major(values: &[f32; 16]) -> Self;

    /// Build a matrix from a slice holding at least 16 row-major values.
    ///
    /// Returns `None` when the slice is too short.
    fn try_from_row_major_slice(values: &[f32]) -> Option<Self>;

    /// The 16 values of this matrix in row-major order.
    fn to_row_major(&self) -> [f32; 16];

    /// Right-multiply a translation.
    fn translated(&self, offset: Vec3) -> Self;

    /// Right-multiply a (possibly non-uniform) scale.
    fn scaled(&self, factors: Vec3) -> Self;

    /// Right-multiply an axis-angle rotation given in degrees.
    ///
    /// A zero-length axis leaves the matrix unchanged.
    fn rotated_degrees(&self, axis: Vec3, degrees: f32) -> Self;
}

impl Mat4Ext for Mat4 {
    fn from_row_major(values: &[f32; 16]) -> Self {
        Mat4::from_cols_array(values).transpose()
    }

    fn try_from_row_major_slice(values: &[f32]) -> Option<Self> {
        let head: &[f32; 16] = values.get(..16)?.try_into().ok()?;
        Some(Self::from_row_major(head))
    }

    fn to_row_major(&self) -> [f32; 16] {
        self.transpose().to_cols_array()
    }

    fn translated(&self, offset: Vec3) -> Self {
        *self * Mat4::from_translation(offset)
    }

    fn scaled(&self, factors: Vec3) -> Self {
        *self * Mat4::from_scale(factors)
    }

    fn rotated_degrees(&self, axis: Vec3, degrees: f32) -> Self {
        let axis = axis.normalize_or_zero();
        if axis == Vec3::ZERO {
            return *self;
        }
        *self * Mat4::from_axis_angle(axis, degrees.to_radians())
    }
}
