// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Spatial types: voxel coordinates and coordinate reference frames

use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};

use crate::error::{LifeError, Result};

/// Integer voxel index (i, j, k) into a voxel grid
pub type VoxelCoord = [usize; 3];

/// Affines closer than this (max absolute element difference) are the same frame.
pub const FRAME_TOLERANCE: f64 = 1e-6;

/// A named coordinate space plus the affine taking voxel indices to world
/// coordinates (millimetres).
///
/// The affine is stored row-major so that JSON inputs read naturally:
/// `[[sx, 0, 0, tx], [0, sy, 0, ty], [0, 0, sz, tz], [0, 0, 0, 1]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFrame {
    /// Space label, e.g. "acpc" or "scanner"
    pub space: String,
    /// Voxel index -> world affine (row-major)
    pub voxel_to_world: [[f64; 4]; 4],
}

impl ReferenceFrame {
    /// Frame whose world coordinates equal voxel indices
    pub fn identity(space: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            voxel_to_world: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Isotropic voxels of `voxel_size` mm with the grid origin at `origin`
    pub fn isotropic(space: impl Into<String>, voxel_size: f64, origin: [f64; 3]) -> Self {
        Self {
            space: space.into(),
            voxel_to_world: [
                [voxel_size, 0.0, 0.0, origin[0]],
                [0.0, voxel_size, 0.0, origin[1]],
                [0.0, 0.0, voxel_size, origin[2]],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn matrix(&self) -> Matrix4<f64> {
        let a = &self.voxel_to_world;
        Matrix4::new(
            a[0][0], a[0][1], a[0][2], a[0][3], //
            a[1][0], a[1][1], a[1][2], a[1][3], //
            a[2][0], a[2][1], a[2][2], a[2][3], //
            a[3][0], a[3][1], a[3][2], a[3][3],
        )
    }

    /// World -> voxel affine
    ///
    /// # Errors
    /// `InvalidInput` if the affine is singular.
    pub fn world_to_voxel(&self) -> Result<Matrix4<f64>> {
        self.matrix().try_inverse().ok_or_else(|| {
            LifeError::InvalidInput(format!(
                "voxel-to-world affine of frame '{}' is singular",
                self.space
            ))
        })
    }

    /// Map a world-space point to continuous voxel coordinates
    pub fn to_voxel_space(world_to_voxel: &Matrix4<f64>, point: &Point3<f64>) -> Point3<f64> {
        world_to_voxel.transform_point(point)
    }

    pub fn is_consistent_with(&self, other: &ReferenceFrame) -> bool {
        if self.space != other.space {
            return false;
        }
        self.voxel_to_world
            .iter()
            .flatten()
            .zip(other.voxel_to_world.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= FRAME_TOLERANCE)
    }

    /// # Errors
    /// `GeometryMismatch` naming both frames when they differ.
    pub fn ensure_consistent(&self, other: &ReferenceFrame) -> Result<()> {
        if self.is_consistent_with(other) {
            Ok(())
        } else if self.space != other.space {
            Err(LifeError::GeometryMismatch(format!(
                "fascicles are in space '{}' but the signal volume is in space '{}'",
                self.space, other.space
            )))
        } else {
            Err(LifeError::GeometryMismatch(format!(
                "space '{}' is shared but the voxel-to-world affines differ",
                self.space
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_round_trip() {
        let frame = ReferenceFrame::identity("acpc");
        let inv = frame.world_to_voxel().unwrap();
        let p = ReferenceFrame::to_voxel_space(&inv, &Point3::new(1.5, 2.0, -3.0));
        assert_relative_eq!(p.x, 1.5);
        assert_relative_eq!(p.y, 2.0);
        assert_relative_eq!(p.z, -3.0);
    }

    #[test]
    fn test_isotropic_inverse() {
        let frame = ReferenceFrame::isotropic("acpc", 2.0, [-10.0, -10.0, -10.0]);
        let inv = frame.world_to_voxel().unwrap();
        let p = ReferenceFrame::to_voxel_space(&inv, &Point3::new(-6.0, -10.0, 0.0));
        assert_relative_eq!(p.x, 2.0);
        assert_relative_eq!(p.y, 0.0);
        assert_relative_eq!(p.z, 5.0);
    }

    #[test]
    fn test_singular_affine_rejected() {
        let mut frame = ReferenceFrame::identity("acpc");
        frame.voxel_to_world[0][0] = 0.0;
        assert!(matches!(
            frame.world_to_voxel(),
            Err(LifeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_frame_mismatch() {
        let a = ReferenceFrame::identity("acpc");
        let b = ReferenceFrame::identity("scanner");
        let c = ReferenceFrame::isotropic("acpc", 2.0, [0.0; 3]);

        assert!(a.ensure_consistent(&a.clone()).is_ok());
        assert!(matches!(
            a.ensure_consistent(&b),
            Err(LifeError::GeometryMismatch(_))
        ));
        assert!(matches!(
            a.ensure_consistent(&c),
            Err(LifeError::GeometryMismatch(_))
        ));
    }
}
