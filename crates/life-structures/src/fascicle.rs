// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Fascicle geometry

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::spatial::ReferenceFrame;

/// A candidate fiber pathway: an ordered polyline of world-space points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fascicle {
    points: Vec<Point3<f64>>,
}

impl Fascicle {
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    pub fn from_coords(coords: &[[f64; 3]]) -> Self {
        Self {
            points: coords.iter().map(|c| Point3::new(c[0], c[1], c[2])).collect(),
        }
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of segment lengths
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| (w[1] - w[0]).norm())
            .sum()
    }
}

/// Output of the tractography collaborator: fascicles plus the frame their
/// coordinates are expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FascicleSet {
    pub frame: ReferenceFrame,
    pub fascicles: Vec<Fascicle>,
}

impl FascicleSet {
    pub fn new(frame: ReferenceFrame, fascicles: Vec<Fascicle>) -> Self {
        Self { frame, fascicles }
    }

    pub fn len(&self) -> usize {
        self.fascicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fascicles.is_empty()
    }
}
