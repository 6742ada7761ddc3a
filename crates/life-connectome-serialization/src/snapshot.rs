// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Serializable connectome structures

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use life_structures::{Connectome, Fascicle, FitSummary, ReferenceFrame};

use crate::{ConnectomeError, Result, FORMAT_VERSION};

/// Fascicle geometry flattened into structure-of-arrays form
///
/// Fascicle `i` owns nodes `offsets[i]..offsets[i + 1]`; node `n` is
/// `coords[3n..3n + 3]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableFascicleArray {
    /// Number of fascicles
    pub count: usize,

    /// Node offsets, `count + 1` entries starting at 0
    pub offsets: Vec<u64>,

    /// World-space node coordinates (x, y, z interleaved)
    pub coords: Vec<f64>,
}

impl Default for SerializableFascicleArray {
    fn default() -> Self {
        Self {
            count: 0,
            offsets: vec![0],
            coords: Vec::new(),
        }
    }
}

impl SerializableFascicleArray {
    pub fn from_fascicles(fascicles: &[Fascicle]) -> Self {
        let total: usize = fascicles.iter().map(Fascicle::len).sum();
        let mut offsets = Vec::with_capacity(fascicles.len() + 1);
        let mut coords = Vec::with_capacity(total * 3);
        offsets.push(0);
        for fascicle in fascicles {
            for p in fascicle.points() {
                coords.extend_from_slice(&[p.x, p.y, p.z]);
            }
            offsets.push((coords.len() / 3) as u64);
        }
        Self {
            count: fascicles.len(),
            offsets,
            coords,
        }
    }

    /// Rebuild the fascicles, checking offsets against the coordinate buffer.
    pub fn to_fascicles(&self) -> Result<Vec<Fascicle>> {
        if self.offsets.len() != self.count + 1 || self.offsets.first() != Some(&0) {
            return Err(ConnectomeError::InvalidSnapshot(format!(
                "expected {} offsets starting at 0, got {}",
                self.count + 1,
                self.offsets.len()
            )));
        }
        if self.coords.len() % 3 != 0 {
            return Err(ConnectomeError::InvalidSnapshot(format!(
                "coordinate buffer length {} is not a multiple of 3",
                self.coords.len()
            )));
        }
        let nodes = (self.coords.len() / 3) as u64;

        let mut fascicles = Vec::with_capacity(self.count);
        for pair in self.offsets.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            if start > end || end > nodes {
                return Err(ConnectomeError::InvalidSnapshot(format!(
                    "fascicle node range {}..{} outside {} nodes",
                    start, end, nodes
                )));
            }
            let nodes: Vec<[f64; 3]> = self.coords[start as usize * 3..end as usize * 3]
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect();
            fascicles.push(Fascicle::from_coords(&nodes));
        }
        Ok(fascicles)
    }
}

/// Connectome metadata (for tracking and provenance)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectomeMetadata {
    /// Seconds since the Unix epoch when the snapshot was taken
    pub timestamp: u64,

    /// Human-readable description
    pub description: String,

    /// Source (e.g., "tractography: subject01_prob.json")
    pub source: String,

    /// Custom tags for organization
    pub tags: AHashMap<String, String>,
}

impl Default for ConnectomeMetadata {
    fn default() -> Self {
        Self {
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            description: String::new(),
            source: String::from("unknown"),
            tags: AHashMap::new(),
        }
    }
}

impl ConnectomeMetadata {
    pub fn new(description: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Complete persisted connectome
///
/// Captures geometry, the reference frame it is expressed in, fitted weights
/// (if any) and the fit diagnostics they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectomeSnapshot {
    /// Format version (for backward compatibility)
    pub version: u32,

    pub frame: ReferenceFrame,

    pub fascicles: SerializableFascicleArray,

    /// One weight per fascicle; absent for an unfitted connectome
    pub weights: Option<Vec<f64>>,

    pub fit: Option<FitSummary>,

    pub metadata: ConnectomeMetadata,
}

impl ConnectomeSnapshot {
    pub fn from_connectome(
        connectome: &Connectome,
        fit: Option<FitSummary>,
        metadata: ConnectomeMetadata,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            frame: connectome.frame().clone(),
            fascicles: SerializableFascicleArray::from_fascicles(connectome.fascicles()),
            weights: connectome.weights().map(<[f64]>::to_vec),
            fit,
            metadata,
        }
    }

    /// Rebuild the connectome.
    ///
    /// # Errors
    /// `InvalidSnapshot` for inconsistent geometry or weights.
    pub fn to_connectome(&self) -> Result<Connectome> {
        let connectome = Connectome::new(self.frame.clone(), self.fascicles.to_fascicles()?);
        match &self.weights {
            Some(weights) => connectome
                .with_weights(weights.clone())
                .map_err(|e| ConnectomeError::InvalidSnapshot(e.to_string())),
            None => Ok(connectome),
        }
    }

    pub fn fascicle_count(&self) -> usize {
        self.fascicles.count
    }
}
