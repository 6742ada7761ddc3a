// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Tract classification: tract name -> fascicle indices
//!
//! Indices are only meaningful against the connectome version they were
//! computed for. Nothing here checks them; the virtual lesion validates each
//! tract against the model it is evaluated on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TractClassification {
    tracts: BTreeMap<String, Vec<usize>>,
}

impl TractClassification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tract
    pub fn insert(&mut self, name: impl Into<String>, fascicles: Vec<usize>) {
        self.tracts.insert(name.into(), fascicles);
    }

    pub fn with_tract(mut self, name: impl Into<String>, fascicles: Vec<usize>) -> Self {
        self.insert(name, fascicles);
        self
    }

    pub fn get(&self, name: &str) -> Option<&[usize]> {
        self.tracts.get(name).map(Vec::as_slice)
    }

    /// Tracts in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.tracts.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tracts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracts.is_empty()
    }

    /// Largest fascicle index referenced by any tract
    pub fn max_index(&self) -> Option<usize> {
        self.tracts.values().flatten().copied().max()
    }
}

impl FromIterator<(String, Vec<usize>)> for TractClassification {
    fn from_iter<I: IntoIterator<Item = (String, Vec<usize>)>>(iter: I) -> Self {
        Self {
            tracts: iter.into_iter().collect(),
        }
    }
}
