// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! JSON evaluation report: fit diagnostics, reduction summary and per-tract
//! virtual lesion outcomes of one pipeline run

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use life_engine::{LesionReport, PipelineOutput, PipelineProfile};
use life_structures::FitSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionSummary {
    pub candidate_fascicles: usize,
    pub kept_fascicles: usize,
    /// Candidate-space indices of the kept fascicles
    pub kept: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub version: String,
    /// Fit of the full candidate connectome
    pub fit: FitSummary,
    /// Same weights restricted to the kept fascicles
    pub reduced_fit: FitSummary,
    pub reduction: ReductionSummary,
    pub profile: PipelineProfile,
    pub lesions: LesionReport,
}

impl EvaluationReport {
    pub fn from_output(output: &PipelineOutput) -> Self {
        Self {
            version: crate::VERSION.to_string(),
            fit: output.fitted.summary().clone(),
            reduced_fit: output.reduced.summary().clone(),
            reduction: ReductionSummary {
                candidate_fascicles: output.reduction.original_len(),
                kept_fascicles: output.reduction.reduced_len(),
                kept: output.reduction.kept().to_vec(),
            },
            profile: output.profile.clone(),
            lesions: output.lesions.clone(),
        }
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}
