//! CRF model artifact.
//!
//! The trained weights are stored as a JSON document. Only attributes with at
//! least one non-zero state feature are kept, renumbered densely.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use seqlearn_core::{Dictionary, Result, SeqlearnError};

use crate::features::{FeatureKind, FeatureSet};

pub const MODEL_FORMAT: &str = "seqlearn-crf1d";
pub const MODEL_VERSION: u32 = 1;

/// Weight of one (attribute, label) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateWeight {
    pub attribute: u32,
    pub label: u32,
    pub weight: f64,
}

/// Serialized CRF model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrfModel {
    pub format: String,
    pub version: u32,
    pub feature_type: String,
    pub labels: Vec<String>,
    pub attributes: Vec<String>,
    pub state_weights: Vec<StateWeight>,
    /// `transitions[from][to]`
    pub transitions: Vec<Vec<f64>>,
}

impl CrfModel {
    /// Build a model from trained weights, dropping zero-weight features.
    pub fn from_weights(
        feature_type: &str,
        features: &FeatureSet,
        weights: &[f64],
        attributes: &Dictionary,
        labels: &Dictionary,
    ) -> Self {
        let num_labels = features.num_labels();
        let mut transitions = vec![vec![0.0; num_labels]; num_labels];
        // old attribute id -> (label, weight) pairs
        let mut states: BTreeMap<u32, Vec<(u32, f64)>> = BTreeMap::new();

        for (fid, kind) in features.iter() {
            let weight = weights[fid];
            if weight == 0.0 {
                continue;
            }
            match kind {
                FeatureKind::State { attribute, label } => {
                    states.entry(attribute).or_default().push((label, weight));
                }
                FeatureKind::Transition { from, to } => {
                    transitions[from as usize][to as usize] = weight;
                }
            }
        }

        let mut model_attributes = Vec::with_capacity(states.len());
        let mut state_weights = Vec::new();
        for (new_id, (old_id, pairs)) in states.into_iter().enumerate() {
            model_attributes.push(attributes.to_string(old_id).unwrap_or_default().to_string());
            for (label, weight) in pairs {
                state_weights.push(StateWeight {
                    attribute: new_id as u32,
                    label,
                    weight,
                });
            }
        }

        Self {
            format: MODEL_FORMAT.to_string(),
            version: MODEL_VERSION,
            feature_type: feature_type.to_string(),
            labels: labels.iter().map(|(_, s)| s.to_string()).collect(),
            attributes: model_attributes,
            state_weights,
            transitions,
        }
    }

    /// Write the model to `path` atomically.
    ///
    /// The document is written to a temporary file in the same directory and
    /// renamed over `path` only after it has been fully written and synced.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".seqlearn-model-")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, self)
                .map_err(|e| SeqlearnError::Serialization(e.to_string()))?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let model: Self = serde_json::from_reader(reader)
            .map_err(|e| SeqlearnError::Serialization(e.to_string()))?;
        if model.format != MODEL_FORMAT {
            return Err(SeqlearnError::Serialization(format!(
                "unexpected model format {:?}",
                model.format
            )));
        }
        Ok(model)
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }
}
