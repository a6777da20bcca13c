//! Feature generation for the first-order ("dyad") CRF.
//!
//! A state feature pairs an attribute with a label; a transition feature pairs
//! two labels at adjacent positions.

use std::collections::{BTreeMap, BTreeSet};

use seqlearn_core::{Instance, ParamSpec, ParamStore, Result, params::non_negative};

/// Kind of a generated feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    State { attribute: u32, label: u32 },
    Transition { from: u32, to: u32 },
}

/// Options controlling which features are generated.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureOptions {
    pub min_freq: f64,
    pub possible_states: bool,
    pub possible_transitions: bool,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self {
            min_freq: 0.0,
            possible_states: false,
            possible_transitions: false,
        }
    }
}

impl FeatureOptions {
    /// Parameters shared by every trainer built on this feature set.
    pub fn param_specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::float(
                "feature.minfreq",
                0.0,
                "Drop features whose frequency in the training data is below this value",
            )
            .with_validator(non_negative),
            ParamSpec::bool(
                "feature.possible_states",
                false,
                "Generate state features for every (attribute, label) pair, not only observed ones",
            ),
            ParamSpec::bool(
                "feature.possible_transitions",
                false,
                "Generate transition features for every label pair, not only observed ones",
            ),
        ]
    }

    pub fn from_params(params: &ParamStore) -> Result<Self> {
        Ok(Self {
            min_freq: params.get_float("feature.minfreq")?,
            possible_states: params.get_bool("feature.possible_states")?,
            possible_transitions: params.get_bool("feature.possible_transitions")?,
        })
    }
}

/// Generated features with lookup tables from attributes and label pairs to
/// feature indices.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    features: Vec<FeatureKind>,
    /// Indexed by attribute id: `(label, feature index)` pairs.
    state_refs: Vec<Vec<(u32, usize)>>,
    /// Indexed by `from * num_labels + to`.
    transition_refs: Vec<Option<usize>>,
    num_labels: usize,
    /// Features removed by the frequency cut-off.
    pub dropped: usize,
}

impl FeatureSet {
    /// Generate features from the fitting slice.
    ///
    /// `num_attributes` and `num_labels` are the dictionary sizes, so that ids
    /// seen only in holdout instances still index valid (empty) slots.
    pub fn generate(
        instances: &[&Instance],
        num_attributes: usize,
        num_labels: usize,
        options: &FeatureOptions,
    ) -> Self {
        // BTreeMaps keep feature numbering independent of hashing order.
        let mut states: BTreeMap<(u32, u32), f64> = BTreeMap::new();
        let mut transitions: BTreeMap<(u32, u32), f64> = BTreeMap::new();
        let mut observed_attributes: BTreeSet<u32> = BTreeSet::new();

        for instance in instances {
            let labels = instance.labels();
            for (t, item) in instance.items().iter().enumerate() {
                let label = labels[t];
                for attr in &item.contents {
                    observed_attributes.insert(attr.id);
                    *states.entry((attr.id, label)).or_default() += attr.value;
                }
                if t > 0 {
                    *transitions.entry((labels[t - 1], label)).or_default() += 1.0;
                }
            }
        }

        if options.possible_states {
            for &attribute in &observed_attributes {
                for label in 0..num_labels as u32 {
                    states.entry((attribute, label)).or_default();
                }
            }
        }
        if options.possible_transitions {
            for from in 0..num_labels as u32 {
                for to in 0..num_labels as u32 {
                    transitions.entry((from, to)).or_default();
                }
            }
        }

        let keep = |freq: f64| {
            options.min_freq <= 0.0 || freq >= options.min_freq
        };

        let mut set = Self {
            features: Vec::new(),
            state_refs: vec![Vec::new(); num_attributes],
            transition_refs: vec![None; num_labels * num_labels],
            num_labels,
            dropped: 0,
        };

        for ((attribute, label), freq) in states {
            if !keep(freq) {
                set.dropped += 1;
                continue;
            }
            let fid = set.features.len();
            set.features.push(FeatureKind::State { attribute, label });
            set.state_refs[attribute as usize].push((label, fid));
        }
        for ((from, to), freq) in transitions {
            if !keep(freq) {
                set.dropped += 1;
                continue;
            }
            let fid = set.features.len();
            set.features.push(FeatureKind::Transition { from, to });
            set.transition_refs[from as usize * num_labels + to as usize] = Some(fid);
        }

        set
    }

    /// Total number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn kind(&self, fid: usize) -> FeatureKind {
        self.features[fid]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, FeatureKind)> + '_ {
        self.features.iter().copied().enumerate()
    }

    /// State features attached to `attribute`.
    pub fn state_refs(&self, attribute: u32) -> &[(u32, usize)] {
        self.state_refs
            .get(attribute as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Transition feature ids indexed by `from * num_labels + to`.
    pub fn transition_table(&self) -> &[Option<usize>] {
        &self.transition_refs
    }

    /// Transition feature for the label pair, if one was generated.
    pub fn transition_ref(&self, from: u32, to: u32) -> Option<usize> {
        self.transition_refs[from as usize * self.num_labels + to as usize]
    }
}
