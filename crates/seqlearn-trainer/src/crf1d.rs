//! First-order linear-chain CRF over a [`FeatureSet`].
//!
//! Score matrices are flat, row-major: state scores are `[t * L + label]` and
//! transition scores are `[from * L + to]`.

use seqlearn_core::Instance;

use crate::features::FeatureSet;

/// Scores and decodes instances for one weight vector layout.
pub struct Crf1d<'a> {
    features: &'a FeatureSet,
    num_labels: usize,
}

impl<'a> Crf1d<'a> {
    pub fn new(features: &'a FeatureSet) -> Self {
        Self {
            features,
            num_labels: features.num_labels(),
        }
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// State scores for every position and label.
    pub fn state_scores(&self, instance: &Instance, weights: &[f64]) -> Vec<f64> {
        let l = self.num_labels;
        let mut scores = vec![0.0; instance.len() * l];
        for (t, item) in instance.items().iter().enumerate() {
            let row = &mut scores[t * l..(t + 1) * l];
            for attr in &item.contents {
                for &(label, fid) in self.features.state_refs(attr.id) {
                    row[label as usize] += weights[fid] * attr.value;
                }
            }
        }
        scores
    }

    /// Transition scores for every label pair. Costs O(L^2) regardless of
    /// the number of state features.
    pub fn transition_scores(&self, weights: &[f64]) -> Vec<f64> {
        self.features
            .transition_table()
            .iter()
            .map(|fid| fid.map_or(0.0, |fid| weights[fid]))
            .collect()
    }

    /// Most likely label sequence for `instance`.
    pub fn tag(&self, instance: &Instance, weights: &[f64], transitions: &[f64]) -> Vec<u32> {
        let state = self.state_scores(instance, weights);
        viterbi_decode(&state, transitions, self.num_labels)
    }

    /// Add `scale * (expected - observed)` feature counts for `instance` to
    /// `gradient` and return the weighted negative log-likelihood.
    pub fn accumulate_gradient(
        &self,
        instance: &Instance,
        weights: &[f64],
        transitions: &[f64],
        gradient: &mut [f64],
    ) -> f64 {
        let seq_len = instance.len();
        if seq_len == 0 {
            return 0.0;
        }
        let l = self.num_labels;
        let scale = instance.weight;
        let labels = instance.labels();

        let state = self.state_scores(instance, weights);
        let lattice = Lattice::forward_backward(&state, transitions, l);

        // Observed path score
        let mut path_score = 0.0;
        for t in 0..seq_len {
            path_score += state[t * l + labels[t] as usize];
            if t > 0 {
                path_score += transitions[labels[t - 1] as usize * l + labels[t] as usize];
            }
        }

        for (t, item) in instance.items().iter().enumerate() {
            for attr in &item.contents {
                for &(label, fid) in self.features.state_refs(attr.id) {
                    let mut g = lattice.state_marginal(t, label as usize) * attr.value;
                    if label == labels[t] {
                        g -= attr.value;
                    }
                    gradient[fid] += scale * g;
                }
            }
        }

        for from in 0..l {
            for to in 0..l {
                let Some(fid) = self.features.transition_ref(from as u32, to as u32) else {
                    continue;
                };
                let mut g = 0.0;
                for t in 1..seq_len {
                    g += lattice.transition_marginal(t, from, to, &state, transitions);
                    if labels[t - 1] as usize == from && labels[t] as usize == to {
                        g -= 1.0;
                    }
                }
                gradient[fid] += scale * g;
            }
        }

        scale * (lattice.log_norm - path_score)
    }
}

/// Forward and backward log-potentials of one sequence.
struct Lattice {
    alpha: Vec<f64>,
    beta: Vec<f64>,
    log_norm: f64,
    num_labels: usize,
}

impl Lattice {
    fn forward_backward(state: &[f64], transitions: &[f64], l: usize) -> Self {
        let seq_len = state.len() / l;
        let mut alpha = vec![f64::NEG_INFINITY; seq_len * l];
        let mut beta = vec![0.0; seq_len * l];
        let mut buf = vec![0.0; l];

        alpha[..l].copy_from_slice(&state[..l]);
        for t in 1..seq_len {
            for j in 0..l {
                for i in 0..l {
                    buf[i] = alpha[(t - 1) * l + i] + transitions[i * l + j];
                }
                alpha[t * l + j] = log_sum_exp(&buf) + state[t * l + j];
            }
        }

        for t in (0..seq_len - 1).rev() {
            for i in 0..l {
                for j in 0..l {
                    buf[j] = transitions[i * l + j] + state[(t + 1) * l + j] + beta[(t + 1) * l + j];
                }
                beta[t * l + i] = log_sum_exp(&buf);
            }
        }

        let log_norm = log_sum_exp(&alpha[(seq_len - 1) * l..]);
        Self {
            alpha,
            beta,
            log_norm,
            num_labels: l,
        }
    }

    fn state_marginal(&self, t: usize, label: usize) -> f64 {
        let idx = t * self.num_labels + label;
        (self.alpha[idx] + self.beta[idx] - self.log_norm).exp()
    }

    fn transition_marginal(
        &self,
        t: usize,
        from: usize,
        to: usize,
        state: &[f64],
        transitions: &[f64],
    ) -> f64 {
        let l = self.num_labels;
        (self.alpha[(t - 1) * l + from]
            + transitions[from * l + to]
            + state[t * l + to]
            + self.beta[t * l + to]
            - self.log_norm)
            .exp()
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Viterbi decoding over flat state and transition score matrices.
pub fn viterbi_decode(state: &[f64], transitions: &[f64], num_labels: usize) -> Vec<u32> {
    if state.is_empty() || num_labels == 0 {
        return vec![];
    }

    let seq_len = state.len() / num_labels;
    let mut viterbi = vec![f64::NEG_INFINITY; seq_len * num_labels];
    let mut backpointers = vec![0usize; seq_len * num_labels];

    // Initialize
    viterbi[..num_labels].copy_from_slice(&state[..num_labels]);

    // Forward pass
    for t in 1..seq_len {
        for j in 0..num_labels {
            let mut best_score = f64::NEG_INFINITY;
            let mut best_prev = 0;

            for i in 0..num_labels {
                let score = viterbi[(t - 1) * num_labels + i] + transitions[i * num_labels + j];
                if score > best_score {
                    best_score = score;
                    best_prev = i;
                }
            }

            viterbi[t * num_labels + j] = best_score + state[t * num_labels + j];
            backpointers[t * num_labels + j] = best_prev;
        }
    }

    // Backtrack
    let last_row = &viterbi[(seq_len - 1) * num_labels..];
    let mut best = 0;
    for (j, &score) in last_row.iter().enumerate() {
        if score > last_row[best] {
            best = j;
        }
    }

    let mut path = vec![0u32; seq_len];
    path[seq_len - 1] = best as u32;
    for t in (1..seq_len).rev() {
        best = backpointers[t * num_labels + best];
        path[t - 1] = best as u32;
    }

    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureKind, FeatureOptions};
    use seqlearn_core::{Attribute, Item};

    #[test]
    fn test_viterbi_follows_emissions() {
        let state = vec![0.1, 0.8, 0.1, 0.8, 0.1, 0.1];
        let transitions = vec![0.0; 9];

        let path = viterbi_decode(&state, &transitions, 3);
        assert_eq!(path, vec![1, 0]);
    }

    #[test]
    fn test_viterbi_transitions_override_weak_emissions() {
        // Position 1 slightly prefers label 0, but 1 -> 1 is strongly rewarded.
        let state = vec![0.0, 1.0, 0.2, 0.0];
        let transitions = vec![0.0, 0.0, -5.0, 2.0];

        let path = viterbi_decode(&state, &transitions, 2);
        assert_eq!(path, vec![1, 1]);
    }

    #[test]
    fn test_viterbi_empty() {
        assert!(viterbi_decode(&[], &[], 3).is_empty());
    }

    #[test]
    fn test_log_sum_exp() {
        let v = log_sum_exp(&[0.0, 0.0]);
        assert!((v - 2f64.ln()).abs() < 1e-12);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }

    fn toy() -> (Instance, FeatureSet) {
        let items = vec![
            Item::new(vec![Attribute::new(0, 1.0)]),
            Item::new(vec![Attribute::new(1, 1.0)]),
            Item::new(vec![Attribute::new(0, 0.5), Attribute::new(1, 1.0)]),
        ];
        let instance = Instance::from_parts(items, vec![0, 1, 1], 0).unwrap();
        let options = FeatureOptions {
            possible_states: true,
            possible_transitions: true,
            ..FeatureOptions::default()
        };
        let features = FeatureSet::generate(&[&instance], 2, 2, &options);
        (instance, features)
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let (instance, features) = toy();
        let crf = Crf1d::new(&features);
        let weights: Vec<f64> = (0..features.len()).map(|i| 0.1 * i as f64 - 0.3).collect();

        let objective = |w: &[f64]| {
            let trans = crf.transition_scores(w);
            let mut scratch = vec![0.0; w.len()];
            crf.accumulate_gradient(&instance, w, &trans, &mut scratch)
        };

        let mut gradient = vec![0.0; features.len()];
        let trans = crf.transition_scores(&weights);
        crf.accumulate_gradient(&instance, &weights, &trans, &mut gradient);

        let eps = 1e-6;
        for fid in 0..features.len() {
            let mut plus = weights.clone();
            plus[fid] += eps;
            let mut minus = weights.clone();
            minus[fid] -= eps;
            let numeric = (objective(&plus) - objective(&minus)) / (2.0 * eps);
            assert!(
                (numeric - gradient[fid]).abs() < 1e-5,
                "feature {}: analytic {} vs numeric {}",
                fid,
                gradient[fid],
                numeric
            );
        }
    }

    #[test]
    fn test_transition_scores_follow_transition_features() {
        let (_, features) = toy();
        let crf = Crf1d::new(&features);
        let weights: Vec<f64> = (0..features.len()).map(|i| i as f64 + 1.0).collect();

        let scores = crf.transition_scores(&weights);
        assert_eq!(scores.len(), 4);
        for (fid, kind) in features.iter() {
            if let FeatureKind::Transition { from, to } = kind {
                assert_eq!(scores[from as usize * 2 + to as usize], weights[fid]);
            }
        }
    }

    #[test]
    fn test_transition_scores_without_transition_features() {
        let items = vec![Item::new(vec![Attribute::new(0, 1.0)])];
        let instance = Instance::from_parts(items, vec![1], 0).unwrap();
        let features = FeatureSet::generate(&[&instance], 1, 2, &FeatureOptions::default());
        let crf = Crf1d::new(&features);

        // Only the state feature exists; its weight must not leak into the matrix.
        assert_eq!(crf.transition_scores(&[5.0]), vec![0.0; 4]);
    }

    #[test]
    fn test_negative_log_likelihood_is_positive() {
        let (instance, features) = toy();
        let crf = Crf1d::new(&features);
        let weights = vec![0.0; features.len()];
        let trans = crf.transition_scores(&weights);
        let mut gradient = vec![0.0; features.len()];

        // Uniform model over 2^3 paths
        let nll = crf.accumulate_gradient(&instance, &weights, &trans, &mut gradient);
        assert!((nll - 8f64.ln()).abs() < 1e-9);
    }
}
