//! Averaged perceptron training for the first-order CRF.
//!
//! Each epoch visits the fitting slice in a seeded random order. An instance
//! whose Viterbi path differs from the reference moves weight from the
//! predicted features to the reference features. The published weights are
//! the average of the weight vector over every visited instance.

use std::path::Path;
use std::time::Instant;

use oorandom::Rand32;
use seqlearn_core::params::{non_negative, positive};
use seqlearn_core::{Instance, ParamSpec, ParamStore, Result};
use tracing::info;

use crate::crf1d::Crf1d;
use crate::features::{FeatureOptions, FeatureSet};
use crate::trainer::{
    Progress, ProgressCallback, TrainSummary, Trainer, TrainingData, evaluate, generate_features,
    publish, split_for_training,
};

const FEATURE_TYPE: &str = "dyad";

/// Averaged perceptron trainer.
#[derive(Debug)]
pub struct AveragedPerceptronTrainer {
    params: ParamStore,
    progress: Progress,
}

#[derive(Debug, Clone)]
struct Settings {
    max_iterations: usize,
    epsilon: f64,
    seed: u64,
}

impl Settings {
    fn from_params(params: &ParamStore) -> Result<Self> {
        Ok(Self {
            max_iterations: params.get_int("maxiterations")? as usize,
            epsilon: params.get_float("epsilon")?,
            seed: params.get_int("shuffle.seed")? as u64,
        })
    }
}

impl AveragedPerceptronTrainer {
    pub fn new() -> Self {
        let mut specs = vec![
            ParamSpec::int("maxiterations", 100, "Maximum number of epochs")
                .with_validator(positive),
            ParamSpec::float(
                "epsilon",
                0.0,
                "Stop when the ratio of mislabeled items in an epoch falls below this value",
            )
            .with_validator(non_negative),
            ParamSpec::int("shuffle.seed", 0, "Seed of the per-epoch instance shuffle")
                .with_validator(non_negative),
        ];
        specs.extend(FeatureOptions::param_specs());

        Self {
            params: ParamStore::new(specs),
            progress: Progress::default(),
        }
    }

    pub fn boxed() -> Box<dyn Trainer> {
        Box::new(Self::new())
    }
}

impl Default for AveragedPerceptronTrainer {
    fn default() -> Self {
        Self::new()
    }
}

/// Running weights plus the bookkeeping needed to average them lazily.
struct Averaged {
    weights: Vec<f64>,
    /// Sum of `c * delta` over every update.
    scaled: Vec<f64>,
    /// Number of visited instances plus one.
    c: f64,
}

impl Averaged {
    fn new(n: usize) -> Self {
        Self {
            weights: vec![0.0; n],
            scaled: vec![0.0; n],
            c: 1.0,
        }
    }

    fn add(&mut self, fid: usize, delta: f64) {
        self.weights[fid] += delta;
        self.scaled[fid] += self.c * delta;
    }

    fn averaged(&self) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.scaled)
            .map(|(w, s)| w - s / self.c)
            .collect()
    }
}

fn state_feature(features: &FeatureSet, attribute: u32, label: u32) -> Option<usize> {
    features
        .state_refs(attribute)
        .iter()
        .find(|(l, _)| *l == label)
        .map(|&(_, fid)| fid)
}

/// Apply one perceptron update and return the number of mislabeled items.
fn update(features: &FeatureSet, instance: &Instance, predicted: &[u32], model: &mut Averaged) -> usize {
    let reference = instance.labels();
    let scale = instance.weight;
    let mut errors = 0;

    for (t, item) in instance.items().iter().enumerate() {
        let (gold, pred) = (reference[t], predicted[t]);
        if gold != pred {
            errors += 1;
            for attr in &item.contents {
                let delta = attr.value * scale;
                if let Some(fid) = state_feature(features, attr.id, gold) {
                    model.add(fid, delta);
                }
                if let Some(fid) = state_feature(features, attr.id, pred) {
                    model.add(fid, -delta);
                }
            }
        }
        if t > 0 {
            let gold_edge = (reference[t - 1], gold);
            let pred_edge = (predicted[t - 1], pred);
            if gold_edge != pred_edge {
                if let Some(fid) = features.transition_ref(gold_edge.0, gold_edge.1) {
                    model.add(fid, scale);
                }
                if let Some(fid) = features.transition_ref(pred_edge.0, pred_edge.1) {
                    model.add(fid, -scale);
                }
            }
        }
    }
    errors
}

/// In-place Fisher-Yates shuffle.
fn shuffle(order: &mut [usize], rng: &mut Rand32) {
    for i in (1..order.len()).rev() {
        let j = rng.rand_range(0..(i as u32 + 1)) as usize;
        order.swap(i, j);
    }
}

impl Trainer for AveragedPerceptronTrainer {
    fn name(&self) -> &str {
        "dyad/ap"
    }

    fn params(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress.set(callback);
    }

    fn train(
        &mut self,
        data: &TrainingData<'_>,
        output: &Path,
        holdout: Option<usize>,
    ) -> Result<TrainSummary> {
        let settings = Settings::from_params(&self.params)?;
        let options = FeatureOptions::from_params(&self.params)?;
        let split = split_for_training(data, holdout, &mut self.progress)?;
        let progress = &mut self.progress;

        let features = generate_features(&split, data, &options, progress);
        progress.emit(&format!(
            "Averaged perceptron\nmax_iterations: {}\nepsilon: {}\nshuffle.seed: {}\n\n",
            settings.max_iterations, settings.epsilon, settings.seed
        ));

        let crf = Crf1d::new(&features);
        let total_items: usize = split.train.iter().map(|instance| instance.len()).sum();
        let mut model = Averaged::new(features.len());
        let mut rng = Rand32::new(settings.seed);
        let mut order: Vec<usize> = (0..split.train.len()).collect();

        let mut iterations = 0;
        let mut loss = 0.0;
        let mut converged = false;
        let mut evaluation = None;
        let train_clock = Instant::now();

        while iterations < settings.max_iterations {
            let epoch_clock = Instant::now();
            shuffle(&mut order, &mut rng);

            let mut errors = 0;
            for &index in &order {
                let instance = split.train[index];
                let transitions = crf.transition_scores(&model.weights);
                let predicted = crf.tag(instance, &model.weights, &transitions);
                errors += update(&features, instance, &predicted, &mut model);
                model.c += 1.0;
            }

            iterations += 1;
            loss = errors as f64;
            let averaged = model.averaged();
            let norm = averaged.iter().map(|w| w * w).sum::<f64>().sqrt();
            progress.emit(&format!(
                "***** Epoch #{} *****\nLoss: {}\nFeature norm: {:.6}\nSeconds required for this iteration: {:.3}\n",
                iterations,
                errors,
                norm,
                epoch_clock.elapsed().as_secs_f64()
            ));

            if !split.holdout.is_empty() {
                let eval = evaluate(&crf, &split.holdout, &averaged);
                progress.emit(&eval.report(data.labels));
                evaluation = Some(eval);
            }
            progress.emit("\n");

            let ratio = if total_items > 0 { loss / total_items as f64 } else { 0.0 };
            if errors == 0 || ratio < settings.epsilon {
                converged = true;
                break;
            }
        }

        let seconds = train_clock.elapsed().as_secs_f64();
        if converged {
            progress.emit("Averaged perceptron resulted in convergence\n");
        } else {
            progress.emit("Averaged perceptron reached the maximum number of epochs\n");
        }
        progress.emit(&format!("Total seconds required for training: {:.3}\n\n", seconds));
        info!(iterations, loss, converged, "averaged perceptron finished");

        publish(FEATURE_TYPE, &features, &model.averaged(), data, output, progress)?;

        Ok(TrainSummary {
            iterations,
            loss,
            converged,
            num_features: features.len(),
            holdout_instances: split.holdout.len(),
            evaluation,
            model_path: output.to_path_buf(),
        })
    }
}
