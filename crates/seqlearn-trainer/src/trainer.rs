//! Trainer capability and the registry that selects a trainer by name.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use seqlearn_core::{Corpus, Dictionary, Instance, ParamStore, Result, SeqlearnError, Split};
use tracing::warn;

use crate::crf1d::Crf1d;
use crate::evaluation::Evaluation;
use crate::features::{FeatureOptions, FeatureSet};
use crate::lbfgs::LbfgsTrainer;
use crate::model::CrfModel;
use crate::perceptron::AveragedPerceptronTrainer;

/// Sink for human-readable progress text. Messages carry their own newlines.
pub type ProgressCallback = Box<dyn FnMut(&str) + Send>;

/// Data borrowed by a trainer for the duration of one `train` call.
#[derive(Clone, Copy)]
pub struct TrainingData<'a> {
    pub corpus: &'a Corpus,
    pub attributes: &'a Dictionary,
    pub labels: &'a Dictionary,
}

/// Outcome of a successful training run.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub iterations: usize,
    /// Final value of the training objective.
    pub loss: f64,
    /// Whether a stopping criterion fired before the iteration limit.
    pub converged: bool,
    pub num_features: usize,
    /// Number of instances excluded from fitting.
    pub holdout_instances: usize,
    /// Evaluation on the holdout slice after the last iteration.
    pub evaluation: Option<Evaluation>,
    pub model_path: PathBuf,
}

/// An optimization backend.
///
/// Parameters are configured through [`Trainer::params`] before
/// [`Trainer::train`] is called. The trainer must not keep references to the
/// training data after `train` returns.
pub trait Trainer {
    /// Registry key of this trainer, e.g. `dyad/lbfgs`.
    fn name(&self) -> &str;

    fn params(&mut self) -> &mut ParamStore;

    /// Register a sink for progress messages emitted during `train`.
    fn set_progress_callback(&mut self, callback: ProgressCallback);

    /// Fit a model and write it to `output`.
    ///
    /// Instances whose group equals `holdout` are excluded from fitting and
    /// used for evaluation instead.
    fn train(
        &mut self,
        data: &TrainingData<'_>,
        output: &Path,
        holdout: Option<usize>,
    ) -> Result<TrainSummary>;
}

/// Forwards progress text to the registered callback, if any.
#[derive(Default)]
pub struct Progress {
    callback: Option<ProgressCallback>,
}

impl Progress {
    pub fn set(&mut self, callback: ProgressCallback) {
        self.callback = Some(callback);
    }

    pub fn emit(&mut self, message: &str) {
        if let Some(callback) = self.callback.as_mut() {
            callback(message);
        }
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Split the corpus for fitting, reporting a holdout group with no instances.
pub(crate) fn split_for_training<'a>(
    data: &TrainingData<'a>,
    holdout: Option<usize>,
    progress: &mut Progress,
) -> Result<Split<'a>> {
    let split = data.corpus.split(holdout);

    if let Some(group) = holdout {
        if split.holdout.is_empty() {
            warn!(group, "holdout group matches no instance; training without holdout");
            progress.emit(&format!(
                "WARNING: holdout group {} matches no instance; training without holdout\n",
                group + 1
            ));
        }
    }

    if split.train.is_empty() {
        return Err(SeqlearnError::EmptyCorpus);
    }
    Ok(split)
}

/// Generate features from the fitting slice and report their number.
pub(crate) fn generate_features(
    split: &Split<'_>,
    data: &TrainingData<'_>,
    options: &FeatureOptions,
    progress: &mut Progress,
) -> FeatureSet {
    let clock = Instant::now();
    progress.emit("Feature generation\n");
    let features = FeatureSet::generate(
        &split.train,
        data.attributes.len(),
        data.labels.len(),
        options,
    );
    if features.dropped > 0 {
        warn!(dropped = features.dropped, "features below feature.minfreq were dropped");
        progress.emit(&format!(
            "WARNING: {} features below feature.minfreq were dropped\n",
            features.dropped
        ));
    }
    progress.emit(&format!(
        "Number of features: {}\nSeconds required: {:.3}\n\n",
        features.len(),
        clock.elapsed().as_secs_f64()
    ));
    features
}

/// Decode `instances` with the current weights.
pub(crate) fn evaluate(crf: &Crf1d<'_>, instances: &[&Instance], weights: &[f64]) -> Evaluation {
    let transitions = crf.transition_scores(weights);
    let mut evaluation = Evaluation::new(crf.num_labels());
    for instance in instances {
        let predicted = crf.tag(instance, weights, &transitions);
        evaluation.add(instance.labels(), &predicted);
    }
    evaluation
}

/// Build the model from trained weights and publish it at `output`.
pub(crate) fn publish(
    feature_type: &str,
    features: &FeatureSet,
    weights: &[f64],
    data: &TrainingData<'_>,
    output: &Path,
    progress: &mut Progress,
) -> Result<()> {
    let model = CrfModel::from_weights(feature_type, features, weights, data.attributes, data.labels);
    progress.emit(&format!(
        "Storing the model\nNumber of active attributes: {}\nNumber of active state features: {}\n",
        model.attributes.len(),
        model.state_weights.len()
    ));
    model.save(output)?;
    progress.emit(&format!("Model written to {}\n\n", output.display()));
    Ok(())
}

/// Constructor for a registered trainer.
pub type TrainerFactory = fn() -> Box<dyn Trainer>;

/// Trainers available by `(feature type, algorithm)`.
pub struct TrainerRegistry {
    factories: BTreeMap<(String, String), TrainerFactory>,
}

impl TrainerRegistry {
    /// A registry with no trainers.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, feature_type: &str, algorithm: &str, factory: TrainerFactory) {
        self.factories
            .insert((feature_type.to_string(), algorithm.to_string()), factory);
    }

    pub fn create(&self, feature_type: &str, algorithm: &str) -> Result<Box<dyn Trainer>> {
        self.factories
            .get(&(feature_type.to_string(), algorithm.to_string()))
            .map(|factory| factory())
            .ok_or_else(|| SeqlearnError::UnknownTrainer {
                feature_type: feature_type.to_string(),
                algorithm: algorithm.to_string(),
            })
    }

    /// Registered keys as `feature_type/algorithm`.
    pub fn available(&self) -> Vec<String> {
        self.factories
            .keys()
            .map(|(feature_type, algorithm)| format!("{}/{}", feature_type, algorithm))
            .collect()
    }
}

impl Default for TrainerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("dyad", "lbfgs", LbfgsTrainer::boxed);
        registry.register("dyad", "ap", AveragedPerceptronTrainer::boxed);
        registry
    }
}
