//! # seqlearn trainer
//!
//! Training side of seqlearn: the [`Trainer`] capability and its registry,
//! a first-order linear-chain CRF with L-BFGS and averaged perceptron
//! backends, holdout evaluation, and the learn workflow behind the
//! `seqlearn-learn` binary.
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use seqlearn_trainer::{DataSource, LearnConfig, TrainerRegistry, learn};
//!
//! let config = LearnConfig {
//!     sources: vec![DataSource::from_arg("train.txt")],
//!     ..LearnConfig::default()
//! };
//! let report = learn(&config, &TrainerRegistry::default(), Arc::new(Mutex::new(std::io::stdout())))?;
//! println!("{} instances", report.instances);
//! # Ok::<(), seqlearn_core::SeqlearnError>(())
//! ```

pub mod cli;
pub mod crf1d;
pub mod data;
pub mod evaluation;
pub mod features;
pub mod lbfgs;
pub mod learn;
pub mod model;
pub mod perceptron;
pub mod trainer;

pub use cli::LearnArgs;
pub use crf1d::{Crf1d, viterbi_decode};
pub use data::DataSource;
pub use evaluation::{Evaluation, LabelCounts};
pub use features::{FeatureKind, FeatureOptions, FeatureSet};
pub use lbfgs::LbfgsTrainer;
pub use learn::{LearnConfig, LearnReport, ParamOverride, configure_trainer, learn};
pub use model::CrfModel;
pub use perceptron::AveragedPerceptronTrainer;
pub use trainer::{ProgressCallback, TrainSummary, Trainer, TrainerFactory, TrainerRegistry, TrainingData};
