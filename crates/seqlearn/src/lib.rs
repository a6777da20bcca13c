//! # seqlearn
//!
//! Supervised sequence-labeling trainer. This crate re-exports the data
//! layer from [`seqlearn_core`] and the training workflow from
//! [`seqlearn_trainer`].

pub use seqlearn_core::*;
pub use seqlearn_trainer::{
    AveragedPerceptronTrainer, CrfModel, DataSource, Evaluation, LbfgsTrainer, LearnConfig,
    LearnReport, ParamOverride, TrainSummary, Trainer, TrainerRegistry, TrainingData,
    configure_trainer, learn,
};
