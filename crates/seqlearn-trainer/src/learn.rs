//! The learn workflow: read data sets, train, and publish a model.
//!
//! Trainer selection and parameter overrides are resolved before any data
//! source is opened, so configuration mistakes surface before ingestion.
//! Everything the workflow allocates is owned by [`learn`] and dropped on
//! return, including early returns through `?`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use seqlearn_core::{Corpus, Dictionary, IwaReader, Result};
use tracing::{info, warn};

use crate::data::DataSource;
use crate::trainer::{TrainSummary, Trainer, TrainerRegistry, TrainingData};

pub const DEFAULT_MODEL_PATH: &str = "seqlearn.model";
pub const DEFAULT_FEATURE_TYPE: &str = "dyad";
pub const DEFAULT_ALGORITHM: &str = "lbfgs";

/// One `name=value` parameter assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamOverride {
    pub name: String,
    pub value: String,
}

impl ParamOverride {
    /// Split on the first `=`. Without one, the value is empty.
    pub fn parse(raw: &str) -> Self {
        let (name, value) = raw.split_once('=').unwrap_or((raw, ""));
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Resolved configuration of one learn run.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnConfig {
    pub model_path: PathBuf,
    pub feature_type: String,
    pub algorithm: String,
    /// Zero-based group index held out for evaluation.
    pub holdout: Option<usize>,
    /// Applied in order; a later override of the same name wins.
    pub params: Vec<ParamOverride>,
    /// Empty means standard input.
    pub sources: Vec<DataSource>,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            feature_type: DEFAULT_FEATURE_TYPE.to_string(),
            algorithm: DEFAULT_ALGORITHM.to_string(),
            holdout: None,
            params: Vec::new(),
            sources: Vec::new(),
        }
    }
}

/// Statistics of a completed run.
#[derive(Debug, Clone)]
pub struct LearnReport {
    pub instances: usize,
    pub items: usize,
    pub attributes: usize,
    pub labels: usize,
    pub read_time: Duration,
    pub summary: TrainSummary,
}

/// Create the configured trainer and apply every parameter override.
pub fn configure_trainer(
    config: &LearnConfig,
    registry: &TrainerRegistry,
) -> Result<Box<dyn Trainer>> {
    let mut trainer = registry.create(&config.feature_type, &config.algorithm)?;
    for param in &config.params {
        trainer.params().set(&param.name, &param.value)?;
    }
    Ok(trainer)
}

fn lock<W>(out: &Mutex<W>) -> MutexGuard<'_, W> {
    out.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn emit<W: Write>(out: &Mutex<W>, text: &str) -> Result<()> {
    let mut out = lock(out);
    out.write_all(text.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Sources in argument order, or standard input alone when none are given.
fn input_sources(config: &LearnConfig) -> Vec<DataSource> {
    if config.sources.is_empty() {
        vec![DataSource::Stdin]
    } else {
        config.sources.clone()
    }
}

fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Run the learn workflow, writing progress text to `out`.
pub fn learn<W>(
    config: &LearnConfig,
    registry: &TrainerRegistry,
    out: Arc<Mutex<W>>,
) -> Result<LearnReport>
where
    W: Write + Send + 'static,
{
    let mut attributes = Dictionary::new();
    let mut labels = Dictionary::new();
    let mut corpus = Corpus::new();
    let mut trainer = configure_trainer(config, registry)?;
    info!(trainer = trainer.name(), "trainer configured");

    emit(&out, &format!("Start time of the training: {}\n\n", timestamp()))?;

    emit(&out, "Reading the data set(s)\n")?;
    let clock = Instant::now();
    for (group, source) in input_sources(config).iter().enumerate() {
        let name = source.name();
        let reader = IwaReader::new(source.open()?, name.as_str());
        emit(&out, &format!("{} - {}\n", group + 1, name))?;
        let stats = corpus.ingest(reader, &mut attributes, &mut labels, group)?;
        if stats.skipped > 0 {
            emit(
                &out,
                &format!("WARNING: {} malformed lines skipped in {}\n", stats.skipped, name),
            )?;
        }
    }
    let read_time = clock.elapsed();

    emit(
        &out,
        &format!(
            "Number of instances: {}\nTotal number of items: {}\nNumber of attributes: {}\nNumber of labels: {}\nSeconds required: {:.3}\n\n",
            corpus.len(),
            corpus.total_items(),
            attributes.len(),
            labels.len(),
            read_time.as_secs_f64()
        ),
    )?;
    info!(
        instances = corpus.len(),
        items = corpus.total_items(),
        attributes = attributes.len(),
        labels = labels.len(),
        "data sets read"
    );

    let holdout = match config.holdout {
        Some(group) if !corpus.has_group(group) => {
            warn!(group, "holdout group matches no instance; training without holdout");
            emit(
                &out,
                &format!(
                    "WARNING: holdout group {} matches no instance; training without holdout\n\n",
                    group + 1
                ),
            )?;
            None
        }
        other => other,
    };

    let sink = Arc::clone(&out);
    trainer.set_progress_callback(Box::new(move |message: &str| {
        let mut out = lock(&sink);
        if let Err(e) = out.write_all(message.as_bytes()).and_then(|()| out.flush()) {
            warn!(error = %e, "failed to write progress");
        }
    }));

    let data = TrainingData {
        corpus: &corpus,
        attributes: &attributes,
        labels: &labels,
    };
    let summary = trainer.train(&data, &config.model_path, holdout)?;

    emit(&out, &format!("End time of the training: {}\n\n", timestamp()))?;

    Ok(LearnReport {
        instances: corpus.len(),
        items: corpus.total_items(),
        attributes: attributes.len(),
        labels: labels.len(),
        read_time,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use seqlearn_core::SeqlearnError;

    #[test]
    fn test_override_splits_on_first_equals() {
        assert_eq!(
            ParamOverride::parse("feature.minfreq=2=3"),
            ParamOverride {
                name: "feature.minfreq".to_string(),
                value: "2=3".to_string(),
            }
        );
        assert_eq!(ParamOverride::parse("c2").value, "");
        assert_eq!(ParamOverride::parse("c2=").value, "");
    }

    #[test]
    fn test_default_config() {
        let config = LearnConfig::default();
        assert_eq!(config.model_path, PathBuf::from("seqlearn.model"));
        assert_eq!(config.algorithm, "lbfgs");
        assert_eq!(config.feature_type, "dyad");
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_no_sources_falls_back_to_stdin_as_group_zero() {
        let sources = input_sources(&LearnConfig::default());
        assert_eq!(sources, vec![DataSource::Stdin]);

        let mut corpus = Corpus::new();
        let mut attributes = Dictionary::new();
        let mut labels = Dictionary::new();
        for (group, source) in sources.iter().enumerate() {
            let data = "B\tw=a\nO\tw=b\n";
            let reader = IwaReader::new(data.as_bytes(), source.name());
            corpus
                .ingest(reader, &mut attributes, &mut labels, group)
                .unwrap();
        }

        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.groups(), vec![0]);
        assert_eq!(corpus.split(Some(0)).holdout.len(), 1);
    }

    #[test]
    fn test_sources_keep_argument_order() {
        let config = LearnConfig {
            sources: vec![DataSource::from_arg("b.txt"), DataSource::from_arg("-")],
            ..LearnConfig::default()
        };
        assert_eq!(input_sources(&config), config.sources);
    }

    #[test]
    fn test_later_override_wins() {
        let config = LearnConfig {
            params: vec![ParamOverride::parse("c2=0.5"), ParamOverride::parse("c2=2")],
            ..LearnConfig::default()
        };
        let mut trainer = configure_trainer(&config, &TrainerRegistry::default()).unwrap();
        assert_eq!(trainer.params().get("c2").as_deref(), Some("2"));
    }

    #[test]
    fn test_unknown_algorithm_fails_before_output() {
        let config = LearnConfig {
            algorithm: "sgd".to_string(),
            ..LearnConfig::default()
        };
        let out = Arc::new(Mutex::new(Vec::new()));
        let err = learn(&config, &TrainerRegistry::default(), Arc::clone(&out)).unwrap_err();

        assert!(matches!(err, SeqlearnError::UnknownTrainer { .. }));
        assert!(out.lock().unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_override_round_trips_name_and_value(
            name in "[a-z.]{1,12}",
            value in "[ -~]{0,12}",
        ) {
            let parsed = ParamOverride::parse(&format!("{}={}", name, value));
            prop_assert_eq!(parsed.name, name);
            prop_assert_eq!(parsed.value, value);
        }
    }
}
