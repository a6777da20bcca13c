//! Command-line surface of the `seqlearn-learn` binary.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use seqlearn_core::{ErrorKind, SeqlearnError};
use tracing::info;

use crate::data::DataSource;
use crate::learn::{
    DEFAULT_ALGORITHM, DEFAULT_FEATURE_TYPE, DEFAULT_MODEL_PATH, LearnConfig, ParamOverride,
    configure_trainer, learn,
};
use crate::trainer::TrainerRegistry;

/// Train a sequence labeling model from data sets in attribute-value format.
///
/// If DATA is omitted or `-`, the data set is read from standard input.
#[derive(Parser, Debug, Clone)]
#[command(name = "seqlearn-learn")]
#[command(version)]
pub struct LearnArgs {
    /// Training data sets, one group per file
    #[arg(value_name = "DATA")]
    pub data: Vec<String>,

    /// Store the obtained model in this file
    #[arg(short, long, env = "SEQLEARN_MODEL", default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,

    /// Training algorithm
    #[arg(short, long, env = "SEQLEARN_ALGORITHM", default_value = DEFAULT_ALGORITHM)]
    pub algorithm: String,

    /// Graphical model type
    #[arg(short, long, default_value = DEFAULT_FEATURE_TYPE)]
    pub feature: String,

    /// Hold out the N-th data set (1-based) for evaluation; 0 disables
    #[arg(short, long, value_name = "N", default_value_t = 0, allow_negative_numbers = true)]
    pub test: i64,

    /// Set a training parameter
    #[arg(short, long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// List the parameters of the selected trainer and exit
    #[arg(short = 'H', long)]
    pub help_params: bool,
}

/// Top-level message for a failed run, by error class.
fn failure_context(err: &SeqlearnError) -> &'static str {
    match err.kind() {
        ErrorKind::Configuration => "invalid configuration",
        ErrorKind::Resource => "failed to read the training data",
        ErrorKind::Data => "malformed training data",
        ErrorKind::Training => "training failed",
    }
}

impl LearnArgs {
    pub fn into_config(self) -> LearnConfig {
        let holdout = if self.test > 0 {
            Some((self.test - 1) as usize)
        } else {
            None
        };

        LearnConfig {
            model_path: self.model,
            feature_type: self.feature,
            algorithm: self.algorithm,
            holdout,
            params: self.params.iter().map(|p| ParamOverride::parse(p)).collect(),
            sources: self.data.iter().map(|d| DataSource::from_arg(d)).collect(),
        }
    }

    pub fn run(self) -> Result<()> {
        let help_params = self.help_params;
        let config = self.into_config();
        let registry = TrainerRegistry::default();

        if help_params {
            let mut trainer = configure_trainer(&config, &registry).with_context(|| {
                format!(
                    "failed to create the trainer {}/{}",
                    config.feature_type, config.algorithm
                )
            })?;
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "PARAMETERS for {}:", trainer.name())?;
            write!(stdout, "{}", trainer.params().describe())?;
            return Ok(());
        }

        let report = learn(&config, &registry, Arc::new(Mutex::new(io::stdout()))).map_err(|e| {
            let context = failure_context(&e);
            anyhow::Error::new(e).context(context)
        })?;
        info!(
            model = %report.summary.model_path.display(),
            iterations = report.summary.iterations,
            "model stored"
        );
        Ok(())
    }
}
