use thiserror::Error;

/// Broad class of a [`SeqlearnError`], used by callers to decide how to
/// report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad option, unknown trainer or unknown/invalid parameter.
    Configuration,
    /// A source could not be opened or read, or a table ran out of ids.
    Resource,
    /// A malformed record in the training data.
    Data,
    /// The optimizer failed or had nothing to fit.
    Training,
}

/// Errors that can occur while building a corpus or training a model.
#[derive(Debug, Error)]
pub enum SeqlearnError {
    /// The selected trainer does not declare a parameter with this name.
    #[error("unknown parameter: {name}")]
    UnknownParameter {
        /// The offending parameter name.
        name: String,
    },

    /// The value could not be coerced to the parameter's type, or was rejected
    /// by its validator.
    #[error("invalid value {value:?} for parameter {name}: {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    /// No trainer is registered for this feature type and algorithm.
    #[error("no trainer registered for feature type {feature_type:?} and algorithm {algorithm:?}")]
    UnknownTrainer {
        feature_type: String,
        algorithm: String,
    },

    /// A data source could not be opened.
    #[error("failed to open the data set {source_name}: {source}")]
    SourceOpen {
        /// Path (or `-`) of the source as given by the user.
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while reading data or writing the model.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A dictionary cannot issue any more identifiers.
    #[error("dictionary is full ({capacity} entries)")]
    DictionaryFull { capacity: u64 },

    /// A record in the training data could not be parsed.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// An instance was built with a different number of items and labels.
    #[error("instance has {items} items but {labels} labels")]
    LengthMismatch { items: usize, labels: usize },

    /// There are no instances left to fit after the holdout split.
    #[error("no training instances available")]
    EmptyCorpus,

    /// The optimizer reported a failure.
    #[error("training failed: {0}")]
    TrainingFailed(String),

    /// The model could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SeqlearnError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SeqlearnError::UnknownParameter { .. }
            | SeqlearnError::InvalidParameter { .. }
            | SeqlearnError::UnknownTrainer { .. } => ErrorKind::Configuration,
            SeqlearnError::SourceOpen { .. }
            | SeqlearnError::Io(_)
            | SeqlearnError::DictionaryFull { .. } => ErrorKind::Resource,
            SeqlearnError::MalformedRecord { .. } | SeqlearnError::LengthMismatch { .. } => {
                ErrorKind::Data
            }
            SeqlearnError::EmptyCorpus
            | SeqlearnError::TrainingFailed(_)
            | SeqlearnError::Serialization(_) => ErrorKind::Training,
        }
    }
}

/// Result type alias for seqlearn operations.
pub type Result<T> = std::result::Result<T, SeqlearnError>;
