//! # seqlearn core
//!
//! Data structures shared by the seqlearn trainers: the attribute and label
//! dictionaries, the encoded corpus, the training-data reader and the
//! trainer parameter schema.
//!
//! ## Quick Start
//!
//! ```rust
//! use seqlearn_core::{Corpus, Dictionary, IwaReader};
//!
//! let mut attributes = Dictionary::new();
//! let mut labels = Dictionary::new();
//! let mut corpus = Corpus::new();
//!
//! let data = "B-NP\tw=He\nB-VP\tw=reckons\n\n";
//! let stats = corpus
//!     .ingest(IwaReader::new(data.as_bytes(), "-"), &mut attributes, &mut labels, 0)
//!     .unwrap();
//!
//! assert_eq!(stats.instances, 1);
//! assert_eq!(corpus.total_items(), 2);
//! assert_eq!(labels.to_id("B-VP"), Some(1));
//! ```
pub mod corpus;
pub mod dictionary;
pub mod error;
pub mod params;
pub mod reader;

// Re-export primary API
pub use corpus::{Attribute, Corpus, IngestStats, Instance, Item, Split};
pub use dictionary::Dictionary;
pub use error::{ErrorKind, Result, SeqlearnError};
pub use params::{ParamKind, ParamSpec, ParamStore, ParamValue};
pub use reader::{DataReader, IwaReader, RawItem, Record};
