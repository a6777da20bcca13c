//! Input sources for the learn workflow.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use seqlearn_core::{Result, SeqlearnError};

/// One training data set named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Stdin,
    Path(PathBuf),
}

impl DataSource {
    /// `-` selects standard input.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            DataSource::Stdin
        } else {
            DataSource::Path(PathBuf::from(arg))
        }
    }

    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Open the source for line-oriented reading.
    pub fn open(&self) -> Result<Box<dyn BufRead>> {
        match self {
            DataSource::Stdin => Ok(Box::new(BufReader::new(io::stdin()))),
            DataSource::Path(path) => {
                let file = File::open(path).map_err(|source| SeqlearnError::SourceOpen {
                    source_name: path.display().to_string(),
                    source,
                })?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Stdin => f.write_str("-"),
            DataSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}
