//! # Encoded corpus
//!
//! Labeled sequences whose attributes and labels have been resolved to
//! dictionary ids at ingestion time.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dictionary::Dictionary;
use crate::error::{Result, SeqlearnError};
use crate::reader::DataReader;

/// A weighted reference to an attribute id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: u32,
    pub value: f64,
}

impl Attribute {
    pub fn new(id: u32, value: f64) -> Self {
        Self { id, value }
    }
}

/// The attributes observed at one position of a sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub contents: Vec<Attribute>,
}

impl Item {
    pub fn new(contents: Vec<Attribute>) -> Self {
        Self { contents }
    }
}

/// One labeled sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "InstanceParts")]
pub struct Instance {
    items: Vec<Item>,
    labels: Vec<u32>,
    /// Index of the source this instance was read from.
    pub group: usize,
    pub weight: f64,
}

/// Serialized form of [`Instance`], checked by `from_parts` on the way in.
#[derive(Deserialize)]
struct InstanceParts {
    items: Vec<Item>,
    labels: Vec<u32>,
    group: usize,
    #[serde(default = "default_weight")]
    weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl TryFrom<InstanceParts> for Instance {
    type Error = SeqlearnError;

    fn try_from(parts: InstanceParts) -> Result<Self> {
        let mut instance = Instance::from_parts(parts.items, parts.labels, parts.group)?;
        instance.weight = parts.weight;
        Ok(instance)
    }
}

impl Instance {
    /// Create an empty instance belonging to `group`.
    pub fn new(group: usize) -> Self {
        Self {
            items: Vec::new(),
            labels: Vec::new(),
            group,
            weight: 1.0,
        }
    }

    /// Build an instance from parallel item and label sequences.
    pub fn from_parts(items: Vec<Item>, labels: Vec<u32>, group: usize) -> Result<Self> {
        if items.len() != labels.len() {
            return Err(SeqlearnError::LengthMismatch {
                items: items.len(),
                labels: labels.len(),
            });
        }
        Ok(Self {
            items,
            labels,
            group,
            weight: 1.0,
        })
    }

    /// Append one position.
    pub fn push(&mut self, item: Item, label: u32) {
        self.items.push(item);
        self.labels.push(label);
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Counts reported by [`Corpus::ingest`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub instances: usize,
    pub items: usize,
    /// Malformed lines the reader skipped.
    pub skipped: usize,
}

/// Training/holdout partition of a corpus.
#[derive(Debug, Default)]
pub struct Split<'a> {
    pub train: Vec<&'a Instance>,
    pub holdout: Vec<&'a Instance>,
}

/// Ordered collection of encoded instances.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    instances: Vec<Instance>,
    total_items: usize,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instance: Instance) {
        self.total_items += instance.len();
        self.instances.push(instance);
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Sum of item counts over all instances.
    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.instances.iter()
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Distinct group indices, ascending.
    pub fn groups(&self) -> Vec<usize> {
        let mut groups: Vec<usize> = self.instances.iter().map(|i| i.group).collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }

    pub fn has_group(&self, group: usize) -> bool {
        self.instances.iter().any(|i| i.group == group)
    }

    /// Partition into fitting and holdout slices. With `None`, every instance
    /// is used for fitting.
    pub fn split(&self, holdout: Option<usize>) -> Split<'_> {
        let mut split = Split::default();
        for instance in &self.instances {
            if Some(instance.group) == holdout {
                split.holdout.push(instance);
            } else {
                split.train.push(instance);
            }
        }
        split
    }

    /// Encode every record from `reader` and append it, tagged with `group`.
    ///
    /// Unseen attribute and label tokens are inserted into their dictionaries.
    pub fn ingest<R: DataReader>(
        &mut self,
        mut reader: R,
        attributes: &mut Dictionary,
        labels: &mut Dictionary,
        group: usize,
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::default();

        while let Some(record) = reader.next_record()? {
            let mut instance = Instance::new(group);
            instance.weight = record.weight;

            for raw in record.items {
                let mut contents = Vec::with_capacity(raw.attributes.len());
                for (name, value) in &raw.attributes {
                    contents.push(Attribute::new(attributes.get_or_insert(name)?, *value));
                }
                let label = labels.get_or_insert(&raw.label)?;
                instance.push(Item::new(contents), label);
            }

            stats.instances += 1;
            stats.items += instance.len();
            self.push(instance);
        }

        stats.skipped = reader.skipped();
        debug!(
            group,
            instances = stats.instances,
            items = stats.items,
            skipped = stats.skipped,
            "ingested source"
        );
        Ok(stats)
    }
}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a Instance;
    type IntoIter = std::slice::Iter<'a, Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.iter()
    }
}
