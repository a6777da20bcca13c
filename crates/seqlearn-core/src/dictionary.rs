//! # Dictionary
//!
//! Bidirectional, append-only symbol table mapping strings to dense integer
//! identifiers. The Nth distinct string inserted receives id `N - 1`; ids are
//! never reused or renumbered.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, SeqlearnError};

/// Bidirectional string ⇄ id table.
///
/// Each token is stored once and shared between both directions.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    ids: HashMap<Arc<str>, u32>,
    tokens: Vec<Arc<str>>,
}

impl Dictionary {
    /// Largest number of entries a dictionary can hold.
    pub const CAPACITY: u64 = u32::MAX as u64 + 1;

    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of `token`, inserting it with the next unused id if it
    /// has not been seen before.
    pub fn get_or_insert(&mut self, token: &str) -> Result<u32> {
        if let Some(&id) = self.ids.get(token) {
            return Ok(id);
        }

        let id = u32::try_from(self.tokens.len()).map_err(|_| SeqlearnError::DictionaryFull {
            capacity: Self::CAPACITY,
        })?;

        let token: Arc<str> = Arc::from(token);
        self.ids.insert(Arc::clone(&token), id);
        self.tokens.push(token);
        Ok(id)
    }

    /// Look up `token` without inserting it.
    pub fn to_id(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }

    /// Return the token registered under `id`.
    pub fn to_string(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(|t| t.as_ref())
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterate over `(id, token)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.tokens
            .iter()
            .enumerate()
            .map(|(id, token)| (id as u32, token.as_ref()))
    }
}
