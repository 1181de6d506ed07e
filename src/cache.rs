//! File-backed ticker → CIK cache with an explicit load/save lifecycle.
//!
//! The cache is an ordinary value: load it from disk, hand it to
//! [`SecClient`](crate::SecClient), and save it back when done. Nothing here
//! touches global state.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Resolved ticker → CIK mappings, persisted as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TickerCache {
    entries: HashMap<String, String>,
}

impl TickerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a cache from disk. A missing file yields an empty cache;
    /// unreadable or malformed contents are an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persists the cache, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Looks up a ticker, case-insensitively.
    pub fn get(&self, ticker: &str) -> Option<&str> {
        self.entries.get(&ticker.to_uppercase()).map(String::as_str)
    }

    pub fn insert(&mut self, ticker: &str, cik: impl Into<String>) {
        self.entries.insert(ticker.to_uppercase(), cik.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
