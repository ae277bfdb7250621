//! Location catalog supplied by the building directory.
//!
//! The catalog is immutable for the lifetime of a session; replacing it
//! invalidates every anchor resolved from the previous one.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::geometry::GeoCoordinate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub icon_url: Option<String>,
}

/// One building or point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub id: i64,
    pub name: String,
    pub category: Category,
    pub coordinate: GeoCoordinate,
}

/// Ordered, shareable list of locations.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Arc<[LocationEntry]>,
}

impl Catalog {
    pub fn new(entries: Vec<LocationEntry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let entries: Vec<LocationEntry> = serde_json::from_str(&text)
            .with_context(|| format!("parsing catalog {}", path.display()))?;
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[LocationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<LocationEntry>> for Catalog {
    fn from(entries: Vec<LocationEntry>) -> Self {
        Self::new(entries)
    }
}
