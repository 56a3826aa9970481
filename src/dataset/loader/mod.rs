//! Edge-list files.

#[cfg(feature = "csv")]
pub mod csv;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::partition::Edge;

/// Layout of an edge-list file with `src,dst[,weight]` rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeListConfig {
    /// First row is a header
    pub has_header: bool,
    /// Field delimiter
    pub delimiter: char,
    /// Lines starting with this character are skipped
    pub comment_char: Option<char>,
}

impl Default for EdgeListConfig {
    fn default() -> Self {
        EdgeListConfig {
            has_header: false,
            delimiter: ',',
            comment_char: Some('#'),
        }
    }
}

/// Reads an edge list from disk.
#[derive(Debug, Clone, Default)]
pub struct EdgeListLoader {
    config: EdgeListConfig,
}

impl EdgeListLoader {
    pub fn new(config: EdgeListConfig) -> Self {
        EdgeListLoader { config }
    }

    pub fn config(&self) -> &EdgeListConfig {
        &self.config
    }

    /// Read every edge in file order.
    #[cfg(feature = "csv")]
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Edge>> {
        csv::read_edges(path.as_ref(), &self.config)
    }

    /// Edge-list files need the `csv` feature.
    #[cfg(not(feature = "csv"))]
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Edge>> {
        Err(crate::core::error::GcnError::config(format!(
            "cannot read {}: built without the `csv` feature",
            path.as_ref().display()
        )))
    }
}
