//! Configuration for the schema analyzer.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Chain depth at which a relation stops being specialized (matches OpenFGA's resolution limit).
pub const DEFAULT_MAX_DEPTH: u32 = 25;

/// Configuration for the schema analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Depth ceiling for TTU/userset chains.
    pub max_depth: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl AnalyzerConfig {
    /// Creates a new configuration with the specified max depth.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Rejects settings the analyzer cannot work with.
    pub fn validate(&self) -> DomainResult<()> {
        if self.max_depth == 0 {
            return Err(DomainError::InvalidConfig {
                message: "max_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
