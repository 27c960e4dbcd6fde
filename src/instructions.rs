//! Instruction counts for known benchmarks.
//!
//! Counts are keyed by a name fragment matched against the target path as
//! given on the command line; the first entry whose pattern occurs in the
//! path wins. Paths that match nothing resolve to the fallback (1 unless the
//! manifest says otherwise), which makes any derived CPI meaningless; the
//! lookup reports whether the fallback was used so callers can say so.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Count used when no pattern matches.
pub const DEFAULT_FALLBACK: u64 = 1;

const BUILTIN: &[(&str, u64)] = &[
    ("arithmetic_sequential", 24),
    ("dependency_chain", 24),
    ("memory_sequential", 25),
    ("function_calls", 18),
    ("branch_taken", 15),
    ("mixed_operations", 45),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionEntry {
    pub pattern: String,
    pub instructions: u64,
}

/// Ordered pattern table plus fallback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionTable {
    #[serde(default = "default_fallback")]
    pub fallback: u64,
    #[serde(default, rename = "benchmark")]
    pub entries: Vec<InstructionEntry>,
}

fn default_fallback() -> u64 {
    DEFAULT_FALLBACK
}

/// Result of a lookup. `pattern` is `None` when the fallback applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionLookup {
    pub instructions: u64,
    pub pattern: Option<String>,
}

impl InstructionLookup {
    pub fn is_fallback(&self) -> bool {
        self.pattern.is_none()
    }
}

impl Default for InstructionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl InstructionTable {
    /// The six microbenchmarks the harness has always known about.
    pub fn builtin() -> Self {
        Self {
            fallback: DEFAULT_FALLBACK,
            entries: BUILTIN
                .iter()
                .map(|(pattern, instructions)| InstructionEntry {
                    pattern: (*pattern).to_string(),
                    instructions: *instructions,
                })
                .collect(),
        }
    }

    /// Parse a TOML manifest. The manifest replaces the built-in table.
    ///
    /// ```toml
    /// fallback = 1
    ///
    /// [[benchmark]]
    /// pattern = "gemm"
    /// instructions = 1_234_567
    /// ```
    pub fn from_toml_str(source: &str, origin: &Path) -> Result<Self> {
        let table: InstructionTable = toml::from_str(source).map_err(|e| HarnessError::Manifest {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        table.validate(origin)?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path).map_err(|e| HarnessError::Manifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&source, path)
    }

    fn validate(&self, origin: &Path) -> Result<()> {
        let invalid = |reason: String| HarnessError::Manifest {
            path: origin.to_path_buf(),
            reason,
        };
        if self.fallback == 0 {
            return Err(invalid("fallback must be at least 1".to_string()));
        }
        for entry in &self.entries {
            if entry.pattern.is_empty() {
                return Err(invalid("empty pattern".to_string()));
            }
            if entry.instructions == 0 {
                return Err(invalid(format!(
                    "pattern '{}' has zero instructions",
                    entry.pattern
                )));
            }
        }
        Ok(())
    }

    /// Pure function of `name`: same fragment, same count.
    pub fn lookup(&self, name: &str) -> InstructionLookup {
        self.entries
            .iter()
            .find(|e| name.contains(e.pattern.as_str()))
            .map(|e| InstructionLookup {
                instructions: e.instructions,
                pattern: Some(e.pattern.clone()),
            })
            .unwrap_or(InstructionLookup {
                instructions: self.fallback,
                pattern: None,
            })
    }
}
