//! Settings for SQL generation.
//!
//! ```toml
//! alias_prefix = "cte_"
//! alias_hash_len = 8
//! statement_separator = ";\n"
//! ```
//!
//! Every key is optional; missing keys take the defaults above.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QueryModelError, Result};

/// Shortest and longest hash prefix usable in a generated alias.
pub const MIN_ALIAS_HASH_LEN: usize = 4;
pub const MAX_ALIAS_HASH_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Prefix of aliases generated for nodes without a materialization name.
    pub alias_prefix: String,

    /// Number of hash characters appended to `alias_prefix`.
    pub alias_hash_len: usize,

    /// Text placed between statements when a script is rendered as one string.
    pub statement_separator: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            alias_prefix: "cte_".to_string(),
            alias_hash_len: 8,
            statement_separator: ";\n".to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: GeneratorConfig = toml::from_str(content)
            .map_err(|e| QueryModelError::InvalidConfig(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryModelError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_ALIAS_HASH_LEN..=MAX_ALIAS_HASH_LEN).contains(&self.alias_hash_len) {
            return Err(QueryModelError::InvalidConfig(format!(
                "alias_hash_len must be between {MIN_ALIAS_HASH_LEN} and {MAX_ALIAS_HASH_LEN}, got {}",
                self.alias_hash_len
            )));
        }
        match self.alias_prefix.chars().next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            Some(_) => {
                return Err(QueryModelError::InvalidConfig(format!(
                    "alias_prefix must start with a letter or '_', got {:?}",
                    self.alias_prefix
                )));
            }
            None => {
                return Err(QueryModelError::InvalidConfig(
                    "alias_prefix must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
