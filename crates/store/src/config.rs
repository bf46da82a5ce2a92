//! Store configuration and structural hashing

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Persistence backend configuration carried by a `store` pipeline step.
///
/// Structurally identical configurations resolve to the same backend
/// instance (see [`crate::StoreRegistry`]); the variant and every field
/// participate in the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// One file per message under a directory
    File {
        /// Target directory; created at startup if missing
        path: PathBuf,
        /// Filename extension (default `hl7`)
        #[serde(default = "default_extension")]
        extension: String,
    },
    /// Process-local in-memory store (testing and inspection)
    Memory,
}

fn default_extension() -> String {
    "hl7".to_owned()
}

impl StoreConfig {
    /// Shorthand for a file store with the default extension.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File {
            path: path.into(),
            extension: default_extension(),
        }
    }
}

/// Structural hash of a store configuration: SHA-256 over its canonical
/// JSON form, hex encoded.
///
/// Serde emits struct fields in declaration order, so structurally equal
/// configurations always serialize (and therefore hash) identically.
pub fn config_hash(config: &StoreConfig) -> Result<String> {
    let canonical = serde_json::to_vec(config)?;
    let digest = Sha256::digest(&canonical);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        // Writing to a String cannot fail.
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_configs_hash_identically() {
        let a = StoreConfig::file("/var/lib/hermes/adt");
        let b = StoreConfig::file("/var/lib/hermes/adt");
        assert_eq!(config_hash(&a).unwrap(), config_hash(&b).unwrap());
    }

    #[test]
    fn test_differing_configs_hash_differently() {
        let a = StoreConfig::file("/var/lib/hermes/adt");
        let b = StoreConfig::file("/var/lib/hermes/oru");
        assert_ne!(config_hash(&a).unwrap(), config_hash(&b).unwrap());
        assert_ne!(
            config_hash(&a).unwrap(),
            config_hash(&StoreConfig::Memory).unwrap()
        );
    }
}
