//! Sync pair configuration.
//!
//! The file is a JSON object keyed by pair:
//!
//! ```json
//! {
//!   "classroom": {
//!     "private": { "uri": "https://a.example/vault", "auth": { "username": "u", "password": "p", "passphrase": "k1" }, "path": "class/" },
//!     "shared":  { "uri": "https://b.example/shared", "auth": { "username": "u", "password": "p", "passphrase": "" }, "path": "" }
//!   }
//! }
//! ```
//!
//! A file holding a single `{ "private": ..., "shared": ... }` object is read
//! as one pair named [`DEFAULT_PAIR`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Key given to a pair read from the single-pair file shape.
pub const DEFAULT_PAIR: &str = "default";

/// Credentials and passphrase for one side.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Empty means the side stores plaintext.
    #[serde(default)]
    pub passphrase: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("passphrase", &if self.passphrase.is_empty() { "" } else { "<redacted>" })
            .finish()
    }
}

/// One store endpoint of a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideConfig {
    pub uri: String,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Id prefix of the synchronized subtree. Empty means the whole database.
    #[serde(default)]
    pub path: String,
}

/// A private and a shared endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairConfig {
    pub private: SideConfig,
    pub shared: SideConfig,
}

/// Every configured pair, by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayConfig {
    pub pairs: BTreeMap<String, PairConfig>,
}

impl RelayConfig {
    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate config JSON.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let pairs = if is_single_pair(&value) {
            let pair: PairConfig = serde_json::from_value(value)?;
            BTreeMap::from([(DEFAULT_PAIR.to_string(), pair)])
        } else {
            serde_json::from_value(value)?
        };
        let config = Self { pairs };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pairs.is_empty() {
            return Err(RelayError::Config("no sync pairs configured".into()));
        }
        for (key, pair) in &self.pairs {
            for (name, side) in [("private", &pair.private), ("shared", &pair.shared)] {
                if side.uri.trim().is_empty() {
                    return Err(RelayError::Config(format!("pair {key}: {name} uri is empty")));
                }
            }
        }
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }
}

/// A top-level `private` side carrying a `uri` marks the single-pair shape.
fn is_single_pair(value: &Value) -> bool {
    value
        .get("private")
        .and_then(|side| side.get("uri"))
        .is_some()
}
