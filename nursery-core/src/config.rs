// src/config.rs
//! Per-node configuration types.
//!
//! Plain `serde`-derived config structs: `#[serde(default = "...")]`
//! per optional field and a normal `Default` impl, no external
//! config-layering crate.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The YAML document a single Nursery process loads at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurseryConfig {
    pub name: String,
    #[serde(default = "default_interface")]
    pub interface: String,
    pub port: u16,
    #[serde(default)]
    pub html_dir: PathBuf,
    pub ca_cert_path: PathBuf,
    pub server_cert_path: PathBuf,
    pub key_path: PathBuf,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_actions_dir")]
    pub actions_dir: PathBuf,
    pub base_url: String,
    pub primary_url: String,
}

fn default_interface() -> String {
    "0.0.0.0".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("/var/lib/nursery")
}

fn default_actions_dir() -> PathBuf {
    PathBuf::from("/var/lib/nursery/actions")
}

impl NurseryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("Nursery name must be non-empty".into()));
        }
        if self.base_url.is_empty() {
            return Err(Error::Config("Base_Url must be non-empty".into()));
        }
        Ok(())
    }

    /// Compare normalized URLs rather than a raw substring match against
    /// Primary_Url, which would misfire when one Nursery's name or URL
    /// is a substring of another's.
    pub fn is_primary(&self) -> bool {
        normalize_url(&self.base_url) == normalize_url(&self.primary_url)
    }
}

fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_ascii_lowercase()
}

/// The YAML document distributed to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub user_name: String,
    pub ca_cert_path: PathBuf,
    pub client_cert_path: PathBuf,
    pub key_path: PathBuf,
    pub primary_urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(base: &str, primary: &str) -> NurseryConfig {
        NurseryConfig {
            name: "a".into(),
            interface: default_interface(),
            port: 8989,
            html_dir: PathBuf::new(),
            ca_cert_path: "ca.pem".into(),
            server_cert_path: "server.pem".into(),
            key_path: "key.pem".into(),
            work_dir: default_work_dir(),
            actions_dir: default_actions_dir(),
            base_url: base.into(),
            primary_url: primary.into(),
        }
    }

    #[test]
    fn is_primary_compares_normalized_urls_not_substrings() {
        let node = cfg("https://a.test:8989/", "https://a.test:8989");
        assert!(node.is_primary());

        // The source's "substring of Name in Primary_Url" heuristic
        // would have misfired here; the normalized comparison does not.
        let secondary = cfg("https://ab.test:8989", "https://a.test:8989");
        assert!(!secondary.is_primary());
    }

    #[test]
    fn validate_rejects_empty_name() {
        let mut node = cfg("https://a.test", "https://a.test");
        node.name.clear();
        assert!(node.validate().is_err());
    }
}
