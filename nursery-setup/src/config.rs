// src/config.rs
//! Setup tool input document and normalization.

use nursery_core::error::{Error, Result};
use nursery_core::trust::require_min_key_size;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupDocument {
    pub federation_name: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default = "default_key_size")]
    pub key_size: usize,
    #[serde(default)]
    pub ca_serial: Option<u64>,
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: std::path::PathBuf,
    pub nurseries: Vec<NurseryEntry>,
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

fn default_key_size() -> usize {
    2048
}

fn default_validity_days() -> u32 {
    3650
}

fn default_output_dir() -> std::path::PathBuf {
    std::path::PathBuf::from(".")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurseryEntry {
    pub name: String,
    pub hosts: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub is_primary: bool,
    /// Filled in by [`SetupDocument::normalize`]; empty on input.
    #[serde(default)]
    pub primary_url: String,
}

fn default_port() -> u16 {
    8989
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
}

impl SetupDocument {
    /// Validate and fill in derived fields.
    pub fn normalize(mut self) -> Result<Self> {
        if self.federation_name.is_empty() {
            return Err(Error::Config("Federation_Name must be non-empty".into()));
        }
        require_min_key_size(self.key_size)?;
        if self.nurseries.is_empty() {
            return Err(Error::Config("at least one Nursery must be declared".into()));
        }

        let primary_idx = self
            .nurseries
            .iter()
            .position(|n| n.is_primary)
            .unwrap_or(0);
        let primary_host = self.nurseries[primary_idx]
            .hosts
            .first()
            .cloned()
            .unwrap_or_default();
        let primary_port = self.nurseries[primary_idx].port;
        let primary_url = format!("https://{primary_host}:{primary_port}");

        for (idx, nursery) in self.nurseries.iter_mut().enumerate() {
            nursery.is_primary = idx == primary_idx;
            nursery.primary_url = primary_url.clone();
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> SetupDocument {
        SetupDocument {
            federation_name: "fed".into(),
            organization: "fed org".into(),
            key_size: 2048,
            ca_serial: None,
            validity_days: 3650,
            output_dir: ".".into(),
            nurseries: vec![
                NurseryEntry { name: "a".into(), hosts: vec!["a.test".into()], port: 8989, is_primary: false, primary_url: String::new() },
                NurseryEntry { name: "b".into(), hosts: vec!["b.test".into()], port: 8989, is_primary: true, primary_url: String::new() },
            ],
            users: vec![UserEntry { name: "alice".into() }],
        }
    }

    #[test]
    fn elects_the_flagged_nursery_as_primary() {
        let normalized = doc().normalize().unwrap();
        assert!(!normalized.nurseries[0].is_primary);
        assert!(normalized.nurseries[1].is_primary);
        assert_eq!(normalized.nurseries[0].primary_url, "https://b.test:8989");
    }

    #[test]
    fn falls_back_to_first_entry_when_none_flagged() {
        let mut d = doc();
        d.nurseries[1].is_primary = false;
        let normalized = d.normalize().unwrap();
        assert!(normalized.nurseries[0].is_primary);
        assert_eq!(normalized.nurseries[1].primary_url, "https://a.test:8989");
    }

    #[test]
    fn rejects_empty_federation_name() {
        let mut d = doc();
        d.federation_name.clear();
        assert!(d.normalize().is_err());
    }
}
