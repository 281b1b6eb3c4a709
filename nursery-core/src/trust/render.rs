// src/trust/render.rs
//! Render per-Nursery and per-user YAML configs.

use crate::config::{NurseryConfig, UserConfig};
use crate::error::Result;
use std::path::Path;

/// Serialize and write a per-Nursery YAML config.
pub fn render_nursery_config(config: &NurseryConfig, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Serialize and write a per-user YAML config.
pub fn render_user_config(config: &UserConfig, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, yaml)?;
    Ok(())
}
