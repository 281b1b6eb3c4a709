// src/passwords.rs
//! Passwords file: preserve previously issued passwords, rewrite the
//! whole TSV at mode 0600 after every run.

use nursery_core::error::Result;
use std::collections::BTreeMap;
use std::path::Path;

pub fn load(path: &Path) -> BTreeMap<String, String> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return BTreeMap::new();
    };
    contents
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(name, password)| (name.to_string(), password.to_string()))
        .collect()
}

pub fn write(path: &Path, passwords: &BTreeMap<String, String>) -> Result<()> {
    let mut body = String::new();
    for (name, password) in passwords {
        body.push_str(name);
        body.push('\t');
        body.push_str(password);
        body.push('\n');
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, body)?;
    set_mode(path, 0o600)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passwords");
        let mut passwords = BTreeMap::new();
        passwords.insert("alice".to_string(), "s3cret1".to_string());
        passwords.insert("bob".to_string(), "s3cret2".to_string());
        write(&path, &passwords).unwrap();

        let loaded = load(&path);
        assert_eq!(loaded.get("alice"), Some(&"s3cret1".to_string()));
        assert_eq!(loaded.get("bob"), Some(&"s3cret2".to_string()));
    }

    #[test]
    fn preserves_entries_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passwords");
        let mut first = BTreeMap::new();
        first.insert("alice".to_string(), "old-password".to_string());
        write(&path, &first).unwrap();

        let mut reloaded = load(&path);
        reloaded.entry("bob".to_string()).or_insert_with(|| "new-password".to_string());
        write(&path, &reloaded).unwrap();

        let final_map = load(&path);
        assert_eq!(final_map.get("alice"), Some(&"old-password".to_string()));
        assert_eq!(final_map.get("bob"), Some(&"new-password".to_string()));
    }
}
