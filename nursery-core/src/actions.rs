// src/actions.rs
//! Action catalog, run execution, and cascading output browsing.
//!
//! Each run gets a `uuid` v4 run id and a directory capturing its
//! stdout/stderr/exit status, the same run-identifier-plus-captured-
//! output shape a daemon job model would use, generalized here to
//! spawning an arbitrary actions-directory executable rather than an
//! internal package operation.

use crate::control::ControlState;
use crate::error::{Error, Result};
use crate::logging::dump_json;
use crate::model::{ActionConfig, ActionDescription, ActionList};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Re-scan `actions_dir` for `*.config` descriptor files and index them
/// by Name.
pub fn scan_catalog(actions_dir: &Path) -> ActionList {
    let mut list = ActionList::new();
    let Ok(entries) = std::fs::read_dir(actions_dir) else {
        return list;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("config") {
            continue;
        }
        let Some(desc) = decode_descriptor(&path) else {
            continue;
        };
        if !desc.is_valid() {
            continue;
        }
        list.insert(desc.name.clone(), desc);
    }
    list
}

/// Descriptor files may be YAML, TOML, or JSON; the
/// extension is always `.config`, so content is sniffed by trying each
/// decoder in turn.
fn decode_descriptor(path: &Path) -> Option<ActionDescription> {
    let contents = std::fs::read_to_string(path).ok()?;
    if let Ok(desc) = serde_yaml::from_str(&contents) {
        return Some(desc);
    }
    if let Ok(desc) = serde_json::from_str(&contents) {
        return Some(desc);
    }
    if let Ok(desc) = toml::from_str(&contents) {
        return Some(desc);
    }
    None
}

/// One run's captured output: a run id plus everything written under
/// `<output_dir>/<action>/<run_id>/`.
pub struct RunHandle {
    pub run_id: String,
    pub dir: PathBuf,
}

/// Spawn `<actions_dir>/<action_name>` with argv/env flattened from
/// `config`, capturing stdout/stderr under a fresh run id.
pub async fn run_action(
    actions_dir: &Path,
    output_dir: &Path,
    control: &ControlState,
    action_name: &str,
    config: &ActionConfig,
) -> Result<RunHandle> {
    let _guard = control.begin_action();

    let executable = actions_dir.join(action_name);
    let run_id = uuid::Uuid::new_v4().to_string();
    let run_dir = output_dir.join(action_name).join(&run_id);
    tokio::fs::create_dir_all(&run_dir).await?;

    dump_json(&format!("action '{action_name}' run {run_id} config"), config);

    let mut command = Command::new(&executable);
    command.args(config.argv());
    for (key, value) in config.envp() {
        command.env(key, value);
    }
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    tracing::info!(action = action_name, run_id = %run_id, path = ?executable, "starting action run");

    let output = command.output().await.map_err(|e| {
        tracing::warn!(action = action_name, run_id = %run_id, "failed to exec {executable:?}: {e}");
        Error::Action(format!("failed to exec {executable:?}: {e}"))
    })?;

    let mut stdout_file = tokio::fs::File::create(run_dir.join("stdout.log")).await?;
    stdout_file.write_all(&output.stdout).await?;
    let mut stderr_file = tokio::fs::File::create(run_dir.join("stderr.log")).await?;
    stderr_file.write_all(&output.stderr).await?;

    tokio::fs::write(
        run_dir.join("exit_status.txt"),
        output.status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()),
    )
    .await?;

    tracing::info!(
        action = action_name,
        run_id = %run_id,
        exit_code = ?output.status.code(),
        "action run complete"
    );

    Ok(RunHandle { run_id, dir: run_dir })
}

/// List the run ids captured for `action_name`, or for every action
/// when `action_name` is `None`.
pub fn list_runs(output_dir: &Path, action_name: Option<&str>) -> Vec<String> {
    let Some(action_name) = action_name else {
        return list_dir_names(output_dir);
    };
    list_dir_names(&output_dir.join(action_name))
}

pub fn list_run_files(output_dir: &Path, action_name: &str, run_id: &str) -> Vec<String> {
    list_dir_names(&output_dir.join(action_name).join(run_id))
}

fn list_dir_names(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|e| e.file_name().into_string().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Cascading delete: clears everything at or below the given path.
pub async fn delete_output(
    output_dir: &Path,
    action_name: Option<&str>,
    run_id: Option<&str>,
    file_name: Option<&str>,
) -> Result<()> {
    let mut target = output_dir.to_path_buf();
    if let Some(action_name) = action_name {
        target.push(action_name);
        if let Some(run_id) = run_id {
            target.push(run_id);
            if let Some(file_name) = file_name {
                target.push(file_name);
            }
        }
    }

    tracing::info!(
        action = ?action_name,
        run_id = ?run_id,
        file = ?file_name,
        path = ?target,
        "deleting action output"
    );

    if target.is_dir() {
        tokio::fs::remove_dir_all(&target).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(e)
            }
        })?;
    } else if target.is_file() {
        tokio::fs::remove_file(&target).await.or_else(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Ok(())
            } else {
                Err(e)
            }
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArgSpec;

    #[test]
    fn scan_discards_descriptors_with_empty_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("valid.config"),
            "name: typeset\ndesc: Typeset a job\nargs: []\nenvs: []\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("invalid.config"),
            "name: \"\"\ndesc: nameless\nargs: []\nenvs: []\n",
        )
        .unwrap();

        let catalog = scan_catalog(dir.path());
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains_key("typeset"));
    }

    #[test]
    fn scan_accepts_toml_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("toml-job.config"),
            "name = \"toml-job\"\ndesc = \"a toml descriptor\"\nargs = []\nenvs = []\n",
        )
        .unwrap();

        let catalog = scan_catalog(dir.path());
        assert!(catalog.contains_key("toml-job"));
    }

    #[test]
    fn descriptor_args_preserve_order() {
        let desc = ActionDescription {
            name: "typeset".into(),
            desc: "typeset a job".into(),
            args: vec![
                ArgSpec { key: "font".into(), desc: "font family".into() },
                ArgSpec { key: "size".into(), desc: "point size".into() },
            ],
            envs: vec![],
        };
        assert_eq!(desc.args[0].key, "font");
        assert_eq!(desc.args[1].key, "size");
    }

    #[tokio::test]
    async fn cascading_delete_clears_one_run() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("typeset").join("run-1");
        tokio::fs::create_dir_all(&run_dir).await.unwrap();
        tokio::fs::write(run_dir.join("stdout.log"), b"ok").await.unwrap();

        delete_output(dir.path(), Some("typeset"), Some("run-1"), None).await.unwrap();
        assert!(!run_dir.exists());
        assert!(dir.path().join("typeset").exists());
    }
}
