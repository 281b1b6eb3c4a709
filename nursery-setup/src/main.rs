// src/main.rs
//! `nursery-setup`: offline trust-bootstrap tool. Reads a declarative
//! document describing a Federation, creates or loads its CA, and
//! issues every Nursery and user their certificates, keys, and rendered
//! configs.

mod config;
mod passwords;

use clap::Parser;
use config::{NurseryEntry, SetupDocument, UserEntry};
use nursery_core::config::{NurseryConfig, UserConfig};
use nursery_core::error::{Error, Result};
use nursery_core::trust::{
    bundle_pkcs12, create_ca, issue_nursery_cert, issue_user_cert, load_ca, render_nursery_config,
    render_user_config, CaMaterial, CaSpec,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "nursery-setup", about = "Bootstrap a Federation's trust material")]
struct Args {
    /// Declarative input document.
    #[arg(short = 'c', long = "config", default_value = "nurseries.yaml")]
    config: PathBuf,

    /// Allow generating a fresh CA when none is found on disk.
    #[arg(long = "createCA")]
    create_ca: bool,

    /// Dump the normalized document as indented JSON and exit.
    #[arg(short = 's', long = "show")]
    show: bool,

    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn ca_paths(output_dir: &Path, federation_name: &str) -> (PathBuf, PathBuf) {
    let dir = output_dir.join("ca").join(federation_name);
    (
        dir.join(format!("{federation_name}-ca-crt.pem")),
        dir.join(format!("{federation_name}-ca-key.pem")),
    )
}

/// Load the CA, or create one if `create_ca` was passed; any other
/// failure to load is fatal.
fn load_or_create_ca(doc: &SetupDocument, create_ca_flag: bool) -> Result<CaMaterial> {
    let (cert_path, key_path) = ca_paths(&doc.output_dir, &doc.federation_name);

    match load_ca(&cert_path, &key_path) {
        Ok(ca) => {
            tracing::info!("loaded existing CA for {}", doc.federation_name);
            Ok(ca)
        }
        Err(e) if create_ca_flag => {
            tracing::info!("no usable CA found ({e}); creating a new one");
            let ca = create_ca(&CaSpec {
                common_name: doc.federation_name.clone(),
                organization: doc.organization.clone(),
                key_size: doc.key_size,
                serial: doc.ca_serial,
                validity_days: doc.validity_days,
            })?;
            nursery_core::trust::write_ca(&ca, &cert_path, &key_path, &doc.federation_name)?;
            Ok(ca)
        }
        Err(e) => Err(Error::Trust(format!(
            "CA missing or invalid at {cert_path:?} and -createCA was not passed: {e}"
        ))),
    }
}

fn nursery_paths(output_dir: &Path, name: &str) -> (PathBuf, PathBuf, PathBuf, PathBuf) {
    let dir = output_dir.join("servers").join(name);
    (
        dir.join(format!("{name}-ca-crt.pem")),
        dir.join(format!("{name}-crt.pem")),
        dir.join(format!("{name}-key.pem")),
        dir.join(format!("{name}-config.yaml")),
    )
}

/// Issue one Nursery's server+client cert and rendered config. Failures
/// are logged and returned, never aborting siblings.
fn issue_nursery(
    doc: &SetupDocument,
    ca: &CaMaterial,
    index: u32,
    entry: &NurseryEntry,
) -> Result<()> {
    let (ca_out, crt_out, key_out, config_out) = nursery_paths(&doc.output_dir, &entry.name);

    if ca_out.exists() && crt_out.exists() && key_out.exists() && config_out.exists() {
        tracing::info!("Nursery '{}' already provisioned, skipping", entry.name);
        return Ok(());
    }

    let issued = issue_nursery_cert(ca, doc.key_size, &entry.name, &entry.hosts, index, doc.validity_days)?;

    nursery_core::trust::write_pem_with_header(&ca_out, &entry.name, &ca.cert_pem, 0o644)?;
    let chain = format!("{}\n{}", issued.cert_pem, ca.cert_pem);
    nursery_core::trust::write_pem_with_header(&crt_out, &entry.name, &chain, 0o644)?;
    nursery_core::trust::write_pem_with_header(&key_out, &entry.name, &issued.key_pem, 0o644)?;

    let host = entry.hosts.first().cloned().unwrap_or_default();
    let base_url = format!("https://{host}:{}", entry.port);
    let config = NurseryConfig {
        name: entry.name.clone(),
        interface: "0.0.0.0".to_string(),
        port: entry.port,
        html_dir: PathBuf::new(),
        ca_cert_path: ca_out,
        server_cert_path: crt_out,
        key_path: key_out,
        work_dir: PathBuf::from("/var/lib/nursery"),
        actions_dir: PathBuf::from("/var/lib/nursery/actions"),
        base_url,
        primary_url: entry.primary_url.clone(),
    };
    render_nursery_config(&config, &config_out)?;

    tracing::info!("provisioned Nursery '{}' (serial {})", entry.name, issued.serial);
    Ok(())
}

fn user_paths(output_dir: &Path, name: &str) -> (PathBuf, PathBuf, PathBuf, PathBuf, PathBuf) {
    let dir = output_dir.join("users").join(name);
    (
        dir.join(format!("{name}-ca-crt.pem")),
        dir.join(format!("{name}-crt.pem")),
        dir.join(format!("{name}-key.pem")),
        dir.join(format!("{name}-pkcs12.p12")),
        dir.join("cnTypeSetter.yaml"),
    )
}

/// Issue one user's client cert, PKCS#12 bundle, and config. Returns
/// the freshly generated password on success.
fn issue_user(
    doc: &SetupDocument,
    ca: &CaMaterial,
    index: u32,
    entry: &UserEntry,
    existing_password: Option<String>,
) -> Result<String> {
    let (ca_out, crt_out, key_out, p12_out, config_out) = user_paths(&doc.output_dir, &entry.name);

    let issued = issue_user_cert(ca, doc.key_size, &entry.name, index, doc.validity_days)?;

    nursery_core::trust::write_pem_with_header(&ca_out, &entry.name, &ca.cert_pem, 0o644)?;
    nursery_core::trust::write_pem_with_header(&crt_out, &entry.name, &issued.cert_pem, 0o644)?;
    nursery_core::trust::write_pem_with_header(&key_out, &entry.name, &issued.key_pem, 0o600)?;

    let password = existing_password.unwrap_or_else(nursery_core::trust::generate_password);

    let key_der = pem_body_to_der(&issued.key_pem)?;
    let cert_der = pem_body_to_der(&issued.cert_pem)?;
    let bundle = bundle_pkcs12(&key_der, &cert_der, &ca.cert_der, &password, &entry.name)?;
    if let Some(parent) = p12_out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&p12_out, bundle)?;

    let config = UserConfig {
        user_name: entry.name.clone(),
        ca_cert_path: ca_out,
        client_cert_path: crt_out,
        key_path: key_out,
        primary_urls: doc.nurseries.iter().map(|n| n.primary_url.clone()).collect(),
    };
    render_user_config(&config, &config_out)?;

    tracing::info!("provisioned user '{}' (serial {})", entry.name, issued.serial);
    Ok(password)
}

fn pem_body_to_der(pem_text: &str) -> Result<Vec<u8>> {
    let parsed =
        pem::parse(pem_text).map_err(|e| Error::Trust(format!("failed to parse PEM: {e}")))?;
    Ok(parsed.contents().to_vec())
}

async fn run(doc: SetupDocument, ca: CaMaterial) -> Result<()> {
    let ca = Arc::new(ca);
    let doc = Arc::new(doc);

    let mut nursery_tasks = Vec::new();
    for (index, entry) in doc.nurseries.clone().into_iter().enumerate() {
        let doc = doc.clone();
        let ca = ca.clone();
        nursery_tasks.push(tokio::spawn(async move {
            let result = issue_nursery(&doc, &ca, index as u32, &entry);
            (entry.name, result)
        }));
    }

    let passwords_path = doc.output_dir.join("users").join("passwords");
    let existing_passwords = passwords::load(&passwords_path);

    let mut user_tasks = Vec::new();
    for (index, entry) in doc.users.clone().into_iter().enumerate() {
        let doc = doc.clone();
        let ca = ca.clone();
        let existing = existing_passwords.get(&entry.name).cloned();
        user_tasks.push(tokio::spawn(async move {
            let result = issue_user(&doc, &ca, index as u32, &entry, existing);
            (entry.name, result)
        }));
    }

    for task in nursery_tasks {
        let (name, result) = task.await.map_err(|e| Error::Action(e.to_string()))?;
        if let Err(e) = result {
            tracing::error!("Nursery '{name}' provisioning failed: {e}");
        }
    }

    let mut passwords = existing_passwords;
    for task in user_tasks {
        let (name, result) = task.await.map_err(|e| Error::Action(e.to_string()))?;
        match result {
            Ok(password) => {
                passwords.insert(name, password);
            }
            Err(e) => tracing::error!("user '{name}' provisioning failed: {e}"),
        }
    }

    passwords::write(&passwords_path, &passwords)?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    nursery_core::logging::init(args.verbose);

    let doc = match std::fs::read_to_string(&args.config)
        .map_err(|e| Error::Config(format!("failed to read {:?}: {e}", args.config)))
        .and_then(|raw| Ok(serde_yaml::from_str::<SetupDocument>(&raw)?))
        .and_then(SetupDocument::normalize)
    {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    if args.show {
        if let Err(e) = nursery_core::logging::print_json(&doc) {
            tracing::error!("{e}");
            return ExitCode::from(e.exit_code() as u8);
        }
        return ExitCode::SUCCESS;
    }

    let ca = match load_or_create_ca(&doc, args.create_ca) {
        Ok(ca) => ca,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    if let Err(e) = run(doc, ca).await {
        tracing::error!("{e}");
        return ExitCode::from(e.exit_code() as u8);
    }

    ExitCode::SUCCESS
}
