// src/trust/mod.rs
//! Trust material: CA bootstrap, per-Nursery and per-user issuance,
//! PKCS#12 bundling, and rendered YAML configs.
//!
//! This module is the producer side of the CA/cert/key PEM material
//! that the transport client and server consume as
//! `reqwest::Identity`/`Certificate` values and rustls configs. The
//! signing stack is `rcgen` + `rsa` for RSA/SHA-512 certificates and
//! `p12` for PKCS#12 bundles.

mod ca;
mod issue;
mod pkcs12;
mod render;

pub use ca::{create_ca, load_ca, write_ca, CaMaterial, CaSpec};
pub use issue::{issue_nursery_cert, issue_user_cert, IssuedCert};
pub use pkcs12::{bundle_pkcs12, generate_password};
pub use render::{render_nursery_config, render_user_config};

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// `kindBits` used in the serial-number encoding.
pub const KIND_CA: u64 = 1;

pub fn kind_server(index: u32) -> u64 {
    (1u64 << 5) + index as u64
}

pub fn kind_user(index: u32) -> u64 {
    (2u64 << 5) + index as u64
}

/// At most 31 Nurseries and 63 users can be issued in a single run
/// without the kind-bits / CA-serial halves colliding.
pub const MAX_NURSERIES: usize = 31;
pub const MAX_USERS: usize = 63;

/// Combine `kindBits` and the CA's serial into a 64-bit serial:
/// `(kindBits << 32) | caSerial`.
pub fn encode_serial(kind_bits: u64, ca_serial: u64) -> u64 {
    (kind_bits << 32) | (ca_serial & 0xFFFF_FFFF)
}

/// Write a PEM-encoded cert or key preceded by human-readable `Subject:`
/// and `Date:` header lines, then chmod it.
pub fn write_pem_with_header(
    path: &Path,
    subject: &str,
    pem_body: &str,
    mode: u32,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let contents = format!("Subject: {subject}\nDate: {now}\n{pem_body}");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    set_mode(path, mode)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Parse a host entry into an `rcgen` SAN: an address parseable as IP
/// goes into IPAddresses, otherwise DNSNames.
pub fn host_to_san(host: &str) -> rcgen::SanType {
    match host.parse::<std::net::IpAddr>() {
        Ok(ip) => rcgen::SanType::IpAddress(ip),
        Err(_) => rcgen::SanType::DnsName(
            rcgen::Ia5String::try_from(host.to_string())
                .unwrap_or_else(|_| rcgen::Ia5String::try_from("invalid").unwrap()),
        ),
    }
}

pub fn require_min_key_size(bits: usize) -> Result<()> {
    if bits < 1024 {
        return Err(Error::Config(format!(
            "Key_Size {bits} is below the minimum of 1024 bits"
        )));
    }
    Ok(())
}
