// src/trust/ca.rs
//! CA read-or-create.

use super::{encode_serial, require_min_key_size, write_pem_with_header, KIND_CA};
use crate::error::{Error, Result};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Declarative description of the CA to create if one doesn't exist.
#[derive(Debug, Clone)]
pub struct CaSpec {
    pub common_name: String,
    pub organization: String,
    pub key_size: usize,
    /// Forced serial, or `None` to default to wall-clock seconds.
    pub serial: Option<u64>,
    pub validity_days: u32,
}

/// In-memory CA material: the signing key stays owned by whichever
/// process loaded/created it.
pub struct CaMaterial {
    pub serial: u64,
    pub cert_pem: String,
    pub cert_der: Vec<u8>,
    pub key_pem: String,
    key_pair: KeyPair,
    cert: rcgen::Certificate,
}

impl CaMaterial {
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn certificate(&self) -> &rcgen::Certificate {
        &self.cert
    }
}

fn generate_rsa_keypair(bits: usize) -> Result<KeyPair> {
    let mut rng = rand::thread_rng();
    let priv_key = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| Error::Trust(format!("RSA key generation failed: {e}")))?;
    let pkcs8_pem = priv_key
        .to_pkcs8_pem(Default::default())
        .map_err(|e| Error::Trust(format!("PKCS#8 encoding failed: {e}")))?;
    KeyPair::from_pem_and_sign_algo(&pkcs8_pem, &rcgen::PKCS_RSA_SHA512)
        .map_err(|e| Error::Trust(format!("rcgen key import failed: {e}")))
}

/// Create a fresh self-signed CA: IsCA=true, KeyUsage = DigitalSignature
/// | CertSign, BasicConstraintsValid=true, SHA-512 with RSA.
pub fn create_ca(spec: &CaSpec) -> Result<CaMaterial> {
    if spec.common_name.is_empty() {
        return Err(Error::Config("Federation_Name must be non-empty".into()));
    }
    require_min_key_size(spec.key_size)?;

    let serial = spec.serial.unwrap_or_else(now_unix_seconds);

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, spec.common_name.clone());
    dn.push(DnType::OrganizationName, spec.organization.clone());

    let mut params = CertificateParams::default();
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyCertSign];
    params.serial_number = Some(SerialNumber::from_slice(
        &encode_serial(KIND_CA, serial).to_be_bytes(),
    ));
    let now = chrono::Utc::now();
    params.not_before = now.into();
    params.not_after = (now + chrono::Duration::days(spec.validity_days as i64)).into();

    let key_pair = generate_rsa_keypair(spec.key_size)?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| Error::Trust(format!("CA self-signing failed: {e}")))?;

    Ok(CaMaterial {
        serial,
        cert_pem: cert.pem(),
        cert_der: cert.der().to_vec(),
        key_pem: key_pair.serialize_pem(),
        key_pair,
        cert,
    })
}

/// Write the CA cert (mode 0644) and key (mode 0600) with `Subject:`
/// and `Date:` header lines.
pub fn write_ca(ca: &CaMaterial, cert_path: &Path, key_path: &Path, subject: &str) -> Result<()> {
    write_pem_with_header(cert_path, subject, &ca.cert_pem, 0o644)?;
    write_pem_with_header(key_path, subject, &ca.key_pem, 0o600)?;
    Ok(())
}

/// Read the CA cert and key PEM files, reconstructing the signer.
///
/// Strips the leading `Subject:`/`Date:` header lines written by
/// [`write_ca`] before handing the remainder to `rcgen`.
pub fn load_ca(cert_path: &Path, key_path: &Path) -> Result<CaMaterial> {
    let cert_raw = std::fs::read_to_string(cert_path)
        .map_err(|e| Error::Trust(format!("failed to read CA cert {cert_path:?}: {e}")))?;
    let key_raw = std::fs::read_to_string(key_path)
        .map_err(|e| Error::Trust(format!("failed to read CA key {key_path:?}: {e}")))?;

    let cert_pem = strip_header(&cert_raw);
    let key_pem = strip_header(&key_raw);

    let key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, &rcgen::PKCS_RSA_SHA512)
        .map_err(|e| Error::Trust(format!("failed to parse CA key: {e}")))?;

    let params = CertificateParams::from_ca_cert_pem(&cert_pem)
        .map_err(|e| Error::Trust(format!("failed to parse CA cert: {e}")))?;
    let serial = extract_ca_serial(&params)?;

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| Error::Trust(format!("failed to re-derive CA certificate: {e}")))?;

    Ok(CaMaterial {
        serial,
        cert_pem,
        cert_der: cert.der().to_vec(),
        key_pem,
        key_pair,
        cert,
    })
}

fn extract_ca_serial(params: &CertificateParams) -> Result<u64> {
    let serial = params
        .serial_number
        .as_ref()
        .ok_or_else(|| Error::Trust("CA certificate is missing a serial number".into()))?;
    let bytes = serial.as_ref();
    if bytes.len() < 8 {
        return Err(Error::Trust("CA certificate serial is too short".into()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[bytes.len() - 8..]);
    Ok(u64::from_be_bytes(buf) & 0xFFFF_FFFF)
}

fn strip_header(raw: &str) -> String {
    match raw.find("-----BEGIN") {
        Some(idx) => raw[idx..].to_string(),
        None => raw.to_string(),
    }
}

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> CaSpec {
        CaSpec {
            common_name: "fed-ca".into(),
            organization: "fed".into(),
            key_size: 1024,
            serial: Some(1_700_000_000),
            validity_days: 3650,
        }
    }

    #[test]
    fn ca_serial_defaults_to_wall_clock_when_unset() {
        let mut s = spec();
        s.serial = None;
        let ca = create_ca(&s).unwrap();
        assert!(ca.serial >= now_unix_seconds() - 5);
    }

    #[test]
    fn rejects_key_sizes_below_1024() {
        let mut s = spec();
        s.key_size = 512;
        assert!(create_ca(&s).is_err());
    }

    #[test]
    fn encoded_serial_carries_ca_serial_in_low_half() {
        let ca = create_ca(&spec()).unwrap();
        let expected = encode_serial(KIND_CA, ca.serial);
        assert_eq!(expected & 0xFFFF_FFFF, ca.serial & 0xFFFF_FFFF);
        assert_eq!(expected >> 32, KIND_CA);
    }
}
