// src/trust/issue.rs
//! Per-Nursery and per-user certificate issuance.

use super::ca::CaMaterial;
use super::{encode_serial, host_to_san, kind_server, kind_user, require_min_key_size};
use crate::error::{Error, Result};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, SerialNumber,
};
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;

/// An issued leaf certificate: the chain the caller needs to write out.
pub struct IssuedCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub serial: u64,
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

/// Issue a server+client cert for a Nursery: ExtKeyUsage includes both
/// ClientAuth and ServerAuth; SANs populated from its host list.
pub fn issue_nursery_cert(
    ca: &CaMaterial,
    key_size: usize,
    common_name: &str,
    hosts: &[String],
    index: u32,
    validity_days: u32,
) -> Result<IssuedCert> {
    require_min_key_size(key_size)?;
    if index as usize >= super::MAX_NURSERIES {
        return Err(Error::Config(format!(
            "Nursery index {index} exceeds the supported maximum of {}",
            super::MAX_NURSERIES
        )));
    }

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name.to_string());

    let mut params = CertificateParams::default();
    params.distinguished_name = dn;
    params.subject_alt_names = hosts.iter().map(|h| host_to_san(h)).collect();
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::KeyAgreement,
        KeyUsagePurpose::DataEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::ServerAuth,
    ];
    let serial = encode_serial(kind_server(index), ca.serial);
    params.serial_number = Some(SerialNumber::from_slice(&serial.to_be_bytes()));
    let now = chrono::Utc::now();
    params.not_before = now.into();
    params.not_after = (now + chrono::Duration::days(validity_days as i64)).into();

    let key_pair = generate_rsa_keypair(key_size)?;
    let cert = params
        .signed_by(&key_pair, ca.certificate(), ca.key_pair())
        .map_err(|e| Error::Trust(format!("failed to sign Nursery cert: {e}")))?;

    Ok(IssuedCert {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        serial,
    })
}

/// Issue a client-only cert for a user: ExtKeyUsage ClientAuth only.
pub fn issue_user_cert(
    ca: &CaMaterial,
    key_size: usize,
    common_name: &str,
    index: u32,
    validity_days: u32,
) -> Result<IssuedCert> {
    require_min_key_size(key_size)?;
    if index as usize >= super::MAX_USERS {
        return Err(Error::Config(format!(
            "User index {index} exceeds the supported maximum of {}",
            super::MAX_USERS
        )));
    }

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name.to_string());

    let mut params = CertificateParams::default();
    params.distinguished_name = dn;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::KeyAgreement,
        KeyUsagePurpose::DataEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    let serial = encode_serial(kind_user(index), ca.serial);
    params.serial_number = Some(SerialNumber::from_slice(&serial.to_be_bytes()));
    let now = chrono::Utc::now();
    params.not_before = now.into();
    params.not_after = (now + chrono::Duration::days(validity_days as i64)).into();

    let key_pair = generate_rsa_keypair(key_size)?;
    let cert = params
        .signed_by(&key_pair, ca.certificate(), ca.key_pair())
        .map_err(|e| Error::Trust(format!("failed to sign user cert: {e}")))?;

    Ok(IssuedCert {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        serial,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::ca::{create_ca, CaSpec};

    fn test_ca() -> CaMaterial {
        create_ca(&CaSpec {
            common_name: "fed-ca".into(),
            organization: "fed".into(),
            key_size: 1024,
            serial: Some(42),
            validity_days: 3650,
        })
        .unwrap()
    }

    #[test]
    fn server_and_user_serials_are_pairwise_distinct() {
        let ca = test_ca();
        let server = issue_nursery_cert(&ca, 1024, "a", &["a.test".into()], 0, 365).unwrap();
        let user = issue_user_cert(&ca, 1024, "u@test", 0, 365).unwrap();
        assert_ne!(server.serial, user.serial);
        assert_eq!(server.serial & 0xFFFF_FFFF, ca.serial & 0xFFFF_FFFF);
        assert_eq!(user.serial & 0xFFFF_FFFF, ca.serial & 0xFFFF_FFFF);
    }

    #[test]
    fn rejects_index_past_nursery_limit() {
        let ca = test_ca();
        let err = issue_nursery_cert(&ca, 1024, "a", &["a.test".into()], 31, 365);
        assert!(err.is_err());
    }
}
