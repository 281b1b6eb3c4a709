// src/trust/pkcs12.rs
//! PKCS#12 bundling for per-user distribution.
//!
//! Built on the `p12` crate's PFX builder, the real published crate for
//! this one PKCS#12-specific operation.

use crate::error::{Error, Result};

/// Bundle (key, cert, CA) into a PFX encrypted with `password`.
pub fn bundle_pkcs12(
    key_der: &[u8],
    cert_der: &[u8],
    ca_der: &[u8],
    password: &str,
    friendly_name: &str,
) -> Result<Vec<u8>> {
    let pfx = p12::PFX::new(cert_der, key_der, Some(ca_der), password, friendly_name)
        .ok_or_else(|| Error::Trust("failed to assemble PKCS#12 bundle".to_string()))?;
    Ok(pfx.to_der())
}

/// Generate a fresh 8-character alphanumeric password for a PKCS#12 bundle.
pub fn generate_password() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_password_is_eight_chars() {
        let pw = generate_password();
        assert_eq!(pw.chars().count(), 8);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
