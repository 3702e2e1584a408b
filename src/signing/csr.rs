//! Helpers for the certificate requests and certificates exchanged with
//! signing servers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use openssl::{
    pkey::{PKey, Public},
    x509::{X509, X509Req},
};

use super::error::SignerError;

const PEM_ARMOR: &[&str] = &[
    "-----BEGIN CERTIFICATE REQUEST-----",
    "-----END CERTIFICATE REQUEST-----",
    "-----BEGIN NEW CERTIFICATE REQUEST-----",
    "-----END NEW CERTIFICATE REQUEST-----",
];

/// Strips the PEM armor from a certificate request and decodes the body.
pub fn decode_request(pem: &str) -> Result<Vec<u8>, SignerError> {
    let mut body = pem.to_string();
    for armor in PEM_ARMOR {
        body = body.replace(armor, "");
    }
    body.retain(|c| !c.is_ascii_whitespace());

    if body.is_empty() {
        return Err(SignerError::InvalidCsr("empty certificate request".to_string()));
    }

    BASE64
        .decode(body.as_bytes())
        .map_err(|e| SignerError::InvalidCsr(format!("base64 decode error: {}", e)))
}

/// Parses a DER encoded certificate request and returns its public key.
pub fn request_public_key(der: &[u8]) -> Result<PKey<Public>, SignerError> {
    let request = X509Req::from_der(der).map_err(|e| SignerError::InvalidCsr(format!("parse error: {}", e)))?;
    request
        .public_key()
        .map_err(|e| SignerError::InvalidCsr(format!("cannot extract public key: {}", e)))
}

/// Returns the DER encoding of a PEM or DER certificate.
pub fn certificate_der(input: &[u8]) -> Result<Vec<u8>, SignerError> {
    let trimmed = input.trim_ascii_start();
    if trimmed.starts_with(b"-----BEGIN") {
        let cert = X509::from_pem(trimmed).map_err(|e| SignerError::InvalidCertificate(e.to_string()))?;
        Ok(cert.to_der()?)
    } else {
        X509::from_der(input).map_err(|e| SignerError::InvalidCertificate(e.to_string()))?;
        Ok(input.to_vec())
    }
}

//------------ Tests ---------------------------------------------------------
