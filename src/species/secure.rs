//! Authenticated export envelope for the custom catalog.
//!
//! The signature is `HMAC-SHA256(secret, nonce || payload)`.  The secret is
//! a per-device 32-byte key generated on first use and kept in storage; it
//! never leaves the device, so an export can only be re-imported by the
//! device that produced it (or one provisioned with the same secret).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::tlv::FORMAT_VERSION;

pub const SECRET_LEN: usize = 32;
pub const NONCE_LEN: usize = 16;
pub const SIGNATURE_LEN: usize = 32;

/// Largest payload `import_secure` will look at.
pub const MAX_IMPORT_LEN: usize = 4096;

pub const ALGORITHM: &str = "HMAC-SHA256";

pub type Secret = [u8; SECRET_LEN];
pub type Nonce = [u8; NONCE_LEN];
pub type Signature = [u8; SIGNATURE_LEN];

/// What the network layer ships to and from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureExport {
    pub version: u8,
    pub algorithm: String,
    pub payload: Vec<u8>,
    pub nonce: Nonce,
    pub signature: Signature,
}

impl SecureExport {
    pub fn new(payload: Vec<u8>, nonce: Nonce, signature: Signature) -> Self {
        Self {
            version: FORMAT_VERSION,
            algorithm: ALGORITHM.into(),
            payload,
            nonce,
            signature,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|_| Error::InvalidState("export serialization failed"))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let export: Self = serde_json::from_str(json)
            .map_err(|_| Error::InvalidArgument("malformed export envelope"))?;
        if export.algorithm != ALGORITHM {
            return Err(Error::InvalidArgument("unsupported signature algorithm"));
        }
        Ok(export)
    }
}

fn signed_message(nonce: &Nonce, payload: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(NONCE_LEN + payload.len());
    msg.extend_from_slice(nonce);
    msg.extend_from_slice(payload);
    msg
}

pub fn sign(secret: &Secret, nonce: &Nonce, payload: &[u8]) -> Signature {
    hmac_sha256::HMAC::mac(signed_message(nonce, payload), secret)
}

/// Constant-time check of `signature` over `nonce || payload`.
pub fn verify(secret: &Secret, nonce: &Nonce, payload: &[u8], signature: &Signature) -> bool {
    hmac_sha256::HMAC::verify(signed_message(nonce, payload), secret, signature)
}

/// Fill `buf` from the platform's cryptographic RNG.
#[cfg(target_os = "espidf")]
pub fn fill_secure_random(buf: &mut [u8]) {
    // SAFETY: the buffer is valid and exclusively borrowed for the call.
    unsafe {
        esp_idf_sys::esp_fill_random(buf.as_mut_ptr().cast(), buf.len());
    }
}

/// Fill `buf` from the operating system's cryptographic RNG.
#[cfg(not(target_os = "espidf"))]
pub fn fill_secure_random(buf: &mut [u8]) {
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(buf);
}

pub fn random_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_LEN];
    fill_secure_random(&mut nonce);
    nonce
}

pub fn generate_secret() -> Secret {
    let mut secret = [0u8; SECRET_LEN];
    fill_secure_random(&mut secret);
    secret
}
