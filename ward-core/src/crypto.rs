//! Secret handling: at-rest encryption and one-time code digests
//!
//! Encrypted format: base64(nonce_12bytes || ciphertext || tag_16bytes)

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::EngineError;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// AES-256-GCM key for TOTP secrets stored at rest
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; KEY_LEN],
}

impl Drop for SecretCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretCipher(..)")
    }
}

impl SecretCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Key from base64 (standard alphabet), as kept in the environment
    pub fn from_base64(encoded: &str) -> Result<Self, EngineError> {
        let mut bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| EngineError::Internal("encryption key is not valid base64".into()))?;
        if bytes.len() != KEY_LEN {
            let len = bytes.len();
            bytes.zeroize();
            return Err(EngineError::Internal(format!(
                "encryption key wrong length: {len} (expected {KEY_LEN})"
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self { key })
    }

    /// Random key (tests, local development)
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut key);
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, EngineError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| EngineError::Internal("invalid encryption key".into()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| EngineError::Internal("encryption failed".into()))?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(&result))
    }

    pub fn decrypt(&self, encrypted_b64: &str) -> Result<Vec<u8>, EngineError> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(encrypted_b64)
            .map_err(|_| EngineError::Internal("stored secret is not valid base64".into()))?;
        if data.len() < NONCE_LEN + 16 {
            return Err(EngineError::Internal("stored secret too short".into()));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| EngineError::Internal("invalid encryption key".into()))?;
        let nonce = Nonce::from_slice(&data[..NONCE_LEN]);
        cipher
            .decrypt(nonce, &data[NONCE_LEN..])
            .map_err(|_| EngineError::Internal("decryption failed (wrong key or tampered data)".into()))
    }
}

/// Hex SHA-256 of a one-time code
pub fn digest_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

/// Constant-time comparison of a supplied code against a stored digest
pub fn code_matches(code: &str, stored_digest: &str) -> bool {
    let supplied = digest_code(code);
    supplied.as_bytes().ct_eq(stored_digest.as_bytes()).into()
}
