//! Credential encryption at rest: connection passwords are always held as
//! ciphertext under the service's key, never in the clear.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use ragcore::{Error, Result};
use sha2::{Digest, Sha256};

/// Encrypts and decrypts connection passwords with AES-256-GCM under a key
/// derived from the service's configured secret.
pub struct CredentialCipher {
    key: Key<Aes256Gcm>,
}

impl CredentialCipher {
    /// Derive a 256-bit key from an arbitrary-length secret via SHA-256,
    /// so operators can supply any passphrase in configuration.
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        CredentialCipher {
            key: *Key::<Aes256Gcm>::from_slice(&digest),
        }
    }

    /// Encrypt `plaintext`, returning `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new(&self.key);
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::Internal(format!("credential encryption failed: {e}")))?;
        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    /// Decrypt a value produced by [`Self::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let raw = STANDARD
            .decode(encoded)
            .map_err(|e| Error::Internal(format!("credential ciphertext malformed: {e}")))?;
        if raw.len() < 12 {
            return Err(Error::Internal("credential ciphertext too short".into()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(12);
        let cipher = Aes256Gcm::new(&self.key);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| Error::Internal(format!("credential decryption failed: {e}")))?;
        String::from_utf8(plaintext)
            .map_err(|e| Error::Internal(format!("decrypted credential not utf8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_password() {
        let cipher = CredentialCipher::from_secret("test-secret");
        let encrypted = cipher.encrypt("hunter2").unwrap();
        assert_ne!(encrypted, "hunter2");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "hunter2");
    }

    #[test]
    fn distinct_encryptions_use_distinct_nonces() {
        let cipher = CredentialCipher::from_secret("test-secret");
        let a = cipher.encrypt("hunter2").unwrap();
        let b = cipher.encrypt("hunter2").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let cipher_a = CredentialCipher::from_secret("secret-a");
        let cipher_b = CredentialCipher::from_secret("secret-b");
        let encrypted = cipher_a.encrypt("hunter2").unwrap();
        assert!(cipher_b.decrypt(&encrypted).is_err());
    }
}
