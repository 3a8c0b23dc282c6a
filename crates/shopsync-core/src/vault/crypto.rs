//! Key derivation, entry encryption and zero-on-drop secret buffers.
//!
//! Argon2id turns the master password into two independent 32-byte values:
//! a verifier (stored) and an encryption key (never stored). Entries are
//! sealed with AES-256-GCM under a fresh 96-bit nonce each time.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;

/// Argon2id cost parameters, stored with the vault so they can change later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_cost: u32,
    /// Number of iterations
    pub time_cost: u32,
    /// Number of lanes
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost: 19_456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests
    #[cfg(test)]
    pub const fn fast() -> Self {
        Self {
            mem_cost: 1_024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.mem_cost, self.time_cost, self.parallelism, Some(KEY_LEN))
            .map_err(|error| Error::Crypto(format!("invalid KDF parameters: {error}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// A 256-bit key scrubbed on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Constant-time equality
    pub fn ct_eq(&self, other: &[u8]) -> bool {
        self.0.as_slice().ct_eq(other).into()
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// Decrypted secret material scrubbed on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.0)
            .map_err(|_| Error::Crypto("vault entry is not valid UTF-8".to_string()))
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes({} bytes)", self.0.len())
    }
}

/// Ciphertext and nonce of one vault entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEntry {
    pub name: String,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Derive a 256-bit value from a password and salt
pub fn derive_key(password: &[u8], salt: &[u8], params: &KdfParams) -> Result<SecretKey> {
    let mut output = [0u8; KEY_LEN];
    params
        .argon2()?
        .hash_password_into(password, salt, &mut output)
        .map_err(|error| Error::Crypto(format!("key derivation failed: {error}")))?;
    let key = SecretKey(output);
    output.zeroize();
    Ok(key)
}

pub fn random_salt() -> [u8; SALT_LEN] {
    rand::random()
}

/// Encrypt `plaintext` under `key` with a random nonce
pub fn seal(key: &SecretKey, name: &str, plaintext: &[u8]) -> Result<SealedEntry> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|error| Error::Crypto(format!("invalid key: {error}")))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|error| Error::Crypto(format!("encryption failed: {error}")))?;

    Ok(SealedEntry {
        name: name.to_string(),
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

/// Decrypt and authenticate an entry
pub fn open(key: &SecretKey, entry: &SealedEntry) -> Result<SecretBytes> {
    if entry.nonce.len() != NONCE_LEN {
        return Err(Error::Crypto(format!(
            "vault entry '{}' has a malformed nonce",
            entry.name
        )));
    }
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|error| Error::Crypto(format!("invalid key: {error}")))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&entry.nonce), entry.ciphertext.as_slice())
        .map_err(|_| {
            Error::Crypto(format!(
                "vault entry '{}' failed authentication",
                entry.name
            ))
        })?;
    Ok(SecretBytes::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic_per_salt() {
        let params = KdfParams::fast();
        let salt = random_salt();

        let first = derive_key(b"hunter2", &salt, &params).unwrap();
        let second = derive_key(b"hunter2", &salt, &params).unwrap();
        assert!(first.ct_eq(second.as_bytes()));

        let other_salt = derive_key(b"hunter2", &random_salt(), &params).unwrap();
        assert!(!first.ct_eq(other_salt.as_bytes()));

        let other_password = derive_key(b"hunter3", &salt, &params).unwrap();
        assert!(!first.ct_eq(other_password.as_bytes()));
    }

    #[test]
    fn seal_then_open() {
        let key = derive_key(b"pw", &random_salt(), &KdfParams::fast()).unwrap();
        let entry = seal(&key, "service_key", b"eyJhbGciOi").unwrap();

        assert_eq!(entry.nonce.len(), NONCE_LEN);
        assert_ne!(entry.ciphertext, b"eyJhbGciOi".to_vec());
        assert_eq!(open(&key, &entry).unwrap().as_str().unwrap(), "eyJhbGciOi");
    }

    #[test]
    fn nonces_are_unique_per_seal() {
        let key = derive_key(b"pw", &random_salt(), &KdfParams::fast()).unwrap();
        let first = seal(&key, "a", b"same").unwrap();
        let second = seal(&key, "a", b"same").unwrap();
        assert_ne!(first.nonce, second.nonce);
    }

    #[test]
    fn open_rejects_wrong_key_and_tampering() {
        let salt = random_salt();
        let key = derive_key(b"right", &salt, &KdfParams::fast()).unwrap();
        let wrong = derive_key(b"wrong", &salt, &KdfParams::fast()).unwrap();
        let mut entry = seal(&key, "service_key", b"secret").unwrap();

        assert!(open(&wrong, &entry).is_err());

        entry.ciphertext[0] ^= 0xff;
        assert!(open(&key, &entry).is_err());
    }

    #[test]
    fn secrets_do_not_leak_through_debug() {
        let key = derive_key(b"pw", &random_salt(), &KdfParams::fast()).unwrap();
        assert_eq!(format!("{key:?}"), "SecretKey([REDACTED])");
        assert_eq!(
            format!("{:?}", SecretBytes::new(b"abc".to_vec())),
            "SecretBytes(3 bytes)"
        );
    }
}
