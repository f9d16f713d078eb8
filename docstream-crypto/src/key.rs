//! Per-document master keys and per-chunk subkey derivation.

use crate::error::{CryptoError, CryptoResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a document master key in bytes (256 bits).
pub const MASTER_KEY_SIZE: usize = 32;

/// Size of a chunk subkey in bytes (AES-128).
pub const SUBKEY_SIZE: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Random per-document secret from which every chunk subkey is derived.
///
/// The key bytes are zeroized on drop. `created_at` anchors the cache TTL.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    #[zeroize(skip)]
    document_id: String,
    key_bytes: [u8; MASTER_KEY_SIZE],
    #[zeroize(skip)]
    created_at: DateTime<Utc>,
}

impl MasterKey {
    /// Generates a fresh random key for a document, stamped with the current time.
    pub fn generate(document_id: impl Into<String>) -> Self {
        let mut key_bytes = [0u8; MASTER_KEY_SIZE];
        rand::rng().fill_bytes(&mut key_bytes);
        Self::from_bytes(document_id, key_bytes, Utc::now())
    }

    /// Reconstructs a key from raw bytes.
    pub fn from_bytes(
        document_id: impl Into<String>,
        key_bytes: [u8; MASTER_KEY_SIZE],
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            key_bytes,
            created_at,
        }
    }

    /// Reconstructs a key from its base64 form, as handed to clients.
    pub fn from_base64(
        document_id: impl Into<String>,
        encoded: &str,
        created_at: DateTime<Utc>,
    ) -> CryptoResult<Self> {
        let mut decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::KeyDerivation(format!("invalid base64 key: {e}")))?;

        if decoded.len() != MASTER_KEY_SIZE {
            let actual = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKeyLength {
                expected: MASTER_KEY_SIZE,
                actual,
            });
        }

        let mut key_bytes = [0u8; MASTER_KEY_SIZE];
        key_bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::from_bytes(document_id, key_bytes, created_at))
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn as_bytes(&self) -> &[u8; MASTER_KEY_SIZE] {
        &self.key_bytes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Age of the key at `now`. A creation time in the future counts as zero.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }

    /// Standard base64 encoding of the key bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.key_bytes)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("document_id", &self.document_id)
            .field("key_bytes", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// AES-128 key for exactly one chunk of one document.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ChunkSubkey([u8; SUBKEY_SIZE]);

impl ChunkSubkey {
    pub fn from_bytes(bytes: [u8; SUBKEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SUBKEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for ChunkSubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChunkSubkey(<redacted>)")
    }
}

/// Derives the subkey for `chunk_index`.
///
/// `HMAC-SHA256(key, key ++ "_" ++ decimal(chunk_index))`, truncated to the
/// first 16 bytes. Deterministic and stateless.
pub fn derive_chunk_subkey(master: &MasterKey, chunk_index: u64) -> CryptoResult<ChunkSubkey> {
    let mut mac = HmacSha256::new_from_slice(master.as_bytes())
        .map_err(|e| CryptoError::KeyDerivation(format!("HMAC init failed: {e}")))?;

    mac.update(master.as_bytes());
    mac.update(b"_");
    mac.update(chunk_index.to_string().as_bytes());

    let digest = mac.finalize().into_bytes();
    let mut subkey = [0u8; SUBKEY_SIZE];
    subkey.copy_from_slice(&digest[..SUBKEY_SIZE]);
    Ok(ChunkSubkey(subkey))
}
