//! Chunk encryption layer for docstream.
//!
//! Provides per-chunk encryption for large documents using:
//! - A random 256-bit master key per document
//! - HMAC-SHA256 derivation of a 128-bit subkey per chunk
//! - AES-128-CBC with PKCS#7 padding and a fresh IV per encryption
//!
//! # Architecture
//!
//! The encryption uses a two-tier key system:
//!
//! 1. **Master Key**: Generated randomly the first time a document is
//!    requested. It lives only in process memory and is handed to the
//!    client alongside the document metadata.
//!
//! 2. **Chunk Subkey**: Derived from the master key and the chunk index.
//!    Never stored - recomputed on demand, so any chunk can be encrypted
//!    or decrypted independently and in any order.
//!
//! This architecture allows:
//! - Resumed downloads that fetch chunks out of order
//! - Limiting the exposure of one leaked chunk key to that chunk
//! - Cheap key setup (no randomness needed per chunk)

mod cipher;
mod error;
mod key;

pub use cipher::{
    decrypt, decrypt_chunk, encrypt, encrypt_chunk, encrypted_len, BLOCK_SIZE, IV_SIZE,
    PDF_SIGNATURE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_chunk_subkey, ChunkSubkey, MasterKey, MASTER_KEY_SIZE, SUBKEY_SIZE};
