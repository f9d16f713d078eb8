//! AES-128-CBC chunk encryption.
//!
//! Every call to [`encrypt`] draws a fresh random IV, so the same plaintext
//! under the same subkey never produces the same bytes twice. The wire
//! framing is `IV (16 bytes) ++ ciphertext`.
//!
//! Chunk 0 of a PDF keeps its `%PDF-` signature in the clear so that
//! clients sniffing the magic header still recognize the payload:
//! `"%PDF-" ++ IV ++ ciphertext(rest)`.

use crate::error::{CryptoError, CryptoResult};
use crate::key::ChunkSubkey;
use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

/// IV size in bytes.
pub const IV_SIZE: usize = 16;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Magic header left unencrypted at the start of chunk 0.
pub const PDF_SIGNATURE: &[u8; 5] = b"%PDF-";

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Encrypts `plaintext` under `subkey` with a fresh IV. Returns `IV ++ ciphertext`.
pub fn encrypt(plaintext: &[u8], subkey: &ChunkSubkey) -> Vec<u8> {
    let mut iv = [0u8; IV_SIZE];
    rand::rng().fill_bytes(&mut iv);

    let ciphertext = Aes128CbcEnc::new(subkey.as_bytes().into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypts an `IV ++ ciphertext` payload produced by [`encrypt`].
pub fn decrypt(payload: &[u8], subkey: &ChunkSubkey) -> CryptoResult<Vec<u8>> {
    if payload.len() < IV_SIZE + BLOCK_SIZE {
        return Err(CryptoError::Decryption(format!(
            "payload too short: {} bytes",
            payload.len()
        )));
    }

    let (iv, ciphertext) = payload.split_at(IV_SIZE);
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::Decryption(format!(
            "ciphertext length {} is not a multiple of the block size",
            ciphertext.len()
        )));
    }

    let mut iv_bytes = [0u8; IV_SIZE];
    iv_bytes.copy_from_slice(iv);

    Aes128CbcDec::new(subkey.as_bytes().into(), &iv_bytes.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| {
            CryptoError::Decryption("invalid padding (wrong key or tampered data)".to_string())
        })
}

/// Encrypts one logical chunk, applying the `%PDF-` header exemption to chunk 0.
pub fn encrypt_chunk(chunk_index: u64, plaintext: &[u8], subkey: &ChunkSubkey) -> Vec<u8> {
    if chunk_index == 0 && plaintext.starts_with(PDF_SIGNATURE) {
        let rest = encrypt(&plaintext[PDF_SIGNATURE.len()..], subkey);
        let mut out = Vec::with_capacity(PDF_SIGNATURE.len() + rest.len());
        out.extend_from_slice(PDF_SIGNATURE);
        out.extend_from_slice(&rest);
        return out;
    }

    encrypt(plaintext, subkey)
}

/// Inverse of [`encrypt_chunk`].
///
/// An exempted payload is `5 + 16k` bytes long while a plain one is `16k`,
/// so the two framings never collide.
pub fn decrypt_chunk(chunk_index: u64, payload: &[u8], subkey: &ChunkSubkey) -> CryptoResult<Vec<u8>> {
    let exempted = chunk_index == 0
        && payload.starts_with(PDF_SIGNATURE)
        && payload.len() % BLOCK_SIZE == PDF_SIGNATURE.len();

    if exempted {
        let rest = decrypt(&payload[PDF_SIGNATURE.len()..], subkey)?;
        let mut out = Vec::with_capacity(PDF_SIGNATURE.len() + rest.len());
        out.extend_from_slice(PDF_SIGNATURE);
        out.extend_from_slice(&rest);
        return Ok(out);
    }

    decrypt(payload, subkey)
}

/// Size of `encrypt(plaintext)` for a plaintext of `plain_len` bytes.
pub fn encrypted_len(plain_len: usize) -> usize {
    IV_SIZE + (plain_len / BLOCK_SIZE + 1) * BLOCK_SIZE
}
