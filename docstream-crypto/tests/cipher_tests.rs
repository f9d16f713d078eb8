use docstream_crypto::{
    decrypt, decrypt_chunk, derive_chunk_subkey, encrypt, encrypt_chunk, encrypted_len,
    ChunkSubkey, CryptoError, MasterKey, IV_SIZE, PDF_SIGNATURE,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn subkey_for(chunk_index: u64) -> (MasterKey, ChunkSubkey) {
    let master = MasterKey::generate("doc-cipher");
    let subkey = derive_chunk_subkey(&master, chunk_index).unwrap();
    (master, subkey)
}

proptest! {
    #[test]
    fn decrypt_inverts_encrypt(plaintext in proptest::collection::vec(any::<u8>(), 0..4096), key in any::<[u8; 16]>()) {
        let subkey = ChunkSubkey::from_bytes(key);
        let payload = encrypt(&plaintext, &subkey);
        prop_assert_eq!(payload.len(), encrypted_len(plaintext.len()));
        prop_assert_eq!(decrypt(&payload, &subkey).unwrap(), plaintext);
    }

    #[test]
    fn repeated_encryption_never_repeats_bytes(plaintext in proptest::collection::vec(any::<u8>(), 0..512), key in any::<[u8; 16]>()) {
        let subkey = ChunkSubkey::from_bytes(key);
        let a = encrypt(&plaintext, &subkey);
        let b = encrypt(&plaintext, &subkey);
        prop_assert_ne!(&a[..IV_SIZE], &b[..IV_SIZE]);
        prop_assert_ne!(&a, &b);
        prop_assert_eq!(decrypt(&a, &subkey).unwrap(), decrypt(&b, &subkey).unwrap());
    }

    #[test]
    fn chunk_roundtrip_for_any_index(index in 0u64..64, body in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let (_master, subkey) = subkey_for(index);
        let payload = encrypt_chunk(index, &body, &subkey);
        prop_assert_eq!(decrypt_chunk(index, &payload, &subkey).unwrap(), body);
    }

    #[test]
    fn distinct_indexes_yield_distinct_subkeys(a in 0u64..1_000_000, b in 0u64..1_000_000) {
        prop_assume!(a != b);
        let master = MasterKey::generate("doc-derive");
        let ka = derive_chunk_subkey(&master, a).unwrap();
        let kb = derive_chunk_subkey(&master, b).unwrap();
        prop_assert_ne!(ka, kb);
    }
}

#[test]
fn pdf_header_passes_through_on_chunk_zero() {
    let (_master, subkey) = subkey_for(0);
    let mut body = PDF_SIGNATURE.to_vec();
    body.extend_from_slice(b"1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj");

    let payload = encrypt_chunk(0, &body, &subkey);
    assert_eq!(&payload[..5], b"%PDF-");
    assert_eq!(payload.len(), 5 + encrypted_len(body.len() - 5));
    assert_eq!(decrypt_chunk(0, &payload, &subkey).unwrap(), body);
}

#[test]
fn pdf_header_encrypted_on_later_chunks() {
    let (_master, subkey) = subkey_for(1);
    let body = b"%PDF-looks-like-a-header-but-is-not-chunk-zero".to_vec();

    let payload = encrypt_chunk(1, &body, &subkey);
    assert_eq!(payload.len(), encrypted_len(body.len()));
    assert_eq!(decrypt_chunk(1, &payload, &subkey).unwrap(), body);
}

#[test]
fn non_pdf_chunk_zero_fully_encrypted() {
    let (_master, subkey) = subkey_for(0);
    let body = b"PK\x03\x04 not a pdf".to_vec();

    let payload = encrypt_chunk(0, &body, &subkey);
    assert_eq!(payload.len(), encrypted_len(body.len()));
    assert_eq!(decrypt_chunk(0, &payload, &subkey).unwrap(), body);
}

#[test]
fn wrong_subkey_fails_or_garbles() {
    let master = MasterKey::generate("doc-wrong-key");
    let right = derive_chunk_subkey(&master, 2).unwrap();
    let wrong = derive_chunk_subkey(&master, 3).unwrap();
    let body = vec![0x5Au8; 1000];

    let payload = encrypt(&body, &right);
    match decrypt(&payload, &wrong) {
        Err(CryptoError::Decryption(_)) => {}
        Ok(garbled) => assert_ne!(garbled, body),
        Err(other) => panic!("expected decryption error, got: {other:?}"),
    }
}

#[test]
fn tampered_padding_rejected() {
    let subkey = ChunkSubkey::from_bytes([9u8; 16]);
    let mut payload = encrypt(b"short", &subkey);
    // In a one-block message the last IV byte XORs straight into the pad byte.
    payload[IV_SIZE - 1] ^= 0xFF;
    let err = decrypt(&payload, &subkey).unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));
}

#[test]
fn short_final_chunk_roundtrips() {
    // 2,500,000 byte document: chunk 2 carries 402,848 bytes.
    let (_master, subkey) = subkey_for(2);
    let body: Vec<u8> = (0..402_848u32).map(|i| (i % 251) as u8).collect();

    let payload = encrypt_chunk(2, &body, &subkey);
    assert_eq!(payload.len(), encrypted_len(402_848));
    assert_eq!(decrypt_chunk(2, &payload, &subkey).unwrap(), body);
}
