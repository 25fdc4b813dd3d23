use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use proptest::prelude::*;
use stagehand_crypto::{
    decode_nonce, encode_nonce, generate_content_key, generate_nonce, open_payload, seal_payload,
    unwrap_content_key, wrap_content_key, CryptoError, MasterKey, KEY_SIZE, NONCE_SIZE,
};

fn test_master_key() -> MasterKey {
    MasterKey::from_base64(&BASE64.encode([7u8; KEY_SIZE])).unwrap()
}

#[test]
fn payload_seal_open_roundtrip() {
    let key = generate_content_key();
    let nonce = generate_nonce();
    let plaintext = b"column1,column2\n1,2\n";

    let ciphertext = seal_payload(&key, &nonce, plaintext).unwrap();
    assert_ne!(&ciphertext[..], &plaintext[..]);

    let recovered = open_payload(&key, &nonce, &ciphertext).unwrap();
    assert_eq!(recovered, plaintext);
}

#[test]
fn empty_payload_roundtrip() {
    let key = generate_content_key();
    let nonce = generate_nonce();

    let ciphertext = seal_payload(&key, &nonce, b"").unwrap();
    // Poly1305 tag only
    assert_eq!(ciphertext.len(), 16);

    let recovered = open_payload(&key, &nonce, &ciphertext).unwrap();
    assert!(recovered.is_empty());
}

#[test]
fn wrong_content_key_fails_to_open() {
    let key = generate_content_key();
    let other = generate_content_key();
    let nonce = generate_nonce();

    let ciphertext = seal_payload(&key, &nonce, b"secret").unwrap();
    assert!(open_payload(&other, &nonce, &ciphertext).is_err());
}

#[test]
fn tampered_ciphertext_fails_to_open() {
    let key = generate_content_key();
    let nonce = generate_nonce();

    let mut ciphertext = seal_payload(&key, &nonce, b"secret").unwrap();
    ciphertext[0] ^= 0xFF;
    assert!(open_payload(&key, &nonce, &ciphertext).is_err());
}

#[test]
fn wrap_unwrap_roundtrip() {
    let master = test_master_key();
    let key = generate_content_key();

    let wrapped = wrap_content_key(&master, &key).unwrap();
    let unwrapped = unwrap_content_key(&master, &wrapped).unwrap();

    assert_eq!(unwrapped.as_bytes(), key.as_bytes());
}

#[test]
fn rewrap_produces_different_blob_for_same_key() {
    let master = test_master_key();
    let key = generate_content_key();

    let first = wrap_content_key(&master, &key).unwrap();
    let second = wrap_content_key(&master, &key).unwrap();

    // Fresh wrap nonce each time
    assert_ne!(first, second);
    assert_eq!(
        unwrap_content_key(&master, &first).unwrap().as_bytes(),
        unwrap_content_key(&master, &second).unwrap().as_bytes(),
    );
}

#[test]
fn wrong_master_key_fails_to_unwrap() {
    let master = test_master_key();
    let other = MasterKey::from_base64(&BASE64.encode([9u8; KEY_SIZE])).unwrap();
    let key = generate_content_key();

    let wrapped = wrap_content_key(&master, &key).unwrap();
    assert!(matches!(
        unwrap_content_key(&other, &wrapped),
        Err(CryptoError::Decryption(_))
    ));
}

#[test]
fn malformed_wrapped_key_is_key_material_error() {
    let master = test_master_key();

    assert!(matches!(
        unwrap_content_key(&master, "not base64!!!"),
        Err(CryptoError::KeyMaterial(_))
    ));
    assert!(matches!(
        unwrap_content_key(&master, &BASE64.encode(b"short")),
        Err(CryptoError::KeyMaterial(_))
    ));
}

#[test]
fn master_key_rejects_wrong_length_material() {
    let result = MasterKey::from_base64(&BASE64.encode([1u8; 16]));
    assert!(matches!(
        result,
        Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: 16
        })
    ));
}

#[test]
fn master_key_rejects_non_base64_material() {
    assert!(matches!(
        MasterKey::from_base64("@@@"),
        Err(CryptoError::KeyMaterial(_))
    ));
}

#[test]
fn nonce_encoding_roundtrip() {
    let nonce = generate_nonce();
    let encoded = encode_nonce(&nonce);
    assert_eq!(decode_nonce(&encoded).unwrap(), nonce);
}

#[test]
fn nonce_decoding_rejects_wrong_length() {
    assert!(matches!(
        decode_nonce(&BASE64.encode([0u8; 8])),
        Err(CryptoError::InvalidKeyLength {
            expected: NONCE_SIZE,
            actual: 8
        })
    ));
}

proptest! {
    #[test]
    fn any_payload_roundtrips(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let key = generate_content_key();
        let nonce = generate_nonce();

        let ciphertext = seal_payload(&key, &nonce, &payload).unwrap();
        let recovered = open_payload(&key, &nonce, &ciphertext).unwrap();
        prop_assert_eq!(recovered, payload);
    }
}
