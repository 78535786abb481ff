use super::*;
use proptest::prelude::*;

// --- digest.rs tests ---

#[test]
fn test_sha1_known_vector() {
    // FIPS 180-1 "abc"
    let digest = hash_sha1(b"abc");
    assert_eq!(
        digest,
        [
            0xa9, 0x99, 0x3e, 0x36, 0x47, 0x06, 0x81, 0x6a, 0xba, 0x3e, 0x25, 0x71, 0x78, 0x50,
            0xc2, 0x6c, 0x9c, 0xd0, 0xd8, 0x9d
        ]
    );
}

#[test]
fn test_hmac_sha1_rfc2202_case_2() {
    let mac = hmac_sha1(b"Jefe", b"what do ya want for nothing?").unwrap();
    assert_eq!(
        mac,
        [
            0xef, 0xfc, 0xdf, 0x6a, 0xe5, 0xeb, 0x2f, 0xa2, 0xd2, 0x74, 0x16, 0xd5, 0xf1, 0x84,
            0xdf, 0x9c, 0x25, 0x9a, 0x7c, 0x79
        ]
    );
}

#[test]
fn test_verify_hmac_sha1() {
    let key = [0x42u8; 16];
    let tag = hmac_sha1(&key, b"challenge").unwrap();

    assert!(verify_hmac_sha1(&key, b"challenge", &tag));
    assert!(!verify_hmac_sha1(&key, b"challengf", &tag));
    assert!(!verify_hmac_sha1(&[0x43u8; 16], b"challenge", &tag));
    assert!(!verify_hmac_sha1(&key, b"challenge", &tag[..19]));
}

// --- aes.rs tests ---

#[test]
fn test_aes_cbc_roundtrip_unaligned() {
    let key = [0x42u8; 16];
    let iv = [0x24u8; 16];
    let plaintext = b"Hello, AirPlay session key!";

    let ciphertext = aes_cbc_encrypt(&key, &iv, plaintext).unwrap();
    assert_eq!(ciphertext.len() % lengths::AES_BLOCK, 0);
    assert_eq!(ciphertext.len(), 32);

    let decrypted = aes_cbc_decrypt(&key, &iv, &ciphertext).unwrap();
    assert_eq!(decrypted, plaintext);
}

#[test]
fn test_aes_cbc_aligned_gets_full_pad_block() {
    let key = [0x01u8; 16];
    let iv = [0x02u8; 16];
    let plaintext = [0xAAu8; 32];

    let ciphertext = aes_cbc_encrypt(&key, &iv, &plaintext).unwrap();
    assert_eq!(ciphertext.len(), 48);
    assert_eq!(aes_cbc_decrypt(&key, &iv, &ciphertext).unwrap(), plaintext);
}

#[test]
fn test_aes_cbc_empty_plaintext() {
    let key = [0u8; 16];
    let iv = [0u8; 16];

    let ciphertext = aes_cbc_encrypt(&key, &iv, b"").unwrap();
    assert_eq!(ciphertext.len(), 16);
    assert!(aes_cbc_decrypt(&key, &iv, &ciphertext).unwrap().is_empty());
}

#[test]
fn test_aes_cbc_invalid_key_and_iv() {
    assert_eq!(
        aes_cbc_encrypt(&[0u8; 15], &[0u8; 16], b"x"),
        Err(CryptoError::InvalidKeyLength {
            expected: 16,
            actual: 15
        })
    );
    assert_eq!(
        aes_cbc_decrypt(&[0u8; 16], &[0u8; 8], &[0u8; 16]),
        Err(CryptoError::InvalidKeyLength {
            expected: 16,
            actual: 8
        })
    );
}

#[test]
fn test_aes_cbc_rejects_unaligned_ciphertext() {
    let result = aes_cbc_decrypt(&[0u8; 16], &[0u8; 16], &[0u8; 17]);
    assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
}

#[test]
fn test_aes_cbc_wrong_key_fails_padding() {
    let ciphertext = aes_cbc_encrypt(&[0x11u8; 16], &[0u8; 16], b"secret").unwrap();
    // A wrong key yields garbage; padding check catches it in practice.
    let result = aes_cbc_decrypt(&[0x12u8; 16], &[0u8; 16], &ciphertext);
    if let Ok(plain) = result {
        assert_ne!(plain, b"secret");
    }
}

// --- encoding.rs tests ---

#[test]
fn test_base64_rfc4648_vectors() {
    let vectors: [(&[u8], &str); 7] = [
        (b"", ""),
        (b"f", "Zg=="),
        (b"fo", "Zm8="),
        (b"foo", "Zm9v"),
        (b"foob", "Zm9vYg=="),
        (b"fooba", "Zm9vYmE="),
        (b"foobar", "Zm9vYmFy"),
    ];

    for (raw, encoded) in vectors {
        assert_eq!(base64_encode(raw), encoded);
        assert_eq!(base64_decode(encoded).unwrap(), raw);
    }
}

#[test]
fn test_base64_decode_invalid_length() {
    assert_eq!(
        base64_decode("Zm9vY"),
        Err(CryptoError::InvalidBase64Length(5))
    );
}

#[test]
fn test_base64_decode_invalid_characters() {
    assert!(matches!(
        base64_decode("Zm9*"),
        Err(CryptoError::InvalidBase64(_))
    ));
    assert!(matches!(
        base64_decode("Z=9v"),
        Err(CryptoError::InvalidBase64(_))
    ));
}

#[test]
fn test_base64_decode_reports_exact_length() {
    assert_eq!(base64_decode("Zm8=").unwrap().len(), 2);
    assert_eq!(base64_decode("Zg==").unwrap().len(), 1);
}

proptest! {
    #[test]
    fn prop_base64_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let encoded = base64_encode(&data);
        prop_assert_eq!(encoded.len() % 4, 0);
        prop_assert_eq!(base64_decode(&encoded).unwrap(), data);
    }
}

// --- random.rs tests ---

#[test]
fn test_random_bytes_length() {
    assert_eq!(random_bytes(0).unwrap().len(), 0);
    assert_eq!(random_bytes(32).unwrap().len(), 32);
}

#[test]
fn test_random_bytes_differ() {
    let a = random_bytes(16).unwrap();
    let b = random_bytes(16).unwrap();
    assert_ne!(a, b);
}
