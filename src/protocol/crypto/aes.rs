use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::{CryptoError, lengths};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES-128-CBC encrypt with PKCS#7 padding
///
/// The output is always a whole number of blocks; a block-aligned plaintext
/// gains one full padding block.
///
/// # Errors
///
/// Returns `CryptoError::InvalidKeyLength` if key or IV is not 16 bytes.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_lengths(key, iv)?;

    let cipher = Aes128CbcEnc::new_from_slices(key, iv).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: lengths::AES_128_KEY,
            actual: key.len(),
        }
    })?;

    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// AES-128-CBC decrypt and strip PKCS#7 padding
///
/// # Errors
///
/// Returns `CryptoError::InvalidKeyLength` for a bad key or IV, and
/// `CryptoError::DecryptionFailed` if the ciphertext is not block aligned
/// or its padding is invalid.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_lengths(key, iv)?;

    if ciphertext.is_empty() || ciphertext.len() % lengths::AES_BLOCK != 0 {
        return Err(CryptoError::DecryptionFailed(format!(
            "ciphertext length {} is not a positive multiple of {}",
            ciphertext.len(),
            lengths::AES_BLOCK
        )));
    }

    let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|_| {
        CryptoError::InvalidKeyLength {
            expected: lengths::AES_128_KEY,
            actual: key.len(),
        }
    })?;

    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed("invalid padding".into()))
}

fn check_lengths(key: &[u8], iv: &[u8]) -> Result<(), CryptoError> {
    if key.len() != lengths::AES_128_KEY {
        return Err(CryptoError::InvalidKeyLength {
            expected: lengths::AES_128_KEY,
            actual: key.len(),
        });
    }
    if iv.len() != lengths::AES_BLOCK {
        return Err(CryptoError::InvalidKeyLength {
            expected: lengths::AES_BLOCK,
            actual: iv.len(),
        });
    }
    Ok(())
}
