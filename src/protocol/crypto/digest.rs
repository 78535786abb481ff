use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

use super::{CryptoError, lengths};

type HmacSha1 = Hmac<Sha1>;

/// SHA-1 digest of `data`
#[must_use]
pub fn hash_sha1(data: &[u8]) -> [u8; lengths::SHA1_DIGEST] {
    Sha1::digest(data).into()
}

/// HMAC-SHA1 of `message` keyed by `key`
///
/// # Errors
///
/// Returns `CryptoError::InvalidKeyLength` if the MAC cannot be keyed.
pub fn hmac_sha1(key: &[u8], message: &[u8]) -> Result<[u8; lengths::SHA1_DIGEST], CryptoError> {
    let mut mac = keyed(key)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Check `tag == hmac_sha1(key, message)` in constant time
///
/// Tags of the wrong length are rejected without comparing.
#[must_use]
pub fn verify_hmac_sha1(key: &[u8], message: &[u8], tag: &[u8]) -> bool {
    if tag.len() != lengths::SHA1_DIGEST {
        return false;
    }
    let Ok(mut mac) = keyed(key) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(tag).is_ok()
}

fn keyed(key: &[u8]) -> Result<HmacSha1, CryptoError> {
    HmacSha1::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: lengths::SHA1_DIGEST,
        actual: key.len(),
    })
}
