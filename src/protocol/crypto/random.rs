use rand::RngCore;
use rand::rngs::OsRng;

use super::CryptoError;

/// `len` bytes from the OS CSPRNG
///
/// # Errors
///
/// Returns `CryptoError::RngError` if the entropy source is unavailable.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut buf = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| CryptoError::RngError(e.to_string()))?;
    Ok(buf)
}
