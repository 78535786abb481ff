use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use super::CryptoError;

/// Encode bytes as standard RFC 4648 base64 with `=` padding
#[must_use]
pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode standard padded base64
///
/// The returned vector has exactly the decoded length.
///
/// # Errors
///
/// Returns `CryptoError::InvalidBase64Length` if the input length is not a
/// multiple of four, or `CryptoError::InvalidBase64` for characters outside
/// the alphabet or misplaced padding.
pub fn base64_decode(encoded: &str) -> Result<Vec<u8>, CryptoError> {
    let encoded = encoded.trim();
    if encoded.len() % 4 != 0 {
        return Err(CryptoError::InvalidBase64Length(encoded.len()));
    }

    BASE64
        .decode(encoded)
        .map_err(|e| CryptoError::InvalidBase64(e.to_string()))
}
