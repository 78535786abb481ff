use thiserror::Error;

/// Cryptographic operation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Key, IV or MAC key had the wrong size
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes
        expected: usize,
        /// Supplied length in bytes
        actual: usize,
    },

    /// Ciphertext was malformed or its padding did not check out
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Base64 input length is not a multiple of four
    #[error("invalid base64 length: {0}")]
    InvalidBase64Length(usize),

    /// Base64 input contains a character outside the alphabet
    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    /// The OS entropy source could not be read
    #[error("RNG error: {0}")]
    RngError(String),
}
