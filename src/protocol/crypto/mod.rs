//! Cryptographic primitives for pairing and session keys
//!
//! Every function here is pure and stateless: no I/O beyond the OS entropy
//! source used by [`random_bytes`].

mod aes;
mod digest;
mod encoding;
mod error;
mod random;
#[cfg(test)]
mod tests;

pub use self::aes::{aes_cbc_decrypt, aes_cbc_encrypt};
pub use self::digest::{hash_sha1, hmac_sha1, verify_hmac_sha1};
pub use self::encoding::{base64_decode, base64_encode};
pub use self::error::CryptoError;
pub use self::random::random_bytes;

/// Length of various cryptographic values
pub mod lengths {
    /// SHA-1 / HMAC-SHA1 digest length
    pub const SHA1_DIGEST: usize = 20;
    /// AES-128 key length
    pub const AES_128_KEY: usize = 16;
    /// AES block (and CBC IV) length
    pub const AES_BLOCK: usize = 16;
}
