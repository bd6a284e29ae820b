//! Cryptographic primitives for device pairing.
//!
//! Uses:
//! - PBKDF2-HMAC-SHA256 to derive a key-encryption key from the master password
//! - AES-256-GCM (detached tags) for both envelope blocks
//! - X25519 + XSalsa20-Poly1305 anonymous sealed boxes for platform secrets

pub mod envelope;
pub mod sealed_box;

pub use envelope::{EnvelopeCodec, DEFAULT_KDF_ROUNDS};
pub use sealed_box::{seal_for, PlatformKey, SealedSecret};

use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid public key format")]
    InvalidPublicKey,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - invalid ciphertext or wrong key")]
    DecryptionFailed,
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Fresh random bytes from the OS generator.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Random secret suitable for a pepper, as unpadded base64url.
pub fn generate_pepper() -> String {
    devicepass_types::b64::encode(&random_bytes(32))
}
