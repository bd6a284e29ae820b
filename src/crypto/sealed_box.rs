//! Anonymous sealed boxes for the platform's secret store.
//!
//! The platform publishes a Curve25519 public key per environment and only
//! accepts secret values sealed to it in the libsodium `crypto_box_seal`
//! format. This is unrelated to the password envelope: the device cannot
//! read a value back once it is sealed.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use crypto_box::{aead::OsRng, PublicKey};
use serde::{Deserialize, Serialize};

use super::{CryptoError, CryptoResult};

/// Public key the platform hands out for sealing secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformKey {
    pub key_id: String,
    /// Base64 (standard alphabet) Curve25519 public key
    pub key: String,
}

/// A secret value ready to upload.
#[derive(Debug, Clone, Serialize)]
pub struct SealedSecret {
    pub key_id: String,
    pub encrypted_value: String,
}

/// Parse a Curve25519 public key from base64.
pub fn parse_public_key(base64_key: &str) -> CryptoResult<PublicKey> {
    let bytes = BASE64.decode(base64_key)?;
    let arr: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    Ok(PublicKey::from(arr))
}

/// Seal `value` so that only the holder of the platform's private key can open it.
pub fn seal_for(platform_key: &PlatformKey, value: &[u8]) -> CryptoResult<SealedSecret> {
    let public_key = parse_public_key(&platform_key.key)?;
    let sealed = public_key
        .seal(&mut OsRng, value)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(SealedSecret {
        key_id: platform_key.key_id.clone(),
        encrypted_value: BASE64.encode(sealed),
    })
}
