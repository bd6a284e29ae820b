//! Password envelopes.
//!
//! `seal` draws a fresh salt and a fresh data key for every call. The data
//! key encrypts the payload; a key-encryption key derived from the password
//! and salt wraps the data key. Both blocks are AES-256-GCM with detached
//! tags so the wire shape keeps `iv`, `tag` and `ev` apart.
//!
//! `open` reports every failure (bad tag on either block, wrong password,
//! truncated fields, malformed shape) as the same `DecryptionFailed`.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use devicepass_types::{from_b64url_query, to_b64url_query, EncryptedBlock, Envelope, RawEnvelope};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{random_bytes, CryptoError, CryptoResult};

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// AES-256 key length
const KEY_LEN: usize = 32;

/// AES-GCM nonce length
const NONCE_LEN: usize = 12;

/// AES-GCM tag length
const TAG_LEN: usize = 16;

/// PBKDF2 rounds used when nothing else is configured.
pub const DEFAULT_KDF_ROUNDS: u32 = 100_000;

/// Leading byte of every data plaintext. Keeps `data.ev` non-empty even
/// for an empty secret, and leaves room for a future format.
const FORMAT_V1: u8 = 1;

const KEY_AAD: &[u8] = b"devicepass/envelope/key";
const DATA_AAD: &[u8] = b"devicepass/envelope/data";

/// Seals and opens password envelopes.
///
/// Both ends must agree on `rounds`; it is not carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeCodec {
    rounds: u32,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(DEFAULT_KDF_ROUNDS)
    }
}

impl EnvelopeCodec {
    pub fn new(rounds: u32) -> Self {
        Self { rounds: rounds.max(1) }
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Encrypt `plaintext` under `password`.
    pub fn seal(&self, password: &str, plaintext: &[u8]) -> CryptoResult<Envelope> {
        let salt = random_bytes(SALT_LEN);
        let kek = self.derive_kek(password, &salt);
        let data_key = Zeroizing::new(random_bytes(KEY_LEN));

        let mut framed = Zeroizing::new(Vec::with_capacity(plaintext.len() + 1));
        framed.push(FORMAT_V1);
        framed.extend_from_slice(plaintext);

        let key = encrypt_block(&kek[..], KEY_AAD, &data_key)?;
        let data = encrypt_block(&data_key, DATA_AAD, &framed)?;
        Ok(Envelope { salt, key, data })
    }

    /// Decrypt an envelope produced by [`seal`](Self::seal).
    pub fn open(&self, password: &str, envelope: &Envelope) -> CryptoResult<Vec<u8>> {
        if envelope.salt.is_empty() {
            return Err(CryptoError::DecryptionFailed);
        }
        let kek = self.derive_kek(password, &envelope.salt);
        let data_key = Zeroizing::new(decrypt_block(&kek[..], KEY_AAD, &envelope.key)?);
        if data_key.len() != KEY_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let mut framed = decrypt_block(&data_key, DATA_AAD, &envelope.data)?;
        match framed.first() {
            Some(&FORMAT_V1) => {
                framed.remove(0);
                Ok(framed)
            }
            _ => Err(CryptoError::DecryptionFailed),
        }
    }

    /// Like [`open`](Self::open), for an envelope that has not been shape-checked.
    pub fn open_raw(&self, password: &str, raw: &RawEnvelope) -> CryptoResult<Vec<u8>> {
        let envelope = Envelope::try_from(raw).map_err(|_| CryptoError::DecryptionFailed)?;
        self.open(password, &envelope)
    }

    /// Seal and encode as a deep-link query (`?salt=…&key.iv=…`).
    pub fn seal_to_query(&self, password: &str, plaintext: &[u8]) -> CryptoResult<String> {
        let envelope = self.seal(password, plaintext)?;
        to_b64url_query(&envelope).map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decode a deep-link query and open it.
    pub fn open_query(&self, password: &str, query: &str) -> CryptoResult<Vec<u8>> {
        let raw: RawEnvelope = from_b64url_query(query).map_err(|_| CryptoError::DecryptionFailed)?;
        self.open_raw(password, &raw)
    }

    fn derive_kek(&self, password: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, self.rounds, &mut key[..]);
        key
    }
}

fn encrypt_block(key: &[u8], aad: &[u8], plaintext: &[u8]) -> CryptoResult<EncryptedBlock> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptionFailed)?;
    let iv = random_bytes(NONCE_LEN);
    let mut ev = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), aad, &mut ev)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(EncryptedBlock {
        iv,
        tag: tag.to_vec(),
        ev,
    })
}

fn decrypt_block(key: &[u8], aad: &[u8], block: &EncryptedBlock) -> CryptoResult<Vec<u8>> {
    if block.iv.len() != NONCE_LEN || block.tag.len() != TAG_LEN || block.ev.is_empty() {
        return Err(CryptoError::DecryptionFailed);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptionFailed)?;
    let mut buffer = block.ev.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&block.iv),
            aad,
            &mut buffer,
            Tag::from_slice(&block.tag),
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::new(64)
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let envelope = codec().seal("hunter2", b"ABCD-1234").unwrap();
        assert_eq!(envelope.salt.len(), SALT_LEN);
        assert_eq!(envelope.key.iv.len(), NONCE_LEN);
        assert_eq!(envelope.key.tag.len(), TAG_LEN);
        assert_eq!(envelope.key.ev.len(), KEY_LEN);
        assert_eq!(codec().open("hunter2", &envelope).unwrap(), b"ABCD-1234");
    }

    #[test]
    fn test_empty_secret_still_well_formed() {
        let envelope = codec().seal("pw", b"").unwrap();
        assert!(!envelope.data.ev.is_empty());
        assert_eq!(codec().open("pw", &envelope).unwrap(), b"");
    }

    #[test]
    fn test_fresh_salt_per_seal() {
        let a = codec().seal("pw", b"same").unwrap();
        let b = codec().seal("pw", b"same").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.data.ev, b.data.ev);
    }

    #[test]
    fn test_wrong_password_matches_corruption_error() {
        let envelope = codec().seal("right", b"token").unwrap();
        let wrong = codec().open("wrong", &envelope).unwrap_err();

        let mut corrupted = envelope.clone();
        corrupted.data.ev[0] ^= 0x01;
        let corrupt = codec().open("right", &corrupted).unwrap_err();

        assert!(matches!(wrong, CryptoError::DecryptionFailed));
        assert!(matches!(corrupt, CryptoError::DecryptionFailed));
        assert_eq!(wrong.to_string(), corrupt.to_string());
    }

    #[test]
    fn test_tampered_key_block_fails() {
        let mut envelope = codec().seal("pw", b"token").unwrap();
        envelope.key.tag[3] ^= 0x80;
        assert!(codec().open("pw", &envelope).is_err());
    }

    #[test]
    fn test_truncated_fields_fail_without_panic() {
        let mut envelope = codec().seal("pw", b"token").unwrap();
        envelope.data.tag.truncate(4);
        assert!(codec().open("pw", &envelope).is_err());

        let mut envelope = codec().seal("pw", b"token").unwrap();
        envelope.key.iv.pop();
        assert!(codec().open("pw", &envelope).is_err());
    }

    #[test]
    fn test_rounds_must_match() {
        let envelope = EnvelopeCodec::new(10).seal("pw", b"token").unwrap();
        assert!(EnvelopeCodec::new(11).open("pw", &envelope).is_err());
    }

    #[test]
    fn test_query_roundtrip_and_malformed_query() {
        let query = codec().seal_to_query("pw", b"user-code").unwrap();
        assert_eq!(codec().open_query("pw", &query).unwrap(), b"user-code");

        let stripped: String = query
            .split('&')
            .filter(|p| !p.starts_with("key.ev="))
            .collect::<Vec<_>>()
            .join("&");
        assert!(matches!(
            codec().open_query("pw", &stripped),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Opening with the sealing password returns the original plaintext.
        #[test]
        fn seal_open_roundtrip(password in ".{0,24}", plaintext in prop::collection::vec(any::<u8>(), 0..256)) {
            let envelope = codec().seal(&password, &plaintext).unwrap();
            prop_assert_eq!(codec().open(&password, &envelope).unwrap(), plaintext);
        }

        /// Flipping any bit of the data ciphertext or tag is detected.
        #[test]
        fn data_tamper_detected(
            plaintext in prop::collection::vec(any::<u8>(), 0..64),
            in_tag in any::<bool>(),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut envelope = codec().seal("pw", &plaintext).unwrap();
            let target = if in_tag { &mut envelope.data.tag } else { &mut envelope.data.ev };
            let i = index.index(target.len());
            target[i] ^= 1 << bit;
            prop_assert!(matches!(codec().open("pw", &envelope), Err(CryptoError::DecryptionFailed)));
        }

        /// A different password never opens the envelope.
        #[test]
        fn wrong_password_rejected(a in "[a-z]{1,12}", b in "[A-Z]{1,12}") {
            let envelope = codec().seal(&a, b"secret").unwrap();
            prop_assert!(matches!(codec().open(&b, &envelope), Err(CryptoError::DecryptionFailed)));
        }
    }
}
