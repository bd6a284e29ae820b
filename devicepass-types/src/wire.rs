//! Envelope and pairing-transcript shapes.
//!
//! Every validated type deserializes through a `Raw*` mirror whose fields
//! are all optional, and is only produced when every byte field is present
//! and non-empty. A shape with any field missing is rejected as a whole.

#![allow(non_snake_case)]

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::b64;

/// A required field was absent or empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {shape}: `{field}` is missing or empty")]
pub struct ShapeError {
    pub shape: &'static str,
    pub field: &'static str,
}

fn require(
    value: &Option<Vec<u8>>,
    shape: &'static str,
    field: &'static str,
) -> Result<Vec<u8>, ShapeError> {
    match value {
        Some(bytes) if !bytes.is_empty() => Ok(bytes.clone()),
        _ => Err(ShapeError { shape, field }),
    }
}

fn require_node<'a, T>(
    value: &'a Option<T>,
    shape: &'static str,
    field: &'static str,
) -> Result<&'a T, ShapeError> {
    value.as_ref().ok_or(ShapeError { shape, field })
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Nonce, authentication tag and ciphertext of one AEAD operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBlock")]
pub struct EncryptedBlock {
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    #[serde(with = "b64")]
    pub tag: Vec<u8>,
    #[serde(with = "b64")]
    pub ev: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBlock {
    #[serde(default, with = "b64::option")]
    pub iv: Option<Vec<u8>>,
    #[serde(default, with = "b64::option")]
    pub tag: Option<Vec<u8>>,
    #[serde(default, with = "b64::option")]
    pub ev: Option<Vec<u8>>,
}

impl TryFrom<&RawBlock> for EncryptedBlock {
    type Error = ShapeError;

    fn try_from(raw: &RawBlock) -> Result<Self, Self::Error> {
        Ok(Self {
            iv: require(&raw.iv, "block", "iv")?,
            tag: require(&raw.tag, "block", "tag")?,
            ev: require(&raw.ev, "block", "ev")?,
        })
    }
}

impl TryFrom<RawBlock> for EncryptedBlock {
    type Error = ShapeError;

    fn try_from(raw: RawBlock) -> Result<Self, Self::Error> {
        Self::try_from(&raw)
    }
}

/// Password-sealed secret: the salt, the wrapped data key, and the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct Envelope {
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    pub key: EncryptedBlock,
    pub data: EncryptedBlock,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEnvelope {
    #[serde(default, with = "b64::option")]
    pub salt: Option<Vec<u8>>,
    #[serde(default)]
    pub key: Option<RawBlock>,
    #[serde(default)]
    pub data: Option<RawBlock>,
}

impl TryFrom<&RawEnvelope> for Envelope {
    type Error = ShapeError;

    fn try_from(raw: &RawEnvelope) -> Result<Self, Self::Error> {
        let salt = require(&raw.salt, "envelope", "salt")?;
        let key = require_node(&raw.key, "envelope", "key")?;
        let data = require_node(&raw.data, "envelope", "data")?;
        Ok(Self {
            salt,
            key: EncryptedBlock::try_from(key)?,
            data: EncryptedBlock::try_from(data)?,
        })
    }
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = ShapeError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        Self::try_from(&raw)
    }
}

// ---------------------------------------------------------------------------
// Exchange transcript
// ---------------------------------------------------------------------------

/// A ciphertext with its own message authentication tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSealedItem")]
pub struct SealedItem {
    #[serde(with = "b64")]
    pub body: Vec<u8>,
    #[serde(with = "b64")]
    pub mac_tag: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSealedItem {
    #[serde(default, with = "b64::option")]
    pub body: Option<Vec<u8>>,
    #[serde(default, with = "b64::option")]
    pub mac_tag: Option<Vec<u8>>,
}

impl TryFrom<&RawSealedItem> for SealedItem {
    type Error = ShapeError;

    fn try_from(raw: &RawSealedItem) -> Result<Self, Self::Error> {
        Ok(Self {
            body: require(&raw.body, "sealed item", "body")?,
            mac_tag: require(&raw.mac_tag, "sealed item", "mac_tag")?,
        })
    }
}

impl TryFrom<RawSealedItem> for SealedItem {
    type Error = ShapeError;

    fn try_from(raw: RawSealedItem) -> Result<Self, Self::Error> {
        Self::try_from(&raw)
    }
}

/// The three credential shares of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawShares")]
pub struct Shares {
    pub pu: SealedItem,
    pub Pu: SealedItem,
    pub Ps: SealedItem,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawShares {
    #[serde(default)]
    pub pu: Option<RawSealedItem>,
    #[serde(default)]
    pub Pu: Option<RawSealedItem>,
    #[serde(default)]
    pub Ps: Option<RawSealedItem>,
}

impl TryFrom<&RawShares> for Shares {
    type Error = ShapeError;

    fn try_from(raw: &RawShares) -> Result<Self, Self::Error> {
        Ok(Self {
            pu: SealedItem::try_from(require_node(&raw.pu, "shares", "pu")?)?,
            Pu: SealedItem::try_from(require_node(&raw.Pu, "shares", "Pu")?)?,
            Ps: SealedItem::try_from(require_node(&raw.Ps, "shares", "Ps")?)?,
        })
    }
}

impl TryFrom<RawShares> for Shares {
    type Error = ShapeError;

    fn try_from(raw: RawShares) -> Result<Self, Self::Error> {
        Self::try_from(&raw)
    }
}

/// Server side of the password-authenticated exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawServerAuthData")]
pub struct ServerAuthData {
    #[serde(with = "b64")]
    pub As: Vec<u8>,
    #[serde(with = "b64")]
    pub Xs: Vec<u8>,
    #[serde(with = "b64")]
    pub beta: Vec<u8>,
    pub c: Shares,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawServerAuthData {
    #[serde(default, with = "b64::option")]
    pub As: Option<Vec<u8>>,
    #[serde(default, with = "b64::option")]
    pub Xs: Option<Vec<u8>>,
    #[serde(default, with = "b64::option")]
    pub beta: Option<Vec<u8>>,
    #[serde(default)]
    pub c: Option<RawShares>,
}

impl TryFrom<&RawServerAuthData> for ServerAuthData {
    type Error = ShapeError;

    fn try_from(raw: &RawServerAuthData) -> Result<Self, Self::Error> {
        Ok(Self {
            As: require(&raw.As, "server auth data", "As")?,
            Xs: require(&raw.Xs, "server auth data", "Xs")?,
            beta: require(&raw.beta, "server auth data", "beta")?,
            c: Shares::try_from(require_node(&raw.c, "server auth data", "c")?)?,
        })
    }
}

impl TryFrom<RawServerAuthData> for ServerAuthData {
    type Error = ShapeError;

    fn try_from(raw: RawServerAuthData) -> Result<Self, Self::Error> {
        Self::try_from(&raw)
    }
}

// ---------------------------------------------------------------------------
// Pairing message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPairingMessage {
    #[serde(default)]
    pub C: Option<RawEnvelope>,
    #[serde(default)]
    pub S: Option<RawServerAuthData>,
}

/// An envelope together with the finished exchange transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserApp {
    pub envelope: Envelope,
    pub server: ServerAuthData,
}

/// What the operator has pasted so far.
///
/// A message whose envelope is well-formed but whose transcript is absent
/// or partial is `Pending`; the exchange is still being written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawPairingMessage")]
pub enum PairingMessage {
    Pending(Envelope),
    Complete(UserApp),
}

impl PairingMessage {
    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Pending(envelope) => envelope,
            Self::Complete(app) => &app.envelope,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn into_complete(self) -> Option<UserApp> {
        match self {
            Self::Complete(app) => Some(app),
            Self::Pending(_) => None,
        }
    }
}

impl TryFrom<&RawPairingMessage> for PairingMessage {
    type Error = ShapeError;

    fn try_from(raw: &RawPairingMessage) -> Result<Self, Self::Error> {
        let envelope = Envelope::try_from(require_node(&raw.C, "pairing message", "C")?)?;
        match raw.S.as_ref().map(ServerAuthData::try_from) {
            Some(Ok(server)) => Ok(Self::Complete(UserApp { envelope, server })),
            _ => Ok(Self::Pending(envelope)),
        }
    }
}

impl TryFrom<RawPairingMessage> for PairingMessage {
    type Error = ShapeError;

    fn try_from(raw: RawPairingMessage) -> Result<Self, Self::Error> {
        Self::try_from(&raw)
    }
}

#[derive(Serialize)]
struct PairingWire<'a> {
    C: &'a Envelope,
    #[serde(skip_serializing_if = "Option::is_none")]
    S: Option<&'a ServerAuthData>,
}

impl Serialize for PairingMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Pending(envelope) => PairingWire { C: envelope, S: None },
            Self::Complete(app) => PairingWire {
                C: &app.envelope,
                S: Some(&app.server),
            },
        };
        wire.serialize(serializer)
    }
}

/// True iff the envelope and all nine transcript byte fields are present.
pub fn is_complete(raw: &RawPairingMessage) -> bool {
    PairingMessage::try_from(raw).is_ok_and(|m| m.is_complete())
}
