//! Wire shapes shared by the device and the operator tooling.
//!
//! This crate holds no I/O and no cryptography: only the serialized forms
//! of envelopes, exchange transcripts and installation records, the rules
//! that decide whether a shape is well-formed, and the base64url query
//! codec used to move them through deep links and mailbox files.

pub mod b64;
pub mod install;
pub mod query;
pub mod wire;

pub use install::{AppIdentity, GitRepo, InstallationRecord, RawInstallation};
pub use query::{extract_query, from_b64url_query, to_b64url_query, QueryError};
pub use wire::{
    is_complete, EncryptedBlock, Envelope, PairingMessage, RawBlock, RawEnvelope,
    RawPairingMessage, RawSealedItem, RawServerAuthData, RawShares, SealedItem, ServerAuthData,
    ShapeError, Shares, UserApp,
};
