//! Acceptance rules for the password-authenticated exchange transcript.
//!
//! The group arithmetic of the exchange is done elsewhere. What lives here
//! is the decision of whether a pasted transcript may be used: it must be
//! structurally complete, and each of its three sealed shares must carry a
//! valid tag on its own.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use devicepass_types::{SealedItem, ServerAuthData, UserApp};
pub use devicepass_types::{is_complete, PairingMessage};

use crate::error::{PairError, PairResult};

type HmacSha256 = Hmac<Sha256>;

/// Which credential share a sealed item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareRole {
    /// Client private key share.
    PrivateUser,
    /// Client public key share.
    PublicUser,
    /// Server public share.
    PublicServer,
}

impl ShareRole {
    pub const ALL: [ShareRole; 3] = [Self::PrivateUser, Self::PublicUser, Self::PublicServer];

    pub fn label(self) -> &'static str {
        match self {
            Self::PrivateUser => "pu",
            Self::PublicUser => "Pu",
            Self::PublicServer => "Ps",
        }
    }

    pub fn item(self, server: &ServerAuthData) -> &SealedItem {
        match self {
            Self::PrivateUser => &server.c.pu,
            Self::PublicUser => &server.c.Pu,
            Self::PublicServer => &server.c.Ps,
        }
    }
}

/// Checks the tag of one sealed share.
pub trait ShareVerifier: Send + Sync {
    fn verify(&self, role: ShareRole, item: &SealedItem) -> bool;
}

/// HMAC-SHA256 over the role label and the share body, keyed by the
/// exchange session key.
pub struct HmacShareVerifier {
    key: Zeroizing<Vec<u8>>,
}

impl HmacShareVerifier {
    pub fn new(session_key: &[u8]) -> Self {
        Self {
            key: Zeroizing::new(session_key.to_vec()),
        }
    }

    fn mac(&self, role: ShareRole, body: &[u8]) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(role.label().as_bytes());
        mac.update(&[0]);
        mac.update(body);
        mac
    }

    /// Seal `body` for `role`.
    pub fn seal(&self, role: ShareRole, body: &[u8]) -> SealedItem {
        SealedItem {
            body: body.to_vec(),
            mac_tag: self.mac(role, body).finalize().into_bytes().to_vec(),
        }
    }
}

impl ShareVerifier for HmacShareVerifier {
    fn verify(&self, role: ShareRole, item: &SealedItem) -> bool {
        self.mac(role, &item.body).verify_slice(&item.mac_tag).is_ok()
    }
}

/// Accept a transcript only if every share authenticates.
///
/// All three shares are checked even after one fails, and any failure
/// rejects the whole transcript as `Decrypt`.
pub fn verify_transcript(app: &UserApp, verifier: &dyn ShareVerifier) -> PairResult<()> {
    let failed: Vec<&str> = ShareRole::ALL
        .into_iter()
        .filter(|role| !verifier.verify(*role, role.item(&app.server)))
        .map(ShareRole::label)
        .collect();
    if failed.is_empty() {
        debug!("All transcript shares authenticated");
        return Ok(());
    }
    warn!(shares = ?failed, "Transcript rejected");
    Err(PairError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use devicepass_types::{RawPairingMessage, Shares};

    fn transcript(verifier: &HmacShareVerifier) -> UserApp {
        let envelope = crate::crypto::EnvelopeCodec::new(8).seal("pw", b"x").unwrap();
        UserApp {
            envelope,
            server: ServerAuthData {
                As: vec![1; 32],
                Xs: vec![2; 32],
                beta: vec![3; 32],
                c: Shares {
                    pu: verifier.seal(ShareRole::PrivateUser, b"private share"),
                    Pu: verifier.seal(ShareRole::PublicUser, b"public share"),
                    Ps: verifier.seal(ShareRole::PublicServer, b"server share"),
                },
            },
        }
    }

    #[test]
    fn test_all_shares_valid() {
        let verifier = HmacShareVerifier::new(b"session key");
        let app = transcript(&verifier);
        verify_transcript(&app, &verifier).unwrap();
    }

    #[test]
    fn test_any_bad_share_rejects_transcript() {
        let verifier = HmacShareVerifier::new(b"session key");
        for role in ShareRole::ALL {
            let mut app = transcript(&verifier);
            let item = match role {
                ShareRole::PrivateUser => &mut app.server.c.pu,
                ShareRole::PublicUser => &mut app.server.c.Pu,
                ShareRole::PublicServer => &mut app.server.c.Ps,
            };
            item.mac_tag[0] ^= 1;
            let err = verify_transcript(&app, &verifier).unwrap_err();
            assert!(matches!(err, PairError::Decrypt), "{}", role.label());
        }
    }

    #[test]
    fn test_shares_are_bound_to_roles() {
        let verifier = HmacShareVerifier::new(b"session key");
        let mut app = transcript(&verifier);
        std::mem::swap(&mut app.server.c.Pu, &mut app.server.c.Ps);
        assert!(verify_transcript(&app, &verifier).is_err());
    }

    #[test]
    fn test_wrong_session_key_rejects() {
        let app = transcript(&HmacShareVerifier::new(b"session key"));
        let other = HmacShareVerifier::new(b"another key");
        assert!(matches!(
            verify_transcript(&app, &other),
            Err(PairError::Decrypt)
        ));
    }

    #[test]
    fn test_pending_message_is_not_complete() {
        let raw = RawPairingMessage::default();
        assert!(!is_complete(&raw));
    }
}
