pub mod clock;
pub mod config;
pub mod crypto;
pub mod device_auth;
pub mod error;
pub mod install;
pub mod mailbox;
pub mod pairing;
pub mod pake;
pub mod platform;
pub mod poller;

pub use config::{ActivationConfig, Settings};
pub use error::{FailureKind, PairError, PairResult};
pub use pairing::{activate, verify, Activation, PairingContext, ACTIVATED};
