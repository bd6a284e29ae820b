//! Activation and pairing entry points.
//!
//! Activation is a straight pipeline. Each mailbox it opens is closed
//! exactly once through [`Mailbox::close`], whatever the pipeline returned,
//! so the boards are gone on every exit path.

use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use devicepass_types::UserApp;

use crate::clock::Clock;
use crate::config::{ActivationConfig, Settings};
use crate::crypto::{generate_pepper, EnvelopeCodec};
use crate::device_auth::{AccessGrant, DeviceAuthEndpoint, DeviceAuthorizer, DeviceFlow};
use crate::error::{PairError, PairResult};
use crate::mailbox::{read_mailbox, BoardFactory, Mailbox, ReplicatedTree, WikiMailbox};
use crate::platform::secrets::{provision_secret, revoke_secret};
use crate::platform::PlatformSecrets;

pub const ACTIVATED: &str = "Activated User!";

pub const ACTIVATE_BOARD: &str = "Activate";
pub const LOGIN_BOARD: &str = "Login";
pub const ACTIVATE_TITLE: &str = "Activate with GitHub Code";
pub const LOGIN_TITLE: &str = "Password Manager Login";

/// Collaborators an activation runs against.
#[derive(Clone, Copy)]
pub struct PairingContext<'a> {
    pub device_auth: &'a dyn DeviceAuthEndpoint,
    pub boards: &'a dyn BoardFactory,
    pub secrets: &'a dyn PlatformSecrets,
    pub clock: &'a dyn Clock,
}

/// What a successful activation leaves behind.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Activation {
    pub access_token: String,
    pub pepper: String,
}

impl std::fmt::Debug for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activation").finish_non_exhaustive()
    }
}

pub fn activation_body(settings: &Settings, sealed_code: &str) -> String {
    format!("# [Get 2FA Code]({})", settings.pairing.deep_link("activate", sealed_code))
}

pub fn login_body(settings: &Settings, sealed_token: &str) -> String {
    format!("# [Log in]({})", settings.pairing.deep_link("login", sealed_token))
}

struct Activator<'a> {
    ctx: PairingContext<'a>,
    settings: &'a Settings,
    activation: &'a ActivationConfig,
    codec: EnvelopeCodec,
}

/// Run a full activation.
///
/// Gets an operator grant through the device flow and hands the operator
/// the sealed user code and then the sealed token. Provisions a fresh
/// pepper and revokes the master password secret.
pub async fn activate(
    ctx: PairingContext<'_>,
    settings: &Settings,
    activation: &ActivationConfig,
) -> PairResult<Activation> {
    let activator = Activator {
        ctx,
        settings,
        activation,
        codec: EnvelopeCodec::new(settings.pairing.kdf_rounds),
    };
    let authorizer = DeviceAuthorizer::new(
        ctx.device_auth,
        ctx.clock,
        &activation.client_id,
        settings.pairing.deadline(),
    );
    let mut flow = DeviceFlow::new(settings.pairing.grant_requirements());

    let code = authorizer.configure(&mut flow).await?;
    let sealed_code = activator
        .codec
        .seal_to_query(&activation.master_pass, code.user_code.as_bytes())?;

    let code_box = Mailbox::open(ctx.boards, ACTIVATE_BOARD).await?;
    let outcome = activator
        .run(&code_box, &sealed_code, &authorizer, &mut flow)
        .await;
    let result = code_box.close(outcome).await;
    match &result {
        Ok(_) => info!("{}", ACTIVATED),
        Err(err) => warn!(kind = ?err.kind(), error = %err, "Activation failed"),
    }
    result
}

impl Activator<'_> {
    async fn run(
        &self,
        code_box: &Mailbox,
        sealed_code: &str,
        authorizer: &DeviceAuthorizer<'_>,
        flow: &mut DeviceFlow,
    ) -> PairResult<Activation> {
        code_box
            .publish(ACTIVATE_TITLE, &activation_body(self.settings, sealed_code))
            .await?;
        info!("Activate with '{}' project: {}", ACTIVATE_BOARD, code_box.url());

        let grant = authorizer.await_grant(flow).await?;

        let login_box = Mailbox::open(self.ctx.boards, LOGIN_BOARD).await?;
        let outcome = self.login(&login_box, &grant).await;
        login_box.close(outcome).await
    }

    async fn login(&self, login_box: &Mailbox, grant: &AccessGrant) -> PairResult<Activation> {
        let pairing = &self.settings.pairing;
        let git = self.settings.git.repo();

        let sealed_token = self
            .codec
            .seal_to_query(&self.activation.master_pass, grant.access_token.as_bytes())?;
        login_box
            .publish(LOGIN_TITLE, &login_body(self.settings, &sealed_token))
            .await?;
        info!("Log in with '{}' project: {}", LOGIN_BOARD, login_box.url());

        let pepper = generate_pepper();
        provision_secret(
            self.ctx.secrets,
            &git,
            &pairing.environment,
            &pairing.pepper_secret_name,
            &pepper,
        )
        .await?;
        revoke_secret(
            self.ctx.secrets,
            &git,
            &pairing.environment,
            &pairing.master_secret_name,
        )
        .await?;

        Ok(Activation {
            access_token: grant.access_token.clone(),
            pepper,
        })
    }
}

/// Wait for the operator to paste a complete pairing message.
///
/// `Ok(None)` means the deadline passed and the caller may try again.
/// In production the wiki is cloned fresh first and pulled between reads.
pub async fn verify(
    tree: &dyn ReplicatedTree,
    clock: &dyn Clock,
    settings: &Settings,
) -> PairResult<Option<UserApp>> {
    if settings.production {
        tree.clone_fresh().await?;
    }
    let source = WikiMailbox::new(tree, settings.wiki.home.as_str(), settings.production);
    match read_mailbox::<UserApp>(&source, clock, settings.pairing.poll_policy()).await {
        Ok(app) => {
            info!("Pairing message received");
            Ok(Some(app))
        }
        Err(PairError::Timeout { elapsed, .. }) => {
            warn!(elapsed_secs = elapsed.as_secs(), "No complete pairing message yet");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
