//! Waiting for the operator to install the device's platform app.

use async_trait::async_trait;
use devicepass_types::{AppIdentity, GitRepo, InstallationRecord, RawInstallation};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::PairResult;
use crate::poller::{Attempt, BoundedPoller, PollPolicy, PollTick, Probe};

#[async_trait]
pub trait InstallationSource: Send + Sync {
    /// The app's installation for `owner`, `None` while there is none.
    async fn fetch_installation(&self, owner: &str) -> PairResult<Option<RawInstallation>>;
}

struct InstallProbe<'a> {
    source: &'a dyn InstallationSource,
    git: &'a GitRepo,
    app: &'a AppIdentity,
}

#[async_trait]
impl Probe for InstallProbe<'_> {
    type Output = InstallationRecord;

    async fn probe(&mut self, tick: PollTick) -> PairResult<Attempt<InstallationRecord>> {
        let Some(raw) = self.source.fetch_installation(&self.git.owner).await? else {
            debug!(at = %tick.stamp(), "App not installed yet");
            return Ok(Attempt::NotReady);
        };
        match InstallationRecord::from_raw(self.git.clone(), self.app.clone(), &raw) {
            Ok(record) => Ok(Attempt::Ready(record)),
            Err(shape) => {
                debug!(at = %tick.stamp(), %shape, "Installation incomplete");
                Ok(Attempt::NotReady)
            }
        }
    }
}

/// Poll until the app is installed with an id and permissions.
pub async fn read_installation(
    source: &dyn InstallationSource,
    clock: &dyn Clock,
    policy: PollPolicy,
    git: &GitRepo,
    app: &AppIdentity,
) -> PairResult<InstallationRecord> {
    let poller = BoundedPoller::new(clock, policy, "app installation");
    let mut probe = InstallProbe { source, git, app };
    let record = poller.run(&mut probe).await?;
    info!(installation = record.id, owner = %git.owner, "App installed");
    Ok(record)
}
