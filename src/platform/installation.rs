use async_trait::async_trait;
use devicepass_types::RawInstallation;

use super::GithubClient;
use crate::error::PairResult;
use crate::install::InstallationSource;

/// Installation lookup, authenticated as the app.
#[derive(Debug, Clone)]
pub struct GithubInstallations {
    client: GithubClient,
}

impl GithubInstallations {
    pub fn new(client: GithubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InstallationSource for GithubInstallations {
    async fn fetch_installation(&self, owner: &str) -> PairResult<Option<RawInstallation>> {
        self.client
            .get_optional(&format!("users/{owner}/installation"))
            .await
    }
}
