//! Environment secrets on the platform.

use async_trait::async_trait;
use devicepass_types::GitRepo;
use serde::Deserialize;
use tracing::info;

use super::GithubClient;
use crate::crypto::{seal_for, PlatformKey, SealedSecret};
use crate::error::PairResult;

/// Secret-store operations the pairing flow needs.
#[async_trait]
pub trait PlatformSecrets: Send + Sync {
    async fn repository_id(&self, git: &GitRepo) -> PairResult<u64>;

    async fn public_key(&self, repo_id: u64, env: &str) -> PairResult<PlatformKey>;

    async fn put_secret(&self, repo_id: u64, env: &str, name: &str, sealed: &SealedSecret) -> PairResult<()>;

    async fn delete_secret(&self, repo_id: u64, env: &str, name: &str) -> PairResult<()>;
}

/// Seal `value` under the environment's public key and store it as `name`.
pub async fn provision_secret(
    store: &dyn PlatformSecrets,
    git: &GitRepo,
    env: &str,
    name: &str,
    value: &str,
) -> PairResult<()> {
    let repo_id = store.repository_id(git).await?;
    let key = store.public_key(repo_id, env).await?;
    let sealed = seal_for(&key, value.as_bytes())?;
    store.put_secret(repo_id, env, name, &sealed).await?;
    info!(secret = name, env, "Added secret");
    Ok(())
}

/// Remove secret `name` from the environment.
pub async fn revoke_secret(store: &dyn PlatformSecrets, git: &GitRepo, env: &str, name: &str) -> PairResult<()> {
    let repo_id = store.repository_id(git).await?;
    store.delete_secret(repo_id, env, name).await?;
    info!(secret = name, env, "Deleted secret");
    Ok(())
}

#[derive(Deserialize)]
struct RepoResponse {
    id: u64,
}

/// REST implementation of [`PlatformSecrets`].
#[derive(Debug, Clone)]
pub struct GithubSecrets {
    client: GithubClient,
}

impl GithubSecrets {
    pub fn new(client: GithubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlatformSecrets for GithubSecrets {
    async fn repository_id(&self, git: &GitRepo) -> PairResult<u64> {
        let repo: RepoResponse = self
            .client
            .get_json(&format!("repos/{}/{}", git.owner, git.repo))
            .await?;
        Ok(repo.id)
    }

    async fn public_key(&self, repo_id: u64, env: &str) -> PairResult<PlatformKey> {
        self.client
            .get_json(&format!("repositories/{repo_id}/environments/{env}/secrets/public-key"))
            .await
    }

    async fn put_secret(&self, repo_id: u64, env: &str, name: &str, sealed: &SealedSecret) -> PairResult<()> {
        self.client
            .put_json(
                &format!("repositories/{repo_id}/environments/{env}/secrets/{name}"),
                sealed,
            )
            .await
    }

    async fn delete_secret(&self, repo_id: u64, env: &str, name: &str) -> PairResult<()> {
        self.client
            .delete(&format!("repositories/{repo_id}/environments/{env}/secrets/{name}"))
            .await
    }
}
