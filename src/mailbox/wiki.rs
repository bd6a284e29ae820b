//! Wiki checkout behind the reader side of the pairing mailbox.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use devicepass_types::GitRepo;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use super::MailboxSource;
use crate::error::{PairError, PairResult};

/// A replicated file tree the device can only read after syncing.
#[async_trait]
pub trait ReplicatedTree: Send + Sync {
    /// Replace any local copy with a fresh clone.
    async fn clone_fresh(&self) -> PairResult<()>;

    async fn pull(&self) -> PairResult<()>;

    /// Contents of `path` in the local copy, `None` if it does not exist.
    async fn read(&self, path: &str) -> PairResult<Option<String>>;
}

/// The repository wiki, checked out with the `git` binary.
#[derive(Clone)]
pub struct GitWiki {
    remote: String,
    parent: PathBuf,
    checkout: PathBuf,
    auth_header: Option<String>,
}

impl std::fmt::Debug for GitWiki {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitWiki")
            .field("remote", &self.remote)
            .field("checkout", &self.checkout)
            .finish_non_exhaustive()
    }
}

impl GitWiki {
    pub fn new(git: &GitRepo, tmp_dir: &Path) -> Self {
        Self {
            remote: format!("https://github.com/{}/{}.wiki.git", git.owner, git.repo),
            parent: tmp_dir.to_path_buf(),
            checkout: tmp_dir.join(format!("{}.wiki", git.repo)),
            auth_header: None,
        }
    }

    /// Authenticate clone and pull with `token`, without writing it to the checkout.
    pub fn with_token(mut self, token: &str) -> Self {
        let basic = STANDARD.encode(format!("x-access-token:{token}"));
        self.auth_header = Some(format!("http.extraHeader=Authorization: Basic {basic}"));
        self
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn checkout(&self) -> &Path {
        &self.checkout
    }

    async fn git(&self, cwd: &Path, args: &[&str]) -> PairResult<()> {
        debug!(cwd = %cwd.display(), ?args, "git");
        let mut command = Command::new("git");
        if let Some(header) = &self.auth_header {
            command.arg("-c").arg(header);
        }
        let output = command.args(args).current_dir(cwd).output().await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(PairError::git(format!("git {} failed: {}", args.join(" "), stderr.trim())))
    }
}

#[async_trait]
impl ReplicatedTree for GitWiki {
    async fn clone_fresh(&self) -> PairResult<()> {
        match tokio::fs::remove_dir_all(&self.checkout).await {
            Ok(()) => debug!(path = %self.checkout.display(), "Removed previous checkout"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.parent).await?;
        let target = self.checkout.to_string_lossy();
        self.git(&self.parent, &["clone", self.remote.as_str(), &*target]).await?;
        info!(remote = %self.remote, "Cloned wiki");
        Ok(())
    }

    async fn pull(&self) -> PairResult<()> {
        self.git(&self.checkout, &["pull", "--quiet"]).await
    }

    async fn read(&self, path: &str) -> PairResult<Option<String>> {
        // Invalid UTF-8 is mangled rather than rejected, so it reads as unparseable content.
        match tokio::fs::read(self.checkout.join(path)).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// A single wiki page used as a mailbox.
///
/// In production every failed read is followed by a pull. Outside
/// production the page is edited in place and never synced.
pub struct WikiMailbox<'a> {
    tree: &'a dyn ReplicatedTree,
    page: String,
    sync: bool,
}

impl<'a> WikiMailbox<'a> {
    pub fn new(tree: &'a dyn ReplicatedTree, page: impl Into<String>, sync: bool) -> Self {
        Self {
            tree,
            page: page.into(),
            sync,
        }
    }
}

#[async_trait]
impl MailboxSource for WikiMailbox<'_> {
    async fn fetch(&self) -> PairResult<Option<String>> {
        self.tree.read(&self.page).await
    }

    async fn resync(&self) -> PairResult<()> {
        if self.sync {
            self.tree.pull().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::mailbox::read_mailbox;
    use crate::poller::PollPolicy;
    use devicepass_types::UserApp;
    use std::time::Duration;

    fn repo() -> GitRepo {
        GitRepo {
            owner: "octo".into(),
            repo: "device".into(),
        }
    }

    #[test]
    fn test_wiki_locations() {
        let wiki = GitWiki::new(&repo(), Path::new("/tmp/pairing"));
        assert_eq!(wiki.remote(), "https://github.com/octo/device.wiki.git");
        assert_eq!(wiki.checkout(), Path::new("/tmp/pairing/device.wiki"));

        let authed = wiki.with_token("gho_secret");
        assert!(!format!("{authed:?}").contains("Basic"));
        assert_eq!(authed.remote(), "https://github.com/octo/device.wiki.git");
    }

    #[tokio::test]
    async fn test_read_page_from_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let wiki = GitWiki::new(&repo(), dir.path());
        assert_eq!(wiki.read("Home.md").await.unwrap(), None);

        std::fs::create_dir_all(wiki.checkout()).unwrap();
        std::fs::write(wiki.checkout().join("Home.md"), "?salt=AQ").unwrap();
        assert_eq!(wiki.read("Home.md").await.unwrap().as_deref(), Some("?salt=AQ"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_page_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let wiki = GitWiki::new(&repo(), dir.path());
        std::fs::create_dir_all(wiki.checkout()).unwrap();
        std::fs::write(wiki.checkout().join("Home.md"), b"?C\xff\xfe").unwrap();

        let mailbox = WikiMailbox::new(&wiki, "Home.md", false);
        let clock = ManualClock::new();
        let policy = PollPolicy::new(Duration::from_secs(1), Duration::from_secs(5));
        let err = read_mailbox::<UserApp>(&mailbox, &clock, policy)
            .await
            .unwrap_err();
        assert!(matches!(err, PairError::Timeout { .. }));
        assert!(clock.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unsynced_mailbox_never_pulls() {
        let dir = tempfile::tempdir().unwrap();
        let wiki = GitWiki::new(&repo(), dir.path());
        // No checkout exists, so a pull would fail.
        let mailbox = WikiMailbox::new(&wiki, "Home.md", false);
        mailbox.resync().await.unwrap();
        assert_eq!(mailbox.fetch().await.unwrap(), None);

        let synced = WikiMailbox::new(&wiki, "Home.md", true);
        assert!(synced.resync().await.is_err());
    }
}
