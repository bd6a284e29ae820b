//! One-direction drop boxes over the public store.
//!
//! The device writes through a [`Mailbox`] (a project board it owns and
//! tears down). It reads through a [`MailboxSource`] (a page it can only
//! see after syncing), polled by [`read_mailbox`] until the content parses
//! as the expected payload. Content that does not parse yet is not an
//! error: the other side may still be writing.

pub mod board;
pub mod wiki;

pub use board::{BoardFactory, ProjectBoard};
pub use wiki::{GitWiki, ReplicatedTree, WikiMailbox};

use async_trait::async_trait;
use devicepass_types::{
    extract_query, from_b64url_query, Envelope, PairingMessage, RawEnvelope, RawPairingMessage,
    UserApp,
};
use std::marker::PhantomData;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::PairResult;
use crate::poller::{Attempt, BoundedPoller, PollPolicy, PollTick, Probe};

/// Writer side: a board holding at most one item.
pub struct Mailbox {
    board: Box<dyn ProjectBoard>,
    name: String,
    finished: bool,
}

impl Mailbox {
    pub async fn open(factory: &dyn BoardFactory, name: &str) -> PairResult<Self> {
        let board = factory.open(name).await?;
        info!(mailbox = name, url = board.url(), "Opened mailbox");
        Ok(Self {
            board,
            name: name.to_string(),
            finished: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        self.board.url()
    }

    pub async fn clear(&self) -> PairResult<()> {
        self.board.clear().await
    }

    /// Replace whatever the board holds with a single item.
    pub async fn publish(&self, title: &str, body: &str) -> PairResult<()> {
        self.board.clear().await?;
        self.board.add_item(title, body).await?;
        info!(mailbox = %self.name, title, "Published item");
        Ok(())
    }

    /// Tear the board down. Later calls do nothing.
    pub async fn finish(&mut self) -> PairResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.board.finish().await?;
        info!(mailbox = %self.name, "Finished mailbox");
        Ok(())
    }

    /// Finish the mailbox and hand back `outcome`.
    ///
    /// The first error wins: a failed flow keeps its own error even when
    /// teardown fails too. A successful flow whose teardown fails reports
    /// the teardown error.
    pub async fn close<T>(mut self, outcome: PairResult<T>) -> PairResult<T> {
        let finished = self.finish().await;
        match (outcome, finished) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(teardown)) => {
                warn!(mailbox = %self.name, error = %teardown, "Teardown failed after error");
                Err(err)
            }
        }
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        if !self.finished {
            warn!(mailbox = %self.name, "Mailbox dropped without being finished");
        }
    }
}

/// Reader side: a location that can be re-read after a sync.
#[async_trait]
pub trait MailboxSource: Send + Sync {
    async fn fetch(&self) -> PairResult<Option<String>>;

    /// Bring the local view up to date before the next fetch.
    async fn resync(&self) -> PairResult<()>;
}

/// Something a mailbox can carry.
pub trait MailboxPayload: Sized + Send {
    const KIND: &'static str;

    /// Parse a query, or `None` if it is not (yet) acceptable.
    fn accept(query: &str) -> Option<Self>;
}

impl MailboxPayload for Envelope {
    const KIND: &'static str = "envelope";

    fn accept(query: &str) -> Option<Self> {
        let raw: RawEnvelope = from_b64url_query(query).ok()?;
        Envelope::try_from(raw).ok()
    }
}

impl MailboxPayload for UserApp {
    const KIND: &'static str = "pairing";

    fn accept(query: &str) -> Option<Self> {
        let raw: RawPairingMessage = from_b64url_query(query).ok()?;
        PairingMessage::try_from(raw).ok()?.into_complete()
    }
}

struct MailboxProbe<'a, P> {
    source: &'a dyn MailboxSource,
    payload: PhantomData<fn() -> P>,
}

#[async_trait]
impl<P: MailboxPayload> Probe for MailboxProbe<'_, P> {
    type Output = P;

    async fn probe(&mut self, tick: PollTick) -> PairResult<Attempt<P>> {
        match self.source.fetch().await? {
            Some(text) => {
                if let Some(payload) = P::accept(&extract_query(&text)) {
                    return Ok(Attempt::Ready(payload));
                }
                debug!(at = %tick.stamp(), kind = P::KIND, "Mailbox content not ready");
            }
            None => debug!(at = %tick.stamp(), kind = P::KIND, "Mailbox empty"),
        }
        self.source.resync().await?;
        Ok(Attempt::NotReady)
    }
}

/// Poll `source` until it holds a well-formed `P`.
pub async fn read_mailbox<P: MailboxPayload>(
    source: &dyn MailboxSource,
    clock: &dyn Clock,
    policy: PollPolicy,
) -> PairResult<P> {
    let poller = BoundedPoller::new(clock, policy, format!("{} in mailbox", P::KIND));
    let mut probe = MailboxProbe::<P> {
        source,
        payload: PhantomData,
    };
    poller.run(&mut probe).await
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::error::PairError;
    use std::sync::{Arc, Mutex};

    /// Everything that happened to the boards a [`FakeBoards`] handed out.
    #[derive(Debug, Default)]
    pub struct BoardLog {
        pub items: Vec<(String, String, String)>,
        pub cleared: Vec<String>,
        pub finished: Vec<String>,
    }

    #[derive(Clone, Default)]
    pub struct FakeBoards {
        pub log: Arc<Mutex<BoardLog>>,
        pub fail_finish: bool,
    }

    impl FakeBoards {
        pub fn finished(&self) -> Vec<String> {
            self.log.lock().unwrap().finished.clone()
        }

        pub fn items(&self) -> Vec<(String, String, String)> {
            self.log.lock().unwrap().items.clone()
        }
    }

    struct FakeBoard {
        title: String,
        url: String,
        log: Arc<Mutex<BoardLog>>,
        fail_finish: bool,
    }

    #[async_trait]
    impl ProjectBoard for FakeBoard {
        async fn clear(&self) -> PairResult<()> {
            let mut log = self.log.lock().unwrap();
            log.items.retain(|(board, _, _)| board != &self.title);
            log.cleared.push(self.title.clone());
            Ok(())
        }

        async fn add_item(&self, title: &str, body: &str) -> PairResult<()> {
            self.log
                .lock()
                .unwrap()
                .items
                .push((self.title.clone(), title.to_string(), body.to_string()));
            Ok(())
        }

        async fn finish(&self) -> PairResult<()> {
            self.log.lock().unwrap().finished.push(self.title.clone());
            if self.fail_finish {
                return Err(PairError::Platform {
                    status: 502,
                    message: "finish failed".into(),
                });
            }
            Ok(())
        }

        fn url(&self) -> &str {
            &self.url
        }
    }

    #[async_trait]
    impl BoardFactory for FakeBoards {
        async fn open(&self, title: &str) -> PairResult<Box<dyn ProjectBoard>> {
            Ok(Box::new(FakeBoard {
                title: title.to_string(),
                url: format!("https://github.com/users/octo/projects/{}", title.len()),
                log: self.log.clone(),
                fail_finish: self.fail_finish,
            }))
        }
    }

    /// Serves a scripted sequence of page contents, one per sync.
    pub struct ScriptedSource {
        pages: Mutex<Vec<Option<String>>>,
        pub resyncs: Mutex<u32>,
    }

    impl ScriptedSource {
        pub fn new(pages: Vec<Option<String>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                resyncs: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl MailboxSource for ScriptedSource {
        async fn fetch(&self) -> PairResult<Option<String>> {
            Ok(self.pages.lock().unwrap().first().cloned().flatten())
        }

        async fn resync(&self) -> PairResult<()> {
            *self.resyncs.lock().unwrap() += 1;
            let mut pages = self.pages.lock().unwrap();
            if pages.len() > 1 {
                pages.remove(0);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::{FakeBoards, ScriptedSource};
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::EnvelopeCodec;
    use crate::error::PairError;
    use devicepass_types::to_b64url_query;
    use std::time::Duration;

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_secs(1), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_publish_replaces_existing_item() {
        let boards = FakeBoards::default();
        let mut mailbox = Mailbox::open(&boards, "Login").await.unwrap();
        mailbox.publish("first", "a").await.unwrap();
        mailbox.publish("second", "b").await.unwrap();

        assert_eq!(
            boards.items(),
            vec![("Login".to_string(), "second".to_string(), "b".to_string())]
        );
        assert_eq!(boards.log.lock().unwrap().cleared.len(), 2);
        tokio_test::assert_ok!(mailbox.finish().await);
        tokio_test::assert_ok!(mailbox.finish().await);
        assert_eq!(boards.finished(), vec!["Login".to_string()]);
    }

    #[tokio::test]
    async fn test_close_keeps_flow_error_over_teardown_error() {
        let boards = FakeBoards {
            fail_finish: true,
            ..Default::default()
        };
        let mailbox = Mailbox::open(&boards, "Activate").await.unwrap();
        let err = mailbox
            .close::<()>(Err(PairError::Decrypt))
            .await
            .unwrap_err();
        assert!(matches!(err, PairError::Decrypt));
        assert_eq!(boards.finished(), vec!["Activate".to_string()]);

        let mailbox = Mailbox::open(&boards, "Activate").await.unwrap();
        let err = mailbox.close(Ok(1)).await.unwrap_err();
        assert!(matches!(err, PairError::Platform { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_reader_waits_through_empty_and_malformed_content() {
        let envelope = EnvelopeCodec::new(8).seal("pw", b"code").unwrap();
        let link = format!(
            "# [Log in](https://pass.example/login{})",
            to_b64url_query(&envelope).unwrap()
        );
        let source = ScriptedSource::new(vec![
            None,
            Some("?salt=AQ&key.iv=".into()),
            Some("not a query at all".into()),
            Some(link),
        ]);
        let clock = ManualClock::new();

        let read: Envelope = read_mailbox(&source, &clock, policy()).await.unwrap();
        assert_eq!(read, envelope);
        assert_eq!(*source.resyncs.lock().unwrap(), 3);
        assert_eq!(clock.sleeps().len(), 4);
    }

    #[tokio::test]
    async fn test_pending_pairing_is_not_ready() {
        let pending = devicepass_types::wire::RawPairingMessage {
            C: Some(to_raw_envelope()),
            S: None,
        };
        let source = ScriptedSource::new(vec![Some(to_b64url_query(&pending).unwrap())]);
        let clock = ManualClock::new();

        let err = read_mailbox::<UserApp>(&source, &clock, policy())
            .await
            .unwrap_err();
        assert!(matches!(err, PairError::Timeout { .. }));
    }

    fn to_raw_envelope() -> RawEnvelope {
        let envelope = EnvelopeCodec::new(8).seal("pw", b"x").unwrap();
        serde_json::from_value(serde_json::to_value(envelope).unwrap()).unwrap()
    }
}
