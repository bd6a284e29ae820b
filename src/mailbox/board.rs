//! Project-board store behind the writer side of a mailbox.

use async_trait::async_trait;

use crate::error::PairResult;

/// One board, owned by the device for the lifetime of a mailbox.
#[async_trait]
pub trait ProjectBoard: Send + Sync {
    /// Remove every item on the board. Removing from an empty board succeeds.
    async fn clear(&self) -> PairResult<()>;

    async fn add_item(&self, title: &str, body: &str) -> PairResult<()>;

    /// Delete the board itself.
    async fn finish(&self) -> PairResult<()>;

    /// Where the operator can see the board.
    fn url(&self) -> &str;
}

/// Finds or creates a board by title for the configured owner.
#[async_trait]
pub trait BoardFactory: Send + Sync {
    async fn open(&self, title: &str) -> PairResult<Box<dyn ProjectBoard>>;
}
