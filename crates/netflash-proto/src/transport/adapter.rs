//! Transport trait

use async_trait::async_trait;
use netflash_core::{BoardIdentity, MacAddress, SessionState};

use super::TransportError;

/// Link-level endpoint the flasher talks to boards through
///
/// One transport is bound to one interface and shared by every session the
/// runner drives. Calls are strictly sequential; no two sessions overlap.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Wait until a board announces itself
    ///
    /// May wait indefinitely; callers race it against shutdown.
    async fn discover(&self) -> Result<BoardIdentity, TransportError>;

    /// Send one frame carrying `payload` and `state` to `destination`
    async fn send(
        &self,
        payload: &[u8],
        state: SessionState,
        destination: MacAddress,
    ) -> Result<(), TransportError>;

    /// Wait for one response frame from `board`
    ///
    /// Returns the frame without the sender address, or `None` when nothing
    /// arrived within the transport's timeout. Frames from other senders are
    /// skipped.
    async fn receive(
        &self,
        board: MacAddress,
        state: SessionState,
    ) -> Result<Option<Vec<u8>>, TransportError>;

    /// Consume the one frame `board` emits for a transfer chunk
    ///
    /// Flow control only; the content is never inspected.
    async fn drain(&self, board: MacAddress, state: SessionState) -> Result<(), TransportError> {
        self.receive(board, state).await.map(|_| ())
    }

    /// Release the underlying endpoint; later calls fail with
    /// [`TransportError::ConnectionClosed`]
    async fn close(&self);

    fn is_closed(&self) -> bool;
}
