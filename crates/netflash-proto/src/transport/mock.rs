//! Scripted mock transport for testing
//!
//! Boards returned by `discover()` and frames returned by `receive()` are
//! queued up front. Every frame the flasher sends is recorded so tests can
//! assert on the exact conversation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use netflash_core::{BoardIdentity, MacAddress, SessionState};
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{Transport, TransportError};
use crate::codec;

/// Hardware address the mock uses as its own
pub const MOCK_LOCAL_MAC: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0xAA]);

/// One frame the flasher handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub payload: Vec<u8>,
    pub state: SessionState,
    pub destination: MacAddress,
}

/// Scripted transport
pub struct MockTransport {
    boards: Mutex<VecDeque<BoardIdentity>>,
    /// `None` entries stand for silence (receive timeout)
    replies: Mutex<VecDeque<Option<Vec<u8>>>>,
    sent: Mutex<Vec<SentFrame>>,
    send_fault: Mutex<Option<TransportError>>,
    reply_state: Mutex<SessionState>,
    closed: AtomicBool,
    idle: watch::Sender<bool>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (idle, _) = watch::channel(false);
        Self {
            boards: Mutex::new(VecDeque::new()),
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            send_fault: Mutex::new(None),
            reply_state: Mutex::new(SessionState::default()),
            closed: AtomicBool::new(false),
            idle,
        }
    }

    /// Queue a board for `discover()`
    pub fn push_board(&self, board: BoardIdentity) {
        self.boards.lock().push_back(board);
        self.idle.send_replace(false);
    }

    /// Queue a response frame carrying `payload`
    ///
    /// The frame's state counts up by one per queued reply.
    pub fn push_reply(&self, payload: &[u8]) {
        let state = {
            let mut state = self.reply_state.lock();
            *state = SessionState::new(state.sent.wrapping_add(1), state.received.wrapping_add(1));
            *state
        };
        self.push_reply_with_state(payload, state);
    }

    /// Queue a response frame with an explicit state
    pub fn push_reply_with_state(&self, payload: &[u8], state: SessionState) {
        let frame = codec::encode_frame(MOCK_LOCAL_MAC, state, payload)
            .unwrap_or_else(|_| payload.to_vec());
        self.push_raw(frame);
    }

    /// Queue raw bytes, delivered as they are
    pub fn push_raw(&self, frame: Vec<u8>) {
        self.replies.lock().push_back(Some(frame));
    }

    /// Queue a receive that times out
    pub fn push_silence(&self) {
        self.replies.lock().push_back(None);
    }

    /// Make the next `send()` fail with `error`
    pub fn fail_next_send(&self, error: TransportError) {
        *self.send_fault.lock() = Some(error);
    }

    /// Every frame sent so far
    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().clone()
    }

    /// Replies still queued
    pub fn pending_replies(&self) -> usize {
        self.replies.lock().len()
    }

    /// Resolves once `discover()` has run out of boards
    pub async fn idle(&self) {
        let mut rx = self.idle.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|idle| *idle).await;
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn discover(&self) -> Result<BoardIdentity, TransportError> {
        self.ensure_open()?;

        let next = self.boards.lock().pop_front();
        match next {
            Some(board) => Ok(board),
            None => {
                self.idle.send_replace(true);
                std::future::pending().await
            }
        }
    }

    async fn send(
        &self,
        payload: &[u8],
        state: SessionState,
        destination: MacAddress,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;

        let fault = self.send_fault.lock().take();
        if let Some(error) = fault {
            return Err(error);
        }

        self.sent.lock().push(SentFrame {
            payload: payload.to_vec(),
            state,
            destination,
        });
        tracing::debug!(len = payload.len(), %state, "Mock transport: sent frame");
        Ok(())
    }

    async fn receive(
        &self,
        _board: MacAddress,
        _state: SessionState,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        self.ensure_open()?;
        Ok(self.replies.lock().pop_front().flatten())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
