//! Step machinery for one board session
//!
//! A step sends one frame and, unless it is fire-and-forget, waits for one
//! response frame. [`SessionState`] is threaded through by value: every send
//! advances the sent counter, and every accepted response replaces the state
//! with the one the board put into its frame.

use netflash_core::{AbortFlashing, MacAddress, SessionState};
use tracing::{debug, trace};

use crate::codec::{Command, Frame};
use crate::transport::Transport;

/// Conversation with one board over a shared transport
pub struct Session<'a> {
    transport: &'a dyn Transport,
    board: MacAddress,
}

impl<'a> Session<'a> {
    pub fn new(transport: &'a dyn Transport, board: MacAddress) -> Self {
        Self { transport, board }
    }

    pub fn board(&self) -> MacAddress {
        self.board
    }

    /// Send `command` and check the board's acknowledgement
    pub async fn exchange(
        &self,
        state: SessionState,
        command: &Command<'_>,
    ) -> Result<SessionState, AbortFlashing> {
        let step = command.step();
        debug!(step, %state, "Executing step");

        let state = self.send(state, &command.encode()).await?;

        let Some(expected) = command.expected_ack() else {
            return Ok(state);
        };

        let (state, payload) = self.await_frame(state, step).await?;
        if payload != expected {
            return Err(AbortFlashing::UnexpectedResponse {
                step,
                expected: printable(expected),
                received: printable(&payload),
            });
        }

        debug!(step, %state, "Received acknowledgement");
        Ok(state)
    }

    /// Send one raw payload; returns the state stamped on the frame
    pub async fn send(
        &self,
        state: SessionState,
        payload: &[u8],
    ) -> Result<SessionState, AbortFlashing> {
        let state = state.advance();
        self.transport.send(payload, state, self.board).await?;
        Ok(state)
    }

    /// Flow-control read; never changes the state
    pub async fn drain(&self, state: SessionState) -> Result<(), AbortFlashing> {
        trace!(%state, "Draining");
        self.transport.drain(self.board, state).await?;
        Ok(())
    }

    /// Wait for one response frame
    ///
    /// Returns the board's state and the frame payload.
    pub async fn await_frame(
        &self,
        state: SessionState,
        step: &'static str,
    ) -> Result<(SessionState, Vec<u8>), AbortFlashing> {
        let raw = self
            .transport
            .receive(self.board, state)
            .await?
            .ok_or(AbortFlashing::NoResponse { step, state })?;

        let frame = Frame::decode(&raw)?;
        Ok((frame.session_state(), frame.payload.to_vec()))
    }
}

/// Render protocol bytes for log lines and errors
pub(crate) fn printable(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}
