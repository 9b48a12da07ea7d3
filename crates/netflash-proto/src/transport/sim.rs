//! Simulated board
//!
//! Plays the board's side of a netinstall session in memory, for dry runs
//! without hardware. Each configured board is announced once.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use netflash_core::{BoardIdentity, MacAddress, SessionState};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{Transport, TransportError};
use crate::codec::{self, ACK_RETR, ACK_STRT, ACK_WTRM, ACK_YACK};
use crate::config::SimulatedConfig;

/// Hardware address the simulator answers to
pub const SIM_LOCAL_MAC: MacAddress = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0xFE]);

/// A file as the board stored it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// A board that went through a complete session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashedBoard {
    pub mac: MacAddress,
    pub files: Vec<ReceivedFile>,
    /// Message sent with the reboot command
    pub message: String,
}

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Offered,
    Formatted,
    Ready,
    Receiving {
        name: String,
        size: u64,
        data: Vec<u8>,
    },
    Installing,
}

#[derive(Debug, Default)]
struct BoardSide {
    phase: Phase,
    board: MacAddress,
    files: Vec<ReceivedFile>,
    outbox: VecDeque<Vec<u8>>,
    replies: u16,
}

impl BoardSide {
    fn reply(&mut self, state: SessionState, ack: &[u8]) {
        self.replies = self.replies.wrapping_add(1);
        let state = SessionState::new(state.sent, self.replies);
        if let Ok(frame) = codec::encode_frame(SIM_LOCAL_MAC, state, ack) {
            self.outbox.push_back(frame);
        }
    }

    /// Advance the board for one frame; returns a board that finished
    fn handle(
        &mut self,
        payload: &[u8],
        state: SessionState,
        destination: MacAddress,
    ) -> Option<FlashedBoard> {
        match std::mem::take(&mut self.phase) {
            Phase::Receiving {
                name,
                size,
                mut data,
            } => {
                data.extend_from_slice(payload);
                if data.len() as u64 >= size {
                    debug!(file = %name, bytes = data.len(), "Simulated board received file");
                    self.files.push(ReceivedFile { name, data });
                    self.phase = Phase::Ready;
                    self.reply(state, ACK_RETR);
                } else {
                    self.phase = Phase::Receiving { name, size, data };
                }
            }
            _ if payload == b"OFFR\n\n" => {
                self.board = destination;
                self.files.clear();
                self.replies = 0;
                self.phase = Phase::Offered;
                self.reply(state, ACK_YACK);
            }
            Phase::Offered if payload.is_empty() => {
                self.phase = Phase::Formatted;
                self.reply(state, ACK_STRT);
            }
            Phase::Formatted if payload.is_empty() => {
                self.phase = Phase::Ready;
                self.reply(state, ACK_RETR);
            }
            Phase::Ready if payload.is_empty() => {
                self.phase = Phase::Ready;
                self.reply(state, ACK_RETR);
            }
            Phase::Ready if payload == b"FILE\n" => {
                self.phase = Phase::Installing;
                self.reply(state, ACK_WTRM);
            }
            Phase::Ready if payload.starts_with(b"FILE\n") => match parse_file_header(payload) {
                Some((name, size)) => {
                    self.phase = Phase::Receiving {
                        name,
                        size,
                        data: Vec::new(),
                    };
                    self.reply(state, ACK_RETR);
                }
                None => self.phase = Phase::Ready,
            },
            Phase::Installing if payload.starts_with(b"TERM\n") => {
                let message = String::from_utf8_lossy(&payload[5..]).trim().to_string();
                return Some(FlashedBoard {
                    mac: self.board,
                    files: std::mem::take(&mut self.files),
                    message,
                });
            }
            phase => {
                debug!(?phase, len = payload.len(), "Simulated board ignoring frame");
                self.phase = phase;
            }
        }
        None
    }
}

/// `FILE\n<name>\n<size>\n`
fn parse_file_header(payload: &[u8]) -> Option<(String, u64)> {
    let text = std::str::from_utf8(payload).ok()?;
    let mut lines = text.strip_prefix("FILE\n")?.split('\n');
    let name = lines.next().filter(|n| !n.is_empty())?;
    let size = lines.next()?.parse().ok()?;
    Some((name.to_string(), size))
}

/// In-memory board answering like real hardware
pub struct SimulatedBoard {
    announce: Mutex<VecDeque<BoardIdentity>>,
    side: Mutex<BoardSide>,
    flashed: Mutex<Vec<FlashedBoard>>,
    latency: Duration,
    closed: AtomicBool,
}

impl SimulatedBoard {
    pub fn new(config: &SimulatedConfig) -> Self {
        let boards = config
            .boards
            .iter()
            .map(|b| BoardIdentity::new(b.mac, b.model.clone(), b.arch.clone()))
            .collect();

        Self {
            announce: Mutex::new(boards),
            side: Mutex::new(BoardSide::default()),
            flashed: Mutex::new(Vec::new()),
            latency: Duration::from_millis(config.latency_ms),
            closed: AtomicBool::new(false),
        }
    }

    /// Boards that completed a session, in order
    pub fn flashed(&self) -> Vec<FlashedBoard> {
        self.flashed.lock().clone()
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
impl Transport for SimulatedBoard {
    async fn discover(&self) -> Result<BoardIdentity, TransportError> {
        self.ensure_open()?;

        let next = self.announce.lock().pop_front();
        match next {
            Some(board) => {
                info!(board = %board, "Simulated board announced");
                Ok(board)
            }
            None => std::future::pending().await,
        }
    }

    async fn send(
        &self,
        payload: &[u8],
        state: SessionState,
        destination: MacAddress,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;

        let finished = self.side.lock().handle(payload, state, destination);
        if let Some(board) = finished {
            info!(board = %board.mac, files = board.files.len(), "Simulated board rebooting");
            self.flashed.lock().push(board);
        }
        Ok(())
    }

    async fn receive(
        &self,
        _board: MacAddress,
        _state: SessionState,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        self.ensure_open()?;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.side.lock().outbox.pop_front())
    }

    /// The simulated board only speaks when spoken to
    async fn drain(&self, _board: MacAddress, _state: SessionState) -> Result<(), TransportError> {
        self.ensure_open()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
