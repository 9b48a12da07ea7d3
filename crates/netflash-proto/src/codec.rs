//! Frame codec
//!
//! Commands are short ASCII strings. Every frame on the wire carries a fixed
//! 14-byte header in front of its payload:
//!
//! ```text
//! [0:6]   destination hardware address
//! [6:8]   reserved, always zero
//! [8:10]  payload length (big-endian)
//! [10:14] session state: sent (u16 BE) ‖ received (u16 BE)
//! [14:]   payload
//! ```
//!
//! Datagrams put the sender's hardware address in front of the frame.

use netflash_core::{AbortFlashing, MacAddress, SessionState};
use thiserror::Error;

/// Length of a hardware address
pub const MAC_LEN: usize = 6;

/// Fixed header length of a response frame
pub const FRAME_HEADER_LEN: usize = 14;

/// Largest payload whose datagram still fits in one IPv4 UDP packet
pub const MAX_PAYLOAD: usize = 65_507 - MAC_LEN - FRAME_HEADER_LEN;

/// Acknowledgement of an offer
pub const ACK_YACK: &[u8] = b"YACK\n";
/// Acknowledgement of the format step
pub const ACK_STRT: &[u8] = b"STRT";
/// Board is ready for the next file, or has received one completely
pub const ACK_RETR: &[u8] = b"RETR";
/// Board has written the files and waits for reboot
pub const ACK_WTRM: &[u8] = b"WTRM";

/// Name the configuration script is installed under on the board
pub const CONFIG_DESTINATION_NAME: &str = "autorun.scr";

/// Message sent with the final reboot command
pub const TERMINATE_MESSAGE: &str = "Installation successful";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed frame: {len} bytes, header needs 14")]
    MalformedFrame { len: usize },

    #[error("Malformed board announcement")]
    MalformedAnnouncement,

    #[error("Payload of {0} bytes does not fit a frame")]
    PayloadTooLarge(usize),
}

impl From<CodecError> for AbortFlashing {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MalformedFrame { len } => AbortFlashing::MalformedFrame {
                len,
                min: FRAME_HEADER_LEN,
            },
            other => AbortFlashing::Transport(other.to_string()),
        }
    }
}

/// The fixed command vocabulary of a flash session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Offer the board a flash
    Offer,
    /// Empty step; board formats and answers `STRT`
    Format,
    /// Empty step; board prepares for the first file
    Spacer,
    /// Announce a file and its size
    FileHeader { name: &'a str, size: u64 },
    /// Empty step closing a file
    FileDone,
    /// All files sent, install them
    Finalize,
    /// Reboot; the board does not answer
    Terminate { message: &'a str },
}

impl Command<'_> {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Offer => b"OFFR\n\n".to_vec(),
            Command::Format | Command::Spacer | Command::FileDone => Vec::new(),
            Command::FileHeader { name, size } => format!("FILE\n{}\n{}\n", name, size).into_bytes(),
            Command::Finalize => b"FILE\n".to_vec(),
            Command::Terminate { message } => format!("TERM\n{}\n", message).into_bytes(),
        }
    }

    /// Acknowledgement the board must answer with, `None` for fire-and-forget
    pub fn expected_ack(&self) -> Option<&'static [u8]> {
        match self {
            Command::Offer => Some(ACK_YACK),
            Command::Format => Some(ACK_STRT),
            Command::Spacer | Command::FileHeader { .. } | Command::FileDone => Some(ACK_RETR),
            Command::Finalize => Some(ACK_WTRM),
            Command::Terminate { .. } => None,
        }
    }

    /// Step name used in logs and errors
    pub fn step(&self) -> &'static str {
        match self {
            Command::Offer => "offer",
            Command::Format => "format",
            Command::Spacer => "spacer",
            Command::FileHeader { .. } => "file header",
            Command::FileDone => "file done",
            Command::Finalize => "finalize",
            Command::Terminate { .. } => "terminate",
        }
    }
}

/// A decoded response frame borrowing from the received bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub destination: MacAddress,
    /// Declared payload length; not checked against `payload.len()`
    pub payload_len: u16,
    pub state: [u8; 4],
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn decode(raw: &'a [u8]) -> Result<Self, CodecError> {
        if raw.len() < FRAME_HEADER_LEN {
            return Err(CodecError::MalformedFrame { len: raw.len() });
        }

        let mut destination = [0u8; MAC_LEN];
        destination.copy_from_slice(&raw[..MAC_LEN]);
        let mut state = [0u8; 4];
        state.copy_from_slice(&raw[10..14]);

        Ok(Self {
            destination: MacAddress::new(destination),
            payload_len: u16::from_be_bytes([raw[8], raw[9]]),
            state,
            payload: &raw[FRAME_HEADER_LEN..],
        })
    }

    pub fn session_state(&self) -> SessionState {
        SessionState::from_wire(self.state)
    }
}

/// Encode a frame addressed to `destination`
pub fn encode_frame(
    destination: MacAddress,
    state: SessionState,
    payload: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let len = u16::try_from(payload.len()).map_err(|_| CodecError::PayloadTooLarge(payload.len()))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(destination.as_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&state.to_wire());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Encode a datagram: sender address followed by the frame
pub fn encode_datagram(
    source: MacAddress,
    destination: MacAddress,
    state: SessionState,
    payload: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let frame = encode_frame(destination, state, payload)?;
    let mut datagram = Vec::with_capacity(MAC_LEN + frame.len());
    datagram.extend_from_slice(source.as_bytes());
    datagram.extend_from_slice(&frame);
    Ok(datagram)
}

/// Split a datagram into its sender address and the frame that follows
pub fn split_datagram(datagram: &[u8]) -> Option<(MacAddress, &[u8])> {
    let source = MacAddress::from_slice(datagram)?;
    Some((source, &datagram[MAC_LEN..]))
}

/// Parse the `model\narch[\n...]` payload a board announces itself with
pub fn decode_announcement(payload: &[u8]) -> Result<(String, String), CodecError> {
    let text = std::str::from_utf8(payload).map_err(|_| CodecError::MalformedAnnouncement)?;
    let mut lines = text.split('\n').map(str::trim);

    let model = lines.next().unwrap_or_default();
    let arch = lines.next().unwrap_or_default();
    let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_graphic() || c == ' ');

    if valid(model) && valid(arch) {
        Ok((model.to_string(), arch.to_string()))
    } else {
        Err(CodecError::MalformedAnnouncement)
    }
}
