//! Error taxonomy for flashing
//!
//! Failures come in two kinds:
//! - [`AbortFlashing`] ends the session for one board. The runner logs it and
//!   waits for the next board.
//! - [`FatalError`] means the flasher cannot operate at all (bad
//!   configuration, unusable interface). The runner stops.

use thiserror::Error;

use crate::models::SessionState;

/// Recoverable, session-scoped failure
#[derive(Debug, Error)]
pub enum AbortFlashing {
    /// The board did not answer a step in time
    #[error("No response to {step} (state {state})")]
    NoResponse {
        step: &'static str,
        state: SessionState,
    },

    /// The board answered a step with the wrong acknowledgement
    #[error("Unexpected response to {step}: expected \"{expected}\", received \"{received}\"")]
    UnexpectedResponse {
        step: &'static str,
        expected: String,
        received: String,
    },

    /// The board did not confirm a completed file transfer
    #[error("File {file} was not received properly (board answered \"{received}\")")]
    TransferRejected { file: String, received: String },

    /// A response frame shorter than the fixed header
    #[error("Malformed frame: {len} bytes, header needs {min}")]
    MalformedFrame { len: usize, min: usize },

    /// A firmware or configuration reference could not be opened
    #[error("Unable to read file/url/stream {reference}: {reason}")]
    UnresolvableFile { reference: String, reason: String },

    /// A file stream ended before its declared size
    #[error("Stream {file} ended after {sent} of {size} bytes")]
    StreamEnded { file: String, sent: u64, size: u64 },

    /// Reading a file stream failed mid-transfer
    #[error("Failed to read {file}: {message}")]
    Read { file: String, message: String },

    /// Transport fault during a session (e.g. network unreachable)
    #[error("Network error: {0}")]
    Transport(String),

    /// The file provider could not answer for this board
    #[error("File provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Process-level failure; the runner stops
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not load file provider '{provider}': {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Outcome of a single-shot flash: either kind of failure
#[derive(Debug, Error)]
pub enum FlashError {
    #[error("Flashing failed: {0}")]
    Aborted(#[from] AbortFlashing),

    #[error("Unable to start flasher: {0}")]
    Fatal(#[from] FatalError),
}

impl FlashError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FlashError::Fatal(_))
    }
}

/// Errors raised by file providers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Unknown file provider '{0}'")]
    Unknown(String),

    #[error("Missing option '{0}'")]
    MissingOption(String),

    #[error("Invalid option '{key}': {reason}")]
    InvalidOption { key: String, reason: String },

    #[error("File '{0}' doesn't exist")]
    NotFound(String),

    #[error("No firmware configured for architecture '{0}'")]
    NoFirmware(String),
}
