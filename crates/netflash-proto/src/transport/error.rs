//! Transport layer errors

use netflash_core::{AbortFlashing, FatalError};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<TransportError> for AbortFlashing {
    fn from(err: TransportError) -> Self {
        AbortFlashing::Transport(err.to_string())
    }
}

impl From<TransportError> for FatalError {
    fn from(err: TransportError) -> Self {
        FatalError::Transport(err.to_string())
    }
}
