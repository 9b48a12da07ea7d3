//! netflash-core - Core traits and types for netinstall provisioning
//!
//! This crate provides the types shared by every layer of the flasher:
//! board identities and hardware addresses, the sequencing state threaded
//! through a session, file references handed out by file providers, and
//! the two-level error taxonomy (per-session aborts vs. process-fatal errors).

pub mod error;
pub mod files;
pub mod models;
pub mod provider;

pub use error::{AbortFlashing, FatalError, FlashError, ProviderError};
pub use files::{BoardFiles, FileRef, OpenStream};
pub use models::{BoardIdentity, MacAddress, ParseMacError, SessionState};
pub use provider::FileProvider;
