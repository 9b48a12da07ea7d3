//! netflash-proto - Netinstall flashing protocol
//!
//! This crate drives router boards through a netinstall session:
//! - Frame codec for commands and response frames ([`codec`])
//! - Transports: broadcast UDP, scripted mock, simulated board ([`transport`])
//! - Step machinery and chunked file transfer ([`session`], [`transfer`])
//! - The per-board session script ([`Flasher`]) and the continuous [`Runner`]
//! - TOML configuration and the file provider registry
//!
//! # Example
//!
//! ```ignore
//! use netflash_proto::{config::NetflashConfig, provider::ProviderRegistry, runner, transport};
//!
//! let config = NetflashConfig::load("netflash.toml")?;
//! let transport = transport::create_transport(&config.transport, &config.interface).await?;
//! let registry = ProviderRegistry::with_builtin();
//! let outcome = runner::serve(&config, transport, &registry, RunMode::Forever, &mut observer, shutdown).await?;
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod progress;
pub mod provider;
pub mod resolve;
pub mod runner;
pub mod session;
pub mod transfer;
pub mod transport;

pub use codec::{Command, Frame};
pub use config::NetflashConfig;
pub use engine::{Flasher, SessionReport};
pub use provider::ProviderRegistry;
pub use resolve::{FileHandle, FileResolver};
pub use runner::{serve, RunMode, RunOutcome, RunSummary, Runner, RunnerOptions};
pub use session::Session;
pub use transfer::{NoProgress, ProgressObserver, TransferOptions, TransferProgress, TransferStats};
pub use transport::{create_transport, Transport, TransportError};
