//! Transport layer for netinstall sessions
//!
//! This module provides the transports boards are flashed through:
//! - UDP broadcast transport bound to one network interface
//! - Simulated board for dry runs without hardware
//! - Scripted mock for testing
//!
//! # Example
//!
//! ```ignore
//! use netflash_proto::transport::{create_transport, Transport};
//! use netflash_proto::config::TransportConfig;
//!
//! let config = TransportConfig::Simulated(Default::default());
//! let transport = create_transport(&config, "eth0").await?;
//! let board = transport.discover().await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;
pub mod sim;
pub mod udp;

pub use adapter::Transport;
pub use error::TransportError;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport based on configuration
pub async fn create_transport(
    config: &TransportConfig,
    interface: &str,
) -> Result<Arc<dyn Transport>, TransportError> {
    match config {
        TransportConfig::Udp(cfg) => {
            let transport = udp::UdpTransport::bind(cfg, interface).await?;
            Ok(Arc::new(transport))
        }
        TransportConfig::Simulated(cfg) => {
            let transport = sim::SimulatedBoard::new(cfg);
            Ok(Arc::new(transport))
        }
    }
}
