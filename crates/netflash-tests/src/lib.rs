//! End-to-end tests for the netinstall flasher
//!
//! Scenarios run against the public API of `netflash-proto`:
//! - `session_e2e_test.rs` - full board sessions over the scripted transport
//! - `runner_e2e_test.rs` - the continuous runner and `serve`
//! - `simulator_test.rs` - dry runs against the simulated board
//! - `http_resolution_test.rs` - firmware fetched from a local HTTP server
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p netflash-tests
//! ```
//!
//! No hardware and no privileges are needed; the UDP transport is not used.

use std::net::SocketAddr;

use async_trait::async_trait;
use netflash_core::{BoardFiles, BoardIdentity, FileProvider, MacAddress, OpenStream, ProviderError};
use netflash_proto::transport::mock::MockTransport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub fn board(last: u8) -> BoardIdentity {
    BoardIdentity::new(MacAddress::new([0x4c, 0x5e, 0x0c, 0, 0, last]), "RB750Gr3", "mmips")
}

/// Interior chunks a file of `size` bytes is sent in
pub fn chunk_count(size: usize, chunk_size: usize) -> usize {
    size.div_ceil(chunk_size).max(1)
}

// =============================================================================
// File providers
// =============================================================================

/// Serves in-memory files to every board
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    firmware: (String, Vec<u8>),
    config: Option<(String, Vec<u8>)>,
}

impl MemoryProvider {
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        Self {
            firmware: (name.to_string(), data),
            config: None,
        }
    }

    pub fn with_config(mut self, name: &str, data: Vec<u8>) -> Self {
        self.config = Some((name.to_string(), data));
        self
    }
}

#[async_trait]
impl FileProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_files(&self, _board: &BoardIdentity) -> Result<BoardFiles, ProviderError> {
        let (name, data) = &self.firmware;
        let files = BoardFiles::new(OpenStream::from_bytes(name.clone(), data.clone()));
        Ok(match &self.config {
            Some((name, data)) => {
                files.with_config(OpenStream::from_bytes(name.clone(), data.clone()))
            }
            None => files,
        })
    }
}

// =============================================================================
// Scripted board
// =============================================================================

/// Offer, format and spacer acknowledgements
pub fn script_prologue(mock: &MockTransport) {
    mock.push_reply(b"YACK\n");
    mock.push_reply(b"STRT");
    mock.push_reply(b"RETR");
}

/// One file: header ack, a silent drain per chunk, completion, done ack
pub fn script_file(mock: &MockTransport, chunks: usize) {
    mock.push_reply(b"RETR");
    for _ in 0..chunks {
        mock.push_silence();
    }
    mock.push_reply(b"RETR");
    mock.push_reply(b"RETR");
}

/// Finalize acknowledgement
pub fn script_epilogue(mock: &MockTransport) {
    mock.push_reply(b"WTRM");
}

/// A whole successful session; `files` lists the chunk count of each file
pub fn script_session(mock: &MockTransport, files: &[usize]) {
    script_prologue(mock);
    for &chunks in files {
        script_file(mock, chunks);
    }
    script_epilogue(mock);
}

// =============================================================================
// HTTP file server
// =============================================================================

/// Raw `200 OK` response; `Connection: close` is always added
pub fn http_response(headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut response = b"HTTP/1.1 200 OK\r\n".to_vec();
    for (name, value) in headers {
        response.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    response.extend_from_slice(b"Connection: close\r\n\r\n");
    response.extend_from_slice(body);
    response
}

/// Answer every connection with `response`; returns the listening address
pub async fn spawn_http_server(response: Vec<u8>) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    Ok(addr)
}
