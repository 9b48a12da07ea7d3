//! UDP broadcast transport
//!
//! Frames travel as broadcast datagrams on one interface. Every datagram
//! starts with the sender's hardware address, so our own broadcasts come back
//! to us and have to be filtered out by that address.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netflash_core::{BoardIdentity, MacAddress, SessionState};
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::{Transport, TransportError};
use crate::codec::{self, Frame};
use crate::config::UdpConfig;

/// Board frames are short; anything longer is an echo of our own chunks,
/// which only needs its source address read
const MAX_DATAGRAM: usize = 2048;

/// UDP transport bound to one network interface
pub struct UdpTransport {
    interface: String,
    local_mac: MacAddress,
    broadcast: SocketAddr,
    response_timeout: Duration,
    drain_timeout: Duration,
    socket: RwLock<Option<Arc<UdpSocket>>>,
}

impl UdpTransport {
    /// Bind the netinstall port on `interface`
    pub async fn bind(config: &UdpConfig, interface: &str) -> Result<Self, TransportError> {
        if interface.is_empty() {
            return Err(TransportError::InvalidConfig(
                "No network interface configured".to_string(),
            ));
        }

        let local_mac = match config.local_mac {
            Some(mac) => mac,
            None => read_interface_mac(interface).await?,
        };
        let socket = create_socket(interface, config.port)?;

        info!(
            interface = %interface,
            mac = %local_mac,
            port = config.port,
            "UDP transport bound"
        );

        Ok(Self {
            interface: interface.to_string(),
            local_mac,
            broadcast: SocketAddr::V4(SocketAddrV4::new(config.broadcast, config.port)),
            response_timeout: Duration::from_millis(config.response_timeout_ms),
            drain_timeout: Duration::from_millis(
                config.drain_timeout_ms.unwrap_or(config.response_timeout_ms),
            ),
            socket: RwLock::new(Some(Arc::new(socket))),
        })
    }

    pub fn local_mac(&self) -> MacAddress {
        self.local_mac
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn socket(&self) -> Result<Arc<UdpSocket>, TransportError> {
        self.socket
            .read()
            .clone()
            .ok_or(TransportError::ConnectionClosed)
    }

    /// Wait up to `timeout` for a frame sent by `board`
    async fn next_frame(
        &self,
        board: MacAddress,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let socket = self.socket()?;
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
                Err(_) => return Ok(None),
                Ok(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                Ok(Ok((len, peer))) => match from_peer(self.local_mac, &buf[..len]) {
                    Some((source, frame)) if source == board => {
                        trace!(%peer, %source, len = frame.len(), "Received frame");
                        return Ok(Some(frame.to_vec()));
                    }
                    Some((source, _)) => {
                        debug!(%peer, %source, %board, "Ignoring frame from another board")
                    }
                    None => trace!(%peer, len, "Ignoring own or truncated datagram"),
                },
            }
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn discover(&self) -> Result<BoardIdentity, TransportError> {
        let socket = self.socket()?;
        let mut buf = [0u8; MAX_DATAGRAM];

        info!(interface = %self.interface, "Waiting for a board");

        loop {
            let (len, peer) = socket
                .recv_from(&mut buf)
                .await
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

            let Some((source, frame)) = from_peer(self.local_mac, &buf[..len]) else {
                continue;
            };

            let announcement =
                Frame::decode(frame).and_then(|frame| codec::decode_announcement(frame.payload));

            match announcement {
                Ok((model, arch)) => return Ok(BoardIdentity::new(source, model, arch)),
                Err(e) => debug!(%peer, %source, error = %e, "Ignoring datagram while waiting for a board"),
            }
        }
    }

    async fn send(
        &self,
        payload: &[u8],
        state: SessionState,
        destination: MacAddress,
    ) -> Result<(), TransportError> {
        let socket = self.socket()?;
        let datagram = codec::encode_datagram(self.local_mac, destination, state, payload)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        trace!(%destination, %state, len = payload.len(), "Sending frame");

        socket
            .send_to(&datagram, self.broadcast)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn receive(
        &self,
        board: MacAddress,
        state: SessionState,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let frame = self.next_frame(board, self.response_timeout).await?;
        if frame.is_none() {
            debug!(%state, timeout_ms = self.response_timeout.as_millis() as u64, "No response");
        }
        Ok(frame)
    }

    async fn drain(&self, board: MacAddress, state: SessionState) -> Result<(), TransportError> {
        if self.next_frame(board, self.drain_timeout).await?.is_none() {
            trace!(%state, "Nothing to drain");
        }
        Ok(())
    }

    async fn close(&self) {
        if self.socket.write().take().is_some() {
            debug!(interface = %self.interface, "UDP transport closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.socket.read().is_none()
    }
}

/// Sender address and frame of a datagram that did not originate from us
fn from_peer(local_mac: MacAddress, datagram: &[u8]) -> Option<(MacAddress, &[u8])> {
    let (source, frame) = codec::split_datagram(datagram)?;
    (source != local_mac).then_some((source, frame))
}

async fn read_interface_mac(interface: &str) -> Result<MacAddress, TransportError> {
    let path = format!("/sys/class/net/{}/address", interface);
    let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
        TransportError::InvalidConfig(format!(
            "Cannot read hardware address of {} ({}): {}",
            interface, path, e
        ))
    })?;

    raw.trim()
        .parse()
        .map_err(|e| TransportError::InvalidConfig(format!("{}: {}", interface, e)))
}

fn create_socket(interface: &str, port: u16) -> Result<UdpSocket, TransportError> {
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    let failed = |what: &str, e: std::io::Error| {
        TransportError::ConnectionFailed(format!("{} on {}: {}", what, interface, e))
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| failed("Create socket", e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| failed("Allow address reuse", e))?;
    socket
        .set_broadcast(true)
        .map_err(|e| failed("Enable broadcast", e))?;

    // Boards only exist on one segment; keep traffic off every other link
    #[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
    socket
        .bind_device(Some(interface.as_bytes()))
        .map_err(|e| failed("Bind to device", e))?;

    socket
        .bind(&SocketAddr::V4(bind_addr).into())
        .map_err(|e| failed("Bind", e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| failed("Set non-blocking", e))?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(|e| failed("Register socket", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0xAA]);
    const BOARD: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x01]);

    #[test]
    fn test_own_echo_is_ignored() {
        let echo = codec::encode_datagram(LOCAL, BOARD, SessionState::new(1, 0), b"OFFR\n\n")
            .unwrap();
        assert!(from_peer(LOCAL, &echo).is_none());
    }

    #[test]
    fn test_peer_frame_is_stripped_of_source() {
        let reply =
            codec::encode_datagram(BOARD, LOCAL, SessionState::new(1, 1), b"YACK\n").unwrap();
        let (source, frame) = from_peer(LOCAL, &reply).unwrap();

        assert_eq!(source, BOARD);
        assert_eq!(frame, &reply[6..]);
        assert_eq!(Frame::decode(frame).unwrap().payload, b"YACK\n");
    }

    #[test]
    fn test_truncated_datagram_is_ignored() {
        assert!(from_peer(LOCAL, &[0x02, 0, 0]).is_none());
    }

    #[tokio::test]
    async fn test_bind_rejects_empty_interface() {
        let result = UdpTransport::bind(&UdpConfig::default(), "").await;
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }

    // =========================================================================
    // Loopback: the transport on `lo`, a plain socket playing the board
    // =========================================================================

    const OTHER: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x02]);

    fn free_port() -> u16 {
        std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    async fn loopback(response_timeout_ms: u64) -> (UdpTransport, UdpSocket, SocketAddr) {
        let port = free_port();
        let config = UdpConfig {
            port,
            broadcast: Ipv4Addr::LOCALHOST,
            response_timeout_ms,
            drain_timeout_ms: None,
            local_mac: Some(LOCAL),
        };
        let transport = UdpTransport::bind(&config, "lo").await.unwrap();
        let board = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (transport, board, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    async fn board_says(
        socket: &UdpSocket,
        to: SocketAddr,
        from: MacAddress,
        state: SessionState,
        payload: &[u8],
    ) {
        let datagram = codec::encode_datagram(from, LOCAL, state, payload).unwrap();
        socket.send_to(&datagram, to).await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_skips_echo_and_other_boards() {
        let (transport, board, to) = loopback(1000).await;

        transport
            .send(b"OFFR\n\n", SessionState::new(1, 0), BOARD)
            .await
            .unwrap();
        board_says(&board, to, OTHER, SessionState::new(0, 0), b"RB951\nmipsbe\n").await;
        board_says(&board, to, BOARD, SessionState::new(1, 1), b"YACK\n").await;

        let raw = transport
            .receive(BOARD, SessionState::new(1, 0))
            .await
            .unwrap()
            .unwrap();
        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.payload, b"YACK\n");
        assert_eq!(frame.session_state(), SessionState::new(1, 1));
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let (transport, _board, _) = loopback(50).await;
        let frame = transport.receive(BOARD, SessionState::default()).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_drain_consumes_one_frame() {
        let (transport, board, to) = loopback(1000).await;
        board_says(&board, to, BOARD, SessionState::new(5, 4), b"").await;
        board_says(&board, to, BOARD, SessionState::new(5, 5), b"RETR").await;

        transport.drain(BOARD, SessionState::new(5, 4)).await.unwrap();
        let raw = transport
            .receive(BOARD, SessionState::new(5, 4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Frame::decode(&raw).unwrap().payload, b"RETR");
    }

    #[tokio::test]
    async fn test_discover_reads_announcement() {
        let (transport, board, to) = loopback(1000).await;

        transport
            .send(b"OFFR\n\n", SessionState::new(1, 0), BOARD)
            .await
            .unwrap();
        board.send_to(&[0x02, 0, 0], to).await.unwrap();
        board_says(&board, to, BOARD, SessionState::default(), b"RB750Gr3\nmmips\n").await;

        let found = transport.discover().await.unwrap();
        assert_eq!(found, BoardIdentity::new(BOARD, "RB750Gr3", "mmips"));
    }

    #[tokio::test]
    async fn test_slow_chunk_acks_stay_in_lock_step() {
        use crate::resolve::FileHandle;
        use crate::session::Session;
        use crate::transfer::{send_file, NoProgress, TransferOptions};

        let (transport, board, to) = loopback(500).await;

        // Header ack, one ack per chunk 30 ms apart, then the completion
        let script = tokio::spawn(async move {
            board_says(&board, to, BOARD, SessionState::new(1, 1), b"RETR").await;
            for n in 0..3u16 {
                tokio::time::sleep(Duration::from_millis(30)).await;
                board_says(&board, to, BOARD, SessionState::new(2 + n, 1), b"").await;
            }
            board_says(&board, to, BOARD, SessionState::new(5, 5), b"RETR").await;
        });

        let session = Session::new(&transport, BOARD);
        let (state, stats) = send_file(
            &session,
            SessionState::default(),
            FileHandle::from_bytes("fw.npk", vec![0u8; 2500]),
            "fw.npk",
            &TransferOptions {
                chunk_size: 1024,
                chunk_delay: Duration::ZERO,
            },
            &mut NoProgress,
        )
        .await
        .unwrap();

        assert_eq!(stats.chunks, 3);
        assert_eq!(state, SessionState::new(5, 5));
        script.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_transport() {
        let (transport, _board, _) = loopback(50).await;
        transport.close().await;

        assert!(transport.is_closed());
        assert!(matches!(
            transport.receive(BOARD, SessionState::default()).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
