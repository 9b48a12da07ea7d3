//! Chunked file transfer
//!
//! A file is announced with a header step, then streamed as fixed-size
//! chunks. Interior chunks are not acknowledged; after each one a single
//! drain read keeps the board from buffering without bound. Once the declared
//! size has been sent the board must confirm with `RETR`.

use std::time::Duration;

use netflash_core::{AbortFlashing, SessionState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::{Command, ACK_RETR};
use crate::resolve::FileHandle;
use crate::session::{printable, Session};

/// Chunk size boards accept
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Pause between chunks; boards lose state when fed faster
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
        }
    }
}

/// What one completed transfer sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    /// Name the file was installed under
    pub name: String,
    pub bytes: u64,
    pub chunks: u32,
}

/// Progress of the file currently being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress<'a> {
    pub name: &'a str,
    pub sent: u64,
    pub total: u64,
}

/// Side-effect-only hook invoked by the transfer loop
pub trait ProgressObserver: Send {
    fn on_start(&mut self, _name: &str, _total: u64) {}

    fn on_progress(&mut self, progress: &TransferProgress<'_>);

    fn on_finish(&mut self, _name: &str) {}
}

impl<F> ProgressObserver for F
where
    F: FnMut(&TransferProgress<'_>) + Send,
{
    fn on_progress(&mut self, progress: &TransferProgress<'_>) {
        self(progress)
    }
}

/// Observer that ignores progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _progress: &TransferProgress<'_>) {}
}

/// Stream `file` to the board under `name`
///
/// `file` is consumed and released when the transfer ends, on success and on
/// every error path.
pub async fn send_file(
    session: &Session<'_>,
    state: SessionState,
    mut file: FileHandle,
    name: &str,
    options: &TransferOptions,
    observer: &mut dyn ProgressObserver,
) -> Result<(SessionState, TransferStats), AbortFlashing> {
    let size = file.size();
    let chunk_size = options.chunk_size.max(1) as u64;

    info!(file = %name, source = %file.name(), size, "Sending file");

    let mut state = session
        .exchange(state, &Command::FileHeader { name, size })
        .await?;

    observer.on_start(name, size);

    let mut sent: u64 = 0;
    let mut chunks: u32 = 0;

    loop {
        let want = chunk_size.min(size - sent) as usize;
        let chunk = file
            .read_chunk(want)
            .await
            .map_err(|e| AbortFlashing::Read {
                file: file.name().to_string(),
                message: e.to_string(),
            })?;

        if chunk.len() < want {
            return Err(AbortFlashing::StreamEnded {
                file: file.name().to_string(),
                sent: sent + chunk.len() as u64,
                size,
            });
        }

        state = session.send(state, &chunk).await?;
        session.drain(state).await?;

        sent += chunk.len() as u64;
        chunks += 1;
        observer.on_progress(&TransferProgress {
            name,
            sent,
            total: size,
        });

        if sent >= size {
            break;
        }

        tokio::time::sleep(options.chunk_delay).await;
    }

    let (state, payload) = session.await_frame(state, "file upload").await?;
    if payload != ACK_RETR {
        return Err(AbortFlashing::TransferRejected {
            file: name.to_string(),
            received: printable(&payload),
        });
    }

    observer.on_finish(name);
    debug!(file = %name, bytes = sent, chunks, %state, "File confirmed by board");

    Ok((
        state,
        TransferStats {
            name: name.to_string(),
            bytes: sent,
            chunks,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use netflash_core::MacAddress;
    use pretty_assertions::assert_eq;

    const BOARD: MacAddress = MacAddress::new([0x02, 0, 0, 0, 0, 0x01]);

    fn fast() -> TransferOptions {
        TransferOptions {
            chunk_size: 4,
            chunk_delay: Duration::ZERO,
        }
    }

    /// Header ack, one drain reply per chunk, completion ack
    fn script(mock: &MockTransport, chunks: usize, completion: &[u8]) {
        mock.push_reply(b"RETR");
        for _ in 0..chunks {
            mock.push_silence();
        }
        mock.push_reply(completion);
    }

    #[tokio::test]
    async fn test_chunk_count_and_sizes() {
        for (size, expected) in [(10usize, vec![4, 4, 2]), (8, vec![4, 4]), (1, vec![1])] {
            let mock = MockTransport::new();
            script(&mock, expected.len(), b"RETR");
            let session = Session::new(&mock, BOARD);
            let file = FileHandle::from_bytes("fw.npk", vec![7u8; size]);

            let (_, stats) = send_file(
                &session,
                SessionState::default(),
                file,
                "fw.npk",
                &fast(),
                &mut NoProgress,
            )
            .await
            .unwrap();

            let sent = mock.sent();
            let chunk_lens: Vec<usize> = sent[1..].iter().map(|f| f.payload.len()).collect();
            assert_eq!(chunk_lens, expected);
            assert_eq!(stats.bytes, size as u64);
            assert_eq!(stats.chunks as usize, expected.len());
            assert_eq!(sent[0].payload, format!("FILE\nfw.npk\n{}\n", size).into_bytes());
        }
    }

    #[tokio::test]
    async fn test_zero_length_file_sends_one_empty_chunk() {
        let mock = MockTransport::new();
        script(&mock, 1, b"RETR");
        let session = Session::new(&mock, BOARD);

        let mut seen = Vec::new();
        let mut observer = |p: &TransferProgress<'_>| seen.push((p.sent, p.total));
        let (_, stats) = send_file(
            &session,
            SessionState::default(),
            FileHandle::from_bytes("empty.rsc", Vec::new()),
            "autorun.scr",
            &fast(),
            &mut observer,
        )
        .await
        .unwrap();

        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.bytes, 0);
        assert_eq!(seen, vec![(0, 0)]);
        assert!(mock.sent()[1].payload.is_empty());
    }

    #[tokio::test]
    async fn test_completion_must_be_retr() {
        let mock = MockTransport::new();
        script(&mock, 1, b"WTRM");
        let session = Session::new(&mock, BOARD);

        let err = send_file(
            &session,
            SessionState::default(),
            FileHandle::from_bytes("fw.npk", vec![1u8; 3]),
            "fw.npk",
            &fast(),
            &mut NoProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AbortFlashing::TransferRejected { ref file, ref received } if file == "fw.npk" && received == "WTRM"
        ));
    }

    #[tokio::test]
    async fn test_stream_shorter_than_declared_size() {
        let mock = MockTransport::new();
        script(&mock, 2, b"RETR");
        let session = Session::new(&mock, BOARD);

        let stream = netflash_core::OpenStream::new("fw.npk", 6, std::io::Cursor::new(vec![1u8; 5]));
        let err = send_file(
            &session,
            SessionState::default(),
            FileHandle::from(stream),
            "fw.npk",
            &fast(),
            &mut NoProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AbortFlashing::StreamEnded { sent: 5, size: 6, .. }
        ));
        // Header plus the one full chunk; the short tail is never sent
        assert_eq!(mock.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_longer_stream_is_cut_at_declared_size() {
        let mock = MockTransport::new();
        script(&mock, 2, b"RETR");
        let session = Session::new(&mock, BOARD);

        let stream =
            netflash_core::OpenStream::new("fw.npk", 6, std::io::Cursor::new(vec![1u8; 64]));
        let (_, stats) = send_file(
            &session,
            SessionState::default(),
            FileHandle::from(stream),
            "fw.npk",
            &fast(),
            &mut NoProgress,
        )
        .await
        .unwrap();

        assert_eq!(stats.bytes, 6);
        assert_eq!(stats.chunks, 2);
    }

    #[tokio::test]
    async fn test_state_threading() {
        let mock = MockTransport::new();
        mock.push_reply_with_state(b"RETR", SessionState::new(20, 5));
        mock.push_reply_with_state(b"drained", SessionState::new(77, 77));
        mock.push_reply_with_state(b"RETR", SessionState::new(22, 6));
        let session = Session::new(&mock, BOARD);

        let (state, _) = send_file(
            &session,
            SessionState::new(3, 4),
            FileHandle::from_bytes("fw.npk", vec![1u8; 2]),
            "fw.npk",
            &fast(),
            &mut NoProgress,
        )
        .await
        .unwrap();

        let sent = mock.sent();
        assert_eq!(sent[0].state, SessionState::new(4, 4));
        // Chunk follows the board's state from the header ack, not the drain
        assert_eq!(sent[1].state, SessionState::new(21, 5));
        assert_eq!(state, SessionState::new(22, 6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_chunks_only() {
        let mock = MockTransport::new();
        script(&mock, 3, b"RETR");
        let session = Session::new(&mock, BOARD);
        let options = TransferOptions {
            chunk_size: 4,
            chunk_delay: Duration::from_millis(5),
        };

        let start = tokio::time::Instant::now();
        send_file(
            &session,
            SessionState::default(),
            FileHandle::from_bytes("fw.npk", vec![1u8; 12]),
            "fw.npk",
            &options,
            &mut NoProgress,
        )
        .await
        .unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(10));
    }
}
