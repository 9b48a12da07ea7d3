//! Firmware fetched over HTTP from a local server
//!
//! Run with: cargo test --test http_resolution_test

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netflash_core::{AbortFlashing, BoardFiles, BoardIdentity, FileProvider, FileRef, ProviderError};
use netflash_proto::transport::mock::MockTransport;
use netflash_proto::{FileResolver, Flasher, NoProgress, TransferOptions};
use netflash_tests::{board, http_response, script_session, spawn_http_server};
use pretty_assertions::assert_eq;
use url::Url;

fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 199) as u8).collect()
}

#[tokio::test]
async fn test_name_from_content_disposition() {
    let data = body(2100);
    let len = data.len().to_string();
    let addr = spawn_http_server(http_response(
        &[
            ("Content-Length", len.as_str()),
            ("Content-Disposition", "attachment; filename=\"routeros-7.12-arm.npk\""),
        ],
        &data,
    ))
    .await
    .unwrap();

    let url = Url::parse(&format!("http://{}/download?id=42", addr)).unwrap();
    let mut handle = FileResolver::new().resolve(FileRef::Url(url)).await.unwrap();

    assert_eq!(handle.name(), "routeros-7.12-arm.npk");
    assert_eq!(handle.size(), 2100);

    let mut received = Vec::new();
    loop {
        let chunk = handle.read_chunk(1024).await.unwrap();
        if chunk.is_empty() {
            break;
        }
        assert!(chunk.len() <= 1024);
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, data);
}

#[tokio::test]
async fn test_name_from_url_path() {
    let data = body(10);
    let addr = spawn_http_server(http_response(&[("Content-Length", "10")], &data))
        .await
        .unwrap();

    let url = Url::parse(&format!("http://{}/7.12/routeros-7.12-mmips.npk?token=abc", addr)).unwrap();
    let handle = FileResolver::new().resolve(FileRef::Url(url)).await.unwrap();

    assert_eq!(handle.name(), "routeros-7.12-mmips.npk");
    assert_eq!(handle.size(), 10);
}

#[tokio::test]
async fn test_missing_content_length_is_unresolvable() {
    let addr = spawn_http_server(http_response(&[], b"no length here"))
        .await
        .unwrap();

    let url = Url::parse(&format!("http://{}/fw.npk", addr)).unwrap();
    let err = FileResolver::new()
        .resolve(FileRef::Url(url))
        .await
        .unwrap_err();

    match err {
        AbortFlashing::UnresolvableFile { reference, reason } => {
            assert!(reference.ends_with("/fw.npk"));
            assert!(reason.contains("Content-Length"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_error_status_is_unresolvable() {
    let addr = spawn_http_server(
        b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
    )
    .await
    .unwrap();

    let url = Url::parse(&format!("http://{}/missing.npk", addr)).unwrap();
    let err = FileResolver::new()
        .resolve(FileRef::Url(url))
        .await
        .unwrap_err();

    assert!(matches!(err, AbortFlashing::UnresolvableFile { .. }));
}

#[tokio::test]
async fn test_session_streams_remote_firmware() {
    struct Remote(Url);

    #[async_trait]
    impl FileProvider for Remote {
        fn name(&self) -> &str {
            "remote"
        }

        async fn get_files(&self, _board: &BoardIdentity) -> Result<BoardFiles, ProviderError> {
            Ok(BoardFiles::new(self.0.clone()))
        }
    }

    let data = body(2500);
    let len = data.len().to_string();
    let addr = spawn_http_server(http_response(
        &[("Content-Length", len.as_str())],
        &data,
    ))
    .await
    .unwrap();
    let url = Url::parse(&format!("http://{}/routeros-arm.npk", addr)).unwrap();

    let mock = Arc::new(MockTransport::new());
    script_session(&mock, &[3]);

    let report = Flasher::new(mock.clone(), Arc::new(Remote(url)))
        .with_options(TransferOptions {
            chunk_size: 1024,
            chunk_delay: Duration::ZERO,
        })
        .run(&board(1), &mut NoProgress)
        .await
        .unwrap();

    assert_eq!(report.files[0].name, "routeros-arm.npk");
    assert_eq!(report.files[0].bytes, 2500);

    let sent = mock.sent();
    assert_eq!(sent[3].payload, b"FILE\nrouteros-arm.npk\n2500\n");
    let streamed: Vec<u8> = sent[4..7].iter().flat_map(|f| f.payload.clone()).collect();
    assert_eq!(streamed, data);
    assert_eq!(sent[4].payload.len(), 1024);
    assert_eq!(sent[6].payload.len(), 452);
}
