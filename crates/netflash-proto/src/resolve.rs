//! File resolution
//!
//! Turns the [`FileRef`]s a provider hands out into [`FileHandle`]s with a
//! known name and size, before the board is offered anything.

use std::io;
use std::path::Path;

use bytes::BytesMut;
use netflash_core::{AbortFlashing, FileRef, OpenStream};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;
use url::Url;

enum ChunkSource {
    Reader(Box<dyn AsyncRead + Send + Unpin>),
    Http {
        response: reqwest::Response,
        pending: BytesMut,
    },
}

/// A readable file whose name and size are known up front
pub struct FileHandle {
    name: String,
    size: u64,
    source: ChunkSource,
}

impl FileHandle {
    pub fn new(
        name: impl Into<String>,
        size: u64,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            source: ChunkSource::Reader(Box::new(reader)),
        }
    }

    pub fn from_bytes(name: impl Into<String>, data: impl Into<bytes::Bytes>) -> Self {
        OpenStream::from_bytes(name, data).into()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read up to `max` bytes; fewer only at end of stream
    pub async fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>> {
        match &mut self.source {
            ChunkSource::Reader(reader) => {
                let mut chunk = Vec::with_capacity(max);
                reader.take(max as u64).read_to_end(&mut chunk).await?;
                Ok(chunk)
            }
            ChunkSource::Http { response, pending } => {
                while pending.len() < max {
                    match response.chunk().await {
                        Ok(Some(bytes)) => pending.extend_from_slice(&bytes),
                        Ok(None) => break,
                        Err(e) => return Err(io::Error::new(io::ErrorKind::Other, e)),
                    }
                }
                let n = max.min(pending.len());
                Ok(pending.split_to(n).to_vec())
            }
        }
    }
}

impl From<OpenStream> for FileHandle {
    fn from(stream: OpenStream) -> Self {
        let (name, size, reader) = stream.into_parts();
        Self {
            name,
            size,
            source: ChunkSource::Reader(reader),
        }
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Opens file references
#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    client: reqwest::Client,
}

impl FileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(&self, reference: FileRef) -> Result<FileHandle, AbortFlashing> {
        let description = reference.describe();
        let unresolvable = |reason: String| AbortFlashing::UnresolvableFile {
            reference: description.clone(),
            reason,
        };

        let handle = match reference {
            FileRef::Stream(stream) => FileHandle::from(stream),
            FileRef::Url(url) => self.fetch(url).await.map_err(unresolvable)?,
            FileRef::Path(path) => open_path(&path)
                .await
                .map_err(|e| unresolvable(e.to_string()))?,
        };

        debug!(reference = %description, name = %handle.name, size = handle.size, "Resolved file");
        Ok(handle)
    }

    async fn fetch(&self, url: Url) -> Result<FileHandle, String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;

        let headers = response.headers();
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| "Server did not send a Content-Length".to_string())?;

        let name = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename)
            .or_else(|| url_file_name(&url))
            .ok_or_else(|| format!("Cannot derive a file name from {}", url))?;

        Ok(FileHandle {
            name,
            size,
            source: ChunkSource::Http {
                response,
                pending: BytesMut::new(),
            },
        })
    }
}

async fn open_path(path: &Path) -> io::Result<FileHandle> {
    OpenStream::from_file(path).await.map(FileHandle::from)
}

/// `attachment; filename="routeros-7.12-arm.npk"`
fn disposition_filename(header: &str) -> Option<String> {
    let (_, rest) = header.split_once("filename=")?;
    let name = rest
        .split(';')
        .next()?
        .trim()
        .trim_matches('"')
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Last path segment; the query string never takes part
fn url_file_name(url: &Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
