//! File references handed out by file providers
//!
//! A provider may answer with an already-open stream, a URL, or a local
//! path. The flasher resolves each reference once, at session start, into a
//! concrete handle with a known name and size.

use std::fmt;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncRead;
use url::Url;

/// An open byte stream whose name and size are already known
pub struct OpenStream {
    name: String,
    size: u64,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl OpenStream {
    pub fn new(
        name: impl Into<String>,
        size: u64,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            reader: Box::new(reader),
        }
    }

    /// Open `path` and take name and size from the backing file
    pub async fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self::new(file_name(path), size, file))
    }

    /// Wrap a file that is already open; `path` names its backing file
    pub fn from_std_file(file: std::fs::File, path: impl AsRef<Path>) -> io::Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self::new(
            file_name(path.as_ref()),
            size,
            tokio::fs::File::from_std(file),
        ))
    }

    /// In-memory content, e.g. a configuration script rendered per board
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self::new(name, size, Cursor::new(data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn into_parts(self) -> (String, u64, Box<dyn AsyncRead + Send + Unpin>) {
        (self.name, self.size, self.reader)
    }
}

impl fmt::Debug for OpenStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenStream")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Where the bytes of a file come from
#[derive(Debug)]
pub enum FileRef {
    /// Already open, name and size known
    Stream(OpenStream),
    /// Remote file fetched over HTTP(S)
    Url(Url),
    /// Local file
    Path(PathBuf),
}

impl FileRef {
    /// Classify a configured location: absolute `http`/`https` URLs become
    /// [`FileRef::Url`], everything else is treated as a local path.
    pub fn from_location(location: &str) -> Self {
        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => FileRef::Url(url),
            _ => FileRef::Path(PathBuf::from(location)),
        }
    }

    /// Short human-readable description for log lines and errors
    pub fn describe(&self) -> String {
        match self {
            FileRef::Stream(stream) => format!("stream {}", stream.name()),
            FileRef::Url(url) => url.to_string(),
            FileRef::Path(path) => path.display().to_string(),
        }
    }
}

impl From<OpenStream> for FileRef {
    fn from(stream: OpenStream) -> Self {
        FileRef::Stream(stream)
    }
}

impl From<Url> for FileRef {
    fn from(url: Url) -> Self {
        FileRef::Url(url)
    }
}

impl From<PathBuf> for FileRef {
    fn from(path: PathBuf) -> Self {
        FileRef::Path(path)
    }
}

impl From<&str> for FileRef {
    fn from(location: &str) -> Self {
        FileRef::from_location(location)
    }
}

/// Files to install on one board
#[derive(Debug)]
pub struct BoardFiles {
    pub firmware: FileRef,
    /// Initial configuration script, installed as `autorun.scr`
    pub config: Option<FileRef>,
}

impl BoardFiles {
    pub fn new(firmware: impl Into<FileRef>) -> Self {
        Self {
            firmware: firmware.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: impl Into<FileRef>) -> Self {
        self.config = Some(config.into());
        self
    }
}
