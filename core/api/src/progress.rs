//! Upload sources and byte-progress reporting.

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use filedeck_common::{Error, Result};

/// Chunk size used when slicing in-memory uploads.
const CHUNK_SIZE: usize = 64 * 1024;

/// Byte stream type for upload bodies.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Progress callback, invoked with a percentage in `0.0..=100.0`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Where the bytes of an upload come from.
#[derive(Debug, Clone)]
enum Content {
    Memory(Bytes),
    Disk(PathBuf),
}

/// A local file chosen for upload.
#[derive(Debug, Clone)]
pub struct UploadSource {
    name: String,
    len: u64,
    content: Content,
}

impl UploadSource {
    /// Upload `data` under `name`.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            len: data.len() as u64,
            content: Content::Memory(data),
        }
    }

    /// Upload the file at `path`, named after its final path component.
    ///
    /// # Errors
    /// - Path has no file name or is not a regular file
    /// - Metadata could not be read
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidInput(format!("No file name in {}", path.display())))?
            .to_string();

        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(Error::InvalidInput(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        Ok(Self {
            name,
            len: metadata.len(),
            content: Content::Disk(path.to_path_buf()),
        })
    }

    /// File name sent to the server.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total number of bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Open the content as a stream of chunks.
    pub async fn into_stream(self) -> Result<ByteStream> {
        match self.content {
            Content::Memory(data) => {
                let chunks: Vec<Result<Bytes>> = (0..data.len())
                    .step_by(CHUNK_SIZE)
                    .map(|start| Ok(data.slice(start..(start + CHUNK_SIZE).min(data.len()))))
                    .collect();
                Ok(Box::pin(stream::iter(chunks)))
            }
            Content::Disk(path) => {
                let file = tokio::fs::File::open(&path).await?;
                let stream = ReaderStream::with_capacity(file, CHUNK_SIZE).map(|r| r.map_err(Error::from));
                Ok(Box::pin(stream))
            }
        }
    }
}

/// Percentage of `sent` over `total`, rounded to two decimals.
pub fn percent(sent: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let pct = (sent as f64 / total as f64 * 100.0).min(100.0);
    (pct * 100.0).round() / 100.0
}

/// Wrap `stream` so that `progress` is called as each chunk is pulled.
///
/// Reported values never decrease.
pub fn track_progress(stream: ByteStream, total: u64, progress: ProgressFn) -> ByteStream {
    let mut sent = 0u64;
    let tracked = stream.map(move |chunk| {
        if let Ok(bytes) = &chunk {
            sent += bytes.len() as u64;
            progress(percent(sent, total));
        }
        chunk
    });
    Box::pin(tracked)
}
