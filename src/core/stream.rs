//! Console stream abstraction
//!
//! The monitoring engine only needs three things from a connection: read the
//! next chunk of output, write an acknowledgement back, and know whether the
//! connection is still usable. Opening the connection (serial port, TCP,
//! telnet, ...) is the caller's business; anything that speaks tokio's
//! `AsyncRead + AsyncWrite` can be wrapped in an [`IoStream`].

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default read chunk size
const READ_CHUNK: usize = 4096;

/// Stream error types
#[derive(Error, Debug)]
pub enum StreamError {
    /// Stream was never opened or has been closed
    #[error("Not connected")]
    NotConnected,

    /// Remote side closed the stream during a write
    #[error("Disconnected")]
    Disconnected,

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Stream statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Bytes read from the device
    pub bytes_received: u64,
    /// Bytes written to the device
    pub bytes_sent: u64,
}

/// A live console connection to a device under test.
///
/// Implementations must preserve byte order and must not drop data between
/// calls to [`ConsoleStream::read_chunk`]. Output handed back through
/// [`ConsoleStream::unread`] belongs to whoever reads next and is returned
/// before anything new from the device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsoleStream: Send {
    /// Check if the stream can still be read from
    fn is_open(&self) -> bool;

    /// Wait for the next chunk of output.
    ///
    /// Returns `Ok(None)` once the remote side has closed the stream.
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, StreamError>;

    /// Push back output that was read but not consumed
    fn unread(&mut self, data: Bytes);

    /// Write all of `data` to the stream and flush it
    async fn write_all(&mut self, data: &[u8]) -> Result<(), StreamError>;

    /// Close the stream. Further reads fail with [`StreamError::NotConnected`].
    async fn close(&mut self) -> Result<(), StreamError>;

    /// Get connection info string
    fn describe(&self) -> String {
        "console".to_string()
    }
}

/// [`ConsoleStream`] over any tokio reader/writer
pub struct IoStream<T> {
    inner: Option<T>,
    pushback: BytesMut,
    name: String,
    stats: StreamStats,
}

impl<T> IoStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already connected reader/writer
    pub fn new(name: &str, inner: T) -> Self {
        Self {
            inner: Some(inner),
            pushback: BytesMut::new(),
            name: name.to_string(),
            stats: StreamStats::default(),
        }
    }

    /// Get statistics
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Give back the wrapped reader/writer, if still open
    pub fn into_inner(self) -> Option<T> {
        self.inner
    }
}

impl<T> fmt::Debug for IoStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoStream")
            .field("name", &self.name)
            .field("open", &self.inner.is_some())
            .field("pushback", &self.pushback.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[async_trait]
impl<T> ConsoleStream for IoStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn is_open(&self) -> bool {
        // output pushed back before a close can still be read
        self.inner.is_some() || !self.pushback.is_empty()
    }

    async fn read_chunk(&mut self) -> Result<Option<Bytes>, StreamError> {
        if !self.pushback.is_empty() {
            return Ok(Some(self.pushback.split().freeze()));
        }

        let inner = self.inner.as_mut().ok_or(StreamError::NotConnected)?;

        let mut buf = vec![0u8; READ_CHUNK];
        let n = inner.read(&mut buf).await?;
        if n == 0 {
            // EOF: the remote end is gone, nothing more will arrive
            self.inner = None;
            return Ok(None);
        }

        buf.truncate(n);
        self.stats.bytes_received += n as u64;
        Ok(Some(Bytes::from(buf)))
    }

    fn unread(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        let mut joined = BytesMut::with_capacity(data.len() + self.pushback.len());
        joined.extend_from_slice(&data);
        joined.extend_from_slice(&self.pushback);
        self.pushback = joined;
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), StreamError> {
        let inner = self.inner.as_mut().ok_or(StreamError::NotConnected)?;

        inner.write_all(data).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
                StreamError::Disconnected
            }
            _ => StreamError::IoError(e),
        })?;
        inner.flush().await?;

        self.stats.bytes_sent += data.len() as u64;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.pushback.clear();
        if let Some(mut inner) = self.inner.take() {
            inner.shutdown().await.ok();
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_then_eof() {
        let mock = tokio_test::io::Builder::new()
            .read(b"U-Boot 2024.01\n")
            .read(b"Starting kernel ...\n")
            .build();
        let mut stream = IoStream::new("mock", mock);

        let first = stream.read_chunk().await.unwrap().unwrap();
        assert_eq!(&first[..], b"U-Boot 2024.01\n");
        let second = stream.read_chunk().await.unwrap().unwrap();
        assert_eq!(&second[..], b"Starting kernel ...\n");

        assert!(stream.read_chunk().await.unwrap().is_none());
        assert!(!stream.is_open());
        assert_eq!(stream.stats().bytes_received, 35);
    }

    #[tokio::test]
    async fn test_write_counts_bytes() {
        let mock = tokio_test::io::Builder::new().write(b"#\n").build();
        let mut stream = IoStream::new("mock", mock);

        stream.write_all(b"#\n").await.unwrap();
        assert_eq!(stream.stats().bytes_sent, 2);
    }

    #[tokio::test]
    async fn test_unread_is_returned_first() {
        let mock = tokio_test::io::Builder::new().read(b"tail\n").build();
        let mut stream = IoStream::new("mock", mock);

        stream.unread(Bytes::from_static(b"login: "));
        stream.unread(Bytes::from_static(b"buildroot "));

        let first = stream.read_chunk().await.unwrap().unwrap();
        assert_eq!(&first[..], b"buildroot login: ");
        let second = stream.read_chunk().await.unwrap().unwrap();
        assert_eq!(&second[..], b"tail\n");
        assert_eq!(stream.stats().bytes_received, 5);
    }

    #[tokio::test]
    async fn test_unread_after_eof_stays_readable() {
        let mock = tokio_test::io::Builder::new().build();
        let mut stream = IoStream::new("mock", mock);
        assert!(stream.read_chunk().await.unwrap().is_none());
        assert!(!stream.is_open());

        stream.unread(Bytes::from_static(b"# "));
        assert!(stream.is_open());
        let chunk = stream.read_chunk().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"# ");
        assert!(matches!(
            stream.read_chunk().await,
            Err(StreamError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_closed_stream_is_not_connected() {
        let (client, _server) = tokio::io::duplex(64);
        let mut stream = IoStream::new("duplex", client);
        stream.close().await.unwrap();

        assert!(!stream.is_open());
        assert!(matches!(
            stream.read_chunk().await,
            Err(StreamError::NotConnected)
        ));
        assert!(matches!(
            stream.write_all(b"#").await,
            Err(StreamError::NotConnected)
        ));
    }
}
