//! Byte-stream seams between the streaming engine and the caller's sources
//! and sinks.
//!
//! Uploads read from a [`ByteSource`] and downloads write to a [`ByteSink`].
//! Both traits are implemented for every [`futures_io::AsyncRead`] /
//! [`futures_io::AsyncWrite`] type, so in-memory cursors, `async` pipes and
//! files all work directly. Types that implement tokio's I/O traits instead
//! can be adapted with the [`tokio_util::compat`] module.

use std::io::SeekFrom;

use async_trait::async_trait;
use futures_util::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

/// A source of bytes for an upload.
///
/// Sources are consumed from their current position; wrap a seekable reader
/// in [`Seekable`] to have the engine reposition it to the start of the
/// stream before an upload attempt begins.
#[async_trait]
pub trait ByteSource: Send {
    /// Whether the source can produce bytes at all. Checked before any I/O
    /// is attempted.
    fn is_readable(&self) -> bool {
        true
    }

    /// Repositions the source to its start when it supports doing so. The
    /// default implementation does nothing.
    async fn rewind(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    /// Reads bytes into `buf`, returning how many were read. A return of
    /// zero marks the end of the source.
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

#[async_trait]
impl<R> ByteSource for R
where
    R: AsyncRead + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        AsyncReadExt::read(self, buf).await
    }
}

/// Marks a reader as repositionable.
///
/// The engine rewinds a `Seekable` source that is not already at its start
/// before reading, so a retried upload always streams the full payload.
pub struct Seekable<R>(pub R);

#[async_trait]
impl<R> ByteSource for Seekable<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    async fn rewind(&mut self) -> std::io::Result<()> {
        let position = self.0.seek(SeekFrom::Current(0)).await?;
        if position > 0 {
            self.0.seek(SeekFrom::Start(0)).await?;
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        AsyncReadExt::read(&mut self.0, buf).await
    }
}

/// A destination for downloaded bytes.
#[async_trait]
pub trait ByteSink: Send {
    /// Whether the destination can accept bytes at all. Checked before any
    /// I/O is attempted.
    fn is_writable(&self) -> bool {
        true
    }

    /// Writes all of `data` to the destination.
    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Flushes any buffered bytes through to the destination.
    async fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<W> ByteSink for W
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        AsyncWriteExt::write_all(self, data).await
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        AsyncWriteExt::flush(self).await
    }
}
