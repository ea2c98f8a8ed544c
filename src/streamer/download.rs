//! The download operation: drain a file's chunk records, in identity
//! order, into a byte sink.

use std::{future::IntoFuture, time::Duration};

use futures_util::{future::BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{DataStreamer, Interrupt};
use crate::{
    error::{ErrorKind, Result},
    io::ByteSink,
    store::{ChunkCursor, ChunkStore},
};

impl<S: ChunkStore> DataStreamer<S> {
    /// Writes this file's stored payload to `destination`, chunk by chunk,
    /// in upload order.
    ///
    /// `await` will return [`Result<()>`]. The parent record must have been
    /// uploaded successfully; a record marked successful whose chunks are
    /// missing is reported as a consistency error, not silently ignored.
    ///
    /// ```rust
    /// # use mongo_filestream::{error::Result, DataStreamer, MongoStore};
    /// # async fn download_example(streamer: &DataStreamer<MongoStore>) -> Result<Vec<u8>> {
    /// let mut payload = Vec::new();
    /// streamer.download(&mut payload).batch_size(4).await?;
    /// # Ok(payload)
    /// # }
    /// ```
    pub fn download<W: ByteSink>(&self, destination: W) -> Download<'_, S, W> {
        Download {
            streamer: self,
            destination,
            batch_size: 1,
            cancellation: None,
            timeout: None,
            session: None,
        }
    }

    /// [`download`](DataStreamer::download) bounded by a wall-clock budget;
    /// if `timeout` elapses mid-transfer the operation stops cooperatively
    /// at its next suspension point.
    pub fn download_with_timeout<W: ByteSink>(
        &self,
        destination: W,
        timeout: Duration,
    ) -> Download<'_, S, W> {
        self.download(destination).timeout(timeout)
    }
}

/// Downloads a file's chunk records into a byte sink. Construct with
/// [`DataStreamer::download`].
#[must_use]
pub struct Download<'a, S: ChunkStore, W> {
    streamer: &'a DataStreamer<S>,
    destination: W,
    batch_size: u32,
    cancellation: Option<CancellationToken>,
    timeout: Option<Duration>,
    session: Option<&'a mut S::Txn>,
}

impl<'a, S: ChunkStore, W> Download<'a, S, W> {
    /// The number of chunk documents fetched per store round trip.
    /// Defaults to 1.
    pub fn batch_size(mut self, value: u32) -> Self {
        self.batch_size = value;
        self
    }

    /// Stop the download cooperatively when `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Bound the download by a wall-clock budget.
    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    /// Scope the download's reads to one transaction.
    pub fn session(mut self, session: &'a mut S::Txn) -> Self {
        self.session = Some(session);
        self
    }
}

impl<'a, S, W> IntoFuture for Download<'a, S, W>
where
    S: ChunkStore,
    W: ByteSink + 'a,
{
    type Output = Result<()>;
    type IntoFuture = BoxFuture<'a, Result<()>>;

    fn into_future(self) -> Self::IntoFuture {
        execute(self).boxed()
    }
}

async fn execute<S, W>(download: Download<'_, S, W>) -> Result<()>
where
    S: ChunkStore,
    W: ByteSink,
{
    let Download {
        streamer,
        mut destination,
        batch_size,
        cancellation,
        timeout,
        mut session,
    } = download;

    let file_id = streamer.file_id.ok_or(ErrorKind::UnsavedParent)?;
    if !streamer.meta.upload_successful {
        return Err(ErrorKind::UploadIncomplete.into());
    }
    if !destination.is_writable() {
        return Err(ErrorKind::DestinationNotWritable.into());
    }

    streamer.store.ensure_chunk_index().await?;

    let interrupt = Interrupt::new(cancellation, timeout);
    debug!(file_id = %file_id, batch_size, "starting chunked download");

    let mut cursor = interrupt
        .checkpoint(
            streamer
                .store
                .open_chunk_cursor(file_id, batch_size, session.as_deref_mut()),
        )
        .await??;

    let mut wrote_any = false;
    while interrupt
        .checkpoint(cursor.advance(session.as_deref_mut()))
        .await??
    {
        let data = cursor.chunk_data()?;
        interrupt.checkpoint(destination.write_all(&data)).await??;
        wrote_any = true;
    }

    if !wrote_any {
        return Err(ErrorKind::NoDataFound { file_id }.into());
    }

    interrupt.checkpoint(destination.flush()).await??;
    debug!(file_id = %file_id, "download complete");
    Ok(())
}
