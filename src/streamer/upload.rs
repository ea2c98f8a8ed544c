//! The upload operation: read a byte source into bounded-size chunk
//! records, then reconcile the parent record's metadata with whatever the
//! attempt actually stored.

use std::{future::IntoFuture, mem, time::Duration};

use futures_util::{future::BoxFuture, FutureExt};
use mongodb::bson::oid::ObjectId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{
    DataStreamer,
    Interrupt,
    DEFAULT_CHUNK_SIZE_KB,
    MAX_CHUNK_SIZE_KB,
    MIN_CHUNK_SIZE_KB,
    READ_BUFFER_LEN,
};
use crate::{
    error::{ErrorKind, Result},
    file::{FileChunk, FileMetadata},
    io::ByteSource,
    store::ChunkStore,
};

impl<S: ChunkStore> DataStreamer<S> {
    /// Uploads the contents of `source` as this file's chunk records,
    /// replacing any chunks a previous attempt stored.
    ///
    /// `await` will return [`Result<FileMetadata>`] describing what the
    /// attempt persisted. Whatever the outcome, the parent record's stored
    /// metadata is updated as the operation's last action, so it always
    /// reflects the chunk set that is actually present.
    ///
    /// ```rust
    /// # use mongo_filestream::{error::Result, DataStreamer, MongoStore};
    /// # async fn upload_example(
    /// #     streamer: &mut DataStreamer<MongoStore>,
    /// #     payload: Vec<u8>,
    /// # ) -> Result<()> {
    /// let source = futures_util::io::Cursor::new(payload);
    /// let meta = streamer.upload(source).chunk_size_kb(512).await?;
    /// assert!(meta.upload_successful);
    /// # Ok(())
    /// # }
    /// ```
    pub fn upload<R: ByteSource>(&mut self, source: R) -> Upload<'_, S, R> {
        Upload {
            streamer: self,
            source,
            chunk_size_kb: DEFAULT_CHUNK_SIZE_KB,
            cancellation: None,
            timeout: None,
            session: None,
        }
    }

    /// [`upload`](DataStreamer::upload) bounded by a wall-clock budget: if
    /// `timeout` elapses mid-transfer the attempt is stopped cooperatively
    /// at its next suspension point, its chunks are removed, and the
    /// metadata reconciliation still runs.
    pub fn upload_with_timeout<R: ByteSource>(
        &mut self,
        source: R,
        timeout: Duration,
    ) -> Upload<'_, S, R> {
        self.upload(source).timeout(timeout)
    }
}

/// Uploads a byte source into a file's chunk records. Construct with
/// [`DataStreamer::upload`].
#[must_use]
pub struct Upload<'a, S: ChunkStore, R> {
    streamer: &'a mut DataStreamer<S>,
    source: R,
    chunk_size_kb: u32,
    cancellation: Option<CancellationToken>,
    timeout: Option<Duration>,
    session: Option<&'a mut S::Txn>,
}

impl<'a, S: ChunkStore, R> Upload<'a, S, R> {
    /// The target size of one chunk record, in kilobytes. Must lie between
    /// [`MIN_CHUNK_SIZE_KB`] and [`MAX_CHUNK_SIZE_KB`] inclusive. Defaults
    /// to [`DEFAULT_CHUNK_SIZE_KB`].
    pub fn chunk_size_kb(mut self, value: u32) -> Self {
        self.chunk_size_kb = value;
        self
    }

    /// Stop the upload cooperatively when `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Bound the upload by a wall-clock budget.
    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    /// Scope every store operation of this upload to one transaction.
    pub fn session(mut self, session: &'a mut S::Txn) -> Self {
        self.session = Some(session);
        self
    }
}

impl<'a, S, R> IntoFuture for Upload<'a, S, R>
where
    S: ChunkStore,
    R: ByteSource + 'a,
{
    type Output = Result<FileMetadata>;
    type IntoFuture = BoxFuture<'a, Result<FileMetadata>>;

    fn into_future(self) -> Self::IntoFuture {
        execute(self).boxed()
    }
}

async fn execute<S, R>(upload: Upload<'_, S, R>) -> Result<FileMetadata>
where
    S: ChunkStore,
    R: ByteSource,
{
    let Upload {
        streamer,
        mut source,
        chunk_size_kb,
        cancellation,
        timeout,
        mut session,
    } = upload;

    let file_id = streamer.file_id.ok_or(ErrorKind::UnsavedParent)?;
    if !(MIN_CHUNK_SIZE_KB..=MAX_CHUNK_SIZE_KB).contains(&chunk_size_kb) {
        return Err(ErrorKind::InvalidChunkSize { kb: chunk_size_kb }.into());
    }
    if !source.is_readable() {
        return Err(ErrorKind::SourceNotReadable.into());
    }

    streamer.store.ensure_chunk_index().await?;

    let interrupt = Interrupt::new(cancellation, timeout);
    debug!(file_id = %file_id, chunk_size_kb, "starting chunked upload");

    // Every attempt begins from a clean slate, which is what makes retries
    // after any prior outcome safe. A failure here propagates as-is: nothing
    // has been written yet on this attempt.
    interrupt
        .checkpoint(streamer.store.delete_chunks(file_id, session.as_deref_mut()))
        .await??;
    let mut meta = FileMetadata::default();

    let outcome = transfer(
        &streamer.store,
        &mut source,
        file_id,
        chunk_size_kb,
        &interrupt,
        &mut session,
        &mut meta,
    )
    .await;

    let outcome = match outcome {
        Ok(()) => Ok(()),
        Err(original) => {
            warn!(
                file_id = %file_id,
                error = %original,
                "upload failed; removing this attempt's chunks"
            );
            meta = FileMetadata::default();
            match streamer
                .store
                .delete_chunks(file_id, session.as_deref_mut())
                .await
            {
                Ok(()) => Err(original),
                Err(delete_error) => Err(ErrorKind::Abort {
                    original_error: Some(Box::new(original)),
                    delete_error: Box::new(delete_error),
                }
                .into()),
            }
        }
    };

    // Reconcile the stored metadata with the chunk set on every exit path,
    // cancelled or not. When this write itself fails it supersedes the
    // transfer error: it is the most recent failure and the one the caller
    // can act on.
    let reconciled = streamer
        .store
        .update_metadata(file_id, &meta, session.as_deref_mut())
        .await;
    streamer.meta = meta;

    match (outcome, reconciled) {
        (Ok(()), Ok(())) => {
            debug!(
                file_id = %file_id,
                file_size = meta.file_size,
                chunk_count = meta.chunk_count,
                "upload complete"
            );
            Ok(meta)
        }
        (Err(error), Ok(())) => Err(error),
        (_, Err(error)) => Err(error),
    }
}

async fn transfer<S, R>(
    store: &S,
    source: &mut R,
    file_id: ObjectId,
    chunk_size_kb: u32,
    interrupt: &Interrupt,
    session: &mut Option<&mut S::Txn>,
    meta: &mut FileMetadata,
) -> Result<()>
where
    S: ChunkStore,
    R: ByteSource,
{
    interrupt.checkpoint(source.rewind()).await??;

    let chunk_size = chunk_size_kb as usize * 1024;
    let mut accumulator: Vec<u8> = Vec::with_capacity(chunk_size);
    let mut buf = vec![0u8; READ_BUFFER_LEN];

    loop {
        let read = interrupt.checkpoint(source.read(&mut buf)).await??;
        if read == 0 {
            break;
        }

        accumulator.extend_from_slice(&buf[..read]);
        meta.file_size += read as u64;

        if accumulator.len() >= chunk_size {
            flush_chunk(store, file_id, &mut accumulator, interrupt, session, meta).await?;
        }
    }

    if meta.file_size == 0 {
        return Err(ErrorKind::EmptySource.into());
    }

    // Trailing flush; a no-op when the source divided evenly into whole
    // chunks and the accumulator is already empty.
    flush_chunk(store, file_id, &mut accumulator, interrupt, session, meta).await?;
    meta.upload_successful = true;
    Ok(())
}

async fn flush_chunk<S: ChunkStore>(
    store: &S,
    file_id: ObjectId,
    accumulator: &mut Vec<u8>,
    interrupt: &Interrupt,
    session: &mut Option<&mut S::Txn>,
    meta: &mut FileMetadata,
) -> Result<()> {
    if accumulator.is_empty() {
        return Ok(());
    }

    let capacity = accumulator.capacity();
    let data = mem::replace(accumulator, Vec::with_capacity(capacity));
    trace!(
        file_id = %file_id,
        n = meta.chunk_count,
        len = data.len(),
        "flushing chunk"
    );

    let chunk = FileChunk {
        id: ObjectId::new(),
        file_id,
        data,
    };
    interrupt
        .checkpoint(store.insert_chunk(chunk, session.as_deref_mut()))
        .await??;
    meta.chunk_count += 1;
    Ok(())
}
