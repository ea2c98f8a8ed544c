//! The chunked streaming engine.
//!
//! A [`DataStreamer`] is bound at construction to one parent file record's
//! identity and metadata snapshot plus one [`ChunkStore`] handle, and
//! exposes the four streaming operations as awaitable actions:
//!
//! - [`DataStreamer::upload`] / [`DataStreamer::upload_with_timeout`]
//! - [`DataStreamer::download`] / [`DataStreamer::download_with_timeout`]
//!
//! Every upload attempt is all-or-nothing from the caller's perspective:
//! it starts by deleting whatever chunks a prior attempt left behind, and
//! on failure it removes the chunks it wrote itself, so re-invoking
//! `upload` after any outcome is always safe. The engine holds no lock; at
//! most one upload or download may be in flight per parent record at a
//! time, and serializing concurrent attempts against the same record is
//! the caller's responsibility.

use std::future::Future;
use std::time::Duration;

use mongodb::bson::oid::ObjectId;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ErrorKind, Result},
    file::{FileEntity, FileMetadata},
    store::ChunkStore,
};

mod download;
mod upload;


pub use download::Download;
pub use upload::Upload;

/// The chunk size used when an upload does not specify one, in kilobytes.
pub const DEFAULT_CHUNK_SIZE_KB: u32 = 256;

/// The smallest accepted chunk size, in kilobytes.
pub const MIN_CHUNK_SIZE_KB: u32 = 128;

/// The largest accepted chunk size, in kilobytes.
pub const MAX_CHUNK_SIZE_KB: u32 = 4096;

// Fixed transfer buffer for source reads. An I/O granularity choice only,
// independent of the configured chunk size.
const READ_BUFFER_LEN: usize = 64 * 1024;

/// Streams binary data between a byte stream and the chunk records of one
/// parent file record.
///
/// The streamer keeps its own copy of the parent's metadata, refreshed
/// after every upload attempt's reconciliation write; apply the
/// [`FileMetadata`] snapshots returned by uploads to the caller-side entity
/// to keep it current. The streamer itself never writes through to the
/// entity.
pub struct DataStreamer<S: ChunkStore> {
    store: S,
    file_id: Option<ObjectId>,
    meta: FileMetadata,
}

impl<S: ChunkStore> DataStreamer<S> {
    /// Binds a streamer to `file`'s identity and current metadata.
    pub fn new(store: S, file: &impl FileEntity) -> Self {
        Self {
            store,
            file_id: file.file_id(),
            meta: file.file_metadata(),
        }
    }

    /// The metadata of the most recent upload attempt's reconciliation
    /// write, or the snapshot the streamer was constructed with if no
    /// upload has run.
    pub fn metadata(&self) -> FileMetadata {
        self.meta
    }
}

/// Cooperative-stop plumbing threaded through every suspension point of an
/// operation: a cancellation token and, for the timeout variants, a
/// wall-clock deadline raced at the same points. The failure cleanup and
/// the metadata reconciliation write run outside of checkpoints so an
/// interrupted operation still converges to a consistent stored state.
pub(crate) struct Interrupt {
    token: CancellationToken,
    deadline: Option<Instant>,
    budget: Option<Duration>,
}

impl Interrupt {
    pub(crate) fn new(token: Option<CancellationToken>, timeout: Option<Duration>) -> Self {
        Self {
            token: token.unwrap_or_default(),
            deadline: timeout.map(|budget| Instant::now() + budget),
            budget: timeout,
        }
    }

    /// Runs `work`, stopping early if the token fires or the deadline
    /// passes first.
    pub(crate) async fn checkpoint<T>(&self, work: impl Future<Output = T>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ErrorKind::Cancelled.into()),
            _ = Self::deadline_elapsed(self.deadline) => Err(ErrorKind::TimedOut {
                budget: self.budget.unwrap_or_default(),
            }
            .into()),
            output = work => Ok(output),
        }
    }

    async fn deadline_elapsed(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
