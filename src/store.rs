//! The document-store capabilities the streaming engine is built on.
//!
//! [`ChunkStore`] is the seam between the engine and the backing store: a
//! filtered delete over a file's chunks, a single-chunk insert, an ordered
//! and batched cursor over a file's chunk payloads, a single-document
//! metadata update, and idempotent registration of the chunk index. Each
//! operation optionally participates in a store transaction through the
//! store's transaction-handle type.
//!
//! [`mongo::MongoStore`] is the production implementation over a
//! [`mongodb::Database`].

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use crate::{
    error::Result,
    file::{FileChunk, FileMetadata},
};

pub mod mongo;

#[cfg(test)]
pub(crate) mod memory;

/// A handle to the collections backing one file-owning entity type.
///
/// Implementations are expected to be cheap to clone and safe to share; the
/// engine issues at most one operation at a time per streamer, but many
/// streamers may share one store.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// The store's transaction/session handle. Operations given a handle
    /// are scoped to that transaction; otherwise each commits independently.
    type Txn: Send;

    /// The cursor type produced by [`ChunkStore::open_chunk_cursor`].
    type Cursor: ChunkCursor<Self::Txn>;

    /// Ensures an ascending index exists on the chunk records' parent
    /// reference field. Idempotent per store handle; duplicate creation is
    /// a no-op at the store level.
    async fn ensure_chunk_index(&self) -> Result<()>;

    /// Deletes every chunk record owned by `file_id`.
    async fn delete_chunks(&self, file_id: ObjectId, txn: Option<&mut Self::Txn>) -> Result<()>;

    /// Persists one chunk record.
    async fn insert_chunk(&self, chunk: FileChunk, txn: Option<&mut Self::Txn>) -> Result<()>;

    /// Opens a cursor over the payloads of `file_id`'s chunk records,
    /// ordered by chunk identity ascending, projected to the payload field,
    /// and fetched `batch_size` documents at a time.
    async fn open_chunk_cursor(
        &self,
        file_id: ObjectId,
        batch_size: u32,
        txn: Option<&mut Self::Txn>,
    ) -> Result<Self::Cursor>;

    /// Writes a metadata snapshot into the parent file record's document.
    async fn update_metadata(
        &self,
        file_id: ObjectId,
        meta: &FileMetadata,
        txn: Option<&mut Self::Txn>,
    ) -> Result<()>;
}

/// An incrementally advanced cursor over one file's chunk payloads.
#[async_trait]
pub trait ChunkCursor<Txn: Send>: Send {
    /// Advances to the next chunk, returning whether one is available. A
    /// cursor opened inside a transaction must be advanced with the same
    /// transaction handle it was opened with.
    async fn advance(&mut self, txn: Option<&mut Txn>) -> Result<bool>;

    /// The payload of the chunk the cursor is currently positioned on.
    fn chunk_data(&self) -> Result<Vec<u8>>;
}
