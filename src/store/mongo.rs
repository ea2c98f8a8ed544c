//! The MongoDB-backed chunk store.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Collection,
    Cursor,
    Database,
    IndexModel,
    SessionCursor,
};
use serde::Deserialize;
use tracing::debug;
use typed_builder::TypedBuilder;

use super::{ChunkCursor, ChunkStore};
use crate::{
    error::{ErrorKind, Result},
    file::{FileChunk, FileMetadata},
};

/// The collection chunk records are stored in unless overridden.
pub const DEFAULT_CHUNKS_COLLECTION: &str = "binary_chunks";

/// Contains the options for creating a [`MongoStore`].
#[derive(Clone, Debug, Default, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct MongoStoreOptions {
    /// The collection chunk records are stored in. Defaults to
    /// [`DEFAULT_CHUNKS_COLLECTION`].
    pub chunks_collection: Option<String>,
}

/// A [`ChunkStore`] over a [`mongodb::Database`].
///
/// One store binds the chunks collection to the collection holding the
/// parent file documents, and tracks whether the chunk index has been
/// ensured for this handle. Construct it once alongside the database handle
/// and clone it wherever a streamer is built; clones share the index flag.
#[derive(Clone, Debug)]
pub struct MongoStore {
    inner: Arc<MongoStoreInner>,
}

#[derive(Debug)]
struct MongoStoreInner {
    chunks: Collection<FileChunk>,
    files: Collection<Document>,
    indexed: AtomicBool,
}

/// The payload-only projection of a chunk document.
#[derive(Deserialize)]
struct ChunkData {
    #[serde(with = "serde_bytes")]
    data: Vec<u8>,
}

impl MongoStore {
    /// Creates a store for file documents living in `files_collection` of
    /// `db`.
    pub fn new(
        db: &Database,
        files_collection: impl AsRef<str>,
        options: impl Into<Option<MongoStoreOptions>>,
    ) -> Self {
        let chunks_collection = options
            .into()
            .and_then(|options| options.chunks_collection)
            .unwrap_or_else(|| DEFAULT_CHUNKS_COLLECTION.to_string());

        Self {
            inner: Arc::new(MongoStoreInner {
                chunks: db.collection(&chunks_collection),
                files: db.collection(files_collection.as_ref()),
                indexed: AtomicBool::new(false),
            }),
        }
    }
}

#[async_trait]
impl ChunkStore for MongoStore {
    type Txn = mongodb::ClientSession;
    type Cursor = MongoChunkCursor;

    async fn ensure_chunk_index(&self) -> Result<()> {
        // The flag is set at issue time, not on confirmation: a concurrent
        // first use can at worst repeat the creation request, which the
        // server treats as a no-op for an identical ascending index.
        if self.inner.indexed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        debug!(
            collection = self.inner.chunks.name(),
            "creating ascending index on chunk parent references"
        );
        let index = IndexModel::builder().keys(doc! { "fileId": 1 }).build();
        self.inner.chunks.create_index(index).await?;
        Ok(())
    }

    async fn delete_chunks(&self, file_id: ObjectId, txn: Option<&mut Self::Txn>) -> Result<()> {
        let delete = self.inner.chunks.delete_many(doc! { "fileId": file_id });
        match txn {
            Some(session) => {
                delete.session(&mut *session).await?;
            }
            None => {
                delete.await?;
            }
        }
        Ok(())
    }

    async fn insert_chunk(&self, chunk: FileChunk, txn: Option<&mut Self::Txn>) -> Result<()> {
        let insert = self.inner.chunks.insert_one(&chunk);
        match txn {
            Some(session) => {
                insert.session(&mut *session).await?;
            }
            None => {
                insert.await?;
            }
        }
        Ok(())
    }

    async fn open_chunk_cursor(
        &self,
        file_id: ObjectId,
        batch_size: u32,
        txn: Option<&mut Self::Txn>,
    ) -> Result<Self::Cursor> {
        let chunks = self.inner.chunks.clone_with_type::<ChunkData>();
        let find = chunks
            .find(doc! { "fileId": file_id })
            .sort(doc! { "_id": 1 })
            .projection(doc! { "_id": 0, "data": 1 })
            .batch_size(batch_size);

        let inner = match txn {
            Some(session) => CursorInner::Session(find.session(&mut *session).await?),
            None => CursorInner::Plain(find.await?),
        };
        Ok(MongoChunkCursor { inner })
    }

    async fn update_metadata(
        &self,
        file_id: ObjectId,
        meta: &FileMetadata,
        txn: Option<&mut Self::Txn>,
    ) -> Result<()> {
        let update = self.inner.files.update_one(
            doc! { "_id": file_id },
            doc! {
                "$set": {
                    "fileSize": meta.file_size as i64,
                    "chunkCount": meta.chunk_count as i32,
                    "uploadSuccessful": meta.upload_successful,
                }
            },
        );
        match txn {
            Some(session) => {
                update.session(&mut *session).await?;
            }
            None => {
                update.await?;
            }
        }
        Ok(())
    }
}

/// Cursor over the chunk payloads of one file stored in MongoDB.
pub struct MongoChunkCursor {
    inner: CursorInner,
}

enum CursorInner {
    Plain(Cursor<ChunkData>),
    Session(SessionCursor<ChunkData>),
}

#[async_trait]
impl ChunkCursor<mongodb::ClientSession> for MongoChunkCursor {
    async fn advance(&mut self, txn: Option<&mut mongodb::ClientSession>) -> Result<bool> {
        match &mut self.inner {
            CursorInner::Plain(cursor) => Ok(cursor.advance().await?),
            CursorInner::Session(cursor) => {
                let session = txn.ok_or_else(|| ErrorKind::Transaction {
                    message: "a cursor opened with a session must be advanced with it".to_string(),
                })?;
                Ok(cursor.advance(session).await?)
            }
        }
    }

    fn chunk_data(&self) -> Result<Vec<u8>> {
        let chunk = match &self.inner {
            CursorInner::Plain(cursor) => cursor.deserialize_current()?,
            CursorInner::Session(cursor) => cursor.deserialize_current()?,
        };
        Ok(chunk.data)
    }
}
