//! This crate stores large binary payloads in MongoDB by splitting them
//! into bounded-size chunk documents, streamed up and down without ever
//! buffering a whole payload in memory. A parent document of the caller's
//! own entity type tracks what is stored (cumulative byte size, chunk
//! count and a success flag), and the engine keeps that metadata
//! consistent with the chunk set after every attempt, including failed and
//! cancelled ones.
//!
//! # Overview
//!
//! - Implement [`FileEntity`] for the document type that owns a payload,
//!   embedding a [`FileMetadata`] (typically with `#[serde(flatten)]`).
//! - Build a [`MongoStore`] for that entity's collection, once, alongside
//!   the database handle.
//! - Construct a [`DataStreamer`] from the store and a saved entity, then
//!   upload from any async reader or download into any async writer.
//!
//! ```no_run
//! use mongo_filestream::{DataStreamer, FileEntity, FileMetadata, MongoStore};
//! use mongodb::{bson::oid::ObjectId, Client};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Recording {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     id: Option<ObjectId>,
//!     title: String,
//!     #[serde(flatten)]
//!     file: FileMetadata,
//! }
//!
//! impl FileEntity for Recording {
//!     fn file_id(&self) -> Option<ObjectId> {
//!         self.id
//!     }
//!
//!     fn file_metadata(&self) -> FileMetadata {
//!         self.file
//!     }
//! }
//!
//! # async fn example(mut recording: Recording) -> mongo_filestream::error::Result<()> {
//! let client = Client::with_uri_str("mongodb://localhost:27017").await?;
//! let store = MongoStore::new(&client.database("media"), "recordings", None);
//!
//! // `recording` was saved through its own lifecycle first, so it has an id.
//! let mut streamer = DataStreamer::new(store, &recording);
//!
//! let source = futures_util::io::Cursor::new(vec![0u8; 300_000]);
//! recording.file = streamer.upload(source).chunk_size_kb(128).await?;
//! assert!(recording.file.upload_successful);
//!
//! let mut payload = Vec::with_capacity(recording.file.file_size as usize);
//! streamer.download(&mut payload).batch_size(4).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Failure and cancellation semantics
//!
//! Every upload attempt first deletes whatever chunks earlier attempts
//! left behind, so retrying after any outcome is safe and old and new
//! chunk sets never mix. If an attempt fails or is cancelled mid-stream,
//! the chunks it wrote are removed again before the error surfaces, and
//! the parent's stored metadata is updated as the operation's final action
//! on every exit path. The timeout variants are sugar over cancellation: a
//! wall-clock budget raced at the same suspension points, via
//! [`CancellationToken`] checkpoints.
//!
//! Operations can also be scoped to a [`mongodb::ClientSession`] with
//! their `session` setter to make the whole transfer participate in one
//! transaction.
//!
//! Sources and sinks are [`futures_io::AsyncRead`] / `AsyncWrite` types
//! (wrap tokio types with [`tokio_util::compat`]); see [`Seekable`] for
//! sources the engine should rewind before reading.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
mod file;
mod io;
pub mod store;
mod streamer;

pub use ::mongodb;
pub use tokio_util::sync::CancellationToken;

pub use crate::{
    file::{FileChunk, FileEntity, FileMetadata},
    io::{ByteSink, ByteSource, Seekable},
    store::{
        mongo::{MongoStore, MongoStoreOptions},
        ChunkCursor,
        ChunkStore,
    },
    streamer::{
        DataStreamer,
        Download,
        Upload,
        DEFAULT_CHUNK_SIZE_KB,
        MAX_CHUNK_SIZE_KB,
        MIN_CHUNK_SIZE_KB,
    },
};
