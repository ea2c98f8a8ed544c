//! An in-memory chunk store used by the engine test suite. Mirrors the
//! MongoDB store's observable semantics (ascending-identity ordering,
//! upsert-style metadata writes) and adds operation counters plus failure
//! injection so error paths can be driven deterministically.

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use super::{ChunkCursor, ChunkStore};
use crate::{
    error::Result,
    file::{FileChunk, FileMetadata},
};

#[derive(Default)]
pub(crate) struct MemoryState {
    chunks: Vec<FileChunk>,
    metadata: HashMap<ObjectId, FileMetadata>,
    pub(crate) deletes: u32,
    pub(crate) inserts: u32,
    pub(crate) index_requests: u32,
    pub(crate) last_batch_size: Option<u32>,
    // 1-based call numbers at which the matching operation fails.
    pub(crate) fail_insert_at: Option<u32>,
    pub(crate) fail_delete_at: Option<u32>,
    pub(crate) fail_metadata_write: bool,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn chunks_for(&self, file_id: ObjectId) -> Vec<FileChunk> {
        let state = self.state.lock().unwrap();
        let mut chunks: Vec<FileChunk> = state
            .chunks
            .iter()
            .filter(|chunk| chunk.file_id == file_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|chunk| chunk.id);
        chunks
    }

    pub(crate) fn assembled_bytes(&self, file_id: ObjectId) -> Vec<u8> {
        self.chunks_for(file_id)
            .into_iter()
            .flat_map(|chunk| chunk.data)
            .collect()
    }

    pub(crate) fn metadata_for(&self, file_id: ObjectId) -> Option<FileMetadata> {
        self.state.lock().unwrap().metadata.get(&file_id).copied()
    }

    pub(crate) fn store_ops(&self) -> u32 {
        let state = self.state.lock().unwrap();
        state.deletes + state.inserts + state.index_requests
    }

    pub(crate) fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    fn injected(message: &str) -> crate::error::Error {
        io::Error::other(message.to_string()).into()
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    type Txn = ();
    type Cursor = MemoryCursor;

    async fn ensure_chunk_index(&self) -> Result<()> {
        self.state.lock().unwrap().index_requests += 1;
        Ok(())
    }

    async fn delete_chunks(&self, file_id: ObjectId, _txn: Option<&mut ()>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.deletes += 1;
        if state.fail_delete_at == Some(state.deletes) {
            return Err(Self::injected("injected delete failure"));
        }
        state.chunks.retain(|chunk| chunk.file_id != file_id);
        Ok(())
    }

    async fn insert_chunk(&self, chunk: FileChunk, _txn: Option<&mut ()>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.inserts += 1;
        if state.fail_insert_at == Some(state.inserts) {
            return Err(Self::injected("injected insert failure"));
        }
        state.chunks.push(chunk);
        Ok(())
    }

    async fn open_chunk_cursor(
        &self,
        file_id: ObjectId,
        batch_size: u32,
        _txn: Option<&mut ()>,
    ) -> Result<Self::Cursor> {
        let mut state = self.state.lock().unwrap();
        state.last_batch_size = Some(batch_size);
        let mut chunks: Vec<FileChunk> = state
            .chunks
            .iter()
            .filter(|chunk| chunk.file_id == file_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|chunk| chunk.id);
        Ok(MemoryCursor {
            payloads: chunks.into_iter().map(|chunk| chunk.data).collect(),
            current: None,
        })
    }

    async fn update_metadata(
        &self,
        file_id: ObjectId,
        meta: &FileMetadata,
        _txn: Option<&mut ()>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_metadata_write {
            return Err(Self::injected("injected metadata write failure"));
        }
        state.metadata.insert(file_id, *meta);
        Ok(())
    }
}

pub(crate) struct MemoryCursor {
    payloads: VecDeque<Vec<u8>>,
    current: Option<Vec<u8>>,
}

#[async_trait]
impl ChunkCursor<()> for MemoryCursor {
    async fn advance(&mut self, _txn: Option<&mut ()>) -> Result<bool> {
        self.current = self.payloads.pop_front();
        Ok(self.current.is_some())
    }

    fn chunk_data(&self) -> Result<Vec<u8>> {
        self.current
            .clone()
            .ok_or_else(|| MemoryStore::injected("cursor is not positioned on a chunk"))
    }
}
