//! The persisted data model: chunk records and the parent file record's
//! tracked metadata.

use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize, Serializer};

/// One bounded-size slice of a larger binary payload, persisted as a single
/// document in the chunks collection.
///
/// Chunk identities are generated immediately before each insert and are
/// monotonically increasing in write order, so sorting a file's chunks by
/// `_id` ascending and concatenating their payloads reproduces the uploaded
/// byte stream exactly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunk {
    /// A unique identity for this chunk, freshly generated at persist time
    /// and never reused.
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Identity of the owning parent file record. Immutable once set; many
    /// chunks reference exactly one parent.
    pub file_id: ObjectId,

    /// The chunk's byte payload, stored as BSON binary. Every chunk holds
    /// the configured target size except possibly the final one.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// The tracked state of a stored file: how many bytes and chunks the most
/// recent upload attempt persisted, and whether it ran to completion.
///
/// Streaming operations return a fresh snapshot rather than writing through
/// to the caller's entity; embed this struct in a file-owning document with
/// `#[serde(flatten)]` and apply returned snapshots to it.
///
/// `upload_successful` is true only when every byte of the source was read
/// and the final chunk flush completed, in which case `chunk_count >= 1`,
/// `file_size > 0`, and the stored chunk set reconstructs the payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Total bytes read from the source during the attempt.
    #[serde(default, serialize_with = "serialize_u64_as_i64")]
    pub file_size: u64,

    /// Number of chunk records the attempt persisted.
    #[serde(default, serialize_with = "serialize_u32_as_i32")]
    pub chunk_count: u32,

    /// Whether the attempt ran to completion.
    #[serde(default)]
    pub upload_successful: bool,
}

/// Implemented by domain entities that own a streamed binary payload.
///
/// The streaming engine is constructed from an entity and a store handle at
/// the call site; it only ever reads these two views of the entity.
pub trait FileEntity {
    /// The entity's identity in its collection, or `None` while it has not
    /// been saved yet.
    fn file_id(&self) -> Option<ObjectId>;

    /// The entity's current file metadata.
    fn file_metadata(&self) -> FileMetadata;
}

// BSON has no unsigned integers; store the counters as their signed
// equivalents, refusing values that would not round-trip.
pub(crate) fn serialize_u64_as_i64<S: Serializer>(
    val: &u64,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match i64::try_from(*val) {
        Ok(val) => serializer.serialize_i64(val),
        Err(_) => Err(serde::ser::Error::custom(format!(
            "file size {val} does not fit in a BSON Int64"
        ))),
    }
}

pub(crate) fn serialize_u32_as_i32<S: Serializer>(
    val: &u32,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match i32::try_from(*val) {
        Ok(val) => serializer.serialize_i32(val),
        Err(_) => Err(serde::ser::Error::custom(format!(
            "chunk count {val} does not fit in a BSON Int32"
        ))),
    }
}

#[cfg(test)]
mod test {
    use mongodb::bson::{doc, oid::ObjectId, spec::BinarySubtype, Binary, Bson};

    use super::{FileChunk, FileMetadata};

    #[test]
    fn chunk_documents_use_the_persisted_field_names() {
        let chunk = FileChunk {
            id: ObjectId::new(),
            file_id: ObjectId::new(),
            data: vec![1, 2, 3],
        };

        let document = mongodb::bson::to_document(&chunk).unwrap();
        assert_eq!(document.get_object_id("_id").unwrap(), chunk.id);
        assert_eq!(document.get_object_id("fileId").unwrap(), chunk.file_id);
        assert_eq!(
            document.get("data").unwrap(),
            &Bson::Binary(Binary {
                subtype: BinarySubtype::Generic,
                bytes: vec![1, 2, 3],
            })
        );
    }

    #[test]
    fn metadata_round_trips_with_signed_storage_types() {
        let meta = FileMetadata {
            file_size: 300_000,
            chunk_count: 3,
            upload_successful: true,
        };

        let document = mongodb::bson::to_document(&meta).unwrap();
        assert_eq!(document.get_i64("fileSize").unwrap(), 300_000);
        assert_eq!(document.get_i32("chunkCount").unwrap(), 3);
        assert!(document.get_bool("uploadSuccessful").unwrap());

        let back: FileMetadata = mongodb::bson::from_document(document).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn metadata_fields_default_when_absent() {
        let back: FileMetadata = mongodb::bson::from_document(doc! {}).unwrap();
        assert_eq!(back, FileMetadata::default());
    }
}
