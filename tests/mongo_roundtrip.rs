//! Round trip against a live deployment. Needs a reachable MongoDB
//! (`MONGODB_URI`, defaulting to localhost); run with `cargo test -- --ignored`.

use mongo_filestream::{DataStreamer, FileEntity, FileMetadata, MongoStore};
use mongodb::{
    bson::{doc, oid::ObjectId},
    Client,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct StoredReport {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    name: String,
    #[serde(flatten)]
    file: FileMetadata,
}

impl FileEntity for StoredReport {
    fn file_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn file_metadata(&self) -> FileMetadata {
        self.file
    }
}

#[tokio::test]
#[ignore = "requires a running MongoDB deployment"]
async fn round_trip_against_a_live_deployment() -> mongo_filestream::error::Result<()> {
    let uri = std::env::var("MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let client = Client::with_uri_str(uri).await?;
    let db = client.database("mongo_filestream_test");
    db.drop().await?;

    let reports = db.collection::<StoredReport>("reports");
    let mut report = StoredReport {
        id: None,
        name: "roundtrip".to_string(),
        file: FileMetadata::default(),
    };
    let inserted = reports.insert_one(&report).await?;
    report.id = inserted.inserted_id.as_object_id();

    let store = MongoStore::new(&db, "reports", None);
    let mut streamer = DataStreamer::new(store, &report);

    let payload: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    let meta = streamer
        .upload(futures_util::io::Cursor::new(payload.clone()))
        .chunk_size_kb(128)
        .await?;
    assert_eq!(meta.file_size, 300_000);
    assert_eq!(meta.chunk_count, 3);
    assert!(meta.upload_successful);

    // The reconciliation write must have reached the parent document.
    let stored = reports
        .find_one(doc! { "_id": report.id.unwrap() })
        .await?
        .expect("parent document present");
    assert_eq!(stored.file, meta);

    let mut downloaded = Vec::new();
    streamer.download(&mut downloaded).batch_size(2).await?;
    assert_eq!(downloaded, payload);

    Ok(())
}
