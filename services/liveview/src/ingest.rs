use crate::blob_store::{BlobStore, BlobStoreError};
use crate::frame_name::FrameNamer;
use crate::registry::{FrameRecord, LatestFrameRegistry};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

/// JPEG start-of-image marker
const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Errors that can occur while ingesting a frame.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Image payload is empty")]
    EmptyImage,

    #[error("Image payload is not a JPEG")]
    NotJpeg,

    #[error("Failed to store frame: {0}")]
    Storage(#[source] BlobStoreError),
}

/// Stores uploaded frames and publishes them as the latest frame.
///
/// A frame becomes visible through the registry only after its blob write
/// has completed, so readers never observe a filename they cannot fetch.
pub struct FrameIngestor {
    store: Arc<dyn BlobStore>,
    registry: Arc<LatestFrameRegistry>,
    namer: FrameNamer,
    require_jpeg_signature: bool,
}

impl FrameIngestor {
    pub fn new(
        store: Arc<dyn BlobStore>,
        registry: Arc<LatestFrameRegistry>,
        namer: FrameNamer,
        require_jpeg_signature: bool,
    ) -> Self {
        Self {
            store,
            registry,
            namer,
            require_jpeg_signature,
        }
    }

    /// Persist `data` under a fresh filename and make it the latest frame.
    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn ingest(&self, data: Bytes) -> Result<FrameRecord, IngestError> {
        if data.is_empty() {
            return Err(IngestError::EmptyImage);
        }

        if self.require_jpeg_signature && !data.starts_with(&JPEG_SOI) {
            return Err(IngestError::NotJpeg);
        }

        let id = self.namer.next_id();
        let filename = self.namer.filename(id);

        if let Err(e) = self.store.put(&filename, &data).await {
            error!(filename = %filename, error = %e, "Failed to store frame");
            return Err(IngestError::Storage(e));
        }

        let record = FrameRecord {
            filename,
            timestamp: id.millis(),
            byte_length: data.len() as u64,
        };
        self.registry.update(record.clone());

        metrics::histogram!("liveview_upload_bytes").record(data.len() as f64);

        info!(
            filename = %record.filename,
            timestamp = record.timestamp,
            ingested_at = ?record.ingested_at(),
            size_bytes = record.byte_length,
            "Frame ingested"
        );

        Ok(record)
    }

    /// Seed the registry from the newest frame already in the store.
    ///
    /// Only filenames this ingestor would generate are considered. Returns
    /// the restored record, if any.
    pub async fn restore_latest(&self) -> Result<Option<FrameRecord>, BlobStoreError> {
        let newest = self
            .store
            .list()
            .await?
            .into_iter()
            .filter_map(|blob| self.namer.parse(&blob.filename).map(|id| (id, blob)))
            .max_by_key(|(id, _)| *id);

        let Some((id, blob)) = newest else {
            info!("No stored frames to restore");
            return Ok(None);
        };

        self.namer.observe(id);

        let record = FrameRecord {
            filename: blob.filename,
            timestamp: id.millis(),
            byte_length: blob.size_bytes,
        };
        self.registry.update(record.clone());

        info!(
            filename = %record.filename,
            timestamp = record.timestamp,
            "Restored latest frame from storage"
        );

        Ok(Some(record))
    }

    /// The registry this ingestor publishes to
    pub fn registry(&self) -> &Arc<LatestFrameRegistry> {
        &self.registry
    }
}
