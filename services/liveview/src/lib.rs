//! LiveView Frame Service
//!
//! Receives periodic JPEG frames from a remote camera client, keeps the most
//! recently received frame, and serves it to polling viewers over HTTP.
//!
//! ## Features
//!
//! - **Dual-Encoding Uploads**: frames arrive as a multipart file part or as
//!   base64 text (plain or data URL) in a form field named `image`
//! - **Atomic Latest Pointer**: the latest-frame registry is only updated
//!   after the frame's bytes are durably on disk
//! - **Safe Retrieval**: stored frames are served by filename with strict
//!   name validation and long-lived cache headers
//!
//! ## Architecture
//!
//! ```text
//!  Camera                                             Viewer
//! ┌──────────────┐                                  ┌──────────────┐
//! │ POST /upload │                                  │ GET /latest  │
//! └──────────────┘                                  │ GET /images  │
//!        │                                          └──────────────┘
//!        ▼                                             ▲        ▲
//! ┌──────────────┐     ┌──────────────┐               │        │
//! │ ImageUpload  │────▶│ Frame        │               │        │
//! │ (decode)     │     │ Ingestor     │               │        │
//! └──────────────┘     └──────────────┘               │        │
//!                       │ 1. put     │ 2. update      │        │
//!                       ▼            ▼                │        │
//!               ┌──────────────┐ ┌──────────────┐     │        │
//!               │ Blob Store   │ │ Latest-Frame │─────┘        │
//!               │ (uploads/)   │ │ Registry     │              │
//!               └──────────────┘ └──────────────┘              │
//!                       │                                      │
//!                       └──────────────────────────────────────┘
//! ```

pub mod blob_store;
pub mod config;
pub mod error;
pub mod frame_name;
pub mod ingest;
pub mod registry;
pub mod routes;
pub mod upload;

pub use blob_store::{BlobReader, BlobStore, BlobStoreError, FsBlobStore, OpenedBlob, StoredBlob};
pub use config::Config;
pub use error::{ApiError, ErrorResponse};
pub use frame_name::{Clock, FrameId, FrameNamer, SystemClock};
pub use ingest::{FrameIngestor, IngestError};
pub use registry::{FrameRecord, LatestFrameRegistry};
pub use routes::{create_router, start_api_server, AppState};
pub use upload::ImageUpload;
