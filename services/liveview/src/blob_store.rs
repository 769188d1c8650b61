//! Filesystem blob storage for uploaded frames.
//!
//! Blobs are opaque byte payloads keyed by a flat filename inside a single
//! root directory. Writes go to a hidden temporary file which is synced and
//! then renamed into place, so a filename is only ever visible once its
//! bytes are complete on disk. Reads hand back an async reader so large
//! frames can be streamed to clients.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Longest filename accepted by the store
const MAX_FILENAME_LEN: usize = 255;

/// Suffix of in-flight temporary files
const PARTIAL_SUFFIX: &str = ".partial";

/// Errors returned by blob storage operations.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A blob present in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub filename: String,
    pub size_bytes: u64,
}

/// Byte stream of one stored blob
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// A blob opened for reading
pub struct OpenedBlob {
    pub size_bytes: u64,
    pub reader: BlobReader,
}

/// Storage backend for frame payloads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Durably write `data` under `filename`, replacing any previous blob.
    async fn put(&self, filename: &str, data: &[u8]) -> Result<(), BlobStoreError>;

    /// Open the blob stored under `filename` for streaming.
    async fn open(&self, filename: &str) -> Result<OpenedBlob, BlobStoreError>;

    /// List every stored blob.
    async fn list(&self) -> Result<Vec<StoredBlob>, BlobStoreError>;

    /// Whether the backend can currently accept writes.
    async fn is_ready(&self) -> bool;
}

/// Blob store backed by a local directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    ///
    /// Temporary files abandoned by interrupted writes are removed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, BlobStoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let store = Self { root };
        let removed = store.sweep_partials().await?;

        info!(
            root = %store.root.display(),
            removed_partials = removed,
            "Blob store initialized"
        );

        Ok(store)
    }

    /// Get the storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, filename: &str) -> Result<PathBuf, BlobStoreError> {
        validate_filename(filename)?;
        Ok(self.root.join(filename))
    }

    async fn sweep_partials(&self) -> io::Result<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX) {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(file = %name, error = %e, "Failed to remove stale partial"),
                }
            }
        }

        Ok(removed)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    #[instrument(skip(self, data), fields(size_bytes = data.len()))]
    async fn put(&self, filename: &str, data: &[u8]) -> Result<(), BlobStoreError> {
        let path = self.path_for(filename)?;
        let tmp = self.root.join(format!(
            ".{}.{}{}",
            filename,
            Uuid::new_v4().simple(),
            PARTIAL_SUFFIX
        ));

        if let Err(e) = write_synced(&tmp, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        sync_dir(&self.root).await?;

        debug!(path = %path.display(), "Blob written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn open(&self, filename: &str) -> Result<OpenedBlob, BlobStoreError> {
        let path = self.path_for(filename)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BlobStoreError::NotFound(filename.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(BlobStoreError::NotFound(filename.to_string()));
        }

        debug!(size_bytes = meta.len(), "Blob opened");
        Ok(OpenedBlob {
            size_bytes: meta.len(),
            reader: Box::pin(file),
        })
    }

    async fn list(&self) -> Result<Vec<StoredBlob>, BlobStoreError> {
        let mut blobs = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            if validate_filename(&filename).is_err() {
                continue;
            }

            let meta = entry.metadata().await?;
            if meta.is_file() {
                blobs.push(StoredBlob {
                    filename,
                    size_bytes: meta.len(),
                });
            }
        }

        Ok(blobs)
    }

    async fn is_ready(&self) -> bool {
        // Leftovers match the partial pattern and are swept on restart
        let marker = self
            .root
            .join(format!(".ready.{}{}", Uuid::new_v4().simple(), PARTIAL_SUFFIX));

        let writable = write_synced(&marker, b"").await;
        let _ = fs::remove_file(&marker).await;

        match writable {
            Ok(()) => true,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Blob store not writable");
                false
            }
        }
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}

/// Persist directory entries so a completed rename survives a crash.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Check that a filename names a single entry directly inside the store root.
///
/// Only `[A-Za-z0-9._-]` is allowed, so separators and absolute paths can
/// never be expressed. Hidden names and `..` are rejected as well.
pub fn validate_filename(filename: &str) -> Result<(), BlobStoreError> {
    let valid = !filename.is_empty()
        && filename.len() <= MAX_FILENAME_LEN
        && !filename.starts_with('.')
        && !filename.contains("..")
        && filename
            .chars()
            .all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(BlobStoreError::InvalidFilename(filename.to_string()))
    }
}

/// Get content type for a stored frame from its extension
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio_test::{assert_err, assert_ok};

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("liveview-blob-{}", Uuid::new_v4()))
    }

    async fn read_all(store: &FsBlobStore, filename: &str) -> Vec<u8> {
        let mut blob = store.open(filename).await.unwrap();
        let mut data = Vec::new();
        blob.reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(blob.size_bytes, data.len() as u64);
        data
    }

    #[tokio::test]
    async fn test_put_then_open_returns_exact_bytes() {
        let store = FsBlobStore::new(temp_root()).await.unwrap();
        let data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];

        assert_ok!(store.put("1000.jpg", &data).await);
        assert_eq!(read_all(&store, "1000.jpg").await, data);
    }

    #[tokio::test]
    async fn test_new_is_idempotent() {
        let root = temp_root();
        let first = FsBlobStore::new(&root).await.unwrap();
        first.put("1.jpg", b"one").await.unwrap();

        let second = FsBlobStore::new(&root).await.unwrap();
        assert_eq!(read_all(&second, "1.jpg").await, b"one");
    }

    #[tokio::test]
    async fn test_put_overwrites_same_name() {
        let store = FsBlobStore::new(temp_root()).await.unwrap();
        store.put("frame.jpg", b"first").await.unwrap();
        store.put("frame.jpg", b"second").await.unwrap();

        assert_eq!(read_all(&store, "frame.jpg").await, b"second");
    }

    #[tokio::test]
    async fn test_open_unknown_is_not_found() {
        let store = FsBlobStore::new(temp_root()).await.unwrap();
        let result = store.open("missing.jpg").await;
        assert!(matches!(result, Err(BlobStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_traversal_names_rejected() {
        let store = FsBlobStore::new(temp_root()).await.unwrap();

        for name in ["../secret", "..", "/etc/passwd", "a/b.jpg", "a\\b.jpg", ".hidden"] {
            assert!(matches!(
                store.open(name).await,
                Err(BlobStoreError::InvalidFilename(_))
            ));
            assert_err!(store.put(name, b"x").await);
        }
    }

    #[tokio::test]
    async fn test_stale_partials_are_swept() {
        let root = temp_root();
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join(".1000.jpg.abc.partial"), b"half").unwrap();
        std::fs::write(root.join("999.jpg"), b"whole").unwrap();

        let store = FsBlobStore::new(&root).await.unwrap();

        assert!(!root.join(".1000.jpg.abc.partial").exists());
        let blobs = store.list().await.unwrap();
        assert_eq!(
            blobs,
            vec![StoredBlob {
                filename: "999.jpg".to_string(),
                size_bytes: 5,
            }]
        );
    }

    #[tokio::test]
    async fn test_put_leaves_no_temporary_files() {
        let root = temp_root();
        let store = FsBlobStore::new(&root).await.unwrap();
        store.put("1.jpg", b"abc").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["1.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_is_ready_tracks_root() {
        let root = temp_root();
        let store = FsBlobStore::new(&root).await.unwrap();
        assert!(store.is_ready().await);

        // The writability check cleans up after itself
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);

        std::fs::remove_dir_all(&root).unwrap();
        assert!(!store.is_ready().await);
    }

    #[tokio::test]
    async fn test_directory_is_not_a_blob() {
        let root = temp_root();
        let store = FsBlobStore::new(&root).await.unwrap();
        std::fs::create_dir(root.join("nested")).unwrap();

        assert!(matches!(
            store.open("nested").await,
            Err(BlobStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_dir_on_store_root() {
        let root = temp_root();
        let store = FsBlobStore::new(&root).await.unwrap();
        store.put("1.jpg", b"abc").await.unwrap();

        assert_ok!(sync_dir(store.root()).await);
        assert_eq!(read_all(&store, "1.jpg").await, b"abc");
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("1700000000000.jpg").is_ok());
        assert!(validate_filename("image_20240115_103045.jpg").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("a..b").is_err());
        assert!(validate_filename("name with space.jpg").is_err());
        assert!(validate_filename("x\0.jpg").is_err());
        assert!(validate_filename(&"a".repeat(256)).is_err());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("1000.jpg"), "image/jpeg");
        assert_eq!(content_type_for("1000.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
