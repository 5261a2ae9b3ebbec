use crate::utils::validation::{sanitize_filename, truncate_utf8};
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

/// Longest original-name suffix kept in an on-disk upload name
const MAX_UPLOAD_NAME_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to {action} '{}': {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Millisecond timestamps that never repeat within the process.
#[derive(Debug, Default)]
struct MonotonicClock {
    last: AtomicU64,
}

impl MonotonicClock {
    fn next(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(prev + 1)
    }
}

/// An uploaded source file on local disk.
///
/// The file is removed by [`UploadedFile::release`], or on drop if it was never
/// released, so no error path can leave it behind.
#[derive(Debug)]
pub struct UploadedFile {
    path: PathBuf,
    original_name: String,
    size: u64,
    released: bool,
}

impl UploadedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Delete the file from disk. Failures are logged, never returned.
    pub async fn release(mut self) {
        self.released = true;
        remove_file_quietly(&self.path).await;
    }
}

impl Drop for UploadedFile {
    fn drop(&mut self) {
        if !self.released {
            remove_file_blocking(&self.path);
        }
    }
}

/// A converted file written into a staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    pub file_name: String,
    pub size: u64,
}

/// Request scoped output directory.
///
/// Removed by [`StagingArea::discard`] or, failing that, on drop.
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    request_id: String,
    entries: Vec<StagedEntry>,
    released: bool,
}

impl StagingArea {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn entries(&self) -> &[StagedEntry] {
        &self.entries
    }

    /// Pick `<base>.<format>`, or `<base>-N.<format>` if that name is taken.
    fn unique_name(&self, base_name: &str, format: &str) -> String {
        let taken = |name: &str| self.entries.iter().any(|e| e.file_name == name);
        let mut candidate = format!("{}.{}", base_name, format);
        let mut n = 1;
        while taken(&candidate) {
            candidate = format!("{}-{}.{}", base_name, n, format);
            n += 1;
        }
        candidate
    }

    /// Remove the directory and everything in it. Failures are logged, never returned.
    pub async fn discard(mut self) {
        self.released = true;
        remove_dir_quietly(&self.dir).await;
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if !self.released {
            remove_dir_blocking(&self.dir);
        }
    }
}

/// Owns the two scratch roots: incoming uploads and per-request output staging.
#[derive(Debug)]
pub struct TransientStorage {
    uploads_root: PathBuf,
    output_root: PathBuf,
    clock: MonotonicClock,
}

impl TransientStorage {
    pub fn new(uploads_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            uploads_root: uploads_root.into(),
            output_root: output_root.into(),
            clock: MonotonicClock::default(),
        }
    }

    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Create both roots if they do not exist yet.
    pub async fn ensure_roots(&self) -> Result<(), StorageError> {
        for root in [&self.uploads_root, &self.output_root] {
            fs::create_dir_all(root)
                .await
                .map_err(|e| StorageError::io("create directory", root, e))?;
        }
        Ok(())
    }

    /// Identifier for a new request, derived from its start time.
    pub fn new_request_id(&self) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{}", self.clock.next(), &suffix[..8])
    }

    /// Stream an upload to `<uploads_root>/<timestamp>-<name>`.
    pub async fn persist_upload<R>(
        &self,
        mut reader: R,
        original_name: &str,
    ) -> Result<UploadedFile, StorageError>
    where
        R: AsyncRead + Unpin,
    {
        let safe_name = sanitize_filename(original_name);
        let disk_name = format!(
            "{}-{}",
            self.clock.next(),
            truncate_utf8(&safe_name, MAX_UPLOAD_NAME_LEN)
        );
        let path = self.uploads_root.join(disk_name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::io("create upload", &path, e))?;

        // From here on the guard owns the path
        let mut uploaded = UploadedFile {
            path,
            original_name: original_name.to_string(),
            size: 0,
            released: false,
        };

        uploaded.size = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| StorageError::io("write upload", &uploaded.path, e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::io("flush upload", &uploaded.path, e))?;

        tracing::debug!(
            "Stored upload '{}' at {} ({} bytes)",
            uploaded.original_name,
            uploaded.path.display(),
            uploaded.size
        );

        Ok(uploaded)
    }

    pub async fn create_staging_area(&self, request_id: &str) -> Result<StagingArea, StorageError> {
        let dir = self.output_root.join(request_id);
        fs::create_dir(&dir)
            .await
            .map_err(|e| StorageError::io("create staging directory", &dir, e))?;

        Ok(StagingArea {
            dir,
            request_id: request_id.to_string(),
            entries: Vec::new(),
            released: false,
        })
    }

    /// Write converted bytes as `<base_name>.<format>` and return the stored name.
    pub async fn write_converted_file(
        &self,
        staging: &mut StagingArea,
        base_name: &str,
        format: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let file_name = staging.unique_name(base_name, format);
        let path = staging.dir.join(&file_name);

        fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::io("write converted file", &path, e))?;

        staging.entries.push(StagedEntry {
            file_name: file_name.clone(),
            size: bytes.len() as u64,
        });
        Ok(file_name)
    }

    pub async fn remove_file(&self, path: &Path) {
        remove_file_quietly(path).await;
    }

    pub async fn remove_directory(&self, path: &Path) {
        remove_dir_quietly(path).await;
    }

    /// Remove entries under both roots that were last modified more than `max_age` ago.
    ///
    /// Returns the number of entries removed.
    pub async fn sweep_stale(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;

        for root in [&self.uploads_root, &self.output_root] {
            let mut dir = match fs::read_dir(root).await {
                Ok(dir) => dir,
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", root.display(), e);
                    continue;
                }
            };

            while let Ok(Some(entry)) = dir.next_entry().await {
                let Ok(metadata) = entry.metadata().await else {
                    continue;
                };
                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|m| now.duration_since(m).ok())
                    .unwrap_or_default();
                if age < max_age {
                    continue;
                }

                let path = entry.path();
                tracing::info!("Sweeping stale scratch entry {}", path.display());
                if metadata.is_dir() {
                    remove_dir_quietly(&path).await;
                } else {
                    remove_file_quietly(&path).await;
                }
                removed += 1;
            }
        }

        removed
    }
}

async fn remove_file_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove file {}: {}", path.display(), e),
    }
}

async fn remove_dir_quietly(path: &Path) {
    match fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove directory {}: {}", path.display(), e),
    }
}

fn remove_file_blocking(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove file {}: {}", path.display(), e),
    }
}

fn remove_dir_blocking(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove directory {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (tempfile::TempDir, TransientStorage) {
        let tmp = tempfile::tempdir().unwrap();
        let storage = TransientStorage::new(tmp.path().join("uploads"), tmp.path().join("output"));
        storage.ensure_roots().await.unwrap();
        (tmp, storage)
    }

    fn count_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_monotonic_clock_never_repeats() {
        let clock = MonotonicClock::default();
        let mut last = 0;
        for _ in 0..1000 {
            let next = clock.next();
            assert!(next > last);
            last = next;
        }
    }

    #[tokio::test]
    async fn test_persist_and_release_upload() {
        let (_tmp, storage) = setup().await;

        let upload = storage
            .persist_upload(&b"hello world"[..], "notes.txt")
            .await
            .unwrap();
        assert_eq!(upload.size(), 11);
        assert_eq!(upload.original_name(), "notes.txt");
        assert!(upload.path().starts_with(storage.uploads_root()));
        assert!(upload.path().to_string_lossy().ends_with("-notes.txt"));
        assert_eq!(std::fs::read(upload.path()).unwrap(), b"hello world");

        let path = upload.path().to_path_buf();
        upload.release().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_same_name_uploads_do_not_collide() {
        let (_tmp, storage) = setup().await;

        let a = storage.persist_upload(&b"a"[..], "same.txt").await.unwrap();
        let b = storage.persist_upload(&b"b"[..], "same.txt").await.unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(count_entries(storage.uploads_root()), 2);
    }

    #[tokio::test]
    async fn test_dropped_upload_is_removed() {
        let (_tmp, storage) = setup().await;

        let upload = storage.persist_upload(&b"x"[..], "x.bin").await.unwrap();
        drop(upload);
        assert_eq!(count_entries(storage.uploads_root()), 0);
    }

    #[tokio::test]
    async fn test_staging_area_lifecycle() {
        let (_tmp, storage) = setup().await;
        let request_id = storage.new_request_id();

        let mut staging = storage.create_staging_area(&request_id).await.unwrap();
        let first = storage
            .write_converted_file(&mut staging, "report", "pdf", b"one")
            .await
            .unwrap();
        let second = storage
            .write_converted_file(&mut staging, "report", "pdf", b"two")
            .await
            .unwrap();

        assert_eq!(first, "report.pdf");
        assert_eq!(second, "report-1.pdf");
        assert_eq!(staging.entries().len(), 2);
        assert_eq!(count_entries(staging.dir()), 2);

        staging.discard().await;
        assert_eq!(count_entries(storage.output_root()), 0);
    }

    #[tokio::test]
    async fn test_dropped_staging_area_is_removed() {
        let (_tmp, storage) = setup().await;

        let mut staging = storage.create_staging_area("req-1").await.unwrap();
        storage
            .write_converted_file(&mut staging, "a", "png", b"png")
            .await
            .unwrap();
        drop(staging);
        assert_eq!(count_entries(storage.output_root()), 0);
    }

    #[tokio::test]
    async fn test_remove_missing_paths_is_quiet() {
        let (tmp, storage) = setup().await;
        storage.remove_file(&tmp.path().join("missing")).await;
        storage.remove_directory(&tmp.path().join("missing-dir")).await;
    }

    #[tokio::test]
    async fn test_sweep_stale() {
        let (_tmp, storage) = setup().await;

        let upload = storage.persist_upload(&b"old"[..], "old.txt").await.unwrap();
        let staging = storage.create_staging_area("old-request").await.unwrap();

        assert_eq!(storage.sweep_stale(Duration::from_secs(3600)).await, 0);
        assert_eq!(storage.sweep_stale(Duration::ZERO).await, 2);
        assert_eq!(count_entries(storage.uploads_root()), 0);
        assert_eq!(count_entries(storage.output_root()), 0);

        // Guards tolerate their paths already being gone
        upload.release().await;
        staging.discard().await;
    }
}
