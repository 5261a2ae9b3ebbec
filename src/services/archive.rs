use crate::services::storage::StagingArea;
use bytes::Bytes;
use futures::Stream;
use std::io::{self, Cursor};
use std::path::Path;
use thiserror::Error;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

/// Size of the chunks handed to the response body
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Deflate level 9, maximum compression
const COMPRESSION_LEVEL: i32 = 9;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to read staged output: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to write ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive task failed: {0}")]
    Task(String),
}

/// A finished ZIP held in memory, ready to be streamed as a response body.
#[derive(Debug)]
pub struct ConvertedArchive {
    bytes: Bytes,
    entries: Vec<String>,
}

impl ConvertedArchive {
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Archive size in bytes
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let bytes = self.bytes;
        let len = bytes.len();
        futures::stream::iter(
            (0..len)
                .step_by(STREAM_CHUNK_SIZE)
                .map(move |start| Ok(bytes.slice(start..(start + STREAM_CHUNK_SIZE).min(len)))),
        )
    }
}

/// ZIP every regular file directly inside the staging directory, flat, by file name.
pub async fn build_archive(staging: &StagingArea) -> Result<ConvertedArchive, ArchiveError> {
    let dir = staging.dir().to_path_buf();
    tokio::task::spawn_blocking(move || build_archive_blocking(&dir))
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

fn build_archive_blocking(dir: &Path) -> Result<ConvertedArchive, ArchiveError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => tracing::warn!("Skipping staged file with non UTF-8 name: {:?}", raw),
        }
    }
    names.sort();

    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL));

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for name in &names {
        writer.start_file(name.as_str(), options)?;
        let mut source = std::fs::File::open(dir.join(name))?;
        io::copy(&mut source, &mut writer)?;
    }
    let bytes = writer.finish()?.into_inner();

    tracing::debug!(
        "Built archive of {} entries ({} bytes) from {}",
        names.len(),
        bytes.len(),
        dir.display()
    );

    Ok(ConvertedArchive {
        bytes: Bytes::from(bytes),
        entries: names,
    })
}
