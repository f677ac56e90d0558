// Client-side output sink for received chunks

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::common::error::Result;

/// Appends received chunks to a local file in arrival order.
///
/// Every chunk is flushed as soon as it is written so a player can open the
/// file while the stream is still running. Nothing is rolled back if the
/// session ends early; the partial file stays on disk.
pub struct OutputSink {
    file: File,
    path: PathBuf,
    bytes_written: u64,
    chunks_written: u64,
    hasher: blake3::Hasher,
}

impl OutputSink {
    /// Create (or truncate) the output file, creating its directory if needed.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            bytes_written: 0,
            chunks_written: 0,
            hasher: blake3::Hasher::new(),
        })
    }

    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data)?;
        self.file.flush()?;
        self.hasher.update(data);
        self.bytes_written += data.len() as u64;
        self.chunks_written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    /// Sync and close the file, returning the hex BLAKE3 digest of its contents.
    pub fn finish(mut self) -> Result<String> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(hex::encode(self.hasher.finalize().as_bytes()))
    }
}
