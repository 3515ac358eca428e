//! Disk test file and positional I/O
//!
//! Workers share one open [`File`] and address it only by offset, so no
//! worker ever moves a shared cursor.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::TEMP_FILE_PREFIX;

/// Temporary benchmark file with automatic cleanup
pub struct TempFile {
    path: PathBuf,
    file: File,
    cleanup_on_drop: bool,
}

impl TempFile {
    /// Create (or truncate) a test file of `len` bytes in `target_dir`
    pub fn create(target_dir: &Path, tag: &str, len: u64) -> io::Result<Self> {
        let name = format!("{}{}_{}.dat", TEMP_FILE_PREFIX, tag, std::process::id());
        let path = target_dir.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(len)?;
        debug!(path = %path.display(), bytes = len, "Created test file");
        Ok(Self {
            path,
            file,
            cleanup_on_drop: true,
        })
    }

    /// Disable automatic cleanup (for debugging)
    pub fn keep_on_drop(&mut self) {
        self.cleanup_on_drop = false;
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.cleanup_on_drop {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove test file");
            }
        }
    }
}

/// Write all of `buf` at `offset`
#[cfg(unix)]
pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

/// Fill all of `buf` from `offset`
#[cfg(unix)]
pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
pub fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer")),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
pub fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "failed to fill whole buffer")),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_temp_file_creation() {
        let temp_dir = tempdir().unwrap();
        let temp_file = TempFile::create(temp_dir.path(), "seq", 1024).unwrap();
        assert!(temp_file.path().exists());
        assert_eq!(temp_file.file().metadata().unwrap().len(), 1024);

        // File should be cleaned up when dropped
        let path = temp_file.path().to_owned();
        drop(temp_file);
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_file_keep_on_drop() {
        let temp_dir = tempdir().unwrap();
        let mut temp_file = TempFile::create(temp_dir.path(), "keep", 16).unwrap();
        temp_file.keep_on_drop();

        let path = temp_file.path().to_owned();
        drop(temp_file);
        assert!(path.exists());

        // Clean up manually
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_positional_round_trip() {
        let temp_dir = tempdir().unwrap();
        let temp_file = TempFile::create(temp_dir.path(), "pos", 4096).unwrap();
        write_all_at(temp_file.file(), b"corebench", 1000).unwrap();

        let mut buf = [0u8; 9];
        read_exact_at(temp_file.file(), &mut buf, 1000).unwrap();
        assert_eq!(&buf, b"corebench");

        let mut past_end = [0u8; 16];
        assert!(read_exact_at(temp_file.file(), &mut past_end, 4090).is_err());
    }
}
