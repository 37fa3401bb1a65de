//! File system abstraction for testability.
//!
//! The validator only needs to know whether a cached file is present, and the
//! configuration layer needs to read and write one JSON file. Both go through
//! the `FileSystem` trait so tests can swap in a mock.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Error, FileSystemError, Result};

fn read_error(path: &Path, e: io::Error) -> Error {
    Error::FileSystem(FileSystemError::ReadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_error(path: &Path, e: io::Error) -> Error {
    Error::FileSystem(FileSystemError::WriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn create_dir_error(path: &Path, e: io::Error) -> Error {
    Error::FileSystem(FileSystemError::CreateDirFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Abstraction over the file system operations used by this crate.
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem: Send + Sync {
    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Read a file's contents as a string.
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Write string contents to a file, creating it if it doesn't exist.
    fn write(&self, path: &Path, contents: &str) -> Result<()>;

    /// Create a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> Result<()>;
}

/// `FileSystem` backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| read_error(path, e))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        fs::write(path, contents).map_err(|e| write_error(path, e))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| create_dir_error(path, e))
    }
}
