// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::errors::Result;

pub mod mock;

/// Abstract filesystem interface.
///
/// The driver only ever touches files through this trait, so tests can run
/// entirely against [`mock::MockFileSystem`].
pub trait FileSystem: Send + Sync + Debug {
    fn is_dir(&self, path: &Path) -> bool;
    fn exists(&self, path: &Path) -> bool;

    /// Return the entries of a directory as full paths, in listing order.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct DiskFileSystem;

impl FileSystem for DiskFileSystem {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry.with_context(|| format!("reading dir entry in {:?}", path))?;
            entries.push(entry.path());
        }
        Ok(entries)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))?;
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))?)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
        fs::write(path, contents).with_context(|| format!("writing file {:?}", path))?;
        Ok(())
    }
}

/// A cheaply clonable handle to a path in either the source tree or the
/// tmp tree.
///
/// Handles are created by the scanner and by `BuildContext::{new_output,
/// provide}`; as far as the driver is concerned two handles are equal iff
/// they name the same path.
#[derive(Clone, Debug)]
pub struct FileHandle {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl FileHandle {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self { fs, path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn is_directory(&self) -> bool {
        self.fs.is_dir(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.fs.exists(&self.path)
    }

    /// Children of this directory, in listing order.
    pub fn list(&self) -> Result<Vec<FileHandle>> {
        let entries = self.fs.read_dir(&self.path)?;
        Ok(entries
            .into_iter()
            .map(|p| FileHandle::new(Arc::clone(&self.fs), p))
            .collect())
    }

    /// A handle to `self/name` on the same filesystem.
    pub fn relative(&self, name: &str) -> FileHandle {
        FileHandle::new(Arc::clone(&self.fs), self.path.join(name))
    }

    pub fn parent(&self) -> Option<FileHandle> {
        self.path
            .parent()
            .map(|p| FileHandle::new(Arc::clone(&self.fs), p.to_path_buf()))
    }

    pub fn create_directory(&self) -> Result<()> {
        self.fs.create_dir_all(&self.path)
    }

    /// Final path component, as shown to factories matching on filenames.
    pub fn basename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Human-readable name used for dashboard tasks.
    pub fn display_name(&self) -> String {
        self.path.display().to_string()
    }

    pub fn read_to_string(&self) -> Result<String> {
        self.fs.read_to_string(&self.path)
    }

    pub fn write(&self, contents: &[u8]) -> Result<()> {
        self.fs.write(&self.path, contents)
    }
}

impl PartialEq for FileHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileHandle {}
