//! Access to the resources backing the model.
//!
//! The model never touches the filesystem directly; it goes through a
//! [`ResourceStore`], which only has to read bytes, report modification
//! stamps and list directories (plus the few writes used by copy, move and
//! delete operations).

use memmap2::Mmap;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Coarse modification stamp (nanoseconds since the Unix epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Stamp(pub u128);

impl Stamp {
    pub fn from_system_time(time: SystemTime) -> Self {
        Stamp(
            time.duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos(),
        )
    }

    /// Saturating conversion used when persisting stamps.
    pub fn as_u64(&self) -> u64 {
        u64::try_from(self.0).unwrap_or(u64::MAX)
    }
}

/// Contents of a resource.
pub enum FileBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Mapped(mmap) => &mmap[..],
            FileBytes::Owned(bytes) => bytes.as_slice(),
        }
    }
}

impl std::fmt::Debug for FileBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBytes").field("len", &self.len()).finish()
    }
}

pub trait ResourceStore: Send + Sync {
    fn read(&self, path: &Path) -> io::Result<FileBytes>;

    /// Modification stamp of a file or directory, `None` if it is missing.
    fn stamp(&self, path: &Path) -> io::Result<Option<Stamp>>;

    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Entries of a directory, sorted by path.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    fn is_read_only(&self, path: &Path) -> io::Result<bool>;

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// Local filesystem store.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

impl FsStore {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceStore for FsStore {
    fn read(&self, path: &Path) -> io::Result<FileBytes> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(FileBytes::Owned(Vec::new()));
        }
        // SAFETY: The file is opened read-only. Concurrent truncation by another
        // process is a host-level hazard shared with every mmap reader.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(FileBytes::Mapped(mmap))
    }

    fn stamp(&self, path: &Path) -> io::Result<Option<Stamp>> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(Stamp::from_system_time(meta.modified()?))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn is_read_only(&self, path: &Path) -> io::Result<bool> {
        Ok(std::fs::metadata(path)?.permissions().readonly())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::copy(from, to).map(|_| ())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}
