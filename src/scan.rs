use anyhow::Result;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use crate::reader::{BinaryFormat, ObjectReader};
use crate::store::ResourceStore;

/// Extensions treated as C/C++ translation units (sources and headers).
pub const TRANSLATION_UNIT_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "cxx", "c++", "h", "hh", "hpp", "hxx", "h++", "inl", "ipp",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundBinary {
    pub path: PathBuf,
    pub format: BinaryFormat,
}

pub fn is_translation_unit(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            TRANSLATION_UNIT_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(e))
        })
}

pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
}

/// Walks `base_path` and returns every file the reader recognizes as a
/// binary or archive, sorted by path. Returns early, with whatever was found
/// so far, once `cancel` is set.
pub fn scan_binaries(
    base_path: &Path,
    store: &dyn ResourceStore,
    reader: &dyn ObjectReader,
    cancel: &AtomicBool,
) -> Result<Vec<FoundBinary>> {
    if !store.is_dir(base_path) {
        anyhow::bail!("Not a directory: {}", base_path.display());
    }

    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base_path)
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if cancel.load(Ordering::Relaxed) {
                return ignore::WalkState::Quit;
            }
            let Ok(entry) = entry else {
                return ignore::WalkState::Continue;
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                return ignore::WalkState::Continue;
            }
            let path = entry.path();
            if is_translation_unit(path) {
                return ignore::WalkState::Continue;
            }
            if let Ok(bytes) = store.read(path)
                && let Some(format) = reader.sniff(&bytes)
            {
                let _ = tx.send(FoundBinary {
                    path: path.to_path_buf(),
                    format,
                });
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut found: Vec<FoundBinary> = rx.iter().collect();
    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{ArchiveMember, ObjectImage, ReadError};
    use crate::store::FsStore;
    use std::fs;

    fn temp_dir(prefix: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "{prefix}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        p
    }

    /// Recognizes files starting with `BIN` or `ARC`.
    struct PrefixReader;

    impl ObjectReader for PrefixReader {
        fn sniff(&self, data: &[u8]) -> Option<BinaryFormat> {
            if data.starts_with(b"BIN") {
                Some(BinaryFormat::Object)
            } else if data.starts_with(b"ARC") {
                Some(BinaryFormat::Archive)
            } else {
                None
            }
        }

        fn read_object(&self, _data: &[u8]) -> Result<ObjectImage, ReadError> {
            Err(ReadError::UnknownFormat)
        }

        fn read_archive(&self, _data: &[u8]) -> Result<Vec<ArchiveMember>, ReadError> {
            Err(ReadError::UnknownFormat)
        }
    }

    #[test]
    fn translation_unit_extensions() {
        assert!(is_translation_unit(Path::new("src/main.c")));
        assert!(is_translation_unit(Path::new("include/Vec.HPP")));
        assert!(!is_translation_unit(Path::new("Makefile")));
        assert!(!is_translation_unit(Path::new("lib.a")));
    }

    #[test]
    fn scan_finds_binaries_in_nested_folders() -> Result<()> {
        let base = temp_dir("cmodel-scan");
        fs::create_dir_all(base.join("build/obj"))?;
        fs::create_dir_all(base.join(".hidden"))?;
        fs::write(base.join("build/app"), b"BIN...")?;
        fs::write(base.join("build/obj/libx.a"), b"ARC...")?;
        // Source files are never sniffed, even with a binary-looking header.
        fs::write(base.join("build/fake.c"), b"BIN...")?;
        fs::write(base.join(".hidden/ghost"), b"BIN...")?;
        fs::write(base.join("README"), b"hello")?;

        let cancel = AtomicBool::new(false);
        let found = scan_binaries(&base, &FsStore::new(), &PrefixReader, &cancel)?;
        assert_eq!(
            found,
            vec![
                FoundBinary {
                    path: base.join("build/app"),
                    format: BinaryFormat::Object,
                },
                FoundBinary {
                    path: base.join("build/obj/libx.a"),
                    format: BinaryFormat::Archive,
                },
            ]
        );

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn cancelled_scan_finds_nothing() -> Result<()> {
        let base = temp_dir("cmodel-scan-cancel");
        fs::create_dir_all(&base)?;
        fs::write(base.join("app"), b"BIN...")?;

        let cancel = AtomicBool::new(true);
        let found = scan_binaries(&base, &FsStore::new(), &PrefixReader, &cancel)?;
        assert!(found.is_empty());

        let _ = fs::remove_dir_all(base);
        Ok(())
    }
}
