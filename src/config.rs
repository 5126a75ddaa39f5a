use anyhow::{Context, Result};
use std::env;
use std::io;
use std::path::{Path, PathBuf};

use crate::cache::{DEFAULT_OPENABLE_OVERFLOW, DEFAULT_OPENABLE_SIZE};
use crate::cli::Cli;

pub const DB_ENV: &str = "CMODEL_DB";
pub const CACHE_CAPACITY_ENV: &str = "CMODEL_CACHE_CAPACITY";
pub const CACHE_OVERFLOW_ENV: &str = "CMODEL_CACHE_OVERFLOW";
pub const LOG_ENV: &str = "CMODEL_LOG";

/// Sizing of the element cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfig {
    pub openable_capacity: usize,
    pub openable_overflow: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            openable_capacity: DEFAULT_OPENABLE_SIZE,
            openable_overflow: DEFAULT_OPENABLE_OVERFLOW,
        }
    }
}

pub fn resolve_model_config(cli: &Cli) -> Result<ModelConfig> {
    let defaults = ModelConfig::default();
    Ok(ModelConfig {
        openable_capacity: resolve_size(
            cli.cache_capacity,
            CACHE_CAPACITY_ENV,
            defaults.openable_capacity,
        )?
        .max(1),
        openable_overflow: resolve_size(
            cli.cache_overflow,
            CACHE_OVERFLOW_ENV,
            defaults.openable_overflow,
        )?,
    })
}

fn resolve_size(flag: Option<usize>, var: &str, default: usize) -> Result<usize> {
    if let Some(v) = flag {
        return Ok(v);
    }
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .with_context(|| format!("{var} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

pub fn resolve_db_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.db.clone() {
        return Ok(p);
    }

    if let Ok(p) = env::var(DB_ENV) {
        return Ok(PathBuf::from(p));
    }

    Ok(cmodel_home()?.join("index.lmdb"))
}

/// Deletes the index and its LMDB lock file. Returns the files that were
/// actually there.
pub fn clear_db(db_path: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in [db_path.to_path_buf(), lmdb_lock_path(db_path)] {
        match std::fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to remove index file: {}", path.display()));
            }
        }
    }
    Ok(removed)
}

fn cmodel_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("cmodel"))
}

fn lmdb_lock_path(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push("-lock");
    PathBuf::from(os)
}
