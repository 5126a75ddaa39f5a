//! Persistent index of binary summaries.
//!
//! Uses LMDB (via heed). `binary_stamps` maps a binary's path to the
//! modification stamp it had when last summarized, so repeated scans only
//! re-read what changed; `binary_summaries` maps the path to a JSON
//! [`BinarySummary`].

use anyhow::{Context, Result};
use heed::types::Str;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::element::CElement;
use crate::info::LoadStatus;
use crate::manager::ModelManager;
use crate::reader::{BinaryFormat, BinaryKind};

pub const BINARY_STAMPS_DB: &str = "binary_stamps";
pub const BINARY_SUMMARIES_DB: &str = "binary_summaries";

const DEFAULT_MAP_SIZE: usize = 256 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 8;

type StrDb = Database<Str, Str>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinarySummary {
    pub path: String,
    pub format: BinaryFormat,
    /// Object kind; archives have none.
    pub kind: Option<BinaryKind>,
    pub cpu: Option<String>,
    pub members: usize,
    pub functions: usize,
    pub variables: usize,
    pub needed: Vec<String>,
    pub soname: Option<String>,
    pub content_hash: String,
    pub status: LoadStatus,
}

#[derive(Debug, Serialize)]
pub struct IndexStats {
    pub db_path: String,
    pub stamped_binaries: u64,
    pub summaries: u64,
    pub archives: u64,
    pub partial: u64,
    pub failed: u64,
}

#[derive(Debug)]
pub struct BinaryIndex {
    env: Arc<Env>,
    db_path: PathBuf,
    stamps: StrDb,
    summaries: StrDb,
}

impl BinaryIndex {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create index directory: {}", parent.display())
            })?;
        }

        let env = Arc::new(open_env(&db_path)?);

        let mut wtxn = env.write_txn()?;
        let stamps = env.create_database::<Str, Str>(&mut wtxn, Some(BINARY_STAMPS_DB))?;
        let summaries = env.create_database::<Str, Str>(&mut wtxn, Some(BINARY_SUMMARIES_DB))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db_path,
            stamps,
            summaries,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Records the given `(path, stamp)` pairs and returns the paths whose
    /// stamp differs from the recorded one (new paths included).
    pub fn scan_changes(&self, entries: &[(String, u64)]) -> Result<Vec<String>> {
        let mut changed = Vec::new();
        let mut wtxn = self.env.write_txn()?;
        for (path, stamp) in entries {
            let old = self
                .stamps
                .get(&wtxn, path.as_str())?
                .and_then(|v| v.parse::<u64>().ok());
            if old != Some(*stamp) {
                changed.push(path.clone());
            }
            let value = stamp.to_string();
            self.stamps.put(&mut wtxn, path.as_str(), value.as_str())?;
        }
        wtxn.commit()?;
        Ok(changed)
    }

    /// Forgets the stamp of `path` so the next scan summarizes it again.
    pub fn invalidate(&self, path: &str) -> Result<bool> {
        let mut wtxn = self.env.write_txn()?;
        let removed = self.stamps.delete(&mut wtxn, path)?;
        wtxn.commit()?;
        Ok(removed)
    }

    pub fn put_summaries(&self, summaries: &[BinarySummary]) -> Result<usize> {
        if summaries.is_empty() {
            return Ok(0);
        }

        let mut wtxn = self.env.write_txn()?;
        for summary in summaries {
            let value = serde_json::to_string(summary)?;
            self.summaries
                .put(&mut wtxn, summary.path.as_str(), value.as_str())?;
        }
        wtxn.commit()?;
        Ok(summaries.len())
    }

    pub fn get_summary(&self, path: &str) -> Result<Option<BinarySummary>> {
        let rtxn = self.env.read_txn()?;
        match self.summaries.get(&rtxn, path)? {
            Some(raw) => Ok(Some(serde_json::from_str(raw).with_context(|| {
                format!("Corrupt summary for {path}")
            })?)),
            None => Ok(None),
        }
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let rtxn = self.env.read_txn()?;

        let stamped_binaries = table_len(&self.stamps, &rtxn)?;
        let mut summaries = 0u64;
        let mut archives = 0u64;
        let mut partial = 0u64;
        let mut failed = 0u64;
        for item in self.summaries.iter(&rtxn)? {
            let (_, v) = item?;
            summaries += 1;
            let Ok(summary) = serde_json::from_str::<BinarySummary>(v) else {
                continue;
            };
            if summary.format == BinaryFormat::Archive {
                archives += 1;
            }
            match summary.status {
                LoadStatus::Partial(_) => partial += 1,
                LoadStatus::Failed(_) => failed += 1,
                LoadStatus::Complete => {}
            }
        }

        Ok(IndexStats {
            db_path: self.db_path.to_string_lossy().to_string(),
            stamped_binaries,
            summaries,
            archives,
            partial,
            failed,
        })
    }
}

/// Builds the summary of a binary or archive from its model structure.
pub fn summarize(model: &ModelManager, element: &CElement) -> Result<BinarySummary> {
    let path = element
        .resource_path()
        .with_context(|| format!("{element} has no backing file"))?;
    let bytes = model
        .store()
        .read(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let content_hash = hex::encode(Sha256::digest(&bytes[..]));
    let path = path.to_string_lossy().to_string();

    if let Some(archive) = element.as_archive() {
        let members = archive.members(model)?;
        let mut functions = 0;
        let mut variables = 0;
        let mut cpu = None;
        for member in &members {
            functions += member.functions(model)?.len();
            variables += member.variables(model)?.len();
            if cpu.is_none()
                && let Ok(detail) = member.detail(model)
                && !matches!(detail.status, LoadStatus::Failed(_))
            {
                cpu = Some(detail.attributes.cpu);
            }
        }
        return Ok(BinarySummary {
            path,
            format: BinaryFormat::Archive,
            kind: None,
            cpu,
            members: members.len(),
            functions,
            variables,
            needed: Vec::new(),
            soname: None,
            content_hash,
            status: archive.load_status(model)?,
        });
    }

    let binary = element
        .as_binary()
        .with_context(|| format!("{element} is not a binary"))?;
    let detail = binary.detail(model)?;
    Ok(BinarySummary {
        path,
        format: BinaryFormat::Object,
        kind: Some(detail.attributes.kind),
        cpu: Some(detail.attributes.cpu),
        members: 0,
        functions: binary.functions(model)?.len(),
        variables: binary.variables(model)?.len(),
        needed: detail.needed,
        soname: detail.soname,
        content_hash,
        status: detail.status,
    })
}

fn open_env(db_path: &Path) -> Result<Env> {
    let mut options = EnvOpenOptions::new();
    options.map_size(DEFAULT_MAP_SIZE);
    options.max_dbs(DEFAULT_MAX_DBS);
    // SAFETY: LMDB locking stays enabled. NO_SUB_DIR keeps --db a single
    // file path.
    unsafe {
        options.flags(EnvFlags::NO_SUB_DIR);
        options
            .open(db_path)
            .with_context(|| format!("Failed to create/open index env: {}", db_path.display()))
    }
}

fn table_len(db: &StrDb, rtxn: &RoTxn<'_>) -> Result<u64> {
    let mut count = 0u64;
    for item in db.iter(rtxn)? {
        let _ = item?;
        count += 1;
    }
    Ok(count)
}
