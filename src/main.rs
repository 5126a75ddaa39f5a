use anyhow::{Context, Result};
use clap::Parser;
use cmodel::cli::{Cli, Commands, OutputFormat};
use cmodel::config::{LOG_ENV, clear_db, resolve_db_path, resolve_model_config};
use cmodel::element::{CElement, ElementKind};
use cmodel::index::{BinaryIndex, BinarySummary, summarize};
use cmodel::info::{InfoDetail, LoadStatus};
use cmodel::manager::ModelManager;
use cmodel::reader::{BinaryKind, ElfReader};
use cmodel::store::FsStore;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.clone() {
        Commands::Clear => {
            let db_path = resolve_db_path(&cli)?;
            let removed = clear_db(&db_path)?;
            let out = serde_json::json!({
                "db_path": db_path.to_string_lossy(),
                "removed": removed.len(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Stats => {
            let index = BinaryIndex::open(resolve_db_path(&cli)?)?;
            let stats = index.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Tree {
            project,
            depth,
            format,
        } => {
            let model = open_model(&cli)?;
            let root = canonical(&project)?;
            let project = model.add_project(&root)?;
            let tree = build_tree(&model, &project, depth)?;
            write_tree(&tree, format);
            model.shutdown();
        }
        Commands::Binary { file, format } => {
            let model = open_model(&cli)?;
            let file = canonical(&file)?;
            let folder = file
                .parent()
                .with_context(|| format!("No parent directory: {}", file.display()))?;
            model.add_project(folder)?;
            let element = model
                .create(&file)
                .filter(|e| matches!(e.kind(), ElementKind::Binary | ElementKind::Archive))
                .with_context(|| format!("Not a binary or archive: {}", file.display()))?;
            let tree = build_tree(&model, &element, usize::MAX)?;
            write_tree(&tree, format);
            model.shutdown();
        }
        Commands::Scan { project } => {
            let model = open_model(&cli)?;
            let index = BinaryIndex::open(resolve_db_path(&cli)?)?;
            let result = scan_project(&model, &index, &canonical(&project)?)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            model.shutdown();
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn open_model(cli: &Cli) -> Result<ModelManager> {
    let config = resolve_model_config(cli)?;
    Ok(ModelManager::new(
        config,
        Arc::new(FsStore::new()),
        Arc::new(ElfReader::new()),
    ))
}

fn canonical(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("Path not found: {}", path.display()))
}

#[derive(Debug, Serialize)]
struct TreeNode {
    kind: ElementKind,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<NodeDetail>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<TreeNode>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum NodeDetail {
    Binary {
        cpu: String,
        binary_kind: BinaryKind,
        needed: Vec<String>,
        soname: Option<String>,
        load: LoadStatus,
    },
    Archive {
        load: LoadStatus,
    },
    Module {
        source_file: String,
    },
    Symbol {
        address: String,
        size: u64,
        local: bool,
    },
}

fn build_tree(model: &ModelManager, element: &CElement, depth: usize) -> Result<TreeNode> {
    let info = model.element_info(element)?;
    let detail = match &info.read().detail {
        InfoDetail::Binary(detail) => Some(NodeDetail::Binary {
            cpu: detail.attributes.cpu.clone(),
            binary_kind: detail.attributes.kind,
            needed: detail.needed.clone(),
            soname: detail.soname.clone(),
            load: detail.status.clone(),
        }),
        InfoDetail::Archive { status } => Some(NodeDetail::Archive {
            load: status.clone(),
        }),
        InfoDetail::Module { source_file } => Some(NodeDetail::Module {
            source_file: source_file.to_string_lossy().to_string(),
        }),
        InfoDetail::Symbol(symbol) => Some(NodeDetail::Symbol {
            address: format!("{:#x}", symbol.address),
            size: symbol.size,
            local: symbol.local,
        }),
        InfoDetail::None | InfoDetail::Container { .. } => None,
    };

    let mut children = Vec::new();
    if depth > 0 && element.kind() != ElementKind::TranslationUnit {
        for child in model.children(element)? {
            children.push(build_tree(model, &child, depth - 1)?);
        }
    }

    Ok(TreeNode {
        kind: element.kind(),
        name: element.element_name(),
        detail,
        children,
    })
}

fn write_tree(tree: &TreeNode, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(tree) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "failed to serialize tree"),
        },
        OutputFormat::Text => {
            let mut out = String::new();
            render_text(tree, 0, &mut out);
            print!("{out}");
        }
    }
}

fn render_text(node: &TreeNode, level: usize, out: &mut String) {
    out.push_str(&"  ".repeat(level));
    out.push_str(&format!("{} {}", node.kind, node.name));
    match &node.detail {
        Some(NodeDetail::Binary { cpu, load, .. }) => {
            out.push_str(&format!(" [{cpu}]"));
            if !load.is_complete() {
                out.push_str(" (incomplete)");
            }
        }
        Some(NodeDetail::Symbol { address, .. }) => out.push_str(&format!(" @{address}")),
        _ => {}
    }
    out.push('\n');
    for child in &node.children {
        render_text(child, level + 1, out);
    }
}

#[derive(Debug, Serialize)]
struct ScanResult {
    root: String,
    binaries: usize,
    archives: usize,
    skipped: usize,
    changed: usize,
    indexed: usize,
    failed: usize,
    duration_ms: u64,
}

fn scan_project(model: &ModelManager, index: &BinaryIndex, root: &Path) -> Result<ScanResult> {
    let start = Instant::now();
    let project = model.add_project(root)?;
    let report = model.start_runner(&project)?.wait();
    if let Some(error) = report.error {
        anyhow::bail!("Binary scan of {} failed: {error}", root.display());
    }

    let mut found = model.binaries(&project, false)?;
    found.extend(model.archives(&project, false)?);

    let mut entries = Vec::with_capacity(found.len());
    for element in &found {
        let Some(path) = element.resource_path() else {
            continue;
        };
        let stamp = model
            .store()
            .stamp(&path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .map(|s| s.as_u64())
            .unwrap_or(0);
        entries.push((path.to_string_lossy().to_string(), stamp));
    }
    let changed: HashSet<String> = index.scan_changes(&entries)?.into_iter().collect();

    let targets: Vec<&CElement> = found
        .iter()
        .filter(|e| {
            e.resource_path()
                .is_some_and(|p| changed.contains(&*p.to_string_lossy()))
        })
        .collect();
    let results: Vec<(&CElement, Result<BinarySummary>)> = targets
        .par_iter()
        .map(|e| (*e, summarize(model, e)))
        .collect();

    let mut summaries = Vec::with_capacity(results.len());
    let mut failed = 0usize;
    for (element, result) in results {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                warn!(element = ?element, error = %e, "failed to summarize binary");
                failed += 1;
                if let Some(path) = element.resource_path() {
                    index.invalidate(&path.to_string_lossy())?;
                }
            }
        }
    }
    let indexed = index.put_summaries(&summaries)?;

    Ok(ScanResult {
        root: root.to_string_lossy().to_string(),
        binaries: report.binaries,
        archives: report.archives,
        skipped: report.skipped,
        changed: changed.len(),
        indexed,
        failed,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_tree_indents_children_and_marks_incomplete_binaries() {
        let tree = TreeNode {
            kind: ElementKind::Binary,
            name: "app".to_string(),
            detail: Some(NodeDetail::Binary {
                cpu: "x86_64".to_string(),
                binary_kind: BinaryKind::Executable,
                needed: Vec::new(),
                soname: None,
                load: LoadStatus::Partial(vec!["dynamic".to_string()]),
            }),
            children: vec![TreeNode {
                kind: ElementKind::Function,
                name: "main".to_string(),
                detail: Some(NodeDetail::Symbol {
                    address: "0x1000".to_string(),
                    size: 16,
                    local: false,
                }),
                children: Vec::new(),
            }],
        };
        let mut out = String::new();
        render_text(&tree, 0, &mut out);
        assert_eq!(out, "binary app [x86_64] (incomplete)\n  function main @0x1000\n");
    }
}
