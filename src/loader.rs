//! Structure loading for binaries and archives.
//!
//! A load pass turns an [`ObjectImage`] into infos for the binary and every
//! element under it. Symbols with a known source file are grouped under one
//! `BinaryModule` per path; the rest hang directly off the binary. Read
//! failures never abort the pass: whatever could be read is kept and the
//! outcome is recorded as a [`LoadStatus`].

use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::element::{CElement, ElementKind};
use crate::info::{
    BinaryDetail, ElementInfo, InfoDetail, LoadStatus, SymbolInfo, create_element_info,
};
use crate::reader::{ObjectImage, ObjectReader, ReadError, SymbolKind};

/// Infos produced by one load pass.
#[derive(Debug, Default)]
pub struct LoadedStructure {
    pub root: ElementInfo,
    pub descendants: Vec<(CElement, ElementInfo)>,
}

impl LoadedStructure {
    /// Empty structure for a binary or archive that could not be read at all.
    pub fn failed(kind: ElementKind, reason: impl Into<String>) -> Self {
        let mut root = create_element_info(kind);
        root.set_structure_known(true);
        set_status(&mut root, LoadStatus::Failed(reason.into()));
        Self {
            root,
            descendants: Vec::new(),
        }
    }

    pub fn status(&self) -> Option<&LoadStatus> {
        self.root.load_status()
    }

    pub fn count(&self, kind: ElementKind) -> usize {
        self.descendants.iter().filter(|(e, _)| e.kind() == kind).count()
    }
}

pub fn load_binary(binary: &CElement, data: &[u8], reader: &dyn ObjectReader) -> LoadedStructure {
    let loaded = match reader.read_object(data) {
        Ok(image) => binary_structure(binary, image),
        Err(e) => LoadedStructure::failed(ElementKind::Binary, e.to_string()),
    };
    report(binary, &loaded);
    loaded
}

pub fn load_archive(archive: &CElement, data: &[u8], reader: &dyn ObjectReader) -> LoadedStructure {
    let loaded = match reader.read_archive(data) {
        Ok(members) => archive_structure(
            archive,
            members.into_iter().map(|m| (m.name, m.image)).collect(),
        ),
        Err(e) => LoadedStructure::failed(ElementKind::Archive, e.to_string()),
    };
    report(archive, &loaded);
    loaded
}

fn report(element: &CElement, loaded: &LoadedStructure) {
    match loaded.status() {
        Some(LoadStatus::Partial(issues)) => {
            warn!(element = ?element, issues = ?issues, "partial structure load")
        }
        Some(LoadStatus::Failed(reason)) => {
            warn!(element = ?element, %reason, "structure load failed")
        }
        _ => debug!(
            element = ?element,
            descendants = loaded.descendants.len(),
            "structure loaded"
        ),
    }
}

fn binary_structure(binary: &CElement, image: ObjectImage) -> LoadedStructure {
    let mut root = create_element_info(ElementKind::Binary);
    let mut descendants = Vec::new();
    let mut modules: HashMap<String, (CElement, ElementInfo)> = HashMap::new();
    let mut module_order: Vec<String> = Vec::new();
    let mut occurrences: HashMap<(CElement, String, ElementKind), u32> = HashMap::new();

    for symbol in image.symbols {
        let kind = match symbol.kind {
            SymbolKind::Function => ElementKind::Function,
            SymbolKind::Variable => ElementKind::Variable,
        };

        let parent = match &symbol.source_file {
            Some(path) => {
                let (module, _) = modules.entry(path.clone()).or_insert_with(|| {
                    let module = binary.child(path.clone(), ElementKind::BinaryModule);
                    let mut info = ElementInfo::new();
                    info.detail = InfoDetail::Module {
                        source_file: PathBuf::from(path),
                    };
                    info.set_structure_known(true);
                    root.push_child(module.clone());
                    module_order.push(path.clone());
                    (module, info)
                });
                module.clone()
            }
            None => binary.clone(),
        };

        let count = occurrences
            .entry((parent.clone(), symbol.name.clone(), kind))
            .or_insert(0);
        *count += 1;
        let element = parent.child_occurrence(symbol.name, kind, *count);

        let mut info = ElementInfo::new();
        info.detail = InfoDetail::Symbol(SymbolInfo {
            address: symbol.address,
            size: symbol.size,
            local: symbol.local,
        });
        info.set_structure_known(true);

        if parent == *binary {
            root.push_child(element.clone());
        } else if let Some(path) = &symbol.source_file
            && let Some((_, module_info)) = modules.get_mut(path)
        {
            module_info.push_child(element.clone());
        }
        descendants.push((element, info));
    }

    for path in module_order {
        if let Some(entry) = modules.remove(&path) {
            descendants.push(entry);
        }
    }

    let status = if image.issues.is_empty() {
        LoadStatus::Complete
    } else {
        LoadStatus::Partial(image.issues)
    };
    root.detail = InfoDetail::Binary(Box::new(BinaryDetail {
        attributes: image.attributes,
        segments: image.segments,
        needed: image.needed,
        soname: image.soname,
        status,
    }));
    root.set_structure_known(true);

    LoadedStructure { root, descendants }
}

fn archive_structure(
    archive: &CElement,
    members: Vec<(String, Result<ObjectImage, ReadError>)>,
) -> LoadedStructure {
    let mut root = create_element_info(ElementKind::Archive);
    let mut descendants = Vec::new();
    let mut issues = Vec::new();
    let mut occurrences: HashMap<String, u32> = HashMap::new();

    for (name, image) in members {
        let count = occurrences.entry(name.clone()).or_insert(0);
        *count += 1;
        let member = archive.child_occurrence(name.clone(), ElementKind::Binary, *count);

        let loaded = match image {
            Ok(image) => binary_structure(&member, image),
            Err(e) => {
                issues.push(format!("{name}: {e}"));
                LoadedStructure::failed(ElementKind::Binary, e.to_string())
            }
        };
        if let Some(LoadStatus::Partial(member_issues)) = loaded.status() {
            issues.extend(member_issues.iter().map(|i| format!("{name}: {i}")));
        }

        root.push_child(member.clone());
        descendants.push((member, loaded.root));
        descendants.extend(loaded.descendants);
    }

    set_status(
        &mut root,
        if issues.is_empty() {
            LoadStatus::Complete
        } else {
            LoadStatus::Partial(issues)
        },
    );
    root.set_structure_known(true);

    LoadedStructure { root, descendants }
}

fn set_status(info: &mut ElementInfo, status: LoadStatus) {
    match &mut info.detail {
        InfoDetail::Binary(detail) => detail.status = status,
        InfoDetail::Archive { status: current } => *current = status,
        other => {
            *other = InfoDetail::Binary(Box::new(BinaryDetail {
                attributes: Default::default(),
                segments: Default::default(),
                needed: Vec::new(),
                soname: None,
                status,
            }))
        }
    }
}
