//! Element handles.
//!
//! A [`CElement`] only identifies a position in the model tree. It owns no
//! mutable state: children, stamps and attributes live in the element's
//! [`ElementInfo`](crate::info::ElementInfo), fetched from the element cache.
//! Building the same handle twice yields two equal values that resolve to
//! the same cached info.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Model,
    Project,
    Folder,
    TranslationUnit,
    Binary,
    Archive,
    BinaryContainer,
    ArchiveContainer,
    BinaryModule,
    Function,
    Variable,
}

/// Storage an element's info is routed to inside the element cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Projects,
    Containers,
    Openables,
    Children,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Model => "model",
            ElementKind::Project => "project",
            ElementKind::Folder => "folder",
            ElementKind::TranslationUnit => "translation_unit",
            ElementKind::Binary => "binary",
            ElementKind::Archive => "archive",
            ElementKind::BinaryContainer => "binary_container",
            ElementKind::ArchiveContainer => "archive_container",
            ElementKind::BinaryModule => "binary_module",
            ElementKind::Function => "function",
            ElementKind::Variable => "variable",
        }
    }

    /// Kinds that compute their own structure when opened.
    pub fn is_openable(&self) -> bool {
        !matches!(
            self,
            ElementKind::BinaryModule | ElementKind::Function | ElementKind::Variable
        )
    }

    /// File-level kinds, tracked by the bounded LRU.
    pub fn is_file(&self) -> bool {
        matches!(
            self,
            ElementKind::TranslationUnit | ElementKind::Binary | ElementKind::Archive
        )
    }

    /// Kinds that can receive files in copy/move operations.
    pub fn is_container(&self) -> bool {
        matches!(self, ElementKind::Project | ElementKind::Folder)
    }

    pub fn cache_tier(&self) -> CacheTier {
        match self {
            ElementKind::Model | ElementKind::Project => CacheTier::Projects,
            ElementKind::Folder | ElementKind::BinaryContainer | ElementKind::ArchiveContainer => {
                CacheTier::Containers
            }
            ElementKind::TranslationUnit | ElementKind::Binary | ElementKind::Archive => {
                CacheTier::Openables
            }
            ElementKind::BinaryModule | ElementKind::Function | ElementKind::Variable => {
                CacheTier::Children
            }
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(PartialEq, Eq, Hash)]
struct Handle {
    parent: Option<CElement>,
    name: String,
    kind: ElementKind,
    occurrence: u32,
}

/// Identity-only reference to a model element.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CElement {
    handle: Arc<Handle>,
}

pub const BINARY_CONTAINER_NAME: &str = "binaries";
pub const ARCHIVE_CONTAINER_NAME: &str = "archives";

impl CElement {
    /// Root of every model tree.
    pub fn model() -> Self {
        Self::new(None, String::new(), ElementKind::Model, 1)
    }

    fn new(parent: Option<CElement>, name: String, kind: ElementKind, occurrence: u32) -> Self {
        Self {
            handle: Arc::new(Handle {
                parent,
                name,
                kind,
                occurrence,
            }),
        }
    }

    pub fn child(&self, name: impl Into<String>, kind: ElementKind) -> CElement {
        Self::new(Some(self.clone()), name.into(), kind, 1)
    }

    /// Child handle for the `occurrence`-th element sharing a name and kind
    /// under this parent.
    pub fn child_occurrence(
        &self,
        name: impl Into<String>,
        kind: ElementKind,
        occurrence: u32,
    ) -> CElement {
        Self::new(Some(self.clone()), name.into(), kind, occurrence.max(1))
    }

    pub fn parent(&self) -> Option<&CElement> {
        self.handle.parent.as_ref()
    }

    /// Raw identity name. Projects use their root path.
    pub fn name(&self) -> &str {
        &self.handle.name
    }

    pub fn kind(&self) -> ElementKind {
        self.handle.kind
    }

    pub fn occurrence(&self) -> u32 {
        self.handle.occurrence
    }

    /// Display name: the last path component for projects, the name otherwise.
    pub fn element_name(&self) -> String {
        if self.kind() == ElementKind::Project {
            let path = PathBuf::from(self.name());
            if let Some(name) = path.file_name() {
                return name.to_string_lossy().to_string();
            }
        }
        self.name().to_string()
    }

    /// Parent, grandparent, ... up to the model root.
    pub fn ancestors(&self) -> impl Iterator<Item = &CElement> {
        std::iter::successors(self.parent(), |e| e.parent())
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub fn is_ancestor_of(&self, other: &CElement) -> bool {
        other == self || other.ancestors().any(|a| a == self)
    }

    pub fn project(&self) -> Option<CElement> {
        if self.kind() == ElementKind::Project {
            return Some(self.clone());
        }
        self.ancestors()
            .find(|a| a.kind() == ElementKind::Project)
            .cloned()
    }

    /// Nearest element (self included) that builds its own structure.
    pub fn openable(&self) -> Option<CElement> {
        if self.kind().is_openable() {
            return Some(self.clone());
        }
        self.ancestors().find(|a| a.kind().is_openable()).cloned()
    }

    pub fn is_archive_member(&self) -> bool {
        self.kind() == ElementKind::Binary
            && self.parent().map(|p| p.kind()) == Some(ElementKind::Archive)
    }

    /// Filesystem location backing the element. Archive members resolve to
    /// their archive; virtual and symbol-level elements have none.
    pub fn resource_path(&self) -> Option<PathBuf> {
        match self.kind() {
            ElementKind::Model => None,
            ElementKind::Project => Some(PathBuf::from(self.name())),
            ElementKind::Binary if self.is_archive_member() => self.parent()?.resource_path(),
            ElementKind::Folder
            | ElementKind::TranslationUnit
            | ElementKind::Binary
            | ElementKind::Archive => Some(self.parent()?.resource_path()?.join(self.name())),
            ElementKind::BinaryContainer
            | ElementKind::ArchiveContainer
            | ElementKind::BinaryModule
            | ElementKind::Function
            | ElementKind::Variable => None,
        }
    }

    /// Virtual container listing the binaries found anywhere in the project.
    pub fn binary_container(&self) -> Option<CElement> {
        let project = self.project()?;
        Some(project.child(BINARY_CONTAINER_NAME, ElementKind::BinaryContainer))
    }

    /// Virtual container listing the archives found anywhere in the project.
    pub fn archive_container(&self) -> Option<CElement> {
        let project = self.project()?;
        Some(project.child(ARCHIVE_CONTAINER_NAME, ElementKind::ArchiveContainer))
    }
}

impl fmt::Debug for CElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = self.parent() {
            if parent.kind() != ElementKind::Model {
                write!(f, "{parent:?}/")?;
            }
        }
        write!(f, "{}({})", self.kind(), self.name())?;
        if self.occurrence() > 1 {
            write!(f, "#{}", self.occurrence())?;
        }
        Ok(())
    }
}

impl fmt::Display for CElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.element_name())
    }
}
