//! Mutable per-element state held by the element cache.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::element::{CElement, ElementKind};
use crate::reader::{BinaryAttributes, SegmentSizes};
use crate::store::Stamp;

/// Shared reference to an info. Rebuilding a stale element mutates the
/// info behind this lock, so holders keep observing the same object.
pub type InfoRef = Arc<RwLock<ElementInfo>>;

/// Outcome of loading the structure of a binary or archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum LoadStatus {
    Complete,
    /// Structure is populated but some parts could not be read.
    Partial(Vec<String>),
    /// Nothing could be read; the structure is empty.
    Failed(String),
}

impl LoadStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, LoadStatus::Complete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SymbolInfo {
    pub address: u64,
    pub size: u64,
    pub local: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryDetail {
    pub attributes: BinaryAttributes,
    pub segments: SegmentSizes,
    pub needed: Vec<String>,
    pub soname: Option<String>,
    pub status: LoadStatus,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum InfoDetail {
    #[default]
    None,
    Container {
        non_c_resources: Vec<PathBuf>,
    },
    Binary(Box<BinaryDetail>),
    Archive {
        status: LoadStatus,
    },
    Module {
        source_file: PathBuf,
    },
    Symbol(SymbolInfo),
}

#[derive(Debug, Clone, Default)]
pub struct ElementInfo {
    children: Vec<CElement>,
    structure_known: bool,
    stamp: Option<Stamp>,
    unsaved_changes: bool,
    pub detail: InfoDetail,
}

impl ElementInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_ref(self) -> InfoRef {
        Arc::new(RwLock::new(self))
    }

    pub fn children(&self) -> &[CElement] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn children_of_kind(&self, kind: ElementKind) -> impl Iterator<Item = &CElement> {
        self.children.iter().filter(move |c| c.kind() == kind)
    }

    /// Appends `child` unless it is already present.
    pub fn add_child(&mut self, child: CElement) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Appends `child` without the duplicate check. For load passes, whose
    /// handles are already distinct.
    pub fn push_child(&mut self, child: CElement) {
        self.children.push(child);
    }

    pub fn remove_child(&mut self, child: &CElement) -> bool {
        let before = self.children.len();
        self.children.retain(|c| c != child);
        before != self.children.len()
    }

    pub fn set_children(&mut self, children: Vec<CElement>) {
        self.children = children;
    }

    /// Removes and returns the children, leaving the structure unknown.
    pub fn take_children(&mut self) -> Vec<CElement> {
        self.structure_known = false;
        std::mem::take(&mut self.children)
    }

    pub fn is_structure_known(&self) -> bool {
        self.structure_known
    }

    pub fn set_structure_known(&mut self, known: bool) {
        self.structure_known = known;
    }

    pub fn stamp(&self) -> Option<Stamp> {
        self.stamp
    }

    pub fn set_stamp(&mut self, stamp: Option<Stamp>) {
        self.stamp = stamp;
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved_changes
    }

    pub fn set_unsaved_changes(&mut self, unsaved: bool) {
        self.unsaved_changes = unsaved;
    }

    /// Compares the live stamp with the stored one. A mismatch stores the
    /// new stamp and reports `true`, so each change is reported once. The
    /// first observation only records the stamp.
    pub fn has_changed(&mut self, current: Option<Stamp>) -> bool {
        match (self.stamp, current) {
            (None, None) => false,
            (None, Some(now)) => {
                self.stamp = Some(now);
                false
            }
            (Some(old), now) if Some(old) == now => false,
            (Some(_), now) => {
                self.stamp = now;
                true
            }
        }
    }

    pub fn binary_detail(&self) -> Option<&BinaryDetail> {
        match &self.detail {
            InfoDetail::Binary(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn symbol(&self) -> Option<SymbolInfo> {
        match &self.detail {
            InfoDetail::Symbol(symbol) => Some(*symbol),
            _ => None,
        }
    }

    pub fn load_status(&self) -> Option<&LoadStatus> {
        match &self.detail {
            InfoDetail::Binary(detail) => Some(&detail.status),
            InfoDetail::Archive { status } => Some(status),
            _ => None,
        }
    }
}

/// Factory for the empty info of a freshly opened element.
pub fn create_element_info(kind: ElementKind) -> ElementInfo {
    let mut info = ElementInfo::new();
    info.detail = match kind {
        ElementKind::Project | ElementKind::Folder => InfoDetail::Container {
            non_c_resources: Vec::new(),
        },
        ElementKind::Archive => InfoDetail::Archive {
            status: LoadStatus::Complete,
        },
        _ => InfoDetail::None,
    };
    info
}
