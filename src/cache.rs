//! In-memory cache of element infos.
//!
//! Infos are routed by [`CacheTier`]: projects and containers live in plain
//! maps, file-level elements (translation units, binaries, archives) in an
//! [`OverflowingLruCache`], and everything below a file in an unbounded map
//! that is cleaned up whenever the owning file leaves the cache.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::element::{CElement, CacheTier};
use crate::info::InfoRef;
use crate::lru::{EvictionPolicy, OverflowingLruCache};

pub const DEFAULT_PROJECT_SIZE: usize = 5;
pub const DEFAULT_OPENABLE_SIZE: usize = 500;
pub const DEFAULT_OPENABLE_OVERFLOW: usize = 50;

/// Refuses to close infos holding unsaved changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfoCloser;

impl EvictionPolicy<CElement, InfoRef> for InfoCloser {
    fn close(&mut self, _element: &CElement, info: &InfoRef) -> bool {
        match info.try_read() {
            Some(info) => !info.has_unsaved_changes(),
            // Someone is rebuilding it right now.
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub projects: usize,
    pub containers: usize,
    pub openables: usize,
    pub children: usize,
    pub openable_capacity: usize,
    pub openable_overflow: usize,
}

pub struct ElementCache {
    projects: HashMap<CElement, InfoRef>,
    containers: HashMap<CElement, InfoRef>,
    openables: OverflowingLruCache<CElement, InfoRef, InfoCloser>,
    children: HashMap<CElement, InfoRef>,
}

impl Default for ElementCache {
    fn default() -> Self {
        Self::new(DEFAULT_OPENABLE_SIZE, DEFAULT_OPENABLE_OVERFLOW)
    }
}

impl ElementCache {
    pub fn new(openable_capacity: usize, openable_overflow: usize) -> Self {
        Self {
            projects: HashMap::with_capacity(DEFAULT_PROJECT_SIZE),
            containers: HashMap::new(),
            openables: OverflowingLruCache::with_policy(
                openable_capacity,
                openable_overflow,
                InfoCloser,
            ),
            children: HashMap::new(),
        }
    }

    /// Returns the info and marks file-level entries most-recently-used.
    pub fn get_info(&mut self, element: &CElement) -> Option<InfoRef> {
        match tier(element) {
            CacheTier::Projects => self.projects.get(element).cloned(),
            CacheTier::Containers => self.containers.get(element).cloned(),
            CacheTier::Openables => self.openables.get(element).cloned(),
            CacheTier::Children => self.children.get(element).cloned(),
        }
    }

    /// Returns the info without disturbing the LRU ordering.
    pub fn peek_info(&self, element: &CElement) -> Option<InfoRef> {
        match tier(element) {
            CacheTier::Projects => self.projects.get(element).cloned(),
            CacheTier::Containers => self.containers.get(element).cloned(),
            CacheTier::Openables => self.openables.peek(element).cloned(),
            CacheTier::Children => self.children.get(element).cloned(),
        }
    }

    /// Stores `info`. Returns the file-level elements evicted to make room;
    /// their descendants are already gone from the cache.
    pub fn put_info(&mut self, element: CElement, info: InfoRef) -> Vec<CElement> {
        match tier(&element) {
            CacheTier::Projects => {
                self.projects.insert(element, info);
                Vec::new()
            }
            CacheTier::Containers => {
                self.containers.insert(element, info);
                Vec::new()
            }
            CacheTier::Openables => {
                let evicted = self.openables.put(element, info);
                self.release_evicted(evicted)
            }
            CacheTier::Children => {
                self.children.insert(element, info);
                Vec::new()
            }
        }
    }

    pub fn remove_info(&mut self, element: &CElement) -> Option<InfoRef> {
        match tier(element) {
            CacheTier::Projects => self.projects.remove(element),
            CacheTier::Containers => self.containers.remove(element),
            CacheTier::Openables => self.openables.remove(element),
            CacheTier::Children => self.children.remove(element),
        }
    }

    /// Removes the element's info and, recursively, the infos of every child
    /// it lists. Returns how many infos were dropped.
    pub fn remove_subtree(&mut self, element: &CElement) -> usize {
        let Some(info) = self.remove_info(element) else {
            return 0;
        };
        1 + self.remove_descendants(&info)
    }

    /// Removes the infos of everything below `info`, keeping `info` itself.
    pub fn remove_descendants(&mut self, info: &InfoRef) -> usize {
        let children = info.read().children().to_vec();
        children.iter().map(|c| self.remove_subtree(c)).sum()
    }

    /// Evicts closeable file-level entries down to capacity.
    pub fn shrink(&mut self) -> Vec<CElement> {
        let evicted = self.openables.shrink();
        self.release_evicted(evicted)
    }

    /// Every element currently holding an info. Shrinks first so the list
    /// does not include entries that are about to be evicted.
    pub fn cached_elements(&mut self) -> Vec<CElement> {
        let (openables, evicted) = self.openables.entries_after_shrink();
        self.release_evicted(evicted);
        let mut elements: Vec<CElement> = self.projects.keys().cloned().collect();
        elements.extend(self.containers.keys().cloned());
        elements.extend(openables);
        elements.extend(self.children.keys().cloned());
        elements
    }

    pub fn clear(&mut self) {
        self.projects.clear();
        self.containers.clear();
        self.openables.clear();
        self.children.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            projects: self.projects.len(),
            containers: self.containers.len(),
            openables: self.openables.len(),
            children: self.children.len(),
            openable_capacity: self.openables.capacity(),
            openable_overflow: self.openables.overflow(),
        }
    }

    fn release_evicted(&mut self, evicted: Vec<(CElement, InfoRef)>) -> Vec<CElement> {
        let mut released = Vec::with_capacity(evicted.len());
        for (element, info) in evicted {
            let dropped = self.remove_descendants(&info);
            debug!(element = ?element, dropped, "evicted from element cache");
            released.push(element);
        }
        released
    }
}

/// Archive members are binaries but live and die with their archive, so
/// they are kept with the other descendants instead of in the LRU.
fn tier(element: &CElement) -> CacheTier {
    if element.is_archive_member() {
        CacheTier::Children
    } else {
        element.kind().cache_tier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;
    use crate::info::ElementInfo;

    fn project() -> CElement {
        CElement::model().child("/work/p", ElementKind::Project)
    }

    fn binary_with_symbols(name: &str, cache: &mut ElementCache) -> CElement {
        let binary = project().child(name, ElementKind::Binary);
        let mut info = ElementInfo::new();
        for symbol in ["a", "b"] {
            let child = binary.child(symbol, ElementKind::Function);
            info.add_child(child.clone());
            cache.put_info(child, ElementInfo::new().into_ref());
        }
        cache.put_info(binary.clone(), info.into_ref());
        binary
    }

    #[test]
    fn equal_handles_resolve_to_the_same_info() {
        let mut cache = ElementCache::default();
        let first = project().child("main.c", ElementKind::TranslationUnit);
        let info = ElementInfo::new().into_ref();
        cache.put_info(first, info.clone());

        let again = project().child("main.c", ElementKind::TranslationUnit);
        let found = cache.get_info(&again).unwrap();
        assert!(std::sync::Arc::ptr_eq(&found, &info));
    }

    #[test]
    fn infos_are_routed_by_tier() {
        let mut cache = ElementCache::new(2, 0);
        let p = project();
        cache.put_info(p.clone(), ElementInfo::new().into_ref());
        cache.put_info(p.child("src", ElementKind::Folder), ElementInfo::new().into_ref());
        binary_with_symbols("app", &mut cache);

        let stats = cache.stats();
        assert_eq!(stats.projects, 1);
        assert_eq!(stats.containers, 1);
        assert_eq!(stats.openables, 1);
        assert_eq!(stats.children, 2);
    }

    #[test]
    fn eviction_drops_descendants() {
        let mut cache = ElementCache::new(1, 0);
        let first = binary_with_symbols("one", &mut cache);
        let second = binary_with_symbols("two", &mut cache);

        assert!(cache.peek_info(&first).is_none());
        assert!(cache.peek_info(&first.child("a", ElementKind::Function)).is_none());
        assert!(cache.peek_info(&second.child("a", ElementKind::Function)).is_some());
        assert_eq!(cache.stats().children, 2);
    }

    #[test]
    fn archive_members_stay_out_of_the_lru() {
        let mut cache = ElementCache::new(1, 0);
        let archive = project().child("libm.a", ElementKind::Archive);
        let mut info = ElementInfo::new();
        for name in ["sin.o", "cos.o"] {
            let member = archive.child(name, ElementKind::Binary);
            info.add_child(member.clone());
            cache.put_info(member, ElementInfo::new().into_ref());
        }
        cache.put_info(archive.clone(), info.into_ref());

        assert_eq!(cache.stats().openables, 1);
        assert_eq!(cache.stats().children, 2);
        assert!(cache.peek_info(&archive.child("sin.o", ElementKind::Binary)).is_some());
    }

    #[test]
    fn unsaved_changes_pin_an_entry() {
        let mut cache = ElementCache::new(1, 0);
        let dirty = project().child("edit.c", ElementKind::TranslationUnit);
        let mut info = ElementInfo::new();
        info.set_unsaved_changes(true);
        cache.put_info(dirty.clone(), info.into_ref());

        for i in 0..4 {
            let tu = project().child(format!("f{i}.c"), ElementKind::TranslationUnit);
            cache.put_info(tu, ElementInfo::new().into_ref());
        }
        cache.shrink();
        assert!(cache.peek_info(&dirty).is_some());
    }

    #[test]
    fn remove_subtree_counts_everything_dropped() {
        let mut cache = ElementCache::default();
        let binary = binary_with_symbols("app", &mut cache);
        assert_eq!(cache.remove_subtree(&binary), 3);
        assert_eq!(cache.stats().children, 0);
        assert!(cache.cached_elements().is_empty());
    }
}
