//! The model service.
//!
//! [`ModelManager`] owns everything shared by a model instance: the element
//! cache, the registered projects, the background binary runners and the
//! resource/object seams. It is cheap to clone; clones share state. There is
//! no process-wide instance, every caller is handed the manager it works on.
//!
//! Infos are populated lazily. Asking for an element's info opens it on a
//! cache miss: file-level and container elements build their own structure,
//! everything else is opened through the nearest element that can build it.
//!
//! Lock order: the cache mutex may be taken before an info lock, never the
//! other way around.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, ElementCache};
use crate::config::ModelConfig;
use crate::element::{CElement, ElementKind};
use crate::error::{ModelError, ModelResult, StatusCode};
use crate::info::{InfoDetail, InfoRef, create_element_info};
use crate::loader::{self, LoadedStructure};
use crate::reader::{BinaryFormat, ObjectReader};
use crate::runner::{BinaryRunner, ScanTask};
use crate::scan::{is_hidden, is_translation_unit};
use crate::store::{ResourceStore, Stamp};

#[derive(Clone)]
pub struct ModelManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ModelConfig,
    store: Arc<dyn ResourceStore>,
    reader: Arc<dyn ObjectReader>,
    cache: Mutex<ElementCache>,
    projects: Mutex<Vec<CElement>>,
    runners: Mutex<HashMap<CElement, Arc<BinaryRunner>>>,
}

impl ModelManager {
    pub fn new(
        config: ModelConfig,
        store: Arc<dyn ResourceStore>,
        reader: Arc<dyn ObjectReader>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                reader,
                cache: Mutex::new(ElementCache::new(
                    config.openable_capacity,
                    config.openable_overflow,
                )),
                projects: Mutex::new(Vec::new()),
                runners: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> ModelConfig {
        self.inner.config
    }

    pub fn store(&self) -> &dyn ResourceStore {
        self.inner.store.as_ref()
    }

    pub fn reader(&self) -> &dyn ObjectReader {
        self.inner.reader.as_ref()
    }

    pub fn model(&self) -> CElement {
        CElement::model()
    }

    // ---------------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------------

    /// Registers the directory at `root` as a project. Registering the same
    /// root twice returns the existing handle.
    pub fn add_project(&self, root: impl AsRef<Path>) -> ModelResult<CElement> {
        let root = root.as_ref();
        let project = self
            .model()
            .child(root.to_string_lossy().to_string(), ElementKind::Project);
        if !self.store().is_dir(root) {
            return Err(ModelError::status(
                StatusCode::ElementDoesNotExist,
                Some(&project),
                format!("project root is not a directory: {}", root.display()),
            ));
        }

        {
            let mut projects = self.inner.projects.lock();
            if projects.contains(&project) {
                return Ok(project);
            }
            projects.push(project.clone());
        }
        if let Some(model) = self.inner.cache.lock().peek_info(&self.model()) {
            model.write().add_child(project.clone());
        }
        info!(project = %root.display(), "project added");
        Ok(project)
    }

    /// Unregisters the project, stops its runner and drops its cached infos.
    pub fn remove_project(&self, project: &CElement) -> ModelResult<()> {
        let removed = {
            let mut projects = self.inner.projects.lock();
            let before = projects.len();
            projects.retain(|p| p != project);
            before != projects.len()
        };
        if !removed {
            return Err(ModelError::does_not_exist(project));
        }

        self.stop_runner(project);
        self.release(project);
        if let Some(model) = self.inner.cache.lock().peek_info(&self.model()) {
            model.write().remove_child(project);
        }
        info!(project = %project.name(), "project removed");
        Ok(())
    }

    pub fn projects(&self) -> Vec<CElement> {
        self.inner.projects.lock().clone()
    }

    /// Resolves a filesystem path to the handle of the element backed by
    /// it. `None` when the path is outside every project or is not a C
    /// element (a plain text file, for instance).
    pub fn create(&self, path: impl AsRef<Path>) -> Option<CElement> {
        let path = path.as_ref();
        let project = self
            .projects()
            .into_iter()
            .filter(|p| path.starts_with(p.name()))
            .max_by_key(|p| p.name().len())?;

        let relative = path.strip_prefix(project.name()).ok()?;
        let components: Vec<_> = relative.components().collect();
        let Some((last, folders)) = components.split_last() else {
            return Some(project);
        };

        let mut parent = project;
        for folder in folders {
            parent = parent.child(folder.as_os_str().to_string_lossy(), ElementKind::Folder);
        }

        let name = last.as_os_str().to_string_lossy().to_string();
        if self.store().is_dir(path) {
            return Some(parent.child(name, ElementKind::Folder));
        }
        let kind = self.classify_file(path)?;
        Some(parent.child(name, kind))
    }

    // ---------------------------------------------------------------------
    // Info access
    // ---------------------------------------------------------------------

    /// Returns the element's info, opening the element on a cache miss.
    pub fn element_info(&self, element: &CElement) -> ModelResult<InfoRef> {
        if let Some(info) = self.inner.cache.lock().get_info(element) {
            return Ok(info);
        }
        self.open(element)
    }

    /// Children of `element`. File-level and folder elements whose backing
    /// resource changed since they were opened are rebuilt first, in place.
    /// Asking for a project container's children starts its runner.
    pub fn children(&self, element: &CElement) -> ModelResult<Vec<CElement>> {
        let info = self.element_info(element)?;
        self.refresh_if_changed(element, &info)?;
        if let Some(project) = element.project() {
            match element.kind() {
                ElementKind::BinaryContainer | ElementKind::ArchiveContainer => {
                    self.start_runner(&project)?;
                }
                _ => {}
            }
        }
        let children = info.read().children().to_vec();
        Ok(children)
    }

    pub fn has_children(&self, element: &CElement) -> ModelResult<bool> {
        Ok(!self.children(element)?.is_empty())
    }

    /// Whether the element can be opened. Never raises.
    pub fn exists(&self, element: &CElement) -> bool {
        match self.element_info(element) {
            Ok(_) => true,
            Err(e) => {
                if e.code() != StatusCode::ElementDoesNotExist {
                    debug!(element = ?element, error = %e, "exists check failed");
                }
                false
            }
        }
    }

    /// Reports the cached flag only; never opens the element.
    pub fn is_structure_known(&self, element: &CElement) -> bool {
        self.inner
            .cache
            .lock()
            .peek_info(element)
            .is_some_and(|info| info.read().is_structure_known())
    }

    pub fn has_unsaved_changes(&self, element: &CElement) -> bool {
        self.inner
            .cache
            .lock()
            .peek_info(element)
            .is_some_and(|info| info.read().has_unsaved_changes())
    }

    /// Marks a file-level element dirty. Dirty infos are never evicted.
    pub fn set_unsaved_changes(&self, element: &CElement, unsaved: bool) -> ModelResult<()> {
        if !element.kind().is_file() {
            return Err(ModelError::status(
                StatusCode::InvalidElementTypes,
                Some(element),
                "only files carry unsaved changes",
            ));
        }
        let info = self.element_info(element)?;
        info.write().set_unsaved_changes(unsaved);
        Ok(())
    }

    /// Rebuilds the structure of the element that owns `element`,
    /// regardless of stamps.
    pub fn refresh(&self, element: &CElement) -> ModelResult<()> {
        let owner = structure_owner(element).ok_or_else(|| {
            ModelError::status(
                StatusCode::InvalidElementTypes,
                Some(element),
                "element has no structure to refresh",
            )
        })?;
        let info = self.element_info(&owner)?;
        let stamp = self.current_stamp(&owner)?;
        self.rebuild(&owner, &info, stamp)
    }

    /// Drops the cached infos of `element` and everything below it. Returns
    /// how many infos were released.
    pub fn release(&self, element: &CElement) -> usize {
        let mut cache = self.inner.cache.lock();
        let mut released = cache.remove_subtree(element);
        if element.kind() == ElementKind::Project {
            for container in [element.binary_container(), element.archive_container()]
                .into_iter()
                .flatten()
            {
                released += cache.remove_subtree(&container);
            }
        }
        debug!(element = ?element, released, "released infos");
        released
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.lock().stats()
    }

    /// Evicts closeable file-level infos down to the configured capacity.
    pub fn shrink_cache(&self) -> Vec<CElement> {
        self.inner.cache.lock().shrink()
    }

    pub fn cached_elements(&self) -> Vec<CElement> {
        self.inner.cache.lock().cached_elements()
    }

    // ---------------------------------------------------------------------
    // Binary runner
    // ---------------------------------------------------------------------

    /// Binaries found anywhere in the project. Starts the project's runner
    /// if needed; with `wait`, blocks until it finished.
    pub fn binaries(&self, project: &CElement, wait: bool) -> ModelResult<Vec<CElement>> {
        self.container_children(project, project.binary_container(), wait)
    }

    /// Archives found anywhere in the project. See [`Self::binaries`].
    pub fn archives(&self, project: &CElement, wait: bool) -> ModelResult<Vec<CElement>> {
        self.container_children(project, project.archive_container(), wait)
    }

    fn container_children(
        &self,
        project: &CElement,
        container: Option<CElement>,
        wait: bool,
    ) -> ModelResult<Vec<CElement>> {
        let container = container.ok_or_else(|| {
            ModelError::status(
                StatusCode::InvalidElementTypes,
                Some(project),
                "element does not belong to a project",
            )
        })?;
        let task = self.start_runner(&container_project(&container))?;
        if wait {
            task.wait();
        }
        let info = self.element_info(&container)?;
        let children = info.read().children().to_vec();
        Ok(children)
    }

    /// Starts the project's runner once and returns its task.
    pub fn start_runner(&self, project: &CElement) -> ModelResult<ScanTask> {
        if !self.inner.projects.lock().contains(project) {
            return Err(ModelError::does_not_exist(project));
        }
        let runner = self
            .inner
            .runners
            .lock()
            .entry(project.clone())
            .or_insert_with(|| Arc::new(BinaryRunner::new(project.clone())))
            .clone();
        Ok(runner.start(self))
    }

    /// Stops the project's runner and forgets it, so the next request scans
    /// the project again from scratch.
    pub fn reset_runner(&self, project: &CElement) {
        self.stop_runner(project);
        let mut cache = self.inner.cache.lock();
        for container in [project.binary_container(), project.archive_container()]
            .into_iter()
            .flatten()
        {
            cache.remove_info(&container);
        }
    }

    fn stop_runner(&self, project: &CElement) {
        let runner = self.inner.runners.lock().remove(project);
        if let Some(runner) = runner {
            runner.stop();
        }
    }

    /// Lists a binary or archive found by a runner in its project container.
    pub(crate) fn record_found(&self, element: CElement) -> ModelResult<()> {
        let container = match element.kind() {
            ElementKind::Binary => element.binary_container(),
            ElementKind::Archive => element.archive_container(),
            _ => None,
        };
        let Some(container) = container else {
            return Ok(());
        };
        let info = self.element_info(&container)?;
        info.write().add_child(element);
        Ok(())
    }

    pub(crate) fn mark_containers_known(&self, project: &CElement) -> ModelResult<()> {
        for container in [project.binary_container(), project.archive_container()]
            .into_iter()
            .flatten()
        {
            self.element_info(&container)?
                .write()
                .set_structure_known(true);
        }
        Ok(())
    }

    /// Removes a file from the project containers and from its parent's
    /// cached children.
    pub(crate) fn forget_file(&self, element: &CElement) {
        let cache = self.inner.cache.lock();
        let holders = [
            element.parent().cloned(),
            element.binary_container(),
            element.archive_container(),
        ];
        for holder in holders.into_iter().flatten() {
            if let Some(info) = cache.peek_info(&holder) {
                info.write().remove_child(element);
            }
        }
    }

    /// Adds a new file to its parent's cached children and, for binaries
    /// and archives, to the project container of its kind.
    pub(crate) fn note_file(&self, element: &CElement) {
        let cache = self.inner.cache.lock();
        let container = match element.kind() {
            ElementKind::Binary => element.binary_container(),
            ElementKind::Archive => element.archive_container(),
            _ => None,
        };
        for holder in [element.parent().cloned(), container].into_iter().flatten() {
            if let Some(info) = cache.peek_info(&holder) {
                info.write().add_child(element.clone());
            }
        }
    }

    /// Stops every runner and drops all cached state.
    pub fn shutdown(&self) {
        let runners: Vec<_> = self.inner.runners.lock().drain().collect();
        for (_, runner) in runners {
            runner.stop();
        }
        self.inner.cache.lock().clear();
        self.inner.projects.lock().clear();
        debug!("model shut down");
    }

    // ---------------------------------------------------------------------
    // Opening
    // ---------------------------------------------------------------------

    fn open(&self, element: &CElement) -> ModelResult<InfoRef> {
        if !element.kind().is_openable() || element.is_archive_member() {
            return self.open_through_parent(element);
        }

        if let Some(parent) = element.parent()
            && parent.kind() != ElementKind::Model
        {
            if parent.kind().is_container() && lists_on_disk(element) {
                // The handle's kind is part of its identity; the parent's
                // listing decides which kind the resource really has.
                if !self.children(parent)?.contains(element) {
                    return Err(ModelError::does_not_exist(element));
                }
            } else if parent.kind().is_openable() {
                self.element_info(parent)?;
            }
        }

        let stamp = self.current_stamp(element)?;
        let loaded = self.build_structure(element)?;
        self.install(element, loaded, stamp)
    }

    /// Opens the nearest element that builds `element`'s structure and looks
    /// `element` up again. A parent that is open but lost this child's info
    /// (its owner was evicted and reopened, say) is rebuilt once.
    fn open_through_parent(&self, element: &CElement) -> ModelResult<InfoRef> {
        let parent = element
            .parent()
            .ok_or_else(|| ModelError::does_not_exist(element))?;
        let parent_info = self.element_info(parent)?;
        if let Some(info) = self.inner.cache.lock().get_info(element) {
            return Ok(info);
        }
        if !parent_info.read().children().contains(element) {
            return Err(ModelError::does_not_exist(element));
        }

        let owner = structure_owner(element).ok_or_else(|| ModelError::does_not_exist(element))?;
        let owner_info = self.element_info(&owner)?;
        let stamp = self.current_stamp(&owner)?;
        self.rebuild(&owner, &owner_info, stamp)?;
        self.inner
            .cache
            .lock()
            .get_info(element)
            .ok_or_else(|| ModelError::does_not_exist(element))
    }

    fn install(
        &self,
        element: &CElement,
        loaded: LoadedStructure,
        stamp: Option<Stamp>,
    ) -> ModelResult<InfoRef> {
        let LoadedStructure {
            mut root,
            descendants,
        } = loaded;
        root.set_stamp(stamp);
        let info = root.into_ref();

        let mut cache = self.inner.cache.lock();
        if let Some(existing) = cache.get_info(element) {
            // Opened concurrently; first one in wins.
            return Ok(existing);
        }
        for (child, child_info) in descendants {
            cache.put_info(child, child_info.into_ref());
        }
        let evicted = cache.put_info(element.clone(), info.clone());
        if !evicted.is_empty() {
            debug!(element = ?element, evicted = evicted.len(), "opening evicted infos");
        }
        Ok(info)
    }

    /// Rebuilds the structure behind `info` in place: descendants are
    /// dropped and replaced, the info object itself is kept.
    fn rebuild(&self, element: &CElement, info: &InfoRef, stamp: Option<Stamp>) -> ModelResult<()> {
        let LoadedStructure { root, descendants } = self.build_structure(element)?;
        let mut cache = self.inner.cache.lock();
        let dropped = cache.remove_descendants(info);
        {
            let mut current = info.write();
            let unsaved = current.has_unsaved_changes();
            *current = root;
            current.set_stamp(stamp);
            current.set_unsaved_changes(unsaved);
        }
        let added = descendants.len();
        for (child, child_info) in descendants {
            cache.put_info(child, child_info.into_ref());
        }
        debug!(element = ?element, dropped, added, "structure rebuilt");
        Ok(())
    }

    fn refresh_if_changed(&self, element: &CElement, info: &InfoRef) -> ModelResult<()> {
        if !tracks_stamp(element) {
            return Ok(());
        }
        let current = self.current_stamp(element)?;
        let changed = info.write().has_changed(current);
        if !changed {
            return Ok(());
        }
        if current.is_none() {
            self.release(element);
            return Err(ModelError::does_not_exist(element));
        }
        debug!(element = ?element, "resource changed, rebuilding");
        self.rebuild(element, info, current)
    }

    fn current_stamp(&self, element: &CElement) -> ModelResult<Option<Stamp>> {
        if !tracks_stamp(element) {
            return Ok(None);
        }
        let Some(path) = element.resource_path() else {
            return Ok(None);
        };
        self.store()
            .stamp(&path)
            .map_err(|e| ModelError::io(&path, e))
    }

    fn build_structure(&self, element: &CElement) -> ModelResult<LoadedStructure> {
        match element.kind() {
            ElementKind::Model => {
                let mut root = create_element_info(ElementKind::Model);
                root.set_children(self.projects());
                root.set_structure_known(true);
                Ok(LoadedStructure {
                    root,
                    descendants: Vec::new(),
                })
            }
            ElementKind::Project | ElementKind::Folder => self.container_structure(element),
            ElementKind::TranslationUnit => {
                let path = self.existing_path(element)?;
                if self.store().is_dir(&path) {
                    return Err(ModelError::does_not_exist(element));
                }
                let mut root = create_element_info(ElementKind::TranslationUnit);
                root.set_structure_known(true);
                Ok(LoadedStructure {
                    root,
                    descendants: Vec::new(),
                })
            }
            ElementKind::Binary | ElementKind::Archive => {
                let path = self.existing_path(element)?;
                let bytes = match self.store().read(&path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to read binary");
                        return Ok(LoadedStructure::failed(element.kind(), e.to_string()));
                    }
                };
                Ok(if element.kind() == ElementKind::Archive {
                    loader::load_archive(element, &bytes, self.reader())
                } else {
                    loader::load_binary(element, &bytes, self.reader())
                })
            }
            ElementKind::BinaryContainer | ElementKind::ArchiveContainer => {
                let project = container_project(element);
                if !self.inner.projects.lock().contains(&project) {
                    return Err(ModelError::does_not_exist(element));
                }
                Ok(LoadedStructure::default())
            }
            ElementKind::BinaryModule | ElementKind::Function | ElementKind::Variable => {
                Err(ModelError::status(
                    StatusCode::InvalidElementTypes,
                    Some(element),
                    "element is built by its binary",
                ))
            }
        }
    }

    fn container_structure(&self, element: &CElement) -> ModelResult<LoadedStructure> {
        if element.kind() == ElementKind::Project && !self.inner.projects.lock().contains(element)
        {
            return Err(ModelError::does_not_exist(element));
        }
        let path = self.existing_path(element)?;
        if !self.store().is_dir(&path) {
            return Err(ModelError::does_not_exist(element));
        }
        let entries = self
            .store()
            .list_dir(&path)
            .map_err(|e| ModelError::io(&path, e))?;

        let mut root = create_element_info(element.kind());
        let mut non_c_resources = Vec::new();
        for entry in entries {
            if is_hidden(&entry) {
                continue;
            }
            let Some(name) = entry.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if self.store().is_dir(&entry) {
                root.push_child(element.child(name, ElementKind::Folder));
            } else if let Some(kind) = self.classify_file(&entry) {
                root.push_child(element.child(name, kind));
            } else {
                non_c_resources.push(entry);
            }
        }
        root.detail = InfoDetail::Container { non_c_resources };
        root.set_structure_known(true);
        Ok(LoadedStructure {
            root,
            descendants: Vec::new(),
        })
    }

    fn existing_path(&self, element: &CElement) -> ModelResult<PathBuf> {
        let path = element
            .resource_path()
            .ok_or_else(|| ModelError::does_not_exist(element))?;
        if !self.store().exists(&path) {
            return Err(ModelError::does_not_exist(element));
        }
        Ok(path)
    }

    /// Kind of the element a regular file maps to, if any.
    fn classify_file(&self, path: &Path) -> Option<ElementKind> {
        if is_translation_unit(path) {
            return Some(ElementKind::TranslationUnit);
        }
        let bytes = self.store().read(path).ok()?;
        match self.reader().sniff(&bytes)? {
            BinaryFormat::Object => Some(ElementKind::Binary),
            BinaryFormat::Archive => Some(ElementKind::Archive),
        }
    }
}

/// Elements whose info tracks the modification stamp of a resource.
/// Elements that appear in their project's or folder's directory listing.
fn lists_on_disk(element: &CElement) -> bool {
    element.kind().is_file() || element.kind() == ElementKind::Folder
}

fn tracks_stamp(element: &CElement) -> bool {
    match element.kind() {
        ElementKind::Project | ElementKind::Folder | ElementKind::TranslationUnit => true,
        ElementKind::Binary => !element.is_archive_member(),
        ElementKind::Archive => true,
        _ => false,
    }
}

/// Nearest element (self included) that builds its own structure from a
/// resource.
fn structure_owner(element: &CElement) -> Option<CElement> {
    std::iter::once(element)
        .chain(element.ancestors())
        .find(|e| e.kind().is_openable() && !e.is_archive_member())
        .cloned()
}

fn container_project(container: &CElement) -> CElement {
    container.project().unwrap_or_else(|| container.clone())
}

/// Installs an info built outside a load pass. Test-only.
#[cfg(test)]
impl ModelManager {
    pub(crate) fn put_info_for_test(&self, element: CElement, info: crate::info::ElementInfo) {
        self.inner.cache.lock().put_info(element, info.into_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::ElementInfo;
    use crate::reader::ElfReader;
    use crate::store::FsStore;
    use std::fs;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "{prefix}-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn manager(config: ModelConfig) -> ModelManager {
        ModelManager::new(config, Arc::new(FsStore::new()), Arc::new(ElfReader::new()))
    }

    fn touch(path: &Path, secs: u64) -> std::io::Result<()> {
        fs::File::open(path)?.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[test]
    fn project_lists_folders_units_and_resources() -> anyhow::Result<()> {
        let base = temp_dir("cmodel-manager-tree");
        fs::create_dir_all(base.join("src"))?;
        fs::create_dir_all(base.join(".git"))?;
        fs::write(base.join("src/main.c"), b"int main(void) { return 0; }")?;
        fs::write(base.join("util.h"), b"#pragma once")?;
        fs::write(base.join("Makefile"), b"all:")?;

        let model = manager(ModelConfig::default());
        let project = model.add_project(&base)?;
        assert_eq!(model.children(&model.model())?, vec![project.clone()]);

        let children = model.children(&project)?;
        let names: Vec<_> = children.iter().map(|c| (c.kind(), c.name().to_string())).collect();
        assert_eq!(
            names,
            vec![
                (ElementKind::Folder, "src".to_string()),
                (ElementKind::TranslationUnit, "util.h".to_string()),
            ]
        );
        let info = model.element_info(&project)?;
        assert!(matches!(
            &info.read().detail,
            InfoDetail::Container { non_c_resources }
                if non_c_resources == &vec![base.join("Makefile")]
        ));

        let src = project.child("src", ElementKind::Folder);
        let main = src.child("main.c", ElementKind::TranslationUnit);
        assert_eq!(model.children(&src)?, vec![main.clone()]);
        assert!(model.exists(&main));
        assert!(model.is_structure_known(&main));
        assert_eq!(model.create(base.join("src/main.c")), Some(main));
        assert_eq!(model.create(base.join("Makefile")), None);
        assert_eq!(model.create("/definitely/elsewhere.c"), None);

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn missing_resource_is_element_does_not_exist() -> anyhow::Result<()> {
        let base = temp_dir("cmodel-manager-missing");
        fs::create_dir_all(&base)?;
        let model = manager(ModelConfig::default());
        let project = model.add_project(&base)?;

        let ghost = project.child("ghost.c", ElementKind::TranslationUnit);
        let err = model.element_info(&ghost).unwrap_err();
        assert_eq!(err.code(), StatusCode::ElementDoesNotExist);
        assert_eq!(err.element(), Some(&ghost));
        assert!(!model.exists(&ghost));

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn changed_folder_is_rebuilt_in_the_same_info() -> anyhow::Result<()> {
        let base = temp_dir("cmodel-manager-stale");
        fs::create_dir_all(&base)?;
        fs::write(base.join("a.c"), b"")?;
        let model = manager(ModelConfig::default());
        let project = model.add_project(&base)?;

        touch(&base, 1_000)?;
        assert_eq!(model.children(&project)?.len(), 1);
        let before = model.element_info(&project)?;

        fs::write(base.join("b.c"), b"")?;
        touch(&base, 2_000)?;
        assert_eq!(model.children(&project)?.len(), 2);
        let after = model.element_info(&project)?;
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(
            after.read().stamp(),
            Some(Stamp::from_system_time(UNIX_EPOCH + Duration::from_secs(2_000)))
        );

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn unsaved_changes_survive_small_cache() -> anyhow::Result<()> {
        let base = temp_dir("cmodel-manager-unsaved");
        fs::create_dir_all(&base)?;
        for i in 0..6 {
            fs::write(base.join(format!("f{i}.c")), b"")?;
        }
        let model = manager(ModelConfig {
            openable_capacity: 2,
            openable_overflow: 0,
        });
        let project = model.add_project(&base)?;
        let dirty = project.child("f0.c", ElementKind::TranslationUnit);
        model.set_unsaved_changes(&dirty, true)?;

        for child in model.children(&project)? {
            model.element_info(&child)?;
        }
        model.shrink_cache();
        assert!(model.has_unsaved_changes(&dirty));
        assert!(model.cache_stats().openables <= 2);
        assert!(
            model
                .set_unsaved_changes(&project, true)
                .is_err_and(|e| e.code() == StatusCode::InvalidElementTypes)
        );

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn remove_project_releases_infos() -> anyhow::Result<()> {
        let base = temp_dir("cmodel-manager-remove");
        fs::create_dir_all(base.join("src"))?;
        let model = manager(ModelConfig::default());
        let project = model.add_project(&base)?;
        model.children(&model.model())?;
        model.children(&project)?;
        model.children(&project.child("src", ElementKind::Folder))?;

        model.remove_project(&project)?;
        assert!(model.children(&model.model())?.is_empty());
        assert_eq!(model.cache_stats().containers, 0);
        assert!(!model.exists(&project));
        assert!(model.remove_project(&project).is_err());

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn refresh_rebuilds_regardless_of_stamp() -> anyhow::Result<()> {
        let base = temp_dir("cmodel-manager-refresh");
        fs::create_dir_all(&base)?;
        let model = manager(ModelConfig::default());
        let project = model.add_project(&base)?;
        let info = model.element_info(&project)?;
        info.write().set_children(Vec::new());
        fs::write(base.join("late.c"), b"")?;

        model.refresh(&project)?;
        assert_eq!(info.read().children().len(), 1);

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn symbol_infos_are_rebuilt_through_their_binary() -> anyhow::Result<()> {
        let base = temp_dir("cmodel-manager-owner");
        fs::create_dir_all(&base)?;
        let model = manager(ModelConfig::default());
        let project = model.add_project(&base)?;

        let binary = project.child("app", ElementKind::Binary);
        let main = binary.child("main", ElementKind::Function);
        let mut info = ElementInfo::new();
        info.add_child(main.clone());
        info.set_structure_known(true);
        model.put_info_for_test(binary.clone(), info);

        // `app` does not exist on disk, so rebuilding through it fails.
        let err = model.element_info(&main).unwrap_err();
        assert_eq!(err.code(), StatusCode::ElementDoesNotExist);

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn handle_of_the_wrong_kind_does_not_exist() -> anyhow::Result<()> {
        let base = temp_dir("cmodel-manager-kind");
        fs::create_dir_all(base.join("src"))?;
        fs::write(base.join("src/main.c"), b"int main(void) { return 0; }")?;
        fs::write(base.join("README"), b"docs")?;
        let model = manager(ModelConfig::default());
        let project = model.add_project(&base)?;
        let src = project.child("src", ElementKind::Folder);

        for kind in [ElementKind::Binary, ElementKind::Archive, ElementKind::Folder] {
            let bogus = src.child("main.c", kind);
            let err = model.element_info(&bogus).unwrap_err();
            assert_eq!(err.code(), StatusCode::ElementDoesNotExist, "{kind:?}");
            assert!(!model.exists(&bogus));
        }
        assert!(!model.exists(&project.child("src", ElementKind::TranslationUnit)));
        assert!(!model.exists(&project.child("README", ElementKind::TranslationUnit)));
        assert!(model.exists(&src.child("main.c", ElementKind::TranslationUnit)));

        let err = model
            .delete_elements(&[src.child("main.c", ElementKind::Binary)])
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::ElementDoesNotExist);
        assert!(base.join("src/main.c").exists());

        let _ = fs::remove_dir_all(base);
        Ok(())
    }
}
