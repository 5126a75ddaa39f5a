//! Typed views over element handles.
//!
//! A view wraps a [`CElement`] of one kind and exposes the capabilities
//! that kind has: [`Parent`] for elements with children, [`Openable`] for
//! resource-backed elements, [`BinaryElement`] for things living inside a
//! binary and [`SourceReference`] for elements that know their source file.
//! Views are obtained with the `CElement::as_*` accessors and read through
//! the [`ModelManager`] passed to each call.

use std::path::PathBuf;

use crate::element::{CElement, ElementKind};
use crate::error::{ModelError, ModelResult, StatusCode};
use crate::info::{BinaryDetail, InfoDetail, LoadStatus, SymbolInfo};
use crate::manager::ModelManager;
use crate::runner::ScanTask;
use crate::store::Stamp;

pub trait ElementView {
    fn element(&self) -> &CElement;
}

pub trait Parent: ElementView {
    fn children(&self, model: &ModelManager) -> ModelResult<Vec<CElement>> {
        model.children(self.element())
    }

    fn has_children(&self, model: &ModelManager) -> ModelResult<bool> {
        model.has_children(self.element())
    }
}

pub trait Openable: ElementView {
    fn path(&self) -> Option<PathBuf> {
        self.element().resource_path()
    }

    fn is_open(&self, model: &ModelManager) -> bool {
        model.is_structure_known(self.element())
    }

    fn stamp(&self, model: &ModelManager) -> ModelResult<Option<Stamp>> {
        Ok(model.element_info(self.element())?.read().stamp())
    }

    fn has_unsaved_changes(&self, model: &ModelManager) -> bool {
        model.has_unsaved_changes(self.element())
    }

    /// Only file-level elements accept this; others report
    /// `InvalidElementTypes`.
    fn set_unsaved_changes(&self, model: &ModelManager, unsaved: bool) -> ModelResult<()> {
        model.set_unsaved_changes(self.element(), unsaved)
    }

    fn refresh(&self, model: &ModelManager) -> ModelResult<()> {
        model.refresh(self.element())
    }

    fn close(&self, model: &ModelManager) -> usize {
        model.release(self.element())
    }
}

pub trait BinaryElement: ElementView {
    /// Binary the element was read from. For archive members this is the
    /// member, not the archive.
    fn binary(&self) -> Option<Binary> {
        self.element()
            .ancestors()
            .find(|a| a.kind() == ElementKind::Binary)
            .cloned()
            .map(Binary)
    }

    fn address(&self, model: &ModelManager) -> ModelResult<Option<u64>>;
}

pub trait SourceReference: ElementView {
    fn source_file(&self, model: &ModelManager) -> ModelResult<Option<PathBuf>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Project(CElement);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Folder(CElement);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranslationUnit(CElement);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binary(CElement);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Archive(CElement);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryModule(CElement);

/// A function or variable read from a binary's symbol table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinarySymbol(CElement);

impl CElement {
    pub fn as_project(&self) -> Option<Project> {
        (self.kind() == ElementKind::Project).then(|| Project(self.clone()))
    }

    pub fn as_folder(&self) -> Option<Folder> {
        (self.kind() == ElementKind::Folder).then(|| Folder(self.clone()))
    }

    pub fn as_translation_unit(&self) -> Option<TranslationUnit> {
        (self.kind() == ElementKind::TranslationUnit).then(|| TranslationUnit(self.clone()))
    }

    pub fn as_binary(&self) -> Option<Binary> {
        (self.kind() == ElementKind::Binary).then(|| Binary(self.clone()))
    }

    pub fn as_archive(&self) -> Option<Archive> {
        (self.kind() == ElementKind::Archive).then(|| Archive(self.clone()))
    }

    pub fn as_binary_module(&self) -> Option<BinaryModule> {
        (self.kind() == ElementKind::BinaryModule).then(|| BinaryModule(self.clone()))
    }

    pub fn as_binary_symbol(&self) -> Option<BinarySymbol> {
        matches!(self.kind(), ElementKind::Function | ElementKind::Variable)
            .then(|| BinarySymbol(self.clone()))
    }
}

impl ElementView for Project {
    fn element(&self) -> &CElement {
        &self.0
    }
}

impl ElementView for Folder {
    fn element(&self) -> &CElement {
        &self.0
    }
}

impl ElementView for TranslationUnit {
    fn element(&self) -> &CElement {
        &self.0
    }
}

impl ElementView for Binary {
    fn element(&self) -> &CElement {
        &self.0
    }
}

impl ElementView for Archive {
    fn element(&self) -> &CElement {
        &self.0
    }
}

impl ElementView for BinaryModule {
    fn element(&self) -> &CElement {
        &self.0
    }
}

impl ElementView for BinarySymbol {
    fn element(&self) -> &CElement {
        &self.0
    }
}

impl Parent for Project {}
impl Openable for Project {}
impl Parent for Folder {}
impl Openable for Folder {}
impl Openable for TranslationUnit {}
impl Parent for Binary {}
impl Openable for Binary {}
impl Parent for Archive {}
impl Openable for Archive {}
impl Parent for BinaryModule {}

fn non_c_resources(model: &ModelManager, element: &CElement) -> ModelResult<Vec<PathBuf>> {
    let info = model.element_info(element)?;
    let info = info.read();
    Ok(match &info.detail {
        InfoDetail::Container { non_c_resources } => non_c_resources.clone(),
        _ => Vec::new(),
    })
}

impl Project {
    pub fn root(&self) -> PathBuf {
        PathBuf::from(self.0.name())
    }

    pub fn binaries(&self, model: &ModelManager, wait: bool) -> ModelResult<Vec<Binary>> {
        Ok(model
            .binaries(&self.0, wait)?
            .iter()
            .filter_map(CElement::as_binary)
            .collect())
    }

    pub fn archives(&self, model: &ModelManager, wait: bool) -> ModelResult<Vec<Archive>> {
        Ok(model
            .archives(&self.0, wait)?
            .iter()
            .filter_map(CElement::as_archive)
            .collect())
    }

    /// Task of the project's binary runner, starting it if needed.
    pub fn binary_scan(&self, model: &ModelManager) -> ModelResult<ScanTask> {
        model.start_runner(&self.0)
    }

    pub fn non_c_resources(&self, model: &ModelManager) -> ModelResult<Vec<PathBuf>> {
        non_c_resources(model, &self.0)
    }
}

impl Folder {
    pub fn non_c_resources(&self, model: &ModelManager) -> ModelResult<Vec<PathBuf>> {
        non_c_resources(model, &self.0)
    }
}

impl TranslationUnit {
    pub fn is_header(&self) -> bool {
        self.0
            .name()
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext.to_ascii_lowercase().starts_with('h'))
    }
}

impl Binary {
    pub fn is_archive_member(&self) -> bool {
        self.0.is_archive_member()
    }

    pub fn detail(&self, model: &ModelManager) -> ModelResult<BinaryDetail> {
        let info = model.element_info(&self.0)?;
        let detail = info.read().binary_detail().cloned();
        detail.ok_or_else(|| {
            ModelError::status(
                StatusCode::InvalidElementTypes,
                Some(&self.0),
                "binary info carries no binary detail",
            )
        })
    }

    pub fn load_status(&self, model: &ModelManager) -> ModelResult<LoadStatus> {
        Ok(self.detail(model)?.status)
    }

    pub fn cpu(&self, model: &ModelManager) -> ModelResult<String> {
        Ok(self.detail(model)?.attributes.cpu)
    }

    pub fn needed_libraries(&self, model: &ModelManager) -> ModelResult<Vec<String>> {
        Ok(self.detail(model)?.needed)
    }

    pub fn soname(&self, model: &ModelManager) -> ModelResult<Option<String>> {
        Ok(self.detail(model)?.soname)
    }

    pub fn modules(&self, model: &ModelManager) -> ModelResult<Vec<BinaryModule>> {
        Ok(model
            .children(&self.0)?
            .iter()
            .filter_map(CElement::as_binary_module)
            .collect())
    }

    /// Functions directly under the binary and inside its modules.
    pub fn functions(&self, model: &ModelManager) -> ModelResult<Vec<BinarySymbol>> {
        self.symbols(model, ElementKind::Function)
    }

    pub fn variables(&self, model: &ModelManager) -> ModelResult<Vec<BinarySymbol>> {
        self.symbols(model, ElementKind::Variable)
    }

    fn symbols(&self, model: &ModelManager, kind: ElementKind) -> ModelResult<Vec<BinarySymbol>> {
        let mut symbols = Vec::new();
        for child in model.children(&self.0)? {
            if child.kind() == ElementKind::BinaryModule {
                symbols.extend(
                    model
                        .children(&child)?
                        .iter()
                        .filter(|c| c.kind() == kind)
                        .filter_map(CElement::as_binary_symbol),
                );
            } else if child.kind() == kind {
                symbols.extend(child.as_binary_symbol());
            }
        }
        Ok(symbols)
    }
}

impl Archive {
    pub fn members(&self, model: &ModelManager) -> ModelResult<Vec<Binary>> {
        Ok(model
            .children(&self.0)?
            .iter()
            .filter_map(CElement::as_binary)
            .collect())
    }

    pub fn load_status(&self, model: &ModelManager) -> ModelResult<LoadStatus> {
        let info = model.element_info(&self.0)?;
        let status = info.read().load_status().cloned();
        Ok(status.unwrap_or(LoadStatus::Complete))
    }
}

impl BinaryElement for BinaryModule {
    /// Lowest address among the module's symbols; `None` for a module
    /// without symbols.
    fn address(&self, model: &ModelManager) -> ModelResult<Option<u64>> {
        let mut lowest: Option<u64> = None;
        let children = model.children(&self.0)?;
        for symbol in children.iter().filter_map(CElement::as_binary_symbol) {
            if let Some(address) = symbol.address(model)? {
                lowest = Some(lowest.map_or(address, |l| l.min(address)));
            }
        }
        Ok(lowest)
    }
}

impl SourceReference for BinaryModule {
    fn source_file(&self, model: &ModelManager) -> ModelResult<Option<PathBuf>> {
        let info = model.element_info(&self.0)?;
        let info = info.read();
        Ok(match &info.detail {
            InfoDetail::Module { source_file } => Some(source_file.clone()),
            _ => None,
        })
    }
}

impl BinarySymbol {
    pub fn is_function(&self) -> bool {
        self.0.kind() == ElementKind::Function
    }

    pub fn symbol_info(&self, model: &ModelManager) -> ModelResult<SymbolInfo> {
        let info = model.element_info(&self.0)?;
        let symbol = info.read().symbol();
        symbol.ok_or_else(|| ModelError::does_not_exist(&self.0))
    }

    pub fn size(&self, model: &ModelManager) -> ModelResult<u64> {
        Ok(self.symbol_info(model)?.size)
    }

    pub fn is_local(&self, model: &ModelManager) -> ModelResult<bool> {
        Ok(self.symbol_info(model)?.local)
    }

    pub fn module(&self) -> Option<BinaryModule> {
        self.0.parent().and_then(CElement::as_binary_module)
    }
}

impl BinaryElement for BinarySymbol {
    fn address(&self, model: &ModelManager) -> ModelResult<Option<u64>> {
        Ok(Some(self.symbol_info(model)?.address))
    }
}

impl SourceReference for BinarySymbol {
    /// Source file of the enclosing module; symbols directly under a
    /// binary have none.
    fn source_file(&self, model: &ModelManager) -> ModelResult<Option<PathBuf>> {
        match self.module() {
            Some(module) => module.source_file(model),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary() -> CElement {
        CElement::model()
            .child("/p", ElementKind::Project)
            .child("app", ElementKind::Binary)
    }

    #[test]
    fn accessors_match_kinds() {
        let bin = binary();
        assert!(bin.as_binary().is_some());
        assert!(bin.as_archive().is_none());
        assert!(bin.child("f", ElementKind::Function).as_binary_symbol().is_some());
        assert!(bin.child("v", ElementKind::Variable).as_binary_symbol().is_some());
        assert!(bin.child("m.c", ElementKind::BinaryModule).as_binary_symbol().is_none());
    }

    #[test]
    fn symbols_find_their_binary_and_module() {
        let bin = binary();
        let module = bin.child("util.c", ElementKind::BinaryModule);
        let symbol = module.child("helper", ElementKind::Function);
        let view = symbol.as_binary_symbol().unwrap();

        assert_eq!(view.binary().map(|b| b.element().clone()), Some(bin.clone()));
        assert_eq!(view.module().map(|m| m.element().clone()), Some(module));
        assert!(view.is_function());

        let direct = bin.child("main", ElementKind::Function).as_binary_symbol().unwrap();
        assert!(direct.module().is_none());
    }

    #[test]
    fn headers_are_recognized_by_extension() {
        let project = CElement::model().child("/p", ElementKind::Project);
        let header = project.child("a.hpp", ElementKind::TranslationUnit);
        let source = project.child("a.cpp", ElementKind::TranslationUnit);
        assert!(header.as_translation_unit().unwrap().is_header());
        assert!(!source.as_translation_unit().unwrap().is_header());
    }
}
