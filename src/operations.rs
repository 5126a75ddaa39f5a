//! Copy, move and delete over several file-level elements.
//!
//! Elements are verified and processed one at a time, in order. The first
//! failure aborts the whole operation and is returned; elements processed
//! before it stay changed.

use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::element::CElement;
use crate::error::{ModelError, ModelResult, StatusCode};
use crate::manager::ModelManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
}

impl OperationKind {
    fn needs_destination(&self) -> bool {
        !matches!(self, OperationKind::Delete)
    }

    fn modifies_source(&self) -> bool {
        !matches!(self, OperationKind::Copy)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationReport {
    /// Source elements, in processing order.
    pub processed: Vec<CElement>,
    /// Elements created at the destination by copy and move.
    pub created: Vec<CElement>,
}

impl ModelManager {
    /// Copies each element into `destination`, named after `renames[i]`
    /// when given. Existing targets are replaced only with `force`.
    pub fn copy_elements(
        &self,
        elements: &[CElement],
        destination: &CElement,
        renames: Option<&[String]>,
        force: bool,
    ) -> ModelResult<OperationReport> {
        self.run_operation(OperationKind::Copy, elements, Some(destination), renames, force)
    }

    pub fn move_elements(
        &self,
        elements: &[CElement],
        destination: &CElement,
        renames: Option<&[String]>,
        force: bool,
    ) -> ModelResult<OperationReport> {
        self.run_operation(OperationKind::Move, elements, Some(destination), renames, force)
    }

    pub fn delete_elements(&self, elements: &[CElement]) -> ModelResult<OperationReport> {
        self.run_operation(OperationKind::Delete, elements, None, None, false)
    }

    fn run_operation(
        &self,
        kind: OperationKind,
        elements: &[CElement],
        destination: Option<&CElement>,
        renames: Option<&[String]>,
        force: bool,
    ) -> ModelResult<OperationReport> {
        let mut report = OperationReport::default();
        for (index, element) in elements.iter().enumerate() {
            let new_name = renames
                .and_then(|names| names.get(index))
                .cloned()
                .unwrap_or_else(|| element.name().to_string());
            let step = self.verify(kind, element, destination, &new_name, force)?;
            let created = self.execute(kind, element, step)?;

            debug!(operation = ?kind, element = ?element, "processed");
            report.processed.push(element.clone());
            report.created.extend(created);
        }
        info!(
            operation = ?kind,
            processed = report.processed.len(),
            "multi-element operation finished"
        );
        Ok(report)
    }

    fn verify(
        &self,
        kind: OperationKind,
        element: &CElement,
        destination: Option<&CElement>,
        new_name: &str,
        force: bool,
    ) -> ModelResult<Step> {
        if !self.exists(element) {
            return Err(ModelError::does_not_exist(element));
        }
        let source = element.resource_path();

        if kind.modifies_source()
            && let Some(path) = &source
            && self
                .store()
                .is_read_only(path)
                .map_err(|e| ModelError::io(path, e))?
        {
            return Err(ModelError::status(
                StatusCode::ReadOnly,
                Some(element),
                format!("{element} is read-only"),
            ));
        }

        let target = match destination.filter(|_| kind.needs_destination()) {
            Some(destination) => {
                let folder = destination
                    .resource_path()
                    .filter(|_| destination.kind().is_container() && self.exists(destination))
                    .ok_or_else(|| {
                        ModelError::status(
                            StatusCode::InvalidDestination,
                            Some(destination),
                            format!("{destination} cannot receive elements"),
                        )
                    })?;
                if !is_plain_name(new_name) {
                    return Err(ModelError::status(
                        StatusCode::InvalidPath,
                        Some(element),
                        format!("{new_name:?} is not a file name"),
                    ));
                }
                let path = folder.join(new_name);
                // Forcing onto the source itself would truncate it.
                if source.as_ref() == Some(&path) {
                    return Err(ModelError::status(
                        StatusCode::NameCollision,
                        Some(element),
                        format!("{element} cannot replace itself"),
                    ));
                }
                if !force && self.store().exists(&path) {
                    return Err(ModelError::status(
                        StatusCode::NameCollision,
                        Some(element),
                        format!("{new_name} already exists in {destination}"),
                    ));
                }
                Some((destination.child(new_name, element.kind()), path))
            }
            None if kind.needs_destination() => {
                return Err(ModelError::status(
                    StatusCode::InvalidDestination,
                    Some(element),
                    "no destination given",
                ));
            }
            None => None,
        };

        if !element.kind().is_file() || element.is_archive_member() {
            return Err(ModelError::status(
                StatusCode::InvalidElementTypes,
                Some(element),
                format!("cannot {kind:?} {element}").to_lowercase(),
            ));
        }
        let source = source.ok_or_else(|| ModelError::does_not_exist(element))?;
        Ok(Step { source, target })
    }

    fn execute(
        &self,
        kind: OperationKind,
        element: &CElement,
        step: Step,
    ) -> ModelResult<Option<CElement>> {
        let Step { source, target } = step;
        let created = match (kind, target) {
            (OperationKind::Copy, Some((created, path))) => {
                self.store()
                    .copy_file(&source, &path)
                    .map_err(|e| ModelError::io(&path, e))?;
                Some(created)
            }
            (OperationKind::Move, Some((created, path))) => {
                self.store()
                    .rename(&source, &path)
                    .map_err(|e| ModelError::io(&path, e))?;
                Some(created)
            }
            (OperationKind::Delete, _) => {
                self.store()
                    .remove_file(&source)
                    .map_err(|e| ModelError::io(&source, e))?;
                None
            }
            (_, None) => None,
        };

        if kind.modifies_source() {
            self.forget_file(element);
            self.release(element);
        }
        if let Some(created) = &created {
            // A forced copy may have replaced a file that was open.
            self.release(created);
            self.note_file(created);
        }
        Ok(created)
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.ends_with(std::path::MAIN_SEPARATOR)
}

struct Step {
    source: PathBuf,
    target: Option<(CElement, PathBuf)>,
}
