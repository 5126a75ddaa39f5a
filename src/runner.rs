//! Background discovery of a project's binaries and archives.
//!
//! Each project gets at most one [`BinaryRunner`]. Starting it more than
//! once returns the same [`ScanTask`]; callers choose between leaving the
//! task alone or blocking on [`ScanTask::wait`]. Found elements are listed
//! in the project's binary and archive containers as the walk completes.

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::element::{CElement, ElementKind};
use crate::manager::ModelManager;
use crate::scan::scan_binaries;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub binaries: usize,
    pub archives: usize,
    /// Found files that could not be placed in the model.
    pub skipped: usize,
    pub cancelled: bool,
    /// Set when the walk itself failed; the containers stay as they were.
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Default)]
struct TaskState {
    report: Mutex<Option<ScanReport>>,
    done: Condvar,
}

/// Handle on a runner's outcome. Clones observe the same task.
#[derive(Clone, Default)]
pub struct ScanTask {
    state: Arc<TaskState>,
}

impl ScanTask {
    fn complete(&self, report: ScanReport) {
        *self.state.report.lock() = Some(report);
        self.state.done.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.state.report.lock().is_some()
    }

    pub fn report(&self) -> Option<ScanReport> {
        self.state.report.lock().clone()
    }

    /// Blocks until the runner finished.
    pub fn wait(&self) -> ScanReport {
        let mut report = self.state.report.lock();
        loop {
            if let Some(done) = report.as_ref() {
                return done.clone();
            }
            self.state.done.wait(&mut report);
        }
    }

    /// Like [`Self::wait`], giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ScanReport> {
        let deadline = Instant::now() + timeout;
        let mut report = self.state.report.lock();
        while report.is_none() {
            if self.state.done.wait_until(&mut report, deadline).timed_out() {
                break;
            }
        }
        report.clone()
    }
}

pub struct BinaryRunner {
    project: CElement,
    started: AtomicBool,
    cancel: Arc<AtomicBool>,
    task: ScanTask,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BinaryRunner {
    pub fn new(project: CElement) -> Self {
        Self {
            project,
            started: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
            task: ScanTask::default(),
            handle: Mutex::new(None),
        }
    }

    pub fn project(&self) -> &CElement {
        &self.project
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn task(&self) -> ScanTask {
        self.task.clone()
    }

    /// Spawns the scan on first call; later calls only return the task.
    pub fn start(&self, manager: &ModelManager) -> ScanTask {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.task.clone();
        }

        let manager = manager.clone();
        let project = self.project.clone();
        let cancel = Arc::clone(&self.cancel);
        let task = self.task.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("cmodel-runner-{}", project.element_name()))
            .spawn(move || {
                let report = run_scan(&manager, &project, &cancel);
                task.complete(report);
            });

        match spawned {
            Ok(handle) => *self.handle.lock() = Some(handle),
            Err(e) => {
                warn!(project = %self.project.name(), error = %e, "failed to spawn binary runner");
                self.task.complete(ScanReport {
                    error: Some(e.to_string()),
                    ..ScanReport::default()
                });
            }
        }
        self.task.clone()
    }

    /// Cancels the scan and waits for the thread to exit. A runner stopped
    /// before it started completes its task as cancelled.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        if !self.started.swap(true, Ordering::SeqCst) {
            self.task.complete(ScanReport {
                cancelled: true,
                ..ScanReport::default()
            });
            return;
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!(project = %self.project.name(), "binary runner panicked");
        }
    }
}

fn run_scan(manager: &ModelManager, project: &CElement, cancel: &AtomicBool) -> ScanReport {
    let started = Instant::now();
    let mut report = ScanReport::default();

    let Some(root) = project.resource_path() else {
        report.error = Some(format!("{project} has no root directory"));
        return report;
    };

    let found = match scan_binaries(&root, manager.store(), manager.reader(), cancel) {
        Ok(found) => found,
        Err(e) => {
            warn!(project = %root.display(), error = %e, "binary scan failed");
            report.error = Some(e.to_string());
            report.duration_ms = started.elapsed().as_millis() as u64;
            return report;
        }
    };

    for binary in found {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let Some(element) = manager.create(&binary.path) else {
            report.skipped += 1;
            continue;
        };
        let kind = element.kind();
        if let Err(e) = manager.record_found(element) {
            debug!(path = %binary.path.display(), error = %e, "skipping found binary");
            report.skipped += 1;
            continue;
        }
        match kind {
            ElementKind::Binary => report.binaries += 1,
            ElementKind::Archive => report.archives += 1,
            _ => {}
        }
    }

    report.cancelled = cancel.load(Ordering::Relaxed);
    if !report.cancelled
        && let Err(e) = manager.mark_containers_known(project)
    {
        report.error = Some(e.to_string());
    }
    report.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        project = %root.display(),
        binaries = report.binaries,
        archives = report.archives,
        skipped = report.skipped,
        cancelled = report.cancelled,
        duration_ms = report.duration_ms,
        "binary scan finished"
    );
    report
}
