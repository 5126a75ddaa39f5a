mod common;

use cmodel::config::ModelConfig;
use cmodel::element::{CElement, ElementKind};
use cmodel::error::StatusCode;
use cmodel::info::LoadStatus;
use cmodel::manager::ModelManager;
use cmodel::reader::{BinaryKind, ElfReader};
use cmodel::store::FsStore;
use cmodel::view::{BinaryElement, ElementView, Openable, Parent, SourceReference};
use common::{ObjectSymbols, app_object, elf_object, sample_project, write_file};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

fn touch(path: &Path, secs: u64) -> anyhow::Result<()> {
    std::fs::File::open(path)?.set_modified(UNIX_EPOCH + Duration::from_secs(secs))?;
    Ok(())
}

fn model(capacity: usize, overflow: usize) -> ModelManager {
    ModelManager::new(
        ModelConfig {
            openable_capacity: capacity,
            openable_overflow: overflow,
        },
        Arc::new(FsStore::new()),
        Arc::new(ElfReader::new()),
    )
}

fn names(elements: &[CElement]) -> HashSet<String> {
    elements.iter().map(|e| e.name().to_string()).collect()
}

#[test]
fn project_tree_lists_sources_binaries_and_archives() -> anyhow::Result<()> {
    let base = sample_project("tree")?;
    let model = model(500, 50);
    let project = model.add_project(&base)?;

    let children = model.children(&project)?;
    assert_eq!(names(&children), HashSet::from(["build".into(), "lib".into(), "src".into()]));
    let view = project.as_project().unwrap();
    assert_eq!(view.non_c_resources(&model)?, vec![base.join("README")]);

    let build = project.child("build", ElementKind::Folder);
    let lib = project.child("lib", ElementKind::Folder);
    assert_eq!(
        model.children(&build)?,
        vec![build.child("app", ElementKind::Binary)]
    );
    assert_eq!(
        model.children(&lib)?,
        vec![lib.child("libutil.a", ElementKind::Archive)]
    );

    let header = project
        .child("src", ElementKind::Folder)
        .child("util.h", ElementKind::TranslationUnit);
    assert!(model.exists(&header));
    assert!(header.as_translation_unit().unwrap().is_header());

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn binary_structure_is_read_from_the_symbol_table() -> anyhow::Result<()> {
    let base = sample_project("binary")?;
    let model = model(500, 50);
    let project = model.add_project(&base)?;
    let app = model
        .create(base.join("build/app"))
        .and_then(|e| e.as_binary())
        .unwrap();

    assert!(!app.is_open(&model));
    let detail = app.detail(&model)?;
    assert!(app.is_open(&model));
    assert_eq!(detail.attributes.cpu, "x86_64");
    assert_eq!(detail.attributes.kind, BinaryKind::Object);
    assert_eq!(detail.status, LoadStatus::Complete);
    assert_eq!(app.path(), Some(base.join("build/app")));

    let functions = app.functions(&model)?;
    let function_names: HashSet<_> = functions
        .iter()
        .map(|f| f.element().name().to_string())
        .collect();
    assert_eq!(function_names, HashSet::from(["main".into(), "helper".into()]));
    assert_eq!(app.variables(&model)?.len(), 1);

    let modules = app.modules(&model)?;
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].source_file(&model)?, Some(PathBuf::from("util.c")));
    assert_eq!(modules[0].children(&model)?.len(), 1);

    let helper = functions
        .iter()
        .find(|f| f.element().name() == "helper")
        .unwrap();
    assert!(helper.is_local(&model)?);
    assert!(helper.module().is_some());
    assert_eq!(helper.binary(), Some(app.clone()));
    assert!(helper.address(&model)?.is_some());
    assert_eq!(modules[0].address(&model)?, helper.address(&model)?);

    let main = functions.iter().find(|f| f.element().name() == "main").unwrap();
    assert!(!main.is_local(&model)?);
    assert_eq!(main.size(&model)?, 4);
    assert_eq!(main.element().project(), Some(project));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn archive_members_become_binaries_with_their_symbols() -> anyhow::Result<()> {
    let base = sample_project("archive")?;
    let model = model(500, 50);
    model.add_project(&base)?;
    let archive = model
        .create(base.join("lib/libutil.a"))
        .and_then(|e| e.as_archive())
        .unwrap();

    let members = archive.members(&model)?;
    let member_names: HashSet<_> = members
        .iter()
        .map(|m| m.element().name().to_string())
        .collect();
    assert_eq!(member_names, HashSet::from(["a.o".into(), "b.o".into()]));
    assert_eq!(archive.load_status(&model)?, LoadStatus::Complete);

    for member in &members {
        assert!(member.is_archive_member());
        assert_eq!(member.path(), archive.path());
        assert_eq!(member.children(&model)?.len(), 4);
        assert_eq!(member.functions(&model)?.len(), 3);
        assert_eq!(member.variables(&model)?.len(), 1);
        assert_eq!(member.cpu(&model)?, "x86_64");
    }

    // Members are dropped with their archive and come back on demand.
    archive.close(&model);
    assert!(!model.is_structure_known(members[0].element()));
    assert_eq!(members[0].children(&model)?.len(), 4);

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn runner_finds_binaries_and_archives_in_the_whole_project() -> anyhow::Result<()> {
    let base = sample_project("runner")?;
    write_file(&base.join(".hidden/ghost"), &app_object()?)?;
    let model = model(500, 50);
    let project = model.add_project(&base)?;

    let binaries = model.binaries(&project, true)?;
    assert_eq!(
        binaries,
        vec![project
            .child("build", ElementKind::Folder)
            .child("app", ElementKind::Binary)]
    );
    let archives = model.archives(&project, true)?;
    assert_eq!(
        archives,
        vec![project
            .child("lib", ElementKind::Folder)
            .child("libutil.a", ElementKind::Archive)]
    );

    let view = project.as_project().unwrap();
    let task = view.binary_scan(&model)?;
    assert!(task.is_finished());
    let report = task.wait();
    assert_eq!(report.binaries, 1);
    assert_eq!(report.archives, 1);
    assert!(!report.cancelled);
    assert!(report.error.is_none());

    let container = project.binary_container().unwrap();
    assert!(model.is_structure_known(&container));
    assert_eq!(model.children(&container)?, binaries);

    model.shutdown();
    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn rewritten_binary_is_reloaded_and_removed_binary_vanishes() -> anyhow::Result<()> {
    let base = sample_project("stale")?;
    let path = base.join("build/app");
    touch(&path, 1_000)?;

    let model = model(500, 50);
    model.add_project(&base)?;
    let app = model.create(&path).unwrap();
    assert_eq!(model.children(&app)?.len(), 3);
    let info = model.element_info(&app)?;

    let rewritten = elf_object(&ObjectSymbols {
        functions: &["main", "run", "stop"],
        ..ObjectSymbols::default()
    })?;
    std::fs::write(&path, rewritten)?;
    touch(&path, 2_000)?;

    let children = model.children(&app)?;
    assert_eq!(names(&children), HashSet::from(["main".into(), "run".into(), "stop".into()]));
    assert!(Arc::ptr_eq(&info, &model.element_info(&app)?));
    let stale_module = app.child("util.c", ElementKind::BinaryModule);
    assert!(!model.exists(&stale_module));

    std::fs::remove_file(&path)?;
    let err = model.children(&app).unwrap_err();
    assert_eq!(err.code(), StatusCode::ElementDoesNotExist);
    assert_eq!(err.code().code(), 969);
    assert!(!model.exists(&app));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn small_cache_evicts_files_together_with_their_symbols() -> anyhow::Result<()> {
    let base = sample_project("evict")?;
    let model = model(1, 0);
    let project = model.add_project(&base)?;
    let app = model.create(base.join("build/app")).unwrap();
    let main_c = model.create(base.join("src/main.c")).unwrap();

    model.children(&app)?;
    assert_eq!(model.cache_stats().openables, 1);
    assert_eq!(model.cache_stats().children, 4);

    model.element_info(&main_c)?;
    let stats = model.cache_stats();
    assert_eq!(stats.openables, 1);
    assert_eq!(stats.children, 0);
    assert!(!model.is_structure_known(&app));
    assert!(model.cached_elements().contains(&main_c));

    // Evicted elements reopen transparently.
    let symbols = model.children(&app)?;
    assert_eq!(symbols.len(), 3);
    assert!(model.exists(&project));

    let _ = std::fs::remove_dir_all(base);
    Ok(())
}

#[test]
fn moved_binary_follows_into_the_project_container() -> anyhow::Result<()> {
    let base = sample_project("move")?;
    std::fs::create_dir_all(base.join("dist"))?;
    let model = model(500, 50);
    let project = model.add_project(&base)?;
    let app = model.create(base.join("build/app")).unwrap();
    let dist = project.child("dist", ElementKind::Folder);
    assert_eq!(model.binaries(&project, true)?, vec![app.clone()]);

    let report = model.move_elements(&[app.clone()], &dist, None, false)?;
    let moved = dist.child("app", ElementKind::Binary);
    assert_eq!(report.processed, vec![app.clone()]);
    assert_eq!(report.created, vec![moved.clone()]);
    assert!(base.join("dist/app").exists());
    assert!(!base.join("build/app").exists());
    assert_eq!(model.binaries(&project, false)?, vec![moved.clone()]);
    assert_eq!(model.children(&moved)?.len(), 3);

    model.delete_elements(&[moved.clone()])?;
    assert!(model.binaries(&project, false)?.is_empty());
    assert!(!model.exists(&moved));

    model.shutdown();
    let _ = std::fs::remove_dir_all(base);
    Ok(())
}
