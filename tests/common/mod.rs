#![allow(dead_code)]

use object::write::{Object, SectionId, StandardSection, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "cmodel_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

pub fn write_file(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Symbols of a test object. `file` names the source of the `locals`.
#[derive(Default)]
pub struct ObjectSymbols<'a> {
    pub file: Option<&'a str>,
    pub locals: &'a [&'a str],
    pub functions: &'a [&'a str],
    pub variables: &'a [&'a str],
}

fn add_symbol(
    obj: &mut Object<'_>,
    name: &str,
    kind: SymbolKind,
    scope: SymbolScope,
    section: SectionId,
    value: u64,
) {
    obj.add_symbol(Symbol {
        name: name.as_bytes().to_vec(),
        value,
        size: 4,
        kind,
        scope,
        weak: false,
        section: SymbolSection::Section(section),
        flags: SymbolFlags::None,
    });
}

pub fn elf_object(symbols: &ObjectSymbols<'_>) -> anyhow::Result<Vec<u8>> {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = obj.section_id(StandardSection::Text);
    let data = obj.section_id(StandardSection::Data);
    obj.append_section_data(text, &[0xc3; 64], 16);
    obj.append_section_data(data, &[0u8; 32], 8);

    let mut offset = 0;
    if let Some(file) = symbols.file {
        obj.add_file_symbol(file.as_bytes().to_vec());
    }
    for name in symbols.locals {
        add_symbol(&mut obj, name, SymbolKind::Text, SymbolScope::Compilation, text, offset);
        offset += 4;
    }
    for name in symbols.functions {
        add_symbol(&mut obj, name, SymbolKind::Text, SymbolScope::Linkage, text, offset);
        offset += 4;
    }
    for (i, name) in symbols.variables.iter().enumerate() {
        add_symbol(&mut obj, name, SymbolKind::Data, SymbolScope::Linkage, data, i as u64 * 4);
    }
    Ok(obj.write()?)
}

/// System V `ar` archive with short member names.
pub fn ar_archive(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut out = b"!<arch>\n".to_vec();
    for (name, data) in members {
        let header = format!(
            "{:<16}{:<12}{:<6}{:<6}{:<8}{:<10}`\n",
            format!("{name}/"),
            0,
            0,
            0,
            644,
            data.len()
        );
        assert_eq!(header.len(), 60);
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(data);
        if data.len() % 2 == 1 {
            out.push(b'\n');
        }
    }
    out
}

pub fn app_object() -> anyhow::Result<Vec<u8>> {
    elf_object(&ObjectSymbols {
        file: Some("util.c"),
        locals: &["helper"],
        functions: &["main"],
        variables: &["counter"],
    })
}

pub fn member_object(prefix: &str) -> anyhow::Result<Vec<u8>> {
    let functions: Vec<String> = (1..=3).map(|i| format!("{prefix}_f{i}")).collect();
    let functions: Vec<&str> = functions.iter().map(String::as_str).collect();
    let variable = format!("{prefix}_v");
    elf_object(&ObjectSymbols {
        functions: &functions,
        variables: &[variable.as_str()],
        ..ObjectSymbols::default()
    })
}

/// src/main.c, build/app (ELF), lib/libutil.a (two members), README.
pub fn sample_project(name: &str) -> anyhow::Result<PathBuf> {
    let base = temp_dir(name);
    write_file(&base.join("src/main.c"), b"int main(void) { return 0; }")?;
    write_file(&base.join("src/util.h"), b"#pragma once")?;
    write_file(&base.join("build/app"), &app_object()?)?;
    write_file(
        &base.join("lib/libutil.a"),
        &ar_archive(&[("a.o", member_object("a")?), ("b.o", member_object("b")?)]),
    )?;
    write_file(&base.join("README"), b"sample")?;
    Ok(base)
}
