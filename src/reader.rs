//! Object file introspection.
//!
//! [`ObjectReader`] is the seam between the model and the binary formats.
//! [`ElfReader`] implements it for ELF objects and `ar` archives on top of
//! the `object` crate.

use object::elf;
use object::read::archive::ArchiveFile;
use object::read::elf::{Dyn, FileHeader};
use object::{
    Endianness, FileKind, Object, ObjectKind, ObjectSection, ObjectSymbol, SectionKind,
    SymbolKind as ObjSymbolKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryFormat {
    Object,
    Archive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryKind {
    Executable,
    SharedLibrary,
    Object,
    Core,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryAttributes {
    pub cpu: String,
    pub kind: BinaryKind,
    pub little_endian: bool,
    pub is_64: bool,
    pub has_debug: bool,
}

impl Default for BinaryAttributes {
    fn default() -> Self {
        Self {
            cpu: "unknown".to_string(),
            kind: BinaryKind::Unknown,
            little_endian: true,
            is_64: false,
            has_debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmentSizes {
    pub text: u64,
    pub data: u64,
    pub bss: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
    pub local: bool,
    pub address: u64,
    pub size: u64,
    /// Source file the symbol came from, when the object records it.
    pub source_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectImage {
    pub attributes: BinaryAttributes,
    pub segments: SegmentSizes,
    pub needed: Vec<String>,
    pub soname: Option<String>,
    pub symbols: Vec<SymbolEntry>,
    /// Recoverable problems met while reading; the rest of the image is valid.
    pub issues: Vec<String>,
}

impl ObjectImage {
    pub fn functions(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.symbols.iter().filter(|s| s.kind == SymbolKind::Function)
    }

    pub fn variables(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.symbols.iter().filter(|s| s.kind == SymbolKind::Variable)
    }
}

#[derive(Debug)]
pub struct ArchiveMember {
    pub name: String,
    pub image: Result<ObjectImage, ReadError>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("unrecognized object format")]
    UnknownFormat,
    #[error("malformed object: {0}")]
    Malformed(String),
}

impl From<object::Error> for ReadError {
    fn from(e: object::Error) -> Self {
        ReadError::Malformed(e.to_string())
    }
}

pub trait ObjectReader: Send + Sync {
    /// Cheap header check; `None` for anything that is not a supported binary.
    fn sniff(&self, data: &[u8]) -> Option<BinaryFormat>;

    fn read_object(&self, data: &[u8]) -> Result<ObjectImage, ReadError>;

    fn read_archive(&self, data: &[u8]) -> Result<Vec<ArchiveMember>, ReadError>;
}

/// ELF objects and `ar` archives of ELF members.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElfReader;

impl ElfReader {
    pub fn new() -> Self {
        Self
    }
}

impl ObjectReader for ElfReader {
    fn sniff(&self, data: &[u8]) -> Option<BinaryFormat> {
        if data.starts_with(&object::archive::MAGIC) {
            return Some(BinaryFormat::Archive);
        }
        match FileKind::parse(data).ok()? {
            FileKind::Elf32 | FileKind::Elf64 => Some(BinaryFormat::Object),
            FileKind::Archive => Some(BinaryFormat::Archive),
            _ => None,
        }
    }

    fn read_object(&self, data: &[u8]) -> Result<ObjectImage, ReadError> {
        let kind = FileKind::parse(data).map_err(|_| ReadError::UnknownFormat)?;
        let file = match kind {
            FileKind::Elf32 | FileKind::Elf64 => object::File::parse(data)?,
            _ => return Err(ReadError::UnknownFormat),
        };

        let mut image = ObjectImage {
            attributes: BinaryAttributes {
                cpu: cpu_name(file.architecture()),
                kind: match file.kind() {
                    ObjectKind::Executable => BinaryKind::Executable,
                    ObjectKind::Dynamic => BinaryKind::SharedLibrary,
                    ObjectKind::Relocatable => BinaryKind::Object,
                    ObjectKind::Core => BinaryKind::Core,
                    _ => BinaryKind::Unknown,
                },
                little_endian: file.is_little_endian(),
                is_64: file.is_64(),
                has_debug: file.has_debug_symbols(),
            },
            segments: segment_sizes(&file),
            ..ObjectImage::default()
        };

        image.symbols = symbols(&file);

        let dynamic = if kind == FileKind::Elf64 {
            dynamic_entries::<elf::FileHeader64<Endianness>>(data)
        } else {
            dynamic_entries::<elf::FileHeader32<Endianness>>(data)
        };
        match dynamic {
            Ok((needed, soname)) => {
                image.needed = needed;
                image.soname = soname;
            }
            Err(e) => image.issues.push(format!("dynamic section: {e}")),
        }

        Ok(image)
    }

    fn read_archive(&self, data: &[u8]) -> Result<Vec<ArchiveMember>, ReadError> {
        let archive = ArchiveFile::parse(data)?;
        let mut members = Vec::new();
        for member in archive.members() {
            let member = member?;
            let name = String::from_utf8_lossy(member.name())
                .trim_end_matches('/')
                .to_string();
            let image = member
                .data(data)
                .map_err(ReadError::from)
                .and_then(|bytes| self.read_object(bytes));
            members.push(ArchiveMember { name, image });
        }
        Ok(members)
    }
}

fn cpu_name(arch: object::Architecture) -> String {
    match arch {
        object::Architecture::X86_64 => "x86_64".to_string(),
        object::Architecture::I386 => "x86".to_string(),
        object::Architecture::Aarch64 => "aarch64".to_string(),
        object::Architecture::Arm => "arm".to_string(),
        object::Architecture::Riscv64 => "riscv64".to_string(),
        object::Architecture::Riscv32 => "riscv32".to_string(),
        object::Architecture::PowerPc => "ppc".to_string(),
        object::Architecture::PowerPc64 => "ppc64".to_string(),
        object::Architecture::Mips => "mips".to_string(),
        object::Architecture::Unknown => "unknown".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}

fn segment_sizes(file: &object::File<'_>) -> SegmentSizes {
    let mut sizes = SegmentSizes::default();
    for section in file.sections() {
        match section.kind() {
            SectionKind::Text
            | SectionKind::ReadOnlyData
            | SectionKind::ReadOnlyString => sizes.text += section.size(),
            SectionKind::Data | SectionKind::Tls => sizes.data += section.size(),
            SectionKind::UninitializedData | SectionKind::UninitializedTls => {
                sizes.bss += section.size()
            }
            _ => {}
        }
    }
    sizes
}

/// Defined function and variable symbols in symbol-table order. Local
/// symbols that follow an `STT_FILE` entry belong to that file.
fn symbols(file: &object::File<'_>) -> Vec<SymbolEntry> {
    let mut current_file: Option<String> = None;
    let mut entries = Vec::new();

    for symbol in file.symbols() {
        let Ok(name) = symbol.name() else { continue };
        let kind = match symbol.kind() {
            ObjSymbolKind::File => {
                current_file = (!name.is_empty()).then(|| name.to_string());
                continue;
            }
            ObjSymbolKind::Text => SymbolKind::Function,
            ObjSymbolKind::Data | ObjSymbolKind::Tls => SymbolKind::Variable,
            _ => continue,
        };
        if name.is_empty() || symbol.is_undefined() {
            continue;
        }

        let local = symbol.is_local();
        entries.push(SymbolEntry {
            name: name.to_string(),
            kind,
            local,
            address: symbol.address(),
            size: symbol.size(),
            source_file: if local { current_file.clone() } else { None },
        });
    }

    entries
}

fn dynamic_entries<Elf: FileHeader<Endian = Endianness>>(
    data: &[u8],
) -> object::Result<(Vec<String>, Option<String>)> {
    let header = Elf::parse(data)?;
    let endian = header.endian()?;
    let sections = header.sections(endian, data)?;

    let mut needed = Vec::new();
    let mut soname = None;
    let Some((entries, link)) = sections.dynamic(endian, data)? else {
        return Ok((needed, soname));
    };
    let strings = sections.strings(endian, data, link)?;

    for entry in entries {
        if !entry.is_string(endian) {
            continue;
        }
        let value = String::from_utf8_lossy(entry.string(endian, strings)?).to_string();
        match entry.tag32(endian) {
            Some(elf::DT_NEEDED) => needed.push(value),
            Some(elf::DT_SONAME) => soname = Some(value),
            _ => {}
        }
    }

    Ok((needed, soname))
}
