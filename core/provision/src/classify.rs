//! Execution-mode classification from binary platform headers.
//!
//! Only the first few hundred bytes of a file are read. Recognised formats:
//!
//! - PE (`MZ` stub, then `PE\0\0` and `IMAGE_FILE_MACHINE`)
//! - ELF (`e_machine`, either endianness)
//! - Mach-O, thin 32/64-bit and universal (fat) binaries
//!
//! Anything else, including scripts and unreadable files, is
//! [`ExecutionMode::Unknown`].

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::Serialize;

use crate::platform::{Arch, Host};

/// How a component runs on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Native,
    Emulated,
    Unknown,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::Emulated => "emulated",
            Self::Unknown => "unknown",
        })
    }
}

const PE_MACHINE_I386: u16 = 0x014c;
const PE_MACHINE_AMD64: u16 = 0x8664;
const PE_MACHINE_ARM64: u16 = 0xaa64;
const PE_MACHINE_ARM64EC: u16 = 0xa641;

const ELF_MACHINE_386: u16 = 0x03;
const ELF_MACHINE_X86_64: u16 = 0x3e;
const ELF_MACHINE_AARCH64: u16 = 0xb7;

const MACHO_MAGIC_32: u32 = 0xfeed_face;
const MACHO_MAGIC_64: u32 = 0xfeed_facf;
const MACHO_FAT_MAGIC: u32 = 0xcafe_babe;
const MACHO_FAT_MAGIC_64: u32 = 0xcafe_babf;
const MACHO_CPU_X86: u32 = 7;
const MACHO_CPU_X86_64: u32 = 0x0100_0007;
const MACHO_CPU_ARM64: u32 = 0x0100_000c;

/// Java class files share the fat magic; their version field is far larger
/// than any real slice count.
const MACHO_MAX_FAT_ARCHES: u32 = 20;

/// Classifies the component at `path` for `host`.
///
/// `None` means the component has no inspectable binary.
#[must_use]
pub fn classify(path: Option<&Path>, host: Host) -> ExecutionMode {
    let Some(arches) = path.and_then(binary_arches) else {
        return ExecutionMode::Unknown;
    };
    mode_for(&arches, host)
}

/// Maps the architectures a binary contains to an execution mode on `host`.
///
/// A recognised binary without a slice for the host architecture is
/// emulated whether or not the host ships a translation layer for it.
#[must_use]
pub fn mode_for(arches: &[Arch], host: Host) -> ExecutionMode {
    if arches.contains(&host.arch) {
        ExecutionMode::Native
    } else if arches.is_empty() {
        ExecutionMode::Unknown
    } else {
        ExecutionMode::Emulated
    }
}

/// Returns the architectures a binary is built for, or `None` if the file
/// cannot be read or has no recognised header.
#[must_use]
pub fn binary_arches(path: &Path) -> Option<Vec<Arch>> {
    let mut file = File::open(path).ok()?;
    let mut header = [0u8; 64];
    let len = read_up_to(&mut file, &mut header).ok()?;
    let header = &header[..len];

    if header.starts_with(b"MZ") {
        return pe_arch(&mut file, header).map(|arch| vec![arch]);
    }
    if header.starts_with(b"\x7fELF") {
        return elf_arch(header).map(|arch| vec![arch]);
    }
    if let Some(magic) = u32_be(header, 0)
        && (magic == MACHO_FAT_MAGIC || magic == MACHO_FAT_MAGIC_64)
    {
        return fat_arches(&mut file, header, magic == MACHO_FAT_MAGIC_64);
    }
    if let Some(magic) = u32_le(header, 0)
        && (magic == MACHO_MAGIC_32 || magic == MACHO_MAGIC_64)
    {
        return u32_le(header, 4)
            .and_then(macho_cpu)
            .map(|arch| vec![arch]);
    }
    None
}

fn pe_arch(file: &mut File, header: &[u8]) -> Option<Arch> {
    let pe_offset = u32_le(header, 0x3c)?;
    file.seek(SeekFrom::Start(u64::from(pe_offset))).ok()?;
    let mut signature = [0u8; 6];
    file.read_exact(&mut signature).ok()?;
    if &signature[..4] != b"PE\0\0" {
        return None;
    }
    match u16::from_le_bytes([signature[4], signature[5]]) {
        PE_MACHINE_AMD64 => Some(Arch::X64),
        PE_MACHINE_ARM64 | PE_MACHINE_ARM64EC => Some(Arch::Arm64),
        PE_MACHINE_I386 => Some(Arch::X86),
        _ => None,
    }
}

fn elf_arch(header: &[u8]) -> Option<Arch> {
    let bytes = [*header.get(0x12)?, *header.get(0x13)?];
    let machine = match header.get(5)? {
        1 => u16::from_le_bytes(bytes),
        2 => u16::from_be_bytes(bytes),
        _ => return None,
    };
    match machine {
        ELF_MACHINE_X86_64 => Some(Arch::X64),
        ELF_MACHINE_AARCH64 => Some(Arch::Arm64),
        ELF_MACHINE_386 => Some(Arch::X86),
        _ => None,
    }
}

fn fat_arches(file: &mut File, header: &[u8], wide: bool) -> Option<Vec<Arch>> {
    let count = u32_be(header, 4)?;
    if count == 0 || count >= MACHO_MAX_FAT_ARCHES {
        return None;
    }
    let entry_len: usize = if wide { 32 } else { 20 };
    let table_len = entry_len * count as usize;

    let mut table = vec![0u8; table_len];
    file.seek(SeekFrom::Start(8)).ok()?;
    file.read_exact(&mut table).ok()?;

    let arches: Vec<Arch> = table
        .chunks_exact(entry_len)
        .filter_map(|entry| u32_be(entry, 0).and_then(macho_cpu))
        .collect();
    (!arches.is_empty()).then_some(arches)
}

fn macho_cpu(cputype: u32) -> Option<Arch> {
    match cputype {
        MACHO_CPU_X86_64 => Some(Arch::X64),
        MACHO_CPU_ARM64 => Some(Arch::Arm64),
        MACHO_CPU_X86 => Some(Arch::X86),
        _ => None,
    }
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn u32_le(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(slice.try_into().ok()?))
}

fn u32_be(bytes: &[u8], offset: usize) -> Option<u32> {
    let slice = bytes.get(offset..offset + 4)?;
    Some(u32::from_be_bytes(slice.try_into().ok()?))
}
