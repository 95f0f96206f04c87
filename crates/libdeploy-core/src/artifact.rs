//! Build-output classification: executables and shared libraries get their
//! runtime dependencies deployed; objects and archives never do.

use crate::error::{DeployError, Result};
use crate::types::Platform;
use serde::Serialize;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Executable,
    SharedLibrary,
    Object,
    StaticArchive,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Executable => "executable",
            ArtifactKind::SharedLibrary => "shared_library",
            ArtifactKind::Object => "object",
            ArtifactKind::StaticArchive => "static_archive",
        }
    }

    /// Whether this kind is loaded by the OS loader and so needs its runtime
    /// libraries next to it.
    pub fn is_linked_image(self) -> bool {
        matches!(self, ArtifactKind::Executable | ArtifactKind::SharedLibrary)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl Artifact {
    /// Classify `path` for `platform`, by extension first and by header
    /// bytes for extension-less outputs.
    pub fn inspect(path: &Path, platform: Platform) -> Result<Self> {
        if !path.is_file() {
            return Err(DeployError::BinaryNotFound(path.to_path_buf()));
        }
        let kind = match kind_from_extension(path, platform) {
            Some(kind) => kind,
            None => kind_from_header(path)?
                .ok_or_else(|| DeployError::UnknownBinaryType(path.to_path_buf()))?,
        };
        Ok(Self {
            path: path.to_path_buf(),
            kind,
        })
    }

    /// Directory the runtime libraries land in.
    pub fn output_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Infer the target platform from the file name or, failing that, the
/// image format. `None` for archives, objects and unknown content.
pub fn detect_platform(path: &Path) -> Result<Option<Platform>> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("exe") | Some("dll") => return Ok(Some(Platform::Windows)),
        Some("dylib") => return Ok(Some(Platform::MacOs)),
        Some("so") => return Ok(Some(Platform::Linux)),
        _ => {}
    }
    if !path.is_file() {
        return Err(DeployError::BinaryNotFound(path.to_path_buf()));
    }
    let header = read_header(path)?;
    let magic = header.get(..4).unwrap_or(&[]);
    let platform = if magic == ELF_MAGIC {
        Some(Platform::Linux)
    } else if magic == MACHO_FAT_MAGIC || MACHO_MAGICS.iter().any(|m| m == magic) {
        Some(Platform::MacOs)
    } else if header.starts_with(b"MZ") {
        Some(Platform::Windows)
    } else {
        None
    };
    Ok(platform)
}

fn kind_from_extension(path: &Path, platform: Platform) -> Option<ArtifactKind> {
    let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());

    match ext.as_deref() {
        Some("exe") => Some(ArtifactKind::Executable),
        Some("dll") | Some("dylib") => Some(ArtifactKind::SharedLibrary),
        Some("o") | Some("obj") => Some(ArtifactKind::Object),
        Some("a") | Some("lib") => Some(ArtifactKind::StaticArchive),
        Some("so") => Some(ArtifactKind::SharedLibrary),
        // libfoo.so.1.2
        _ if name.contains(".so.") && platform != Platform::Windows => {
            Some(ArtifactKind::SharedLibrary)
        }
        // Unknown suffixes (`app.debug`, `tool-1.2`) fall through to a
        // header check.
        _ => None,
    }
}

const ELF_MAGIC: &[u8] = b"\x7fELF";
const MACHO_MAGICS: &[[u8; 4]] = &[
    [0xfe, 0xed, 0xfa, 0xce],
    [0xfe, 0xed, 0xfa, 0xcf],
    [0xce, 0xfa, 0xed, 0xfe],
    [0xcf, 0xfa, 0xed, 0xfe],
];
const MACHO_FAT_MAGIC: [u8; 4] = [0xca, 0xfe, 0xba, 0xbe];
const AR_MAGIC: &[u8] = b"!<arch>\n";

// ELF e_type values
const ET_REL: u16 = 1;
const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;

// Mach-O filetype values
const MH_OBJECT: u32 = 0x1;
const MH_EXECUTE: u32 = 0x2;
const MH_DYLIB: u32 = 0x6;
const MH_BUNDLE: u32 = 0x8;

fn kind_from_header(path: &Path) -> Result<Option<ArtifactKind>> {
    Ok(classify_header(&read_header(path)?))
}

fn read_header(path: &Path) -> Result<Vec<u8>> {
    let mut header = [0u8; 64];
    let mut file = std::fs::File::open(path)?;
    let mut len = 0;
    while len < header.len() {
        let n = file.read(&mut header[len..])?;
        if n == 0 {
            break;
        }
        len += n;
    }
    Ok(header[..len].to_vec())
}

fn classify_header(header: &[u8]) -> Option<ArtifactKind> {
    if header.starts_with(AR_MAGIC) {
        return Some(ArtifactKind::StaticArchive);
    }
    if header.starts_with(ELF_MAGIC) {
        if header.len() < 18 {
            return None;
        }
        // EI_DATA: 1 little-endian, 2 big-endian
        let bytes = [header[16], header[17]];
        let e_type = if header[5] == 2 {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        };
        return match e_type {
            ET_REL => Some(ArtifactKind::Object),
            ET_EXEC => Some(ArtifactKind::Executable),
            // PIE executables are ET_DYN too; an extension-less ET_DYN is
            // far more often a program than a library.
            ET_DYN => Some(ArtifactKind::Executable),
            _ => None,
        };
    }
    if header.len() >= 4 {
        let magic = [header[0], header[1], header[2], header[3]];
        if magic == MACHO_FAT_MAGIC {
            return Some(ArtifactKind::Executable);
        }
        if MACHO_MAGICS.contains(&magic) {
            if header.len() < 16 {
                return None;
            }
            let raw = [header[12], header[13], header[14], header[15]];
            // feedface/feedfacf are big-endian headers
            let filetype = if magic[0] == 0xfe {
                u32::from_be_bytes(raw)
            } else {
                u32::from_le_bytes(raw)
            };
            return match filetype {
                MH_OBJECT => Some(ArtifactKind::Object),
                MH_EXECUTE => Some(ArtifactKind::Executable),
                MH_DYLIB | MH_BUNDLE => Some(ArtifactKind::SharedLibrary),
                _ => None,
            };
        }
    }
    if header.starts_with(b"MZ") {
        return Some(ArtifactKind::Executable);
    }
    None
}
