//! Direct dependency detection through external introspection tools.
//!
//! Each binary format has its own tool and output shape:
//! - PE (Windows): `llvm-objdump -p`, import table lines `DLL Name: foo.dll`
//! - ELF (Linux): `readelf -d`, dynamic entries `(NEEDED) Shared library: [foo.so.1]`
//! - Mach-O (macOS): `otool -L`, one indented install name per load command
//!
//! Tools run with stdin closed and output captured into anonymous temp files,
//! so a chatty tool can never block on a full pipe while we poll for exit.

use crate::error::DetectionFailure;
use crate::filter::file_component;
use crate::types::Platform;
use regex::Regex;
use std::ffi::OsStr;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Signal number the terminal sends on Ctrl-C.
#[cfg(unix)]
const SIGINT: i32 = 2;

// ---------------------------------------------------------------------------
// DependencyDetector
// ---------------------------------------------------------------------------

pub trait DependencyDetector: Send + Sync {
    /// Names the binary declares as direct dynamic dependencies, in table order.
    fn detect(&self, binary: &Path) -> Result<Vec<String>, DetectionFailure>;

    /// Short tool name for log lines.
    fn tool_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// BinaryFormat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFormat {
    Pe,
    Elf,
    MachO,
}

impl BinaryFormat {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Windows => BinaryFormat::Pe,
            Platform::Linux => BinaryFormat::Elf,
            Platform::MacOs => BinaryFormat::MachO,
        }
    }

    /// Tools shipped inside the toolchain's own `bin/`, preferred first.
    pub fn bundled_tools(self) -> &'static [&'static str] {
        match self {
            BinaryFormat::Pe => &["llvm-objdump"],
            BinaryFormat::Elf => &["llvm-readelf"],
            BinaryFormat::MachO => &["llvm-otool"],
        }
    }

    /// Tools looked up on `PATH` when the toolchain has none.
    pub fn system_tools(self) -> &'static [&'static str] {
        match self {
            BinaryFormat::Pe => &["llvm-objdump", "objdump"],
            BinaryFormat::Elf => &["readelf", "llvm-readelf"],
            BinaryFormat::MachO => &["otool", "llvm-otool"],
        }
    }
}

/// Build the detector for `platform` around an already-resolved tool path.
/// `None` means no tool was found; every `detect` then reports `ToolMissing`.
pub fn detector_for(
    platform: Platform,
    tool: Option<PathBuf>,
    timeout: Duration,
) -> Box<dyn DependencyDetector> {
    match BinaryFormat::for_platform(platform) {
        BinaryFormat::Pe => Box::new(ObjdumpDetector { tool, timeout }),
        BinaryFormat::Elf => Box::new(ReadelfDetector { tool, timeout }),
        BinaryFormat::MachO => Box::new(OtoolDetector { tool, timeout }),
    }
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ObjdumpDetector {
    pub tool: Option<PathBuf>,
    pub timeout: Duration,
}

impl DependencyDetector for ObjdumpDetector {
    fn detect(&self, binary: &Path) -> Result<Vec<String>, DetectionFailure> {
        let tool = require_tool(self.tool.as_deref(), self.tool_name())?;
        let output = run_tool(tool, &[OsStr::new("-p"), binary.as_os_str()], self.timeout)?;
        parse_pe_imports(&output).ok_or_else(|| unparsable(tool, binary))
    }

    fn tool_name(&self) -> &str {
        "llvm-objdump"
    }
}

#[derive(Debug, Clone)]
pub struct ReadelfDetector {
    pub tool: Option<PathBuf>,
    pub timeout: Duration,
}

impl DependencyDetector for ReadelfDetector {
    fn detect(&self, binary: &Path) -> Result<Vec<String>, DetectionFailure> {
        let tool = require_tool(self.tool.as_deref(), self.tool_name())?;
        let output = run_tool(tool, &[OsStr::new("-d"), binary.as_os_str()], self.timeout)?;
        parse_elf_needed(&output).ok_or_else(|| unparsable(tool, binary))
    }

    fn tool_name(&self) -> &str {
        "readelf"
    }
}

#[derive(Debug, Clone)]
pub struct OtoolDetector {
    pub tool: Option<PathBuf>,
    pub timeout: Duration,
}

impl DependencyDetector for OtoolDetector {
    fn detect(&self, binary: &Path) -> Result<Vec<String>, DetectionFailure> {
        let tool = require_tool(self.tool.as_deref(), self.tool_name())?;
        let output = run_tool(tool, &[OsStr::new("-L"), binary.as_os_str()], self.timeout)?;
        let names = parse_macho_load_commands(&output).ok_or_else(|| unparsable(tool, binary))?;

        // A dylib lists its own install name first; drop it.
        let own_name = binary
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase());
        Ok(names
            .into_iter()
            .filter(|n| Some(file_component(&n.to_ascii_lowercase()).to_string()) != own_name)
            .collect())
    }

    fn tool_name(&self) -> &str {
        "otool"
    }
}

fn require_tool<'a>(tool: Option<&'a Path>, name: &str) -> Result<&'a Path, DetectionFailure> {
    tool.ok_or_else(|| DetectionFailure::ToolMissing {
        tool: name.to_string(),
    })
}

fn unparsable(tool: &Path, binary: &Path) -> DetectionFailure {
    DetectionFailure::Unparsable {
        tool: display_name(tool),
        path: binary.to_path_buf(),
    }
}

fn display_name(tool: &Path) -> String {
    tool.file_name()
        .unwrap_or(tool.as_os_str())
        .to_string_lossy()
        .into_owned()
}

// ---------------------------------------------------------------------------
// Process execution
// ---------------------------------------------------------------------------

/// Run `tool args…` and return its stdout, killing it once `timeout` elapses.
pub fn run_tool(tool: &Path, args: &[&OsStr], timeout: Duration) -> Result<String, DetectionFailure> {
    let name = display_name(tool);
    let spawn_err = |source: std::io::Error| DetectionFailure::Spawn {
        tool: name.clone(),
        source,
    };

    let mut stdout_file = tempfile::tempfile().map_err(spawn_err)?;
    let mut stderr_file = tempfile::tempfile().map_err(spawn_err)?;

    let mut child = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file.try_clone().map_err(spawn_err)?))
        .stderr(Stdio::from(stderr_file.try_clone().map_err(spawn_err)?))
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DetectionFailure::ToolMissing { tool: name.clone() }
            } else {
                spawn_err(e)
            }
        })?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait().map_err(spawn_err)? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DetectionFailure::Timeout {
                tool: name,
                timeout,
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    if killed_by_interrupt(&status) {
        return Err(DetectionFailure::Interrupted { tool: name });
    }

    let stdout = read_captured(&mut stdout_file).map_err(spawn_err)?;
    if !status.success() {
        let stderr = read_captured(&mut stderr_file).map_err(spawn_err)?;
        return Err(DetectionFailure::NonZeroExit {
            tool: name,
            status: status.to_string(),
            stderr: stderr.trim().chars().take(500).collect(),
        });
    }
    Ok(stdout)
}

fn read_captured(file: &mut std::fs::File) -> std::io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(unix)]
fn killed_by_interrupt(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(SIGINT)
}

#[cfg(not(unix))]
fn killed_by_interrupt(_status: &ExitStatus) -> bool {
    false
}

// ---------------------------------------------------------------------------
// Output parsers
// ---------------------------------------------------------------------------

static PE_IMPORT_RE: OnceLock<Regex> = OnceLock::new();
static ELF_NEEDED_RE: OnceLock<Regex> = OnceLock::new();

fn pe_import_re() -> &'static Regex {
    PE_IMPORT_RE.get_or_init(|| Regex::new(r"(?i)DLL Name:\s+(\S+)").unwrap())
}

fn elf_needed_re() -> &'static Regex {
    ELF_NEEDED_RE.get_or_init(|| Regex::new(r"\(?NEEDED\)?.*\[([^\]]+)\]").unwrap())
}

/// `llvm-objdump -p` output. Returns `None` when the output has no
/// `file format` header, i.e. the tool did not understand the file.
pub fn parse_pe_imports(output: &str) -> Option<Vec<String>> {
    if !output.to_ascii_lowercase().contains("file format") {
        return None;
    }
    Some(
        pe_import_re()
            .captures_iter(output)
            .map(|c| c[1].to_string())
            .collect(),
    )
}

/// `readelf -d` output. A file without a dynamic section is a clean,
/// empty result.
pub fn parse_elf_needed(output: &str) -> Option<Vec<String>> {
    if output.contains("There is no dynamic section") {
        return Some(Vec::new());
    }
    if !output.contains("Dynamic section") && !output.contains("DynamicSection") {
        return None;
    }
    Some(
        output
            .lines()
            .filter(|line| line.contains("NEEDED"))
            .filter_map(|line| elf_needed_re().captures(line))
            .map(|c| c[1].to_string())
            .collect(),
    )
}

/// `otool -L` output: a `path:` header (one per slice for fat binaries)
/// followed by indented `install-name (compatibility version …)` lines.
pub fn parse_macho_load_commands(output: &str) -> Option<Vec<String>> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next()?;
    if !header.trim_end().ends_with(':') {
        return None;
    }

    let mut names: Vec<String> = Vec::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.ends_with(':') {
            continue;
        }
        let name = match trimmed.find(" (") {
            Some(idx) => &trimmed[..idx],
            None => trimmed,
        };
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    Some(names)
}
