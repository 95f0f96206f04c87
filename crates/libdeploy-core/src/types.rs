use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    Linux,
    #[serde(rename = "darwin", alias = "macos")]
    MacOs,
}

impl Platform {
    /// The platform this process is running on, if deployment supports it.
    pub fn current() -> Option<Platform> {
        if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Platform::MacOs)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::MacOs => "darwin",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = crate::error::DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" | "win32" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "darwin" | "macos" => Ok(Platform::MacOs),
            _ => Err(crate::error::DeployError::UnsupportedPlatform(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Arch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub fn current() -> Arch {
        if cfg!(target_arch = "aarch64") {
            Arch::Aarch64
        } else {
            Arch::X86_64
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = crate::error::DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Ok(Arch::X86_64),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            _ => Err(crate::error::DeployError::UnsupportedArch(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    DeployableRuntime,
    DeployableSanitizer,
    ExcludedSystem,
}

impl Classification {
    pub fn is_deployable(self) -> bool {
        !matches!(self, Classification::ExcludedSystem)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::DeployableRuntime => "deployable-runtime",
            Classification::DeployableSanitizer => "deployable-sanitizer",
            Classification::ExcludedSystem => "excluded-system",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ResolvedLibrary
// ---------------------------------------------------------------------------

/// A dependency name paired with where it lives in the toolchain, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLibrary {
    pub name: String,
    pub source: Option<PathBuf>,
}

impl ResolvedLibrary {
    pub fn is_missing(&self) -> bool {
        self.source.is_none()
    }
}

// ---------------------------------------------------------------------------
// DeploymentOutcome / DeploymentSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum DeploymentOutcome {
    Deployed,
    SkippedUpToDate,
    SkippedConcurrentRace,
    Missing,
    Failed(String),
}

impl DeploymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentOutcome::Deployed => "deployed",
            DeploymentOutcome::SkippedUpToDate => "up-to-date",
            DeploymentOutcome::SkippedConcurrentRace => "concurrent",
            DeploymentOutcome::Missing => "missing",
            DeploymentOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for DeploymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Why an invocation stopped at the guard without touching the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardSkip {
    Disabled,
    PlatformMismatch,
    ArtifactMissing,
    NotDeployableKind,
    SharedLibraryDisabled,
    SystemRuntime,
}

impl GuardSkip {
    pub fn as_str(self) -> &'static str {
        match self {
            GuardSkip::Disabled => "deployment disabled",
            GuardSkip::PlatformMismatch => "platform mismatch",
            GuardSkip::ArtifactMissing => "artifact not found",
            GuardSkip::NotDeployableKind => "not an executable or shared library",
            GuardSkip::SharedLibraryDisabled => "shared-library deployment disabled",
            GuardSkip::SystemRuntime => "build targets the system runtime",
        }
    }
}

impl fmt::Display for GuardSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryReport {
    pub name: String,
    pub source: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub outcome: DeploymentOutcome,
}

/// Counts for one `deploy_all` call; logged, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentSummary {
    pub deployed: usize,
    pub up_to_date: usize,
    pub raced: usize,
    pub missing: usize,
    pub failed: usize,
    pub used_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<GuardSkip>,
    pub libraries: Vec<LibraryReport>,
}

impl DeploymentSummary {
    pub fn skipped(reason: GuardSkip) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn record(&mut self, report: LibraryReport) {
        match &report.outcome {
            DeploymentOutcome::Deployed => self.deployed += 1,
            DeploymentOutcome::SkippedUpToDate => self.up_to_date += 1,
            DeploymentOutcome::SkippedConcurrentRace => self.raced += 1,
            DeploymentOutcome::Missing => self.missing += 1,
            DeploymentOutcome::Failed(_) => self.failed += 1,
        }
        self.libraries.push(report);
    }

    pub fn total(&self) -> usize {
        self.libraries.len()
    }
}

impl fmt::Display for DeploymentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reason) = self.skipped {
            return write!(f, "skipped ({reason})");
        }
        write!(
            f,
            "{} deployed, {} up-to-date, {} concurrent, {} missing, {} failed",
            self.deployed,
            self.up_to_date,
            self.raced,
            self.missing,
            self.failed
        )?;
        if self.used_fallback {
            f.write_str(" (fallback list)")?;
        }
        Ok(())
    }
}
