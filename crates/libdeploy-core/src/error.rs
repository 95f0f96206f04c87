use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("unsupported architecture: {0}")]
    UnsupportedArch(String),

    #[error("binary not found: {0}")]
    BinaryNotFound(PathBuf),

    #[error("cannot determine binary type for {0}: expected .exe, .dll, .so, .dylib or an ELF/Mach-O/PE image")]
    UnknownBinaryType(PathBuf),

    #[error("toolchain root not found: pass --toolchain or set LIBDEPLOY_TOOLCHAIN")]
    ToolchainNotFound,

    #[error("toolchain root is not a directory: {0}")]
    ToolchainRootMissing(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, DeployError>;

/// Why an introspection tool could not produce a dependency list.
///
/// A clean run that lists no dependencies is not a failure.
#[derive(Debug, Error)]
pub enum DetectionFailure {
    #[error("{tool} not found")]
    ToolMissing { tool: String },

    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    NonZeroExit {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {}s", timeout.as_secs())]
    Timeout { tool: String, timeout: Duration },

    #[error("unparsable {tool} output for {}", path.display())]
    Unparsable { tool: String, path: PathBuf },

    #[error("{tool} was interrupted")]
    Interrupted { tool: String },
}

impl DetectionFailure {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, DetectionFailure::Interrupted { .. })
    }
}

/// A user-level interrupt observed mid-deployment.
///
/// This is the only failure the orchestrator hands back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deployment interrupted")]
pub struct Interrupted;
