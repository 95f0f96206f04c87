//! Per-platform deployment driver: GUARD → SCANNING → DEPLOYING → DONE.
//!
//! Nothing here fails the build. Guard misses end the call with no side
//! effects, detection failures fall back to a fixed runtime set, and
//! per-library problems are counted and logged. Only an interrupt reaches
//! the caller.

use crate::artifact::{Artifact, ArtifactKind};
use crate::config::{DeployConfig, DEFAULT_TOOL_TIMEOUT};
use crate::deploy::{AtomicDeployer, LinkStrategy};
use crate::detect::{detector_for, DependencyDetector};
use crate::error::{DeployError, Interrupted};
use crate::filter::{file_component, DependencyFilter};
use crate::layout::ToolchainLayout;
use crate::locate::LibraryLocator;
use crate::scan::{TransitiveScanner, MAX_LIBRARIES};
use crate::types::{
    Arch, DeploymentOutcome, DeploymentSummary, GuardSkip, LibraryReport, Platform,
    ResolvedLibrary,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Fallback sets
// ---------------------------------------------------------------------------

const WINDOWS_FALLBACK: &[&str] = &[
    "libwinpthread-1.dll",
    "libgcc_s_seh-1.dll",
    "libstdc++-6.dll",
];
const LINUX_FALLBACK: &[&str] = &["libc++.so.1", "libc++abi.so.1", "libunwind.so.1"];
const MACOS_FALLBACK: &[&str] = &["libc++.1.dylib", "libc++abi.1.dylib", "libunwind.1.dylib"];

/// Libraries deployed when the artifact itself cannot be introspected.
pub fn fallback_libraries(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Windows => WINDOWS_FALLBACK,
        Platform::Linux => LINUX_FALLBACK,
        Platform::MacOs => MACOS_FALLBACK,
    }
}

// ---------------------------------------------------------------------------
// Request / plan
// ---------------------------------------------------------------------------

/// What the compiler wrapper knows about one finished link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    pub artifact: PathBuf,
    pub platform: Platform,
    pub arch: Arch,
    /// The link used the bundled runtime rather than the host's system ABI.
    pub managed_runtime: bool,
}

impl DeployRequest {
    pub fn new(artifact: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            artifact: artifact.into(),
            platform,
            arch: Arch::current(),
            managed_runtime: true,
        }
    }

    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = arch;
        self
    }

    pub fn with_managed_runtime(mut self, managed: bool) -> Self {
        self.managed_runtime = managed;
        self
    }
}

/// The libraries a deployment would place, without placing them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentPlan {
    pub libraries: Vec<ResolvedLibrary>,
    pub used_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<GuardSkip>,
}

// ---------------------------------------------------------------------------
// PlatformDeployer
// ---------------------------------------------------------------------------

pub struct PlatformDeployer {
    platform: Platform,
    detector: Box<dyn DependencyDetector>,
    filter: DependencyFilter,
    locator: LibraryLocator,
    deployer: AtomicDeployer,
    max_libraries: usize,
}

/// Build the deployer for `platform` against a toolchain layout.
pub fn create_deployer(platform: Platform, layout: &ToolchainLayout) -> PlatformDeployer {
    let tool = layout.resolve_inspect_tool(platform);
    match &tool {
        Some(path) => debug!(tool = %path.display(), "dependency introspection tool"),
        None => debug!(platform = %platform, "no dependency introspection tool found"),
    }
    PlatformDeployer::new(
        platform,
        detector_for(platform, tool, DEFAULT_TOOL_TIMEOUT),
        LibraryLocator::new(platform, layout.runtime_dirs.clone()),
    )
}

impl PlatformDeployer {
    pub fn new(
        platform: Platform,
        detector: Box<dyn DependencyDetector>,
        locator: LibraryLocator,
    ) -> Self {
        Self {
            platform,
            detector,
            filter: DependencyFilter::for_platform(platform).clone(),
            locator,
            deployer: AtomicDeployer::default(),
            max_libraries: MAX_LIBRARIES,
        }
    }

    pub fn with_filter(mut self, filter: DependencyFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_strategy(mut self, strategy: LinkStrategy) -> Self {
        self.deployer = AtomicDeployer::new(strategy);
        self
    }

    pub fn with_max_libraries(mut self, max: usize) -> Self {
        self.max_libraries = max;
        self
    }

    /// Resolve what `deploy_all` would deploy, touching nothing.
    pub fn plan(
        &self,
        request: &DeployRequest,
        config: &DeployConfig,
    ) -> Result<DeploymentPlan, Interrupted> {
        let artifact = match self.guard(request, config) {
            Ok(artifact) => artifact,
            Err(reason) => {
                return Ok(DeploymentPlan {
                    skipped: Some(reason),
                    ..DeploymentPlan::default()
                })
            }
        };
        let (libraries, used_fallback) = self.discover(&artifact)?;
        Ok(DeploymentPlan {
            libraries,
            used_fallback,
            skipped: None,
        })
    }

    /// Deploy every runtime library `request.artifact` needs into its directory.
    pub fn deploy_all(
        &self,
        request: &DeployRequest,
        config: &DeployConfig,
    ) -> Result<DeploymentSummary, Interrupted> {
        let artifact = match self.guard(request, config) {
            Ok(artifact) => artifact,
            Err(reason) => return Ok(DeploymentSummary::skipped(reason)),
        };

        let (libraries, used_fallback) = self.discover(&artifact)?;

        let out_dir = artifact.output_dir();
        let mut summary = DeploymentSummary {
            used_fallback,
            ..DeploymentSummary::default()
        };
        for library in libraries {
            let report = self.deploy_one(out_dir, library);
            log_report(&report, config.verbose);
            summary.record(report);
        }

        info!(artifact = %artifact.path.display(), "runtime libraries: {summary}");
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // States
    // -----------------------------------------------------------------------

    fn guard(&self, request: &DeployRequest, config: &DeployConfig) -> Result<Artifact, GuardSkip> {
        let skip = |reason: GuardSkip| {
            debug!(artifact = %request.artifact.display(), reason = %reason, "skipping deployment");
            reason
        };

        if !config.enabled {
            return Err(skip(GuardSkip::Disabled));
        }
        if request.platform != self.platform {
            return Err(skip(GuardSkip::PlatformMismatch));
        }
        let artifact = match Artifact::inspect(&request.artifact, self.platform) {
            Ok(artifact) => artifact,
            Err(DeployError::BinaryNotFound(_)) => return Err(skip(GuardSkip::ArtifactMissing)),
            Err(_) => return Err(skip(GuardSkip::NotDeployableKind)),
        };
        if !artifact.kind.is_linked_image() {
            return Err(skip(GuardSkip::NotDeployableKind));
        }
        if artifact.kind == ArtifactKind::SharedLibrary && !config.deploy_shared_libs {
            return Err(skip(GuardSkip::SharedLibraryDisabled));
        }
        if !request.managed_runtime {
            return Err(skip(GuardSkip::SystemRuntime));
        }
        Ok(artifact)
    }

    fn discover(&self, artifact: &Artifact) -> Result<(Vec<ResolvedLibrary>, bool), Interrupted> {
        let scanner = TransitiveScanner::new(&*self.detector, &self.filter, &self.locator)
            .with_max_libraries(self.max_libraries);

        match self.detector.detect(&artifact.path) {
            Ok(direct) => Ok((scanner.scan(direct)?, false)),
            Err(e) if e.is_interrupt() => Err(Interrupted),
            Err(e) => {
                warn!(
                    artifact = %artifact.path.display(),
                    error = %e,
                    "dependency detection failed; deploying the default runtime set"
                );
                let fallback = fallback_libraries(self.platform)
                    .iter()
                    .map(|name| name.to_string());
                Ok((scanner.resolve_only(fallback), true))
            }
        }
    }

    fn deploy_one(&self, out_dir: &Path, library: ResolvedLibrary) -> LibraryReport {
        let Some(source) = library.source else {
            return LibraryReport {
                name: library.name,
                source: None,
                destination: None,
                outcome: DeploymentOutcome::Missing,
            };
        };

        let requested = file_component(library.name.trim()).to_string();
        let real_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| requested.clone());
        let dest = out_dir.join(&real_name);
        let outcome = self.deployer.deploy(&source, &dest);

        if self.platform == Platform::Linux
            && !requested.eq_ignore_ascii_case(&real_name)
            && !matches!(outcome, DeploymentOutcome::Failed(_))
        {
            link_soname(out_dir, &requested, &real_name);
        }

        LibraryReport {
            name: library.name,
            source: Some(source),
            destination: Some(dest),
            outcome,
        }
    }
}

fn log_report(report: &LibraryReport, verbose: bool) {
    match &report.outcome {
        DeploymentOutcome::Failed(reason) => {
            warn!(library = %report.name, reason = %reason, "failed to deploy runtime library");
        }
        outcome if verbose => info!(library = %report.name, outcome = %outcome, "runtime library"),
        outcome => debug!(library = %report.name, outcome = %outcome, "runtime library"),
    }
}

/// Point the requested SONAME at the deployed real file.
#[cfg(unix)]
fn link_soname(dir: &Path, requested: &str, real_name: &str) {
    let link = dir.join(requested);
    if link.symlink_metadata().is_ok() {
        return;
    }
    if let Err(e) = std::os::unix::fs::symlink(real_name, &link) {
        debug!(link = %link.display(), error = %e, "could not create soname link");
    }
}

#[cfg(not(unix))]
fn link_soname(dir: &Path, requested: &str, _real_name: &str) {
    debug!(link = %dir.join(requested).display(), "soname links need a unix host");
}
