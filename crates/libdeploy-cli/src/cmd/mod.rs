pub mod classify;
pub mod deploy;
pub mod plan;

use crate::toolchain;
use anyhow::Context;
use clap::Args;
use libdeploy_core::artifact::detect_platform;
use libdeploy_core::orchestrator::{create_deployer, DeployRequest, PlatformDeployer};
use libdeploy_core::types::{Arch, Platform};
use std::path::PathBuf;

/// Inputs shared by `deploy` and `plan`.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Linked executable or shared library
    pub binary: PathBuf,

    /// Target platform (windows, linux, darwin); inferred from the binary when omitted
    #[arg(long)]
    pub platform: Option<Platform>,

    /// Target architecture (x86_64, aarch64); defaults to the host
    #[arg(long)]
    pub arch: Option<Arch>,

    /// Toolchain root (default: two levels above `clang` on PATH)
    #[arg(long, env = "LIBDEPLOY_TOOLCHAIN")]
    pub toolchain: Option<PathBuf>,

    /// YAML file listing runtime directories; wins over --toolchain
    #[arg(long)]
    pub layout: Option<PathBuf>,

    /// Introspection tool to run instead of the toolchain's or PATH's
    #[arg(long)]
    pub inspect_tool: Option<PathBuf>,

    /// The binary was linked against the host's system runtime
    #[arg(long)]
    pub system_runtime: bool,
}

impl TargetArgs {
    pub fn target(&self) -> anyhow::Result<(Platform, Arch)> {
        let platform = match self.platform {
            Some(p) => p,
            None => detect_platform(&self.binary)
                .with_context(|| format!("cannot inspect {}", self.binary.display()))?
                .or_else(Platform::current)
                .context("cannot infer the target platform; pass --platform")?,
        };
        Ok((platform, self.arch.unwrap_or_else(Arch::current)))
    }

    pub fn request(&self, platform: Platform, arch: Arch) -> DeployRequest {
        DeployRequest::new(&self.binary, platform)
            .with_arch(arch)
            .with_managed_runtime(!self.system_runtime)
    }

    pub fn deployer(&self, platform: Platform, arch: Arch) -> anyhow::Result<PlatformDeployer> {
        let layout = toolchain::resolve_layout(
            self.layout.as_deref(),
            self.toolchain.as_deref(),
            self.inspect_tool.clone(),
            platform,
            arch,
        )?;
        Ok(create_deployer(platform, &layout))
    }
}
