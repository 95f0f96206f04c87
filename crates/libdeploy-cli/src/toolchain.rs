use anyhow::Context;
use libdeploy_core::error::DeployError;
use libdeploy_core::layout::ToolchainLayout;
use libdeploy_core::types::{Arch, Platform};
use std::path::{Path, PathBuf};

/// Resolve the toolchain root directory.
///
/// Priority:
/// 1. `--toolchain` flag / `LIBDEPLOY_TOOLCHAIN` env var (passed in as `explicit`)
/// 2. Two levels above the `clang` found on `PATH` (`<root>/bin/clang`)
pub fn resolve_toolchain_root(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }

    let clang = which::which("clang").ok()?;
    let clang = std::fs::canonicalize(&clang).unwrap_or(clang);
    clang.parent()?.parent().map(Path::to_path_buf)
}

/// Build the layout from `--layout FILE` or by discovery under the toolchain root.
pub fn resolve_layout(
    layout_file: Option<&Path>,
    toolchain: Option<&Path>,
    inspect_tool: Option<PathBuf>,
    platform: Platform,
    arch: Arch,
) -> anyhow::Result<ToolchainLayout> {
    let layout = match layout_file {
        Some(file) => ToolchainLayout::load(file, platform, arch)
            .with_context(|| format!("failed to load layout {}", file.display()))?,
        None => {
            let root = resolve_toolchain_root(toolchain).ok_or(DeployError::ToolchainNotFound)?;
            ToolchainLayout::discover(&root, platform, arch)
                .with_context(|| format!("invalid toolchain root {}", root.display()))?
        }
    };
    Ok(layout.with_inspect_tool(inspect_tool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_toolchain_root(Some(dir.path()));
        assert_eq!(result, Some(dir.path().to_path_buf()));
    }

    #[test]
    fn layout_file_takes_precedence() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("runtime")).unwrap();
        let file = dir.path().join("layout.yaml");
        std::fs::write(&file, "runtime_dirs: [runtime]\n").unwrap();

        let layout = resolve_layout(
            Some(&file),
            Some(&dir.path().join("ignored")),
            None,
            Platform::Linux,
            Arch::X86_64,
        )
        .unwrap();
        assert_eq!(layout.runtime_dirs, vec![dir.path().join("runtime")]);
    }

    #[test]
    fn inspect_tool_override_is_applied() {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("my-readelf");
        let layout = resolve_layout(
            None,
            Some(dir.path()),
            Some(tool.clone()),
            Platform::Linux,
            Arch::X86_64,
        )
        .unwrap();
        assert_eq!(layout.inspect_tool, Some(tool));
    }

    #[test]
    fn missing_toolchain_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = resolve_layout(
            None,
            Some(&dir.path().join("nope")),
            None,
            Platform::Linux,
            Arch::X86_64,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid toolchain root"));
    }
}
