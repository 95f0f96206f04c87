use crate::detect::BinaryFormat;
use crate::error::{DeployError, Result};
use crate::types::{Arch, Platform};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory conventions
// ---------------------------------------------------------------------------

pub const BIN_DIR: &str = "bin";
pub const LIB_DIR: &str = "lib";
pub const CLANG_RESOURCE_DIR: &str = "lib/clang";

fn mingw_triple(arch: Arch) -> &'static str {
    match arch {
        Arch::X86_64 => "x86_64-w64-mingw32",
        Arch::Aarch64 => "aarch64-w64-mingw32",
    }
}

fn linux_runtime_targets(arch: Arch) -> [String; 2] {
    [format!("{arch}-unknown-linux-gnu"), "linux".to_string()]
}

/// `<root>/lib/clang/<version>` directories, newest version first.
pub fn clang_version_dirs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root.join(CLANG_RESOURCE_DIR)) else {
        return Vec::new();
    };
    let mut dirs: Vec<(Vec<u64>, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let version = name
                .split('.')
                .map(|part| part.parse::<u64>().unwrap_or(0))
                .collect();
            (version, e.path())
        })
        .collect();
    dirs.sort_by(|a, b| b.0.cmp(&a.0));
    dirs.into_iter().map(|(_, path)| path).collect()
}

// ---------------------------------------------------------------------------
// ToolchainLayout
// ---------------------------------------------------------------------------

/// Where a toolchain keeps its runtime libraries and binaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainLayout {
    /// Searched in order; the first directory holding a name wins.
    #[serde(default)]
    pub runtime_dirs: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_bin_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspect_tool: Option<PathBuf>,
}

/// On-disk form: either an explicit directory list or a root to discover from.
#[derive(Debug, Deserialize)]
struct LayoutFile {
    #[serde(default)]
    root: Option<PathBuf>,
    #[serde(default)]
    runtime_dirs: Vec<PathBuf>,
    #[serde(default)]
    compiler_bin_dir: Option<PathBuf>,
    #[serde(default)]
    inspect_tool: Option<PathBuf>,
}

impl ToolchainLayout {
    pub fn discover(root: &Path, platform: Platform, arch: Arch) -> Result<Self> {
        if !root.is_dir() {
            return Err(DeployError::ToolchainRootMissing(root.to_path_buf()));
        }

        let bin = root.join(BIN_DIR);
        let lib = root.join(LIB_DIR);
        let mut candidates: Vec<PathBuf> = Vec::new();
        match platform {
            Platform::Windows => {
                candidates.push(root.join(mingw_triple(arch)).join(BIN_DIR));
                candidates.push(bin.clone());
            }
            Platform::Linux => {
                for version_dir in clang_version_dirs(root) {
                    for target in linux_runtime_targets(arch) {
                        candidates.push(version_dir.join(LIB_DIR).join(target));
                    }
                }
                candidates.push(lib);
                candidates.push(bin.clone());
            }
            Platform::MacOs => {
                candidates.push(lib);
                for version_dir in clang_version_dirs(root) {
                    candidates.push(version_dir.join(LIB_DIR).join("darwin"));
                }
                candidates.push(bin.clone());
            }
        }

        Ok(Self {
            runtime_dirs: existing_dirs(candidates),
            compiler_bin_dir: bin.is_dir().then_some(bin),
            inspect_tool: None,
        })
    }

    /// Read a layout file. Relative paths are taken against the file's directory.
    pub fn load(path: &Path, platform: Platform, arch: Arch) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let file: LayoutFile = serde_yaml::from_str(&data)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let absolute = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };

        let mut layout = match (file.root, file.runtime_dirs.is_empty()) {
            (Some(root), true) => Self::discover(&absolute(root), platform, arch)?,
            _ => Self {
                runtime_dirs: existing_dirs(file.runtime_dirs.into_iter().map(absolute)),
                compiler_bin_dir: None,
                inspect_tool: None,
            },
        };
        if let Some(bin) = file.compiler_bin_dir {
            layout.compiler_bin_dir = Some(absolute(bin));
        }
        layout.inspect_tool = file.inspect_tool.map(absolute);
        Ok(layout)
    }

    pub fn with_inspect_tool(mut self, tool: Option<PathBuf>) -> Self {
        if tool.is_some() {
            self.inspect_tool = tool;
        }
        self
    }

    /// Introspection tool for `platform`: the explicit override, then the
    /// toolchain's own binary, then the system tool on `PATH`.
    ///
    /// An override is returned as given even if it does not exist, so that
    /// running it reports the tool as missing.
    pub fn resolve_inspect_tool(&self, platform: Platform) -> Option<PathBuf> {
        if let Some(tool) = &self.inspect_tool {
            return Some(tool.clone());
        }
        let format = BinaryFormat::for_platform(platform);
        if let Some(bin) = &self.compiler_bin_dir {
            let cwd = std::env::current_dir().unwrap_or_else(|_| bin.clone());
            for name in format.bundled_tools() {
                if let Ok(path) = which::which_in(name, Some(bin), &cwd) {
                    return Some(path);
                }
            }
        }
        format
            .system_tools()
            .iter()
            .find_map(|name| which::which(name).ok())
    }
}

fn existing_dirs(candidates: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in candidates {
        if dir.is_dir() && !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mkdirs(root: &Path, rels: &[&str]) {
        for rel in rels {
            std::fs::create_dir_all(root.join(rel)).unwrap();
        }
    }

    #[test]
    fn windows_prefers_triple_bin() {
        let dir = TempDir::new().unwrap();
        mkdirs(dir.path(), &["x86_64-w64-mingw32/bin", "bin"]);
        let layout = ToolchainLayout::discover(dir.path(), Platform::Windows, Arch::X86_64).unwrap();
        assert_eq!(
            layout.runtime_dirs,
            vec![
                dir.path().join("x86_64-w64-mingw32/bin"),
                dir.path().join("bin")
            ]
        );
        assert_eq!(layout.compiler_bin_dir, Some(dir.path().join("bin")));
    }

    #[test]
    fn linux_searches_clang_runtime_dirs_newest_first() {
        let dir = TempDir::new().unwrap();
        mkdirs(
            dir.path(),
            &[
                "lib/clang/9/lib/linux",
                "lib/clang/18/lib/x86_64-unknown-linux-gnu",
                "lib/clang/18/lib/linux",
                "lib",
            ],
        );
        let layout = ToolchainLayout::discover(dir.path(), Platform::Linux, Arch::X86_64).unwrap();
        assert_eq!(
            layout.runtime_dirs,
            vec![
                dir.path().join("lib/clang/18/lib/x86_64-unknown-linux-gnu"),
                dir.path().join("lib/clang/18/lib/linux"),
                dir.path().join("lib/clang/9/lib/linux"),
                dir.path().join("lib"),
            ]
        );
        assert_eq!(layout.compiler_bin_dir, None);
    }

    #[test]
    fn macos_searches_lib_then_darwin_runtime() {
        let dir = TempDir::new().unwrap();
        mkdirs(dir.path(), &["lib/clang/17.0.1/lib/darwin", "bin"]);
        let layout = ToolchainLayout::discover(dir.path(), Platform::MacOs, Arch::Aarch64).unwrap();
        assert_eq!(
            layout.runtime_dirs,
            vec![
                dir.path().join("lib"),
                dir.path().join("lib/clang/17.0.1/lib/darwin"),
                dir.path().join("bin"),
            ]
        );
    }

    #[test]
    fn missing_root_names_the_path() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nope");
        let err = ToolchainLayout::discover(&root, Platform::Linux, Arch::X86_64).unwrap_err();
        assert!(matches!(&err, DeployError::ToolchainRootMissing(p) if *p == root));
        assert!(err.to_string().contains("nope"));
        assert!(!err.to_string().contains("LIBDEPLOY_TOOLCHAIN"));
    }

    #[test]
    fn load_explicit_dirs_relative_to_file() {
        let dir = TempDir::new().unwrap();
        mkdirs(dir.path(), &["runtime", "more"]);
        let file = dir.path().join("layout.yaml");
        std::fs::write(
            &file,
            "runtime_dirs:\n  - runtime\n  - missing\n  - more\ninspect_tool: tools/readelf\n",
        )
        .unwrap();
        let layout = ToolchainLayout::load(&file, Platform::Linux, Arch::X86_64).unwrap();
        assert_eq!(
            layout.runtime_dirs,
            vec![dir.path().join("runtime"), dir.path().join("more")]
        );
        assert_eq!(layout.inspect_tool, Some(dir.path().join("tools/readelf")));
    }

    #[test]
    fn load_root_discovers() {
        let dir = TempDir::new().unwrap();
        mkdirs(dir.path(), &["llvm/bin", "llvm/x86_64-w64-mingw32/bin"]);
        let file = dir.path().join("layout.yaml");
        std::fs::write(&file, "root: llvm\n").unwrap();
        let layout = ToolchainLayout::load(&file, Platform::Windows, Arch::X86_64).unwrap();
        assert_eq!(layout.runtime_dirs.len(), 2);
        assert_eq!(layout.compiler_bin_dir, Some(dir.path().join("llvm/bin")));
    }

    #[test]
    fn malformed_layout_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("layout.yaml");
        std::fs::write(&file, "runtime_dirs: [unterminated\n").unwrap();
        let err = ToolchainLayout::load(&file, Platform::Linux, Arch::X86_64).unwrap_err();
        assert!(matches!(err, DeployError::Yaml(_)));
    }

    #[test]
    fn override_tool_wins_even_when_absent() {
        let layout = ToolchainLayout::default()
            .with_inspect_tool(Some(PathBuf::from("/nonexistent/readelf")));
        assert_eq!(
            layout.resolve_inspect_tool(Platform::Linux),
            Some(PathBuf::from("/nonexistent/readelf"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn bundled_tool_found_in_compiler_bin() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        mkdirs(dir.path(), &["bin"]);
        let tool = dir.path().join("bin/llvm-readelf");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let layout = ToolchainLayout::discover(dir.path(), Platform::Linux, Arch::X86_64).unwrap();
        assert_eq!(layout.resolve_inspect_tool(Platform::Linux), Some(tool));
    }
}
