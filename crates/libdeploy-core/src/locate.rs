use crate::filter::file_component;
use crate::types::Platform;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Install-name prefixes the dynamic loader expands at run time.
const MACOS_LOADER_PREFIXES: &[&str] = &["@rpath/", "@loader_path/", "@executable_path/"];

/// Finds dependency names inside the toolchain's runtime directories.
#[derive(Debug, Clone)]
pub struct LibraryLocator {
    platform: Platform,
    search_dirs: Vec<PathBuf>,
}

impl LibraryLocator {
    pub fn new(platform: Platform, search_dirs: Vec<PathBuf>) -> Self {
        Self {
            platform,
            search_dirs,
        }
    }

    /// First on-disk match for `name`, or `None`. A miss is expected for
    /// optional dependencies and is only logged at debug.
    ///
    /// On Linux the match is resolved through symlinks to the real file,
    /// so `libc++.so.1` may come back as `…/libc++.so.1.0`.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let found = self.find(name);
        if found.is_none() {
            debug!(library = %name, "not found in toolchain");
        }
        found
    }

    fn find(&self, name: &str) -> Option<PathBuf> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let stripped = match self.platform {
            Platform::MacOs => strip_loader_prefix(name),
            _ => name,
        };
        let direct = Path::new(stripped);
        if direct.is_absolute() && direct.is_file() {
            return Some(self.finish(direct.to_path_buf()));
        }

        let file_name = file_component(stripped);
        self.search_dirs
            .iter()
            .map(|dir| dir.join(file_name))
            .find(|candidate| candidate.is_file())
            .map(|candidate| self.finish(candidate))
    }

    fn finish(&self, path: PathBuf) -> PathBuf {
        match self.platform {
            Platform::Linux => std::fs::canonicalize(&path).unwrap_or(path),
            _ => path,
        }
    }
}

fn strip_loader_prefix(name: &str) -> &str {
    MACOS_LOADER_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}
