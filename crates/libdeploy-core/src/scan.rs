//! Breadth-first closure over deployable runtime dependencies.

use crate::detect::DependencyDetector;
use crate::error::Interrupted;
use crate::filter::{file_component, DependencyFilter};
use crate::locate::LibraryLocator;
use crate::types::ResolvedLibrary;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// Upper bound on distinct libraries visited in one scan.
pub const MAX_LIBRARIES: usize = 256;

pub struct TransitiveScanner<'a> {
    detector: &'a dyn DependencyDetector,
    filter: &'a DependencyFilter,
    locator: &'a LibraryLocator,
    max_libraries: usize,
}

impl<'a> TransitiveScanner<'a> {
    pub fn new(
        detector: &'a dyn DependencyDetector,
        filter: &'a DependencyFilter,
        locator: &'a LibraryLocator,
    ) -> Self {
        Self {
            detector,
            filter,
            locator,
            max_libraries: MAX_LIBRARIES,
        }
    }

    pub fn with_max_libraries(mut self, max: usize) -> Self {
        self.max_libraries = max;
        self
    }

    /// Walk from `direct` (the artifact's own dependency names) to every
    /// reachable deployable library, each returned exactly once in BFS order.
    ///
    /// Detection failures on transitive libraries only stop that branch; an
    /// interrupted tool aborts the scan.
    pub fn scan<I>(&self, direct: I) -> Result<Vec<ResolvedLibrary>, Interrupted>
    where
        I: IntoIterator<Item = String>,
    {
        let mut queue: VecDeque<String> = direct
            .into_iter()
            .filter(|name| self.filter.is_deployable(name))
            .collect();
        let mut visited: HashSet<String> = HashSet::new();
        let mut resolved: Vec<ResolvedLibrary> = Vec::new();

        while let Some(name) = queue.pop_front() {
            let key = visit_key(&name);
            if visited.contains(&key) {
                continue;
            }
            if visited.len() >= self.max_libraries {
                warn!(
                    limit = self.max_libraries,
                    "dependency scan hit the library limit; remaining names ignored"
                );
                break;
            }
            visited.insert(key);

            let Some(source) = self.locator.locate(&name) else {
                resolved.push(ResolvedLibrary { name, source: None });
                continue;
            };

            match self.detector.detect(&source) {
                Ok(deps) => {
                    for dep in deps {
                        if self.filter.is_deployable(&dep) && !visited.contains(&visit_key(&dep)) {
                            queue.push_back(dep);
                        }
                    }
                }
                Err(e) if e.is_interrupt() => return Err(Interrupted),
                Err(e) => {
                    debug!(library = %name, error = %e, "could not scan transitive dependencies");
                }
            }
            resolved.push(ResolvedLibrary {
                name,
                source: Some(source),
            });
        }

        Ok(resolved)
    }

    /// Locate `names` without running detection on them.
    pub fn resolve_only<I>(&self, names: I) -> Vec<ResolvedLibrary>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        names
            .into_iter()
            .filter(|name| seen.insert(visit_key(name)))
            .map(|name| {
                let source = self.locator.locate(&name);
                ResolvedLibrary { name, source }
            })
            .collect()
    }
}

/// Names that land on the same destination file are the same library.
fn visit_key(name: &str) -> String {
    file_component(name.trim()).to_ascii_lowercase()
}
