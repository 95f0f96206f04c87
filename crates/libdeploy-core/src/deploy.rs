//! Race-safe placement of one library next to a build output.
//!
//! Independent build processes may deploy the same library into the same
//! directory at the same moment. No locks are taken: a destination only ever
//! appears through a hard link or an atomic rename of a fully written temp
//! sibling, so readers see either nothing or the complete file.

use crate::types::DeploymentOutcome;
use std::fs::{self, File, Metadata};
use std::io;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStrategy {
    /// Hard link when the filesystem allows it, copy otherwise.
    #[default]
    HardLinkThenCopy,
    /// Always copy through a temp sibling.
    CopyOnly,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicDeployer {
    strategy: LinkStrategy,
}

impl AtomicDeployer {
    pub fn new(strategy: LinkStrategy) -> Self {
        Self { strategy }
    }

    /// Place `source` at `dest`. I/O errors come back as `Failed`.
    pub fn deploy(&self, source: &Path, dest: &Path) -> DeploymentOutcome {
        match self.try_deploy(source, dest) {
            Ok(outcome) => outcome,
            Err(e) => DeploymentOutcome::Failed(e.to_string()),
        }
    }

    /// A symlinked `source` is resolved first; the destination is always a
    /// regular file under the name the caller asked for.
    pub fn try_deploy(&self, source: &Path, dest: &Path) -> io::Result<DeploymentOutcome> {
        let source = &fs::canonicalize(source)?;
        let src_meta = fs::metadata(source)?;

        if is_up_to_date(&src_meta, dest) {
            return Ok(DeploymentOutcome::SkippedUpToDate);
        }

        if dest.symlink_metadata().is_ok() {
            if let Err(e) = fs::remove_file(dest) {
                debug!(dest = %dest.display(), error = %e, "could not remove stale copy");
            }
        }

        if self.strategy == LinkStrategy::HardLinkThenCopy {
            match fs::hard_link(source, dest) {
                Ok(()) => return Ok(DeploymentOutcome::Deployed),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if has_len(dest, src_meta.len()) {
                        debug!(dest = %dest.display(), "peer deployed first");
                        return Ok(DeploymentOutcome::SkippedConcurrentRace);
                    }
                }
                Err(e) => {
                    debug!(dest = %dest.display(), error = %e, "hard link failed, copying");
                }
            }
        }

        copy_then_rename(source, &src_meta, dest)
    }
}

fn is_up_to_date(src_meta: &Metadata, dest: &Path) -> bool {
    let Ok(dest_meta) = fs::metadata(dest) else {
        return false;
    };
    match (src_meta.modified(), dest_meta.modified()) {
        (Ok(src), Ok(dst)) => dst >= src,
        _ => false,
    }
}

fn has_len(path: &Path, len: u64) -> bool {
    fs::metadata(path).is_ok_and(|m| m.len() == len)
}

/// Copy into a uniquely named sibling, then rename it over `dest`.
/// The temp file is removed on every error path when it is dropped.
fn copy_then_rename(source: &Path, src_meta: &Metadata, dest: &Path) -> io::Result<DeploymentOutcome> {
    let dir = dest.parent().unwrap_or(Path::new("."));
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(dir)?;

    let mut src = File::open(source)?;
    io::copy(&mut src, tmp.as_file_mut())?;
    tmp.as_file().set_permissions(src_meta.permissions())?;
    if let Ok(modified) = src_meta.modified() {
        tmp.as_file().set_modified(modified)?;
    }
    let tmp_len = tmp.as_file().metadata()?.len();

    match tmp.persist(dest) {
        Ok(_) => Ok(DeploymentOutcome::Deployed),
        Err(e) => {
            // The peer's file is in place (typically locked by a loader on
            // Windows); equal size means it is the same library.
            if has_len(dest, tmp_len) {
                debug!(dest = %dest.display(), error = %e.error, "peer deployed first");
                Ok(DeploymentOutcome::SkippedConcurrentRace)
            } else {
                Err(e.error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Barrier};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn fixture() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let toolchain = dir.path().join("toolchain");
        let out = dir.path().join("out");
        fs::create_dir_all(&toolchain).unwrap();
        fs::create_dir_all(&out).unwrap();
        let src = toolchain.join("libc++.so.1");
        fs::write(&src, vec![0xabu8; 64 * 1024]).unwrap();
        (dir, src, out.join("libc++.so.1"))
    }

    fn leftover_temps(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn fresh_destination_is_deployed() {
        let (_dir, src, dest) = fixture();
        let outcome = AtomicDeployer::default().deploy(&src, &dest);
        assert_eq!(outcome, DeploymentOutcome::Deployed);
        assert_eq!(fs::read(&dest).unwrap(), fs::read(&src).unwrap());
    }

    #[test]
    fn copy_only_matches_bytes_and_mtime() {
        let (_dir, src, dest) = fixture();
        let outcome = AtomicDeployer::new(LinkStrategy::CopyOnly).deploy(&src, &dest);
        assert_eq!(outcome, DeploymentOutcome::Deployed);
        assert_eq!(fs::read(&dest).unwrap(), fs::read(&src).unwrap());
        assert_eq!(
            fs::metadata(&dest).unwrap().modified().unwrap(),
            fs::metadata(&src).unwrap().modified().unwrap()
        );
        assert!(leftover_temps(dest.parent().unwrap()).is_empty());
    }

    #[test]
    fn newer_destination_is_left_alone() {
        let (_dir, src, dest) = fixture();
        fs::write(&dest, b"peer copy").unwrap();
        set_mtime(&dest, SystemTime::now() + Duration::from_secs(60));

        let outcome = AtomicDeployer::default().deploy(&src, &dest);
        assert_eq!(outcome, DeploymentOutcome::SkippedUpToDate);
        assert_eq!(fs::read(&dest).unwrap(), b"peer copy");
    }

    #[test]
    fn stale_destination_is_replaced() {
        let (_dir, src, dest) = fixture();
        fs::write(&dest, b"old").unwrap();

        for strategy in [LinkStrategy::HardLinkThenCopy, LinkStrategy::CopyOnly] {
            set_mtime(&dest, SystemTime::now() - Duration::from_secs(3600));
            let outcome = AtomicDeployer::new(strategy).deploy(&src, &dest);
            assert_eq!(outcome, DeploymentOutcome::Deployed, "{strategy:?}");
            assert_eq!(fs::read(&dest).unwrap(), fs::read(&src).unwrap());
            // Undo any hard link so the next pass starts from a separate file.
            fs::remove_file(&dest).unwrap();
            fs::write(&dest, b"old").unwrap();
        }
    }

    #[test]
    fn second_deploy_writes_nothing() {
        for strategy in [LinkStrategy::HardLinkThenCopy, LinkStrategy::CopyOnly] {
            let (_dir, src, dest) = fixture();
            let deployer = AtomicDeployer::new(strategy);
            assert_eq!(deployer.deploy(&src, &dest), DeploymentOutcome::Deployed);
            assert_eq!(
                deployer.deploy(&src, &dest),
                DeploymentOutcome::SkippedUpToDate
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_source_deploys_the_real_file() {
        let (_dir, real, linux_dest) = fixture();
        let toolchain = real.parent().unwrap();
        let link = toolchain.join("libc++.1.dylib");
        std::os::unix::fs::symlink("libc++.so.1", &link).unwrap();
        let dest = linux_dest.with_file_name("libc++.1.dylib");

        for strategy in [LinkStrategy::HardLinkThenCopy, LinkStrategy::CopyOnly] {
            let deployer = AtomicDeployer::new(strategy);
            assert_eq!(deployer.deploy(&link, &dest), DeploymentOutcome::Deployed);
            assert!(!fs::symlink_metadata(&dest).unwrap().file_type().is_symlink());
            assert_eq!(fs::read(&dest).unwrap(), fs::read(&real).unwrap());
            assert_eq!(
                deployer.deploy(&link, &dest),
                DeploymentOutcome::SkippedUpToDate,
                "{strategy:?}"
            );
            fs::remove_file(&dest).unwrap();
        }
    }

    #[test]
    fn missing_source_fails() {
        let (_dir, src, dest) = fixture();
        fs::remove_file(&src).unwrap();
        let outcome = AtomicDeployer::default().deploy(&src, &dest);
        assert!(matches!(outcome, DeploymentOutcome::Failed(_)));
    }

    #[test]
    fn missing_destination_dir_fails_without_temp() {
        let (dir, src, _dest) = fixture();
        let dest = dir.path().join("gone").join("libc++.so.1");
        let outcome = AtomicDeployer::new(LinkStrategy::CopyOnly).deploy(&src, &dest);
        assert!(matches!(outcome, DeploymentOutcome::Failed(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn concurrent_deployers_converge() {
        for strategy in [LinkStrategy::HardLinkThenCopy, LinkStrategy::CopyOnly] {
            let (_dir, src, dest) = fixture();
            let barrier = Arc::new(Barrier::new(20));
            let handles: Vec<_> = (0..20)
                .map(|_| {
                    let barrier = Arc::clone(&barrier);
                    let src = src.clone();
                    let dest = dest.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        AtomicDeployer::new(strategy).deploy(&src, &dest)
                    })
                })
                .collect();

            let outcomes: Vec<DeploymentOutcome> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert!(
                outcomes
                    .iter()
                    .all(|o| !matches!(o, DeploymentOutcome::Failed(_))),
                "{strategy:?}: {outcomes:?}"
            );
            assert!(outcomes.contains(&DeploymentOutcome::Deployed));
            assert_eq!(fs::read(&dest).unwrap(), fs::read(&src).unwrap());
            assert!(leftover_temps(dest.parent().unwrap()).is_empty());
        }
    }
}
