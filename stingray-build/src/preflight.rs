//! Environment checks run before anything is touched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::BuildError;

/// Minimum free space on the output volume, in GiB.
pub const MIN_FREE_GIB: u64 = 10;

/// Library cache directory under the output root, shared by all builds.
pub const LIBS_DIR: &str = ".libs";

const GIB: u64 = 1024 * 1024 * 1024;

/// Free space lookup for the volume holding a path.
pub trait DiskProbe {
    /// Bytes available to unprivileged users.
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// [`DiskProbe`] backed by `statvfs(3)`.
pub struct StatvfsProbe;

impl DiskProbe for StatvfsProbe {
    #[cfg(unix)]
    #[allow(clippy::unnecessary_cast)]
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        let stat = nix::sys::statvfs::statvfs(path)?;
        Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
    }

    #[cfg(not(unix))]
    fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "free space checking is only supported on unix",
        ))
    }
}

/// Validated, absolute locations a build works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub repo_dir: PathBuf,
    pub output_dir: PathBuf,
    pub libs_dir: PathBuf,
    pub available_gib: u64,
}

pub struct Preflight<'a> {
    disk: &'a dyn DiskProbe,
}

impl<'a> Preflight<'a> {
    pub fn new(disk: &'a dyn DiskProbe) -> Self {
        Self { disk }
    }

    /// Check the repo and output directories and the output volume's free
    /// space, creating the shared `.libs` cache on the way.
    pub fn validate(&self, repo: &Path, output: &Path) -> Result<Workspace, BuildError> {
        let repo_dir = std::path::absolute(repo).map_err(BuildError::io("resolve", repo))?;
        if !repo_dir.is_dir() {
            return Err(BuildError::RepoNotFound(repo_dir));
        }
        info!("Repo directory: {}", repo_dir.display());

        let output_dir = std::path::absolute(output).map_err(BuildError::io("resolve", output))?;
        if !output_dir.is_dir() {
            return Err(BuildError::OutputNotFound(output_dir));
        }
        let available_gib = self.available_gib(&output_dir)?;
        info!(
            "Output directory: {} (~{} GB)",
            output_dir.display(),
            available_gib
        );

        let libs_dir = output_dir.join(LIBS_DIR);
        fs::create_dir_all(&libs_dir).map_err(BuildError::io("create", &libs_dir))?;
        info!("Lib dir: {}", libs_dir.display());

        if available_gib < MIN_FREE_GIB {
            return Err(BuildError::LowDiskSpace {
                path: output_dir,
                available_gib,
                required_gib: MIN_FREE_GIB,
            });
        }

        Ok(Workspace {
            repo_dir,
            output_dir,
            libs_dir,
            available_gib,
        })
    }

    fn available_gib(&self, path: &Path) -> Result<u64, BuildError> {
        self.disk
            .available_bytes(path)
            .map(|bytes| bytes / GIB)
            .map_err(|source| BuildError::DiskQuery {
                path: path.to_path_buf(),
                source,
            })
    }
}
