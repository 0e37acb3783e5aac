//! Build errors. Every one of them ends the run.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use convenient_git::GitError;

/// Coarse classification of a [`BuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or environment, detected before anything is mutated
    Precondition,
    /// Fetching, resetting or querying the checkout failed
    VersionControl,
    /// The build driver failed, after its one retry
    Build,
    /// The archiver failed
    Packaging,
    /// Filesystem work on the output directories failed
    Io,
}

/// Version-control step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsAction {
    Inspect,
    ResolveHead,
    Fetch,
    Reset,
    Describe,
}

impl fmt::Display for VcsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            VcsAction::Inspect => "can't inspect checkout",
            VcsAction::ResolveHead => "can't resolve HEAD",
            VcsAction::Fetch => "can't fetch repo",
            VcsAction::Reset => "can't checkout revision",
            VcsAction::Describe => "can't read commit",
        };
        f.write_str(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid repo path options: --repo is required")]
    MissingRepo,

    #[error("Repo dir doesn't exist: {0}")]
    RepoNotFound(PathBuf),

    #[error("Output directory does not exist: {0}")]
    OutputNotFound(PathBuf),

    #[error("Low disk space! {path} has ~{available_gib} GB free, {required_gib} GB required")]
    LowDiskSpace {
        path: PathBuf,
        available_gib: u64,
        required_gib: u64,
    },

    #[error("Failed to query free space of {path}: {source}")]
    DiskQuery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("You have unstaged files at {repo}, quitting... ({files})")]
    UnstagedChanges { repo: PathBuf, files: String },

    #[error("You have staged changes at {repo}, quitting... ({files})")]
    StagedChanges { repo: PathBuf, files: String },

    #[error("You have untracked files at {repo}, quitting... ({files})")]
    UntrackedFiles { repo: PathBuf, files: String },

    #[error("Invalid configuration {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Failed, {action}: {source}")]
    VersionControl {
        action: VcsAction,
        #[source]
        source: GitError,
    },

    #[error("Failed to run build driver {program}: {source}")]
    DriverSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Build of {commit} failed twice, log written to {log}")]
    BuildFailed { commit: String, log: PathBuf },

    #[error("Failed to run archiver {program}: {source}")]
    ArchiverSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Archiver exited with {code:?} while creating {archive}")]
    ArchiveFailed { archive: PathBuf, code: Option<i32> },

    #[error("Failed to read archive template {path}: {source}")]
    ArchiveTemplate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::MissingRepo
            | BuildError::RepoNotFound(_)
            | BuildError::OutputNotFound(_)
            | BuildError::LowDiskSpace { .. }
            | BuildError::DiskQuery { .. }
            | BuildError::UnstagedChanges { .. }
            | BuildError::StagedChanges { .. }
            | BuildError::UntrackedFiles { .. }
            | BuildError::Config { .. } => ErrorKind::Precondition,
            BuildError::VersionControl { .. } => ErrorKind::VersionControl,
            BuildError::DriverSpawn { .. } | BuildError::BuildFailed { .. } => ErrorKind::Build,
            BuildError::ArchiverSpawn { .. }
            | BuildError::ArchiveFailed { .. }
            | BuildError::ArchiveTemplate { .. } => ErrorKind::Packaging,
            BuildError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Adapter for `map_err` on filesystem calls.
    pub(crate) fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> BuildError {
        let path = path.to_path_buf();
        move |source| BuildError::Io {
            action,
            path,
            source,
        }
    }

    pub(crate) fn vcs(action: VcsAction) -> impl FnOnce(GitError) -> BuildError {
        move |source| BuildError::VersionControl { action, source }
    }
}
