//! Convenient access to a git working copy.
//!
//! The [`Checkout`] trait is the seam build tooling talks to: it inspects the
//! working tree for local changes, fetches remotes, hard-resets to a revision
//! and describes commits. [`GitCheckout`] implements it on top of libgit2.

pub mod checkout;
pub mod repository;

use std::path::PathBuf;

pub use checkout::{Checkout, CommitInfo, LocalChanges};
pub use repository::GitCheckout;

/// Git repository errors
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Repository not found at {0}")]
    NotFound(PathBuf),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Fetch from remote '{remote}' failed: {source}")]
    FetchFailed {
        remote: String,
        #[source]
        source: git2::Error,
    },

    #[error("Commit {0} has an unrepresentable author time")]
    InvalidTime(String),
}

pub type GitResult<T> = Result<T, GitError>;
