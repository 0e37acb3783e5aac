//! Getting the source checkout onto the commit to build.

use std::path::PathBuf;

use convenient_git::Checkout;
use tracing::info;

use crate::error::{BuildError, VcsAction};
use crate::orchestrator::{enter, Stage};
use crate::request::ResolvedCommit;

/// How many offending paths an error message lists.
const LISTED_PATHS: usize = 5;

/// Refuses to continue when the working copy has anything a hard reset could
/// destroy.
pub struct CheckoutGuard<'a> {
    checkout: &'a dyn Checkout,
}

impl<'a> CheckoutGuard<'a> {
    pub fn new(checkout: &'a dyn Checkout) -> Self {
        Self { checkout }
    }

    pub fn ensure_clean(&self) -> Result<(), BuildError> {
        let changes = self
            .checkout
            .local_changes()
            .map_err(BuildError::vcs(VcsAction::Inspect))?;
        let repo = self.checkout.workdir().to_path_buf();

        if !changes.unstaged.is_empty() {
            return Err(BuildError::UnstagedChanges {
                repo,
                files: list(&changes.unstaged),
            });
        }
        if !changes.staged.is_empty() {
            return Err(BuildError::StagedChanges {
                repo,
                files: list(&changes.staged),
            });
        }
        if !changes.untracked.is_empty() {
            return Err(BuildError::UntrackedFiles {
                repo,
                files: list(&changes.untracked),
            });
        }
        Ok(())
    }
}

fn list(paths: &[PathBuf]) -> String {
    let mut shown: Vec<String> = paths
        .iter()
        .take(LISTED_PATHS)
        .map(|p| p.display().to_string())
        .collect();
    if paths.len() > LISTED_PATHS {
        shown.push(format!("and {} more", paths.len() - LISTED_PATHS));
    }
    shown.join(", ")
}

/// Fetches, resets and describes the commit to build.
pub struct CommitResolver<'a> {
    checkout: &'a dyn Checkout,
}

impl<'a> CommitResolver<'a> {
    pub fn new(checkout: &'a dyn Checkout) -> Self {
        Self { checkout }
    }

    /// Resolve `reference` (HEAD when absent), fetch every remote and hard
    /// reset the working copy onto it.
    pub fn resolve(&self, reference: Option<&str>) -> Result<ResolvedCommit, BuildError> {
        let target = match reference {
            Some(reference) => reference.to_string(),
            None => self
                .checkout
                .head_short_id()
                .map_err(BuildError::vcs(VcsAction::ResolveHead))?,
        };

        enter(Stage::Fetching);
        info!("Fetching {}...", target);
        self.checkout
            .fetch_all()
            .map_err(BuildError::vcs(VcsAction::Fetch))?;

        enter(Stage::Resetting);
        self.checkout
            .reset_hard(&target)
            .map_err(BuildError::vcs(VcsAction::Reset))?;

        let commit: ResolvedCommit = self
            .checkout
            .commit_info(&target)
            .map_err(BuildError::vcs(VcsAction::Describe))?
            .into();
        info!("Building {} from {}", commit.short_hash, commit.long_date);
        Ok(commit)
    }
}
