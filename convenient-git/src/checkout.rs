//! The working-copy operations a build needs, independent of how they are done.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use crate::GitResult;

/// Local modifications found in a working copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalChanges {
    /// Tracked files modified in the working tree but not staged
    pub unstaged: Vec<PathBuf>,
    /// Changes recorded in the index but not committed
    pub staged: Vec<PathBuf>,
    /// Files unknown to git and not covered by ignore rules
    pub untracked: Vec<PathBuf>,
}

impl LocalChanges {
    pub fn is_clean(&self) -> bool {
        self.unstaged.is_empty() && self.staged.is_empty() && self.untracked.is_empty()
    }
}

/// Metadata of a single commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full object id
    pub id: String,
    /// Abbreviated object id, as `git rev-parse --short` prints it
    pub short_id: String,
    pub author_name: String,
    pub author_email: String,
    /// Author time in the author's own timezone
    pub author_time: DateTime<FixedOffset>,
    pub message: String,
    /// Human readable description: header, message and patch, like `git show`
    pub description: String,
}

impl CommitInfo {
    /// Author date as `YYYY-MM-DD` (`git show --date=short`).
    pub fn short_date(&self) -> String {
        self.author_time.format("%Y-%m-%d").to_string()
    }

    /// Author date in git's default format, e.g. `Fri Mar 1 13:00:00 2024 +0100`.
    pub fn long_date(&self) -> String {
        self.author_time.format("%a %b %-d %H:%M:%S %Y %z").to_string()
    }
}

/// Operations on a working copy used to prepare a build.
///
/// Every method reports failures instead of partially succeeding; callers treat
/// any error as fatal.
pub trait Checkout {
    /// Root of the working tree.
    fn workdir(&self) -> &Path;

    /// Unstaged, staged and untracked (non-ignored) changes.
    fn local_changes(&self) -> GitResult<LocalChanges>;

    /// Abbreviated id of the commit HEAD points at.
    fn head_short_id(&self) -> GitResult<String>;

    /// Fetch every configured remote.
    fn fetch_all(&self) -> GitResult<()>;

    /// Move the current branch and working tree to `refspec`, discarding
    /// tracked modifications.
    fn reset_hard(&self, refspec: &str) -> GitResult<()>;

    /// Describe the commit `refspec` resolves to.
    fn commit_info(&self, refspec: &str) -> GitResult<CommitInfo>;
}
