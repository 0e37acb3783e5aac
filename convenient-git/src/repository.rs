//! libgit2 backed [`Checkout`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use git2::{
    build::CheckoutBuilder, AutotagOption, Commit, Cred, CredentialType, DiffFormat,
    FetchOptions, ProxyOptions, RemoteCallbacks, Repository, ResetType, Status, StatusOptions,
};
use tracing::{debug, info};

use crate::checkout::{Checkout, CommitInfo, LocalChanges};
use crate::{GitError, GitResult};

/// Credential callbacks are retried by libgit2 until one succeeds; give up after this many.
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// A git working copy on disk.
///
/// The repository is opened for every operation so the value can be created
/// before the path has been validated.
pub struct GitCheckout {
    path: PathBuf,
}

impl GitCheckout {
    /// Create a checkout handle for the working copy at `path`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use convenient_git::{Checkout, GitCheckout};
    ///
    /// let checkout = GitCheckout::new("/src/stingray");
    /// let changes = checkout.local_changes()?;
    /// assert!(changes.is_clean());
    /// # Ok::<(), convenient_git::GitError>(())
    /// ```
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(&self) -> GitResult<Repository> {
        Repository::open(&self.path).map_err(|e| match e.code() {
            git2::ErrorCode::NotFound => GitError::NotFound(self.path.clone()),
            _ => GitError::Git(e),
        })
    }

    fn find_commit<'r>(repo: &'r Repository, refspec: &str) -> GitResult<Commit<'r>> {
        let object = repo
            .revparse_single(refspec)
            .map_err(|_| GitError::InvalidReference(refspec.to_string()))?;
        object
            .peel_to_commit()
            .map_err(|_| GitError::InvalidReference(refspec.to_string()))
    }
}

impl Checkout for GitCheckout {
    fn workdir(&self) -> &Path {
        &self.path
    }

    fn local_changes(&self) -> GitResult<LocalChanges> {
        let repo = self.open()?;

        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let mut changes = LocalChanges::default();
        for entry in repo.statuses(Some(&mut options))?.iter() {
            let path = PathBuf::from(String::from_utf8_lossy(entry.path_bytes()).as_ref());
            let status = entry.status();

            if status.contains(Status::WT_NEW) {
                changes.untracked.push(path.clone());
            }
            if status.intersects(
                Status::WT_MODIFIED
                    | Status::WT_DELETED
                    | Status::WT_RENAMED
                    | Status::WT_TYPECHANGE
                    | Status::CONFLICTED,
            ) {
                changes.unstaged.push(path.clone());
            }
            if status.intersects(
                Status::INDEX_NEW
                    | Status::INDEX_MODIFIED
                    | Status::INDEX_DELETED
                    | Status::INDEX_RENAMED
                    | Status::INDEX_TYPECHANGE,
            ) {
                changes.staged.push(path);
            }
        }

        debug!(
            "{}: {} unstaged, {} staged, {} untracked",
            self.path.display(),
            changes.unstaged.len(),
            changes.staged.len(),
            changes.untracked.len()
        );
        Ok(changes)
    }

    fn head_short_id(&self) -> GitResult<String> {
        let repo = self.open()?;
        let commit = repo.head()?.peel_to_commit()?;
        short_id(&commit)
    }

    fn fetch_all(&self) -> GitResult<()> {
        let repo = self.open()?;
        let remotes = repo.remotes()?;

        if remotes.is_empty() {
            debug!("No remotes configured for {}", self.path.display());
            return Ok(());
        }

        for name in remotes.iter().flatten() {
            info!("Fetching {}", name);
            let mut remote = repo.find_remote(name)?;
            let config = repo.config()?;

            let mut callbacks = RemoteCallbacks::new();
            let mut attempts = 0;
            callbacks.credentials(move |url, username_from_url, allowed_types| {
                attempts += 1;
                if attempts > MAX_CREDENTIAL_ATTEMPTS {
                    return Err(git2::Error::from_str("no usable credentials"));
                }
                if allowed_types.contains(CredentialType::SSH_KEY) {
                    if let Some(username) = username_from_url {
                        return Cred::ssh_key_from_agent(username);
                    }
                }
                if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                    return Cred::credential_helper(&config, url, username_from_url);
                }
                Cred::default()
            });
            callbacks.transfer_progress(|stats| {
                if stats.received_objects() == stats.total_objects() {
                    debug!(
                        "Resolving deltas {}/{}",
                        stats.indexed_deltas(),
                        stats.total_deltas()
                    );
                }
                true
            });

            let mut proxy_opts = ProxyOptions::new();
            proxy_opts.auto();

            let mut fetch_options = FetchOptions::new();
            fetch_options.remote_callbacks(callbacks);
            fetch_options.proxy_options(proxy_opts);
            fetch_options.download_tags(AutotagOption::Auto);

            remote
                .fetch(&[] as &[&str], Some(&mut fetch_options), None)
                .map_err(|source| GitError::FetchFailed {
                    remote: name.to_string(),
                    source,
                })?;
        }

        Ok(())
    }

    fn reset_hard(&self, refspec: &str) -> GitResult<()> {
        let repo = self.open()?;
        let commit = Self::find_commit(&repo, refspec)?;

        let mut checkout_builder = CheckoutBuilder::new();
        checkout_builder.force();
        repo.reset(commit.as_object(), ResetType::Hard, Some(&mut checkout_builder))?;

        info!("HEAD is now at {} {}", short_id(&commit)?, commit.summary().unwrap_or(""));
        Ok(())
    }

    fn commit_info(&self, refspec: &str) -> GitResult<CommitInfo> {
        let repo = self.open()?;
        let commit = Self::find_commit(&repo, refspec)?;

        let author = commit.author();
        let author_time = author_time(author.when())
            .ok_or_else(|| GitError::InvalidTime(commit.id().to_string()))?;

        let mut info = CommitInfo {
            id: commit.id().to_string(),
            short_id: short_id(&commit)?,
            author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
            author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
            author_time,
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            description: String::new(),
        };
        info.description = show(&repo, &commit, &info)?;
        Ok(info)
    }
}

fn short_id(commit: &Commit<'_>) -> GitResult<String> {
    let buf = commit.as_object().short_id()?;
    buf.as_str()
        .map(str::to_string)
        .ok_or_else(|| GitError::InvalidReference(commit.id().to_string()))
}

fn author_time(time: git2::Time) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(time.offset_minutes() * 60)?;
    DateTime::<Utc>::from_timestamp(time.seconds(), 0).map(|utc| utc.with_timezone(&offset))
}

/// Render a commit the way `git show` does: header, indented message, then the
/// patch against its first parent.
fn show(repo: &Repository, commit: &Commit<'_>, info: &CommitInfo) -> GitResult<String> {
    let mut out = format!(
        "commit {}\nAuthor: {} <{}>\nDate:   {}\n\n",
        info.id,
        info.author_name,
        info.author_email,
        info.long_date()
    );
    for line in info.message.trim_end().lines() {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');

    let tree = commit.tree()?;
    let parent_tree = match commit.parent_count() {
        0 => None,
        _ => Some(commit.parent(0)?.tree()?),
    };
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
            out.push(line.origin());
        }
        out.push_str(&String::from_utf8_lossy(line.content()));
        true
    })?;

    Ok(out)
}
