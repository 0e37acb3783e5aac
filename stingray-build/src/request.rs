//! Values that describe one build: what was asked for, which commit it
//! resolved to and where its output goes.

use std::path::{Path, PathBuf};

use convenient_git::CommitInfo;

/// Transient directory under the output root holding in-flight builds.
pub const BUILDING_DIR: &str = ".building";

/// Prefix of derived build names.
pub const DEFAULT_NAME_PREFIX: &str = "stingray_";

/// A build as requested on the command line. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub repo_path: PathBuf,
    /// Commit to build; the current head when absent
    pub commit: Option<String>,
    pub output_dir: PathBuf,
    /// Build name; derived from the commit when absent
    pub name: Option<String>,
    pub zip: bool,
    pub verbose: bool,
    /// Passed verbatim, in order, to the build driver
    pub extra_args: Vec<String>,
}

impl BuildRequest {
    /// The requested name, or `stingray_{commit}_{date}`.
    pub fn build_name(&self, commit: &ResolvedCommit) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| commit.default_build_name())
    }
}

/// The commit a request resolved to after fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommit {
    pub short_hash: String,
    /// Author date, `YYYY-MM-DD`
    pub short_date: String,
    /// Author date in git's default format
    pub long_date: String,
    /// `git show` output for the commit
    pub description: String,
}

impl ResolvedCommit {
    /// Deterministic output folder name: `{short_hash}_{short_date}`.
    pub fn folder_id(&self) -> String {
        format!("{}_{}", self.short_hash, self.short_date)
    }

    pub fn default_build_name(&self) -> String {
        format!("{DEFAULT_NAME_PREFIX}{}", self.folder_id())
    }
}

impl From<CommitInfo> for ResolvedCommit {
    fn from(info: CommitInfo) -> Self {
        Self {
            short_date: info.short_date(),
            long_date: info.long_date(),
            short_hash: info.short_id,
            description: info.description,
        }
    }
}

/// Where a build is produced and where it ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutputLocation {
    /// `{output}/.building/{folder_id}`, owned by the running attempt
    pub building_dir: PathBuf,
    /// `{output}/{folder_id}`
    pub final_dir: PathBuf,
    /// `{output}/{name}.exe`
    pub archive_path: PathBuf,
}

impl BuildOutputLocation {
    pub fn new(output_dir: &Path, folder_id: &str, name: &str) -> Self {
        Self {
            building_dir: output_dir.join(BUILDING_DIR).join(folder_id),
            final_dir: output_dir.join(folder_id),
            archive_path: output_dir.join(format!("{name}.exe")),
        }
    }
}

/// Environment handed to the build driver process.
///
/// Kept as a value passed with each command rather than set on this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnv {
    /// Shared library cache (`SR_LIB_DIR`)
    pub lib_dir: PathBuf,
    /// Build output directory (`SR_BIN_DIR`)
    pub bin_dir: PathBuf,
    /// Product version label (`SR_PRODUCT_VERSION_LABEL`)
    pub version_label: String,
    /// Commit date (`SR_PRODUCT_BUILD_TIMESTAMP`)
    pub build_timestamp: String,
}

impl BuildEnv {
    pub fn vars(&self) -> Vec<(String, String)> {
        vec![
            ("SR_LIB_DIR".to_string(), self.lib_dir.display().to_string()),
            ("SR_BIN_DIR".to_string(), self.bin_dir.display().to_string()),
            (
                "SR_PRODUCT_VERSION_LABEL".to_string(),
                self.version_label.clone(),
            ),
            (
                "SR_PRODUCT_BUILD_TIMESTAMP".to_string(),
                self.build_timestamp.clone(),
            ),
        ]
    }
}
