//! The build pipeline, start to finish.

use std::fmt;
use std::time::{Duration, Instant};

use convenient_git::Checkout;
use tracing::{debug, info};

use crate::checkout::{CheckoutGuard, CommitResolver};
use crate::config::ToolConfig;
use crate::driver::{BuildDriverInvoker, BuildJob};
use crate::error::BuildError;
use crate::finalize::{Artifact, ArtifactFinalizer};
use crate::preflight::{DiskProbe, Preflight};
use crate::quotes;
use crate::request::{BuildEnv, BuildOutputLocation, BuildRequest, ResolvedCommit};
use crate::runner::CommandRunner;

/// Pipeline stages, in the order a successful run passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    CheckoutClean,
    Fetching,
    Resetting,
    /// Driver attempt, 1 or 2
    Building(u8),
    CleaningStaleState,
    RecordingFailure,
    Finalizing,
    Done,
    Aborted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validating => write!(f, "validating"),
            Stage::CheckoutClean => write!(f, "checking checkout"),
            Stage::Fetching => write!(f, "fetching"),
            Stage::Resetting => write!(f, "resetting"),
            Stage::Building(attempt) => write!(f, "building (attempt {attempt})"),
            Stage::CleaningStaleState => write!(f, "cleaning stale build state"),
            Stage::RecordingFailure => write!(f, "recording failure"),
            Stage::Finalizing => write!(f, "finalizing"),
            Stage::Done => write!(f, "done"),
            Stage::Aborted => write!(f, "aborted"),
        }
    }
}

pub(crate) fn enter(stage: Stage) {
    debug!("Stage: {}", stage);
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub name: String,
    pub folder_id: String,
    pub commit: ResolvedCommit,
    pub artifact: Artifact,
    /// Driver invocations, 1 or 2
    pub attempts: u8,
    pub elapsed: Duration,
}

/// Runs one build request against a checkout, a command runner and a disk.
pub struct Orchestrator<'a> {
    checkout: &'a dyn Checkout,
    runner: &'a dyn CommandRunner,
    disk: &'a dyn DiskProbe,
    config: &'a ToolConfig,
    version_label: Option<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        checkout: &'a dyn Checkout,
        runner: &'a dyn CommandRunner,
        disk: &'a dyn DiskProbe,
        config: &'a ToolConfig,
    ) -> Self {
        Self {
            checkout,
            runner,
            disk,
            config,
            version_label: None,
        }
    }

    /// Use a fixed product version label instead of a random quote.
    pub fn with_version_label(mut self, label: impl Into<String>) -> Self {
        self.version_label = Some(label.into());
        self
    }

    pub fn run(&self, request: &BuildRequest) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let result = self.pipeline(request, start);
        if result.is_err() {
            enter(Stage::Aborted);
        }
        result
    }

    fn pipeline(&self, request: &BuildRequest, start: Instant) -> Result<BuildReport, BuildError> {
        enter(Stage::Validating);
        let workspace =
            Preflight::new(self.disk).validate(&request.repo_path, &request.output_dir)?;

        enter(Stage::CheckoutClean);
        CheckoutGuard::new(self.checkout).ensure_clean()?;

        let commit = CommitResolver::new(self.checkout).resolve(request.commit.as_deref())?;
        let name = request.build_name(&commit);
        let folder_id = commit.folder_id();
        let location = BuildOutputLocation::new(&workspace.output_dir, &folder_id, &name);

        let version_label = self
            .version_label
            .clone()
            .unwrap_or_else(|| quotes::pick().to_string());
        debug!("Version label: {}", version_label);
        let env = BuildEnv {
            lib_dir: workspace.libs_dir.clone(),
            bin_dir: location.building_dir.clone(),
            version_label,
            build_timestamp: commit.short_date.clone(),
        };

        let job = BuildJob {
            repo_dir: &workspace.repo_dir,
            output_dir: &workspace.output_dir,
            location: &location,
            commit: &commit,
            env: &env,
            extra_args: &request.extra_args,
        };
        let built = BuildDriverInvoker::new(self.runner, &self.config.driver).build(&job)?;

        enter(Stage::Finalizing);
        let artifact = ArtifactFinalizer::new(self.runner, &self.config.archive).finalize(
            &location,
            &name,
            request.zip,
        )?;
        info!("Build {} ready at {}", name, artifact.path().display());

        enter(Stage::Done);
        Ok(BuildReport {
            name,
            folder_id,
            commit,
            artifact,
            attempts: built.attempt.number(),
            elapsed: start.elapsed(),
        })
    }
}
