//! Build driver invocation with a single retry on failure.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::DriverConfig;
use crate::error::BuildError;
use crate::orchestrator::{enter, Stage};
use crate::request::{BuildEnv, BuildOutputLocation, ResolvedCommit};
use crate::runner::{CommandRunner, CommandSpec};

/// Flags every generated build passes to the driver, ahead of `--output`.
pub const DRIVER_FLAGS: [&str; 7] = [
    "--distrib",
    "--no-internal",
    "--no-exporters",
    "--no-use-editor-templates",
    "--no-remote-cache",
    "--engine",
    "--editor",
];

/// Incremental build state under the repo, cleared before the retry.
pub const STALE_STATE_DIR: &str = "build";

/// Provenance file written into every build.
pub const BUILD_INFO_FILE: &str = "BUILD_INFO.TXT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Retry,
}

impl Attempt {
    /// 1-based attempt number.
    pub fn number(self) -> u8 {
        match self {
            Attempt::Initial => 1,
            Attempt::Retry => 2,
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attempt::Initial => f.write_str("initial attempt"),
            Attempt::Retry => f.write_str("retry"),
        }
    }
}

/// Outcome of one driver invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildAttemptResult {
    pub attempt: Attempt,
    pub exit_code: Option<i32>,
    pub log: String,
}

impl BuildAttemptResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Everything the driver needs to build one commit.
#[derive(Debug, Clone)]
pub struct BuildJob<'a> {
    pub repo_dir: &'a Path,
    pub output_dir: &'a Path,
    pub location: &'a BuildOutputLocation,
    pub commit: &'a ResolvedCommit,
    pub env: &'a BuildEnv,
    pub extra_args: &'a [String],
}

impl BuildJob<'_> {
    /// `{output}/BUILD_FAILED_{short_hash}.TXT`
    pub fn failure_log_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("BUILD_FAILED_{}.TXT", self.commit.short_hash))
    }
}

pub struct BuildDriverInvoker<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a DriverConfig,
}

impl<'a> BuildDriverInvoker<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a DriverConfig) -> Self {
        Self { runner, config }
    }

    /// The driver command line for `job`.
    pub fn command(&self, job: &BuildJob<'_>) -> CommandSpec {
        CommandSpec::new(&self.config.program)
            .args(self.config.args.iter().map(String::as_str))
            .args(DRIVER_FLAGS)
            .arg("--output")
            .arg(job.location.building_dir.display().to_string())
            .args(job.extra_args.iter().map(String::as_str))
            .current_dir(job.repo_dir)
            .envs(job.env.vars())
    }

    /// Run the driver, retrying once after clearing the repo's stale build
    /// state. Returns the successful attempt.
    ///
    /// When the retry fails too, the failure log is written next to the builds,
    /// the building directory is removed and [`BuildError::BuildFailed`] is
    /// returned.
    pub fn build(&self, job: &BuildJob<'_>) -> Result<BuildAttemptResult, BuildError> {
        let command = self.command(job);
        info!("Running {}", command.command_line());

        let first = self.attempt(Attempt::Initial, job, &command)?;
        if first.success() {
            return Ok(first);
        }
        warn!(
            "Build of {} failed with {:?}, retrying after clearing stale build state",
            job.commit.short_hash, first.exit_code
        );

        enter(Stage::CleaningStaleState);
        let stale = job.repo_dir.join(STALE_STATE_DIR);
        if stale.is_dir() {
            fs::remove_dir_all(&stale).map_err(BuildError::io("remove", &stale))?;
        }

        let retry = self.attempt(Attempt::Retry, job, &command)?;
        if retry.success() {
            return Ok(retry);
        }

        enter(Stage::RecordingFailure);
        Err(self.record_failure(job, &command, &retry))
    }

    fn attempt(
        &self,
        attempt: Attempt,
        job: &BuildJob<'_>,
        command: &CommandSpec,
    ) -> Result<BuildAttemptResult, BuildError> {
        enter(Stage::Building(attempt.number()));
        let building = &job.location.building_dir;
        prepare_building_dir(building)?;

        let info_path = building.join(BUILD_INFO_FILE);
        let info = format!("{}\r\n{}", command.command_line(), job.commit.description);
        fs::write(&info_path, info).map_err(BuildError::io("write", &info_path))?;

        let output = match self.runner.run(command) {
            Ok(output) => output,
            Err(source) => {
                remove_building_dir(building);
                return Err(BuildError::DriverSpawn {
                    program: command.program.clone(),
                    source,
                });
            }
        };

        Ok(BuildAttemptResult {
            attempt,
            exit_code: output.code,
            log: output.log,
        })
    }

    fn record_failure(
        &self,
        job: &BuildJob<'_>,
        command: &CommandSpec,
        failed: &BuildAttemptResult,
    ) -> BuildError {
        let path = job.failure_log_path();
        let contents = format!("{}\r\n{}", command.command_line(), failed.log);
        if let Err(source) = fs::write(&path, contents) {
            remove_building_dir(&job.location.building_dir);
            return BuildError::io("write", &path)(source);
        }

        eprintln!("{}", failed.log);
        error!(
            "Build of {} failed on {}, log written to {}",
            job.commit.short_hash,
            failed.attempt,
            path.display()
        );
        remove_building_dir(&job.location.building_dir);

        BuildError::BuildFailed {
            commit: job.commit.short_hash.clone(),
            log: path,
        }
    }
}

fn prepare_building_dir(building: &Path) -> Result<(), BuildError> {
    if building.exists() {
        fs::remove_dir_all(building).map_err(BuildError::io("remove", building))?;
    }
    fs::create_dir_all(building).map_err(BuildError::io("create", building))
}

/// Best effort cleanup on failure paths.
pub(crate) fn remove_building_dir(building: &Path) {
    if let Err(e) = fs::remove_dir_all(building) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", building.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use std::cell::RefCell;
    use std::io;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    /// Replays scripted outcomes and records what it was asked to run, along
    /// with whether the building directory held BUILD_INFO at the time.
    struct ScriptedRunner {
        outcomes: RefCell<Vec<io::Result<CommandOutput>>>,
        calls: RefCell<Vec<CommandSpec>>,
        info_present: RefCell<Vec<bool>>,
    }

    impl ScriptedRunner {
        fn new(codes: &[i32]) -> Self {
            let outcomes = codes
                .iter()
                .map(|&code| {
                    Ok(CommandOutput {
                        code: Some(code),
                        log: format!("exit {code}"),
                    })
                })
                .collect();
            Self::with_outcomes(outcomes)
        }

        fn with_outcomes(outcomes: Vec<io::Result<CommandOutput>>) -> Self {
            Self {
                outcomes: RefCell::new(outcomes),
                calls: RefCell::new(vec![]),
                info_present: RefCell::new(vec![]),
            }
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
            let building = PathBuf::from(spec.arg_after("--output").unwrap());
            self.info_present
                .borrow_mut()
                .push(building.join(BUILD_INFO_FILE).is_file());
            self.calls.borrow_mut().push(spec.clone());
            self.outcomes.borrow_mut().remove(0)
        }
    }

    struct Fixture {
        _temp: TempDir,
        repo: PathBuf,
        output: PathBuf,
        location: BuildOutputLocation,
        commit: ResolvedCommit,
        env: BuildEnv,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let repo = temp.path().join("repo");
        let output = temp.path().join("builds");
        fs::create_dir_all(&repo).unwrap();
        fs::create_dir_all(&output).unwrap();
        let commit = ResolvedCommit {
            short_hash: "abc1234".to_string(),
            short_date: "2024-03-01".to_string(),
            long_date: "Fri Mar 1 12:00:00 2024 +0000".to_string(),
            description: "commit abc1234\n\n    Fix things".to_string(),
        };
        let location = BuildOutputLocation::new(&output, &commit.folder_id(), "nightly");
        let env = BuildEnv {
            lib_dir: output.join(".libs"),
            bin_dir: location.building_dir.clone(),
            version_label: "This software rocks!".to_string(),
            build_timestamp: commit.short_date.clone(),
        };
        Fixture {
            _temp: temp,
            repo,
            output,
            location,
            commit,
            env,
        }
    }

    impl Fixture {
        fn job<'a>(&'a self, extra_args: &'a [String]) -> BuildJob<'a> {
            BuildJob {
                repo_dir: &self.repo,
                output_dir: &self.output,
                location: &self.location,
                commit: &self.commit,
                env: &self.env,
                extra_args,
            }
        }
    }

    #[test]
    fn test_command_layout() {
        let fx = fixture();
        let extra = vec!["--no-tests".to_string(), "--arch".to_string(), "x64".to_string()];
        let runner = ScriptedRunner::new(&[]);
        let config = DriverConfig::default();

        let command = BuildDriverInvoker::new(&runner, &config).command(&fx.job(&extra));
        let building = fx.location.building_dir.display().to_string();

        let mut expected = vec!["make.rb", "--verbose"];
        expected.extend(DRIVER_FLAGS);
        expected.extend(["--output", building.as_str(), "--no-tests", "--arch", "x64"]);
        assert_eq!(command.program, "ruby");
        assert_eq!(command.args, expected);
        assert_eq!(command.current_dir.as_deref(), Some(fx.repo.as_path()));
        assert_eq!(command.env, fx.env.vars());
    }

    #[test]
    fn test_first_attempt_success() {
        let fx = fixture();
        let runner = ScriptedRunner::new(&[0]);
        let config = DriverConfig::default();

        let result = BuildDriverInvoker::new(&runner, &config)
            .build(&fx.job(&[]))
            .unwrap();
        assert_eq!(result.attempt, Attempt::Initial);
        assert_eq!(runner.calls.borrow().len(), 1);
        assert_eq!(*runner.info_present.borrow(), vec![true]);

        let info = fs::read_to_string(fx.location.building_dir.join(BUILD_INFO_FILE)).unwrap();
        let (command_line, description) = info.split_once("\r\n").unwrap();
        assert!(command_line.starts_with("ruby make.rb --verbose --distrib"));
        assert_eq!(description, fx.commit.description);
    }

    #[test]
    #[traced_test]
    fn test_retry_clears_stale_state_and_succeeds() {
        let fx = fixture();
        let stale = fx.repo.join(STALE_STATE_DIR);
        fs::create_dir_all(stale.join("obj")).unwrap();
        let runner = ScriptedRunner::new(&[1, 0]);
        let config = DriverConfig::default();

        let result = BuildDriverInvoker::new(&runner, &config)
            .build(&fx.job(&[]))
            .unwrap();
        assert_eq!(result.attempt, Attempt::Retry);
        assert!(!stale.exists());
        assert_eq!(runner.calls.borrow().len(), 2);
        assert_eq!(runner.calls.borrow()[0], runner.calls.borrow()[1]);
        assert_eq!(*runner.info_present.borrow(), vec![true, true]);
        assert!(logs_contain("retrying"));
        assert!(!fx.job(&[]).failure_log_path().exists());
    }

    #[test]
    #[traced_test]
    fn test_second_failure_records_log() {
        let fx = fixture();
        let runner = ScriptedRunner::new(&[2, 3, 0]);
        let config = DriverConfig::default();

        let err = BuildDriverInvoker::new(&runner, &config)
            .build(&fx.job(&[]))
            .unwrap_err();

        let no_args: Vec<String> = vec![];
        let job = fx.job(&no_args);
        match err {
            BuildError::BuildFailed { commit, log } => {
                assert_eq!(commit, "abc1234");
                assert_eq!(log, job.failure_log_path());
            }
            other => panic!("expected BuildFailed, got {other:?}"),
        }
        assert_eq!(runner.calls.borrow().len(), 2);
        assert!(!fx.location.building_dir.exists());

        let recorded = fs::read_to_string(fx.output.join("BUILD_FAILED_abc1234.TXT")).unwrap();
        assert!(recorded.ends_with("\r\nexit 3"));
        assert!(logs_contain("failed on retry"));
    }

    #[test]
    fn test_spawn_failure_is_not_retried() {
        let fx = fixture();
        let runner = ScriptedRunner::with_outcomes(vec![Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no ruby",
        ))]);
        let config = DriverConfig::default();

        let err = BuildDriverInvoker::new(&runner, &config)
            .build(&fx.job(&[]))
            .unwrap_err();
        assert!(matches!(err, BuildError::DriverSpawn { .. }));
        assert_eq!(runner.calls.borrow().len(), 1);
        assert!(!fx.location.building_dir.exists());
    }

    #[test]
    fn test_leftover_building_dir_is_replaced() {
        let fx = fixture();
        fs::create_dir_all(&fx.location.building_dir).unwrap();
        fs::write(fx.location.building_dir.join("leftover.dll"), "old").unwrap();
        let runner = ScriptedRunner::new(&[0]);
        let config = DriverConfig::default();

        BuildDriverInvoker::new(&runner, &config)
            .build(&fx.job(&[]))
            .unwrap();
        assert!(!fx.location.building_dir.join("leftover.dll").exists());
    }
}
