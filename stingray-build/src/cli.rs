//! Command line options.

use std::path::PathBuf;

use clap::{crate_version, Parser};

use crate::error::BuildError;
use crate::request::BuildRequest;

/// Options for the application.
#[derive(Debug, Parser)]
#[command(
    name = "generate-build",
    version = crate_version!(),
    about = "Used to generate custom builds for the Stingray Build Generator.",
    override_usage = "generate-build [OPTIONS...] [BUILD OPTIONS]"
)]
pub struct Cli {
    /// Build name
    #[arg(long)]
    pub name: Option<String>,

    /// Repo in which to start build
    #[arg(short, long)]
    pub repo: Option<PathBuf>,

    /// Which commit to build
    #[arg(short = 'b', long)]
    pub commit: Option<String>,

    /// Output directory where to store the build
    #[arg(short, long, default_value = "builds")]
    pub output: PathBuf,

    /// Zip all the builds
    #[arg(short, long)]
    pub zip: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Tool configuration file
    #[arg(short, long, env = "STINGRAY_BUILD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Options passed through to the build driver
    #[arg(
        value_name = "BUILD OPTIONS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub build_options: Vec<String>,
}

impl Cli {
    /// `--repo` is checked here rather than by clap so that leaving it out is a
    /// regular build error.
    pub fn into_request(self) -> Result<BuildRequest, BuildError> {
        let repo_path = self.repo.ok_or(BuildError::MissingRepo)?;
        Ok(BuildRequest {
            repo_path,
            commit: self.commit,
            output_dir: self.output,
            name: self.name,
            zip: self.zip,
            verbose: self.verbose,
            extra_args: self.build_options,
        })
    }
}
