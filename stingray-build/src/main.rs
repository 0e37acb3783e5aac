//! generate-build: produce a Stingray build for one commit of a checkout.

use std::process::ExitCode;

use clap::Parser;
use convenient_git::GitCheckout;
use stingray_build::cli::Cli;
use stingray_build::preflight::StatvfsProbe;
use stingray_build::{BuildError, BuildReport, Orchestrator, SystemRunner, ToolConfig};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "generate_build=debug,stingray_build=debug,convenient_git=debug"
    } else {
        "generate_build=info,stingray_build=info,convenient_git=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn run(cli: Cli) -> Result<BuildReport, BuildError> {
    let config = match &cli.config {
        Some(path) => ToolConfig::load(path)?,
        None => ToolConfig::default(),
    };
    debug!("Driver: {} {}", config.driver.program, config.driver.args.join(" "));

    let request = cli.into_request()?;
    let checkout = GitCheckout::new(&request.repo_path);
    let runner = SystemRunner::new(request.verbose);
    Orchestrator::new(&checkout, &runner, &StatvfsProbe, &config).run(&request)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(report) => {
            println!(" Done. ({:.1} seconds.)", report.elapsed.as_secs_f64());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
