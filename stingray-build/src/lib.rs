//! Stingray build generator
//!
//! Produces a packaged Stingray build for one commit of a source checkout:
//!
//! 1. Preflight: repo and output directories exist, enough free disk space
//! 2. Checkout guard: refuse to touch a working copy with local changes
//! 3. Commit resolution: fetch all remotes, hard reset to the requested commit
//! 4. Build driver invocation, retried once after clearing stale build state
//! 5. Finalization: a self-extracting archive or a commit-named directory
//!
//! Everything runs sequentially. External collaborators sit behind small traits
//! ([`convenient_git::Checkout`], [`runner::CommandRunner`], [`preflight::DiskProbe`])
//! so the pipeline can be driven by fakes in tests.

pub mod checkout;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod finalize;
pub mod orchestrator;
pub mod preflight;
pub mod quotes;
pub mod request;
pub mod runner;

pub use config::ToolConfig;
pub use error::{BuildError, ErrorKind};
pub use finalize::Artifact;
pub use orchestrator::{BuildReport, Orchestrator, Stage};
pub use request::{BuildEnv, BuildOutputLocation, BuildRequest, ResolvedCommit};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
