//! Blocking execution of external commands with captured output.

use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;

use tracing::debug;

/// A command to run: program, arguments, working directory and the extra
/// environment it gets on top of the inherited one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn envs(mut self, vars: Vec<(String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Value of the argument following `flag`, if any.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Shell-like rendering for logs and `BUILD_INFO.TXT`.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(part: &str) -> String {
    if part.is_empty() || part.chars().any(char::is_whitespace) {
        format!("\"{part}\"")
    } else {
        part.to_string()
    }
}

/// Result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    /// Combined stdout and stderr
    pub log: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands.
///
/// `Err` means the command could not be started; a command that ran and failed
/// is an `Ok` with a non-zero code.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;
}

/// Runs commands as child processes and waits for them without a timeout.
pub struct SystemRunner {
    verbose: bool,
}

impl SystemRunner {
    /// With `verbose`, output lines are echoed to stdout as they arrive.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        debug!("Running {}", spec.command_line());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel();
        let log = thread::scope(|scope| {
            if let Some(stdout) = stdout {
                let tx = tx.clone();
                scope.spawn(move || forward_lines(stdout, tx));
            }
            if let Some(stderr) = stderr {
                let tx = tx.clone();
                scope.spawn(move || forward_lines(stderr, tx));
            }
            drop(tx);

            let mut log = String::new();
            for line in rx {
                if self.verbose {
                    println!("{line}");
                }
                log.push_str(&line);
                log.push('\n');
            }
            log
        });

        let status = child.wait()?;
        debug!("{} exited with {:?}", spec.program, status.code());

        Ok(CommandOutput {
            code: status.code(),
            log: log.trim().to_string(),
        })
    }
}

fn forward_lines(reader: impl Read, tx: Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(&['\r', '\n'][..])
                    .to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_whitespace() {
        let spec = CommandSpec::new("ruby")
            .args(["make.rb", "--output"])
            .arg("/tmp/my builds/x")
            .arg("");
        assert_eq!(
            spec.command_line(),
            "ruby make.rb --output \"/tmp/my builds/x\" \"\""
        );
    }

    #[test]
    fn test_arg_after() {
        let spec = CommandSpec::new("ruby").args(["--output", "/out", "--engine"]);
        assert_eq!(spec.arg_after("--output"), Some("/out"));
        assert_eq!(spec.arg_after("--engine"), None);
        assert_eq!(spec.arg_after("--missing"), None);
    }

    #[test]
    fn test_missing_program_is_a_spawn_error() {
        let runner = SystemRunner::new(false);
        let err = runner
            .run(&CommandSpec::new("definitely-not-a-real-program-4242"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout_stderr_and_exit_code() {
        let runner = SystemRunner::new(false);
        let output = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo out; echo err 1>&2; exit 3"]))
            .unwrap();

        assert_eq!(output.code, Some(3));
        assert!(!output.success());
        assert!(output.log.contains("out"));
        assert!(output.log.contains("err"));
    }

    #[cfg(unix)]
    #[test]
    fn test_passes_env_and_working_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("marker"), "").unwrap();
        let runner = SystemRunner::new(false);
        let output = runner
            .run(
                &CommandSpec::new("sh")
                    .args(["-c", "echo \"$SR_LIB_DIR\"; ls"])
                    .current_dir(temp.path())
                    .envs(vec![("SR_LIB_DIR".to_string(), "/cache/libs".to_string())]),
            )
            .unwrap();

        assert!(output.success());
        assert_eq!(output.log, "/cache/libs\nmarker");
    }
}
