// src/recipe/kitchen/runner.rs

//! External process execution for the Kitchen
//!
//! Every generator, compiler, patch and test-artifact invocation goes
//! through a [`CommandRunner`]. The system implementation spawns real
//! processes bounded by a timeout; tests substitute a recorder so they can
//! observe exactly which commands would have been spawned.

use crate::error::{Error, Result, output_excerpt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// One process to spawn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
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

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Shell-like rendering for logs and error messages
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(part: &str) -> String {
    if !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:+,@%".contains(c))
    {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', "'\\''"))
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// `None` when the process was killed or timed out
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Output of a process that exited with `code`
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn excerpt(&self) -> String {
        output_excerpt(&self.stdout, &self.stderr)
    }
}

/// Spawns external processes
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output
    ///
    /// A non-zero exit is not an error at this level; only failing to spawn
    /// the process is.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Whether a program can be found on `PATH`
    fn is_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Run an invocation that must succeed, mapping failure to a build error
pub fn run_checked(
    runner: &dyn CommandRunner,
    phase: &str,
    invocation: &Invocation,
    log: &mut String,
) -> Result<CommandOutput> {
    let command = invocation.command_line();
    debug!("[{}] {}", phase, command);
    log.push_str(&format!("$ {}\n", command));

    let output = runner.run(invocation)?;
    log.push_str(&output.stdout);
    log.push_str(&output.stderr);

    if !output.succeeded() {
        return Err(Error::Build {
            phase: phase.to_string(),
            command,
            exit_code: output.exit_code,
            output: output.excerpt(),
        });
    }
    Ok(output)
}

/// Runs real processes with a timeout
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        buffer
    })
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::IoError(format!(
                    "Failed to spawn {}: {}",
                    invocation.program, e
                ))
            })?;

        // Pipes are drained concurrently so a chatty child cannot block on a
        // full pipe while we wait for it.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let (exit_code, timed_out) = match child.wait_timeout(self.timeout)? {
            Some(status) => (status.code(), false),
            None => {
                warn!(
                    "{} timed out after {} seconds, killing it",
                    invocation.program,
                    self.timeout.as_secs()
                );
                let _ = child.kill();
                let _ = child.wait();
                (None, true)
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes() {
        let inv = Invocation::new("cmake", "/tmp")
            .arg("-DNAME=hello world")
            .arg("-S")
            .arg("/src");
        assert_eq!(inv.command_line(), "cmake '-DNAME=hello world' -S /src");
    }

    #[test]
    fn test_output_success() {
        assert!(CommandOutput::success("ok").succeeded());
        assert!(!CommandOutput::exited(1, "", "boom").succeeded());
        assert!(!CommandOutput::default().succeeded());
    }

    struct Fixed(CommandOutput);

    impl CommandRunner for Fixed {
        fn run(&self, _invocation: &Invocation) -> Result<CommandOutput> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_run_checked_maps_failure_to_build_error() {
        let runner = Fixed(CommandOutput::exited(2, "", "CMake Error: no compiler"));
        let inv = Invocation::new("cmake", "/tmp").arg("--build").arg("build");
        let mut log = String::new();

        let err = run_checked(&runner, "build", &inv, &mut log).unwrap_err();
        match err {
            Error::Build {
                phase,
                command,
                exit_code,
                output,
            } => {
                assert_eq!(phase, "build");
                assert_eq!(command, "cmake --build build");
                assert_eq!(exit_code, Some(2));
                assert!(output.contains("no compiler"));
            }
            other => panic!("expected build error, got {:?}", other),
        }
        assert!(log.contains("$ cmake --build build"));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_output() {
        let runner = SystemRunner::new(Duration::from_secs(30));
        let inv = Invocation::new("sh", std::env::temp_dir())
            .arg("-c")
            .arg("echo out; echo err >&2; exit 3");
        let output = runner.run(&inv).unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_timeout() {
        let runner = SystemRunner::new(Duration::from_millis(200));
        let inv = Invocation::new("sleep", std::env::temp_dir()).arg("5");
        let output = runner.run(&inv).unwrap();
        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let inv = Invocation::new("definitely-not-a-real-program-xyz", std::env::temp_dir());
        assert!(runner.run(&inv).is_err());
        assert!(!runner.is_available("definitely-not-a-real-program-xyz"));
    }
}
