//! External command execution.
//!
//! Every interaction with the optical hardware goes through an external
//! program (`cdrecord`, `mkisofs`, `growisofs`, `eject`, ...). This module
//! provides:
//!
//! - [`CommandPaths`] - maps logical command names to executables
//! - [`CommandRunner`] - the seam that actually launches a program
//! - [`Toolchain`] - paths + runner, handed to every writer and image
//! - [`Cmd`] - a small builder for one invocation
//! - [`ScriptedRunner`] - canned responses, for running without hardware
//!
//! # Example
//!
//! ```rust,ignore
//! use optical_writer::process::Toolchain;
//!
//! let toolchain = Toolchain::default();
//! let result = toolchain
//!     .cmd("cdrecord")
//!     .args(["-msinfo", "dev=/dev/cdrw"])
//!     .error_msg("reading disc boundaries")
//!     .run()?;
//! for line in result.stdout_lines() {
//!     println!("{line}");
//! }
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::{Result, WriterError};

/// Captured outcome of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Exit code with signals reported as `-1`.
    pub fn code(&self) -> i32 {
        self.status.unwrap_or(-1)
    }

    /// Standard output split into lines, stderr ignored.
    pub fn stdout_lines(&self) -> Vec<&str> {
        self.stdout.lines().collect()
    }

    /// Standard output followed by standard error.
    pub fn output_lines(&self) -> Vec<&str> {
        self.stdout.lines().chain(self.stderr.lines()).collect()
    }
}

/// Launches a resolved program and collects its output.
pub trait CommandRunner: Send + Sync + fmt::Debug {
    fn execute(&self, program: &Path, args: &[String]) -> io::Result<CommandResult>;
}

/// Runs programs on the host with [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn execute(&self, program: &Path, args: &[String]) -> io::Result<CommandResult> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandResult {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Mapping from logical command name to the executable that implements it.
///
/// Names without an override resolve to themselves and are looked up in
/// `PATH` when launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPaths {
    overrides: BTreeMap<String, PathBuf>,
}

impl CommandPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect `name` to `path`.
    pub fn with(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.set(name, path);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.overrides.insert(name.into(), path.into());
    }

    pub fn resolve(&self, name: &str) -> PathBuf {
        self.overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(name))
    }

    /// Locate the executable for `name` on this host, if any.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        which::which(self.resolve(name)).ok()
    }
}

/// Command paths plus the runner that executes them.
#[derive(Debug, Clone)]
pub struct Toolchain {
    paths: CommandPaths,
    runner: Arc<dyn CommandRunner>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::new(CommandPaths::default(), Arc::new(SystemRunner))
    }
}

impl Toolchain {
    pub fn new(paths: CommandPaths, runner: Arc<dyn CommandRunner>) -> Self {
        Self { paths, runner }
    }

    pub fn with_paths(paths: CommandPaths) -> Self {
        Self::new(paths, Arc::new(SystemRunner))
    }

    pub fn paths(&self) -> &CommandPaths {
        &self.paths
    }

    /// Start building an invocation of the logical command `name`.
    pub fn cmd(&self, name: &str) -> Cmd<'_> {
        Cmd {
            toolchain: self,
            name: name.to_string(),
            args: Vec::new(),
            error_msg: None,
            allow_fail: false,
        }
    }
}

/// Builder for a single external command.
#[derive(Debug)]
pub struct Cmd<'a> {
    toolchain: &'a Toolchain,
    name: String,
    args: Vec<String>,
    error_msg: Option<String>,
    allow_fail: bool,
}

impl Cmd<'_> {
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

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Description of what the command was doing, used if it fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Return the result instead of an error when the exit status is non-zero.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    pub fn run(self) -> Result<CommandResult> {
        let program = self.toolchain.paths.resolve(&self.name);
        debug!("Executing: {} {}", program.display(), self.args.join(" "));

        let result = self
            .toolchain
            .runner
            .execute(&program, &self.args)
            .map_err(|source| WriterError::Spawn {
                program: self.name.clone(),
                source,
            })?;

        if !result.success() && !self.allow_fail {
            return Err(WriterError::CommandFailed {
                program: self.name,
                status: result.code(),
                message: self
                    .error_msg
                    .unwrap_or_else(|| "command failed".to_string()),
            });
        }

        Ok(result)
    }
}

/// An invocation recorded by [`ScriptedRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Runner that answers from a queue of canned results.
///
/// Responses are consumed in order; each one names the program it expects.
/// Running out of responses, or a program mismatch, is reported as a spawn
/// failure so that unexpected commands surface as errors.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<(String, CommandResult)>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for the next invocation of `program`.
    pub fn respond(&self, program: &str, status: i32, stdout: &str) -> &Self {
        self.respond_with(program, CommandResult::new(status, stdout, ""))
    }

    pub fn respond_with(&self, program: &str, result: CommandResult) -> &Self {
        lock(&self.responses).push_back((program.to_string(), result));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Argument vectors of every recorded invocation of `program`.
    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        lock(&self.calls)
            .iter()
            .filter(|call| program_matches(&call.program, program))
            .map(|call| call.args.clone())
            .collect()
    }

    pub fn pending(&self) -> usize {
        lock(&self.responses).len()
    }
}

impl CommandRunner for ScriptedRunner {
    fn execute(&self, program: &Path, args: &[String]) -> io::Result<CommandResult> {
        lock(&self.calls).push(RecordedCall {
            program: program.to_path_buf(),
            args: args.to_vec(),
        });

        let (expected, result) = lock(&self.responses).pop_front().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no scripted response left for {}", program.display()),
            )
        })?;

        if !program_matches(program, &expected) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "expected {} to be executed, got {}",
                    expected,
                    program.display()
                ),
            ));
        }

        Ok(result)
    }
}

fn program_matches(program: &Path, expected: &str) -> bool {
    program == Path::new(expected) || program.file_name() == Some(OsStr::new(expected))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted() -> (Arc<ScriptedRunner>, Toolchain) {
        let runner = Arc::new(ScriptedRunner::new());
        let toolchain = Toolchain::new(CommandPaths::default(), runner.clone());
        (runner, toolchain)
    }

    #[test]
    fn test_command_paths_default_identity() {
        let paths = CommandPaths::new();
        assert_eq!(paths.resolve("cdrecord"), PathBuf::from("cdrecord"));
    }

    #[test]
    fn test_command_paths_override() {
        let paths = CommandPaths::new().with("mkisofs", "/opt/bin/genisoimage");
        assert_eq!(
            paths.resolve("mkisofs"),
            PathBuf::from("/opt/bin/genisoimage")
        );
        assert_eq!(paths.resolve("eject"), PathBuf::from("eject"));
    }

    #[test]
    fn test_locate_missing_command() {
        let paths = CommandPaths::new();
        assert!(paths.locate("definitely_not_a_real_command_12345").is_none());
    }

    #[test]
    fn test_cmd_records_resolved_program() {
        let runner = Arc::new(ScriptedRunner::new());
        let paths = CommandPaths::new().with("eject", "/sbin/eject");
        let toolchain = Toolchain::new(paths, runner.clone());
        runner.respond("eject", 0, "");

        toolchain.cmd("eject").arg("-t").arg("/dev/cdrw").run().unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, PathBuf::from("/sbin/eject"));
        assert_eq!(calls[0].args, vec!["-t", "/dev/cdrw"]);
    }

    #[test]
    fn test_cmd_nonzero_exit_is_error() {
        let (runner, toolchain) = scripted();
        runner.respond("cdrecord", 3, "");

        let err = toolchain
            .cmd("cdrecord")
            .error_msg("blanking disc")
            .run()
            .unwrap_err();
        match err {
            WriterError::CommandFailed {
                program,
                status,
                message,
            } => {
                assert_eq!(program, "cdrecord");
                assert_eq!(status, 3);
                assert_eq!(message, "blanking disc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cmd_allow_fail_returns_result() {
        let (runner, toolchain) = scripted();
        runner.respond_with("growisofs", CommandResult::new(1, "", "oops\n"));

        let result = toolchain.cmd("growisofs").allow_fail().run().unwrap();
        assert!(!result.success());
        assert_eq!(result.output_lines(), vec!["oops"]);
    }

    #[test]
    fn test_unexpected_program_is_spawn_error() {
        let (runner, toolchain) = scripted();
        runner.respond("mkisofs", 0, "");

        let err = toolchain.cmd("cdrecord").run().unwrap_err();
        assert!(matches!(err, WriterError::Spawn { .. }));
    }

    #[test]
    fn test_exhausted_script_is_spawn_error() {
        let (_runner, toolchain) = scripted();
        let err = toolchain.cmd("eject").run().unwrap_err();
        assert!(matches!(err, WriterError::Spawn { .. }));
    }

    #[test]
    fn test_system_runner_captures_output() {
        let result = SystemRunner
            .execute(Path::new("sh"), &["-c".into(), "echo hi; exit 2".into()])
            .unwrap();
        assert_eq!(result.status, Some(2));
        assert_eq!(result.stdout_lines(), vec!["hi"]);
    }
}
