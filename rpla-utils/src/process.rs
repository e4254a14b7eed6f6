//! Explicit invocation of external tools (`make`, `ant`, compilers, ...).
//!
//! Every command is described by an [`Invocation`]: a program, an argument list and a working
//! directory. Commands are never built by interpolating a shell string. A [`CommandRunner`]
//! executes the invocation and returns the captured [`CommandOutput`].

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use itertools::Itertools;
use tokio::process::Command;

/// Error thrown when an external command could not be executed or did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The process could not be started at all.
    #[error("Cannot execute `{invocation}`: {source}")]
    Spawn {
        invocation: String,
        #[source]
        source: std::io::Error,
    },
    /// The process terminated with a non-zero exit status.
    #[error("`{invocation}` failed with {status}{}", fmt_stderr(.stderr))]
    Failed {
        invocation: String,
        status: String,
        stderr: String,
    },
}

fn fmt_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{stderr}")
    }
}

/// Description of a single external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory, or the current one if `None`.
    pub cwd: Option<PathBuf>,
    /// Additional environment variables.
    pub env: BTreeMap<String, String>,
    /// Connect the process to the terminal instead of capturing its output (used for GUIs and
    /// commands that may ask for a password).
    pub interactive: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            interactive: false,
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
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// The command line as it would be typed, e.g., `make motes/root TARGET=z1`.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program).chain(&self.args).join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cwd {
            Some(cwd) => write!(f, "{} (in {})", self.command_line(), cwd.display()),
            None => write!(f, "{}", self.command_line()),
        }
    }
}

/// Captured result of an executed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Output of a process that exited with `code` and printed nothing.
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Default::default()
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit status into a [`ProcessError::Failed`].
    pub fn check(self, invocation: &Invocation) -> Result<Self, ProcessError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ProcessError::Failed {
            invocation: invocation.command_line(),
            status: match self.code {
                Some(code) => format!("exit status {code}"),
                None => "termination by signal".to_string(),
            },
            stderr: self.stderr,
        })
    }
}

/// Executes invocations one at a time.
#[async_trait]
pub trait CommandRunner: Send {
    /// Execute the invocation and return its output, whatever its exit status.
    async fn execute(&mut self, invocation: &Invocation) -> Result<CommandOutput, ProcessError>;

    /// Execute the invocation, failing on a non-zero exit status.
    async fn run(&mut self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        self.execute(invocation).await?.check(invocation)
    }
}

/// Runner spawning actual processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn execute(&mut self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        log::debug!("$ {invocation}");
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).envs(&invocation.env);
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }
        let spawn_error = |source| ProcessError::Spawn {
            invocation: invocation.command_line(),
            source,
        };

        if invocation.interactive {
            let status = cmd
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(spawn_error)?;
            return Ok(CommandOutput {
                code: status.code(),
                ..Default::default()
            });
        }

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(spawn_error)?;
        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        log::trace!(
            "`{}` exited with {:?}\nstdout:\n{}\nstderr:\n{}",
            invocation.command_line(),
            output.code,
            output.stdout,
            output.stderr
        );
        Ok(output)
    }
}

/// Runner that only logs the invocations and pretends they succeeded.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunRunner;

#[async_trait]
impl CommandRunner for DryRunRunner {
    async fn execute(&mut self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        log::info!("[dry-run] $ {invocation}");
        Ok(CommandOutput::exited(0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_line() {
        let inv = Invocation::new("make")
            .args(["motes/root", "TARGET=z1"])
            .current_dir("/tmp/exp");
        assert_eq!(inv.command_line(), "make motes/root TARGET=z1");
        assert_eq!(inv.to_string(), "make motes/root TARGET=z1 (in /tmp/exp)");
    }

    #[test]
    fn check_status() {
        let inv = Invocation::new("ant").arg("jar");
        assert!(CommandOutput::exited(0).check(&inv).is_ok());

        let err = CommandOutput::exited(2)
            .with_stderr("BUILD FAILED\n")
            .check(&inv)
            .unwrap_err();
        assert_eq!(err.to_string(), "`ant jar` failed with exit status 2:\nBUILD FAILED");

        let err = CommandOutput::default().check(&inv).unwrap_err();
        assert_eq!(err.to_string(), "`ant jar` failed with termination by signal");
    }

    #[tokio::test]
    async fn system_runner_captures_output() {
        let mut runner = SystemRunner;
        let tmp = tempfile::tempdir().unwrap();
        let out = runner
            .run(&Invocation::new("pwd").current_dir(tmp.path()))
            .await
            .unwrap();
        let printed = std::fs::canonicalize(out.stdout.trim()).unwrap();
        assert_eq!(printed, std::fs::canonicalize(tmp.path()).unwrap());

        let err = runner.run(&Invocation::new("false")).await.unwrap_err();
        assert!(matches!(err, ProcessError::Failed { .. }));

        let err = runner
            .run(&Invocation::new("surely-not-an-installed-program"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn dry_run_succeeds() {
        let out = DryRunRunner
            .run(&Invocation::new("rm").args(["-rf", "/"]))
            .await
            .unwrap();
        assert!(out.is_success());
    }
}
