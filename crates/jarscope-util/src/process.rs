use std::collections::HashMap;
use std::path::Path;
use std::process::Output;
use std::time::Duration;

use tokio::process::Command;

use crate::errors::JarscopeError;

/// Builder for constructing and executing external processes.
///
/// Provides a fluent API for setting program, arguments, environment
/// variables, working directory, and a wall-clock timeout. Every remote
/// listing, fetch, and decompiler invocation goes through this builder so
/// the timeout and cancellation behavior is uniform.
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<String>,
    timeout: Option<Duration>,
}

impl CommandBuilder {
    /// Create a new builder for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            timeout: None,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory for the child process.
    pub fn cwd(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Abort the child process if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Execute the command and collect its output.
    ///
    /// When a timeout is set and elapses, the child is killed (via
    /// `kill_on_drop`) and a timeout error is returned; already-committed
    /// work by the caller is unaffected.
    pub async fn exec(&self) -> Result<Output, JarscopeError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(Path::new(dir));
        }
        cmd.kill_on_drop(true);

        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result.map_err(JarscopeError::from),
                Err(_) => Err(JarscopeError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{} timed out after {:?}", self.program, limit),
                ))),
            },
            None => cmd.output().await.map_err(JarscopeError::from),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builder_runs_simple_command() {
        let output = CommandBuilder::new("echo").arg("hello").exec().await.unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn builder_passes_env_and_cwd() {
        let tmp = tempfile::tempdir().unwrap();
        let output = CommandBuilder::new("sh")
            .args(["-c", "echo $JARSCOPE_TEST_VAR && pwd"])
            .env("JARSCOPE_TEST_VAR", "listed")
            .cwd(tmp.path().to_string_lossy())
            .exec()
            .await
            .unwrap();
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("listed"));
    }

    #[tokio::test]
    async fn timeout_aborts_long_running_command() {
        let err = CommandBuilder::new("sleep")
            .arg("30")
            .timeout(Duration::from_millis(50))
            .exec()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "got: {err}");
    }

    #[tokio::test]
    async fn nonexistent_program_is_an_error() {
        let result = CommandBuilder::new("jarscope_no_such_program_xyz").exec().await;
        assert!(result.is_err());
    }
}
