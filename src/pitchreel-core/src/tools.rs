//! External tool invocation.
//!
//! Every call to ffmpeg, espeak-ng or the renderer goes through a
//! [`ToolRunner`], so stages can be exercised without the binaries installed.

use std::env;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{PitchError, Result};

/// Default ceiling for a single external invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// A single external command.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    /// Text written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Program plus arguments, for logs and error messages.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external commands to completion.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the command. Non-zero exit is an error carrying the captured output.
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

/// Spawns real processes with a timeout.
///
/// The child is killed if the returned future is dropped or times out.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        debug!(command = %invocation.command_line(), "running external tool");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => PitchError::ExternalToolUnavailable {
                tool: invocation.program.clone(),
                detail: "executable not found on PATH".to_string(),
            },
            _ => PitchError::Io(e),
        })?;

        let finished = async move {
            if let (Some(input), Some(mut pipe)) = (&invocation.stdin, child.stdin.take()) {
                pipe.write_all(input.as_bytes()).await?;
            }
            child.wait_with_output().await
        };
        let output = tokio::time::timeout(self.timeout, finished)
            .await
            .map_err(|_| PitchError::ExternalToolTimeout {
                tool: invocation.program.clone(),
                timeout: self.timeout,
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(PitchError::ExternalTool {
                tool: invocation.program.clone(),
                status: output.status.to_string(),
                stdout,
                stderr,
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// Executable names for the external collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub ffmpeg: String,
    pub espeak: String,
    pub npx: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            espeak: "espeak-ng".to_string(),
            npx: "npx".to_string(),
        }
    }
}

impl ToolPaths {
    /// Defaults, overridden by `PITCHREEL_FFMPEG`, `PITCHREEL_ESPEAK` and `PITCHREEL_NPX`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg: env::var("PITCHREEL_FFMPEG").unwrap_or(defaults.ffmpeg),
            espeak: env::var("PITCHREEL_ESPEAK").unwrap_or(defaults.espeak),
            npx: env::var("PITCHREEL_NPX").unwrap_or(defaults.npx),
        }
    }
}
