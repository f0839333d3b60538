//! Running external tools with timeouts, scoped environment and captured output.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::error::ToolError;
use crate::types::Credential;

/// Command prefix for an external tool, e.g. `["apt-get"]` or `["sudo", "-n", "pdsh"]`.
///
/// Deserializes from either a single string or a non-empty array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawToolSpec", into = "Vec<String>")]
pub struct ToolSpec {
    program: String,
    args: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawToolSpec {
    Program(String),
    Command(Vec<String>),
}

impl TryFrom<RawToolSpec> for ToolSpec {
    type Error = String;

    fn try_from(raw: RawToolSpec) -> Result<Self, Self::Error> {
        let mut parts = match raw {
            RawToolSpec::Program(program) => vec![program],
            RawToolSpec::Command(parts) => parts,
        };
        if parts.is_empty() || parts[0].trim().is_empty() {
            return Err("tool command must name a program".to_string());
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }
}

impl From<ToolSpec> for Vec<String> {
    fn from(spec: ToolSpec) -> Self {
        std::iter::once(spec.program).chain(spec.args).collect()
    }
}

impl ToolSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Start a command invocation of this tool.
    pub fn command(&self, timeout: Duration) -> ToolCommand {
        ToolCommand {
            program: self.program.clone(),
            args: self.args.clone(),
            current_dir: None,
            env: Vec::new(),
            secret_env: Vec::new(),
            timeout,
        }
    }
}

/// One invocation of an external tool.
#[derive(Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    secret_env: Vec<(String, Credential)>,
    timeout: Duration,
}

impl ToolCommand {
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

    /// Run the child in `dir`. The caller's working directory is left alone.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set an environment variable holding a secret. It is visible only to
    /// this child and never printed.
    pub fn secret_env(mut self, key: impl Into<String>, value: &Credential) -> Self {
        self.secret_env.push((key.into(), value.clone()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Human readable command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion and capture output, whatever the exit status.
    pub fn run(&self) -> Result<ToolOutput, ToolError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }
        for (key, value) in &self.secret_env {
            command.env(key, value.expose_secret());
        }

        debug!(command = %self.display(), "running tool");

        let mut child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound {
                    program: self.program.clone(),
                }
            } else {
                ToolError::Spawn {
                    program: self.program.clone(),
                    source,
                }
            }
        })?;

        // Drain both pipes concurrently so a chatty child cannot fill one
        // and block before exiting.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                warn!(
                    program = %self.program,
                    timeout_secs = self.timeout.as_secs(),
                    "tool timed out and was killed"
                );
                return Err(ToolError::TimedOut {
                    program: self.program.clone(),
                    timeout: self.timeout,
                });
            }
            Err(source) => {
                let _ = child.kill();
                return Err(ToolError::Spawn {
                    program: self.program.clone(),
                    source,
                });
            }
        };

        let output = ToolOutput {
            code: status.code(),
            stdout: join_pipe(stdout),
            stderr: join_pipe(stderr),
        };
        debug!(program = %self.program, code = ?output.code, "tool finished");
        Ok(output)
    }

    /// Run and fail unless the tool exits successfully.
    pub fn run_checked(&self) -> Result<ToolOutput, ToolError> {
        let output = self.run()?;
        if output.success() {
            Ok(output)
        } else {
            Err(ToolError::Failed {
                program: self.program.clone(),
                code: output.code,
                stderr: output.stderr,
            })
        }
    }
}

impl fmt::Debug for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret_keys: Vec<&str> = self.secret_env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("ToolCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("current_dir", &self.current_dir)
            .field("env", &self.env)
            .field("secret_env", &secret_keys)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_pipe(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Captured result of a finished tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Bounded retry with linear backoff for steps exposed to transient network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Run `op` until it succeeds, `retryable` rejects the error, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, E, F, R>(&self, what: &str, mut op: F, retryable: R) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
        R: Fn(&E) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && retryable(&err) => {
                    let delay = self.backoff * attempt;
                    warn!(
                        attempt,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "{what} failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests;
