//! Error types for each stage of a fleet install.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::transport::FleetReport;
use crate::types::InvalidPackageName;

/// Failure to run an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("`{program}` was not found; is it installed and on PATH?")]
    NotFound { program: String },

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("`{program}` exited with {}: {}", describe_code(.code), .stderr.trim())]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl ToolError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::TimedOut { .. })
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("package '{package}' is not known to the package index")]
    UnknownPackage { package: String },

    #[error("package '{package}' matches the dependency exclusion list")]
    ExcludedPackage { package: String },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("staging directory already exists: {}", .path.display())]
    StagingConflict { path: PathBuf },

    #[error("failed to prepare staging directory {}: {source}", .path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download produced no artifact for: {}", .missing.join(", "))]
    MissingArtifacts { missing: Vec<String> },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("node selector '{selector}' matched no nodes")]
    NoNodes { selector: String },

    #[error("copy failed on node(s): {}", .report.failed_names().join(", "))]
    NodesFailed { report: FleetReport },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("node selector '{selector}' matched no nodes")]
    NoNodes { selector: String },

    #[error("command failed on node(s): {}", .report.failed_names().join(", "))]
    NodesFailed { report: FleetReport },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Top-level error for installing one package on the fleet.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    InvalidPackage(#[from] InvalidPackageName),

    #[error("failed to resolve dependencies of '{package}': {source}")]
    Resolution {
        package: String,
        #[source]
        source: ResolveError,
    },

    #[error("staging directory for '{package}' already exists: {}", .path.display())]
    StagingConflict { package: String, path: PathBuf },

    #[error("failed to download artifacts for '{package}': {source}")]
    Fetch {
        package: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to copy artifacts for '{package}' to the fleet: {source}")]
    Transport {
        package: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to install '{package}' on the fleet: {source}")]
    Exec {
        package: String,
        #[source]
        source: ExecError,
    },
}

impl InstallError {
    pub fn package(&self) -> &str {
        match self {
            InstallError::InvalidPackage(err) => &err.name,
            InstallError::Resolution { package, .. }
            | InstallError::StagingConflict { package, .. }
            | InstallError::Fetch { package, .. }
            | InstallError::Transport { package, .. }
            | InstallError::Exec { package, .. } => package,
        }
    }

    /// Nodes that reported a failure, when the failing step was a fleet operation.
    pub fn failed_nodes(&self) -> Vec<String> {
        let report = match self {
            InstallError::Transport {
                source: TransportError::NodesFailed { report },
                ..
            }
            | InstallError::Exec {
                source: ExecError::NodesFailed { report },
                ..
            } => report,
            _ => return Vec::new(),
        };
        report.failed_names()
    }
}

/// A configuration value that parses but cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("[{section}] {key} must be greater than zero")]
    Zero {
        section: &'static str,
        key: &'static str,
    },

    #[error(
        "[staging] remote_root must be a relative path below the remote home directory, got '{}'",
        .path.display()
    )]
    RemoteRoot { path: PathBuf },

    #[error("[resolver] exclude pattern '{pattern}' is not a valid glob: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("[credential] env_var '{name}' is not a valid environment variable name")]
    InvalidEnvVar { name: String },
}

/// Host is not able to drive a fleet install.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error(
        "fleetpkg only runs on Linux (detected '{os}'); the control host must match the worker nodes"
    )]
    UnsupportedOs { os: String },

    #[error("required tool '{tool}' (`{program}`) is not installed on this host")]
    MissingTool { tool: &'static str, program: String },
}

impl PreflightError {
    /// Process exit code reported by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            PreflightError::UnsupportedOs { .. } => 2,
            PreflightError::MissingTool { .. } => 3,
        }
    }
}
