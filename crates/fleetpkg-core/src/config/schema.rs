//! Configuration schema for fleetpkg.toml
//!
//! Every section and key is optional; missing values take the defaults
//! below, which drive the stock Debian tooling over ssh.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::process::{RetryPolicy, ToolSpec};
use crate::transport::is_valid_env_var;
use crate::types::DEFAULT_EXCLUDED_DEPENDENCIES;

/// Root configuration structure for fleetpkg.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FleetConfig {
    pub tools: ToolsConfig,
    pub staging: StagingConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub resolver: ResolverConfig,
    pub credential: CredentialConfig,
}

/// External programs, each a string or an argv prefix array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Dependency closure tool
    pub rdepends: ToolSpec,
    /// Download tool, invoked as `<download> download <pkg>...`
    pub download: ToolSpec,
    pub pdsh: ToolSpec,
    pub pdcp: ToolSpec,
    /// pdsh `-R` module; empty keeps pdsh's own default
    pub rcmd: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            rdepends: ToolSpec::new("apt-rdepends"),
            download: ToolSpec::new("apt-get"),
            pdsh: ToolSpec::new("pdsh"),
            pdcp: ToolSpec::new("pdcp"),
            rcmd: "ssh".to_string(),
        }
    }
}

impl ToolsConfig {
    pub fn rcmd(&self) -> Option<String> {
        let rcmd = self.rcmd.trim();
        (!rcmd.is_empty()).then(|| rcmd.to_string())
    }

    /// Every configured tool, labelled by its role.
    pub fn programs(&self) -> [(&'static str, &ToolSpec); 4] {
        [
            ("rdepends", &self.rdepends),
            ("download", &self.download),
            ("pdsh", &self.pdsh),
            ("pdcp", &self.pdcp),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Local directory that holds `<package>_STAGE`
    pub local_root: PathBuf,
    /// Node directory that receives `<package>_STAGE`, relative to the login home
    pub remote_root: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            local_root: PathBuf::from("."),
            remote_root: PathBuf::from(crate::install::DEFAULT_REMOTE_ROOT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub resolve_secs: u64,
    pub fetch_secs: u64,
    pub transport_secs: u64,
    pub exec_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            resolve_secs: 120,
            fetch_secs: 600,
            transport_secs: 300,
            exec_secs: 900,
        }
    }
}

impl TimeoutConfig {
    pub fn resolve(&self) -> Duration {
        Duration::from_secs(self.resolve_secs)
    }

    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    pub fn transport(&self) -> Duration {
        Duration::from_secs(self.transport_secs)
    }

    pub fn exec(&self) -> Duration {
        Duration::from_secs(self.exec_secs)
    }
}

/// Retry for the download and copy steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 2000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_millis(self.backoff_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Globs matched against package names; matches never leave the resolver
    pub exclude: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            exclude: DEFAULT_EXCLUDED_DEPENDENCIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Variable that carries the sudo password to the nodes; sshd must `AcceptEnv` it
    pub env_var: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            env_var: "FLEETPKG_SUDO_PASSWORD".to_string(),
        }
    }
}

impl FleetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("resolve_secs", self.timeouts.resolve_secs),
            ("fetch_secs", self.timeouts.fetch_secs),
            ("transport_secs", self.timeouts.transport_secs),
            ("exec_secs", self.timeouts.exec_secs),
        ];
        if let Some(&(key, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Zero {
                section: "timeouts",
                key,
            });
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::Zero {
                section: "retry",
                key: "attempts",
            });
        }

        if !is_contained_relative(&self.staging.remote_root) {
            return Err(ConfigError::RemoteRoot {
                path: self.staging.remote_root.clone(),
            });
        }

        for pattern in &self.resolver.exclude {
            glob::Pattern::new(pattern).map_err(|err| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                reason: err.msg.to_string(),
            })?;
        }

        if !is_valid_env_var(&self.credential.env_var) {
            return Err(ConfigError::InvalidEnvVar {
                name: self.credential.env_var.clone(),
            });
        }
        Ok(())
    }
}

/// Non-empty, relative, and never climbing out through `..`.
fn is_contained_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
