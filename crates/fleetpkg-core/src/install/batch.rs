//! Sequential multi-package installs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::{InstallReport, RemoteInstaller};
use crate::types::{Credential, NodeSelector};

/// What to do with the remaining packages once one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Stop at the first failure; later packages are reported as skipped.
    #[default]
    AbortOnFirstFailure,
    /// Attempt every package and report all failures.
    KeepGoing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PackageOutcome {
    Installed(InstallReport),
    Failed {
        package: String,
        error: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        failed_nodes: Vec<String>,
    },
    Skipped {
        package: String,
    },
}

impl PackageOutcome {
    pub fn package(&self) -> &str {
        match self {
            PackageOutcome::Installed(report) => &report.package,
            PackageOutcome::Failed { package, .. } | PackageOutcome::Skipped { package } => package,
        }
    }

    pub fn is_installed(&self) -> bool {
        matches!(self, PackageOutcome::Installed(_))
    }
}

/// Outcome of a whole `fleetpkg install` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub nodes: String,
    pub policy: BatchPolicy,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub packages: Vec<PackageOutcome>,
}

impl BatchReport {
    /// True when every requested package was installed.
    pub fn is_success(&self) -> bool {
        self.packages.iter().all(PackageOutcome::is_installed)
    }

    pub fn installed(&self) -> impl Iterator<Item = &InstallReport> {
        self.packages.iter().filter_map(|outcome| match outcome {
            PackageOutcome::Installed(report) => Some(report),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.packages
            .iter()
            .filter(|outcome| matches!(outcome, PackageOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.packages
            .iter()
            .filter(|outcome| matches!(outcome, PackageOutcome::Skipped { .. }))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Repeats the single-package flow over a list of packages, one at a time.
///
/// Earlier installs are never rolled back.
#[derive(Debug)]
pub struct BatchInstaller {
    installer: RemoteInstaller,
    policy: BatchPolicy,
}

impl BatchInstaller {
    pub fn new(installer: RemoteInstaller) -> Self {
        Self {
            installer,
            policy: BatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn installer(&self) -> &RemoteInstaller {
        &self.installer
    }

    /// Install `packages` in order. `on_start` sees the zero-based index and
    /// name of each package right before it is attempted.
    pub fn install_all<S, F>(
        &self,
        packages: &[S],
        nodes: &NodeSelector,
        credential: &Credential,
        mut on_start: F,
    ) -> BatchReport
    where
        S: AsRef<str>,
        F: FnMut(usize, &str),
    {
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(packages.len());
        let mut aborted = false;

        for (index, package) in packages.iter().enumerate() {
            let package = package.as_ref();
            if aborted {
                outcomes.push(PackageOutcome::Skipped {
                    package: package.to_string(),
                });
                continue;
            }

            on_start(index, package);
            match self.installer.install_on_fleet(package, nodes, credential) {
                Ok(report) => outcomes.push(PackageOutcome::Installed(report)),
                Err(err) => {
                    warn!(package = %package, error = %err, "package install failed");
                    outcomes.push(PackageOutcome::Failed {
                        package: package.to_string(),
                        error: err.to_string(),
                        failed_nodes: err.failed_nodes(),
                    });
                    aborted = self.policy == BatchPolicy::AbortOnFirstFailure;
                }
            }
        }

        let report = BatchReport {
            nodes: nodes.to_string(),
            policy: self.policy,
            started_at,
            finished_at: Utc::now(),
            packages: outcomes,
        };
        info!(
            installed = report.installed().count(),
            failed = report.failed().count(),
            skipped = report.skipped().count(),
            "batch finished"
        );
        report
    }
}
