//! Fleet installation: the single-package flow and its batch driver.

mod batch;
mod orchestrator;

pub use batch::{BatchInstaller, BatchPolicy, BatchReport, PackageOutcome};
pub use orchestrator::{DEFAULT_REMOTE_ROOT, RemoteInstaller};

use std::path::PathBuf;

use serde::Serialize;

use crate::transport::FleetReport;

/// Result of installing one package on every selected node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub package: String,
    /// Dependency closure in resolver order, the package itself included.
    pub resolved: Vec<String>,
    /// `.deb` file names that were staged and copied.
    pub artifacts: Vec<String>,
    /// Staging directory on the nodes, relative to the remote home unless absolute.
    pub remote_staging: PathBuf,
    /// Per-node results of the `dpkg` step.
    pub nodes: FleetReport,
}
