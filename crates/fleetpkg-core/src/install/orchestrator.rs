//! Resolve, stage, copy and install one package across a fleet.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::InstallReport;
use crate::error::{FetchError, InstallError};
use crate::fetch::{ArtifactFetcher, StagingArea};
use crate::resolve::DependencyResolver;
use crate::transport::{FleetReport, FleetTransport, RemoteCommand};
use crate::types::{Credential, DEFAULT_EXCLUDED_DEPENDENCIES, NodeSelector, PackageRequest};

/// Default staging root on the nodes, relative to the login user's home.
pub const DEFAULT_REMOTE_ROOT: &str = ".fleetpkg/staging";

/// Drives one package through resolve, fetch, copy and `dpkg -i` on a fleet.
///
/// The local staging directory is removed on every path out of
/// [`install_on_fleet`](Self::install_on_fleet).
pub struct RemoteInstaller {
    resolver: Box<dyn DependencyResolver>,
    fetcher: Box<dyn ArtifactFetcher>,
    transport: Box<dyn FleetTransport>,
    staging_root: PathBuf,
    remote_root: PathBuf,
    exclusions: Vec<String>,
}

impl RemoteInstaller {
    pub fn new(
        resolver: Box<dyn DependencyResolver>,
        fetcher: Box<dyn ArtifactFetcher>,
        transport: Box<dyn FleetTransport>,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            transport,
            staging_root: PathBuf::from("."),
            remote_root: PathBuf::from(DEFAULT_REMOTE_ROOT),
            exclusions: DEFAULT_EXCLUDED_DEPENDENCIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Local directory under which `<package>_STAGE` is created.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    pub fn with_remote_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.remote_root = root.into();
        self
    }

    /// Replace the dependency exclusion globs.
    pub fn with_exclusions<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn remote_root(&self) -> &Path {
        &self.remote_root
    }

    pub fn install_on_fleet(
        &self,
        package: &str,
        nodes: &NodeSelector,
        credential: &Credential,
    ) -> Result<InstallReport, InstallError> {
        let request = PackageRequest::with_exclusions(package, self.exclusions.iter().cloned())?;
        let package = request.name().to_string();
        let staging_path = self.staging_root.join(request.staging_dir_name());
        let remote_path = self.remote_root.join(request.staging_dir_name());

        let resolved = self
            .resolver
            .resolve(&request)
            .map_err(|source| InstallError::Resolution {
                package: package.clone(),
                source,
            })?;
        debug!(package = %package, resolved = ?resolved, "staging dependency closure");

        let staging = self
            .fetcher
            .fetch(&resolved, &staging_path)
            .map_err(|source| match source {
                FetchError::StagingConflict { path } => InstallError::StagingConflict {
                    package: package.clone(),
                    path,
                },
                source => InstallError::Fetch {
                    package: package.clone(),
                    source,
                },
            })?;
        let artifacts = staging.artifact_names();

        let outcome = self.distribute(&package, &staging, &remote_path, nodes, credential);
        if let Err(err) = staging.close() {
            warn!(
                package = %package,
                path = %staging_path.display(),
                error = %err,
                "failed to remove local staging directory"
            );
        }
        let installed = outcome?;

        info!(package = %package, nodes = installed.len(), "installed package on fleet");
        Ok(InstallReport {
            package,
            resolved,
            artifacts,
            remote_staging: remote_path,
            nodes: installed,
        })
    }

    fn distribute(
        &self,
        package: &str,
        staging: &StagingArea,
        remote: &Path,
        nodes: &NodeSelector,
        credential: &Credential,
    ) -> Result<FleetReport, InstallError> {
        self.transport
            .copy(staging.path(), remote, nodes)
            .map_err(|source| InstallError::Transport {
                package: package.to_string(),
                source,
            })?;

        let remote_dir = remote.to_string_lossy();
        let install = RemoteCommand::from_args(["dpkg", "-R", "--force-depends", "-i", remote_dir.as_ref()]);
        debug!(package = %package, command = %install, "installing staged artifacts");
        let installed = self
            .transport
            .exec(&install, nodes, Some(credential))
            .map_err(|source| InstallError::Exec {
                package: package.to_string(),
                source,
            });

        self.remove_remote_staging(remote, nodes);
        installed
    }

    fn remove_remote_staging(&self, remote: &Path, nodes: &NodeSelector) {
        let cleanup = RemoteCommand::from_args(["rm", "-rf", "--", remote.to_string_lossy().as_ref()]);
        if let Err(err) = self.transport.exec(&cleanup, nodes, None) {
            warn!(
                remote = %remote.display(),
                error = %err,
                "failed to remove remote staging directory"
            );
        }
    }
}

impl std::fmt::Debug for RemoteInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInstaller")
            .field("staging_root", &self.staging_root)
            .field("remote_root", &self.remote_root)
            .field("exclusions", &self.exclusions)
            .finish_non_exhaustive()
    }
}
