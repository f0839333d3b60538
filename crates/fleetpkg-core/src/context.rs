//! Application context: builds the system installer from configuration.

use std::path::{Path, PathBuf};

use crate::config::{ConfigStore, FleetConfig};
use crate::fetch::AptDownloadFetcher;
use crate::install::{BatchInstaller, BatchPolicy, RemoteInstaller};
use crate::resolve::AptRdependsResolver;
use crate::transport::PdshTransport;

/// Loaded configuration plus command-line overrides.
///
/// Frontends create this once and ask it for installers.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: FleetConfig,
    config_path: Option<PathBuf>,
    staging_root: PathBuf,
}

impl AppContext {
    pub fn new(config: FleetConfig) -> Self {
        let staging_root = config.staging.local_root.clone();
        Self {
            config,
            config_path: None,
            staging_root,
        }
    }

    /// Load from `store`, remembering where the config came from.
    pub fn from_store(store: &ConfigStore) -> anyhow::Result<Self> {
        let mut context = Self::new(store.load()?);
        context.config_path = Some(store.config_path().to_path_buf());
        Ok(context)
    }

    /// Override the configured local staging root.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn resolver(&self) -> AptRdependsResolver {
        AptRdependsResolver::new(self.config.tools.rdepends.clone(), self.config.timeouts.resolve())
    }

    pub fn fetcher(&self) -> AptDownloadFetcher {
        AptDownloadFetcher::new(
            self.config.tools.download.clone(),
            self.config.timeouts.fetch(),
            self.config.retry.policy(),
        )
    }

    pub fn transport(&self) -> PdshTransport {
        let tools = &self.config.tools;
        PdshTransport::new(tools.pdsh.clone(), tools.pdcp.clone())
            .with_rcmd(tools.rcmd())
            .with_timeouts(self.config.timeouts.transport(), self.config.timeouts.exec())
            .with_retry(self.config.retry.policy())
            .with_credential_env(&self.config.credential.env_var)
    }

    pub fn installer(&self) -> RemoteInstaller {
        RemoteInstaller::new(
            Box::new(self.resolver()),
            Box::new(self.fetcher()),
            Box::new(self.transport()),
        )
        .with_staging_root(&self.staging_root)
        .with_remote_root(&self.config.staging.remote_root)
        .with_exclusions(self.config.resolver.exclude.iter().cloned())
    }

    pub fn batch_installer(&self, policy: BatchPolicy) -> BatchInstaller {
        BatchInstaller::new(self.installer()).with_policy(policy)
    }
}
