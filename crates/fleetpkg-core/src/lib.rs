//! fleetpkg core library
//!
//! Installs a Debian package and its dependency closure on a fleet of
//! cluster nodes: resolve on the control host, download into a local
//! staging directory, copy to every node with pdcp, and `dpkg -i` there
//! under sudo through pdsh.

pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod install;
pub mod preflight;
pub mod process;
pub mod resolve;
pub mod transport;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, FleetConfig};
    pub use crate::context::AppContext;

    // Errors
    pub use crate::error::{
        ConfigError, ExecError, FetchError, InstallError, PreflightError, ResolveError, ToolError,
        TransportError,
    };

    // Pipeline seams
    pub use crate::fetch::{ArtifactFetcher, StagingArea};
    pub use crate::resolve::DependencyResolver;
    pub use crate::transport::{FleetReport, FleetTransport, NodeOutcome, NodeStatus, RemoteCommand};

    // Installation
    pub use crate::install::{
        BatchInstaller, BatchPolicy, BatchReport, InstallReport, PackageOutcome, RemoteInstaller,
    };

    // Values
    pub use crate::types::{Credential, NodeSelector, PackageRequest};
}
