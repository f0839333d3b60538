//! Configuration for fleetpkg
//!
//! A single optional TOML file names the external tools, staging locations,
//! timeouts and retry budget. Nothing in it is secret.

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_config, parse_config_str};
pub use schema::{
    CredentialConfig, FleetConfig, ResolverConfig, RetryConfig, StagingConfig, TimeoutConfig,
    ToolsConfig,
};
pub use store::{CONFIG_FILE_NAME, ConfigStore};
