//! Control-host checks run before anything touches the fleet.

use std::path::PathBuf;

use tracing::debug;

use crate::config::ToolsConfig;
use crate::error::PreflightError;

/// The control host must run the same platform as the nodes.
pub fn check_host_os() -> Result<(), PreflightError> {
    check_os(std::env::consts::OS)
}

fn check_os(os: &str) -> Result<(), PreflightError> {
    if os == "linux" {
        Ok(())
    } else {
        Err(PreflightError::UnsupportedOs { os: os.to_string() })
    }
}

/// Every configured tool must resolve to an executable on this host.
pub fn check_tools(tools: &ToolsConfig) -> Result<Vec<(&'static str, PathBuf)>, PreflightError> {
    tools
        .programs()
        .into_iter()
        .map(|(role, spec)| match which::which(spec.program()) {
            Ok(path) => {
                debug!(tool = role, path = %path.display(), "found tool");
                Ok((role, path))
            }
            Err(_) => Err(PreflightError::MissingTool {
                tool: role,
                program: spec.program().to_string(),
            }),
        })
        .collect()
}
