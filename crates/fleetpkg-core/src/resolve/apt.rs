//! `apt-rdepends` backed resolver.

use std::time::Duration;

use tracing::info;

use super::{DependencyResolver, ExclusionSet, parse_closure};
use crate::error::{ResolveError, ToolError};
use crate::process::ToolSpec;
use crate::types::PackageRequest;

/// Messages apt prints for names missing from the index. Only lines that
/// also name the requested package count.
const UNKNOWN_PACKAGE_MARKERS: [&str; 2] = ["Unable to locate package", "has no installation candidate"];

#[derive(Debug, Clone)]
pub struct AptRdependsResolver {
    tool: ToolSpec,
    timeout: Duration,
}

impl AptRdependsResolver {
    pub fn new(tool: ToolSpec, timeout: Duration) -> Self {
        Self { tool, timeout }
    }
}

impl DependencyResolver for AptRdependsResolver {
    fn resolve(&self, request: &PackageRequest) -> Result<Vec<String>, ResolveError> {
        let unknown = || ResolveError::UnknownPackage {
            package: request.name().to_string(),
        };

        let exclusions = ExclusionSet::new(request.excluded());
        if exclusions.is_excluded(request.name()) {
            return Err(ResolveError::ExcludedPackage {
                package: request.name().to_string(),
            });
        }

        let output = self
            .tool
            .command(self.timeout)
            .arg(request.name())
            .run()?;

        if !output.success() {
            if reports_unknown(&output.stderr, request.name()) {
                return Err(unknown());
            }
            return Err(ToolError::Failed {
                program: self.tool.program().to_string(),
                code: output.code,
                stderr: output.stderr,
            }
            .into());
        }

        let closure = parse_closure(&output.stdout, &exclusions);

        // apt-rdepends exits 0 with empty output for some unknown names.
        if !closure.iter().any(|name| name == request.name()) {
            return Err(unknown());
        }

        info!(
            package = request.name(),
            dependencies = closure.len(),
            "resolved dependency closure"
        );
        Ok(closure)
    }
}

fn reports_unknown(stderr: &str, package: &str) -> bool {
    stderr.lines().any(|line| {
        UNKNOWN_PACKAGE_MARKERS.iter().any(|marker| line.contains(marker))
            && line
                .split(|c: char| c.is_whitespace() || c == '\'')
                .any(|word| word == package)
    })
}
