//! `apt-get download` backed fetcher.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use super::{ArtifactFetcher, StagingArea, missing_artifacts};
use crate::error::{FetchError, ToolError};
use crate::process::{RetryPolicy, ToolSpec};

/// apt's refusal for a name with nothing to download, as printed for
/// virtual packages such as `debconf-2.0`.
const NO_CANDIDATE: (&str, &str) = ("Can't select candidate version from package ", " as it has no candidate");

#[derive(Debug, Clone)]
pub struct AptDownloadFetcher {
    tool: ToolSpec,
    timeout: Duration,
    retry: RetryPolicy,
}

impl AptDownloadFetcher {
    pub fn new(tool: ToolSpec, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            tool,
            timeout,
            retry,
        }
    }

    /// Download `resolved` into the staging directory, returning the names
    /// apt had no candidate for. The first name, the requested package, is
    /// never skipped.
    fn download(&self, staging: &mut StagingArea, resolved: &[String], attempt: u32) -> Result<Vec<String>, FetchError> {
        if attempt > 1 {
            staging.clear().map_err(|source| FetchError::Staging {
                path: staging.path().to_path_buf(),
                source,
            })?;
        }

        let mut wanted = resolved.to_vec();
        let mut skipped = Vec::new();
        while !wanted.is_empty() {
            let output = self
                .tool
                .command(self.timeout)
                .arg("download")
                .args(&wanted)
                .current_dir(staging.path())
                .run()?;
            if output.success() {
                break;
            }

            let uncandidated: Vec<String> = no_candidate_packages(&output.stderr)
                .into_iter()
                .filter(|name| wanted.contains(name) && resolved.first() != Some(name))
                .collect();
            if uncandidated.is_empty() {
                return Err(ToolError::Failed {
                    program: self.tool.program().to_string(),
                    code: output.code,
                    stderr: output.stderr,
                }
                .into());
            }
            warn!(packages = ?uncandidated, "skipping packages with no download candidate");
            wanted.retain(|name| !uncandidated.contains(name));
            skipped.extend(uncandidated);
        }
        Ok(skipped)
    }
}

/// Package names apt reported as having no download candidate.
fn no_candidate_packages(stderr: &str) -> Vec<String> {
    let (prefix, suffix) = NO_CANDIDATE;
    stderr
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let line = line.strip_prefix("E: ").unwrap_or(line);
            line.strip_prefix(prefix)?.strip_suffix(suffix)
        })
        .map(str::to_string)
        .collect()
}

impl ArtifactFetcher for AptDownloadFetcher {
    fn fetch(&self, resolved: &[String], destination: &Path) -> Result<StagingArea, FetchError> {
        let mut staging = StagingArea::create(destination)?;
        if resolved.is_empty() {
            return Ok(staging);
        }

        let skipped = self.retry.run(
            "artifact download",
            |attempt| self.download(&mut staging, resolved, attempt),
            |err| !matches!(err, FetchError::Tool(ToolError::NotFound { .. })),
        )?;

        staging
            .refresh_artifacts()
            .map_err(|source| FetchError::Staging {
                path: destination.to_path_buf(),
                source,
            })?;

        let downloadable: Vec<String> = resolved
            .iter()
            .filter(|name| !skipped.contains(*name))
            .cloned()
            .collect();
        let missing = missing_artifacts(&downloadable, &staging.artifact_names());
        if !missing.is_empty() {
            return Err(FetchError::MissingArtifacts { missing });
        }

        info!(
            staging = %staging.path().display(),
            artifacts = staging.artifacts().len(),
            skipped = skipped.len(),
            "downloaded artifacts"
        );
        Ok(staging)
    }
}
