//! Artifact download into an isolated staging directory.

mod apt;
mod staging;

pub use apt::AptDownloadFetcher;
pub use staging::StagingArea;

use std::path::Path;

use crate::error::FetchError;

/// Downloads installable artifacts for a resolved package list.
pub trait ArtifactFetcher: Send + Sync {
    /// Create `destination` and download one artifact per package into it.
    ///
    /// Fails with [`FetchError::StagingConflict`] if `destination` exists.
    /// On any other failure the partially filled directory is removed before
    /// returning. The caller's working directory is never changed.
    fn fetch(&self, resolved: &[String], destination: &Path) -> Result<StagingArea, FetchError>;
}

/// Names of packages in `resolved` with no `<name>_*.deb` file among `artifacts`.
pub fn missing_artifacts(resolved: &[String], artifacts: &[String]) -> Vec<String> {
    resolved
        .iter()
        .filter(|package| {
            let base = package.split(':').next().unwrap_or(package);
            let prefix = format!("{base}_");
            !artifacts
                .iter()
                .any(|file| file.starts_with(&prefix) && file.ends_with(".deb"))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_artifacts_by_name_prefix() {
        let resolved = vec!["htop".to_string(), "libncurses6:amd64".to_string()];
        let artifacts = vec![
            "htop_3.0.5-7_amd64.deb".to_string(),
            "libncurses6_6.3-2_amd64.deb".to_string(),
        ];
        assert!(missing_artifacts(&resolved, &artifacts).is_empty());
    }

    #[test]
    fn reports_missing_and_prefix_collisions() {
        let resolved = vec!["lib".to_string(), "htop".to_string()];
        // `libfoo_1.deb` must not satisfy `lib`.
        let artifacts = vec!["libfoo_1.0_amd64.deb".to_string(), "htop_1.0_amd64.deb".to_string()];
        assert_eq!(missing_artifacts(&resolved, &artifacts), vec!["lib"]);
    }
}
