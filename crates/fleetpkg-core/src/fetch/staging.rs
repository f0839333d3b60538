//! Local staging directory holding downloaded artifacts for one install.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::FetchError;

/// A staging directory owned by exactly one install.
///
/// The directory is created exclusively and removed recursively when the
/// value is dropped, so every exit path of an install cleans it up.
#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
    artifacts: Vec<PathBuf>,
    armed: bool,
}

impl StagingArea {
    /// Create `path`. Fails if anything already exists there.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, FetchError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| FetchError::Staging {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(FetchError::StagingConflict { path });
            }
            Err(source) => return Err(FetchError::Staging { path, source }),
        }
        debug!(path = %path.display(), "created staging directory");
        Ok(Self {
            path,
            artifacts: Vec::new(),
            armed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name, used as the remote directory name too.
    pub fn dir_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Artifact files, sorted by file name.
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    pub fn artifact_names(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    /// Rescan the directory for regular files.
    pub fn refresh_artifacts(&mut self) -> io::Result<()> {
        let mut artifacts = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                artifacts.push(entry.path());
            }
        }
        artifacts.sort();
        self.artifacts = artifacts;
        Ok(())
    }

    /// Remove everything inside the directory but keep the directory.
    pub fn clear(&mut self) -> io::Result<()> {
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        self.artifacts.clear();
        Ok(())
    }

    /// Remove the directory now and report any failure.
    pub fn close(mut self) -> io::Result<()> {
        self.armed = false;
        remove_dir(&self.path)
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = remove_dir(&self.path) {
            warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove staging directory"
            );
        }
    }
}

fn remove_dir(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed staging directory");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_refuses_existing_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("htop_STAGE");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep.txt"), "user data").unwrap();

        let err = StagingArea::create(&path).unwrap_err();
        assert!(matches!(err, FetchError::StagingConflict { .. }));
        // The pre-existing directory is not ours to remove.
        assert!(path.join("keep.txt").exists());
    }

    #[test]
    fn drop_removes_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pkg_STAGE");
        {
            let staging = StagingArea::create(&path).unwrap();
            fs::write(staging.path().join("a.deb"), "x").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn close_removes_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pkg_STAGE");
        let staging = StagingArea::create(&path).unwrap();
        staging.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn artifacts_are_sorted_files() {
        let temp = TempDir::new().unwrap();
        let mut staging = StagingArea::create(temp.path().join("pkg_STAGE")).unwrap();
        fs::write(staging.path().join("zlib1g_1.0_amd64.deb"), "z").unwrap();
        fs::write(staging.path().join("htop_3.0_amd64.deb"), "h").unwrap();
        fs::create_dir(staging.path().join("partial")).unwrap();
        staging.refresh_artifacts().unwrap();
        assert_eq!(
            staging.artifact_names(),
            vec!["htop_3.0_amd64.deb", "zlib1g_1.0_amd64.deb"]
        );
        assert_eq!(staging.dir_name(), "pkg_STAGE");
    }

    #[test]
    fn clear_keeps_directory() {
        let temp = TempDir::new().unwrap();
        let mut staging = StagingArea::create(temp.path().join("pkg_STAGE")).unwrap();
        fs::write(staging.path().join("a.deb"), "a").unwrap();
        staging.clear().unwrap();
        staging.refresh_artifacts().unwrap();
        assert!(staging.artifacts().is_empty());
        assert!(staging.path().exists());
    }

    #[test]
    fn creates_missing_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("root").join("pkg_STAGE");
        let staging = StagingArea::create(&path).unwrap();
        assert!(staging.path().is_dir());
    }
}
