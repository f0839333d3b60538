//! Shared value types passed between the resolver, fetcher, transport and installer.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Dependencies known to break when installed on a host other than the one
/// they were resolved on: they pin the exact C library of the control host.
pub const DEFAULT_EXCLUDED_DEPENDENCIES: [&str; 3] = ["libc-dev", "libc6-dev", "libc-dev-bin"];

/// A request to install one named package together with its dependency closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    name: String,
    excluded: BTreeSet<String>,
}

impl PackageRequest {
    /// Create a request with the default exclusion list.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidPackageName> {
        Self::with_exclusions(name, DEFAULT_EXCLUDED_DEPENDENCIES)
    }

    /// Create a request with an explicit set of excluded dependency patterns.
    ///
    /// Patterns are shell-style globs matched against whole package names.
    pub fn with_exclusions<I, S>(name: impl Into<String>, excluded: I) -> Result<Self, InvalidPackageName>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        validate_package_name(&name)?;
        Ok(Self {
            name,
            excluded: excluded.into_iter().map(Into::into).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn excluded(&self) -> &BTreeSet<String> {
        &self.excluded
    }

    /// Name of the local staging directory for this package.
    pub fn staging_dir_name(&self) -> String {
        format!("{}_STAGE", self.name)
    }
}

/// Rejection reason for a package name that is not a valid Debian package name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid package name '{name}': {reason}")]
pub struct InvalidPackageName {
    pub name: String,
    pub reason: &'static str,
}

/// Package names follow Debian policy (`[a-z0-9][a-z0-9+.-]+`), with an
/// optional `:arch` qualifier. Anything else could escape the staging root
/// or a remote shell line.
fn validate_package_name(name: &str) -> Result<(), InvalidPackageName> {
    let invalid = |reason| InvalidPackageName {
        name: name.to_string(),
        reason,
    };

    let (base, arch) = match name.split_once(':') {
        Some((base, arch)) => (base, Some(arch)),
        None => (name, None),
    };

    let mut chars = base.chars();
    match chars.next() {
        None => return Err(invalid("name is empty")),
        Some(c) if !(c.is_ascii_lowercase() || c.is_ascii_digit()) => {
            return Err(invalid("name must start with a lowercase letter or digit"));
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-' | '.')) {
        return Err(invalid("name may only contain a-z, 0-9, '+', '-' and '.'"));
    }

    if let Some(arch) = arch {
        if arch.is_empty() || !arch.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid("architecture qualifier is malformed"));
        }
    }
    Ok(())
}

/// A pdsh host-list pattern selecting a subset of the fleet (e.g. `node[1-3]`).
///
/// The syntax belongs to the fan-out tool and is passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeSelector(String);

impl NodeSelector {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Password used for `sudo` on the fleet.
///
/// Deliberately has no `Display` and a redacted `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the secret. Only the transport should need this.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_debian_package_names() {
        for name in ["htop", "libncurses6", "g++", "libstdc++6", "python3.12", "zlib1g:amd64"] {
            assert!(PackageRequest::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_names_that_could_escape() {
        for name in ["", "../etc", "htop;rm -rf /", "Htop", "-force", "a b", "pkg:", "pkg:a/b"] {
            assert!(PackageRequest::new(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn staging_dir_name_is_derived_from_package() {
        let request = PackageRequest::new("htop").unwrap();
        assert_eq!(request.staging_dir_name(), "htop_STAGE");
    }

    #[test]
    fn default_exclusions_cover_libc_dev() {
        let request = PackageRequest::new("htop").unwrap();
        assert!(request.excluded().contains("libc-dev"));
        assert!(request.excluded().contains("libc6-dev"));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("hunter2");
        let debug = format!("{credential:?}");
        assert!(!debug.contains("hunter2"));
        assert_eq!(credential.expose_secret(), "hunter2");
    }
}
