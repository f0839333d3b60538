//! Dependency resolution: package name to dependency-closed package list.
//!
//! The system implementation shells out to `apt-rdepends`, whose output
//! lists every package of the closure on its own line, followed by indented
//! `Depends:` lines describing the edges.

mod apt;

pub use apt::AptRdependsResolver;

use glob::Pattern;
use tracing::debug;

use crate::error::ResolveError;
use crate::types::PackageRequest;

/// Resolves a package to itself plus its transitive dependencies.
pub trait DependencyResolver: Send + Sync {
    /// Return the closure for `request`, excluding its denylisted patterns.
    ///
    /// The result is ordered and stable for a fixed package index.
    fn resolve(&self, request: &PackageRequest) -> Result<Vec<String>, ResolveError>;
}

/// Filters that apply to dependency-tool output.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    patterns: Vec<Pattern>,
}

impl ExclusionSet {
    /// Compile exclusion globs. Patterns that are not valid globs are matched literally.
    pub fn new<'a, I>(patterns: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Pattern::new(p).or_else(|_| Pattern::new(&Pattern::escape(p))))
            .filter_map(Result::ok)
            .collect();
        Self { patterns }
    }

    pub fn is_excluded(&self, package: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(package))
    }
}

/// Parse `apt-rdepends`-style output into the dependency closure.
///
/// Indented lines are edge descriptions, not closure members. Excluded
/// packages are dropped and duplicates keep their first position.
pub fn parse_closure(output: &str, exclusions: &ExclusionSet) -> Vec<String> {
    let mut closure: Vec<String> = Vec::new();
    for line in output.lines() {
        if line.is_empty() || line.starts_with(char::is_whitespace) {
            continue;
        }
        let name = line.trim();
        if exclusions.is_excluded(name) {
            debug!(package = name, "excluding denylisted dependency");
            continue;
        }
        if !closure.iter().any(|existing| existing == name) {
            closure.push(name.to_string());
        }
    }
    closure
}
