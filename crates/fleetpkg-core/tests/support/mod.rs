//! Test doubles for the three install seams.
//!
//! Each double records what it was asked to do into a shared [`Journal`]
//! so tests can check ordering across resolver, fetcher and transport.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use fleetpkg_core::error::{ExecError, FetchError, ResolveError, ToolError, TransportError};
use fleetpkg_core::fetch::{ArtifactFetcher, StagingArea};
use fleetpkg_core::install::RemoteInstaller;
use fleetpkg_core::resolve::{DependencyResolver, ExclusionSet, parse_closure};
use fleetpkg_core::transport::{FleetReport, FleetTransport, NodeOutcome, RemoteCommand};
use fleetpkg_core::types::{Credential, NodeSelector, PackageRequest};

/// `apt-rdepends htop` style output, including a denylisted dependency.
pub const HTOP_RDEPENDS: &str = "\
htop
  Depends: libc6 (>= 2.34)
  Depends: libncursesw6 (>= 6)
  Depends: libc-dev-bin
libc6
  Depends: libgcc-s1
libc-dev-bin
  Depends: libc6 (>= 2.34)
libgcc-s1
libncursesw6
  Depends: libtinfo6 (= 6.4-4)
libtinfo6
";

pub const TREE_RDEPENDS: &str = "tree\n  Depends: libc6 (>= 2.34)\nlibc6\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Resolve(String),
    Fetch {
        packages: Vec<String>,
        destination: PathBuf,
    },
    Copy {
        local: PathBuf,
        remote: PathBuf,
        nodes: String,
        /// Files present in `local` when the copy ran.
        files: Vec<String>,
    },
    Exec {
        line: String,
        nodes: String,
        privileged: bool,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    fn record(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn copies(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Event::Copy { .. }))
            .collect()
    }

    pub fn execs(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Event::Exec { .. }))
            .collect()
    }

    pub fn fetches(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Fetch { .. }))
            .count()
    }
}

/// Answers from canned `apt-rdepends` output per package.
pub struct FakeResolver {
    outputs: BTreeMap<String, String>,
    journal: Journal,
}

impl FakeResolver {
    pub fn new(journal: Journal) -> Self {
        Self {
            outputs: BTreeMap::from([
                ("htop".to_string(), HTOP_RDEPENDS.to_string()),
                ("tree".to_string(), TREE_RDEPENDS.to_string()),
            ]),
            journal,
        }
    }
}

impl DependencyResolver for FakeResolver {
    fn resolve(&self, request: &PackageRequest) -> Result<Vec<String>, ResolveError> {
        self.journal.record(Event::Resolve(request.name().to_string()));
        let output = self
            .outputs
            .get(request.name())
            .ok_or_else(|| ResolveError::UnknownPackage {
                package: request.name().to_string(),
            })?;
        Ok(parse_closure(output, &ExclusionSet::new(request.excluded())))
    }
}

/// Writes `<pkg>_1.0_amd64.deb` per package, or fails halfway when told to.
pub struct FakeFetcher {
    journal: Journal,
    fail: bool,
}

impl FakeFetcher {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail: false,
        }
    }

    pub fn failing(journal: Journal) -> Self {
        Self {
            journal,
            fail: true,
        }
    }
}

impl ArtifactFetcher for FakeFetcher {
    fn fetch(&self, resolved: &[String], destination: &Path) -> Result<StagingArea, FetchError> {
        self.journal.record(Event::Fetch {
            packages: resolved.to_vec(),
            destination: destination.to_path_buf(),
        });
        let mut staging = StagingArea::create(destination)?;
        for (i, package) in resolved.iter().enumerate() {
            if self.fail && i == 1 {
                return Err(FetchError::Tool(ToolError::Failed {
                    program: "apt-get".to_string(),
                    code: Some(100),
                    stderr: format!("E: Failed to fetch {package}"),
                }));
            }
            std::fs::write(destination.join(format!("{package}_1.0_amd64.deb")), package)
                .expect("write artifact");
        }
        staging.refresh_artifacts().expect("scan staging");
        Ok(staging)
    }
}

/// Expands `node[1-3]` and `a,b` selectors; anything else matches nothing.
pub fn expand(nodes: &NodeSelector) -> Vec<String> {
    let pattern = nodes.as_str().trim();
    if pattern.is_empty() {
        return Vec::new();
    }
    if let Some((prefix, range)) = pattern.strip_suffix(']').and_then(|p| p.split_once('[')) {
        let Some((lo, hi)) = range.split_once('-') else {
            return Vec::new();
        };
        let (Ok(lo), Ok(hi)) = (lo.parse::<u32>(), hi.parse::<u32>()) else {
            return Vec::new();
        };
        return (lo..=hi).map(|i| format!("{prefix}{i}")).collect();
    }
    pattern.split(',').map(str::to_string).collect()
}

/// Records every copy/exec and answers per node; one node can be made to fail.
pub struct RecordingTransport {
    journal: Journal,
    copy_fails_on: Option<String>,
    exec_fails_on: Option<String>,
}

impl RecordingTransport {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            copy_fails_on: None,
            exec_fails_on: None,
        }
    }

    pub fn copy_fails_on(mut self, node: &str) -> Self {
        self.copy_fails_on = Some(node.to_string());
        self
    }

    pub fn exec_fails_on(mut self, node: &str) -> Self {
        self.exec_fails_on = Some(node.to_string());
        self
    }

    fn report(nodes: &[String], failing: Option<&String>, fail: impl Fn(&str) -> NodeOutcome) -> FleetReport {
        FleetReport::new(
            nodes
                .iter()
                .map(|n| match failing {
                    Some(bad) if bad == n => fail(n.as_str()),
                    _ => NodeOutcome::succeeded(n.as_str()),
                })
                .collect(),
        )
    }
}

impl FleetTransport for RecordingTransport {
    fn copy(&self, local: &Path, remote: &Path, nodes: &NodeSelector) -> Result<FleetReport, TransportError> {
        let mut files: Vec<String> = std::fs::read_dir(local)
            .expect("staging exists during copy")
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        self.journal.record(Event::Copy {
            local: local.to_path_buf(),
            remote: remote.to_path_buf(),
            nodes: nodes.to_string(),
            files,
        });

        let matched = expand(nodes);
        if matched.is_empty() {
            return Err(TransportError::NoNodes {
                selector: nodes.to_string(),
            });
        }
        let report = Self::report(&matched, self.copy_fails_on.as_ref(), |n| {
            NodeOutcome::unreachable(n, "ssh exited with exit code 255")
        });
        if report.all_succeeded() {
            Ok(report)
        } else {
            Err(TransportError::NodesFailed { report })
        }
    }

    fn exec(
        &self,
        command: &RemoteCommand,
        nodes: &NodeSelector,
        credential: Option<&Credential>,
    ) -> Result<FleetReport, ExecError> {
        self.journal.record(Event::Exec {
            line: command.to_string(),
            nodes: nodes.to_string(),
            privileged: credential.is_some(),
        });

        let matched = expand(nodes);
        if matched.is_empty() {
            return Err(ExecError::NoNodes {
                selector: nodes.to_string(),
            });
        }
        let report = Self::report(&matched, self.exec_fails_on.as_ref(), |n| NodeOutcome::failed(n, Some(1)));
        if report.all_succeeded() {
            Ok(report)
        } else {
            Err(ExecError::NodesFailed { report })
        }
    }
}

/// Installer wired to the doubles, staging under `staging_root`.
pub fn installer(staging_root: &Path, journal: &Journal, transport: RecordingTransport) -> RemoteInstaller {
    RemoteInstaller::new(
        Box::new(FakeResolver::new(journal.clone())),
        Box::new(FakeFetcher::new(journal.clone())),
        Box::new(transport),
    )
    .with_staging_root(staging_root)
}

pub fn credential() -> Credential {
    Credential::new("hunter2")
}

/// Entries directly under `dir`, sorted.
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
