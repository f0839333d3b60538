//! `pdsh`/`pdcp` backed fleet transport.
//!
//! pdsh prefixes every line a node prints with `node: `, and reports its own
//! per-node problems on stderr as `pdsh@<host>: node: message`. Commands are
//! wrapped so each node ends its output with an exit status marker, which
//! turns pdsh's aggregate output back into per-node results.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::command::{RemoteCommand, STATUS_MARKER};
use super::{FleetReport, FleetTransport, NodeOutcome, NodeStatus};
use crate::error::{ExecError, ToolError, TransportError};
use crate::process::{RetryPolicy, ToolOutput, ToolSpec};
use crate::types::{Credential, NodeSelector};

/// pdsh's message when the host list expands to nothing.
const NO_HOSTS_MARKER: &str = "no remote hosts specified";

#[derive(Debug, Clone)]
pub struct PdshTransport {
    pdsh: ToolSpec,
    pdcp: ToolSpec,
    rcmd: Option<String>,
    copy_timeout: Duration,
    exec_timeout: Duration,
    retry: RetryPolicy,
    credential_env: String,
}

impl PdshTransport {
    pub fn new(pdsh: ToolSpec, pdcp: ToolSpec) -> Self {
        Self {
            pdsh,
            pdcp,
            rcmd: Some("ssh".to_string()),
            copy_timeout: Duration::from_secs(300),
            exec_timeout: Duration::from_secs(900),
            retry: RetryPolicy::default(),
            credential_env: "FLEETPKG_SUDO_PASSWORD".to_string(),
        }
    }

    /// Remote command module passed as `-R`; `None` keeps pdsh's default.
    pub fn with_rcmd(mut self, rcmd: Option<String>) -> Self {
        self.rcmd = rcmd;
        self
    }

    pub fn with_timeouts(mut self, copy: Duration, exec: Duration) -> Self {
        self.copy_timeout = copy;
        self.exec_timeout = exec;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Environment variable that carries the sudo password to the nodes.
    pub fn with_credential_env(mut self, name: impl Into<String>) -> Self {
        self.credential_env = name.into();
        self
    }

    fn base_args(&self, nodes: &NodeSelector) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(rcmd) = &self.rcmd {
            args.push("-R".to_string());
            args.push(rcmd.clone());
        }
        args.push("-w".to_string());
        args.push(nodes.as_str().to_string());
        args
    }

    fn run_pdsh(
        &self,
        command: &RemoteCommand,
        nodes: &NodeSelector,
        credential: Option<&Credential>,
        timeout: Duration,
    ) -> Result<FleetReport, FanoutError> {
        if nodes.as_str().trim().is_empty() {
            return Err(FanoutError::NoNodes);
        }

        let line = match credential {
            Some(_) => command.privileged(&self.credential_env),
            None => command.clone(),
        }
        .with_status_marker();

        let mut invocation = self
            .pdsh
            .command(timeout)
            .args(self.base_args(nodes))
            .arg(line.as_str());
        if let Some(credential) = credential {
            invocation = invocation
                .secret_env(&self.credential_env, credential)
                .env("PDSH_SSH_ARGS_APPEND", self.send_env_args());
        }

        let output = invocation.run()?;
        let report = interpret(&output, self.pdsh.program())?;
        debug!(
            nodes = %nodes,
            succeeded = report.succeeded_names().len(),
            failed = report.failed_names().len(),
            "fleet command finished"
        );
        Ok(report)
    }

    fn send_env_args(&self) -> String {
        let send_env = format!("-o SendEnv={}", self.credential_env);
        match std::env::var("PDSH_SSH_ARGS_APPEND") {
            Ok(existing) if !existing.trim().is_empty() => format!("{existing} {send_env}"),
            _ => send_env,
        }
    }

    fn copy_once(&self, local: &Path, remote: &Path, nodes: &NodeSelector) -> Result<FleetReport, FanoutError> {
        let remote_str = remote.to_string_lossy();
        let mut prepare = RemoteCommand::from_args(["rm", "-rf", "--", remote_str.as_ref()]);
        if let Some(parent) = remote.parent().filter(|p| !p.as_os_str().is_empty()) {
            prepare = prepare.and_then(RemoteCommand::from_args([
                "mkdir",
                "-p",
                "--",
                parent.to_string_lossy().as_ref(),
            ]));
        }

        // pdcp does not create missing destination directories, and the
        // nodes that answer here are the ones the copy must reach.
        let prepared = self.run_pdsh(&prepare, nodes, None, self.copy_timeout)?;
        if !prepared.all_succeeded() {
            return Err(FanoutError::NodesFailed(prepared));
        }

        let output = self
            .pdcp
            .command(self.copy_timeout)
            .args(self.base_args(nodes))
            .arg("-r")
            .arg(local.to_string_lossy())
            .arg(remote_str.as_ref())
            .run()?;

        let parsed = parse_fanout_output(&output.stdout, &output.stderr);
        if let Some(err) = parsed.no_hosts_error() {
            return Err(err);
        }
        // On a failed run, anything a node printed is that node's error.
        let failed_code = (!output.success()).then_some(output.code);
        let outcome_for = |node: &str| match (parsed.diagnostics.get(node), failed_code, parsed.output.get(node)) {
            (Some(reasons), _, _) => NodeOutcome::unreachable(node, reasons.join("; ")),
            (None, Some(code), Some(lines)) => NodeOutcome {
                output: lines.clone(),
                ..NodeOutcome::failed(node, code)
            },
            _ => NodeOutcome::succeeded(node),
        };
        let mut outcomes: Vec<NodeOutcome> = prepared.nodes().iter().map(|n| outcome_for(&n.node)).collect();
        for node in parsed.nodes() {
            if prepared.get(&node).is_none() {
                let outcome = outcome_for(&node);
                if !outcome.is_success() {
                    outcomes.push(outcome);
                }
            }
        }
        let report = FleetReport::new(outcomes);

        if !report.all_succeeded() {
            return Err(FanoutError::NodesFailed(report));
        }
        if !output.success() {
            return Err(FanoutError::Tool(failed_tool(self.pdcp.program(), &output)));
        }
        Ok(report)
    }
}

impl FleetTransport for PdshTransport {
    fn copy(&self, local: &Path, remote: &Path, nodes: &NodeSelector) -> Result<FleetReport, TransportError> {
        let report = self
            .retry
            .run(
                "fleet copy",
                |_| self.copy_once(local, remote, nodes),
                FanoutError::is_retryable,
            )
            .map_err(|err| err.into_transport(nodes))?;
        info!(
            nodes = %nodes,
            count = report.len(),
            remote = %remote.display(),
            "copied staging directory to fleet"
        );
        Ok(report)
    }

    fn exec(
        &self,
        command: &RemoteCommand,
        nodes: &NodeSelector,
        credential: Option<&Credential>,
    ) -> Result<FleetReport, ExecError> {
        let report = self
            .run_pdsh(command, nodes, credential, self.exec_timeout)
            .map_err(|err| err.into_exec(nodes))?;
        if !report.all_succeeded() {
            for failed in report.failed() {
                warn!(node = %failed.node, status = ?failed.status, "fleet command failed on node");
            }
            return Err(ExecError::NodesFailed { report });
        }
        Ok(report)
    }
}

/// Failure shared by both primitives before it is mapped to the caller's error type.
#[derive(Debug)]
enum FanoutError {
    NoNodes,
    NodesFailed(FleetReport),
    Tool(ToolError),
}

impl FanoutError {
    fn is_retryable(&self) -> bool {
        match self {
            FanoutError::NoNodes => false,
            FanoutError::NodesFailed(_) => true,
            FanoutError::Tool(err) => !matches!(err, ToolError::NotFound { .. }),
        }
    }

    fn into_transport(self, nodes: &NodeSelector) -> TransportError {
        match self {
            FanoutError::NoNodes => TransportError::NoNodes {
                selector: nodes.to_string(),
            },
            FanoutError::NodesFailed(report) => TransportError::NodesFailed { report },
            FanoutError::Tool(err) => TransportError::Tool(err),
        }
    }

    fn into_exec(self, nodes: &NodeSelector) -> ExecError {
        match self {
            FanoutError::NoNodes => ExecError::NoNodes {
                selector: nodes.to_string(),
            },
            FanoutError::NodesFailed(report) => ExecError::NodesFailed { report },
            FanoutError::Tool(err) => ExecError::Tool(err),
        }
    }
}

impl std::fmt::Display for FanoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FanoutError::NoNodes => f.write_str("no nodes matched"),
            FanoutError::NodesFailed(report) => {
                write!(f, "failed on node(s): {}", report.failed_names().join(", "))
            }
            FanoutError::Tool(err) => err.fmt(f),
        }
    }
}

impl From<ToolError> for FanoutError {
    fn from(err: ToolError) -> Self {
        FanoutError::Tool(err)
    }
}

/// Output of a pdsh/pdcp run, split by node.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutOutput {
    /// Lines each node printed, marker excluded.
    pub output: BTreeMap<String, Vec<String>>,
    /// Exit status reported by each node's marker line.
    pub status: BTreeMap<String, i32>,
    /// pdsh/pdcp diagnostics about specific nodes.
    pub diagnostics: BTreeMap<String, Vec<String>>,
    /// pdsh/pdcp diagnostics not tied to a node.
    pub general: Vec<String>,
}

impl FanoutOutput {
    fn no_hosts_error(&self) -> Option<FanoutError> {
        self.general
            .iter()
            .any(|line| line.contains(NO_HOSTS_MARKER))
            .then_some(FanoutError::NoNodes)
    }

    /// Every node that showed up in the output, in name order.
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .output
            .keys()
            .chain(self.status.keys())
            .chain(self.diagnostics.keys())
            .cloned()
            .collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }

    /// Per-node outcomes; nodes with no status marker did not finish.
    pub fn into_report(self) -> FleetReport {
        let outcomes = self
            .nodes()
            .into_iter()
            .map(|node| {
                let status = match (self.status.get(&node), self.diagnostics.get(&node)) {
                    (Some(0), _) => NodeStatus::Succeeded,
                    (Some(code), _) => NodeStatus::Failed { code: Some(*code) },
                    (None, Some(reasons)) => NodeStatus::Unreachable {
                        reason: reasons.join("; "),
                    },
                    (None, None) => NodeStatus::Unreachable {
                        reason: "node did not report an exit status".to_string(),
                    },
                };
                NodeOutcome {
                    output: self.output.get(&node).cloned().unwrap_or_default(),
                    node,
                    status,
                }
            })
            .collect();
        FleetReport::new(outcomes)
    }
}

/// Split pdsh/pdcp stdout and stderr into per-node output, status and diagnostics.
pub fn parse_fanout_output(stdout: &str, stderr: &str) -> FanoutOutput {
    let mut parsed = FanoutOutput::default();

    for line in stdout.lines().chain(stderr.lines()) {
        let Some((head, rest)) = line.split_once(": ") else {
            if !line.trim().is_empty() {
                parsed.general.push(line.trim().to_string());
            }
            continue;
        };

        if is_tool_prefix(head) {
            match rest.split_once(": ") {
                Some((node, message)) if is_node_name(node) => {
                    parsed
                        .diagnostics
                        .entry(node.to_string())
                        .or_default()
                        .push(message.to_string());
                }
                _ => parsed.general.push(rest.to_string()),
            }
            continue;
        }

        let node = head.to_string();
        if let Some((before, code)) = split_status(rest) {
            // Output without a trailing newline shares the marker's line.
            if !before.trim().is_empty() {
                parsed.output.entry(node.clone()).or_default().push(before.to_string());
            }
            parsed.status.insert(node, code);
            continue;
        }
        parsed.output.entry(node).or_default().push(rest.to_string());
    }

    parsed
}

/// Find a trailing status marker, returning the text before it and the code.
fn split_status(rest: &str) -> Option<(&str, i32)> {
    let at = rest.rfind(STATUS_MARKER)?;
    let code = rest[at + STATUS_MARKER.len()..].trim().parse().ok()?;
    Some((&rest[..at], code))
}

/// `pdsh@controller` / `pdcp@controller`.
fn is_tool_prefix(head: &str) -> bool {
    head.starts_with("pdsh@") || head.starts_with("pdcp@")
}

fn is_node_name(candidate: &str) -> bool {
    !candidate.is_empty() && !candidate.contains(char::is_whitespace)
}

fn interpret(output: &ToolOutput, program: &str) -> Result<FleetReport, FanoutError> {
    let parsed = parse_fanout_output(&output.stdout, &output.stderr);
    if let Some(err) = parsed.no_hosts_error() {
        return Err(err);
    }
    if parsed.nodes().is_empty() {
        if output.success() {
            // pdsh ran but nothing answered.
            return Err(FanoutError::NoNodes);
        }
        return Err(FanoutError::Tool(failed_tool(program, output)));
    }
    Ok(parsed.into_report())
}

fn failed_tool(program: &str, output: &ToolOutput) -> ToolError {
    ToolError::Failed {
        program: program.to_string(),
        code: output.code,
        stderr: output.stderr.clone(),
    }
}
