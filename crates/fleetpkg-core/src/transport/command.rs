//! Remote shell line construction.
//!
//! Every argument is quoted on its own; nothing caller-supplied is ever
//! spliced into a line unquoted.

use std::fmt;

/// Prefix of the line each node prints after running a command.
pub(crate) const STATUS_MARKER: &str = "__FLEETPKG_STATUS=";

/// A shell line to run on every node of a fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    line: String,
}

impl RemoteCommand {
    /// Build a command from argv-style words.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let line = args
            .into_iter()
            .map(|arg| shell_quote(arg.as_ref()))
            .collect::<Vec<_>>()
            .join(" ");
        Self { line }
    }

    /// Run `next` only if `self` succeeds.
    pub fn and_then(self, next: RemoteCommand) -> Self {
        Self {
            line: format!("{} && {}", self.line, next.line),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// Run as root through `sudo -S`, feeding the password from the
    /// environment variable `env_var` on stdin.
    ///
    /// The password is expanded by the remote shell, so it never appears in
    /// this line, in argv, or in a process listing.
    pub fn privileged(&self, env_var: &str) -> Self {
        Self {
            line: format!(
                "printf '%s\\n' \"${env_var}\" | sudo -S -p '' -- sh -c {}",
                shell_quote(&self.line)
            ),
        }
    }

    /// Wrap so the node reports the exit status on its last output line.
    pub(crate) fn with_status_marker(&self) -> Self {
        Self {
            line: format!(
                "sh -c {}; echo \"{STATUS_MARKER}$?\"",
                shell_quote(&self.line)
            ),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// Quote a word for a POSIX shell.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '+' | ',' | '@' | '%'));
    if safe {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Environment variable names that are safe to expand in a remote line.
pub fn is_valid_env_var(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase() || c == '_')
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
