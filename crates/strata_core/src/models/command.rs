//! Dump/load command models.
//!
//! `DumpOptions` and `LoadOptions` describe what the caller wants;
//! `ShellCommand` is the assembled, shell-safe result.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use crate::models::config::{redact_url, DatabaseConfig};

/// Environment variable the PostgreSQL clients read the password from.
pub const PASSWORD_ENV: &str = "PGPASSWORD";

/// Options for a `pg_dump` invocation.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// Connection settings.
    pub connection: DatabaseConfig,
    /// Comma-separated schemas to restrict the dump to.
    pub schemas: Option<String>,
    /// Dump definitions only, no rows.
    pub structure_only: bool,
    /// Write the dump to this file instead of standard output.
    pub file: Option<PathBuf>,
}

impl DumpOptions {
    /// Create dump options for a connection.
    pub fn new(connection: DatabaseConfig) -> Self {
        Self { connection, ..Self::default() }
    }

    /// Restrict to a comma-separated list of schemas.
    pub fn with_schemas(mut self, schemas: impl Into<String>) -> Self {
        self.schemas = Some(schemas.into());
        self
    }

    /// Dump structure only.
    pub fn with_structure_only(mut self, structure_only: bool) -> Self {
        self.structure_only = structure_only;
        self
    }

    /// Write to a file.
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Options for a `psql` invocation.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Connection settings.
    pub connection: DatabaseConfig,
    /// Read SQL from this file.
    pub file: Option<PathBuf>,
    /// Run a single SQL command.
    pub command: Option<String>,
}

impl LoadOptions {
    /// Create load options for a connection.
    pub fn new(connection: DatabaseConfig) -> Self {
        Self { connection, ..Self::default() }
    }

    /// Read from a file.
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Run a single command.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

/// A fully assembled command line.
///
/// Arguments are stored already shell-escaped, so `Display` yields a line that
/// can be pasted into a shell as-is. The password, when present, is kept apart
/// from the arguments and handed to the child through its environment.
#[derive(Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    password: Option<String>,
}

impl ShellCommand {
    /// Start a command for a program. The program name is escaped here.
    pub fn new(program: &str) -> Self {
        Self { program: shell_escape(program), args: Vec::new(), password: None }
    }

    /// Append an argument that is already shell-safe.
    pub fn raw_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append an argument, escaping it.
    pub fn arg(self, arg: &str) -> Self {
        self.raw_arg(shell_escape(arg))
    }

    /// Deliver a password through the environment.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// The (escaped) program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The escaped argument tokens.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Whether a password will be passed through the environment.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// The command line without the environment assignment.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The command line with secrets masked, for logs.
    pub fn redacted(&self) -> String {
        let line = self
            .args
            .iter()
            .fold(self.program.clone(), |line, arg| format!("{line} {}", redact_url(arg)));
        match self.password {
            Some(_) => format!("{PASSWORD_ENV}=*** {line}"),
            None => line,
        }
    }

    /// Build a child process running this line through `sh -c`.
    ///
    /// The password goes into the child's environment rather than the shell
    /// line, so it never shows up in process listings. The child is killed if
    /// the handle is dropped before it exits.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg(self.command_line()).stdin(Stdio::null()).kill_on_drop(true);
        if let Some(password) = &self.password {
            command.env(PASSWORD_ENV, password);
        }
        command
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(password) = &self.password {
            write!(f, "{PASSWORD_ENV}={} ", shell_escape(password))?;
        }
        f.write_str(&self.command_line())
    }
}

impl fmt::Debug for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ShellCommand").field(&self.redacted()).finish()
    }
}

/// Escape a string for use as a single shell word.
///
/// Backslash-escapes every character outside `[A-Za-z0-9_\-.,:+/@]`; newlines
/// are wrapped in single quotes. An empty string becomes `''`.
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }

    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '_' | '-' | '.' | ',' | ':' | '+' | '/' | '@' => {
                escaped.push(c)
            }
            '\n' => escaped.push_str("'\n'"),
            _ => {
                escaped.push('\\');
                escaped.push(c);
            }
        }
    }
    escaped
}

/// Quote a string as one single-quoted shell word.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}
