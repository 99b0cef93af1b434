//! Command lines for the PostgreSQL dump and load clients.
//!
//! Both builders share the connection rules: a connection URL is used verbatim
//! and wins over discrete credentials; otherwise the database is required,
//! the optional host/port/username become flags, and a password travels as a
//! leading `PGPASSWORD=` assignment (never as a flag). Without a password
//! `--no-password` keeps the client from prompting.

use crate::error::StrataError;
use crate::models::command::{shell_escape, shell_quote};
use crate::models::config::present;
use crate::models::search_path::split_components;
use crate::models::{DatabaseConfig, DumpOptions, LoadOptions, ShellCommand, TenancyConfig};

use std::path::Path;

/// Load client flag that stops at the first failing statement, so the exit
/// status reflects it.
pub const ON_ERROR_STOP: &str = "--set=ON_ERROR_STOP=1";

/// Build the `pg_dump` command line.
///
/// Flag order: `[url] [--schema-only] --no-privileges --no-owner
/// [--host --port --username --no-password] [--file] [--schema]... [database]`.
///
/// Like every other value, the URL is shell-escaped, so a query string shows
/// up as `db\?sslmode\=require` in the command line and reaches the client
/// verbatim.
pub fn dump_command(
    options: &DumpOptions,
    config: &TenancyConfig,
) -> Result<ShellCommand, StrataError> {
    let connection = options.connection.resolved(config);
    let target = ConnectionTarget::from_config(&connection)?;

    let mut command = target.start(&config.dump_binary);
    if options.structure_only {
        command = command.raw_arg("--schema-only");
    }
    command = command.raw_arg("--no-privileges").raw_arg("--no-owner");
    command = target.credential_flags(command);
    if let Some(file) = &options.file {
        command = command.raw_arg(file_flag(file));
    }
    if let Some(schemas) = &options.schemas {
        for schema in split_components(schemas) {
            command = command.raw_arg(format!("--schema={}", shell_escape(schema)));
        }
    }
    command = target.finish(command);

    tracing::debug!(command = %command.redacted(), "Built dump command");
    Ok(command)
}

/// Build the `psql` command line.
///
/// Flag order: `[url] [--file] [--host --port --username --no-password]
/// [database] [--command]`. The command, when given, is single-quoted and
/// always the last argument.
pub fn load_command(
    options: &LoadOptions,
    config: &TenancyConfig,
) -> Result<ShellCommand, StrataError> {
    let connection = options.connection.resolved(config);
    let target = ConnectionTarget::from_config(&connection)?;

    let mut command = target.start(&config.load_binary);
    if let Some(file) = &options.file {
        command = command.raw_arg(file_flag(file));
    }
    command = target.credential_flags(command);
    command = target.finish(command);
    if let Some(sql) = present(&options.command) {
        command = command.raw_arg(format!("--command={}", shell_quote(sql)));
    }

    tracing::debug!(command = %command.redacted(), "Built load command");
    Ok(command)
}

/// Run a single command to completion, failing on a non-zero exit.
pub async fn run(command: &ShellCommand) -> Result<(), StrataError> {
    tracing::debug!(command = %command.redacted(), "Running command");

    let status = command
        .to_command()
        .status()
        .await
        .map_err(|e| StrataError::io(format!("Failed to run {}", command.program()), e))?;

    if !status.success() {
        tracing::warn!(command = %command.redacted(), %status, "Command failed");
        return Err(StrataError::command_failed(command.program(), status));
    }
    Ok(())
}

/// How the client reaches the database.
enum ConnectionTarget<'a> {
    Url(&'a str),
    Discrete {
        database: &'a str,
        username: Option<&'a str>,
        host: Option<&'a str>,
        port: Option<u16>,
        password: Option<&'a str>,
    },
}

impl<'a> ConnectionTarget<'a> {
    fn from_config(config: &'a DatabaseConfig) -> Result<Self, StrataError> {
        if let Some(url) = present(&config.database_url) {
            return Ok(Self::Url(url));
        }

        let database = present(&config.database)
            .ok_or_else(|| StrataError::argument("database must be supplied"))?;
        Ok(Self::Discrete {
            database,
            username: present(&config.username),
            host: present(&config.host),
            port: config.port,
            password: present(&config.password),
        })
    }

    /// Binary, plus the shell-escaped URL right after it in URL mode.
    fn start(&self, binary: &str) -> ShellCommand {
        let command = ShellCommand::new(binary);
        match self {
            Self::Url(url) => command.arg(url),
            Self::Discrete { password: Some(password), .. } => command.with_password(*password),
            Self::Discrete { .. } => command,
        }
    }

    fn credential_flags(&self, mut command: ShellCommand) -> ShellCommand {
        let Self::Discrete { username, host, port, password, .. } = self else {
            return command;
        };
        if let Some(host) = host {
            command = command.raw_arg(format!("--host={}", shell_escape(host)));
        }
        if let Some(port) = port {
            command = command.raw_arg(format!("--port={port}"));
        }
        if let Some(username) = username {
            command = command.raw_arg(format!("--username={}", shell_escape(username)));
        }
        if password.is_none() {
            command = command.raw_arg("--no-password");
        }
        command
    }

    /// Database name as the positional argument in discrete mode.
    fn finish(&self, command: ShellCommand) -> ShellCommand {
        match self {
            Self::Url(_) => command,
            Self::Discrete { database, .. } => command.arg(database),
        }
    }
}

fn file_flag(file: &Path) -> String {
    format!("--file={}", shell_escape(&file.to_string_lossy()))
}
