//! Schema duplication through the dump and load clients.
//!
//! The dump client writes the source schema's definitions to its stdout; each
//! line is retargeted at the new schema and fed to the load client's stdin as
//! it arrives. Nothing is buffered beyond one line.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::StrataError;
use crate::models::schema_name::quote_ident;
use crate::models::search_path::split_components;
use crate::models::{DatabaseConfig, DumpOptions, LoadOptions, ShellCommand, TenancyConfig};
use crate::services::command::{dump_command, load_command, ON_ERROR_STOP};
use crate::services::connection::SchemaConnection;
use crate::services::suffix::Suffixifier;

/// Options for [`Duplicator::duplicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateOptions {
    /// Copy definitions only. Applied migration versions are still copied.
    pub structure_only: bool,
}

impl Default for DuplicateOptions {
    fn default() -> Self {
        Self { structure_only: true }
    }
}

/// Clones one schema into another.
pub struct Duplicator<'a, C: SchemaConnection + ?Sized> {
    conn: &'a C,
    config: Arc<TenancyConfig>,
    database: &'a DatabaseConfig,
}

impl<'a, C: SchemaConnection + ?Sized> Duplicator<'a, C> {
    /// Create a duplicator. `conn` is used to create the target schema and to
    /// copy migration versions; the clients connect with `database`.
    pub fn new(conn: &'a C, config: Arc<TenancyConfig>, database: &'a DatabaseConfig) -> Self {
        Self { conn, config, database }
    }

    /// Copy `from` into `to`, returning the suffixed target name.
    ///
    /// There is no rollback: when either client fails the target is left
    /// empty or partially loaded.
    pub async fn duplicate(
        &self,
        from: &str,
        to: &str,
        options: DuplicateOptions,
    ) -> Result<String, StrataError> {
        let suffixifier = Suffixifier::from_config(&self.config);
        let source = suffixifier.suffixify(from);
        let target = suffixifier.suffixify(to);
        if source.is_empty() || target.is_empty() {
            return Err(StrataError::argument("source and target schemas must be supplied"));
        }
        if split_components(&source).count() != 1 || split_components(&target).count() != 1 {
            return Err(StrataError::argument("duplicate works on a single schema"));
        }

        tracing::info!(
            source = %source,
            target = %target,
            structure_only = options.structure_only,
            "Duplicating schema"
        );

        let existing = self.conn.namespaces(true).await?;
        if !existing.iter().any(|name| name == &target) {
            self.conn.create_schema(&target).await?;
        }

        let dump = dump_command(
            &DumpOptions::new(self.database.clone())
                .with_schemas(source.as_str())
                .with_structure_only(options.structure_only),
            &self.config,
        )?;
        let load = load_command(&LoadOptions::new(self.database.clone()), &self.config)?
            .raw_arg(ON_ERROR_STOP);

        let rewriter = SchemaRewriter::new(&source, &target);
        let lines = pipe(&dump, &load, &rewriter).await?;

        if options.structure_only {
            if let Some(table) = self.config.migrations_table.as_deref() {
                self.conn.batch_execute(&copy_migrations_sql(table, &source, &target)).await?;
            }
        }

        tracing::info!(source = %source, target = %target, lines, "Schema duplicated");
        Ok(target)
    }
}

/// Run `dump | load`, rewriting each line on the way through.
///
/// Both children are awaited. A failing load is reported ahead of a failing
/// dump, since a dying reader takes the writer down with it.
pub async fn pipe(
    dump: &ShellCommand,
    load: &ShellCommand,
    rewriter: &SchemaRewriter,
) -> Result<u64, StrataError> {
    tracing::debug!(dump = %dump.redacted(), load = %load.redacted(), "Starting pipeline");

    let mut dump_child = dump
        .to_command()
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| StrataError::io(format!("Failed to spawn {}", dump.program()), e))?;
    let mut load_child = load
        .to_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .map_err(|e| StrataError::io(format!("Failed to spawn {}", load.program()), e))?;

    let reader = dump_child
        .stdout
        .take()
        .ok_or_else(|| StrataError::internal("dump stdout was not captured"))?;
    let writer = load_child
        .stdin
        .take()
        .ok_or_else(|| StrataError::internal("load stdin was not captured"))?;

    let (forwarded, dump_status, load_status) =
        tokio::join!(forward_lines(reader, writer, rewriter), dump_child.wait(), load_child.wait());

    let load_status = load_status
        .map_err(|e| StrataError::io(format!("Failed to wait for {}", load.program()), e))?;
    let dump_status = dump_status
        .map_err(|e| StrataError::io(format!("Failed to wait for {}", dump.program()), e))?;

    if !load_status.success() {
        tracing::error!(command = %load.redacted(), status = %load_status, "Load failed");
        return Err(StrataError::command_failed(load.program(), load_status));
    }
    if !dump_status.success() {
        tracing::error!(command = %dump.redacted(), status = %dump_status, "Dump failed");
        return Err(StrataError::command_failed(dump.program(), dump_status));
    }
    forwarded
}

/// Copy lines from `reader` to `writer` through the rewriter, then close the
/// writer. Lines that are not UTF-8 pass through untouched.
async fn forward_lines<R, W>(
    reader: R,
    mut writer: W,
    rewriter: &SchemaRewriter,
) -> Result<u64, StrataError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut count = 0;

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| StrataError::io("Failed to read dump output", e))?;
        if read == 0 {
            break;
        }

        let written = match std::str::from_utf8(&line) {
            Ok(text) => writer.write_all(rewriter.rewrite_line(text).as_bytes()).await,
            Err(_) => writer.write_all(&line).await,
        };
        written.map_err(|e| StrataError::io("Failed to write load input", e))?;
        count += 1;
    }

    writer.shutdown().await.map_err(|e| StrataError::io("Failed to close load input", e))?;
    Ok(count)
}

/// Retargets dump output from one schema to another.
///
/// Handles schema-qualified names (`from.t`, `"from".t`), statements naming
/// the schema (`ALTER SCHEMA from ...`, `COMMENT ON SCHEMA from ...`), the
/// `search_path` setting, and turns `CREATE SCHEMA from;` into an
/// `IF NOT EXISTS` create of the target, which already exists by then.
#[derive(Debug, Clone)]
pub struct SchemaRewriter {
    from: String,
    to: String,
}

impl SchemaRewriter {
    /// Create a rewriter from `from` to `to`.
    pub fn new(from: &str, to: &str) -> Self {
        Self { from: from.to_string(), to: to.to_string() }
    }

    /// Rewrite one line, keeping its line ending.
    pub fn rewrite_line(&self, line: &str) -> String {
        if self.from == self.to {
            return line.to_string();
        }

        let body = line.trim_end_matches(['\n', '\r']);
        let ending = &line[body.len()..];
        format!("{}{ending}", self.rewrite_body(body))
    }

    fn rewrite_body(&self, body: &str) -> String {
        let from_quoted = quote_ident(&self.from);
        let to_quoted = quote_ident(&self.to);

        let statement = body.trim();
        if statement == format!("CREATE SCHEMA {};", self.from)
            || statement == format!("CREATE SCHEMA {from_quoted};")
        {
            return format!("CREATE SCHEMA IF NOT EXISTS {to_quoted};");
        }
        if let Some(path) = body.strip_prefix("SET search_path = ") {
            return format!("SET search_path = {}", self.rewrite_path(path));
        }

        let mut text = replace_bounded(
            body,
            &format!("SCHEMA {}", self.from),
            &format!("SCHEMA {}", self.to),
            true,
        );
        text = replace_bounded(
            &text,
            &format!("SCHEMA {from_quoted}"),
            &format!("SCHEMA {to_quoted}"),
            false,
        );
        text = replace_bounded(&text, &format!("{}.", self.from), &format!("{}.", self.to), false);
        replace_bounded(&text, &format!("{from_quoted}."), &format!("{to_quoted}."), false)
    }

    fn rewrite_path(&self, path: &str) -> String {
        let (components, tail) = match path.strip_suffix(';') {
            Some(components) => (components, ";"),
            None => (path, ""),
        };
        let rewritten: Vec<&str> = split_components(components)
            .map(|c| if c == self.from { self.to.as_str() } else { c })
            .collect();
        format!("{}{tail}", rewritten.join(", "))
    }
}

/// Replace occurrences of `needle` that are not glued to a preceding
/// identifier, and, when `word_end` is set, not followed by one either.
fn replace_bounded(text: &str, needle: &str, replacement: &str, word_end: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(needle) {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + needle.len()..];

        let head_ok = out.chars().next_back().map_or(true, |c| !is_identifier_char(c));
        let tail_ok = !word_end || after.chars().next().map_or(true, |c| !is_identifier_char(c));
        out.push_str(if head_ok && tail_ok { replacement } else { needle });
        rest = after;
    }
    out.push_str(rest);
    out
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '"' | '.')
}

/// SQL copying applied migration versions, guarded on both tables existing.
fn copy_migrations_sql(table: &str, from: &str, to: &str) -> String {
    let source = format!("{}.{}", quote_ident(from), quote_ident(table));
    let target = format!("{}.{}", quote_ident(to), quote_ident(table));
    format!(
        "DO $strata$ BEGIN \
         IF to_regclass('{source_lit}') IS NOT NULL AND to_regclass('{target_lit}') IS NOT NULL THEN \
         INSERT INTO {target} SELECT * FROM {source} ON CONFLICT DO NOTHING; \
         END IF; END $strata$;",
        source_lit = source.replace('\'', "''"),
        target_lit = target.replace('\'', "''"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryConnection;

    #[test]
    fn test_rewrite_qualified_names() {
        let r = SchemaRewriter::new("public", "acme");
        assert_eq!(
            r.rewrite_line("CREATE TABLE public.users (id integer);\n"),
            "CREATE TABLE acme.users (id integer);\n"
        );
        assert_eq!(
            r.rewrite_line("ALTER TABLE ONLY \"public\".users ADD CONSTRAINT users_pkey;"),
            "ALTER TABLE ONLY \"acme\".users ADD CONSTRAINT users_pkey;"
        );
        assert_eq!(
            r.rewrite_line("    DEFAULT nextval('public.users_id_seq'::regclass)\r\n"),
            "    DEFAULT nextval('acme.users_id_seq'::regclass)\r\n"
        );
    }

    #[test]
    fn test_rewrite_leaves_lookalikes() {
        let r = SchemaRewriter::new("acme", "beta");
        assert_eq!(r.rewrite_line("SELECT notacme.x, acme_old.y;"), "SELECT notacme.x, acme_old.y;");
        assert_eq!(r.rewrite_line("COMMENT ON SCHEMA acme_old IS 'x';"), "COMMENT ON SCHEMA acme_old IS 'x';");
        assert_eq!(r.rewrite_line("-- plain comment\n"), "-- plain comment\n");
    }

    #[test]
    fn test_rewrite_schema_statements() {
        let r = SchemaRewriter::new("public", "acme");
        assert_eq!(r.rewrite_line("CREATE SCHEMA public;\n"), "CREATE SCHEMA IF NOT EXISTS \"acme\";\n");
        assert_eq!(r.rewrite_line("COMMENT ON SCHEMA public IS 'std';"), "COMMENT ON SCHEMA acme IS 'std';");
        assert_eq!(r.rewrite_line("SET search_path = public, pg_catalog;"), "SET search_path = acme, pg_catalog;");
    }

    #[test]
    fn test_rewrite_same_schema_is_identity() {
        let r = SchemaRewriter::new("acme", "acme");
        assert_eq!(r.rewrite_line("CREATE SCHEMA acme;\n"), "CREATE SCHEMA acme;\n");
    }

    #[test]
    fn test_copy_migrations_sql_is_guarded() {
        let sql = copy_migrations_sql("schema_migrations", "public", "acme");
        assert!(sql.contains("to_regclass('\"public\".\"schema_migrations\"') IS NOT NULL"));
        assert!(sql.contains("INSERT INTO \"acme\".\"schema_migrations\" SELECT * FROM \"public\".\"schema_migrations\""));
    }

    #[tokio::test]
    async fn test_forward_lines_streams_and_closes() {
        let input: &[u8] = b"CREATE TABLE public.a ();\n\xff\xfe raw\nCREATE TABLE public.b ();";
        let mut output = Vec::new();
        let r = SchemaRewriter::new("public", "acme");

        let lines = forward_lines(input, &mut output, &r).await.unwrap();
        assert_eq!(lines, 3);
        assert_eq!(
            output,
            b"CREATE TABLE acme.a ();\n\xff\xfe raw\nCREATE TABLE acme.b ();".to_vec()
        );
    }

    #[tokio::test]
    async fn test_pipe_reports_failures() {
        let r = SchemaRewriter::new("public", "acme");
        let ok = pipe(&ShellCommand::new("printf").arg("x\\n"), &ShellCommand::new("cat"), &r).await;
        assert_eq!(ok.unwrap(), 1);

        let dump_fails = ShellCommand::new("exit").arg("3");
        let err = pipe(&dump_fails, &ShellCommand::new("cat"), &r).await.unwrap_err();
        assert!(matches!(err, StrataError::CommandFailed { ref program, .. } if program == "exit"));

        let load_fails = ShellCommand::new("false");
        let err = pipe(&ShellCommand::new("printf").arg("x"), &load_fails, &r).await.unwrap_err();
        assert!(matches!(err, StrataError::CommandFailed { ref program, .. } if program == "false"));
    }

    #[cfg(unix)]
    mod with_fake_clients {
        use super::*;
        use crate::test_support::fake_client as script;
        use std::path::Path;

        fn config(dump: &Path, load: &Path) -> Arc<TenancyConfig> {
            Arc::new(
                TenancyConfig::default()
                    .with_suffix("_test")
                    .with_binaries(dump.to_string_lossy(), load.to_string_lossy()),
            )
        }

        #[tokio::test]
        async fn test_duplicate_streams_rewritten_dump() {
            let dir = tempfile::tempdir().unwrap();
            let out = dir.path().join("loaded.sql");
            let dump = script(
                dir.path(),
                "pg_dump",
                "printf 'CREATE SCHEMA public;\\nCREATE TABLE public.users (id int);\\n'",
            );
            let load = script(dir.path(), "psql", &format!("cat > '{}'", out.display()));

            let conn = MemoryConnection::new(&[]);
            let database = DatabaseConfig::new("app");
            let duplicator = Duplicator::new(&conn, config(&dump, &load), &database);

            let target = duplicator
                .duplicate("public", "acme", DuplicateOptions::default())
                .await
                .unwrap();

            assert_eq!(target, "acme_test");
            assert!(conn.schemas().contains(&"acme_test".to_string()));
            assert_eq!(
                std::fs::read_to_string(&out).unwrap(),
                "CREATE SCHEMA IF NOT EXISTS \"acme_test\";\nCREATE TABLE acme_test.users (id int);\n"
            );
            let executed = conn.executed();
            assert_eq!(executed.len(), 1);
            assert!(executed[0].contains("\"acme_test\".\"schema_migrations\""));
        }

        #[tokio::test]
        async fn test_duplicate_failing_dump_leaves_target() {
            let dir = tempfile::tempdir().unwrap();
            let dump = script(dir.path(), "pg_dump", "exit 3");
            let load = script(dir.path(), "psql", "cat > /dev/null");

            let conn = MemoryConnection::new(&[]);
            let database = DatabaseConfig::new("app");
            let duplicator = Duplicator::new(&conn, config(&dump, &load), &database);

            let err = duplicator
                .duplicate("public", "acme", DuplicateOptions::default())
                .await
                .unwrap_err();

            assert!(
                matches!(err, StrataError::CommandFailed { ref program, .. } if program.ends_with("pg_dump"))
            );
            assert!(conn.schemas().contains(&"acme_test".to_string()));
            assert!(conn.executed().is_empty());
        }

        #[tokio::test]
        async fn test_duplicate_with_data_skips_migrations_copy() {
            let dir = tempfile::tempdir().unwrap();
            let dump = script(dir.path(), "pg_dump", "printf ''");
            let load = script(dir.path(), "psql", "cat > /dev/null");

            let conn = MemoryConnection::new(&["acme_test"]);
            let database = DatabaseConfig::new("app");
            let duplicator = Duplicator::new(&conn, config(&dump, &load), &database);

            duplicator
                .duplicate("public", "acme", DuplicateOptions { structure_only: false })
                .await
                .unwrap();
            assert!(conn.executed().is_empty());
        }
    }
}
