//! Command-line front end for moving data between ClickHouse and flat files.
//!
//! Every subcommand drives a [`TransferSession`] through the same steps an
//! operator would take: test the connection, pick a database and table,
//! adjust the selection or mapping, then execute. The transfer itself is
//! performed by the transfer service at `--backend-url`.
//!
//! # Security
//! - The credential is read from the environment or a prompt, never echoed
//! - Connection details are logged without user or credential

use anyhow::{Context, bail};
use chbridge_core::backend::{BackendConfig, HttpBackend, TransferBackend};
use chbridge_core::connection::{ConnectionDescriptor, DEFAULT_PORT};
use chbridge_core::executor::DirectorySink;
use chbridge_core::init_logging;
use chbridge_core::models::{
    Delimiter, ExportFormat, FilePayload, SchemaDescription, TransferDirection,
};
use chbridge_core::schema_cache::Fetch;
use chbridge_core::security::Credential;
use chbridge_core::status::{StatusPhase, StatusRecord};
use chbridge_core::workflow::{Action, TransferSession, Workflow, WorkflowSnapshot};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "chbridge")]
#[command(about = "Move tables between ClickHouse and CSV/TSV/JSON files")]
#[command(version)]
#[command(long_about = "
chbridge - ClickHouse to flat file transfers

Exports a ClickHouse table (or a subset of its columns) to CSV, TSV or JSON,
and imports a delimited file into a ClickHouse table with an optional column
mapping. Transfers run through the chbridge transfer service.

EXAMPLES:
  chbridge databases
  chbridge --database analytics tables
  chbridge --database analytics export events --columns id,name --format tsv
  chbridge --database staging import --file users.csv --table users --map full_name=name
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub server: ServerArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(
        short,
        long,
        global = true,
        help = "Suppress all output except errors"
    )]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ServerArgs {
    /// Transfer service base URL
    #[arg(
        long,
        env = "CHBRIDGE_BACKEND_URL",
        default_value = chbridge_core::backend::config::DEFAULT_BASE_URL,
        help = "Base URL of the transfer service"
    )]
    pub backend_url: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "300", help = "Per-request timeout in seconds")]
    pub timeout: u64,

    /// ClickHouse host
    #[arg(long, env = "CHBRIDGE_HOST", default_value = "localhost")]
    pub host: String,

    /// ClickHouse port
    #[arg(long, env = "CHBRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// ClickHouse user
    #[arg(long, env = "CHBRIDGE_USER", default_value = "default")]
    pub user: String,

    /// Password or JWT token
    #[arg(
        long,
        env = "CHBRIDGE_PASSWORD",
        hide_env_values = true,
        help = "Password or JWT token (prefer the environment over the command line)"
    )]
    pub password: Option<String>,

    /// Prompt for the password
    #[arg(long, conflicts_with = "password", help = "Prompt for the password or token")]
    pub ask_password: bool,

    /// Database to work in
    #[arg(long, env = "CHBRIDGE_DATABASE")]
    pub database: Option<String>,

    /// Connect over TLS
    #[arg(long, help = "Connect to ClickHouse over TLS")]
    pub secure: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Test the ClickHouse connection
    Test,
    /// List databases on the server
    Databases,
    /// List tables in the selected database
    Tables,
    /// Show the columns of a table
    Describe(DescribeArgs),
    /// Export a table to a file
    Export(ExportArgs),
    /// Import a delimited file into a table
    Import(ImportArgs),
}

#[derive(Args)]
pub struct DescribeArgs {
    /// Table to describe
    pub table: String,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Table to export
    pub table: String,

    /// Columns to export, in any order; defaults to every column
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Output format
    #[arg(long, default_value = "csv", help = "Output format (csv, tsv, json)")]
    pub format: ExportFormat,

    /// Output file name; defaults to `<table>_<date>.<ext>`
    #[arg(long)]
    pub filename: Option<String>,

    /// Omit the header row
    #[arg(long)]
    pub no_headers: bool,

    /// Directory the export is written to
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
}

#[derive(Args)]
pub struct ImportArgs {
    /// File to import
    #[arg(long)]
    pub file: PathBuf,

    /// Field delimiter (comma, tab, semicolon, pipe)
    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    pub delimiter: Delimiter,

    /// Target table
    #[arg(long)]
    pub table: String,

    /// Fail instead of creating a missing table
    #[arg(long)]
    pub no_create_table: bool,

    /// Rename a column (`from=to`); `from=` skips the column
    #[arg(long = "map", value_parser = parse_mapping)]
    pub mappings: Vec<(String, String)>,

    /// Show the analyzed file and mapping without importing
    #[arg(long)]
    pub preview: bool,
}

/// Parses a delimiter name or literal separator.
fn parse_delimiter(value: &str) -> Result<Delimiter, String> {
    value.parse().map_err(|_| {
        let options: Vec<&str> = Delimiter::ALL.into_iter().map(Delimiter::label).collect();
        format!(
            "unsupported delimiter {value:?}, expected one of: {}",
            options.join(", ")
        )
    })
}

/// Parses a `from=to` column mapping.
fn parse_mapping(value: &str) -> Result<(String, String), String> {
    let (source, target) = value
        .split_once('=')
        .ok_or_else(|| format!("expected from=to, got {value:?}"))?;
    let source = source.trim();
    if source.is_empty() {
        return Err(format!("missing source column in {value:?}"));
    }
    Ok((source.to_string(), target.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    let connection = connection_from(&cli.server)?;
    let config = BackendConfig::new(cli.server.backend_url.clone())
        .with_request_timeout(Duration::from_secs(cli.server.timeout));
    info!("Transfer service: {}", config);
    let backend: Arc<dyn TransferBackend> = Arc::new(HttpBackend::new(config)?);

    let out_dir = match &cli.command {
        Command::Export(args) => args.out_dir.clone(),
        _ => PathBuf::from("."),
    };
    let sink = Arc::new(DirectorySink::new(out_dir));
    if matches!(cli.command, Command::Export(_)) {
        info!("Exports are written to {}", sink.dir().display());
    }
    let mut session =
        TransferSession::with_workflow(Workflow::with_connection(connection), backend, sink);

    match &cli.command {
        Command::Test => {
            connect(&mut session).await?;
            println!("Connection successful");
        }
        Command::Databases => {
            connect(&mut session).await?;
            let databases = ready(session.snapshot().cache.databases(), "databases")?;
            print_lines(&databases);
        }
        Command::Tables => {
            connect(&mut session).await?;
            let tables = open_database(&mut session, &cli.server).await?;
            print_lines(&tables);
        }
        Command::Describe(args) => {
            connect(&mut session).await?;
            open_database(&mut session, &cli.server).await?;
            open_table(&mut session, &args.table).await?;
            let snapshot = session.snapshot();
            let Some(schema) = snapshot.schema() else {
                bail!("No table schema available");
            };
            print!("{}", render_table_schema(schema));
        }
        Command::Export(args) => export(&mut session, &cli.server, args).await?,
        Command::Import(args) => import(&mut session, &cli.server, args).await?,
    }

    Ok(())
}

/// Builds the connection descriptor, prompting for a password if asked.
fn connection_from(server: &ServerArgs) -> anyhow::Result<ConnectionDescriptor> {
    let secret = if server.ask_password {
        rpassword::prompt_password("ClickHouse password: ")
            .context("Failed to read password")?
    } else {
        server.password.clone().unwrap_or_default()
    };

    let connection = ConnectionDescriptor::new(server.host.clone())
        .with_port(server.port)
        .with_user(server.user.clone())
        .with_credential(Credential::new(secret))
        .with_secure_channel(server.secure);
    connection.validate()?;
    Ok(connection)
}

/// Tests the connection and waits for the database list.
async fn connect(session: &mut TransferSession) -> anyhow::Result<()> {
    session.dispatch(Action::TestConnection)?;
    session.settle().await;
    succeeded(&session.snapshot().status.connection)?;
    debug!("Connected to {}", session.snapshot().connection);
    Ok(())
}

/// Selects the `--database` database and returns its tables.
async fn open_database(
    session: &mut TransferSession,
    server: &ServerArgs,
) -> anyhow::Result<Vec<String>> {
    let Some(database) = server.database.clone() else {
        bail!("--database (or CHBRIDGE_DATABASE) is required");
    };
    session.dispatch(Action::SelectDatabase(Some(database)))?;
    session.settle().await;
    ready(session.snapshot().cache.tables(), "tables")
}

/// Selects a table and waits for its schema.
async fn open_table(session: &mut TransferSession, table: &str) -> anyhow::Result<()> {
    let snapshot = session.snapshot();
    if !snapshot.tables().is_some_and(|tables| tables.iter().any(|t| t == table)) {
        let database = snapshot.connection.database.as_deref().unwrap_or("default");
        bail!("Table {table:?} not found in database {database:?}");
    }

    session.dispatch(Action::SelectTable(Some(table.to_string())))?;
    session.settle().await;
    ready(session.snapshot().cache.schema(), "table schema")?;
    Ok(())
}

async fn export(
    session: &mut TransferSession,
    server: &ServerArgs,
    args: &ExportArgs,
) -> anyhow::Result<()> {
    connect(session).await?;
    open_database(session, server).await?;
    open_table(session, &args.table).await?;

    if !args.columns.is_empty() {
        // A fresh schema starts fully selected; clear it and pick the requested columns
        session.dispatch(Action::ToggleAllColumns)?;
        for column in &args.columns {
            session
                .dispatch(Action::ToggleColumn(column.trim().to_string()))
                .with_context(|| format!("Unknown column {column:?}"))?;
        }
    }

    session.dispatch(Action::SetExportFormat(args.format))?;
    session.dispatch(Action::SetIncludeHeaders(!args.no_headers))?;
    if let Some(filename) = &args.filename {
        session.dispatch(Action::SetExportFilename(filename.clone()))?;
    }

    execute(session).await
}

async fn import(
    session: &mut TransferSession,
    server: &ServerArgs,
    args: &ImportArgs,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    session.dispatch(Action::SetDirection(TransferDirection::FileToDatabase))?;
    connect(session).await?;
    session.dispatch(Action::SelectDatabase(server.database.clone()))?;
    session.dispatch(Action::SetDelimiter(args.delimiter))?;
    session.dispatch(Action::LoadFile(FilePayload::new(name, bytes)))?;
    session.settle().await;
    ready(session.snapshot().cache.schema(), "file schema")?;

    for (source, target) in &args.mappings {
        session
            .dispatch(Action::SetMappingTarget {
                source: source.clone(),
                target: target.clone(),
            })
            .with_context(|| format!("Cannot map {source:?}"))?;
    }
    session.dispatch(Action::SetTargetTable(args.table.clone()))?;
    session.dispatch(Action::SetCreateTable(!args.no_create_table))?;

    if let Some(preview) = render_file_preview(&session.snapshot()) {
        print!("{preview}");
    }
    if args.preview {
        return Ok(());
    }

    execute(session).await
}

/// Executes the transfer and reports its outcome.
async fn execute(session: &mut TransferSession) -> anyhow::Result<()> {
    let snapshot = session.snapshot();
    let blockers = snapshot.blockers();
    if !blockers.is_empty() {
        bail!("Cannot execute: {}", blockers.join(", "));
    }

    session.dispatch(Action::Execute)?;
    session.settle().await;

    let status = session.snapshot().status.transfer.clone();
    succeeded(&status)?;
    println!("{}", status.message);
    Ok(())
}

fn succeeded(status: &StatusRecord) -> anyhow::Result<()> {
    match status.phase {
        StatusPhase::Success => Ok(()),
        StatusPhase::Error => bail!("{}", status.message),
        phase => bail!("Unexpected status {phase:?}: {}", status.message),
    }
}

fn ready<T: Clone>(slot: &Fetch<T>, what: &str) -> anyhow::Result<T> {
    match slot {
        Fetch::Ready(value) => Ok(value.clone()),
        Fetch::Failed(message) => bail!("{message}"),
        Fetch::Idle | Fetch::Loading => bail!("No {what} available"),
    }
}

fn print_lines(items: &[String]) {
    for item in items {
        println!("{item}");
    }
}

/// Renders a cell without JSON quoting for plain strings.
fn render_cell(cell: &serde_json::Value) -> String {
    cell.as_str()
        .map_or_else(|| cell.to_string(), ToString::to_string)
}

fn render_sample_rows(schema: &SchemaDescription) -> String {
    let rows = schema.sample_rows();
    if rows.is_empty() {
        return String::new();
    }

    let mut out = format!("\nSample rows: {}\n", rows.len());
    for row in rows {
        let cells: Vec<String> = row.iter().map(render_cell).collect();
        out.push_str(&format!("  {}\n", cells.join(" | ")));
    }
    out
}

/// One line per table column, then the sample rows.
fn render_table_schema(schema: &SchemaDescription) -> String {
    let mut out = String::new();
    for column in schema.columns() {
        out.push_str(column);
        out.push('\n');
    }
    out.push_str(&render_sample_rows(schema));
    out
}

/// The analyzed file: each column with its inferred type and mapped
/// target, then the sample rows. `None` until the file schema is ready.
fn render_file_preview(snapshot: &WorkflowSnapshot) -> Option<String> {
    let file = snapshot.import.file.as_ref()?;
    let schema = snapshot.schema()?;
    let mapping = snapshot.mapping.mapping();

    let width = schema.columns().iter().map(String::len).max().unwrap_or(0);
    let mut out = format!(
        "File: {} ({})\n",
        file.payload.name,
        snapshot.import.delimiter.label()
    );
    for column in schema.columns() {
        let target = match mapping.target(column) {
            Some(target) if !target.trim().is_empty() => format!("-> {target}"),
            _ => "(skipped)".to_string(),
        };
        out.push_str(&format!(
            "  {column:<width$}  {:<10}  {target}\n",
            schema.inferred_type(column)
        ));
    }
    out.push_str(&render_sample_rows(schema));
    Some(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chbridge_core::workflow::{Completion, Effect};
    use clap::CommandFactory;
    use std::collections::HashMap;

    /// Every env-backed server flag, so exported `CHBRIDGE_*` variables
    /// cannot leak into parsing.
    const SERVER_FLAGS: [&str; 12] = [
        "--backend-url",
        "http://transfer.test/",
        "--host",
        "ch.internal",
        "--port",
        "9440",
        "--user",
        "analyst",
        "--password",
        "secret",
        "--database",
        "analytics",
    ];

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        let argv = std::iter::once("chbridge")
            .chain(SERVER_FLAGS)
            .chain(args.iter().copied());
        Cli::try_parse_from(argv)
    }

    fn users_schema() -> SchemaDescription {
        SchemaDescription::new(
            vec!["id".to_string(), "full_name".to_string(), "email".to_string()],
            vec![vec![
                serde_json::Value::from(1),
                serde_json::Value::from("Ada"),
                serde_json::Value::Null,
            ]],
            HashMap::from([("id".to_string(), "Int64".to_string())]),
        )
        .unwrap()
    }

    /// Import workflow with `users.csv` analyzed and `email` skipped.
    fn analyzed_import() -> Workflow {
        let mut workflow = Workflow::new();
        workflow
            .handle(Action::SetDirection(TransferDirection::FileToDatabase))
            .unwrap();
        workflow
            .handle(Action::SetDelimiter(Delimiter::Semicolon))
            .unwrap();
        let effects = workflow
            .handle(Action::LoadFile(FilePayload::new(
                "users.csv",
                b"id;full_name;email\n".to_vec(),
            )))
            .unwrap();
        let [Effect::DescribeFile { key, .. }] = effects.as_slice() else {
            unreachable!("expected one file description");
        };
        workflow.complete(Completion::FileDescribed {
            key: *key,
            result: Ok(users_schema()),
        });
        workflow
            .handle(Action::SetMappingTarget {
                source: "full_name".to_string(),
                target: "name".to_string(),
            })
            .unwrap();
        workflow
            .handle(Action::SetMappingTarget {
                source: "email".to_string(),
                target: String::new(),
            })
            .unwrap();
        workflow
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_export_args() {
        let cli = parse(&[
            "export",
            "events",
            "--columns",
            "id,name",
            "--format",
            "tsv",
            "--no-headers",
        ])
        .unwrap();

        assert_eq!(cli.server.database.as_deref(), Some("analytics"));
        let Command::Export(args) = cli.command else {
            unreachable!("expected export");
        };
        assert_eq!(args.table, "events");
        assert_eq!(args.columns, vec!["id", "name"]);
        assert_eq!(args.format, ExportFormat::Tsv);
        assert!(args.no_headers);
        assert_eq!(args.out_dir, PathBuf::from("."));
    }

    #[test]
    fn test_cli_import_args() {
        let cli = parse(&[
            "import",
            "--file",
            "users.csv",
            "--table",
            "users",
            "--delimiter",
            "semicolon",
            "--map",
            "full_name=name",
            "--map",
            "email=",
            "--preview",
        ])
        .unwrap();

        let Command::Import(args) = cli.command else {
            unreachable!("expected import");
        };
        assert_eq!(args.delimiter, Delimiter::Semicolon);
        assert!(!args.no_create_table);
        assert!(args.preview);
        assert_eq!(
            args.mappings,
            vec![
                ("full_name".to_string(), "name".to_string()),
                ("email".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_args_reject_bad_values() {
        assert!(parse(&["export", "t", "--format", "xml"]).is_err());
        assert!(parse(&["import", "--file", "f", "--table", "t", "--map", "=x"]).is_err());
        assert!(parse(&["--ask-password", "test"]).is_err());
    }

    #[test]
    fn test_args_parse_mapping() {
        assert_eq!(
            parse_mapping(" a = b ").unwrap(),
            ("a".to_string(), "b".to_string())
        );
        assert!(parse_mapping("no-separator").is_err());
    }

    #[test]
    fn test_args_parse_delimiter_lists_options() {
        assert_eq!(parse_delimiter("|").unwrap(), Delimiter::Pipe);

        let message = parse_delimiter("#").unwrap_err();
        for delimiter in Delimiter::ALL {
            assert!(message.contains(delimiter.label()), "{message}");
        }
    }

    #[test]
    fn test_cli_connection_from_args() {
        let cli = parse(&["--secure", "test"]).unwrap();
        let connection = connection_from(&cli.server).unwrap();

        assert_eq!(connection.host, "ch.internal");
        assert_eq!(connection.port, 9440);
        assert_eq!(connection.user, "analyst");
        assert_eq!(connection.credential.expose(), "secret");
        assert!(connection.secure);
        assert_eq!(connection.to_string(), "ch.internal:9440 (tls)");
    }

    #[test]
    fn test_cli_file_preview_shows_types_and_targets() {
        let workflow = analyzed_import();
        let preview = render_file_preview(&workflow.snapshot()).unwrap();
        let lines: Vec<&str> = preview.lines().collect();

        assert_eq!(lines[0], "File: users.csv (Semicolon (;))");
        assert!(lines[1].contains("id") && lines[1].contains("Int64") && lines[1].ends_with("-> id"));
        // No inferred type falls back to String
        assert!(lines[2].contains("String") && lines[2].ends_with("-> name"));
        assert!(lines[3].contains("email") && lines[3].ends_with("(skipped)"));
        assert!(preview.contains("Sample rows: 1"));
        assert!(preview.contains("  1 | Ada | null"));
    }

    #[test]
    fn test_cli_file_preview_needs_schema() {
        let mut workflow = Workflow::new();
        workflow
            .handle(Action::SetDirection(TransferDirection::FileToDatabase))
            .unwrap();
        workflow
            .handle(Action::LoadFile(FilePayload::new("users.csv", b"a\n".to_vec())))
            .unwrap();

        assert!(render_file_preview(&workflow.snapshot()).is_none());
    }

    #[test]
    fn test_cli_table_schema_rendering() {
        let rendered = render_table_schema(&users_schema());
        assert!(rendered.starts_with("id\nfull_name\nemail\n"));
        assert!(rendered.ends_with("Sample rows: 1\n  1 | Ada | null\n"));
    }
}
