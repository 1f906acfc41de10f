//! mssql-copydb CLI - copy a SQL Server database, schema and data, into a new database.

mod console;

use clap::error::ErrorKind;
use clap::Parser;
use console::ConsoleObserver;
use mssql_copydb::{
    connect, ddl, prepare_database, Config, CopyError, Copier, DatabaseSpec, LogObserver,
    MssqlConnector, MssqlSource, SchemaCatalog,
};
use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

const USAGE: &str = "\
Usage: mssql-copydb [options] <fromServer;fromDb[;user;password]> <toServer;toDb[;user;password]>

Copies every table of the source database, schema and data, into a newly
created destination database. The server is host or host,port (default port
1433). Without a password, integrated authentication is used. The password
is everything after the third ';' and may itself contain ';'.

Options:
  -f, /f                   Force overwriting: drop the destination database first
  -h, -?, /h, /?           Show this help
      --workers <N>        Parallel workers (default 4)
      --batch-size <N>     Rows per bulk load (default 10000)
      --notify-after <N>   Rows per progress dot (default 1000)
      --config <FILE>      YAML configuration file; options above override it
      --trust-server-cert  Accept the server certificate without validation
      --no-encrypt         Do not encrypt connections
      --dry-run            Print the DDL script for the source and exit
      --output-json        Print the run result as JSON
      --verbosity <LEVEL>  debug, info, warn or error (default info)
      --log-format <FMT>   text or json (default text)
  -V, --version            Print version";

#[derive(Parser, Debug)]
#[command(name = "mssql-copydb")]
#[command(about = "Copy a SQL Server database, schema and data, into a new database")]
#[command(version, disable_help_flag = true)]
struct Cli {
    /// Source database: server;database[;user;password]
    source: Option<String>,

    /// Destination database: server;database[;user;password]
    destination: Option<String>,

    /// Drop the destination database first if it exists
    #[arg(short = 'f')]
    force: bool,

    /// Show usage
    #[arg(short = 'h', long = "help")]
    help: bool,

    /// Parallel workers
    #[arg(long)]
    workers: Option<usize>,

    /// Rows per bulk load
    #[arg(long)]
    batch_size: Option<usize>,

    /// Rows per progress notification
    #[arg(long)]
    notify_after: Option<u64>,

    /// Path to YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Accept the server certificate without validation
    #[arg(long)]
    trust_server_cert: bool,

    /// Do not encrypt connections
    #[arg(long)]
    no_encrypt: bool,

    /// Print the DDL script for the source database and exit
    #[arg(long)]
    dry_run: bool,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    verbosity: String,

    /// Log format: text or json
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    log_format: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) if cli.help => return usage(),
        Ok(cli) if cli.source.is_none() && cli.config.is_none() => return usage(),
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::DisplayVersion => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let message = e.to_string();
            eprintln!("{}", message.lines().next().unwrap_or("invalid arguments"));
            return usage();
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            if matches!(e, CopyError::Argument(_)) {
                println!("{}", USAGE);
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn usage() -> ExitCode {
    println!("{}", USAGE);
    ExitCode::from(1)
}

/// Accept the slash-style switches alongside their dash forms.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("/f") | Some("/F") => OsString::from("-f"),
            Some("/h") | Some("/H") | Some("/?") | Some("-?") => OsString::from("-h"),
            _ => arg,
        })
        .collect()
}

async fn run(cli: Cli) -> Result<(), CopyError> {
    setup_logging(&cli.verbosity, &cli.log_format);

    let config = build_config(&cli)?;
    let (source, destination) = endpoints(&config)?;

    let cancel_token = setup_signal_handler()?;

    let started = Instant::now();
    let outcome = copy(&cli, config, source, destination, cancel_token).await;
    let elapsed = format!(
        "Elapsed time = {:.3} seconds",
        started.elapsed().as_secs_f64()
    );
    if cli.output_json {
        eprintln!("{}", elapsed);
    } else {
        println!("{}", elapsed);
    }
    outcome
}

/// Load the optional YAML file and apply command-line overrides.
fn build_config(cli: &Cli) -> Result<Config, CopyError> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path).map_err(|e| match e {
                CopyError::Io(e) => CopyError::Config(format!("{}: {}", path.display(), e)),
                CopyError::Yaml(e) => CopyError::Config(format!("{}: {}", path.display(), e)),
                other => other,
            })?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    if let Some(spec) = &cli.source {
        config.source = Some(spec.parse()?);
    }
    if let Some(spec) = &cli.destination {
        config.destination = Some(spec.parse()?);
    }
    if cli.force {
        config.force = true;
    }
    if let Some(workers) = cli.workers {
        config.copy.workers = workers;
    }
    if let Some(batch_size) = cli.batch_size {
        config.copy.batch_size = batch_size;
    }
    if let Some(notify_after) = cli.notify_after {
        config.copy.notify_after = notify_after;
    }
    if cli.trust_server_cert {
        config.connection.trust_server_cert = true;
    }
    if cli.no_encrypt {
        config.connection.encrypt = false;
    }

    config.validate()?;
    Ok(config)
}

fn endpoints(config: &Config) -> Result<(DatabaseSpec, DatabaseSpec), CopyError> {
    let source = config
        .source
        .clone()
        .ok_or_else(|| CopyError::Argument("source database is required".into()))?;
    let destination = config
        .destination
        .clone()
        .ok_or_else(|| CopyError::Argument("destination database is required".into()))?;
    Ok((source, destination))
}

async fn copy(
    cli: &Cli,
    config: Config,
    source: DatabaseSpec,
    destination: DatabaseSpec,
    cancel: CancellationToken,
) -> Result<(), CopyError> {
    info!("Loading schema from {}", source);
    let catalog = until_cancelled(&cancel, load_catalog(&source, &config)).await?;

    if cli.dry_run {
        print_script(&catalog);
        return Ok(());
    }

    info!("Preparing destination {}", destination);
    until_cancelled(
        &cancel,
        prepare_database(&destination, &config.connection, config.force),
    )
    .await?;

    let connector = MssqlConnector::new(source, destination, config.connection.clone());
    let mut copier = Copier::new(connector, config.copy.clone());
    copier = if cli.output_json {
        copier.with_observer(Arc::new(LogObserver))
    } else {
        copier.with_observer(Arc::new(ConsoleObserver))
    };

    let report = copier.execute(catalog, cancel).await;
    if cli.output_json {
        println!("{}", report.result.to_json()?);
    }
    report.into_result().map(|_| ())
}

async fn load_catalog(source: &DatabaseSpec, config: &Config) -> Result<SchemaCatalog, CopyError> {
    let client = connect(source, &config.connection).await?;
    MssqlSource::new(client).load_catalog().await
}

fn print_script(catalog: &SchemaCatalog) {
    for statement in ddl::script(catalog) {
        println!("{}", statement);
        println!("GO");
    }
}

/// Run `work` unless the token fires first.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, CopyError>>,
) -> Result<T, CopyError> {
    tokio::select! {
        result = work => result,
        _ = cancel.cancelled() => Err(CopyError::Cancelled),
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT (Ctrl-C) or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, CopyError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => eprintln!("\nReceived SIGINT. Stopping workers..."),
            _ = sigterm.recv() => eprintln!("\nReceived SIGTERM. Stopping workers..."),
        }
        token.cancel();
    });

    Ok(cancel_token)
}

/// Cancel the returned token on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, CopyError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping workers...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
