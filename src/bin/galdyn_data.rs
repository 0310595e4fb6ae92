use std::fs::File;
use std::io::{self, BufWriter};
use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use galdyn_data::app::{App, ProgressSink};
use galdyn_data::arxiv::{ColumnConverter, TableOptions};
use galdyn_data::cache::CacheLayout;
use galdyn_data::config::{ConfigLoader, ResolvedConfig};
use galdyn_data::domain::{Eprint, OutputFormat, TransportKind};
use galdyn_data::error::GaldynError;
use galdyn_data::fetch::FetchOptions;
use galdyn_data::output::{CsvOutput, JsonOutput, OutputMode};
use galdyn_data::status::StatusLine;
use galdyn_data::transport::SystemTransports;

#[derive(Parser)]
#[command(name = "galdyn-data")]
#[command(about = "Fetch and parse galactic-dynamics reference data (arXiv tables, Harris catalog)")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    cache_dir: Option<Utf8PathBuf>,

    /// Use this transport for every download.
    #[arg(long, global = true)]
    transport: Option<TransportKind>,

    /// Connect/read timeout in seconds handed to the transport.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download (if needed) and print the Harris globular cluster catalog")]
    Catalog(CatalogArgs),
    #[command(about = "Work with arXiv e-print sources")]
    Arxiv(ArxivArgs),
    #[command(about = "Check that a remote file exists without downloading it")]
    Probe(ProbeArgs),
}

#[derive(Args)]
struct CatalogArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    #[arg(long)]
    output: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct ArxivArgs {
    #[command(subcommand)]
    command: ArxivCommand,
}

#[derive(Subcommand)]
enum ArxivCommand {
    #[command(about = "Download and unpack the source of an e-print")]
    Fetch { eprint: String },
    #[command(about = "Read a LaTeX table from an e-print's source")]
    Table(TableArgs),
}

#[derive(Args)]
struct TableArgs {
    eprint: String,

    /// File inside the unpacked source that holds the table body.
    file: String,

    #[arg(long, value_delimiter = ',')]
    names: Option<Vec<String>>,

    #[arg(long, default_value_t = 0)]
    skip_header: usize,

    #[arg(long, default_value_t = 0)]
    skip_footer: usize,

    #[arg(long = "na")]
    na_values: Vec<String>,

    /// `column=non-decimal` or `column=multicolumn`.
    #[arg(long = "convert")]
    converters: Vec<ColumnConverter>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Args)]
struct ProbeArgs {
    url: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<GaldynError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GaldynError) -> u8 {
    match error {
        GaldynError::ResourceNotFound(_) => 2,
        GaldynError::Transport { .. }
        | GaldynError::InterruptedTransfer(_)
        | GaldynError::MissingTool(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = resolve_config(&cli)?;
    let options = FetchOptions {
        probe: false,
        quiet: config.quiet,
    };
    let transports = SystemTransports::new(&config)?;
    let probe_transport = config.transport.unwrap_or(TransportKind::Wget);
    let app = App::new(config.cache.clone(), transports, options);

    let status_line = StatusLine::new();
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &status_line,
        OutputMode::NonInteractive => &JsonOutput,
    };

    match cli.command {
        Commands::Catalog(args) => {
            let table = app.read_catalog(sink)?;
            match (args.format, args.output) {
                (OutputFormat::Json, None) => Ok(JsonOutput::print(&table)?),
                (OutputFormat::Json, Some(path)) => {
                    let mut writer = create_output(&path)?;
                    Ok(JsonOutput::write(&table, &mut writer)?)
                }
                (OutputFormat::Csv, None) => {
                    Ok(CsvOutput::write_catalog(&table, io::stdout().lock())?)
                }
                (OutputFormat::Csv, Some(path)) => {
                    Ok(CsvOutput::write_catalog(&table, create_output(&path)?)?)
                }
            }
        }
        Commands::Arxiv(ArxivArgs {
            command: ArxivCommand::Fetch { eprint },
        }) => {
            let eprint = eprint.parse::<Eprint>()?;
            let item = app.download_arxiv_source(&eprint, sink)?;
            Ok(JsonOutput::print(&item)?)
        }
        Commands::Arxiv(ArxivArgs {
            command: ArxivCommand::Table(args),
        }) => {
            let eprint = args.eprint.parse::<Eprint>()?;
            let options = TableOptions {
                names: args.names,
                skip_header: args.skip_header,
                skip_footer: args.skip_footer,
                na_values: args.na_values,
                converters: args.converters,
            };
            let table = app.read_arxiv_table(&eprint, &args.file, &options, sink)?;
            match args.format {
                OutputFormat::Json => Ok(JsonOutput::print(&table)?),
                OutputFormat::Csv => {
                    Ok(CsvOutput::write_latex(&table, io::stdout().lock())?)
                }
            }
        }
        Commands::Probe(args) => {
            let item = app.probe(&args.url, probe_transport, sink)?;
            Ok(JsonOutput::print(&item)?)
        }
    }
}

fn resolve_config(cli: &Cli) -> miette::Result<ResolvedConfig> {
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(dir) = &cli.cache_dir {
        config.cache = CacheLayout::with_root(dir.clone());
    }
    if let Some(kind) = cli.transport {
        config.transport = Some(kind);
    }
    if let Some(secs) = cli.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if cli.verbose {
        config.quiet = false;
    }
    Ok(config)
}

fn create_output(path: &Utf8PathBuf) -> miette::Result<BufWriter<File>> {
    File::create(path.as_std_path())
        .map(BufWriter::new)
        .map_err(|err| GaldynError::Output(format!("create {path}: {err}")).into())
}
