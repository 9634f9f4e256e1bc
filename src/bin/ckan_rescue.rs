use std::fs::{self, File};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use ckan_rescue::app::{Mirror, RunReport};
use ckan_rescue::config::{ConfigLoader, MirrorConfig};
use ckan_rescue::domain::CatalogFormat;
use ckan_rescue::engine::CancelToken;
use ckan_rescue::http::PortalHttpClient;
use ckan_rescue::layout::OutputLayout;
use ckan_rescue::output::{ConsoleOutput, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "ckan-rescue")]
#[command(about = "Mirror the public files of an open-data portal to local disk")]
#[command(version)]
struct Cli {
    /// Catalog URL: a data.json document or a DCAT RDF file.
    url: String,

    /// JSON config file (defaults to ./ckan-rescue.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print the run report as JSON instead of progress lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Mirror the files listed in a data.json catalog")]
    DatajsonDownload(DownloadArgs),
    #[command(about = "Mirror the files listed in a DCAT RDF catalog")]
    DcatDownload(DcatArgs),
}

#[derive(Args, Clone)]
struct DownloadArgs {
    /// Output directory.
    #[arg(long)]
    output: Option<String>,

    /// Number of parallel download workers.
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Args, Clone)]
struct DcatArgs {
    #[command(flatten)]
    common: DownloadArgs,

    /// Mirror at most this many datasets from the graph.
    #[arg(long, conflicts_with = "no_dataset_limit")]
    dataset_limit: Option<usize>,

    /// Mirror every dataset in the graph.
    #[arg(long)]
    no_dataset_limit: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> miette::Result<RunReport> {
    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let (format, config) = match cli.command {
        Commands::DatajsonDownload(args) => {
            (CatalogFormat::DataJson, apply_overrides(config, &args))
        }
        Commands::DcatDownload(args) => {
            let mut config = apply_overrides(config, &args.common);
            if args.no_dataset_limit {
                config.dcat_dataset_limit = None;
            } else if let Some(limit) = args.dataset_limit {
                config.dcat_dataset_limit = Some(limit);
            }
            (CatalogFormat::Dcat, config)
        }
    };
    let config = config.validate()?;

    let client = PortalHttpClient::new(&config)?;
    let mirror = Mirror::new(client, config);
    init_logging(&mirror.layout(&cli.url)?)?;

    let cancel = CancelToken::new();
    let report = match output_mode {
        OutputMode::Console => mirror.run(format, &cli.url, &cancel, &ConsoleOutput)?,
        OutputMode::Json => {
            let report = mirror.run(format, &cli.url, &cancel, &JsonOutput)?;
            JsonOutput::print_report(&report).into_diagnostic()?;
            report
        }
    };
    Ok(report)
}

fn apply_overrides(mut config: MirrorConfig, args: &DownloadArgs) -> MirrorConfig {
    if let Some(output) = &args.output {
        config.output_dir = output.clone().into();
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    config
}

/// Routes `tracing` output to `<output>/<host>/logs.txt`, truncated per run.
fn init_logging(layout: &OutputLayout) -> miette::Result<()> {
    fs::create_dir_all(layout.base_dir()).into_diagnostic()?;
    let file = File::create(layout.logs_path()).into_diagnostic()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}
