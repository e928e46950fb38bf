use crate::commands::{
    run_attach_resume, run_export, run_groups, run_jobs, run_search, AttachResumeArgs, ExportArgs,
    ListArgs, SearchArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use talent_pipeline::config::{parse_service_url, AppConfig};
use talent_pipeline::error::AppError;
use talent_pipeline::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "talent-pipeline",
    about = "Track sourcing jobs and curate candidate shortlists from the command line",
    version
)]
struct Cli {
    /// Override the configured base URL of the sourcing service
    #[arg(long, global = true)]
    sourcing_url: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Create a sourcing job and optionally follow it until it finishes
    Search(SearchArgs),
    /// List previous sourcing jobs, most recent first
    Jobs(ListArgs),
    /// Print saved candidates grouped by job title
    Groups(ListArgs),
    /// Write saved candidates as CSV
    Export(ExportArgs),
    /// Upload a resume for a saved candidate
    AttachResume(AttachResumeArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

fn load_config(sourcing_url: Option<String>) -> Result<AppConfig, AppError> {
    let mut config = AppConfig::load()?;
    if let Some(url) = sourcing_url {
        config.sourcing.base_url = parse_service_url("--sourcing-url", &url)?;
    }
    Ok(config)
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = load_config(cli.sourcing_url)?;
    telemetry::init(&config.telemetry)?;
    telemetry::log_startup(&config);

    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(config, args).await,
        Command::Search(args) => run_search(&config, args).await,
        Command::Jobs(args) => run_jobs(&config, args).await,
        Command::Groups(args) => run_groups(&config, args).await,
        Command::Export(args) => run_export(&config, args).await,
        Command::AttachResume(args) => run_attach_resume(&config, args).await,
    }
}
