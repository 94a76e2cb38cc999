use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gene_harvester::app::App;
use gene_harvester::config::ConfigLoader;
use gene_harvester::domain::SourceKind;
use gene_harvester::error::HarvestError;
use gene_harvester::output::{HumanOutput, JsonOutput};

#[derive(Parser)]
#[command(name = "gene-harvest")]
#[command(about = "Resumable harvester for gene interactions, gene metadata and gene pages")]
#[command(version, author)]
struct Cli {
    /// JSON config file (default: ./gene-harvest.json when present)
    #[arg(long)]
    config: Option<String>,

    /// Identifier list, overriding the configured one
    #[arg(long)]
    ids: Option<PathBuf>,

    /// Print run summaries as JSON
    #[arg(long)]
    json: bool,

    #[arg(value_enum)]
    target: Target,
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Interactions,
    Metadata,
    Pages,
    All,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::InvalidConfig(_)
        | HarvestError::MissingAccessKey(_)
        | HarvestError::EntitySource { .. }
        | HarvestError::MissingColumn(_) => 2,
        HarvestError::HttpClient(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = App::new(config)?;
    let identifiers = app.load_identifiers(cli.ids.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    let summaries = runtime.block_on(async {
        match cli.target {
            Target::Interactions => app.run(SourceKind::Interactions, identifiers).await.map(|s| vec![s]),
            Target::Metadata => app.run(SourceKind::Metadata, identifiers).await.map(|s| vec![s]),
            Target::Pages => app.run(SourceKind::Pages, identifiers).await.map(|s| vec![s]),
            Target::All => app.run_all(identifiers).await,
        }
    })?;

    if cli.json {
        JsonOutput::print_summaries(&summaries).into_diagnostic()?;
    } else {
        HumanOutput::print_summaries(&summaries).into_diagnostic()?;
    }
    Ok(())
}
