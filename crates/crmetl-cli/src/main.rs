use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crmetl_pipeline::config::{PipelineConfig, CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};
use crmetl_pipeline::EtlPipeline;
use tracing::{error, info};

mod logging;

#[derive(Debug, Parser)]
#[command(name = "crmetl")]
#[command(about = "Clean CRM exports and load them into SQLite")]
struct Cli {
    /// YAML config naming the input files, database and log file.
    #[arg(long, env = CONFIG_ENV_VAR, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract, clean and persist all four tables.
    Run {
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Create the tables in the configured database without loading data.
    InitSchema,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match PipelineConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            logging::init_stderr_logging();
            error!("critical: {err}");
            return Ok(());
        }
    };
    let _guard = match logging::init_logging(&config.log_paths.log_file) {
        Ok(guard) => Some(guard),
        Err(err) => {
            logging::init_stderr_logging();
            error!("failed to open log file, logging to stderr only: {err:#}");
            None
        }
    };
    info!(config = %cli.config.display(), "configuration loaded");

    let pipeline = EtlPipeline::new(config);
    let command = cli.command.unwrap_or(Commands::Run { json: false });
    if let Err(err) = execute(&pipeline, command).await {
        error!("critical: ETL pipeline failed: {err:#}");
    }
    Ok(())
}

async fn execute(pipeline: &EtlPipeline, command: Commands) -> Result<()> {
    match command {
        Commands::Run { json } => {
            let summary = pipeline.run_once().await.context("running ETL pipeline")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "etl complete: run_id={} extracted={} persisted={} dropped={} remapped={} phones_discarded={}",
                    summary.run_id,
                    summary.extracted.total(),
                    summary.persisted.total(),
                    summary.dropped_rows,
                    summary.remapped_contact_ids,
                    summary.discarded_phones
                );
            }
        }
        Commands::InitSchema => {
            pipeline.init_schema().await.context("creating schema")?;
            println!(
                "schema ready: {}",
                pipeline.config().database_path.database_name.display()
            );
        }
    }
    Ok(())
}
