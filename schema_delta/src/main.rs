//! schema_delta command-line interface

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use schema_delta::utils::logging::init_logging;
use schema_delta::{config, DeployOptions, DeployOutcome, LoadMode, Orchestrator};

/// Delta deployments of a declarative data model
#[derive(Parser, Debug)]
#[command(name = "schema_delta")]
#[command(version, about = "Delta deployments of a declarative data model")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "schema_delta.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy the model to the default schema
    Deploy {
        /// Allow dropping tables that are no longer part of the model
        #[arg(long)]
        auto_undeploy: bool,

        /// Load data after deploying
        #[arg(long, value_enum)]
        load_via: Option<LoadMode>,

        /// Print the SQL instead of applying it
        #[arg(long)]
        dry: bool,
    },
    /// Drop the model's tables and views from the default schema
    Drop {
        /// Drop every object in the schema, not only the model's
        #[arg(long)]
        all: bool,
    },
    /// Load data into the default schema
    Load {
        #[arg(long, value_enum, default_value = "full")]
        via: LoadMode,
    },
    /// Show the differences between the default schema and the model
    Diff {
        /// Write the report to this file instead of stdout
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("{:#}", e);
        eprintln!("[schema_delta] - {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = config::load_from_file(&args.config)
        .with_context(|| format!("loading {}", args.config))?;
    init_logging(&config.logging)?;

    let orchestrator = Orchestrator::from_config(&config).await?;

    match args.command {
        Commands::Deploy {
            auto_undeploy,
            load_via,
            dry,
        } => {
            let options = DeployOptions {
                auto_undeploy: auto_undeploy || config.deploy.auto_undeploy,
                load_via,
                dry_run: dry,
            };
            match orchestrator.deploy(options).await? {
                DeployOutcome::DryRun { sql } => println!("{}", sql),
                DeployOutcome::Applied { .. } => {}
            }
        }
        Commands::Drop { all } => orchestrator.drop(all).await?,
        Commands::Load { via } => orchestrator.load(via).await?,
        Commands::Diff { file } => {
            if let Some(report) = orchestrator.diff(file).await? {
                println!("{}", report);
            }
        }
    }

    Ok(())
}
