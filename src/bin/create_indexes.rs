use belres::arango::ArangoClient;
use belres::conf::{load_dotenv, AppConfig, DEFAULT_CONFIG_FILE};
use belres::provision::{bel_index_plan, ensure_indexes, verify_indexes, BEL_DATABASE};
use belres::utils::o11y::build_subscriber;
use clap::Parser;
use std::error::Error;
use tracing::{error, info};

/// Create the sparse hash indexes of the BEL resource database
/// (tax_id on ortholog_nodes, namespace on equivalence_nodes).
/// Safe to run repeatedly: existing indexes are left untouched.
#[derive(Parser)]
struct Cli {
    /// Path to the configuration file with the server connection settings
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Only check that the indexes exist, do not create anything
    #[arg(long)]
    check: bool,
}

async fn run(args: Cli) -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_path(&args.config)?;
    let client = ArangoClient::connect(&config.arango).await?;
    let plan = bel_index_plan();

    if !args.check {
        let report = ensure_indexes(&client, BEL_DATABASE, &plan).await?;
        info!(
            "{} index(es) created, {} already present in {}",
            report.created_count(),
            report.existing_count(),
            report.database
        );
    }

    let missing = verify_indexes(&client, BEL_DATABASE, &plan).await?;
    if !missing.is_empty() {
        for target in &missing {
            error!("index {} missing on {}", target.spec, target.collection);
        }
        return Err(format!("{} index(es) missing in {}", missing.len(), BEL_DATABASE).into());
    }
    info!("all {} index(es) present in {}", plan.len(), BEL_DATABASE);

    Ok(())
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file before anything else
    load_dotenv();

    let args = Cli::parse();

    let subscriber = build_subscriber().expect("failed to build subscriber");
    tracing::subscriber::set_global_default(subscriber).expect("failed to install subscriber");

    if let Err(e) = run(args).await {
        error!("{}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            error!("caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}
