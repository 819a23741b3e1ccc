mod hello_substrate;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use msi_host::{Substrate, SubstrateConfig, bootstrap_substrate};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "msi-smoke", version, about = "Run substrate demos")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the Scout perception/memory/attention demo
    Hello(HelloArgs),
    /// Print the substrate capability descriptor as JSON
    Caps,
}

#[derive(clap::Args, Debug, Clone)]
pub struct HelloArgs {
    /// Domain manifest (JSON); defaults to the built-in Scout manifest
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Number of simulated sensor events
    #[arg(long, default_value_t = 10)]
    events: usize,
    /// Delay between sensor events in milliseconds
    #[arg(long, default_value_t = 50)]
    interval_ms: u64,
}

#[tokio::main]
async fn main() {
    setup_logging();
    if let Err(err) = run_cli().await {
        eprintln!("error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        process::exit(1);
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = SubstrateConfig::from_env().context("read MSI_* environment")?;
    let msi = Substrate::new(config).context("create substrate")?;
    match cli.command {
        Some(Commands::Hello(args)) => {
            let report = hello_substrate::run(&msi, &args).await?;
            println!("[DONE] {report}");
            Ok(())
        }
        Some(Commands::Caps) => {
            let caps = bootstrap_substrate(&msi).await?;
            println!("{}", serde_json::to_string_pretty(&caps)?);
            Ok(())
        }
        None => {
            println!("Commands:");
            println!("  hello  Scout perception/memory/attention demo");
            println!("  caps   Print the capability descriptor");
            Ok(())
        }
    }
}
