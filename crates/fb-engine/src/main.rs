use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use fb_config::FlowbinConfig;
use fb_runtime::lifecycle::{Engine, wait_for_signal};
use fb_runtime::tracing_init::init_tracing;

#[derive(Parser)]
#[command(name = "flowbin", about = "Flow record binning and aggregation engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the binning engine
    Run {
        /// Path to flowbin.toml config file
        #[arg(short, long)]
        config: PathBuf,
        /// Pace input by record timestamps instead of reading flat out
        #[arg(long)]
        replay: bool,
        /// Override replay speed multiple (e.g. "2.0", "0.5")
        #[arg(long)]
        rate: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            replay,
            rate,
        } => {
            let config_path = config
                .canonicalize()
                .map_err(|e| anyhow::anyhow!("config path '{}': {e}", config.display()))?;
            let mut flowbin_config = FlowbinConfig::load(&config_path)?;
            if replay {
                flowbin_config.input.replay = true;
            }
            if let Some(rate) = rate {
                let parsed: f64 = rate
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid --rate '{rate}': {e}"))?;
                if !(parsed.is_finite() && parsed > 0.0) {
                    anyhow::bail!("invalid --rate '{rate}': must be > 0");
                }
                flowbin_config.input.rate = parsed;
            }
            let input = flowbin_config.input.path.display().to_string();
            let output = flowbin_config.output.path.display().to_string();
            let base_dir = config_path
                .parent()
                .expect("config path must have a parent directory");

            let _guard = init_tracing(&flowbin_config.logging, base_dir)?;

            let engine = Engine::start(flowbin_config)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            tracing::info!(domain = "sys", input = %input, output = %output, "flowbin engine started");

            // A file input ends the run at EOF on its own; a signal only has
            // to cancel the reader early. Watch for it off to the side so
            // wait() can return in either case.
            tokio::spawn(wait_for_signal(engine.cancel_token()));
            engine.wait().await.map_err(|e| anyhow::anyhow!("{e}"))?;
            tracing::info!(domain = "sys", "flowbin engine stopped");
        }
    }

    Ok(())
}
