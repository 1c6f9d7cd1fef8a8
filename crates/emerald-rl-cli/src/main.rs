//! Emerald-RL trainer
//!
//! Connects to the mGBA Lua bridge script, loads the persisted value table
//! and runs Q-learning episodes until Ctrl-C:
//! - Step logs land in `--log-dir`
//! - The table is overwritten at `--table-path` after every episode
//! - A tabular snapshot is exported to `--snapshot-dir` per episode

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use emerald_rl_agent::{
    EpisodeController, EpsilonGreedyPolicy, Policy, RandomPolicy, TrainerConfig, ValueTable,
};
use mgba_bridge::{MgbaClient, MgbaConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    /// Tabular Q-learning with decaying exploration
    EpsilonGreedy,
    /// Uniform random baseline; never learns
    Random,
}

#[derive(Debug, Parser)]
#[command(
    name = "emerald-rl",
    about = "Q-learning agent for Pokemon Emerald running in mGBA",
    version
)]
struct Args {
    /// JSON config file; flags below override its fields
    #[arg(long, env = "EMERALD_RL_CONFIG")]
    config: Option<PathBuf>,

    /// Host running the mGBA bridge script
    #[arg(long, env = "EMERALD_RL_HOST")]
    host: Option<String>,

    /// Port the bridge script listens on
    #[arg(long, env = "EMERALD_RL_PORT")]
    port: Option<u16>,

    /// Value table loaded at startup and saved after each episode
    #[arg(long, env = "EMERALD_RL_TABLE_PATH")]
    table_path: Option<PathBuf>,

    /// Directory for per-episode step logs
    #[arg(long, env = "EMERALD_RL_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Directory for per-episode tabular snapshots
    #[arg(long, env = "EMERALD_RL_SNAPSHOT_DIR")]
    snapshot_dir: Option<PathBuf>,

    /// Action selection strategy
    #[arg(long, value_enum, default_value_t = PolicyArg::EpsilonGreedy, env = "EMERALD_RL_POLICY")]
    policy: PolicyArg,

    /// Seed for reproducible exploration
    #[arg(long, env = "EMERALD_RL_SEED")]
    seed: Option<u64>,

    /// Starting exploration rate
    #[arg(long, env = "EMERALD_RL_EPSILON")]
    epsilon: Option<f64>,

    /// Truncate episodes after this many learned steps
    #[arg(long, env = "EMERALD_RL_MAX_STEPS_PER_EPISODE")]
    max_steps_per_episode: Option<u64>,

    /// Consecutive error observations tolerated before aborting (0 = unlimited)
    #[arg(long, env = "EMERALD_RL_MAX_CONSECUTIVE_ERRORS")]
    max_consecutive_errors: Option<u32>,
}

/// Everything the binary reads from `--config`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AppConfig {
    trainer: TrainerConfig,
    mgba: MgbaConfig,
}

impl AppConfig {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Flags win over the file
    fn apply(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.mgba.host = host.clone();
        }
        if let Some(port) = args.port {
            self.mgba.port = port;
        }
        if let Some(path) = &args.table_path {
            self.trainer.table_path = path.clone();
        }
        if let Some(dir) = &args.log_dir {
            self.trainer.log_dir = dir.clone();
        }
        if let Some(dir) = &args.snapshot_dir {
            self.trainer.snapshot_dir = dir.clone();
        }
        if args.seed.is_some() {
            self.trainer.learning.seed = args.seed;
        }
        if let Some(epsilon) = args.epsilon {
            self.trainer.learning.epsilon = epsilon;
        }
        if args.max_steps_per_episode.is_some() {
            self.trainer.max_steps_per_episode = args.max_steps_per_episode;
        }
        if let Some(limit) = args.max_consecutive_errors {
            self.trainer.max_consecutive_errors = limit;
        }
    }
}

fn create_output_dirs(config: &TrainerConfig) -> Result<()> {
    let table_dir = config.table_path.parent().filter(|p| !p.as_os_str().is_empty());
    for dir in table_dir
        .into_iter()
        .chain([config.snapshot_dir.as_path(), config.log_dir.as_path()])
    {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    Ok(())
}

/// Drive episodes with a chosen policy until cancelled
async fn run_with_policy<P: Policy>(
    config: TrainerConfig,
    policy: P,
    client: &mut MgbaClient,
    cancel: watch::Receiver<bool>,
) -> Result<()> {
    let mut controller = EpisodeController::new(config, policy);
    let summary = controller.run(client, cancel).await?;
    info!(
        "Finished: {} episodes, {} steps, epsilon {:.4}",
        summary.episodes_completed, summary.total_steps, summary.final_epsilon
    );
    if summary.persistence_failures > 0 {
        warn!(
            "{} save/export/log writes failed during the run",
            summary.persistence_failures
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.apply(&args);
    config
        .trainer
        .learning
        .validate()
        .context("invalid learning parameters")?;

    info!("Emerald-RL starting ({:?} policy)", args.policy);
    create_output_dirs(&config.trainer)?;

    // A corrupt table aborts here so it is never overwritten
    let table = ValueTable::load_or_default(&config.trainer.table_path)
        .with_context(|| format!("loading {}", config.trainer.table_path.display()))?;
    info!("Value table: {} states", table.len());

    let mut client = MgbaClient::new(config.mgba.clone());
    client.connect().await.context("connecting to mGBA")?;
    if !client.ping().await.context("pinging mGBA")? {
        client.disconnect().await;
        anyhow::bail!("mGBA did not answer PING");
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, finishing current step");
                let _ = cancel_tx.send(true);
            }
            Err(e) => error!("Failed to install Ctrl-C handler: {}", e),
        }
    });

    match args.policy {
        PolicyArg::EpsilonGreedy => {
            let policy = EpsilonGreedyPolicy::new(&config.trainer.learning, table)?;
            run_with_policy(config.trainer, policy, &mut client, cancel_rx).await?
        }
        PolicyArg::Random => {
            let policy = RandomPolicy::new(table, config.trainer.learning.seed);
            run_with_policy(config.trainer, policy, &mut client, cancel_rx).await?
        }
    }

    Ok(())
}
