//! CLI parser and dispatch.

mod config_cmd;
mod harvest;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::HarvestConfig;
use crate::scrapers::Credentials;

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Long-running harvester for profile feeds and trending topics")]
#[command(version)]
pub struct Cli {
    /// Config file (TOML, or JSON by extension). Defaults to ./harvest.toml if present
    #[arg(short, long, global = true, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the daily record stores
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    credentials: CredentialArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Args)]
struct CredentialArgs {
    /// Account name used to log in
    #[arg(long, global = true, env = "HARVEST_ACCOUNT")]
    account: Option<String>,

    /// Account password
    #[arg(long, global = true, env = "HARVEST_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Identifier entered when the site asks to verify unusual activity
    #[arg(long, global = true, env = "HARVEST_VERIFICATION_ID", hide_env_values = true)]
    verification_id: Option<String>,
}

impl CredentialArgs {
    fn resolve(self) -> anyhow::Result<Credentials> {
        let Some(account) = self.account.filter(|s| !s.is_empty()) else {
            anyhow::bail!("No account given. Use --account or set HARVEST_ACCOUNT");
        };
        let Some(secret) = self.secret.filter(|s| !s.is_empty()) else {
            anyhow::bail!("No password given. Use --secret or set HARVEST_SECRET");
        };
        Ok(Credentials::new(account, secret).with_verification_id(self.verification_id))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest forever: profiles, then trending topics, with cooldown and recovery
    Run,

    /// Log in once and harvest the given profiles
    Profile {
        /// Profile handles (leading @ optional)
        #[arg(required = true)]
        usernames: Vec<String>,
        /// Maximum posts per profile (default: targets.max_per_profile)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Log in once and walk the trending topics
    Trending {
        /// Maximum posts per topic (default: targets.per_topic_cap)
        #[arg(short, long)]
        per_topic: Option<usize>,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = HarvestConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    match cli.command {
        Commands::Run => harvest::cmd_run(&config, cli.credentials.resolve()?).await,
        Commands::Profile { usernames, limit } => {
            let limit = limit.unwrap_or(config.targets.max_per_profile);
            harvest::cmd_profile(&config, cli.credentials.resolve()?, &usernames, limit).await
        }
        Commands::Trending { per_topic } => {
            let cap = per_topic.unwrap_or(config.targets.per_topic_cap);
            harvest::cmd_trending(&config, cli.credentials.resolve()?, cap).await
        }
        Commands::Config => config_cmd::cmd_config_show(&config),
    }
}
