//! Harvesting commands.

use std::future::Future;

use console::style;
use tracing::warn;

use crate::browser::ChromiumFactory;
use crate::config::HarvestConfig;
use crate::scrapers::{Credentials, TokioPacer};
use crate::session::Harvester;

fn harvester(
    config: &HarvestConfig,
    credentials: Credentials,
) -> Harvester<ChromiumFactory, TokioPacer> {
    let factory = ChromiumFactory::new(config.browser.clone());
    Harvester::new(config, credentials, factory, TokioPacer)
}

/// Harvest until a termination signal arrives, then close the browser.
pub async fn cmd_run(config: &HarvestConfig, credentials: Credentials) -> anyhow::Result<()> {
    let mut harvester = harvester(config, credentials);

    println!(
        "{} Harvesting into {}",
        style("→").cyan(),
        config.data_dir.display()
    );
    if config.targets.profiles.is_empty() && !config.targets.trending {
        println!(
            "{} No profiles configured and trending disabled; passes will be empty",
            style("!").yellow()
        );
    }

    until_signal(harvester.run(), shutdown_signal()).await;
    harvester.shutdown().await;
    println!("{} Browser session closed", style("✓").green());
    Ok(())
}

/// Log in once, harvest the given profiles and exit.
pub async fn cmd_profile(
    config: &HarvestConfig,
    credentials: Credentials,
    usernames: &[String],
    limit: usize,
) -> anyhow::Result<()> {
    let mut harvester = harvester(config, credentials);

    let pass = async {
        if !harvester.login().await? {
            anyhow::bail!("Login failed");
        }
        Ok::<_, anyhow::Error>(harvester.harvest_profiles(usernames, limit).await?)
    };
    let outcome = until_signal(pass, shutdown_signal()).await;
    harvester.shutdown().await;

    let Some(result) = outcome else {
        return Ok(());
    };
    let records = result?;
    println!(
        "{} Collected {} posts from {} profiles into {}",
        style("✓").green(),
        records.len(),
        usernames.len(),
        harvester.store().today().display()
    );
    Ok(())
}

/// Log in once, walk the trending topics and exit.
pub async fn cmd_trending(
    config: &HarvestConfig,
    credentials: Credentials,
    per_topic_cap: usize,
) -> anyhow::Result<()> {
    let mut harvester = harvester(config, credentials);

    let pass = async {
        if !harvester.login().await? {
            anyhow::bail!("Login failed");
        }
        Ok::<_, anyhow::Error>(harvester.harvest_trending(per_topic_cap).await?)
    };
    let outcome = until_signal(pass, shutdown_signal()).await;
    harvester.shutdown().await;

    let Some(result) = outcome else {
        return Ok(());
    };
    let pass = result?;
    println!(
        "{} Visited {} of {} topics ({} skipped), {} posts saved to {}",
        style("✓").green(),
        pass.visited,
        pass.topics,
        pass.skipped,
        pass.records,
        harvester.store().today().display()
    );
    Ok(())
}

/// Drive `work` until it finishes or `signal` fires, whichever is first.
/// Returns `None` when interrupted.
async fn until_signal<T>(
    work: impl Future<Output = T>,
    signal: impl Future<Output = ()>,
) -> Option<T> {
    tokio::select! {
        out = work => Some(out),
        () = signal => {
            println!("{} Received shutdown signal", style("!").yellow());
            None
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
