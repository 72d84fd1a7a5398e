//! Agent tester - connects to a center and reports periodically
//!
//! Usage:
//!   agent_tester --center 127.0.0.1 --port 10000
//!   agent_tester --center 10.0.0.1,10.0.0.2 --port 10000 --interval-ms 1000
//!   agent_tester --config config/agent.toml

use agent::{AgentContext, MessageContext};
use agent_config::AgentConfig;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Commands the tester prints when a center sends them
const PRINTED_COMMANDS: [u32; 3] = [1, 2, 3];

const REPORT_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "agent_tester")]
#[command(about = "Center agent test driver")]
#[command(version)]
struct Args {
    /// Center IP, comma-separated IP list or domain name
    #[arg(long, default_value = "127.0.0.1")]
    center: String,

    /// Center port
    #[arg(long, default_value_t = 10000, value_parser = clap::value_parser!(u16).range(2048..))]
    port: u16,

    /// Optional agent configuration file; AGENT__* variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Milliseconds between reports
    #[arg(long, default_value_t = 3000)]
    interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = AgentConfig::load(args.config.as_deref(), None)
        .context("Failed to load agent configuration")?;
    info!(
        queue_size = config.queue_size,
        connect_timeout_ms = config.connect_timeout_ms,
        "Starting agent tester"
    );

    let agent = AgentContext::builder(config)
        .with_heartbeat_hook(|| b"app data".to_vec())
        .start()?;

    for command in PRINTED_COMMANDS {
        let registered = agent.register_command_processor(
            command,
            move |ctx: &MessageContext, chunk: &[u8]| {
                println!(
                    "[{}] [{}:{}] {}",
                    command,
                    ctx.total_size,
                    ctx.finished_size,
                    String::from_utf8_lossy(chunk)
                );
                true
            },
        );
        if !registered {
            warn!(command, "Command processor already registered");
        }
    }

    agent.set_center(&args.center, args.port)?;

    let agent = Arc::new(agent);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reporter = spawn_reporter(
        agent.clone(),
        Duration::from_millis(args.interval_ms),
        shutdown_rx,
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl-C handler")?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    if let Err(e) = reporter.await {
        error!(error = %e, "Reporter task failed");
    }

    // last reference: Drop stops and joins the reactor
    drop(agent);

    Ok(())
}

/// Report on every tick until shutdown
///
/// Each blocking report is awaited before the next tick, so once the task
/// ends it holds no reference to the agent.
fn spawn_reporter(
    agent: Arc<AgentContext>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }

            let agent = agent.clone();
            let result =
                tokio::task::spawn_blocking(move || agent.report(b"test", REPORT_TIMEOUT)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Report not queued"),
                Err(e) => error!(error = %e, "Report task failed"),
            }
        }
    })
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reporter_releases_agent_on_shutdown() {
        let agent = Arc::new(
            AgentContext::create(AgentConfig {
                queue_size: 1,
                ..AgentConfig::default()
            })
            .unwrap(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // queue of one with no center: later reports block for the full timeout
        let reporter = spawn_reporter(agent.clone(), Duration::from_millis(10), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(150)).await;

        shutdown_tx.send(true).unwrap();
        reporter.await.unwrap();

        assert_eq!(Arc::strong_count(&agent), 1);
        let mut agent = Arc::try_unwrap(agent).unwrap();
        agent.stop();
        assert_eq!(agent.state(), agent::AgentState::Stopped);
    }
}
