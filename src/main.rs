use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hostwatch::{Agent, AgentConfig};

#[derive(Parser, Debug)]
#[command(name = "hostwatch")]
#[command(about = "Host observability agent with history, threshold alerts and a query server")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hostwatch.toml")]
    config: PathBuf,

    /// Serve queries on this address (host:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Collection interval in seconds
    #[arg(short, long)]
    refresh: Option<u64>,

    /// History samples kept per field (0 disables history)
    #[arg(long)]
    history_size: Option<usize>,

    /// Collect once, print the response for this path and exit
    #[arg(short, long, conflicts_with = "listen")]
    query: Option<String>,
}

impl Args {
    /// Command-line values take precedence over the file.
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(listen) = &self.listen {
            config.listen = Some(listen.clone());
        }
        if let Some(refresh) = self.refresh {
            config.refresh = refresh;
        }
        if let Some(history_size) = self.history_size {
            config.history_size = history_size;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = AgentConfig::load(&args.config)?;
    args.apply(&mut config);
    info!("Loaded {} plugins from {}", config.plugins.len(), args.config.display());

    let agent = Agent::new(config)?;

    if let Some(path) = &args.query {
        let response = agent.query_once(path).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    agent
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_file_values() {
        let args = Args::parse_from([
            "hostwatch",
            "--config",
            "agent.toml",
            "--refresh",
            "5",
            "--history-size",
            "0",
        ]);
        let mut config = AgentConfig {
            listen: Some("0.0.0.0:61209".to_string()),
            ..AgentConfig::default()
        };
        args.apply(&mut config);

        assert_eq!(args.config, PathBuf::from("agent.toml"));
        assert_eq!(config.refresh, 5);
        assert_eq!(config.history_size, 0);
        assert_eq!(config.listen.as_deref(), Some("0.0.0.0:61209"));
    }

    #[test]
    fn query_conflicts_with_listen() {
        let result = Args::try_parse_from([
            "hostwatch",
            "--listen",
            "127.0.0.1:61209",
            "--query",
            "cpu",
        ]);
        assert!(result.is_err());
    }
}
