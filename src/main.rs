//! Liftoff server binary

use clap::Parser;
use liftoff::api::ApiServer;
use liftoff::config::LiftoffConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "liftoff")]
#[command(about = "Multiplayer crash game server", long_about = None)]
struct Args {
    /// TOML configuration file; missing sections use defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start from the short-timing preset instead of the defaults
    #[arg(long, conflicts_with = "config")]
    fast: bool,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long)]
    cors_origins: Option<String>,

    /// tracing filter, e.g. "liftoff=debug"; RUST_LOG still takes precedence
    #[arg(long)]
    log_filter: Option<String>,
}

impl Args {
    fn into_config(self) -> Result<LiftoffConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => LiftoffConfig::load(path)?,
            None if self.fast => LiftoffConfig::fast(),
            None => LiftoffConfig::default(),
        };

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(origins) = self.cors_origins {
            config.server.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(filter) = self.log_filter {
            config.monitoring.log_filter = filter;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Args::parse().into_config()?;
    ApiServer::new(config).run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_and_config_are_exclusive() {
        assert!(Args::try_parse_from(["liftoff", "--config", "liftoff.toml", "--fast"]).is_err());

        let args = Args::try_parse_from(["liftoff", "--fast", "--port", "9000"]).unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.round.countdown_tick_ms, 100);
        assert_eq!(config.server.port, 9000);
    }
}
