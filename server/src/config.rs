//! Server configuration parsed from the command line

use crate::error::ConfigError;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments of the session server.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Two-player chess session server", long_about = None)]
pub struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Maximum number of simultaneous connections
    #[arg(short, long, default_value = "10000")]
    pub max_connections: usize,

    /// Messages buffered per connection before sends are dropped
    #[arg(long, default_value = "256")]
    pub outbound_buffer: usize,

    /// Persistence records buffered before new records are dropped
    #[arg(long, default_value = "1024")]
    pub persistence_queue: usize,

    /// Seconds a session may have no connected player before it is discarded
    #[arg(long, default_value = "600")]
    pub abandon_timeout_secs: u64,

    /// Seconds between abandoned-session sweeps
    #[arg(long, default_value = "30")]
    pub reap_interval_secs: u64,

    /// Append game records as JSON lines to this file instead of only logging them
    #[arg(long)]
    pub record_file: Option<PathBuf>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    pub outbound_buffer: usize,
    pub persistence_queue: usize,
    pub abandon_timeout: Duration,
    pub reap_interval: Duration,
    pub record_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_connections: 10000,
            outbound_buffer: 256,
            persistence_queue: 1024,
            abandon_timeout: Duration::from_secs(600),
            reap_interval: Duration::from_secs(30),
            record_file: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Zero("max connections"));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::Zero("outbound buffer"));
        }
        if self.persistence_queue == 0 {
            return Err(ConfigError::Zero("persistence queue"));
        }
        if self.reap_interval.is_zero() {
            return Err(ConfigError::Zero("reap interval"));
        }
        Ok(())
    }
}

impl TryFrom<Args> for ServerConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let address = format!("{}:{}", args.host, args.port);
        let bind_addr = address
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidAddress(address))?;

        let config = ServerConfig {
            bind_addr,
            max_connections: args.max_connections,
            outbound_buffer: args.outbound_buffer,
            persistence_queue: args.persistence_queue,
            abandon_timeout: Duration::from_secs(args.abandon_timeout_secs),
            reap_interval: Duration::from_secs(args.reap_interval_secs),
            record_file: args.record_file,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse() {
        let args = Args::parse_from(["server"]);
        let config = ServerConfig::try_from(args).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.max_connections, 10000);
        assert_eq!(config.outbound_buffer, 256);
        assert_eq!(config.abandon_timeout, Duration::from_secs(600));
        assert!(config.record_file.is_none());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "server",
            "-H",
            "0.0.0.0",
            "-p",
            "9000",
            "--abandon-timeout-secs",
            "5",
            "--record-file",
            "games.jsonl",
        ]);
        let config = ServerConfig::try_from(args).unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.abandon_timeout, Duration::from_secs(5));
        assert_eq!(config.record_file, Some(PathBuf::from("games.jsonl")));
    }

    #[test]
    fn test_invalid_host_rejected() {
        let args = Args::parse_from(["server", "-H", "not-an-ip"]);
        assert!(matches!(
            ServerConfig::try_from(args),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let args = Args::parse_from(["server", "--outbound-buffer", "0"]);
        assert_eq!(
            ServerConfig::try_from(args).unwrap_err(),
            ConfigError::Zero("outbound buffer")
        );
    }
}
