//! Server configuration: environment variables with CLI overrides.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use deliberation::DeliberationConfig;

/// Command-line arguments. Each flag overrides its environment variable.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to bind (overrides DELIBERATION_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (overrides DELIBERATION_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// JSON-lines history file (overrides DELIBERATION_HISTORY_PATH)
    #[arg(long)]
    pub history_path: Option<PathBuf>,

    /// TOML file with deliberation settings (concurrency, retry, scoring)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Keep history in memory instead of on disk
    #[arg(long, default_value_t = false)]
    pub in_memory_history: bool,
}

/// OpenAI-compatible endpoint serving the reasoning engine.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Transport timeout; each call is also bounded by the deliberation's
    /// call timeout
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/v1".into()),
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "default".into()),
            api_key: std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
            temperature: parse_env("LLM_TEMPERATURE", 0.3)?,
            request_timeout_secs: parse_env("LLM_REQUEST_TIMEOUT_SECS", 180)?,
        })
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub history_path: PathBuf,
    pub in_memory_history: bool,
    /// Seconds a registered streaming session waits for its stream
    pub session_ttl_secs: u64,
    pub llm: LlmConfig,
    pub deliberation: DeliberationConfig,
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {value:?}")),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Read the environment, then apply CLI overrides.
    pub fn load(args: &Args) -> Result<Self> {
        let deliberation = match &args.config {
            Some(path) => DeliberationConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => DeliberationConfig::default(),
        };
        deliberation
            .validate()
            .context("Invalid deliberation settings")?;

        let host = match &args.host {
            Some(host) => host.clone(),
            None => std::env::var("DELIBERATION_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        };
        let port = match args.port {
            Some(port) => port,
            None => parse_env("DELIBERATION_PORT", 8000)?,
        };
        let history_path = match &args.history_path {
            Some(path) => path.clone(),
            None => std::env::var("DELIBERATION_HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/history.jsonl")),
        };

        Ok(Self {
            host,
            port,
            history_path,
            in_memory_history: args.in_memory_history,
            session_ttl_secs: parse_env("DELIBERATION_SESSION_TTL_SECS", 300)?,
            llm: LlmConfig::from_env()?,
            deliberation,
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_overrides_win() {
        let args = Args::parse_from([
            "deliberation-server",
            "--host",
            "127.0.0.1",
            "--port",
            "9123",
            "--history-path",
            "/tmp/h.jsonl",
            "--in-memory-history",
        ]);
        let config = ServerConfig::load(&args).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9123);
        assert_eq!(config.history_path, PathBuf::from("/tmp/h.jsonl"));
        assert!(config.in_memory_history);
        assert_eq!(config.bind_addr().unwrap().port(), 9123);
        assert_eq!(config.session_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_deliberation_settings_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrent_factors = 8\n[retry]\nmax_attempts = 3").unwrap();

        let args = Args {
            config: Some(file.path().to_path_buf()),
            ..Args::default()
        };
        let config = ServerConfig::load(&args).unwrap();
        assert_eq!(config.deliberation.max_concurrent_factors, 8);
        assert_eq!(config.deliberation.retry.max_attempts, 3);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = Args {
            config: Some(PathBuf::from("/nonexistent/deliberation.toml")),
            ..Args::default()
        };
        let err = ServerConfig::load(&args).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load"));
    }
}
