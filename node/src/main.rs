use airq_dataset::{DatasetProvider, DEFAULT_DATASET_URL};
use airq_model::MultiTargetTrainer;
use airq_rpc::{start_server, AppState, ServiceCore};
use anyhow::{Context, Result};
use clap::{value_parser, Arg, Command};
use config::{Config, File as ConfigFile};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_CONFIG_PATH: &str = "config/airq.toml";

#[derive(Debug, Clone, PartialEq)]
struct AppConfig {
    config_path: Option<PathBuf>,
    host: String,
    port: u16,
    model_dir: String,
    data_dir: String,
    dataset_url: String,
    log_level: String,
    log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            host: "127.0.0.1".to_string(),
            port: 8000,
            model_dir: "models".to_string(),
            data_dir: "data".to_string(),
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file (if any), then `AIRQ_*` variables.
    fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            path.exists().then_some(path)
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(config::Environment::with_prefix("AIRQ"));
        let config = builder.build()?;

        let defaults = AppConfig::default();
        let port = match get_string_value(&config, &["PORT", "port", "server.port"]) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid port '{raw}'"))?,
            None => defaults.port,
        };

        Ok(Self {
            config_path: resolved_path,
            host: get_string_value(&config, &["HOST", "host", "server.host"]).unwrap_or(defaults.host),
            port,
            model_dir: get_string_value(&config, &["MODEL_DIR", "model_dir", "storage.model_dir"])
                .unwrap_or(defaults.model_dir),
            data_dir: get_string_value(&config, &["DATA_DIR", "data_dir", "storage.data_dir"])
                .unwrap_or(defaults.data_dir),
            dataset_url: get_string_value(&config, &["DATASET_URL", "dataset_url", "dataset.url"])
                .unwrap_or(defaults.dataset_url),
            log_level: get_string_value(&config, &["LOG_LEVEL", "log_level", "logging.level"])
                .unwrap_or(defaults.log_level),
            log_format: get_string_value(&config, &["LOG_FORMAT", "log_format", "logging.format"])
                .unwrap_or(defaults.log_format),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("HOST must not be empty");
        }
        if self.port == 0 {
            anyhow::bail!("PORT must be greater than zero");
        }
        if self.model_dir.trim().is_empty() {
            anyhow::bail!("MODEL_DIR must not be empty");
        }
        if self.data_dir.trim().is_empty() {
            anyhow::bail!("DATA_DIR must not be empty");
        }
        if self.dataset_url.trim().is_empty() {
            anyhow::bail!("DATASET_URL must not be empty");
        }
        Ok(())
    }

    fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn build_cli() -> Command {
    Command::new("airq-node")
        .version(VERSION)
        .about("Air quality prediction service")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Address to bind the REST API to"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Port for the REST API"),
        )
        .arg(
            Arg::new("model-dir")
                .long("model-dir")
                .value_name("DIR")
                .help("Directory holding trained models"),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .help("Directory holding the dataset"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["compact", "pretty"])
                .help("Select log output format"),
        )
}

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|value| value.as_str());
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) {
    if let Some(host) = matches.get_one::<String>("host") {
        config.host = host.clone();
    }

    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }

    if let Some(model_dir) = matches.get_one::<String>("model-dir") {
        config.model_dir = model_dir.clone();
    }

    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        config.data_dir = data_dir.clone();
    }

    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }

    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let config = load_config_with_overrides(&matches)?;
    init_logging(&config)?;

    info!("Starting AirQ service v{}", VERSION);
    if let Some(path) = &config.config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let mut core = ServiceCore::new(&config.model_dir, MultiTargetTrainer::default());
    match core.load_existing() {
        Ok((true, _)) => info!("Model ready for predictions"),
        Ok((false, _)) => info!("No trained model found; POST /train to build one"),
        Err(err) => warn!("Could not load existing model: {}", err),
    }

    let datasets = DatasetProvider::new(&config.data_dir, config.dataset_url.clone());
    let state = AppState::new(core, datasets);
    let addr = config.bind_addr();

    tokio::select! {
        result = start_server(state, &addr) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn config_file_values_are_loaded() {
        let file = write_config(
            r#"
[server]
host = "0.0.0.0"
port = 9100

[storage]
model_dir = "/var/lib/airq/models"

[logging]
format = "pretty"
"#,
        );
        let path = file.path().to_str().expect("utf-8 path");
        let config = AppConfig::load(Some(path)).expect("config loads");

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9100);
        assert_eq!(config.model_dir, "/var/lib/airq/models");
        assert_eq!(config.data_dir, "data");
        assert_eq!(config.log_format, "pretty");
        assert_eq!(config.bind_addr(), "0.0.0.0:9100");
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let err = AppConfig::load(Some("/nonexistent/airq.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"), "unexpected error: {err}");
    }

    #[test]
    fn zero_port_fails_validation() {
        let config = AppConfig {
            port: 0,
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("PORT"), "unexpected error: {err}");
    }

    #[test]
    fn cli_flags_override_config() {
        let matches = build_cli().get_matches_from([
            "airq-node",
            "--port",
            "8100",
            "--model-dir",
            "trained",
            "--log-format",
            "pretty",
        ]);
        let mut config = AppConfig::default();
        apply_overrides(&matches, &mut config);

        assert_eq!(config.port, 8100);
        assert_eq!(config.model_dir, "trained");
        assert_eq!(config.log_format, "pretty");
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.validate().is_ok());
    }
}
