use ::config::{ConfigError, Environment, File};
use serde::Deserialize;
use std::{
    env,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
};

pub const CONFIG_PATH_VAR: &str = "SPAMBASE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "spambase.toml";
const ENV_PREFIX: &str = "SPAMBASE";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    /// Defer artifact loading to the first request instead of startup.
    pub lazy_model_load: bool,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
    pub log_json: bool,
}

impl Config {
    /// Defaults, then the config file, then `SPAMBASE_*` variables, then a
    /// bare `PORT`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = Self::load_from(Some(Path::new(&path)))?;

        if let Some(port) = env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }

        Ok(config)
    }

    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 5000)?
            .set_default("model_path", "best_model_random_forest.json")?
            .set_default("scaler_path", "scaler.json")?
            .set_default("lazy_model_load", false)?
            .set_default("metrics_enabled", true)?
            .set_default("metrics_port", 9000)?
            .set_default("log_json", false)?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).required(false));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.metrics_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::load_from(None).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.model_path, PathBuf::from("best_model_random_forest.json"));
        assert!(!config.lazy_model_load);
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:5000");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "port = 8081\nmodel_path = \"/srv/models/forest.bin\"\nlazy_model_load = true\nhost = \"127.0.0.1\""
        )
        .unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.model_path, PathBuf::from("/srv/models/forest.bin"));
        assert_eq!(config.scaler_path, PathBuf::from("scaler.json"));
        assert!(config.lazy_model_load);
        assert_eq!(config.metrics_addr().to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_missing_file_is_optional() {
        let config = Config::load_from(Some(Path::new("/nonexistent/spambase.toml"))).unwrap();
        assert_eq!(config.port, 5000);
    }
}
