use changes_reader::PollConfig;
use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub couch: CouchConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub poll: PollConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouchConfig {
    /// Server root. May carry credentials, so usually set through `COUCH_URL`.
    #[serde(default)]
    pub url: String,
    pub database: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReaderConfig {
    #[serde(default)]
    pub mode: ReaderMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderMode {
    /// Tail the feed until interrupted
    #[default]
    Start,
    /// Drain the feed with long-polls, then exit
    Get,
    /// Drain the feed with one streamed request, then exit
    Spool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. `CHANGES_` environment variables, `__` between levels
    ///    (`CHANGES_POLL__BATCH_SIZE=500`)
    /// 4. `COUCH_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("CHANGES")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut cfg: Config = builder.build()?.try_deserialize()?;

        if let Ok(url) = std::env::var("COUCH_URL") {
            cfg.couch.url = url;
        }
        cfg.validate()?;

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let cfg: Config = ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.couch.url.is_empty() {
            return Err(ConfigError::Message(
                "couch.url is required (set COUCH_URL)".to_string(),
            ));
        }
        if self.couch.database.is_empty() {
            return Err(ConfigError::Message("couch.database is required".to_string()));
        }
        Ok(())
    }
}
