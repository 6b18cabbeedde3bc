use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::domain::Domain;

pub static CONFIG: OnceCell<Config> = OnceCell::new();

const ENV_PREFIX: &str = "WIKISTORE_";
const CONFIG_FILE_NAME: &str = "config.toml";
const DB_FILE_NAME: &str = "wikistore.db";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub wikistore: String,
    pub r2d2: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];
    const WIKISTORE_LEVEL: &str = "info";
    const R2D2_LEVEL: &str = "warn";

    fn default() -> Self {
        LoggingConfig {
            wikistore: Self::WIKISTORE_LEVEL.to_string(),
            r2d2: Self::R2D2_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        Self::ensure_level(&mut self.wikistore, "wikistore", Self::WIKISTORE_LEVEL);
        Self::ensure_level(&mut self.r2d2, "r2d2", Self::R2D2_LEVEL);
    }

    fn ensure_level(level: &mut String, name: &str, default: &str) {
        let original = level.clone();
        *level = level.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&level.as_str()) {
            eprintln!(
                "Config error: {} log level of '{}' is invalid - using default of '{}'",
                name, original, default
            );
            *level = default.to_owned();
        }
    }

    /// flexi_logger specification for these levels.
    pub fn log_spec(&self) -> String {
        format!("warn, wikistore={}, r2d2={}", self.wikistore, self.r2d2)
    }
}

/// Connection strings. Each domain may override the shared one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub connection_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<String>,
}

impl StorageConfig {
    fn default(data_dir: &Path) -> Self {
        StorageConfig {
            connection_string: format!("Data Source={}", data_dir.join(DB_FILE_NAME).display()),
            users: None,
            pages: None,
            files: None,
            settings: None,
        }
    }

    pub fn connection_string(&self, domain: Domain) -> &str {
        let specific = match domain {
            Domain::Users => &self.users,
            Domain::Pages => &self.pages,
            Domain::Files => &self.files,
            Domain::Settings => &self.settings,
        };
        specific
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.connection_string)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
}

impl Config {
    fn default(data_dir: &Path) -> Self {
        Config {
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(data_dir),
        }
    }

    /// Loads the configuration from `config_file`, or from `config.toml` in the
    /// app's data directory. A missing default file is written out first.
    /// Environment variables prefixed `WIKISTORE_` override the file, with `__`
    /// separating nested keys (`WIKISTORE_STORAGE__PAGES`). If extraction
    /// fails, defaults are used.
    pub fn load_config(project_dirs: &ProjectDirs, config_file: Option<&Path>) -> Self {
        let data_dir = project_dirs.data_local_dir();
        let default_config = Config::default(data_dir);

        let config_path: PathBuf = match config_file {
            Some(path) => path.to_path_buf(),
            None => {
                let path = data_dir.join(CONFIG_FILE_NAME);
                if !path.exists() {
                    Self::write_default(&path, &default_config);
                }
                path
            }
        };

        Self::load_from(&config_path, default_config)
    }

    fn load_from(config_path: &Path, default_config: Config) -> Self {
        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();
        config
    }

    fn write_default(config_path: &Path, default_config: &Config) {
        if let Some(parent) = config_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!(
                    "Failed to create configuration directory {}: {}",
                    parent.display(),
                    e
                );
            }
        }
        match toml::to_string_pretty(default_config) {
            Ok(toml_string) => {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            }
            Err(_) => eprintln!("Failed to serialize default config."),
        }
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
    }
}
