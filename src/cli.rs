use std::path::PathBuf;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use flexi_logger::{Logger, LoggerHandle};
use log::{debug, info};
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::config::{Config, CONFIG};
use crate::database::{ConnectionConfig, Database};
use crate::domain::Domain;
use crate::error::WikiStoreError;
use crate::host::SettingsHost;
use crate::providers::files::FilesStorageProvider;
use crate::providers::pages::PagesStorageProvider;
use crate::providers::settings::SettingsStorageProvider;
use crate::providers::users::UsersStorageProvider;
use crate::registry::{SchemaState, SchemaVersionRegistry};
use crate::schema::{BuiltinSchemaSource, SchemaSource};
use crate::upgrade::MigrationPlan;

#[derive(Parser)]
#[command(
    name = "wikistore",
    version,
    about = "WikiStore: schema lifecycle for wiki storage providers"
)]
pub struct Cli {
    /// Configuration file (default: config.toml in the data directory)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Bring every storage domain to the supported schema version
    Upgrade,

    /// Show the installed schema state of every domain
    Status {
        /// Print JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct DomainStatus {
    domain: Domain,
    supported: i32,
    #[serde(flatten)]
    state: SchemaState,
}

impl Cli {
    pub fn handle_command_line() -> Result<(), WikiStoreError> {
        let args = Cli::parse();

        let project_dirs = ProjectDirs::from("", "", "wikistore").ok_or_else(|| {
            WikiStoreError::Error("Could not determine the data directory".to_owned())
        })?;
        let config = Config::load_config(&project_dirs, args.config.as_deref());
        let _logger = Self::init_logging(&config)?;
        let config = CONFIG.get_or_init(|| config);
        debug!("Configuration: {:?}", config);

        match args.command {
            Command::Upgrade => Self::upgrade(config),
            Command::Status { json } => Self::status(config, json),
        }
    }

    /// `RUST_LOG`, when set, replaces the configured levels.
    fn init_logging(config: &Config) -> Result<LoggerHandle, WikiStoreError> {
        Logger::try_with_env_or_str(config.logging.log_spec())
            .and_then(|logger| logger.start())
            .map_err(|e| WikiStoreError::Error(format!("Failed to start logger: {}", e)))
    }

    /// Opens the providers in host startup order. Settings comes first because
    /// the others read host settings and write ACL entries through it.
    fn upgrade(config: &Config) -> Result<(), WikiStoreError> {
        let storage = &config.storage;

        let settings = SettingsStorageProvider::init(storage.connection_string(Domain::Settings))?;
        Self::print_plan(settings.applied_plan());
        let host = SettingsHost::new(&settings);

        let users =
            UsersStorageProvider::init(&host, storage.connection_string(Domain::Users))?;
        Self::print_plan(users.applied_plan());

        let pages =
            PagesStorageProvider::init(&host, storage.connection_string(Domain::Pages))?;
        Self::print_plan(pages.applied_plan());

        let files = FilesStorageProvider::init(storage.connection_string(Domain::Files))?;
        Self::print_plan(files.applied_plan());

        info!("All storage domains are current");
        Ok(())
    }

    fn print_plan(plan: &MigrationPlan) {
        if plan.is_noop() {
            println!("{:<9} current", plan.domain);
        }
        for step in &plan.steps {
            println!("{:<9} {}", plan.domain, step);
        }
    }

    fn status(config: &Config, json: bool) -> Result<(), WikiStoreError> {
        let source = BuiltinSchemaSource;
        let mut statuses = Vec::new();

        for domain in Domain::iter() {
            statuses.push(Self::domain_status(
                config.storage.connection_string(domain),
                domain,
                &source,
            )?);
        }

        if json {
            let out = serde_json::to_string_pretty(&statuses)
                .map_err(|e| WikiStoreError::Error(e.to_string()))?;
            println!("{}", out);
        } else {
            for status in &statuses {
                println!(
                    "{:<9} {} (supported {})",
                    status.domain,
                    describe(status.state),
                    status.supported
                );
            }
        }
        Ok(())
    }

    /// Reads the installed state without writing. A store whose file does not
    /// exist yet is `Absent` and is not created.
    fn domain_status(
        conn_str: &str,
        domain: Domain,
        source: &dyn SchemaSource,
    ) -> Result<DomainStatus, WikiStoreError> {
        let supported = source.supported_version(domain);
        let conn_config = ConnectionConfig::parse(conn_str)?;

        let state = if conn_config.data_source.exists() {
            let db = Database::connect_read_only(&conn_config)?;
            SchemaVersionRegistry::new(&db).detect_state(domain, supported)?
        } else {
            debug!("No store at {}", conn_config.data_source.display());
            SchemaState::Absent
        };

        Ok(DomainStatus {
            domain,
            supported,
            state,
        })
    }
}

fn describe(state: SchemaState) -> String {
    match state {
        SchemaState::Absent => "absent".to_owned(),
        SchemaState::Current => "current".to_owned(),
        SchemaState::Stale(v) => format!("stale at {}", v),
        SchemaState::Unsupported(v) => format!("unsupported version {}", v),
    }
}
