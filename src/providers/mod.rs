pub mod files;
pub mod pages;
pub mod settings;
pub mod users;

use log::{info, warn};

use crate::database::Database;
use crate::domain::Domain;
use crate::error::WikiStoreError;
use crate::host::Host;
use crate::schema::SchemaSource;
use crate::upgrade::{LegacySchema, MigrationPlan, UpgradeOrchestrator};

/// Picks the configuration string a provider should open.
///
/// An explicit string wins. Otherwise the host is asked for the string stored
/// for the provider's predecessor, then for the Settings provider's.
pub fn resolve_configuration(
    host: &dyn Host,
    config: &str,
    legacy_provider: &str,
) -> Result<String, WikiStoreError> {
    if !config.trim().is_empty() {
        return Ok(config.to_owned());
    }

    let non_empty = |c: Option<String>| c.filter(|c| !c.trim().is_empty());
    if let Some(config) = non_empty(host.get_provider_configuration(legacy_provider)) {
        info!("Using the configuration of {}", legacy_provider);
        return Ok(config);
    }
    if let Some(config) =
        non_empty(host.get_provider_configuration(settings::SettingsStorageProvider::PROVIDER_NAME))
    {
        info!("Using the configuration of the settings provider");
        return Ok(config);
    }

    warn!("No configuration available from the host");
    Err(WikiStoreError::InvalidConfiguration(
        "Provided connection string is not valid: no configuration supplied".to_owned(),
    ))
}

/// Opens the store named by `config` and brings `domain` to the supported
/// schema version. Returns the pool together with the plan that was executed.
pub fn open_domain(
    domain: Domain,
    config: &str,
    source: &dyn SchemaSource,
    legacy: Option<&dyn LegacySchema>,
) -> Result<(Database, MigrationPlan), WikiStoreError> {
    let db = Database::connect_str(config)?;
    let plan = UpgradeOrchestrator::new(&db, source).ensure_current(domain, legacy)?;
    Ok((db, plan))
}
