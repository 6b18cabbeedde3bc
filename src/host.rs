use log::{info, warn};
use strum::{AsRefStr, Display, EnumIter};

use crate::error::WikiStoreError;
use crate::permissions::{group_subject, AclEntry, AclValue, MODIFY_PAGE, READ_PAGE};
use crate::providers::pages::ROOT_NAMESPACE;
use crate::providers::settings::SettingsStorageProvider;
use crate::providers::users::UserGroup;

/// Resource covering the whole wiki.
pub const GLOBAL_RESOURCE: &str = "G";
/// Action covering every operation on a resource.
pub const FULL_CONTROL: &str = "*";

/// Host settings the storage layer reads during an upgrade.
#[derive(AsRefStr, EnumIter, Display, Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum SettingName {
    AdministratorsGroup,
    UsersGroup,
    AnonymousGroup,
}

impl SettingName {
    pub fn default_value(&self) -> &'static str {
        match self {
            SettingName::AdministratorsGroup => "Administrators",
            SettingName::UsersGroup => "Users",
            SettingName::AnonymousGroup => "Anonymous",
        }
    }
}

/// Callbacks the wiki host provides to storage providers.
///
/// Passed explicitly into every upgrade so tests can substitute a fake.
pub trait Host {
    fn get_setting_value(&self, name: SettingName) -> Option<String>;

    /// Configuration string stored for the named provider, if any.
    fn get_provider_configuration(&self, provider: &str) -> Option<String>;

    /// ACL sink.
    fn store_acl_entry(&self, entry: &AclEntry) -> Result<(), WikiStoreError>;

    /// Grants the built-in groups the rights that predecessor versions
    /// derived from the per-user admin flag.
    fn upgrade_security_flags_to_groups_acl(
        &self,
        administrators: &UserGroup,
        users: &UserGroup,
    ) -> Result<(), WikiStoreError>;
}

/// Setting value, or its built-in default when the host has none.
pub fn resolve_setting(host: &dyn Host, name: SettingName) -> String {
    match host.get_setting_value(name) {
        Some(value) if !value.trim().is_empty() => value,
        _ => {
            warn!(
                "Setting {} is not configured - using default of '{}'",
                name,
                name.default_value()
            );
            name.default_value().to_owned()
        }
    }
}

/// [`Host`] backed by the Settings storage provider: settings come from the
/// `Setting` table, provider configuration from `PluginStatus`, and ACL
/// entries land in `AclEntry`.
pub struct SettingsHost<'a> {
    settings: &'a SettingsStorageProvider,
}

impl<'a> SettingsHost<'a> {
    pub fn new(settings: &'a SettingsStorageProvider) -> Self {
        Self { settings }
    }
}

impl Host for SettingsHost<'_> {
    fn get_setting_value(&self, name: SettingName) -> Option<String> {
        match self.settings.get_setting_value(name.as_ref()) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not read setting {}: {}", name, e);
                None
            }
        }
    }

    fn get_provider_configuration(&self, provider: &str) -> Option<String> {
        match self.settings.get_plugin_configuration(provider) {
            Ok(config) => config,
            Err(e) => {
                warn!("Could not read configuration of {}: {}", provider, e);
                None
            }
        }
    }

    fn store_acl_entry(&self, entry: &AclEntry) -> Result<(), WikiStoreError> {
        self.settings
            .store_acl_entry(entry)
            .map_err(|e| rejected(entry, e))
    }

    fn upgrade_security_flags_to_groups_acl(
        &self,
        administrators: &UserGroup,
        users: &UserGroup,
    ) -> Result<(), WikiStoreError> {
        let root = format!("N.{}", ROOT_NAMESPACE);
        let admins = group_subject(&administrators.name);
        let members = group_subject(&users.name);

        let entries = [
            AclEntry::new(GLOBAL_RESOURCE, FULL_CONTROL, &admins, AclValue::Grant),
            AclEntry::new(&root, READ_PAGE, &members, AclValue::Grant),
            AclEntry::new(&root, MODIFY_PAGE, &members, AclValue::Grant),
        ];
        for entry in &entries {
            self.store_acl_entry(entry)?;
        }

        info!(
            "Granted built-in rights to groups '{}' and '{}'",
            administrators.name, users.name
        );
        Ok(())
    }
}

fn rejected(entry: &AclEntry, e: WikiStoreError) -> WikiStoreError {
    WikiStoreError::HostError(format!(
        "ACL entry {} {} {} was not stored: {}",
        entry.resource, entry.action, entry.subject, e
    ))
}
