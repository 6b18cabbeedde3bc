use log::debug;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::domain::Domain;
use crate::error::WikiStoreError;
use crate::permissions::{AclEntry, AclValue};
use crate::providers::open_domain;
use crate::schema::{BuiltinSchemaSource, SchemaSource};
use crate::upgrade::{MigrationAction, MigrationPlan};

/// Global settings, plugin configuration and the ACL store.
///
/// Opened first at startup: the other providers read host settings and write
/// ACL entries through it.
pub struct SettingsStorageProvider {
    db: Database,
    applied_plan: MigrationPlan,
}

impl SettingsStorageProvider {
    pub const PROVIDER_NAME: &'static str = "WikiStore.Sqlite.SettingsStorageProvider";

    pub fn init(config: &str) -> Result<Self, WikiStoreError> {
        Self::init_with_source(config, &BuiltinSchemaSource)
    }

    pub fn init_with_source(config: &str, source: &dyn SchemaSource) -> Result<Self, WikiStoreError> {
        let (db, applied_plan) = open_domain(Domain::Settings, config, source, None)?;
        Ok(Self { db, applied_plan })
    }

    pub fn applied_plan(&self) -> &MigrationPlan {
        &self.applied_plan
    }

    /// True when this start created the settings store.
    pub fn is_first_start(&self) -> bool {
        self.applied_plan.has_action(MigrationAction::CreateFresh)
    }

    pub fn get_setting_value(&self, name: &str) -> Result<Option<String>, WikiStoreError> {
        let conn = self.db.conn()?;
        let value = conn
            .query_row("SELECT Value FROM Setting WHERE Name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_setting_value(&self, name: &str, value: &str) -> Result<(), WikiStoreError> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO Setting (Name, Value) VALUES (?1, ?2)
             ON CONFLICT (Name) DO UPDATE SET Value = excluded.Value",
            [name, value],
        )?;
        Ok(())
    }

    /// Writes one entry, replacing any entry for the same resource, action
    /// and subject.
    pub fn store_acl_entry(&self, entry: &AclEntry) -> Result<(), WikiStoreError> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO AclEntry (Resource, \"Action\", Subject, Value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (Resource, \"Action\", Subject) DO UPDATE SET Value = excluded.Value",
            params![entry.resource, entry.action, entry.subject, entry.value.code()],
        )?;
        debug!(
            "Stored ACL entry {} {} {} {}",
            entry.resource,
            entry.action,
            entry.subject,
            entry.value.code()
        );
        Ok(())
    }

    /// Entries for `resource` in the order they were first stored.
    pub fn retrieve_acl_entries(&self, resource: &str) -> Result<Vec<AclEntry>, WikiStoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT Resource, \"Action\", Subject, Value FROM AclEntry
             WHERE Resource = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([resource], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(resource, action, subject, value)| {
                Ok(AclEntry {
                    resource,
                    action,
                    subject,
                    value: AclValue::from_code(&value)?,
                })
            })
            .collect()
    }

    /// Configuration string stored for a plugin or provider.
    pub fn get_plugin_configuration(&self, name: &str) -> Result<Option<String>, WikiStoreError> {
        let conn = self.db.conn()?;
        let config = conn
            .query_row(
                "SELECT Configuration FROM PluginStatus WHERE Name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(config)
    }

    pub fn set_plugin_configuration(&self, name: &str, config: &str) -> Result<(), WikiStoreError> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO PluginStatus (Name, Enabled, Configuration) VALUES (?1, 1, ?2)
             ON CONFLICT (Name) DO UPDATE SET Configuration = excluded.Configuration",
            [name, config],
        )?;
        Ok(())
    }
}
