use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::database::Database;
use crate::domain::Domain;
use crate::error::WikiStoreError;

/// What the backend holds for a domain, relative to the version this build supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "installed")]
pub enum SchemaState {
    /// No version table, or no row for the domain.
    Absent,
    Current,
    Stale(i32),
    /// Installed by a newer build. The caller must refuse to continue.
    Unsupported(i32),
}

/// Reads and stamps the per-domain rows of the `Version` table.
pub struct SchemaVersionRegistry<'a> {
    db: &'a Database,
}

impl<'a> SchemaVersionRegistry<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Classifies the installed schema. Read-only; a missing table or row is
    /// `Absent`, never an error.
    pub fn detect_state(&self, domain: Domain, supported: i32) -> Result<SchemaState, WikiStoreError> {
        let state = match self.installed_version(domain)? {
            None => SchemaState::Absent,
            Some(v) if v > supported => SchemaState::Unsupported(v),
            Some(v) if v < supported => SchemaState::Stale(v),
            Some(_) => SchemaState::Current,
        };
        debug!("Schema state for {}: {:?} (supported {})", domain, state, supported);
        Ok(state)
    }

    pub fn installed_version(&self, domain: Domain) -> Result<Option<i32>, WikiStoreError> {
        let conn = self.db.conn()?;
        read_version(&conn, domain)
    }

    /// Stamps the version record. Must be the last write of a create or upgrade
    /// step. The stored version never decreases.
    pub fn write_version(
        conn: &Connection,
        domain: Domain,
        version: i32,
    ) -> Result<(), WikiStoreError> {
        if let Some(installed) = read_version(conn, domain)? {
            if installed > version {
                return Err(WikiStoreError::Error(format!(
                    "Refusing to lower the {} schema version from {} to {}",
                    domain, installed, version
                )));
            }
        }

        conn.execute(
            "INSERT INTO Version (Component, Version) VALUES (?1, ?2)
             ON CONFLICT (Component) DO UPDATE SET Version = excluded.Version",
            params![domain.as_ref(), version],
        )?;
        Ok(())
    }
}

fn read_version(conn: &Connection, domain: Domain) -> Result<Option<i32>, WikiStoreError> {
    if !Database::table_exists(conn, "Version")? {
        return Ok(None);
    }

    let version = conn
        .query_row(
            "SELECT Version FROM Version WHERE Component = ?1",
            [domain.as_ref()],
            |row| row.get::<_, i32>(0),
        )
        .optional()?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestStore;

    #[test]
    fn test_no_version_table_is_absent() {
        let store = TestStore::new();
        let registry = SchemaVersionRegistry::new(&store.db);
        assert_eq!(
            registry.detect_state(Domain::Pages, 3001).unwrap(),
            SchemaState::Absent
        );
    }

    #[test]
    fn test_no_version_row_is_absent() {
        let store = TestStore::new();
        store.exec("CREATE TABLE Version (Component TEXT PRIMARY KEY, Version INTEGER NOT NULL);");
        store.exec("INSERT INTO Version VALUES ('Users', 3000);");
        let registry = SchemaVersionRegistry::new(&store.db);
        assert_eq!(
            registry.detect_state(Domain::Settings, 3000).unwrap(),
            SchemaState::Absent
        );
    }

    #[test]
    fn test_classification() {
        let store = TestStore::new();
        store.exec("CREATE TABLE Version (Component TEXT PRIMARY KEY, Version INTEGER NOT NULL);");
        store.exec("INSERT INTO Version VALUES ('Pages', 3000);");
        let registry = SchemaVersionRegistry::new(&store.db);

        assert_eq!(
            registry.detect_state(Domain::Pages, 3001).unwrap(),
            SchemaState::Stale(3000)
        );
        assert_eq!(
            registry.detect_state(Domain::Pages, 3000).unwrap(),
            SchemaState::Current
        );
        assert_eq!(
            registry.detect_state(Domain::Pages, 2999).unwrap(),
            SchemaState::Unsupported(3000)
        );
    }

    #[test]
    fn test_write_version_never_decreases() {
        let store = TestStore::new();
        store.exec("CREATE TABLE Version (Component TEXT PRIMARY KEY, Version INTEGER NOT NULL);");
        let conn = store.db.conn().unwrap();

        SchemaVersionRegistry::write_version(&conn, Domain::Files, 3000).unwrap();
        SchemaVersionRegistry::write_version(&conn, Domain::Files, 3000).unwrap();
        SchemaVersionRegistry::write_version(&conn, Domain::Files, 3002).unwrap();
        assert!(SchemaVersionRegistry::write_version(&conn, Domain::Files, 3001).is_err());

        let registry = SchemaVersionRegistry::new(&store.db);
        assert_eq!(registry.installed_version(Domain::Files).unwrap(), Some(3002));
    }

    #[test]
    fn test_state_serializes_with_installed_version() {
        let json = serde_json::to_string(&SchemaState::Stale(3000)).unwrap();
        assert_eq!(json, r#"{"state":"Stale","installed":3000}"#);
        let json = serde_json::to_string(&SchemaState::Absent).unwrap();
        assert_eq!(json, r#"{"state":"Absent"}"#);
    }
}
