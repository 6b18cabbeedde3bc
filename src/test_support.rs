use std::cell::RefCell;
use std::collections::HashMap;

use tempfile::TempDir;

use crate::database::{quote_ident, Database};
use crate::error::WikiStoreError;
use crate::host::{Host, SettingName};
use crate::permissions::AclEntry;
use crate::providers::users::UserGroup;

/// A file-backed store in a temporary directory.
pub struct TestStore {
    _dir: TempDir,
    pub db: Database,
    pub conn_str: String,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("wiki.db");
        let conn_str = format!("Data Source={}", path.display());
        let db = Database::connect_str(&conn_str).expect("Failed to open test store");
        TestStore {
            _dir: dir,
            db,
            conn_str,
        }
    }

    pub fn exec(&self, sql: &str) {
        self.db
            .conn()
            .unwrap()
            .execute_batch(sql)
            .unwrap_or_else(|e| panic!("{}: {}", e, sql));
    }

    pub fn count(&self, sql: &str) -> i64 {
        self.db
            .conn()
            .unwrap()
            .query_row(sql, [], |row| row.get(0))
            .unwrap()
    }

    pub fn strings(&self, sql: &str) -> Vec<String> {
        let conn = self.db.conn().unwrap();
        let mut stmt = conn.prepare(sql).unwrap();
        let rows = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap();
        rows
    }

    /// Schema objects with their row counts, plus the version records.
    /// Two equal dumps mean nothing observable changed in between.
    pub fn dump(&self) -> Vec<String> {
        let conn = self.db.conn().unwrap();
        let objects: Vec<(String, String, Option<String>)> = {
            let mut stmt = conn
                .prepare("SELECT type, name, sql FROM sqlite_master ORDER BY type, name")
                .unwrap();
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                .unwrap()
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            rows
        };

        let mut dump = Vec::new();
        for (kind, name, sql) in objects {
            let mut line = format!("{} {} {}", kind, name, sql.unwrap_or_default());
            if kind == "table" {
                let rows: i64 = conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(&name)), [], |row| {
                        row.get(0)
                    })
                    .unwrap();
                line.push_str(&format!(" rows={}", rows));
            }
            dump.push(line);
        }
        if Database::table_exists(&conn, "Version").unwrap() {
            dump.extend(
                self.strings("SELECT Component || '=' || Version FROM Version ORDER BY Component"),
            );
        }
        dump
    }
}

/// In-memory [`Host`] that records what the storage layer asks of it.
#[derive(Default)]
pub struct FakeHost {
    settings: HashMap<SettingName, String>,
    configurations: HashMap<String, String>,
    acl: RefCell<Vec<AclEntry>>,
    security_upgrades: RefCell<Vec<(String, String)>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setting(mut self, name: SettingName, value: &str) -> Self {
        self.settings.insert(name, value.to_owned());
        self
    }

    pub fn with_provider_configuration(mut self, provider: &str, config: &str) -> Self {
        self.configurations
            .insert(provider.to_owned(), config.to_owned());
        self
    }

    pub fn acl_entries(&self) -> Vec<AclEntry> {
        self.acl.borrow().clone()
    }

    /// (administrators, users) group names, one pair per call.
    pub fn security_upgrades(&self) -> Vec<(String, String)> {
        self.security_upgrades.borrow().clone()
    }
}

impl Host for FakeHost {
    fn get_setting_value(&self, name: SettingName) -> Option<String> {
        self.settings.get(&name).cloned()
    }

    fn get_provider_configuration(&self, provider: &str) -> Option<String> {
        self.configurations.get(provider).cloned()
    }

    fn store_acl_entry(&self, entry: &AclEntry) -> Result<(), WikiStoreError> {
        self.acl.borrow_mut().push(entry.clone());
        Ok(())
    }

    fn upgrade_security_flags_to_groups_acl(
        &self,
        administrators: &UserGroup,
        users: &UserGroup,
    ) -> Result<(), WikiStoreError> {
        self.security_upgrades
            .borrow_mut()
            .push((administrators.name.clone(), users.name.clone()));
        Ok(())
    }
}
