use log::debug;
use rusqlite::OptionalExtension;

use crate::database::Database;
use crate::domain::Domain;
use crate::error::WikiStoreError;
use crate::providers::open_domain;
use crate::schema::{BuiltinSchemaSource, SchemaSource};
use crate::upgrade::MigrationPlan;

pub const ROOT_DIRECTORY: &str = "/";

/// Directory tree for uploaded files. Has no predecessor schema.
pub struct FilesStorageProvider {
    db: Database,
    applied_plan: MigrationPlan,
}

impl FilesStorageProvider {
    pub const PROVIDER_NAME: &'static str = "WikiStore.Sqlite.FilesStorageProvider";

    pub fn init(config: &str) -> Result<Self, WikiStoreError> {
        Self::init_with_source(config, &BuiltinSchemaSource)
    }

    pub fn init_with_source(config: &str, source: &dyn SchemaSource) -> Result<Self, WikiStoreError> {
        let (db, applied_plan) = open_domain(Domain::Files, config, source, None)?;
        Ok(Self { db, applied_plan })
    }

    pub fn applied_plan(&self) -> &MigrationPlan {
        &self.applied_plan
    }

    /// Full paths of the direct children of `parent`.
    pub fn list_directories(&self, parent: &str) -> Result<Vec<String>, WikiStoreError> {
        let parent = normalize(parent);
        let conn = self.db.conn()?;
        let mut stmt =
            conn.prepare("SELECT FullPath FROM Directory WHERE Parent = ?1 ORDER BY FullPath")?;
        let dirs = stmt
            .query_map([&parent], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(dirs)
    }

    /// Creates `name` under `parent` and returns its full path.
    pub fn create_directory(&self, parent: &str, name: &str) -> Result<String, WikiStoreError> {
        let name = name.trim_matches('/');
        if name.is_empty() || name.contains('/') {
            return Err(WikiStoreError::Error(format!("Invalid directory name '{}'", name)));
        }

        let parent = normalize(parent);
        let full_path = format!("{}{}/", parent, name);
        let conn = self.db.conn()?;

        let exists = conn
            .query_row("SELECT 1 FROM Directory WHERE FullPath = ?1", [&parent], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(WikiStoreError::Error(format!("Directory '{}' does not exist", parent)));
        }

        conn.execute(
            "INSERT INTO Directory (FullPath, Parent) VALUES (?1, ?2)",
            [&full_path, &parent],
        )?;
        debug!("Created directory {}", full_path);
        Ok(full_path)
    }
}

/// `docs`, `/docs` and `/docs/` all become `/docs/`.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        ROOT_DIRECTORY.to_owned()
    } else {
        format!("/{}/", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeHost, TestStore};
    use crate::upgrade::{MigrationAction, PagesLegacySchema, UpgradeOrchestrator};

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("docs"), "/docs/");
        assert_eq!(normalize("/docs/img/"), "/docs/img/");
    }

    #[test]
    fn test_directory_tree() {
        let store = TestStore::new();
        let provider = FilesStorageProvider::init(&store.conn_str).unwrap();

        assert_eq!(provider.create_directory("/", "docs").unwrap(), "/docs/");
        assert_eq!(provider.create_directory("/docs", "img").unwrap(), "/docs/img/");
        provider.create_directory("", "attic").unwrap();

        assert_eq!(provider.list_directories("/").unwrap(), vec!["/attic/", "/docs/"]);
        assert_eq!(provider.list_directories("docs").unwrap(), vec!["/docs/img/"]);
        assert!(provider.create_directory("/missing", "x").is_err());
        assert!(provider.create_directory("/", "docs").is_err());
        assert!(provider.create_directory("/", "a/b").is_err());
    }

    #[test]
    fn test_files_ignore_pages_legacy_marker() {
        let store = TestStore::new();
        store.exec("CREATE TABLE PagesProviderVersion (Version TEXT);");
        let provider = FilesStorageProvider::init(&store.conn_str).unwrap();
        assert!(provider.applied_plan().has_action(MigrationAction::CreateFresh));

        // The Pages domain still sees its predecessor
        let host = FakeHost::new();
        let legacy = PagesLegacySchema::new(&host);
        let source = BuiltinSchemaSource;
        let plan = UpgradeOrchestrator::new(&store.db, &source)
            .plan(Domain::Pages, Some(&legacy))
            .unwrap();
        assert!(plan.has_action(MigrationAction::MigrateLegacy));
    }
}
