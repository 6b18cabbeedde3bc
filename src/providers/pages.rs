use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::database::Database;
use crate::domain::Domain;
use crate::error::WikiStoreError;
use crate::host::Host;
use crate::providers::{open_domain, resolve_configuration};
use crate::schema::{BuiltinSchemaSource, SchemaSource};
use crate::upgrade::{MigrationPlan, PagesLegacySchema};

/// The root namespace has the empty name.
pub const ROOT_NAMESPACE: &str = "";

/// Identifies a page within its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageRef {
    pub namespace: String,
    pub name: String,
}

impl PageRef {
    pub fn new(namespace: &str, name: &str) -> Self {
        PageRef {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }

    pub fn root(name: &str) -> Self {
        Self::new(ROOT_NAMESPACE, name)
    }

    /// `<namespace>.<name>`, or just the name in the root namespace.
    pub fn full_name(&self) -> String {
        if self.namespace == ROOT_NAMESPACE {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// ACL resource naming this page.
    pub fn resource(&self) -> String {
        format!("P.{}", self.full_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: PageRef,
    pub creation_date_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageContent {
    pub page: PageRef,
    /// -1 is the current revision.
    pub revision: i16,
    pub title: String,
    pub user: String,
    pub last_modified: String,
    pub comment: Option<String>,
    pub content: String,
    pub description: Option<String>,
}

pub const CURRENT_REVISION: i16 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: i16,
    pub parent: Option<i16>,
    pub username: String,
    pub subject: String,
    pub date_time: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    pub name: String,
    pub content: String,
}

impl PageInfo {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(PageInfo {
            page: PageRef {
                namespace: row.get("Namespace")?,
                name: row.get("Name")?,
            },
            creation_date_time: row.get("CreationDateTime")?,
        })
    }
}

impl Message {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Message {
            id: row.get("Id")?,
            parent: row.get("Parent")?,
            username: row.get("Username")?,
            subject: row.get("Subject")?,
            date_time: row.get("DateTime")?,
            body: row.get("Body")?,
        })
    }
}

/// Pages, their revisions and discussions, categories, navigation paths and
/// snippets.
pub struct PagesStorageProvider {
    db: Database,
    applied_plan: MigrationPlan,
}

impl PagesStorageProvider {
    pub const PROVIDER_NAME: &'static str = "WikiStore.Sqlite.PagesStorageProvider";
    pub const LEGACY_PROVIDER_NAME: &'static str = "WikiStore.Legacy.SqlitePagesStorageProvider";

    pub fn init(host: &dyn Host, config: &str) -> Result<Self, WikiStoreError> {
        Self::init_with_source(host, config, &BuiltinSchemaSource)
    }

    pub fn init_with_source(
        host: &dyn Host,
        config: &str,
        source: &dyn SchemaSource,
    ) -> Result<Self, WikiStoreError> {
        let config = resolve_configuration(host, config, Self::LEGACY_PROVIDER_NAME)?;
        let legacy = PagesLegacySchema::new(host);
        let (db, applied_plan) = open_domain(Domain::Pages, &config, source, Some(&legacy))?;
        Ok(Self { db, applied_plan })
    }

    pub fn applied_plan(&self) -> &MigrationPlan {
        &self.applied_plan
    }

    pub fn get_pages(&self, namespace: &str) -> Result<Vec<PageInfo>, WikiStoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT Name, Namespace, CreationDateTime FROM Page WHERE Namespace = ?1 ORDER BY Name",
        )?;
        let pages = stmt
            .query_map([namespace], PageInfo::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    pub fn get_page(&self, page: &PageRef) -> Result<Option<PageInfo>, WikiStoreError> {
        let conn = self.db.conn()?;
        let info = conn
            .query_row(
                "SELECT Name, Namespace, CreationDateTime FROM Page WHERE Name = ?1 AND Namespace = ?2",
                [&page.name, &page.namespace],
                PageInfo::from_row,
            )
            .optional()?;
        Ok(info)
    }

    /// Creates a page together with its current revision.
    pub fn add_page(
        &self,
        page: &PageRef,
        title: &str,
        user: &str,
        content: &str,
    ) -> Result<PageInfo, WikiStoreError> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO Page (Name, Namespace, CreationDateTime)
             VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))",
            [&page.name, &page.namespace],
        )?;
        tx.execute(
            "INSERT INTO PageContent (Page, Namespace, Revision, Title, User, LastModified, Content)
             VALUES (?1, ?2, ?3, ?4, ?5, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'), ?6)",
            params![page.name, page.namespace, CURRENT_REVISION, title, user, content],
        )?;
        tx.commit()?;
        drop(conn);

        self.get_page(page)?.ok_or_else(|| {
            WikiStoreError::Error(format!("Page '{}' vanished after insert", page.full_name()))
        })
    }

    pub fn get_content(
        &self,
        page: &PageRef,
        revision: i16,
    ) -> Result<Option<PageContent>, WikiStoreError> {
        let conn = self.db.conn()?;
        let content = conn
            .query_row(
                "SELECT Title, User, LastModified, Comment, Content, Description FROM PageContent
                 WHERE Page = ?1 AND Namespace = ?2 AND Revision = ?3",
                params![page.name, page.namespace, revision],
                |row| {
                    Ok(PageContent {
                        page: page.clone(),
                        revision,
                        title: row.get("Title")?,
                        user: row.get("User")?,
                        last_modified: row.get("LastModified")?,
                        comment: row.get("Comment")?,
                        content: row.get("Content")?,
                        description: row.get("Description")?,
                    })
                },
            )
            .optional()?;
        Ok(content)
    }

    /// Stored backup revisions, oldest first. The current revision is not listed.
    pub fn get_backups(&self, page: &PageRef) -> Result<Vec<i16>, WikiStoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT Revision FROM PageContent
             WHERE Page = ?1 AND Namespace = ?2 AND Revision >= 0 ORDER BY Revision",
        )?;
        let revisions = stmt
            .query_map([&page.name, &page.namespace], |row| row.get(0))?
            .collect::<Result<Vec<i16>, _>>()?;
        Ok(revisions)
    }

    pub fn get_messages(&self, page: &PageRef) -> Result<Vec<Message>, WikiStoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT Id, Parent, Username, Subject, DateTime, Body FROM Message
             WHERE Page = ?1 AND Namespace = ?2 ORDER BY Id",
        )?;
        let messages = stmt
            .query_map([&page.name, &page.namespace], Message::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    pub fn get_categories(&self, namespace: &str) -> Result<Vec<String>, WikiStoreError> {
        self.strings(
            "SELECT Name FROM Category WHERE Namespace = ?1 ORDER BY Name",
            &[namespace],
        )
    }

    pub fn get_category_pages(
        &self,
        namespace: &str,
        category: &str,
    ) -> Result<Vec<String>, WikiStoreError> {
        self.strings(
            "SELECT Page FROM CategoryBinding WHERE Namespace = ?1 AND Category = ?2 ORDER BY Page",
            &[namespace, category],
        )
    }

    pub fn get_page_categories(&self, page: &PageRef) -> Result<Vec<String>, WikiStoreError> {
        self.strings(
            "SELECT Category FROM CategoryBinding WHERE Namespace = ?1 AND Page = ?2 ORDER BY Category",
            &[page.namespace.as_str(), page.name.as_str()],
        )
    }

    pub fn get_navigation_paths(&self, namespace: &str) -> Result<Vec<String>, WikiStoreError> {
        self.strings(
            "SELECT DISTINCT Name FROM NavigationPath WHERE Namespace = ?1 ORDER BY Name",
            &[namespace],
        )
    }

    /// Pages of a navigation path in path order.
    pub fn get_navigation_path(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<String>, WikiStoreError> {
        self.strings(
            "SELECT Page FROM NavigationPath WHERE Namespace = ?1 AND Name = ?2 ORDER BY Number",
            &[namespace, name],
        )
    }

    pub fn get_snippets(&self) -> Result<Vec<Snippet>, WikiStoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare("SELECT Name, Content FROM Snippet ORDER BY Name")?;
        let snippets = stmt
            .query_map([], |row| {
                Ok(Snippet {
                    name: row.get(0)?,
                    content: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snippets)
    }

    fn strings(&self, sql: &str, args: &[&str]) -> Result<Vec<String>, WikiStoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let values = stmt
            .query_map(rusqlite::params_from_iter(args), |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeHost, TestStore};
    use crate::upgrade::MigrationAction;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_name_and_resource() {
        assert_eq!(PageRef::root("Home").full_name(), "Home");
        assert_eq!(PageRef::new("Docs", "Intro").full_name(), "Docs.Intro");
        assert_eq!(PageRef::new("Docs", "Intro").resource(), "P.Docs.Intro");
    }

    #[test]
    fn test_add_and_read_page() {
        let store = TestStore::new();
        let provider = PagesStorageProvider::init(&FakeHost::new(), &store.conn_str).unwrap();
        assert!(provider.applied_plan().has_action(MigrationAction::CreateFresh));

        let home = PageRef::root("Home");
        provider.add_page(&home, "Welcome", "admin", "Hello").unwrap();

        let pages = provider.get_pages(ROOT_NAMESPACE).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page, home);

        let content = provider.get_content(&home, CURRENT_REVISION).unwrap().unwrap();
        assert_eq!(content.title, "Welcome");
        assert_eq!(content.content, "Hello");
        assert!(provider.get_backups(&home).unwrap().is_empty());
        assert_eq!(provider.get_content(&home, 0).unwrap(), None);
    }

    #[test]
    fn test_reads_migrated_structure() {
        let store = TestStore::new();
        let provider = PagesStorageProvider::init(&FakeHost::new(), &store.conn_str).unwrap();
        store.exec(
            r#"
            INSERT INTO Page VALUES ('Home', '', '2008-01-01');
            INSERT INTO Page VALUES ('Tour2', '', '2008-01-02');
            INSERT INTO PageContent (Page, Namespace, Revision, Title, User, LastModified, Content)
                VALUES ('Home', '', 0, 'Old', 'ann', '2007-12-31', 'old'), ('Home', '', 1, 'Mid', 'ann', '2008-01-01', 'mid');
            INSERT INTO Message VALUES ('Home', '', 1, NULL, 'ann', 'Hi', '2008-01-03', 'first');
            INSERT INTO Message VALUES ('Home', '', 2, 1, 'bob', 'Re: Hi', '2008-01-04', 'second');
            INSERT INTO Category VALUES ('General', '');
            INSERT INTO CategoryBinding VALUES ('', 'General', 'Home');
            INSERT INTO NavigationPath VALUES ('Tour', '', 'Tour2', 1);
            INSERT INTO NavigationPath VALUES ('Tour', '', 'Home', 0);
            INSERT INTO Snippet VALUES ('sig', '-- me');
            "#,
        );

        let home = PageRef::root("Home");
        assert_eq!(provider.get_backups(&home).unwrap(), vec![0, 1]);
        let parents: Vec<Option<i16>> = provider
            .get_messages(&home)
            .unwrap()
            .into_iter()
            .map(|m| m.parent)
            .collect();
        assert_eq!(parents, vec![None, Some(1)]);
        assert_eq!(provider.get_categories(ROOT_NAMESPACE).unwrap(), vec!["General"]);
        assert_eq!(
            provider.get_category_pages(ROOT_NAMESPACE, "General").unwrap(),
            vec!["Home"]
        );
        assert_eq!(provider.get_page_categories(&home).unwrap(), vec!["General"]);
        assert_eq!(provider.get_navigation_paths(ROOT_NAMESPACE).unwrap(), vec!["Tour"]);
        assert_eq!(
            provider.get_navigation_path(ROOT_NAMESPACE, "Tour").unwrap(),
            vec!["Home", "Tour2"]
        );
        assert_eq!(provider.get_snippets().unwrap()[0].name, "sig");
    }

    #[test]
    fn test_duplicate_page_is_rejected() {
        let store = TestStore::new();
        let provider = PagesStorageProvider::init(&FakeHost::new(), &store.conn_str).unwrap();
        let page = PageRef::root("Home");
        provider.add_page(&page, "A", "ann", "a").unwrap();
        assert!(provider.add_page(&page, "B", "bob", "b").is_err());
        assert_eq!(provider.get_content(&page, CURRENT_REVISION).unwrap().unwrap().title, "A");
    }
}
