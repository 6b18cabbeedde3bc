use log::{debug, info, Level};
use logging_timer::timer;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

use crate::constraint_guard::ConstraintGuard;
use crate::database::Database;
use crate::error::WikiStoreError;
use crate::host::Host;
use crate::permissions::{PermissionFlag, PermissionTranslator};
use crate::providers::pages::{PageRef, ROOT_NAMESPACE};
use crate::sanitizer::IdentifierRenameMap;

use super::{legacy_name, legacy_read_error, LegacySchema};

pub const PAGES_LEGACY_MARKER: &str = "PagesProviderVersion";

const PAGES_LEGACY_TABLES: &[&str] = &[
    "Page",
    "PageContent",
    "Category",
    "CategoryBinding",
    "Message",
    "Snippet",
    "NavigationPath",
    "NavigationPathBinding",
    PAGES_LEGACY_MARKER,
];

/// Parent value the predecessor used for top-level messages.
const LEGACY_NO_PARENT: i64 = -1;

/// Columns that hold a page name, by table.
const PAGE_NAME_REFERENCES: &[(&str, &str)] = &[
    ("PageContent", "Page"),
    ("PageKeyword", "Page"),
    ("Message", "Page"),
    ("NavigationPath", "Page"),
    ("CategoryBinding", "Page"),
];

/// Columns that hold a category name, by table.
const CATEGORY_NAME_REFERENCES: &[(&str, &str)] = &[("CategoryBinding", "Category")];

/// Carries the predecessor Pages schema forward.
///
/// After the tables are set aside and the current schema created, the data is
/// copied over entity by entity. Names containing the namespace separator are
/// then repaired in place with the dependent tables' constraints suspended,
/// and finally the legacy page statuses are handed to the host as ACL entries.
pub struct PagesLegacySchema<'h> {
    host: &'h dyn Host,
}

impl<'h> PagesLegacySchema<'h> {
    pub fn new(host: &'h dyn Host) -> Self {
        Self { host }
    }
}

impl LegacySchema for PagesLegacySchema<'_> {
    fn marker_table(&self) -> &'static str {
        PAGES_LEGACY_MARKER
    }

    fn legacy_tables(&self) -> &'static [&'static str] {
        PAGES_LEGACY_TABLES
    }

    fn migrate(&self, db: &Database) -> Result<(), WikiStoreError> {
        let _tmr = timer!(Level::Info; "PagesLegacySchema::migrate");
        let conn = db.conn()?;

        let statuses = copy_entities(&conn)?;

        let page_renames = repair_names(&conn, "Page", PAGE_NAME_REFERENCES)?;
        let category_renames = repair_names(&conn, "Category", CATEGORY_NAME_REFERENCES)?;
        info!(
            "Renamed {} pages and {} categories containing the namespace separator",
            page_renames.len(),
            category_renames.len()
        );

        self.translate_permissions(&statuses, &page_renames)
    }
}

impl PagesLegacySchema<'_> {
    fn translate_permissions(
        &self,
        statuses: &[(String, PermissionFlag)],
        page_renames: &IdentifierRenameMap,
    ) -> Result<(), WikiStoreError> {
        let translator = PermissionTranslator::from_host(self.host);
        let mut entries = 0;
        let mut pages = 0;

        for (name, flag) in statuses.iter().filter(|(_, f)| *f != PermissionFlag::Normal) {
            let page = PageRef::root(&page_renames.resolve(name));
            entries += translator.upgrade_entity_permission_to_acl(self.host, &page, *flag)?;
            pages += 1;
        }

        info!("Translated the status of {} pages into {} ACL entries", pages, entries);
        Ok(())
    }
}

/// Copies every legacy row into the current tables and returns the status
/// flag recorded for each page, in legacy order.
fn copy_entities(conn: &Connection) -> Result<Vec<(String, PermissionFlag)>, WikiStoreError> {
    let root = || Value::Text(ROOT_NAMESPACE.to_owned());

    copy_rows(
        conn,
        "snippets",
        "SELECT Name, Content FROM Snippet",
        "INSERT INTO Snippet (Name, Content) VALUES (?1, ?2)",
        |row| Ok(vec![row.get::<_, Value>("Name")?, row.get::<_, Value>("Content")?]),
    )?;

    let mut statuses = Vec::new();
    copy_rows(
        conn,
        "pages",
        "SELECT Name, CreationDateTime, Status FROM Page",
        "INSERT INTO Page (Name, Namespace, CreationDateTime) VALUES (?1, ?2, ?3)",
        |row| {
            let name: String = row.get("Name")?;
            let status: Option<String> = row.get("Status")?;
            let flag = PermissionFlag::from_code(status.as_deref().unwrap_or_default())
                .map_err(|e| WikiStoreError::MigrationDataError(format!("Page '{}': {}", name, e)))?;
            statuses.push((name.clone(), flag));
            Ok(vec![
                Value::Text(name),
                root(),
                row.get::<_, Value>("CreationDateTime")?,
            ])
        },
    )?;

    copy_rows(
        conn,
        "page revisions",
        "SELECT Page, Revision, Title, Username, DateTime, Comment, Content FROM PageContent",
        "INSERT INTO PageContent
             (Page, Namespace, Revision, Title, User, LastModified, Comment, Content, Description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)",
        |row| {
            let page: String = row.get("Page")?;
            let revision = narrow(row.get("Revision")?, "Revision", &page)?;
            Ok(vec![
                Value::Text(page),
                root(),
                Value::from(revision),
                row.get::<_, Value>("Title")?,
                row.get::<_, Value>("Username")?,
                row.get::<_, Value>("DateTime")?,
                row.get::<_, Value>("Comment")?,
                row.get::<_, Value>("Content")?,
            ])
        },
    )?;

    copy_rows(
        conn,
        "messages",
        "SELECT Page, ID, Parent, Username, Subject, DateTime, Body FROM Message",
        "INSERT INTO Message (Page, Namespace, Id, Parent, Username, Subject, DateTime, Body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        |row| {
            let page: String = row.get("Page")?;
            let id = narrow(row.get("ID")?, "Message id", &page)?;
            let parent = parent_reference(row.get("Parent")?, &page)?;
            Ok(vec![
                Value::Text(page),
                root(),
                Value::from(id),
                Value::from(parent),
                row.get::<_, Value>("Username")?,
                row.get::<_, Value>("Subject")?,
                row.get::<_, Value>("DateTime")?,
                row.get::<_, Value>("Body")?,
            ])
        },
    )?;

    copy_rows(
        conn,
        "categories",
        "SELECT Name FROM Category",
        "INSERT INTO Category (Name, Namespace) VALUES (?1, ?2)",
        |row| Ok(vec![row.get::<_, Value>("Name")?, root()]),
    )?;

    copy_rows(
        conn,
        "category bindings",
        "SELECT Category, Page FROM CategoryBinding",
        "INSERT INTO CategoryBinding (Namespace, Category, Page) VALUES (?1, ?2, ?3)",
        |row| {
            Ok(vec![
                root(),
                row.get::<_, Value>("Category")?,
                row.get::<_, Value>("Page")?,
            ])
        },
    )?;

    copy_rows(
        conn,
        "navigation path entries",
        "SELECT NavigationPath, Page, Number FROM NavigationPathBinding",
        "INSERT INTO NavigationPath (Name, Namespace, Page, Number) VALUES (?1, ?2, ?3, ?4)",
        |row| {
            let path: String = row.get("NavigationPath")?;
            let number = narrow(row.get("Number")?, "Navigation path position", &path)?;
            Ok(vec![
                Value::Text(path),
                root(),
                row.get::<_, Value>("Page")?,
                Value::from(number),
            ])
        },
    )?;

    Ok(statuses)
}

/// Streams `select` over the `_legacy` copy of the source table and writes
/// each transformed row with `insert`. Returns the number of rows copied.
fn copy_rows<F>(
    conn: &Connection,
    what: &str,
    select: &str,
    insert: &str,
    mut transform: F,
) -> Result<usize, WikiStoreError>
where
    F: FnMut(&Row<'_>) -> Result<Vec<Value>, WikiStoreError>,
{
    let table = source_table(select).unwrap_or(what).to_owned();
    let select = legacy_select(select);
    let mut reader = conn.prepare(&select)?;
    let mut writer = conn.prepare(insert)?;

    let mut rows = reader.query([])?;
    let mut copied = 0;
    while let Some(row) = rows.next()? {
        // Inserts happen below, so a database error here is a failed read
        let values = transform(row).map_err(|e| match e {
            WikiStoreError::DatabaseError(err) => legacy_read_error(row, &table, err),
            other => other,
        })?;
        writer.execute(params_from_iter(values))?;
        copied += 1;
    }

    info!("Copied {} legacy {}", copied, what);
    Ok(copied)
}

fn source_table(select: &str) -> Option<&str> {
    select.rsplit_once(" FROM ").map(|(_, table)| table.trim())
}

/// Points `SELECT ... FROM <table>` at the set-aside copy of the table.
fn legacy_select(select: &str) -> String {
    match (select.rsplit_once(" FROM "), source_table(select)) {
        (Some((columns, _)), Some(table)) => format!("{} FROM {}", columns, legacy_name(table)),
        _ => select.to_owned(),
    }
}

fn narrow(value: i64, what: &str, owner: &str) -> Result<i16, WikiStoreError> {
    i16::try_from(value).map_err(|_| {
        WikiStoreError::MigrationDataError(format!(
            "{} {} of '{}' is out of range for the current schema",
            what, value, owner
        ))
    })
}

fn parent_reference(parent: Option<i64>, page: &str) -> Result<Option<i16>, WikiStoreError> {
    match parent {
        None | Some(LEGACY_NO_PARENT) => Ok(None),
        Some(id) => narrow(id, "Message parent", page).map(Some),
    }
}

/// Replaces the namespace separator in every name held by `owner` within the
/// root namespace, along with every column in `references` that points at it.
///
/// The owner row and its references are renamed separately, so the dependent
/// tables' foreign keys and triggers are suspended until all renames are done.
fn repair_names(
    conn: &Connection,
    owner: &str,
    references: &[(&str, &str)],
) -> Result<IdentifierRenameMap, WikiStoreError> {
    let names: Vec<String> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT Name FROM {} WHERE Namespace = ?1 ORDER BY Name",
            owner
        ))?;
        let rows = stmt
            .query_map([ROOT_NAMESPACE], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        rows
    };

    let renames = IdentifierRenameMap::from_names(&names);
    if renames.is_empty() {
        return Ok(renames);
    }

    let mut guarded: Vec<&str> = Vec::new();
    for (table, _) in references {
        if !guarded.contains(table) {
            guarded.push(*table);
        }
    }
    let guards: Vec<ConstraintGuard> = guarded
        .iter()
        .map(|table| ConstraintGuard::suspend(conn, table))
        .collect();

    for (original, sanitized) in renames.iter() {
        let taken: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE Name = ?1 AND Namespace = ?2",
                owner
            ),
            [sanitized, ROOT_NAMESPACE],
            |row| row.get(0),
        )?;
        if taken > 0 {
            return Err(WikiStoreError::MigrationDataError(format!(
                "Cannot rename {} '{}' to '{}': the name is already in use",
                owner, original, sanitized
            )));
        }

        conn.execute(
            &format!(
                "UPDATE {} SET Name = ?1 WHERE Name = ?2 AND Namespace = ?3",
                owner
            ),
            [sanitized, original, ROOT_NAMESPACE],
        )?;
        for (table, column) in references {
            let updated = conn.execute(
                &format!(
                    "UPDATE {} SET {} = ?1 WHERE {} = ?2 AND Namespace = ?3",
                    table, column, column
                ),
                [sanitized, original, ROOT_NAMESPACE],
            )?;
            debug!("{}.{}: '{}' -> '{}' ({} rows)", table, column, original, sanitized, updated);
        }
    }

    for guard in guards.into_iter().rev() {
        guard.restore();
    }
    Ok(renames)
}
