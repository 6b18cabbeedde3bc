use log::{debug, warn};
use rusqlite::Connection;

use crate::database::quote_ident;
use crate::error::WikiStoreError;

struct SuspendedTrigger {
    name: String,
    sql: String,
}

/// Suspends the foreign keys and triggers of one table for the lifetime of the
/// guard, on the connection that will perform the structural edits.
///
/// Best effort only. Every individual disable or enable that fails is logged
/// and skipped. Restoration runs from [`ConstraintGuard::restore`] or, failing
/// that, from `Drop`, so it is attempted on error paths as well.
///
/// SQLite cannot disable a single foreign key, so when the table declares any
/// the guard switches enforcement off for the whole connection and puts back
/// whatever setting it found. Triggers are dropped and later re-created from
/// the SQL stored in `sqlite_master`. Guards on several tables nest: only the
/// outermost one that actually switched enforcement off switches it back on.
pub struct ConstraintGuard<'c> {
    conn: &'c Connection,
    table: String,
    foreign_keys_disabled: bool,
    triggers: Vec<SuspendedTrigger>,
    restored: bool,
}

impl<'c> ConstraintGuard<'c> {
    pub fn suspend(conn: &'c Connection, table: &str) -> Self {
        let mut guard = ConstraintGuard {
            conn,
            table: table.to_owned(),
            foreign_keys_disabled: false,
            triggers: Vec::new(),
            restored: false,
        };

        if let Err(e) = guard.suspend_foreign_keys() {
            warn!("Could not suspend foreign keys on {}: {}", guard.table, e);
        }
        if let Err(e) = guard.suspend_triggers() {
            warn!("Could not enumerate triggers on {}: {}", guard.table, e);
        }

        debug!(
            "Suspended constraints on {} (foreign keys: {}, triggers: {})",
            guard.table,
            guard.foreign_keys_disabled,
            guard.triggers.len()
        );
        guard
    }

    pub fn suspended_trigger_count(&self) -> usize {
        self.triggers.len()
    }

    pub fn restore(mut self) {
        self.restore_all();
    }

    fn suspend_foreign_keys(&mut self) -> Result<(), WikiStoreError> {
        let fk_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pragma_foreign_key_list(?1)",
            [&self.table],
            |row| row.get(0),
        )?;
        if fk_count == 0 || !foreign_keys_enabled(self.conn)? {
            return Ok(());
        }

        self.conn
            .execute_batch("PRAGMA foreign_keys = OFF;")
            .map_err(|e| transient("disable foreign keys", &self.table, e))?;
        self.foreign_keys_disabled = true;
        Ok(())
    }

    fn suspend_triggers(&mut self) -> Result<(), WikiStoreError> {
        let found = {
            let mut stmt = self.conn.prepare(
                "SELECT name, sql FROM sqlite_master
                 WHERE type = 'trigger' AND lower(tbl_name) = lower(?1)
                 ORDER BY name",
            )?;
            let rows = stmt
                .query_map([&self.table], |row| {
                    Ok(SuspendedTrigger {
                        name: row.get(0)?,
                        sql: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        // Statement finalized above; DDL below must not race an open cursor
        for trigger in found {
            let drop_sql = format!("DROP TRIGGER IF EXISTS {};", quote_ident(&trigger.name));
            match self.conn.execute_batch(&drop_sql) {
                Ok(()) => self.triggers.push(trigger),
                Err(e) => warn!("{}", transient("disable trigger", &trigger.name, e)),
            }
        }
        Ok(())
    }

    fn restore_all(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;

        for trigger in self.triggers.drain(..) {
            if let Err(e) = self.conn.execute_batch(&trigger.sql) {
                warn!("{}", transient("re-enable trigger", &trigger.name, e));
            }
        }

        if self.foreign_keys_disabled {
            if let Err(e) = self.conn.execute_batch("PRAGMA foreign_keys = ON;") {
                warn!("{}", transient("re-enable foreign keys", &self.table, e));
                return;
            }
            match count_violations(self.conn, &self.table) {
                Ok(0) => {}
                Ok(n) => warn!(
                    "{} foreign key violation(s) remain in {} after restoring constraints",
                    n, self.table
                ),
                Err(e) => warn!("Foreign key check failed on {}: {}", self.table, e),
            }
        }

        debug!("Restored constraints on {}", self.table);
    }
}

impl Drop for ConstraintGuard<'_> {
    fn drop(&mut self) {
        self.restore_all();
    }
}

pub fn foreign_keys_enabled(conn: &Connection) -> Result<bool, WikiStoreError> {
    let enabled: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    Ok(enabled != 0)
}

fn count_violations(conn: &Connection, table: &str) -> Result<usize, WikiStoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_check({})", quote_ident(table)))?;
    let mut rows = stmt.query([])?;
    let mut count = 0;
    while rows.next()?.is_some() {
        count += 1;
    }
    Ok(count)
}

fn transient(what: &str, target: &str, e: rusqlite::Error) -> WikiStoreError {
    WikiStoreError::TransientBackendError(format!("Failed to {} on {}: {}", what, target, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE Parent (Name TEXT PRIMARY KEY);
            CREATE TABLE Child (
                Name TEXT NOT NULL,
                Parent TEXT NOT NULL REFERENCES Parent (Name)
            );
            CREATE TABLE Audit (Entry TEXT NOT NULL);
            CREATE TRIGGER Child_Audit AFTER UPDATE ON Child
            BEGIN
                INSERT INTO Audit (Entry) VALUES (NEW.Name);
            END;
            INSERT INTO Parent VALUES ('a.b');
            INSERT INTO Child VALUES ('c1', 'a.b');
            "#,
        )
        .unwrap();
        conn
    }

    fn trigger_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_suspend_allows_out_of_order_rename() {
        let conn = setup();

        let guard = ConstraintGuard::suspend(&conn, "Child");
        assert_eq!(guard.suspended_trigger_count(), 1);
        assert!(!foreign_keys_enabled(&conn).unwrap());

        // Child first, so the reference dangles until Parent catches up
        conn.execute("UPDATE Child SET Parent = 'a_b' WHERE Parent = 'a.b'", [])
            .unwrap();
        conn.execute("UPDATE Parent SET Name = 'a_b' WHERE Name = 'a.b'", [])
            .unwrap();
        guard.restore();

        assert!(foreign_keys_enabled(&conn).unwrap());
        assert_eq!(trigger_count(&conn), 1);
        let audited: i64 = conn
            .query_row("SELECT COUNT(*) FROM Audit", [], |row| row.get(0))
            .unwrap();
        assert_eq!(audited, 0, "trigger must not fire while suspended");
        assert_eq!(count_violations(&conn, "Child").unwrap(), 0);
    }

    #[test]
    fn test_table_without_foreign_keys_leaves_enforcement_alone() {
        let conn = setup();
        let guard = ConstraintGuard::suspend(&conn, "Audit");
        assert!(foreign_keys_enabled(&conn).unwrap());
        assert_eq!(guard.suspended_trigger_count(), 0);
    }

    #[test]
    fn test_drop_restores() {
        let conn = setup();
        {
            let _guard = ConstraintGuard::suspend(&conn, "Child");
            assert_eq!(trigger_count(&conn), 0);
        }
        assert_eq!(trigger_count(&conn), 1);
        assert!(foreign_keys_enabled(&conn).unwrap());
    }

    #[test]
    fn test_nested_guards_restore_enforcement_once() {
        let conn = setup();
        let outer = ConstraintGuard::suspend(&conn, "Child");
        let inner = ConstraintGuard::suspend(&conn, "Child");
        inner.restore();
        assert!(!foreign_keys_enabled(&conn).unwrap());
        outer.restore();
        assert!(foreign_keys_enabled(&conn).unwrap());
    }

    #[test]
    fn test_restore_failure_is_swallowed() {
        let conn = setup();
        let guard = ConstraintGuard::suspend(&conn, "Child");

        // Something else re-created the trigger meanwhile, so re-creating it fails
        conn.execute_batch(
            "CREATE TRIGGER Child_Audit AFTER UPDATE ON Child BEGIN SELECT 1; END;",
        )
        .unwrap();
        guard.restore();

        assert!(foreign_keys_enabled(&conn).unwrap());
        assert_eq!(trigger_count(&conn), 1);
    }

    #[test]
    fn test_violations_are_reported_not_raised() {
        let conn = setup();
        let guard = ConstraintGuard::suspend(&conn, "Child");
        conn.execute("INSERT INTO Child VALUES ('orphan', 'missing')", [])
            .unwrap();
        guard.restore();
        assert!(foreign_keys_enabled(&conn).unwrap());
        assert_eq!(count_violations(&conn, "Child").unwrap(), 1);
    }
}
