use log::{info, Level};
use logging_timer::timer;
use rusqlite::types::Value;
use rusqlite::Row;

use crate::database::Database;
use crate::error::WikiStoreError;
use crate::host::{resolve_setting, Host, SettingName};
use crate::providers::users::{insert_user, insert_user_group, set_membership, NewUser, UserGroup};

use super::{legacy_name, legacy_read_error, LegacySchema};

pub const USERS_LEGACY_MARKER: &str = "UsersProviderVersion";

const USERS_LEGACY_TABLES: &[&str] = &["User", USERS_LEGACY_MARKER];

/// Carries the predecessor Users schema forward.
///
/// The predecessor knew a single per-user admin flag. It becomes membership
/// in one of two built-in groups, and the host is asked to grant those groups
/// the rights the flag used to imply.
pub struct UsersLegacySchema<'h> {
    host: &'h dyn Host,
}

impl<'h> UsersLegacySchema<'h> {
    pub fn new(host: &'h dyn Host) -> Self {
        Self { host }
    }

    fn builtin_groups(&self) -> Result<(UserGroup, UserGroup), WikiStoreError> {
        let administrators = UserGroup::new(
            &resolve_setting(self.host, SettingName::AdministratorsGroup),
            "Built-in Administrators",
        );
        let users = UserGroup::new(
            &resolve_setting(self.host, SettingName::UsersGroup),
            "Built-in Users",
        );
        if administrators.name == users.name {
            return Err(WikiStoreError::InvalidConfiguration(format!(
                "Administrators and users share the group name '{}'",
                users.name
            )));
        }
        Ok((administrators, users))
    }
}

impl LegacySchema for UsersLegacySchema<'_> {
    fn marker_table(&self) -> &'static str {
        USERS_LEGACY_MARKER
    }

    fn legacy_tables(&self) -> &'static [&'static str] {
        USERS_LEGACY_TABLES
    }

    fn migrate(&self, db: &Database) -> Result<(), WikiStoreError> {
        let _tmr = timer!(Level::Info; "UsersLegacySchema::migrate");
        let (administrators, users) = self.builtin_groups()?;
        let conn = db.conn()?;

        insert_user_group(&conn, &administrators)?;
        insert_user_group(&conn, &users)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT Username, PasswordHash, Email, DateTime, Active, Admin FROM \"{}\"",
            legacy_name("User")
        ))?;
        let mut rows = stmt.query([])?;
        let mut copied = 0;
        let mut admins = 0;

        while let Some(row) = rows.next()? {
            let (user, is_admin) =
                read_user(row).map_err(|e| legacy_read_error(row, "User", e))?;
            insert_user(&conn, &user)?;

            let group = if is_admin { &administrators } else { &users };
            set_membership(&conn, &user.username, &[group.name.as_str()])?;

            copied += 1;
            if is_admin {
                admins += 1;
            }
        }
        info!("Copied {} legacy users ({} administrators)", copied, admins);

        self.host
            .upgrade_security_flags_to_groups_acl(&administrators, &users)
    }
}

/// A legacy user row and its admin flag.
fn read_user(row: &Row<'_>) -> rusqlite::Result<(NewUser, bool)> {
    let user = NewUser {
        username: row.get("Username")?,
        password_hash: row.get("PasswordHash")?,
        display_name: None,
        email: row.get("Email")?,
        active: row.get("Active")?,
        date_time: row.get::<_, Value>("DateTime")?,
    };
    Ok((user, row.get("Admin")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::registry::SchemaVersionRegistry;
    use crate::schema::BuiltinSchemaSource;
    use crate::test_support::{FakeHost, TestStore};
    use crate::upgrade::{MigrationAction, UpgradeOrchestrator};
    use pretty_assertions::assert_eq;

    const LEGACY_USERS_SQL: &str = r#"
        CREATE TABLE UsersProviderVersion (Version TEXT NOT NULL);
        INSERT INTO UsersProviderVersion VALUES ('2.0');
        CREATE TABLE "User" (
            Username TEXT PRIMARY KEY,
            PasswordHash TEXT NOT NULL,
            Email TEXT NOT NULL,
            DateTime TEXT NOT NULL,
            Active INTEGER NOT NULL,
            Admin INTEGER NOT NULL
        );
        INSERT INTO "User" VALUES ('admin', 'h1', 'admin@example.com', '2007-01-01', 1, 1);
        INSERT INTO "User" VALUES ('ann', 'h2', 'ann@example.com', '2007-02-01', 1, 0);
        INSERT INTO "User" VALUES ('bob', 'h3', 'bob@example.com', '2007-03-01', 0, 0);
    "#;

    fn migrate(store: &TestStore, host: &FakeHost) -> Result<(), WikiStoreError> {
        let legacy = UsersLegacySchema::new(host);
        let source = BuiltinSchemaSource;
        let plan = UpgradeOrchestrator::new(&store.db, &source)
            .ensure_current(Domain::Users, Some(&legacy))?;
        assert!(plan.has_action(MigrationAction::MigrateLegacy));
        Ok(())
    }

    #[test]
    fn test_admin_flag_becomes_membership() {
        let store = TestStore::new();
        store.exec(LEGACY_USERS_SQL);
        let host = FakeHost::new();
        migrate(&store, &host).unwrap();

        assert_eq!(
            store.strings("SELECT UserGroup FROM UserGroupMembership WHERE User = 'admin'"),
            vec!["Administrators"]
        );
        assert_eq!(
            store.strings(
                "SELECT User FROM UserGroupMembership WHERE UserGroup = 'Users' ORDER BY User"
            ),
            vec!["ann", "bob"]
        );
        assert_eq!(store.count("SELECT COUNT(*) FROM \"User\" WHERE Active = 0"), 1);
        assert_eq!(
            store.strings("SELECT Description FROM UserGroup ORDER BY Name"),
            vec!["Built-in Administrators", "Built-in Users"]
        );
        assert_eq!(
            host.security_upgrades(),
            vec![("Administrators".to_owned(), "Users".to_owned())]
        );
    }

    #[test]
    fn test_group_names_come_from_host() {
        let store = TestStore::new();
        store.exec(LEGACY_USERS_SQL);
        let host = FakeHost::new()
            .with_setting(SettingName::AdministratorsGroup, "Admins")
            .with_setting(SettingName::UsersGroup, "Members");
        migrate(&store, &host).unwrap();

        assert_eq!(
            store.strings("SELECT Name FROM UserGroup ORDER BY Name"),
            vec!["Admins", "Members"]
        );
        assert_eq!(host.security_upgrades(), vec![("Admins".to_owned(), "Members".to_owned())]);
    }

    #[test]
    fn test_same_group_name_is_refused() {
        let store = TestStore::new();
        store.exec(LEGACY_USERS_SQL);
        let host = FakeHost::new()
            .with_setting(SettingName::AdministratorsGroup, "Everyone")
            .with_setting(SettingName::UsersGroup, "Everyone");

        let result = migrate(&store, &host);
        assert!(matches!(result, Err(WikiStoreError::InvalidConfiguration(_))));
        assert!(host.security_upgrades().is_empty());
    }

    #[test]
    fn test_wrong_typed_value_aborts_without_stamping() {
        let store = TestStore::new();
        store.exec(LEGACY_USERS_SQL);
        store.exec(
            "INSERT INTO \"User\" VALUES ('carl', 'h4', 'carl@example.com', '2007-04-01', 1, 'yes');",
        );
        let host = FakeHost::new();

        match migrate(&store, &host) {
            Err(WikiStoreError::MigrationDataError(msg)) => {
                assert!(msg.contains("User.Admin"), "{}", msg);
                assert!(msg.contains("'carl'"), "{}", msg);
            }
            other => panic!("expected a migration data error, got {:?}", other),
        }

        let registry = SchemaVersionRegistry::new(&store.db);
        assert_eq!(registry.installed_version(Domain::Users).unwrap(), None);
        assert_eq!(store.count("SELECT COUNT(*) FROM User_legacy"), 4);
        assert!(host.security_upgrades().is_empty());
    }
}
