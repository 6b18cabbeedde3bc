use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::database::Database;
use crate::domain::Domain;
use crate::error::WikiStoreError;
use crate::host::Host;
use crate::providers::{open_domain, resolve_configuration};
use crate::schema::{BuiltinSchemaSource, SchemaSource};
use crate::upgrade::{MigrationPlan, UsersLegacySchema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserGroup {
    pub name: String,
    pub description: Option<String>,
}

impl UserGroup {
    pub fn new(name: &str, description: &str) -> Self {
        UserGroup {
            name: name.to_owned(),
            description: Some(description.to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub username: String,
    pub display_name: Option<String>,
    pub email: String,
    pub active: bool,
    pub date_time: String,
}

impl UserInfo {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(UserInfo {
            username: row.get("Username")?,
            display_name: row.get("DisplayName")?,
            email: row.get("Email")?,
            active: row.get("Active")?,
            date_time: row.get("DateTime")?,
        })
    }
}

pub(crate) struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub email: String,
    pub active: bool,
    /// Stored as given; `Null` stamps the current time.
    pub date_time: Value,
}

pub(crate) fn insert_user(conn: &Connection, user: &NewUser) -> Result<(), WikiStoreError> {
    conn.execute(
        "INSERT INTO \"User\" (Username, PasswordHash, DisplayName, Email, Active, DateTime)
         VALUES (?1, ?2, ?3, ?4, ?5, COALESCE(?6, strftime('%Y-%m-%dT%H:%M:%SZ', 'now')))",
        params![
            user.username,
            user.password_hash,
            user.display_name,
            user.email,
            user.active,
            user.date_time
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_user_group(conn: &Connection, group: &UserGroup) -> Result<(), WikiStoreError> {
    conn.execute(
        "INSERT INTO UserGroup (Name, Description) VALUES (?1, ?2)",
        params![group.name, group.description],
    )?;
    Ok(())
}

/// Replaces the memberships of `username` with `groups`.
pub(crate) fn set_membership(
    conn: &Connection,
    username: &str,
    groups: &[&str],
) -> Result<(), WikiStoreError> {
    conn.execute("DELETE FROM UserGroupMembership WHERE User = ?1", [username])?;
    let mut stmt =
        conn.prepare("INSERT INTO UserGroupMembership (User, UserGroup) VALUES (?1, ?2)")?;
    for group in groups {
        stmt.execute(params![username, group])?;
    }
    Ok(())
}

/// Accounts, groups and memberships.
pub struct UsersStorageProvider {
    db: Database,
    applied_plan: MigrationPlan,
}

impl UsersStorageProvider {
    pub const PROVIDER_NAME: &'static str = "WikiStore.Sqlite.UsersStorageProvider";
    pub const LEGACY_PROVIDER_NAME: &'static str = "WikiStore.Legacy.SqliteUsersStorageProvider";

    pub fn init(host: &dyn Host, config: &str) -> Result<Self, WikiStoreError> {
        Self::init_with_source(host, config, &BuiltinSchemaSource)
    }

    pub fn init_with_source(
        host: &dyn Host,
        config: &str,
        source: &dyn SchemaSource,
    ) -> Result<Self, WikiStoreError> {
        let config = resolve_configuration(host, config, Self::LEGACY_PROVIDER_NAME)?;
        let legacy = UsersLegacySchema::new(host);
        let (db, applied_plan) = open_domain(Domain::Users, &config, source, Some(&legacy))?;
        Ok(Self { db, applied_plan })
    }

    pub fn applied_plan(&self) -> &MigrationPlan {
        &self.applied_plan
    }

    pub fn get_users(&self) -> Result<Vec<UserInfo>, WikiStoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT Username, DisplayName, Email, Active, DateTime FROM \"User\" ORDER BY Username",
        )?;
        let users = stmt
            .query_map([], UserInfo::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn get_user(&self, username: &str) -> Result<Option<UserInfo>, WikiStoreError> {
        let conn = self.db.conn()?;
        let user = conn
            .query_row(
                "SELECT Username, DisplayName, Email, Active, DateTime FROM \"User\" WHERE Username = ?1",
                [username],
                UserInfo::from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn add_user(
        &self,
        username: &str,
        password_hash: &str,
        display_name: Option<&str>,
        email: &str,
        active: bool,
    ) -> Result<UserInfo, WikiStoreError> {
        let conn = self.db.conn()?;
        insert_user(
            &conn,
            &NewUser {
                username: username.to_owned(),
                password_hash: password_hash.to_owned(),
                display_name: display_name.map(str::to_owned),
                email: email.to_owned(),
                active,
                date_time: Value::Null,
            },
        )?;
        drop(conn);

        self.get_user(username)?
            .ok_or_else(|| WikiStoreError::Error(format!("User '{}' vanished after insert", username)))
    }

    pub fn get_user_groups(&self) -> Result<Vec<UserGroup>, WikiStoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare("SELECT Name, Description FROM UserGroup ORDER BY Name")?;
        let groups = stmt
            .query_map([], |row| {
                Ok(UserGroup {
                    name: row.get(0)?,
                    description: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    pub fn add_user_group(&self, name: &str, description: &str) -> Result<UserGroup, WikiStoreError> {
        let group = UserGroup::new(name, description);
        let conn = self.db.conn()?;
        insert_user_group(&conn, &group)?;
        Ok(group)
    }

    pub fn set_user_membership(&self, username: &str, groups: &[&str]) -> Result<(), WikiStoreError> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;
        set_membership(&tx, username, groups)?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_user_membership(&self, username: &str) -> Result<Vec<String>, WikiStoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT UserGroup FROM UserGroupMembership WHERE User = ?1 ORDER BY UserGroup",
        )?;
        let groups = stmt
            .query_map([username], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(groups)
    }
}
