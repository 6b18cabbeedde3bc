mod files;
mod pages;
mod pages_v3000_to_v3001;
mod settings;
mod users;

use crate::domain::Domain;

pub use files::CREATE_FILES_SQL;
pub use pages::CREATE_PAGES_SQL;
pub use pages_v3000_to_v3001::UPGRADE_PAGES_3000_TO_3001_SQL;
pub use settings::CREATE_SETTINGS_SQL;
pub use users::CREATE_USERS_SQL;

pub const USERS_SCHEMA_VERSION: i32 = 3000;
pub const PAGES_SCHEMA_VERSION: i32 = 3001;
pub const FILES_SCHEMA_VERSION: i32 = 3000;
pub const SETTINGS_SCHEMA_VERSION: i32 = 3000;

/// An incremental upgrade between two adjacent schema versions.
///
/// The script must be idempotent: running it against a store where it has
/// already logically applied leaves the store unchanged. It must not write the
/// version record, which is stamped by the upgrade runner after it succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaPatch {
    pub from: i32,
    pub to: i32,
    pub script: &'static str,
}

impl SchemaPatch {
    pub const fn new(from: i32, to: i32, script: &'static str) -> Self {
        Self { from, to, script }
    }
}

/// Supplies the DDL for each domain. The runner treats the scripts as opaque.
pub trait SchemaSource {
    fn supported_version(&self, domain: Domain) -> i32;

    /// Idempotent script installing the current schema from nothing.
    fn create_script(&self, domain: Domain) -> &'static str;

    /// Incremental patches for the domain, in any order.
    fn patches(&self, domain: Domain) -> &[SchemaPatch];
}

const PAGES_PATCHES: &[SchemaPatch] = &[SchemaPatch::new(
    3000,
    3001,
    UPGRADE_PAGES_3000_TO_3001_SQL,
)];

/// The schema definitions shipped with this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinSchemaSource;

impl SchemaSource for BuiltinSchemaSource {
    fn supported_version(&self, domain: Domain) -> i32 {
        match domain {
            Domain::Users => USERS_SCHEMA_VERSION,
            Domain::Pages => PAGES_SCHEMA_VERSION,
            Domain::Files => FILES_SCHEMA_VERSION,
            Domain::Settings => SETTINGS_SCHEMA_VERSION,
        }
    }

    fn create_script(&self, domain: Domain) -> &'static str {
        match domain {
            Domain::Users => CREATE_USERS_SQL,
            Domain::Pages => CREATE_PAGES_SQL,
            Domain::Files => CREATE_FILES_SQL,
            Domain::Settings => CREATE_SETTINGS_SQL,
        }
    }

    fn patches(&self, domain: Domain) -> &[SchemaPatch] {
        match domain {
            Domain::Pages => PAGES_PATCHES,
            Domain::Users | Domain::Files | Domain::Settings => &[],
        }
    }
}
