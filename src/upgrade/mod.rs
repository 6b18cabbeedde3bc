mod pages_legacy;
mod users_legacy;

pub use pages_legacy::{PagesLegacySchema, PAGES_LEGACY_MARKER};
pub use users_legacy::{UsersLegacySchema, USERS_LEGACY_MARKER};

use log::{info, Level};
use logging_timer::timer;
use rusqlite::types::ValueRef;
use rusqlite::{Error as RusqliteError, Row};
use serde::Serialize;
use std::fmt;

use crate::database::{quote_ident, Database};
use crate::domain::Domain;
use crate::error::WikiStoreError;
use crate::registry::{SchemaState, SchemaVersionRegistry};
use crate::schema::SchemaSource;

/// Suffix given to predecessor tables when they are set aside.
pub const LEGACY_SUFFIX: &str = "_legacy";

pub fn legacy_name(table: &str) -> String {
    format!("{}{}", table, LEGACY_SUFFIX)
}

/// Classifies a failed read of a legacy row. A value of the wrong type for
/// the current model is a `MigrationDataError` naming the table, the column
/// and the row's owner (its first column). Anything else stays a database
/// error.
pub(crate) fn legacy_read_error(row: &Row<'_>, table: &str, err: RusqliteError) -> WikiStoreError {
    let column = match &err {
        RusqliteError::InvalidColumnType(_, name, _) => name.clone(),
        RusqliteError::FromSqlConversionFailure(idx, _, _)
        | RusqliteError::IntegralValueOutOfRange(idx, _) => row
            .as_ref()
            .column_name(*idx)
            .map(str::to_owned)
            .unwrap_or_else(|_| format!("#{}", idx)),
        _ => return err.into(),
    };
    let owner = match row.get_ref(0) {
        Ok(ValueRef::Text(text)) => String::from_utf8_lossy(text).into_owned(),
        Ok(ValueRef::Integer(i)) => i.to_string(),
        _ => "?".to_owned(),
    };
    WikiStoreError::MigrationDataError(format!(
        "Legacy {}.{} of '{}' cannot be converted: {}",
        table, column, owner, err
    ))
}

/// A predecessor major-version schema that can be carried forward.
pub trait LegacySchema {
    /// Table whose presence marks the predecessor schema.
    fn marker_table(&self) -> &'static str;

    /// Every predecessor table, including the marker.
    fn legacy_tables(&self) -> &'static [&'static str];

    /// Copies the `_legacy` tables into the freshly created current schema.
    /// Runs after the rename and create steps and before the version stamp.
    fn migrate(&self, db: &Database) -> Result<(), WikiStoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationAction {
    CreateFresh,
    MigrateLegacy,
    ApplyPatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStep {
    pub from: Option<i32>,
    pub to: i32,
    pub action: MigrationAction,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.action, self.from) {
            (MigrationAction::CreateFresh, _) => write!(f, "create schema v{}", self.to),
            (MigrationAction::MigrateLegacy, _) => {
                write!(f, "migrate legacy schema to v{}", self.to)
            }
            (MigrationAction::ApplyPatch, Some(from)) => {
                write!(f, "patch v{} -> v{}", from, self.to)
            }
            (MigrationAction::ApplyPatch, None) => write!(f, "patch -> v{}", self.to),
        }
    }
}

/// The ordered steps that bring one domain to the supported version.
/// Derived only from what is installed; empty when the domain is current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub domain: Domain,
    pub steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn has_action(&self, action: MigrationAction) -> bool {
        self.steps.iter().any(|s| s.action == action)
    }
}

/// Decides how a domain reaches the supported schema version and drives it
/// there.
///
/// `Absent` becomes a legacy migration when the domain has a predecessor and
/// its marker table is present, otherwise a fresh create. `Stale` becomes the
/// chain of patches from the installed version upwards. `Unsupported` is fatal
/// before anything is written. Every step stamps the version record as its
/// final write, so a step that dies part way never leaves the domain looking
/// current.
pub struct UpgradeOrchestrator<'a> {
    db: &'a Database,
    source: &'a dyn SchemaSource,
}

impl<'a> UpgradeOrchestrator<'a> {
    pub fn new(db: &'a Database, source: &'a dyn SchemaSource) -> Self {
        Self { db, source }
    }

    pub fn ensure_current(
        &self,
        domain: Domain,
        legacy: Option<&dyn LegacySchema>,
    ) -> Result<MigrationPlan, WikiStoreError> {
        let plan = self.plan(domain, legacy)?;
        self.execute(&plan, legacy)?;
        Ok(plan)
    }

    pub fn plan(
        &self,
        domain: Domain,
        legacy: Option<&dyn LegacySchema>,
    ) -> Result<MigrationPlan, WikiStoreError> {
        let supported = self.source.supported_version(domain);
        let registry = SchemaVersionRegistry::new(self.db);

        let steps = match registry.detect_state(domain, supported)? {
            SchemaState::Current => Vec::new(),
            SchemaState::Unsupported(installed) => {
                return Err(WikiStoreError::InvalidConfiguration(format!(
                    "The version of the {} database schema ({}) is greater than the supported version ({})",
                    domain, installed, supported
                )));
            }
            SchemaState::Stale(installed) => self.patch_chain(domain, installed, supported)?,
            SchemaState::Absent => {
                let legacy = legacy.filter(|_| domain.has_legacy_predecessor());
                let action = match legacy {
                    Some(legacy) if self.legacy_schema_present(legacy)? => {
                        MigrationAction::MigrateLegacy
                    }
                    _ => MigrationAction::CreateFresh,
                };
                vec![MigrationStep {
                    from: None,
                    to: supported,
                    action,
                }]
            }
        };

        Ok(MigrationPlan { domain, steps })
    }

    pub fn execute(
        &self,
        plan: &MigrationPlan,
        legacy: Option<&dyn LegacySchema>,
    ) -> Result<(), WikiStoreError> {
        let domain = plan.domain;
        if plan.is_noop() {
            info!("{} schema is current", domain);
            return Ok(());
        }

        for step in &plan.steps {
            info!("{}: {}", domain, step);
            match step.action {
                MigrationAction::CreateFresh => self.create_fresh(domain, step.to)?,
                MigrationAction::MigrateLegacy => {
                    let legacy = legacy.ok_or_else(|| {
                        WikiStoreError::Error(format!(
                            "No legacy schema description supplied for {}",
                            domain
                        ))
                    })?;
                    self.migrate_legacy(domain, step.to, legacy)?
                }
                MigrationAction::ApplyPatch => {
                    let from = step.from.ok_or_else(|| {
                        WikiStoreError::Error(format!("Patch step for {} has no source version", domain))
                    })?;
                    self.apply_patch(domain, from, step.to)?
                }
            }
        }
        Ok(())
    }

    fn legacy_schema_present(&self, legacy: &dyn LegacySchema) -> Result<bool, WikiStoreError> {
        let conn = self.db.conn()?;
        let renamed_marker = legacy_name(legacy.marker_table());

        // Set aside by a run that never stamped the version: the store is half
        // migrated and re-creating the schema over it would hide that.
        if Database::table_exists(&conn, &renamed_marker)? {
            return Err(WikiStoreError::InvalidConfiguration(format!(
                "Found {} without a schema version: a previous legacy migration did not complete. \
                 Restore the {} tables and restart",
                renamed_marker, LEGACY_SUFFIX
            )));
        }

        Database::table_exists(&conn, legacy.marker_table())
    }

    fn patch_chain(
        &self,
        domain: Domain,
        installed: i32,
        supported: i32,
    ) -> Result<Vec<MigrationStep>, WikiStoreError> {
        let patches = self.source.patches(domain);
        let mut steps = Vec::new();
        let mut current = installed;

        while current < supported {
            let next = patches
                .iter()
                .filter(|p| p.from == current && p.to > current && p.to <= supported)
                .min_by_key(|p| p.to)
                .ok_or_else(|| {
                    WikiStoreError::InvalidConfiguration(format!(
                        "No upgrade path for the {} schema from version {} to {}",
                        domain, current, supported
                    ))
                })?;
            steps.push(MigrationStep {
                from: Some(next.from),
                to: next.to,
                action: MigrationAction::ApplyPatch,
            });
            current = next.to;
        }
        Ok(steps)
    }

    fn create_fresh(&self, domain: Domain, version: i32) -> Result<(), WikiStoreError> {
        let conn = self.db.conn()?;
        conn.execute_batch(self.source.create_script(domain))?;
        SchemaVersionRegistry::write_version(&conn, domain, version)?;
        info!("Created {} schema version {}", domain, version);
        Ok(())
    }

    /// Not transactional as a whole. A failure after the rename leaves the
    /// `_legacy` tables intact, the new tables partly filled and the version
    /// record absent.
    fn migrate_legacy(
        &self,
        domain: Domain,
        version: i32,
        legacy: &dyn LegacySchema,
    ) -> Result<(), WikiStoreError> {
        let _tmr = timer!(Level::Info; "UpgradeOrchestrator::migrate_legacy", "{}", domain);

        self.rename_legacy_tables(legacy)?;

        self.db.execute_script(self.source.create_script(domain))?;

        legacy.migrate(self.db)?;

        let conn = self.db.conn()?;
        SchemaVersionRegistry::write_version(&conn, domain, version)?;
        info!("Migrated legacy {} data to schema version {}", domain, version);
        Ok(())
    }

    fn rename_legacy_tables(&self, legacy: &dyn LegacySchema) -> Result<(), WikiStoreError> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;
        for table in legacy.legacy_tables() {
            tx.execute_batch(&format!(
                "ALTER TABLE {} RENAME TO {};",
                quote_ident(table),
                quote_ident(&legacy_name(table))
            ))?;
        }
        tx.commit()?;
        info!(
            "Renamed {} legacy tables with suffix {}",
            legacy.legacy_tables().len(),
            LEGACY_SUFFIX
        );
        Ok(())
    }

    fn apply_patch(&self, domain: Domain, from: i32, to: i32) -> Result<(), WikiStoreError> {
        let patch = self
            .source
            .patches(domain)
            .iter()
            .find(|p| p.from == from && p.to == to)
            .ok_or_else(|| {
                WikiStoreError::Error(format!("No {} patch from {} to {}", domain, from, to))
            })?;

        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;
        tx.execute_batch(patch.script)?;
        SchemaVersionRegistry::write_version(&tx, domain, to)?;
        tx.commit()?;
        info!("Patched {} schema from {} to {}", domain, from, to);
        Ok(())
    }
}
