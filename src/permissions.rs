use log::debug;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter};

use crate::error::WikiStoreError;
use crate::host::{resolve_setting, Host, SettingName};
use crate::providers::pages::PageRef;

pub const READ_PAGE: &str = "Read Page";
pub const MODIFY_PAGE: &str = "Modify Page";

/// Coarse per-page status carried by the predecessor schema.
#[derive(AsRefStr, EnumIter, Display, Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum PermissionFlag {
    #[strum(serialize = "N")]
    Normal,
    /// Only administrators may edit.
    #[strum(serialize = "L")]
    Locked,
    /// Only authenticated users may read.
    #[strum(serialize = "R")]
    DenyAnonymous,
    /// Private to administrators and explicit grantees.
    #[strum(serialize = "P")]
    DenyAll,
}

impl PermissionFlag {
    /// Decodes a legacy status column. Only the first character counts, in any case.
    pub fn from_code(code: &str) -> Result<Self, WikiStoreError> {
        match code.chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('N') => Ok(PermissionFlag::Normal),
            Some('L') => Ok(PermissionFlag::Locked),
            Some('R') => Ok(PermissionFlag::DenyAnonymous),
            Some('P') => Ok(PermissionFlag::DenyAll),
            _ => Err(WikiStoreError::MigrationDataError(format!(
                "Unknown legacy page status '{}'",
                code
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AclValue {
    Grant,
    Deny,
}

impl AclValue {
    pub fn code(&self) -> &'static str {
        match self {
            AclValue::Grant => "G",
            AclValue::Deny => "D",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, WikiStoreError> {
        match code {
            "G" => Ok(AclValue::Grant),
            "D" => Ok(AclValue::Deny),
            _ => Err(WikiStoreError::Error(format!("Invalid ACL value: '{}'", code))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AclEntry {
    pub resource: String,
    pub action: String,
    pub subject: String,
    pub value: AclValue,
}

impl AclEntry {
    pub fn new(resource: &str, action: &str, subject: &str, value: AclValue) -> Self {
        AclEntry {
            resource: resource.to_owned(),
            action: action.to_owned(),
            subject: subject.to_owned(),
            value,
        }
    }
}

pub fn group_subject(group: &str) -> String {
    format!("G.{}", group)
}

/// Expresses legacy page status flags as ACL entries.
///
/// | flag          | entries                                             |
/// |---------------|-----------------------------------------------------|
/// | Normal        | none                                                |
/// | Locked        | deny Modify Page to users and anonymous             |
/// | DenyAnonymous | deny Read Page to anonymous                         |
/// | DenyAll       | deny Read Page and Modify Page to users and anonymous |
///
/// Administrators are never denied, so they keep ownership of locked and
/// private pages.
#[derive(Debug, Clone)]
pub struct PermissionTranslator {
    users_group: String,
    anonymous_group: String,
}

impl PermissionTranslator {
    pub fn new(users_group: &str, anonymous_group: &str) -> Self {
        PermissionTranslator {
            users_group: users_group.to_owned(),
            anonymous_group: anonymous_group.to_owned(),
        }
    }

    pub fn from_host(host: &dyn Host) -> Self {
        Self::new(
            &resolve_setting(host, SettingName::UsersGroup),
            &resolve_setting(host, SettingName::AnonymousGroup),
        )
    }

    pub fn acl_entries(&self, page: &PageRef, flag: PermissionFlag) -> Vec<AclEntry> {
        let resource = page.resource();
        let users = group_subject(&self.users_group);
        let anonymous = group_subject(&self.anonymous_group);
        let deny = |action: &str, subject: &str| {
            AclEntry::new(&resource, action, subject, AclValue::Deny)
        };

        match flag {
            PermissionFlag::Normal => Vec::new(),
            PermissionFlag::Locked => vec![deny(MODIFY_PAGE, &users), deny(MODIFY_PAGE, &anonymous)],
            PermissionFlag::DenyAnonymous => vec![deny(READ_PAGE, &anonymous)],
            PermissionFlag::DenyAll => vec![
                deny(READ_PAGE, &users),
                deny(MODIFY_PAGE, &users),
                deny(READ_PAGE, &anonymous),
                deny(MODIFY_PAGE, &anonymous),
            ],
        }
    }

    /// Writes the entries for one page through the host's ACL sink and
    /// returns how many were written.
    pub fn upgrade_entity_permission_to_acl(
        &self,
        host: &dyn Host,
        page: &PageRef,
        flag: PermissionFlag,
    ) -> Result<usize, WikiStoreError> {
        let entries = self.acl_entries(page, flag);
        for entry in &entries {
            host.store_acl_entry(entry)?;
        }
        debug!(
            "Translated status {} of page '{}' into {} ACL entries",
            flag,
            page.full_name(),
            entries.len()
        );
        Ok(entries.len())
    }
}
