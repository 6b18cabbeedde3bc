use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// One of the independently versioned storage areas.
///
/// The string form is the key of the domain's row in the `Version` table.
#[derive(
    AsRefStr, EnumIter, EnumString, Display, Debug, Serialize, PartialEq, Eq, Hash, Copy, Clone,
)]
pub enum Domain {
    Users,
    Pages,
    Files,
    Settings,
}

impl Domain {
    /// Only Users and Pages existed in the predecessor major version.
    pub fn has_legacy_predecessor(&self) -> bool {
        matches!(self, Domain::Users | Domain::Pages)
    }
}
