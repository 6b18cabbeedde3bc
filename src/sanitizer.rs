//! Repair of entity names that contain the namespace separator.
//!
//! Full names take the form `<namespace>.<name>`, so a page or category whose
//! own name contains `.` cannot be addressed unambiguously. Such names are
//! rewritten by replacing every separator with `_`. The rewrite is a pure
//! function, so every table that stores the name arrives at the same spelling
//! independently.

use std::borrow::Cow;
use std::collections::BTreeMap;

pub const SEPARATOR: char = '.';
pub const SUBSTITUTE: char = '_';

pub fn needs_sanitizing(name: &str) -> bool {
    name.contains(SEPARATOR)
}

/// Replaces every separator in `name`. Borrows when there is nothing to replace.
pub fn sanitize(name: &str) -> Cow<'_, str> {
    if needs_sanitizing(name) {
        Cow::Owned(name.replace(SEPARATOR, &SUBSTITUTE.to_string()))
    } else {
        Cow::Borrowed(name)
    }
}

/// Original → sanitized spelling for every offending name found in one
/// migration run. Kept for logging and auditing; [`IdentifierRenameMap::resolve`]
/// falls back to [`sanitize`] so the map is never the only source of truth.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdentifierRenameMap {
    renames: BTreeMap<String, String>,
}

impl IdentifierRenameMap {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let renames = names
            .into_iter()
            .filter(|n| needs_sanitizing(n.as_ref()))
            .map(|n| {
                let original = n.as_ref().to_owned();
                let sanitized = sanitize(&original).into_owned();
                (original, sanitized)
            })
            .collect();
        Self { renames }
    }

    pub fn resolve<'a>(&'a self, name: &'a str) -> Cow<'a, str> {
        match self.renames.get(name) {
            Some(renamed) => Cow::Borrowed(renamed.as_str()),
            None => sanitize(name),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.renames.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_replaces_every_separator() {
        assert_eq!(sanitize("a.b.c"), "a_b_c");
        assert_eq!(sanitize(".hidden."), "_hidden_");
        assert_eq!(sanitize("MainPage"), "MainPage");
        assert!(matches!(sanitize("MainPage"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_rename_map_only_tracks_offending_names() {
        let map = IdentifierRenameMap::from_names(["Home", "v1.0", "a.b.c", "a_b"]);
        assert_eq!(map.len(), 2);
        let entries: Vec<(&str, &str)> = map.iter().collect();
        assert_eq!(entries, vec![("a.b.c", "a_b_c"), ("v1.0", "v1_0")]);
    }

    #[test]
    fn test_resolve_agrees_with_sanitize_for_unmapped_names() {
        let map = IdentifierRenameMap::from_names(["x.y"]);
        assert_eq!(map.resolve("x.y"), "x_y");
        assert_eq!(map.resolve("p.q"), "p_q");
        assert_eq!(map.resolve("plain"), "plain");
        assert!(IdentifierRenameMap::default().is_empty());
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(name in ".*") {
            let once = sanitize(&name).into_owned();
            let twice = sanitize(&once).into_owned();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_sanitized_names_have_no_separator(name in "[a-z._ ]{0,24}") {
            prop_assert!(!needs_sanitizing(&sanitize(&name)));
            prop_assert_eq!(sanitize(&name).chars().count(), name.chars().count());
        }

        #[test]
        fn prop_resolve_matches_sanitize(names in prop::collection::vec("[a-z.]{1,8}", 0..10)) {
            let map = IdentifierRenameMap::from_names(&names);
            for name in &names {
                prop_assert_eq!(map.resolve(name), sanitize(name));
            }
        }
    }
}
