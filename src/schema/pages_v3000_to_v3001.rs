pub const UPGRADE_PAGES_3000_TO_3001_SQL: &str = r#"
--
-- Pages Schema Upgrade: Version 3000 → 3001
--
-- Builds before 3001 could store -1 as the parent of a top-level message.
-- Replace it with NULL and index message threads by parent.
--

UPDATE Message SET Parent = NULL WHERE Parent = -1;

CREATE INDEX IF NOT EXISTS IX_Message_Parent ON Message (Page, Namespace, Parent);
"#;
