pub const CREATE_SETTINGS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS Version (
    Component TEXT NOT NULL PRIMARY KEY,  -- Domain name ('Users', 'Pages', 'Files', 'Settings')
    Version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS Setting (
    Name TEXT NOT NULL PRIMARY KEY,
    Value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS Log (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    DateTime TEXT NOT NULL,
    EntryType CHAR(1) NOT NULL,
    User TEXT NOT NULL,
    Message TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS MetaDataItem (
    Name TEXT NOT NULL,
    Tag TEXT NOT NULL,
    Data TEXT NOT NULL,
    PRIMARY KEY (Name, Tag)
);

CREATE TABLE IF NOT EXISTS RecentChange (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    Page TEXT NOT NULL,
    Title TEXT NOT NULL,
    MessageSubject TEXT,
    DateTime TEXT NOT NULL,
    User TEXT NOT NULL,
    Change CHAR(1) NOT NULL,
    Description TEXT
);

CREATE TABLE IF NOT EXISTS PluginAssembly (
    Name TEXT NOT NULL PRIMARY KEY,
    Assembly BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS PluginStatus (
    Name TEXT NOT NULL PRIMARY KEY,
    Enabled BOOLEAN NOT NULL,
    Configuration TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS OutgoingLink (
    Source TEXT NOT NULL,
    Destination TEXT NOT NULL,
    PRIMARY KEY (Source, Destination)
);

-- Value is 'G' (grant) or 'D' (deny)
CREATE TABLE IF NOT EXISTS AclEntry (
    Resource TEXT NOT NULL,
    "Action" TEXT NOT NULL,
    Subject TEXT NOT NULL,
    Value CHAR(1) NOT NULL,
    PRIMARY KEY (Resource, "Action", Subject)
);
"#;
