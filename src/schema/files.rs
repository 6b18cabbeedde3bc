pub const CREATE_FILES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS Version (
    Component TEXT NOT NULL PRIMARY KEY,  -- Domain name ('Users', 'Pages', 'Files', 'Settings')
    Version INTEGER NOT NULL
);

-- Directories are addressed by full path; the root is '/'
CREATE TABLE IF NOT EXISTS Directory (
    FullPath TEXT NOT NULL PRIMARY KEY,
    Parent TEXT,
    FOREIGN KEY (Parent) REFERENCES Directory (FullPath) ON DELETE CASCADE ON UPDATE CASCADE
);

INSERT OR IGNORE INTO Directory (FullPath, Parent) VALUES ('/', NULL);

CREATE TABLE IF NOT EXISTS File (
    Name TEXT NOT NULL,
    Directory TEXT NOT NULL,
    Size INTEGER NOT NULL,
    Downloads INTEGER NOT NULL DEFAULT 0,
    LastModified TEXT NOT NULL,
    Data BLOB NOT NULL,
    PRIMARY KEY (Name, Directory),
    FOREIGN KEY (Directory) REFERENCES Directory (FullPath) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS Attachment (
    Name TEXT NOT NULL,
    Page TEXT NOT NULL,
    Size INTEGER NOT NULL,
    Downloads INTEGER NOT NULL DEFAULT 0,
    LastModified TEXT NOT NULL,
    Data BLOB NOT NULL,
    PRIMARY KEY (Name, Page)
);
"#;
