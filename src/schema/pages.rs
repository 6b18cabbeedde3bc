pub const CREATE_PAGES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS Version (
    Component TEXT NOT NULL PRIMARY KEY,  -- Domain name ('Users', 'Pages', 'Files', 'Settings')
    Version INTEGER NOT NULL
);

-- The root namespace is the empty name
CREATE TABLE IF NOT EXISTS Namespace (
    Name TEXT NOT NULL PRIMARY KEY,
    DefaultPage TEXT
);

INSERT OR IGNORE INTO Namespace (Name, DefaultPage) VALUES ('', NULL);

CREATE TABLE IF NOT EXISTS Category (
    Name TEXT NOT NULL,
    Namespace TEXT NOT NULL,
    PRIMARY KEY (Name, Namespace),
    FOREIGN KEY (Namespace) REFERENCES Namespace (Name) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS Page (
    Name TEXT NOT NULL,
    Namespace TEXT NOT NULL,
    CreationDateTime TEXT NOT NULL,
    PRIMARY KEY (Name, Namespace),
    FOREIGN KEY (Namespace) REFERENCES Namespace (Name) ON DELETE CASCADE
);

-- Revision -1 holds the current content of a page
CREATE TABLE IF NOT EXISTS PageContent (
    Page TEXT NOT NULL,
    Namespace TEXT NOT NULL,
    Revision INTEGER NOT NULL,
    Title TEXT NOT NULL,
    User TEXT NOT NULL,
    LastModified TEXT NOT NULL,
    Comment TEXT,
    Content TEXT NOT NULL,
    Description TEXT,
    PRIMARY KEY (Page, Namespace, Revision),
    FOREIGN KEY (Page, Namespace) REFERENCES Page (Name, Namespace) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS PageKeyword (
    Page TEXT NOT NULL,
    Namespace TEXT NOT NULL,
    Revision INTEGER NOT NULL,
    Keyword TEXT NOT NULL,
    PRIMARY KEY (Page, Namespace, Revision, Keyword),
    FOREIGN KEY (Page, Namespace, Revision) REFERENCES PageContent (Page, Namespace, Revision) ON DELETE CASCADE
);

-- Parent is NULL for top-level messages
CREATE TABLE IF NOT EXISTS Message (
    Page TEXT NOT NULL,
    Namespace TEXT NOT NULL,
    Id INTEGER NOT NULL,
    Parent INTEGER,
    Username TEXT NOT NULL,
    Subject TEXT NOT NULL,
    DateTime TEXT NOT NULL,
    Body TEXT NOT NULL,
    PRIMARY KEY (Page, Namespace, Id),
    FOREIGN KEY (Page, Namespace) REFERENCES Page (Name, Namespace) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS IX_Message_Parent ON Message (Page, Namespace, Parent);

CREATE TABLE IF NOT EXISTS NavigationPath (
    Name TEXT NOT NULL,
    Namespace TEXT NOT NULL,
    Page TEXT NOT NULL,
    Number INTEGER NOT NULL,
    PRIMARY KEY (Name, Namespace, Page),
    FOREIGN KEY (Page, Namespace) REFERENCES Page (Name, Namespace) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS Snippet (
    Name TEXT NOT NULL PRIMARY KEY,
    Content TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ContentTemplate (
    Name TEXT NOT NULL PRIMARY KEY,
    Content TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS CategoryBinding (
    Namespace TEXT NOT NULL,
    Category TEXT NOT NULL,
    Page TEXT NOT NULL,
    PRIMARY KEY (Namespace, Category, Page),
    FOREIGN KEY (Category, Namespace) REFERENCES Category (Name, Namespace) ON DELETE CASCADE,
    FOREIGN KEY (Page, Namespace) REFERENCES Page (Name, Namespace) ON DELETE CASCADE
);

CREATE TRIGGER IF NOT EXISTS CategoryBinding_RequirePage
BEFORE UPDATE OF Page ON CategoryBinding
WHEN NOT EXISTS (SELECT 1 FROM Page WHERE Name = NEW.Page AND Namespace = NEW.Namespace)
BEGIN
    SELECT RAISE(ABORT, 'category binding must reference an existing page');
END;
"#;
