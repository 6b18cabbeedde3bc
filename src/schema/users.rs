pub const CREATE_USERS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS Version (
    Component TEXT NOT NULL PRIMARY KEY,  -- Domain name ('Users', 'Pages', 'Files', 'Settings')
    Version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS "User" (
    Username TEXT NOT NULL PRIMARY KEY,
    PasswordHash TEXT NOT NULL,
    DisplayName TEXT,
    Email TEXT NOT NULL,
    Active BOOLEAN NOT NULL,
    DateTime TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS UserGroup (
    Name TEXT NOT NULL PRIMARY KEY,
    Description TEXT
);

CREATE TABLE IF NOT EXISTS UserGroupMembership (
    User TEXT NOT NULL,
    UserGroup TEXT NOT NULL,
    PRIMARY KEY (User, UserGroup),
    FOREIGN KEY (User) REFERENCES "User" (Username) ON DELETE CASCADE ON UPDATE CASCADE,
    FOREIGN KEY (UserGroup) REFERENCES UserGroup (Name) ON DELETE CASCADE ON UPDATE CASCADE
);

CREATE TABLE IF NOT EXISTS UserData (
    User TEXT NOT NULL,
    "Key" TEXT NOT NULL,
    Data TEXT NOT NULL,
    PRIMARY KEY (User, "Key"),
    FOREIGN KEY (User) REFERENCES "User" (Username) ON DELETE CASCADE ON UPDATE CASCADE
);
"#;
