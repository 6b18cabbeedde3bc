use log::{debug, info};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::WikiStoreError;

const DEFAULT_POOL_SIZE: u32 = 4;
const MAX_POOL_SIZE: u32 = 32;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Parsed form of a provider connection string such as
/// `Data Source=/var/lib/wiki/wiki.db;Pool Size=4;Busy Timeout=5000`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    pub data_source: PathBuf,
    pub pool_size: u32,
    pub busy_timeout: Duration,
}

impl ConnectionConfig {
    pub fn parse(conn_str: &str) -> Result<Self, WikiStoreError> {
        let mut data_source = None;
        let mut pool_size = DEFAULT_POOL_SIZE;
        let mut busy_timeout = Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS);

        for part in conn_str.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| invalid(&format!("malformed segment '{}'", part)))?;
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "data source" => {
                    if value.is_empty() || value == ":memory:" {
                        return Err(invalid("'Data Source' must name a database file"));
                    }
                    data_source = Some(PathBuf::from(value));
                }
                "pool size" => {
                    pool_size = value
                        .parse::<u32>()
                        .ok()
                        .filter(|n| (1..=MAX_POOL_SIZE).contains(n))
                        .ok_or_else(|| invalid(&format!("bad 'Pool Size' '{}'", value)))?;
                }
                "busy timeout" => {
                    let ms = value
                        .parse::<u64>()
                        .map_err(|_| invalid(&format!("bad 'Busy Timeout' '{}'", value)))?;
                    busy_timeout = Duration::from_millis(ms);
                }
                other => return Err(invalid(&format!("unknown key '{}'", other))),
            }
        }

        let data_source = data_source.ok_or_else(|| invalid("'Data Source' is missing"))?;

        Ok(ConnectionConfig {
            data_source,
            pool_size,
            busy_timeout,
        })
    }
}

fn invalid(detail: &str) -> WikiStoreError {
    WikiStoreError::InvalidConfiguration(format!(
        "Provided connection string is not valid: {}",
        detail
    ))
}

/// A pool of connections to one SQLite store.
///
/// Each unit of work calls [`Database::conn`] and drops the connection when it
/// is done, which hands it back to the pool on every exit path.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Validates the configuration by opening a connection outside the pool,
    /// then builds the pool. Every failure is reported as `InvalidConfiguration`.
    pub fn connect(config: &ConnectionConfig) -> Result<Self, WikiStoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Self::open(config, flags)
    }

    pub fn connect_str(conn_str: &str) -> Result<Self, WikiStoreError> {
        Self::connect(&ConnectionConfig::parse(conn_str)?)
    }

    /// Opens an existing store for reading. Never creates the database file.
    pub fn connect_read_only(config: &ConnectionConfig) -> Result<Self, WikiStoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Self::open(config, flags)
    }

    fn open(config: &ConnectionConfig, flags: OpenFlags) -> Result<Self, WikiStoreError> {
        Self::validate(&config.data_source, flags)?;

        let busy_timeout = config.busy_timeout;
        let manager = SqliteConnectionManager::file(&config.data_source)
            .with_flags(flags)
            .with_init(move |c| {
                c.busy_timeout(busy_timeout)?;
                c.execute_batch("PRAGMA foreign_keys = ON;")
            });

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .build(manager)
            .map_err(|e| invalid(&e.to_string()))?;

        info!("Database opened at: {}", config.data_source.display());
        Ok(Database { pool })
    }

    fn validate(path: &Path, flags: OpenFlags) -> Result<(), WikiStoreError> {
        // The trial connection is dropped here whatever happens, and a failure
        // to close it never replaces the open error.
        let conn = Connection::open_with_flags(path, flags).map_err(|e| invalid(&e.to_string()))?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| invalid(&e.to_string()))?;
        Ok(())
    }

    pub fn conn(&self) -> Result<DbConnection, WikiStoreError> {
        Ok(self.pool.get()?)
    }

    /// Runs an opaque multi-statement script as one unit.
    pub fn execute_script(&self, script: &str) -> Result<(), WikiStoreError> {
        let conn = self.conn()?;
        conn.execute_batch(script)?;
        Ok(())
    }

    pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, WikiStoreError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?1)",
            [table],
            |row| row.get(0),
        )?;
        debug!("table_exists({}) = {}", table, count > 0);
        Ok(count > 0)
    }
}

/// Quotes an identifier for interpolation into DDL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_connection_string() {
        let config =
            ConnectionConfig::parse("Data Source=/tmp/wiki.db; Pool Size=8; busy timeout=250;")
                .unwrap();
        assert_eq!(config.data_source, PathBuf::from("/tmp/wiki.db"));
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_defaults() {
        let config = ConnectionConfig::parse("data source=wiki.db").unwrap();
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(
            config.busy_timeout,
            Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_parse_rejects_bad_strings() {
        for bad in [
            "",
            "wiki.db",
            "Data Source=",
            "Data Source=:memory:",
            "Data Source=wiki.db;Pool Size=0",
            "Data Source=wiki.db;Pool Size=many",
            "Data Source=wiki.db;Password=secret",
        ] {
            let err = ConnectionConfig::parse(bad).unwrap_err();
            assert!(
                matches!(err, WikiStoreError::InvalidConfiguration(_)),
                "expected InvalidConfiguration for {:?}, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_connect_unreachable_path_is_invalid_configuration() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("no_such_dir").join("wiki.db");
        let result = Database::connect_str(&format!("Data Source={}", missing.display()));
        assert!(matches!(
            result,
            Err(WikiStoreError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_connect_enables_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wiki.db");
        let db = Database::connect_str(&format!("Data Source={}", path.display())).unwrap();
        let conn = db.conn().unwrap();
        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_read_only_never_creates_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wiki.db");
        let config = ConnectionConfig::parse(&format!("Data Source={}", path.display())).unwrap();

        let result = Database::connect_read_only(&config);
        assert!(matches!(
            result,
            Err(WikiStoreError::InvalidConfiguration(_))
        ));
        assert!(!path.exists());

        Database::connect(&config)
            .unwrap()
            .execute_script("CREATE TABLE Version (Domain TEXT);")
            .unwrap();
        let db = Database::connect_read_only(&config).unwrap();
        let conn = db.conn().unwrap();
        assert!(Database::table_exists(&conn, "Version").unwrap());
        assert!(conn.execute_batch("CREATE TABLE Other (Id INTEGER);").is_err());
    }

    #[test]
    fn test_table_exists_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wiki.db");
        let db = Database::connect_str(&format!("Data Source={}", path.display())).unwrap();
        db.execute_script("CREATE TABLE PagesProviderVersion (Version INTEGER);")
            .unwrap();
        let conn = db.conn().unwrap();
        assert!(Database::table_exists(&conn, "pagesproviderversion").unwrap());
        assert!(!Database::table_exists(&conn, "UsersProviderVersion").unwrap());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("User"), "\"User\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
