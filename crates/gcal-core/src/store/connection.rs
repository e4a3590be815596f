//! bb8 connection manager for rusqlite

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;

use super::StoreError;

/// Where connections point
#[derive(Clone, Debug)]
pub enum SqliteConfig {
    File(PathBuf),
    /// Private in-memory database; only meaningful with a pool of size 1
    Memory,
}

/// Opens rusqlite connections for the bb8 pool
pub struct SqliteConnectionManager {
    config: SqliteConfig,
    busy_timeout: Duration,
}

impl SqliteConnectionManager {
    pub fn new(config: SqliteConfig) -> Self {
        Self {
            config,
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(SqliteConfig::File(path.into()))
    }

    pub fn memory() -> Self {
        Self::new(SqliteConfig::Memory)
    }

    /// How long SQLite itself waits on a locked database before failing
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    fn create_connection(config: &SqliteConfig, busy_timeout: Duration) -> Result<Connection, StoreError> {
        let conn = match config {
            SqliteConfig::File(path) => Connection::open(path)?,
            SqliteConfig::Memory => Connection::open_in_memory()?,
        };

        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;

        Ok(conn)
    }
}

/// A pooled connection.
///
/// rusqlite connections are not `Sync`, so the handle sits behind a mutex and
/// every statement runs on the blocking thread pool.
pub struct SqliteConnection {
    inner: Arc<Mutex<Connection>>,
}

impl SqliteConnection {
    fn new(conn: Connection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on a blocking thread
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::TaskJoin(e.to_string()))?
    }
}

impl bb8::ManageConnection for SqliteConnectionManager {
    type Connection = SqliteConnection;
    type Error = StoreError;

    fn connect(&self) -> impl std::future::Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let config = self.config.clone();
        let busy_timeout = self.busy_timeout;
        async move {
            tokio::task::spawn_blocking(move || {
                Self::create_connection(&config, busy_timeout).map(SqliteConnection::new)
            })
            .await
            .map_err(|e| StoreError::TaskJoin(e.to_string()))?
        }
    }

    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send {
        let inner = conn.inner.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                let guard = inner.blocking_lock();
                guard.execute_batch("SELECT 1").map_err(StoreError::from)
            })
            .await
            .map_err(|e| StoreError::TaskJoin(e.to_string()))?
        }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
