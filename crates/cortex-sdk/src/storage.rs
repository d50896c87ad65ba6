//! Tier Storage
//!
//! Every memory tier owns exactly one `TierStore`: a lazily opened SQLite
//! connection behind an async mutex. All access goes through `read` and
//! `write`, which serialize callers per tier, wrap writes in a transaction,
//! and keep the tier's `TierStatus` current.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::CortexResult;

/// Where a tier keeps its rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// SQLite database file (created on first use)
    File(PathBuf),
    /// Private in-memory database
    InMemory,
}

impl StorageLocation {
    /// Build a location from an optional database path
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Self::File(path),
            None => Self::InMemory,
        }
    }
}

/// Coarse tier state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierStatus {
    /// Backing store not opened yet
    Uninitialized,
    /// Last storage access succeeded
    Operational,
    /// Last storage access failed
    Degraded,
}

impl TierStatus {
    fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Operational => 1,
            Self::Degraded => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Operational,
            2 => Self::Degraded,
            _ => Self::Uninitialized,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Operational => "operational",
            Self::Degraded => "degraded",
        }
    }

    /// Whether the tier counts toward health
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Operational)
    }
}

impl std::fmt::Display for TierStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single-writer store owned by one tier
pub struct TierStore {
    name: &'static str,
    location: StorageLocation,
    migration: &'static str,
    conn: OnceCell<Mutex<Connection>>,
    status: AtomicU8,
}

impl TierStore {
    /// Create a store; nothing is opened until the first operation
    pub fn new(name: &'static str, location: StorageLocation, migration: &'static str) -> Self {
        Self {
            name,
            location,
            migration,
            conn: OnceCell::new(),
            status: AtomicU8::new(TierStatus::Uninitialized.as_u8()),
        }
    }

    /// Tier name used in logs and reports
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Where this store lives
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Current status
    pub fn status(&self) -> TierStatus {
        TierStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Run a trivial query and report the resulting status
    pub async fn probe(&self) -> TierStatus {
        let _ = self
            .read(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?))
            .await;
        self.status()
    }

    /// Run a read against the tier's connection
    pub async fn read<T, F>(&self, f: F) -> CortexResult<T>
    where
        F: FnOnce(&Connection) -> CortexResult<T> + Send,
        T: Send,
    {
        let result = async {
            let lock = self.connection().await?;
            let conn = lock.lock().await;
            f(&conn)
        }
        .await;
        self.record(&result);
        result
    }

    /// Run a write inside its own transaction
    ///
    /// The transaction takes the database write lock up front, so tiers that
    /// share a database file wait on `busy_timeout` instead of failing when
    /// another tier commits first. It is committed only when `f` succeeds.
    pub async fn write<T, F>(&self, f: F) -> CortexResult<T>
    where
        F: FnOnce(&Connection) -> CortexResult<T> + Send,
        T: Send,
    {
        let result = async {
            let lock = self.connection().await?;
            let mut conn = lock.lock().await;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        }
        .await;
        self.record(&result);
        result
    }

    async fn connection(&self) -> CortexResult<&Mutex<Connection>> {
        self.conn.get_or_try_init(|| async { self.open() }).await
    }

    fn open(&self) -> CortexResult<Mutex<Connection>> {
        let conn = match &self.location {
            StorageLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
            StorageLocation::InMemory => Connection::open_in_memory()?,
        };

        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        conn.execute_batch(self.migration)?;

        debug!(tier = self.name, location = ?self.location, "Opened tier store");
        Ok(Mutex::new(conn))
    }

    fn record<T>(&self, result: &CortexResult<T>) {
        let status = match result {
            Ok(_) => TierStatus::Operational,
            Err(e) if e.is_storage() => {
                warn!(tier = self.name, error = %e, "Tier storage operation failed");
                TierStatus::Degraded
            }
            // Domain errors (not found, invalid input) say nothing about the store.
            Err(_) if self.conn.initialized() => TierStatus::Operational,
            Err(_) => return,
        };
        self.status.store(status.as_u8(), Ordering::Release);
    }
}
