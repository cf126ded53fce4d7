//! Store connections and the per-request connection-acquisition hook.
//!
//! A [`Store`] is one configured database. Request handlers never open
//! connections themselves; they call [`Store::acquire`] and work on the
//! returned [`StoreConn`]. What that hands out depends on the store's
//! [`ConnectionMode`]:
//!
//! - [`ConnectionMode::PerRequest`] -- a pooled connection in autocommit
//!   mode, returned to the pool when the request is done. Normal operation.
//! - [`ConnectionMode::Pinned`] -- the single long-lived connection of the
//!   store. It is never closed or recycled at request boundaries, so every
//!   request lands inside whatever transaction is open on it.
//!
//! Uses the [`sqlx`] `Any` driver so the same harness runs against
//! `sqlite:` and `postgres:` URLs.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use sqlx::any::AnyPoolOptions;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, AnyPool, Connection};
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};

use crate::error::StoreError;
use crate::registry::StoreId;

/// Default maximum number of pooled connections for per-request stores.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default connection timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Configuration for a single store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Unique alias of the store (e.g. `default`).
    pub alias: String,
    /// Connection URL (`sqlite://...` or `postgresql://...`).
    pub url: String,
    /// Whether the store is a read mirror of another store.
    pub mirror: bool,
    /// Maximum pool size in per-request mode.
    pub max_connections: u32,
    /// Connection acquisition timeout.
    pub connect_timeout: Duration,
}

impl StoreConfig {
    /// Create a new configuration for a primary (non-mirror) store.
    pub fn new(alias: &str, url: &str) -> Self {
        Self {
            alias: alias.to_owned(),
            url: url.to_owned(),
            mirror: false,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Flag the store as a read mirror.
    #[must_use]
    pub const fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Set the maximum number of pooled connections.
    #[must_use]
    pub const fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// How a store hands out connections to request handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// One pooled autocommit connection per request.
    PerRequest,
    /// Autocommit suspended: all requests share one long-lived connection
    /// that is never closed at request start or end.
    Pinned,
}

enum Backend {
    Pooled(AnyPool),
    Pinned(Arc<Mutex<Option<AnyConnection>>>),
}

/// A connected store.
pub struct Store {
    id: StoreId,
    mirror: bool,
    mode: ConnectionMode,
    backend: Backend,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("mirror", &self.mirror)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Connect to the store described by `config` in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection cannot be made.
    pub async fn connect(config: &StoreConfig, mode: ConnectionMode) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();

        let backend = match mode {
            ConnectionMode::PerRequest => {
                let pool = AnyPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(config.connect_timeout)
                    .connect(&config.url)
                    .await?;
                Backend::Pooled(pool)
            }
            ConnectionMode::Pinned => {
                let conn = AnyConnection::connect(&config.url).await?;
                Backend::Pinned(Arc::new(Mutex::new(Some(conn))))
            }
        };

        tracing::info!(
            store = %config.alias,
            mirror = config.mirror,
            mode = ?mode,
            "Connected to store"
        );

        Ok(Self {
            id: StoreId::new(&config.alias),
            mirror: config.mirror,
            mode,
            backend,
        })
    }

    /// The store's alias.
    pub const fn id(&self) -> &StoreId {
        &self.id
    }

    /// Whether the store is a read mirror.
    pub const fn is_mirror(&self) -> bool {
        self.mirror
    }

    /// The connection mode the store was opened with.
    pub const fn mode(&self) -> ConnectionMode {
        self.mode
    }

    /// Acquire a connection for one request.
    ///
    /// In pinned mode this waits for the shared connection; concurrent
    /// requests against the same store therefore run one after another
    /// inside the same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] once [`Store::close`] has run, or
    /// [`StoreError::Database`] if the pool cannot hand out a connection.
    pub async fn acquire(&self) -> Result<StoreConn, StoreError> {
        match &self.backend {
            Backend::Pooled(pool) => {
                if pool.is_closed() {
                    return Err(self.closed());
                }
                Ok(StoreConn::Pooled(pool.acquire().await?))
            }
            Backend::Pinned(slot) => {
                let guard = Arc::clone(slot).lock_owned().await;
                OwnedMutexGuard::try_map(guard, Option::as_mut)
                    .map(StoreConn::Pinned)
                    .map_err(|_closed| self.closed())
            }
        }
    }

    /// Issue `BEGIN` on the pinned connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotPinned`] for per-request stores.
    pub async fn begin_raw(&self) -> Result<(), StoreError> {
        self.execute_pinned("BEGIN").await
    }

    /// Issue `ROLLBACK` on the pinned connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotPinned`] for per-request stores.
    pub async fn rollback_raw(&self) -> Result<(), StoreError> {
        self.execute_pinned("ROLLBACK").await
    }

    /// Issue `COMMIT` on the pinned connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotPinned`] for per-request stores.
    pub async fn commit_raw(&self) -> Result<(), StoreError> {
        self.execute_pinned("COMMIT").await
    }

    /// Close every connection held by the store. Idempotent.
    pub async fn close(&self) {
        match &self.backend {
            Backend::Pooled(pool) => {
                if !pool.is_closed() {
                    pool.close().await;
                    tracing::info!(store = %self.id, "Store pool closed");
                }
            }
            Backend::Pinned(slot) => {
                let taken = slot.lock().await.take();
                if let Some(conn) = taken {
                    if let Err(e) = conn.close().await {
                        tracing::warn!(store = %self.id, error = %e, "Pinned connection closed uncleanly");
                    } else {
                        tracing::info!(store = %self.id, "Pinned connection closed");
                    }
                }
            }
        }
    }

    /// Whether [`Store::close`] has already run.
    pub async fn is_closed(&self) -> bool {
        match &self.backend {
            Backend::Pooled(pool) => pool.is_closed(),
            Backend::Pinned(slot) => slot.lock().await.is_none(),
        }
    }

    async fn execute_pinned(&self, statement: &str) -> Result<(), StoreError> {
        if self.mode != ConnectionMode::Pinned {
            return Err(StoreError::NotPinned {
                alias: self.id.to_string(),
            });
        }
        let mut conn = self.acquire().await?;
        sqlx::query(statement).execute(&mut *conn).await?;
        Ok(())
    }

    fn closed(&self) -> StoreError {
        StoreError::Closed {
            alias: self.id.to_string(),
        }
    }
}

/// A connection handed to one request by [`Store::acquire`].
///
/// Dereferences to [`AnyConnection`], so it can be passed to any
/// [`sqlx`] query as `&mut *conn`.
pub enum StoreConn {
    /// A pooled connection, returned to the pool on drop.
    Pooled(PoolConnection<Any>),
    /// Exclusive access to the store's pinned connection until drop.
    Pinned(OwnedMappedMutexGuard<Option<AnyConnection>, AnyConnection>),
}

impl Deref for StoreConn {
    type Target = AnyConnection;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Pooled(conn) => &**conn,
            Self::Pinned(conn) => &**conn,
        }
    }
}

impl DerefMut for StoreConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Pooled(conn) => &mut **conn,
            Self::Pinned(conn) => &mut **conn,
        }
    }
}
