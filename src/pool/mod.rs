//! Fixed-size pool of `may_postgres` connections.
//!
//! Each checkout hands one [`Client`] to exactly one caller, which is what makes
//! `BEGIN … COMMIT` safe under concurrent coroutines. Connections are opened lazily up
//! to `max_connections`; idle ones are parked in a bounded crossbeam channel.

pub mod config;

use crate::connection::{connect, ConnectionError};
use crate::executor::PgExecutor;
use crate::transaction::{Transaction, TransactionError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use may_postgres::Client;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub use self::config::DatabaseConfig;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

#[derive(Debug)]
pub enum PoolError {
    /// Pool settings are unusable
    Config(String),
    /// Opening a new connection failed
    Connect(ConnectionError),
    /// No connection became idle within the checkout timeout
    Timeout(Duration),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Config(msg) => write!(f, "Invalid pool configuration: {msg}"),
            PoolError::Connect(e) => write!(f, "Failed to open pooled connection: {e}"),
            PoolError::Timeout(d) => {
                write!(f, "Timed out after {d:?} waiting for a database connection")
            }
        }
    }
}

impl std::error::Error for PoolError {}

impl From<ConnectionError> for PoolError {
    fn from(err: ConnectionError) -> Self {
        PoolError::Connect(err)
    }
}

pub struct DbPool {
    url: String,
    max_connections: usize,
    checkout_timeout: Duration,
    live: AtomicUsize,
    idle_tx: Sender<Client>,
    idle_rx: Receiver<Client>,
}

impl DbPool {
    /// Builds a pool without opening any connection yet.
    pub fn new(config: &DatabaseConfig) -> Result<Self, PoolError> {
        if config.max_connections == 0 {
            return Err(PoolError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        crate::connection::validate_connection_string(&config.url)?;

        let (idle_tx, idle_rx) = bounded(config.max_connections);
        Ok(Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            checkout_timeout: Duration::from_secs(config.pool_timeout_seconds),
            live: AtomicUsize::new(0),
            idle_tx,
            idle_rx,
        })
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Connections currently open, idle or checked out.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Checks out a connection, opening one if the pool is below capacity.
    pub fn acquire(&self) -> Result<PooledClient<'_>, PoolError> {
        if let Ok(client) = self.idle_rx.try_recv() {
            return Ok(self.checkout(client));
        }

        if self.reserve_slot() {
            return match connect(&self.url) {
                Ok(client) => Ok(self.checkout(client)),
                Err(e) => {
                    self.live.fetch_sub(1, Ordering::SeqCst);
                    Err(PoolError::Connect(e))
                }
            };
        }

        let start = Instant::now();
        let result = self.idle_rx.recv_timeout(self.checkout_timeout);
        #[cfg(feature = "metrics")]
        METRICS.observe_pool_wait(start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        match result {
            Ok(client) => Ok(self.checkout(client)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                Err(PoolError::Timeout(self.checkout_timeout))
            }
        }
    }

    fn reserve_slot(&self) -> bool {
        let max = self.max_connections;
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }

    fn checkout(&self, client: Client) -> PooledClient<'_> {
        PooledClient {
            client: Some(client),
            pool: self,
            broken: false,
        }
    }

    fn check_in(&self, client: Client, broken: bool) {
        if broken || self.idle_tx.try_send(client).is_err() {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// A checked-out connection; returned to the pool on drop.
pub struct PooledClient<'a> {
    client: Option<Client>,
    pool: &'a DbPool,
    broken: bool,
}

impl PooledClient<'_> {
    /// Drop the connection instead of returning it; the slot is reopened lazily.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn executor(&self) -> PgExecutor {
        PgExecutor::new(self.deref().clone())
    }

    /// Opens a transaction on this connection; it stays checked out until the
    /// transaction is done with it.
    pub fn begin(&self) -> Result<Transaction, TransactionError> {
        Transaction::begin(self.deref().clone())
    }
}

impl Deref for PooledClient<'_> {
    type Target = Client;

    fn deref(&self) -> &Client {
        self.client
            .as_ref()
            .unwrap_or_else(|| unreachable!("client is only taken in drop"))
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.check_in(client, self.broken);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, max: usize) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            max_connections: max,
            pool_timeout_seconds: 1,
        }
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = DbPool::new(&config("postgres://u:p@localhost/db", 0))
            .err()
            .expect("zero-sized pool must fail");
        assert!(matches!(err, PoolError::Config(_)));
    }

    #[test]
    fn test_invalid_url_is_rejected_up_front() {
        let err = DbPool::new(&config("not a url", 4))
            .err()
            .expect("invalid url must fail");
        assert!(matches!(
            err,
            PoolError::Connect(ConnectionError::InvalidConnectionString(_))
        ));
    }

    #[test]
    fn test_pool_is_lazy() {
        let pool = DbPool::new(&config("postgres://u:p@localhost/db", 4)).expect("valid");
        assert_eq!(pool.max_connections(), 4);
        assert_eq!(pool.live_connections(), 0);
    }

    #[test]
    fn test_reserve_slot_respects_capacity() {
        let pool = DbPool::new(&config("postgres://u:p@localhost/db", 2)).expect("valid");
        assert!(pool.reserve_slot());
        assert!(pool.reserve_slot());
        assert!(!pool.reserve_slot());
        assert_eq!(pool.live_connections(), 2);
    }

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::Timeout(Duration::from_secs(3));
        assert!(err.to_string().contains("Timed out"));
    }
}
