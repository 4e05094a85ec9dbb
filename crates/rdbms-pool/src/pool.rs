//! Named connection manager.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use rdbms_client::{Connection, DriverRegistry, Dsn, Error, Result};

use crate::config::{PoolConfig, PoolEntry};

/// A pooled connection, shared by every caller that asks for its name.
///
/// Lock it for the duration of one unit of work; the connection runs one
/// statement at a time.
pub type PooledConnection = Arc<Mutex<Connection>>;

static GLOBAL: Lazy<ConnectionManager> = Lazy::new(ConnectionManager::new);

struct Slot {
    name: String,
    dsn: Dsn,
    connection: Option<PooledConnection>,
}

/// Hands out one connection per configured name.
///
/// Connections are created on first request from their DSN through a
/// [`DriverRegistry`], and connected right away when the DSN carries
/// `autoconnect=1`. Entries stay until [`ConnectionManager::reset`].
///
/// ```rust
/// use rdbms_client::Error;
/// use rdbms_pool::ConnectionManager;
///
/// let manager = ConnectionManager::new();
/// manager.configure([("reports", "sybase://report:pw@db1/pubs")])?;
///
/// assert!(manager.is_registered("reports"));
/// assert!(matches!(manager.get("audit"), Err(Error::ConnectionNotRegistered(_))));
/// # Ok::<(), Error>(())
/// ```
pub struct ConnectionManager {
    registry: Option<Arc<DriverRegistry>>,
    slots: RwLock<Vec<Slot>>,
}

impl ConnectionManager {
    /// Empty manager creating connections through
    /// [`DriverRegistry::global`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: None,
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Empty manager creating connections through `registry`.
    #[must_use]
    pub fn with_registry(registry: impl Into<Arc<DriverRegistry>>) -> Self {
        Self {
            registry: Some(registry.into()),
            slots: RwLock::new(Vec::new()),
        }
    }

    /// The process-wide manager.
    pub fn global() -> &'static ConnectionManager {
        &GLOBAL
    }

    /// The registry connections are created through.
    #[must_use]
    pub fn registry(&self) -> &DriverRegistry {
        self.registry
            .as_deref()
            .unwrap_or_else(|| DriverRegistry::global())
    }

    /// Add `name -> dsn` pairs.
    ///
    /// Every DSN is parsed before any entry changes, so a malformed one
    /// leaves the manager untouched. Schemes are not checked here and
    /// nothing connects. Reconfiguring a name drops its pooled connection.
    pub fn configure<I, N, D>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: AsRef<str>,
    {
        self.apply(PoolConfig::from_pairs(pairs)?);
        Ok(())
    }

    /// Add every entry of `config`.
    pub fn apply(&self, config: PoolConfig) {
        let mut slots = self.slots.write();
        for PoolEntry { name, dsn } in config {
            tracing::debug!(name = %name, dsn = %dsn.without_password(), "configured connection");
            let slot = Slot {
                name,
                dsn,
                connection: None,
            };
            match slots.iter_mut().find(|s| s.name == slot.name) {
                Some(existing) => *existing = slot,
                None => slots.push(slot),
            }
        }
    }

    /// The connection named `name`, created on first request.
    pub fn get(&self, name: &str) -> Result<PooledConnection> {
        let dsn = {
            let slots = self.slots.read();
            let slot = slots
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| not_registered(name))?;
            if let Some(conn) = &slot.connection {
                return Ok(Arc::clone(conn));
            }
            slot.dsn.clone()
        };

        let conn = self.open(name, &dsn)?;

        let mut slots = self.slots.write();
        let slot = slots
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| not_registered(name))?;
        if slot.dsn != dsn {
            // reconfigured while connecting
            return Err(not_registered(name));
        }
        Ok(Arc::clone(slot.connection.get_or_insert(conn)))
    }

    /// As [`get`](Self::get), but only when the configured DSN logs in as
    /// `user`.
    pub fn get_with_user(&self, name: &str, user: &str) -> Result<PooledConnection> {
        let user_matches = self
            .slots
            .read()
            .iter()
            .find(|s| s.name == name)
            .is_some_and(|s| s.dsn.user() == Some(user));
        if !user_matches {
            tracing::debug!(name = %name, user = %user, "user does not match configured connection");
            return Err(not_registered(name));
        }
        self.get(name)
    }

    /// The `index`-th entry, in configuration order, whose name, host or
    /// `host:port` equals `identifier`.
    pub fn get_by_host(&self, identifier: &str, index: usize) -> Result<PooledConnection> {
        let name = self
            .slots
            .read()
            .iter()
            .filter(|s| s.name == identifier || host_matches(&s.dsn, identifier))
            .nth(index)
            .map(|s| s.name.clone())
            .ok_or_else(|| not_registered(&format!("{identifier}[{index}]")))?;
        self.get(&name)
    }

    /// Pool an existing connection under `name`, replacing any entry of
    /// that name.
    pub fn register(&self, connection: Connection, name: impl Into<String>) -> PooledConnection {
        let name = name.into();
        let dsn = connection.dsn().clone();
        let pooled = Arc::new(Mutex::new(connection));
        tracing::debug!(name = %name, dsn = %dsn.without_password(), "registered connection");

        let slot = Slot {
            name,
            dsn,
            connection: Some(Arc::clone(&pooled)),
        };
        let mut slots = self.slots.write();
        match slots.iter_mut().find(|s| s.name == slot.name) {
            Some(existing) => *existing = slot,
            None => slots.push(slot),
        }
        pooled
    }

    /// Pool an existing connection under its DSN host.
    pub fn register_by_host(&self, connection: Connection) -> PooledConnection {
        let host = connection.dsn().host().to_string();
        self.register(connection, host)
    }

    /// Configured names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.slots.read().iter().map(|s| s.name.clone()).collect()
    }

    /// DSN configured for `name`.
    #[must_use]
    pub fn dsn(&self, name: &str) -> Option<Dsn> {
        self.slots
            .read()
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.dsn.clone())
    }

    /// Whether `name` is configured.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.slots.read().iter().any(|s| s.name == name)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether no entries are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Drop every entry.
    ///
    /// Handles already given out stay usable; a connection closes when its
    /// last handle is dropped.
    pub fn reset(&self) {
        let dropped = std::mem::take(&mut *self.slots.write());
        tracing::info!(entries = dropped.len(), "connection manager reset");
    }

    fn open(&self, name: &str, dsn: &Dsn) -> Result<PooledConnection> {
        let mut conn = self.registry().create(dsn)?;
        if dsn.bool_flag("autoconnect") {
            conn.connect()?;
        }
        tracing::debug!(name = %name, connected = conn.is_connected(), "created pooled connection");
        Ok(Arc::new(Mutex::new(conn)))
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("names", &self.names())
            .field("injected_registry", &self.registry.is_some())
            .finish()
    }
}

fn host_matches(dsn: &Dsn, identifier: &str) -> bool {
    if dsn.host().eq_ignore_ascii_case(identifier) {
        return true;
    }
    match (identifier.rsplit_once(':'), dsn.port()) {
        (Some((host, port)), Some(configured)) => {
            host.eq_ignore_ascii_case(dsn.host()) && port.parse::<u16>().ok() == Some(configured)
        }
        _ => false,
    }
}

fn not_registered(name: &str) -> Error {
    Error::ConnectionNotRegistered(name.to_string())
}
