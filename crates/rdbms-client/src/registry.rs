//! Scheme-to-driver registry.
//!
//! ```
//! use rdbms_client::{DriverRegistry, Dsn, Error};
//!
//! let registry = DriverRegistry::with_defaults();
//! assert!(registry.supports("sybase"));
//!
//! let dsn = Dsn::parse("invalid://db1")?;
//! assert!(matches!(registry.create(&dsn), Err(Error::DriverNotSupported(_))));
//! # Ok::<(), rdbms_client::Error>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::connection::{Connection, Driver};
use crate::dsn::Dsn;
use crate::error::{Error, Result};
use crate::tds::TdsDriver;

/// Builds drivers for one scheme.
pub trait DriverFactory: Send + Sync {
    /// New, unconnected driver for `dsn`.
    fn create(&self, dsn: &Dsn) -> Result<Box<dyn Driver>>;
}

impl<F> DriverFactory for F
where
    F: Fn(&Dsn) -> Result<Box<dyn Driver>> + Send + Sync,
{
    fn create(&self, dsn: &Dsn) -> Result<Box<dyn Driver>> {
        self(dsn)
    }
}

static GLOBAL: Lazy<DriverRegistry> = Lazy::new(DriverRegistry::with_defaults);

/// Maps DSN schemes to driver factories.
///
/// Schemes compare case-insensitively. Registering a scheme twice replaces
/// the first factory.
#[derive(Default)]
pub struct DriverRegistry {
    factories: RwLock<BTreeMap<String, Arc<dyn DriverFactory>>>,
}

impl DriverRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `sybase` and `mssql` drivers.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("sybase", |_: &Dsn| -> Result<Box<dyn Driver>> {
            Ok(Box::new(TdsDriver::sybase()))
        });
        registry.register("mssql", |_: &Dsn| -> Result<Box<dyn Driver>> {
            Ok(Box::new(TdsDriver::mssql()))
        });
        registry
    }

    /// The process-wide registry.
    pub fn global() -> &'static DriverRegistry {
        &GLOBAL
    }

    /// Register `factory` for `scheme`, replacing any previous one.
    pub fn register(&self, scheme: impl AsRef<str>, factory: impl DriverFactory + 'static) {
        let scheme = scheme.as_ref().to_ascii_lowercase();
        tracing::debug!(scheme = %scheme, "registering driver");
        self.factories.write().insert(scheme, Arc::new(factory));
    }

    /// Whether a driver is registered for `scheme`.
    #[must_use]
    pub fn supports(&self, scheme: &str) -> bool {
        self.factories
            .read()
            .contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes, sorted.
    #[must_use]
    pub fn schemes(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }

    /// Unconnected connection for `dsn`.
    pub fn create(&self, dsn: &Dsn) -> Result<Connection> {
        let factory = self
            .factories
            .read()
            .get(&dsn.scheme().to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::DriverNotSupported(dsn.scheme().to_string()))?;

        let driver = factory.create(dsn)?;
        Connection::new(dsn.clone(), driver)
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
