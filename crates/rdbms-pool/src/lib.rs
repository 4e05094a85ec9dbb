//! # rdbms-pool
//!
//! Named connection manager for `rdbms-client`.
//!
//! Applications refer to databases by logical name. The manager maps each
//! name to a DSN, creates the [`Connection`](rdbms_client::Connection) on
//! first request and hands the same shared handle to every later caller.
//!
//! ## Features
//!
//! - Lazy creation; `autoconnect=1` in the DSN connects on creation
//! - Lookup by name, by name and login user, or by host with an index to
//!   pick among several entries for one server
//! - Unknown schemes are accepted when configuring and reported when the
//!   connection is first requested
//! - A process-wide instance plus injectable registries for tests
//!
//! ## Example
//!
//! ```rust
//! use rdbms_pool::{ConnectionManager, PoolConfig};
//!
//! let manager = ConnectionManager::new();
//! manager.apply(PoolConfig::parse(
//!     "reports = sybase://report:pw@db1:5000/pubs\n\
//!      archive = sybase://report:pw@db1:5000/archive\n",
//! )?);
//!
//! // second entry for host db1
//! let dsn = manager.dsn("archive").unwrap();
//! assert_eq!(dsn.database(), Some("archive"));
//!
//! let conn = manager.get_by_host("db1", 1)?;
//! assert!(!conn.lock().is_connected());
//! # Ok::<(), rdbms_client::Error>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod pool;

pub use config::{PoolConfig, PoolEntry};
pub use pool::{ConnectionManager, PooledConnection};
