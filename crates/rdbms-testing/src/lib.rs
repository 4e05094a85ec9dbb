//! # rdbms-testing
//!
//! Test infrastructure for the connectivity layer.
//!
//! Nothing here needs a live database server:
//!
//! - [`MockTdsServer`] speaks the wire protocol in memory, so the real
//!   [`TdsDriver`](rdbms_client::TdsDriver) and token reader run against it
//! - [`TokenStream`] builds raw token streams for decoder tests
//! - [`MockDatabase`] backs a scripted `mock://` driver for connection and
//!   pool tests that do not care about the wire
//! - [`fixtures`] holds canned tables
//!
//! ## Mock Server Example
//!
//! ```rust
//! use rdbms_client::Dsn;
//! use rdbms_testing::{MockColumn, MockResponse, MockTdsServer, ScalarValue};
//!
//! let server = MockTdsServer::builder()
//!     .with_response(
//!         "select id, name from users",
//!         MockResponse::rows(
//!             vec![MockColumn::int("id"), MockColumn::varchar("name", 50)],
//!             vec![vec![ScalarValue::Int(1), ScalarValue::from("Alice")]],
//!         ),
//!     )
//!     .build();
//!
//! let mut conn = server.registry().create(&Dsn::parse("mssql://sa:pw@localhost")?)?;
//! conn.connect()?;
//! let rows = conn.select("select id, name from users", &[])?;
//! assert_eq!(rows.len(), 1);
//! # Ok::<(), rdbms_client::Error>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_driver;
pub mod mock_server;
pub mod stream;

pub use fixtures::TestFixture;
pub use mock_driver::{MOCK_SCHEME, MockDatabase, MockDriver};
pub use mock_server::{
    MockResponse, MockServerBuilder, MockServerConfig, MockServerError, MockTdsServer,
    MockTransport, RecordedPacket,
};
pub use stream::{ColumnKind, MockColumn, ScalarValue, TokenStream, packetize};
