//! Client error types.

use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The connection string could not be parsed.
    #[error("malformed DSN '{dsn}': {reason}")]
    MalformedDsn {
        /// The offending input.
        dsn: String,
        /// What was wrong with it.
        reason: String,
    },

    /// No driver is registered for the scheme.
    #[error("no driver registered for scheme '{0}'")]
    DriverNotSupported(String),

    /// Pool lookup miss.
    #[error("no connection registered for '{0}'")]
    ConnectionNotRegistered(String),

    /// Network or authentication failure while connecting.
    #[error("unable to connect to {dsn}: {source}")]
    ConnectFailed {
        /// DSN of the failed connection, password removed.
        dsn: String,
        /// Underlying cause.
        #[source]
        source: Box<Error>,
    },

    /// Operation attempted on a closed or never-opened connection.
    #[error("not connected")]
    NotConnected,

    /// The server rejected the statement or it could not be built.
    #[error("statement failed: {message}")]
    StatementFailed {
        /// Server or client message.
        message: String,
        /// Server message number, when the server reported one.
        code: Option<i32>,
        /// Statement text, when one was sent.
        sql: Option<String>,
    },

    /// Cursor reposition unsupported or out of range.
    #[error("{0}")]
    SeekFailed(String),

    /// Unparseable byte sequence on the wire.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds_protocol::ProtocolError),

    /// Framing or transport error below the tokenizer.
    #[error("codec error: {0}")]
    Codec(#[from] tds_codec::CodecError),

    /// Type conversion error.
    #[error("type error: {0}")]
    Type(#[from] rdbms_types::TypeError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// A `StatementFailed` raised on the client side.
    pub fn statement(message: impl Into<String>) -> Self {
        Self::StatementFailed {
            message: message.into(),
            code: None,
            sql: None,
        }
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// Nothing in this crate retries; the flag is for callers.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::NotConnected => true,
            Self::Codec(e) => !e.is_protocol_error(),
            Self::ConnectFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Check if this error indicates a malformed or unexpected byte stream.
    ///
    /// A connection that saw one of these is poisoned and closed.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        match self {
            Self::Protocol(_) => true,
            Self::Codec(e) => e.is_protocol_error(),
            _ => false,
        }
    }

    /// Whether the transport is unusable after this error.
    #[must_use]
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Codec(_) | Self::Protocol(_))
    }

    /// Server message number for statement failures.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::StatementFailed { code, .. } => *code,
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_classification() {
        let err = Error::from(tds_protocol::ProtocolError::UnexpectedEof);
        assert!(err.is_protocol_error());
        assert!(!err.is_transient());

        let err = Error::from(tds_codec::CodecError::ConnectionClosed);
        assert!(!err.is_protocol_error());
        assert!(err.is_transient());
        assert!(err.is_fatal_to_connection());
    }

    #[test]
    fn test_connect_failed_keeps_source() {
        let err = Error::ConnectFailed {
            dsn: "sybase://db1".into(),
            source: Box::new(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            ))),
        };
        assert!(err.is_transient());
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("IO error: refused"));
    }

    #[test]
    fn test_statement_code() {
        let err = Error::StatementFailed {
            message: "Incorrect syntax".into(),
            code: Some(102),
            sql: Some("selec 1".into()),
        };
        assert_eq!(err.code(), Some(102));
        assert_eq!(err.to_string(), "statement failed: Incorrect syntax");
    }
}
