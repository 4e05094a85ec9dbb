//! Manager configuration.
//!
//! A [`PoolConfig`] is the ordered list of logical names and DSNs the
//! [`ConnectionManager`](crate::ConnectionManager) serves. Where the list
//! comes from is up to the caller; [`PoolConfig::parse`] reads the simple
//! `name = dsn` line format.

use std::str::FromStr;

use rdbms_client::{Dsn, Error, Result};

/// One configured connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    /// Logical name, unique within a configuration.
    pub name: String,
    /// Where to connect.
    pub dsn: Dsn,
}

/// Ordered name to DSN mapping.
///
/// Names are unique; adding a name again replaces its DSN in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolConfig {
    entries: Vec<PoolEntry>,
}

impl PoolConfig {
    /// Empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every DSN of `pairs`.
    ///
    /// Fails on the first malformed DSN. Schemes are not checked against
    /// any registry.
    pub fn from_pairs<I, N, D>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: AsRef<str>,
    {
        pairs
            .into_iter()
            .try_fold(Self::new(), |config, (name, dsn)| {
                config.with_entry(name, dsn.as_ref())
            })
    }

    /// Parse `name = dsn` lines.
    ///
    /// Blank lines and lines starting with `#` are skipped.
    ///
    /// ```rust
    /// use rdbms_pool::PoolConfig;
    ///
    /// let config = PoolConfig::parse(
    ///     "# reporting\n\
    ///      reports = sybase://report:pw@db1:5000/pubs\n\
    ///      audit   = mssql://audit@db2/audit?autoconnect=1\n",
    /// )?;
    /// assert_eq!(config.names(), ["reports", "audit"]);
    /// # Ok::<(), rdbms_client::Error>(())
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let mut config = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, dsn) = line.split_once('=').ok_or_else(|| Error::MalformedDsn {
                dsn: line.to_string(),
                reason: format!("line {} is not of the form 'name = dsn'", lineno + 1),
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::MalformedDsn {
                    dsn: dsn.trim().to_string(),
                    reason: format!("line {} has no connection name", lineno + 1),
                });
            }
            config = config.with_entry(name, dsn.trim())?;
        }
        Ok(config)
    }

    /// Add or replace an entry.
    pub fn with_entry(mut self, name: impl Into<String>, dsn: &str) -> Result<Self> {
        let dsn = Dsn::parse(dsn)?;
        self.insert(name.into(), dsn);
        Ok(self)
    }

    /// Add or replace an already parsed entry.
    #[must_use]
    pub fn with_dsn(mut self, name: impl Into<String>, dsn: Dsn) -> Self {
        self.insert(name.into(), dsn);
        self
    }

    /// Entries in configuration order.
    #[must_use]
    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    /// Names in configuration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// DSN configured for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Dsn> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.dsn)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, name: String, dsn: Dsn) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.dsn = dsn,
            None => self.entries.push(PoolEntry { name, dsn }),
        }
    }
}

impl FromStr for PoolConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl IntoIterator for PoolConfig {
    type Item = PoolEntry;
    type IntoIter = std::vec::IntoIter<PoolEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
