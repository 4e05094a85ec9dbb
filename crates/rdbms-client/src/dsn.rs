//! Connection string (DSN) parsing.
//!
//! A DSN names a driver scheme and where to find the server:
//!
//! ```text
//! scheme://[user[:password]@]host[:port][/path][?flag=value&...]
//! ```
//!
//! User and password are percent-decoded, so `%40` can stand for a literal
//! `@`. Flags keep the order in which they were written, and rendering a
//! parsed DSN with `Display` yields a string that parses back to an equal
//! value.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::error::{Error, Result};

/// Characters escaped in the user and password.
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Characters escaped in flag names and values.
const FLAG: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'=');

/// A parsed connection string.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Dsn {
    scheme: String,
    user: Option<String>,
    password: Option<String>,
    host: String,
    port: Option<u16>,
    path: Option<String>,
    flags: Vec<(String, String)>,
}

impl Dsn {
    /// Parse a connection string.
    pub fn parse(input: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedDsn {
            dsn: redact(input),
            reason: reason.to_owned(),
        };

        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| malformed("missing '://'"))?;
        if scheme.is_empty() {
            return Err(malformed("empty scheme"));
        }

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };

        let (userinfo, after_at) = match location.rfind('@') {
            Some(at) => (Some(&location[..at]), &location[at + 1..]),
            None => (None, location),
        };
        let (authority, path) = match after_at.find('/') {
            Some(slash) => (&after_at[..slash], Some(&after_at[slash..])),
            None => (after_at, None),
        };

        let (user, password) = match userinfo {
            None => (None, None),
            Some(info) => {
                let (user, password) = match info.split_once(':') {
                    Some((user, password)) => (user, Some(password)),
                    None => (info, None),
                };
                let user = decode(user).map_err(|_| malformed("user is not valid UTF-8"))?;
                let password = password
                    .map(decode)
                    .transpose()
                    .map_err(|_| malformed("password is not valid UTF-8"))?;
                (Some(user), password)
            }
        };

        let (host, port) = split_host_port(authority).map_err(malformed)?;

        let mut dsn = Self {
            scheme: scheme.to_owned(),
            user,
            password,
            host: host.to_owned(),
            port,
            path: path.filter(|p| !p.is_empty()).map(str::to_owned),
            flags: Vec::new(),
        };

        for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = decode(name).map_err(|_| malformed("flag name is not valid UTF-8"))?;
            let value = decode(value).map_err(|_| malformed("flag value is not valid UTF-8"))?;
            dsn.set_flag(name, value);
        }

        Ok(dsn)
    }

    /// Driver scheme, e.g. `sybase`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Login name.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Password.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Server host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Explicit port, or `default`.
    #[must_use]
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }

    /// Path including its leading `/`.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Database name: the path without its leading `/`.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.path
            .as_deref()
            .map(|p| p.trim_start_matches('/'))
            .filter(|db| !db.is_empty())
    }

    /// Value of a flag.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether a flag is set to `1`, `true` or `yes`.
    #[must_use]
    pub fn bool_flag(&self, name: &str) -> bool {
        self.flag(name).is_some_and(|v| {
            v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
        })
    }

    /// All flags in insertion order.
    pub fn flags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.flags.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Copy with a different login name.
    #[must_use]
    pub fn with_user(&self, user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..self.clone()
        }
    }

    /// Copy with a different password.
    #[must_use]
    pub fn with_password(&self, password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..self.clone()
        }
    }

    /// Copy without the password, for logging and error messages.
    #[must_use]
    pub fn without_password(&self) -> Self {
        Self {
            password: None,
            ..self.clone()
        }
    }

    /// Copy with a flag added or replaced in place.
    #[must_use]
    pub fn with_flag(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.set_flag(name.into(), value.into());
        copy
    }

    fn set_flag(&mut self, name: String, value: String) {
        match self.flags.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.flags.push((name, value)),
        }
    }
}

fn decode(raw: &str) -> std::result::Result<String, std::str::Utf8Error> {
    percent_decode_str(raw).decode_utf8().map(|s| s.into_owned())
}

/// Strip the password from unparsed input so it never reaches error text.
///
/// Input without `://` is redacted the same way, up to its last `@`.
fn redact(input: &str) -> String {
    let (prefix, rest) = match input.split_once("://") {
        Some((scheme, rest)) => (format!("{scheme}://"), rest),
        None => (String::new(), input),
    };
    let location_end = rest.find('?').unwrap_or(rest.len());
    match rest[..location_end].rfind('@') {
        Some(at) => match rest[..at].split_once(':') {
            Some((user, _)) => format!("{prefix}{user}:***{}", &rest[at..]),
            None => input.to_owned(),
        },
        None => input.to_owned(),
    }
}

fn split_host_port(authority: &str) -> std::result::Result<(&str, Option<u16>), &'static str> {
    // bracketed IPv6 literal
    let (host, port) = if authority.starts_with('[') {
        let close = authority.find(']').ok_or("unterminated IPv6 address")?;
        let host = &authority[..=close];
        match &authority[close + 1..] {
            "" => (host, None),
            rest => (host, Some(rest.strip_prefix(':').ok_or("junk after IPv6 address")?)),
        }
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let port = port
        .map(|p| p.parse::<u16>().map_err(|_| "invalid port"))
        .transpose()?;
    Ok((host, port))
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}", utf8_percent_encode(user, USERINFO))?;
            if let Some(password) = &self.password {
                write!(f, ":{}", utf8_percent_encode(password, USERINFO))?;
            }
            f.write_str("@")?;
        }
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if let Some(path) = &self.path {
            f.write_str(path)?;
        }
        for (i, (name, value)) in self.flags.iter().enumerate() {
            f.write_str(if i == 0 { "?" } else { "&" })?;
            write!(
                f,
                "{}={}",
                utf8_percent_encode(name, FLAG),
                utf8_percent_encode(value, FLAG)
            )?;
        }
        Ok(())
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dsn")
            .field("scheme", &self.scheme)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("flags", &self.flags)
            .finish()
    }
}

impl FromStr for Dsn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Dsn {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Dsn {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
