//! LDAP support.
//!
//! [`Connector`] opens one [`Connection`] per directory attempt. The
//! production implementation is [`Ldap3Connector`], backed by `ldap3`.

mod conn;
#[cfg(test)]
pub(crate) mod mock;

pub use conn::Ldap3Connector;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::SearchEntry;

use crate::config::DirectoryConfig;
use crate::error::DirectoryError;

type Result<T> = std::result::Result<T, DirectoryError>;

/// Open connections to a directory.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new, unbound, connection to `directory`.
    async fn connect(
        &self,
        directory: &DirectoryConfig,
        timeout: Duration,
    ) -> Result<Box<dyn Connection>>;
}

/// One connection to a directory, owned by a single call.
#[async_trait]
pub trait Connection: Send {
    /// Authenticate the connection as `dn`.
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// Subtree search from `base`.
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<Entry>>;

    /// Whether the last bind succeeded.
    fn is_bound(&self) -> bool;

    /// Unbind and release the connection. Errors are ignored.
    async fn close(&mut self);
}

/// A record returned by a directory search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    /// Distinguished name.
    pub dn: String,
    attributes: HashMap<String, Vec<String>>,
}

impl Entry {
    /// Create a new [`Entry`] without attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add a value to `name`.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// First value of attribute `name`.
    ///
    /// Attribute names are compared without case, as LDAP does.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// Every value of attribute `name`.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.attributes
            .get(name)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, values)| values)
            })
            .map_or(&[], Vec::as_slice)
    }

    /// Whether the entry carries attribute `name`.
    pub fn contains(&self, name: &str) -> bool {
        !self.get_all(name).is_empty()
    }
}

impl From<SearchEntry> for Entry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attrs,
        }
    }
}
