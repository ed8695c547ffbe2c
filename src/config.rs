//! Configuration manager for autha-ldap.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use regex_lite::Regex;
use serde::{Deserialize, Deserializer};
use url::Url;
use zeroize::Zeroizing;

use crate::error::ConfigError;
use crate::user::Flavor;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_TIMEOUT: u64 = 10; // 10 seconds.
const LDAP_PORT: u16 = 389;
const LDAPS_PORT: u16 = 636;
const USERNAME_PLACEHOLDER: &str = "{0}";

type Result<T> = std::result::Result<T, ConfigError>;

/// Root of the `config.yaml` file.
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Which directory schema users are projected from.
    #[serde(default)]
    pub flavor: Flavor,
    /// Maximum duration, in seconds, of each connect, bind and search.
    #[serde(default = "default_timeout", deserialize_with = "seconds")]
    timeout: Duration,
    /// Directories, tried in this order.
    connections: Vec<DirectoryConfig>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT)
}

fn seconds<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl Configuration {
    /// Reads and validates the configuration file located at `path`.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: Configuration = serde_yaml::from_reader(file)?;
        config.validate()
    }

    /// Parses and validates a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Configuration = serde_yaml::from_str(yaml)?;
        config.validate()
    }

    /// Build a configuration from already constructed directories.
    pub fn new(
        flavor: Flavor,
        connections: Vec<DirectoryConfig>,
    ) -> Result<Self> {
        Self {
            flavor,
            timeout: default_timeout(),
            connections,
        }
        .validate()
    }

    /// Update per-operation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Per-operation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Validated directories, tried in this order.
    pub fn connections(&self) -> &[DirectoryConfig] {
        &self.connections
    }

    fn validate(mut self) -> Result<Self> {
        if self.connections.is_empty() {
            return Err(ConfigError::NoConnection);
        }

        for (i, connection) in self.connections.iter().enumerate() {
            if self.connections[..i]
                .iter()
                .any(|c| c.friendly_name == connection.friendly_name)
            {
                return Err(ConfigError::DuplicateName(
                    connection.friendly_name.clone(),
                ));
            }
        }

        for connection in self.connections.iter_mut() {
            connection.compile()?;
        }

        Ok(self)
    }
}

/// Directory Endpoint Configuration.
#[derive(Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Unique name, usable as an explicit domain.
    pub friendly_name: String,
    /// Hostname, or `ldap://` / `ldaps://` URL, of the directory.
    pub url: String,
    /// `0` means the default port for the transport.
    #[serde(default)]
    pub port: u16,
    /// Use LDAPS.
    #[serde(default)]
    pub ssl: bool,
    /// Verify the server certificate when `ssl` is set.
    #[serde(default = "default_true")]
    pub tls_verify: bool,
    /// Service account used to search.
    pub bind_dn: String,
    #[serde(deserialize_with = "secret")]
    bind_credentials: Zeroizing<String>,
    /// Subtree root of the search.
    pub search_base: String,
    /// Filter containing `{0}`, e.g. `(&(objectClass=person)(uid={0}))`.
    pub search_filter: String,
    /// If set, only usernames matching this regex are searched here.
    #[serde(default)]
    pub pre_filter_regex: Option<String>,
    /// Additional attributes projected as claims.
    #[serde(default)]
    pub extra_attributes: Vec<String>,
    #[serde(skip)]
    pre_filter: Option<Regex>,
}

fn default_true() -> bool {
    true
}

fn secret<'de, D>(
    deserializer: D,
) -> std::result::Result<Zeroizing<String>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(Zeroizing::new)
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("friendly_name", &self.friendly_name)
            .field("url", &self.url)
            .field("port", &self.final_port())
            .field("ssl", &self.ssl)
            .field("bind_dn", &self.bind_dn)
            .field("search_base", &self.search_base)
            .field("search_filter", &self.search_filter)
            .field("pre_filter_regex", &self.pre_filter_regex)
            .field("extra_attributes", &self.extra_attributes)
            .finish_non_exhaustive()
    }
}

impl DirectoryConfig {
    /// Create a new [`DirectoryConfig`] accepting every username.
    pub fn new(
        friendly_name: impl Into<String>,
        url: impl Into<String>,
        bind_dn: impl Into<String>,
        bind_credentials: impl Into<String>,
        search_base: impl Into<String>,
        search_filter: impl Into<String>,
    ) -> Self {
        Self {
            friendly_name: friendly_name.into(),
            url: url.into(),
            port: 0,
            ssl: false,
            tls_verify: true,
            bind_dn: bind_dn.into(),
            bind_credentials: Zeroizing::new(bind_credentials.into()),
            search_base: search_base.into(),
            search_filter: search_filter.into(),
            pre_filter_regex: None,
            extra_attributes: Vec::new(),
            pre_filter: None,
        }
    }

    /// Update `port` of [`DirectoryConfig`].
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable LDAPS.
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Restrict this directory to usernames matching `regex`.
    ///
    /// An invalid pattern is reported by [`Configuration::new`] and matches
    /// nothing meanwhile.
    pub fn with_pre_filter(mut self, regex: impl Into<String>) -> Self {
        let regex = regex.into();
        self.pre_filter = Regex::new(&regex).ok();
        self.pre_filter_regex = Some(regex);
        self
    }

    /// Update `extra_attributes` of [`DirectoryConfig`].
    pub fn with_extra_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_attributes =
            attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Password of the service account.
    pub fn bind_credentials(&self) -> &str {
        &self.bind_credentials
    }

    /// Port actually used to connect.
    pub fn final_port(&self) -> u16 {
        match (self.port, self.ssl) {
            (0, true) => LDAPS_PORT,
            (0, false) => LDAP_PORT,
            (port, _) => port,
        }
    }

    /// Full address of the directory, e.g. `ldaps://ldap.example.com:636`.
    pub fn address(&self) -> std::result::Result<Url, url::ParseError> {
        let scheme = if self.ssl { "ldaps" } else { "ldap" };
        let host = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, host)| host)
            .trim_end_matches('/');

        let mut url = Url::parse(&format!("{scheme}://{host}"))?;
        if url.port().is_none() || self.port != 0 {
            url.set_port(Some(self.final_port()))
                .map_err(|_| url::ParseError::InvalidPort)?;
        }

        Ok(url)
    }

    /// Whether this directory should be searched for `username`.
    pub fn is_concerned(&self, username: &str) -> bool {
        match (&self.pre_filter, self.pre_filter_regex.as_deref()) {
            (Some(regex), _) => regex.is_match(username),
            (None, None | Some("")) => true,
            // Not compiled yet, e.g. deserialized on its own.
            (None, Some(pattern)) => Regex::new(pattern)
                .is_ok_and(|regex| regex.is_match(username)),
        }
    }

    /// Search filter with `username` escaped and substituted.
    pub fn search_filter_for(&self, username: &str) -> String {
        self.search_filter
            .replace(USERNAME_PLACEHOLDER, &ldap3::ldap_escape(username))
    }

    fn compile(&mut self) -> Result<()> {
        if !self.search_filter.contains(USERNAME_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder(
                self.friendly_name.clone(),
            ));
        }

        self.address().map_err(|source| ConfigError::Url {
            name: self.friendly_name.clone(),
            source,
        })?;

        self.pre_filter = match self.pre_filter_regex.as_deref() {
            Some(pattern) if !pattern.is_empty() => {
                Some(Regex::new(pattern).map_err(|source| {
                    ConfigError::Regex {
                        name: self.friendly_name.clone(),
                        source,
                    }
                })?)
            },
            _ => None,
        };

        Ok(())
    }
}
