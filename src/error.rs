//! Error handler for autha-ldap.
//!
//! Errors are split in three tiers:
//! - [`DirectoryError`], raised by a single directory (connect, bind,
//!   search, timeout);
//! - [`LoginFailure`], the reason why a credential check or a lookup did not
//!   yield a user;
//! - [`Error`], what the public API returns.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Result code returned by a directory when a bind is rejected.
const INVALID_CREDENTIALS: u32 = 49;

/// Enum representing every error the engine may return.
#[derive(Debug, Error)]
pub enum Error {
    #[error("login failed: {0}")]
    LoginFailed(#[source] LoginFailure),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create an [`Error::Internal`] from any error.
    pub fn internal<E>(details: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            details: details.into(),
            source: Some(Box::new(err)),
        }
    }

    /// Whether the error is an expected credential failure.
    ///
    /// Anything else is an operational error and must reach the caller.
    pub fn is_login_failed(&self) -> bool {
        matches!(self, Self::LoginFailed(_))
    }

    /// Get the underlying [`LoginFailure`], if any.
    pub fn login_failure(&self) -> Option<&LoginFailure> {
        match self {
            Self::LoginFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<LoginFailure> for Error {
    fn from(failure: LoginFailure) -> Self {
        Self::LoginFailed(failure)
    }
}

impl From<DirectoryError> for Error {
    fn from(err: DirectoryError) -> Self {
        Self::LoginFailed(LoginFailure::Directory(err))
    }
}

/// Why a user could not be authenticated or found.
#[derive(Debug, Error)]
pub enum LoginFailure {
    #[error("no searchable directory")]
    NoSearchableDirectory,

    #[error("user not found in any directory")]
    UserNotFound,

    #[error("directory rejected the supplied credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl LoginFailure {
    /// Short label used on logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoSearchableDirectory => "no_searchable_directory",
            Self::UserNotFound => "user_not_found",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Directory(DirectoryError::Timeout) => "timeout",
            Self::Directory(_) => "directory_error",
        }
    }
}

/// Errors raised while talking to one directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("cannot connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: ldap3::LdapError,
    },

    #[error("bind rejected with result code {rc}: {text}")]
    Bind { rc: u32, text: String },

    #[error("directory operation timed out")]
    Timeout,

    #[error("LDAP error: {0}")]
    Ldap(#[from] ldap3::LdapError),

    #[error("directory address is invalid: {0}")]
    Url(#[from] url::ParseError),
}

impl DirectoryError {
    /// Whether the directory explicitly refused the bind credentials.
    pub fn is_invalid_credentials(&self) -> bool {
        match self {
            Self::Bind { rc, .. } => *rc == INVALID_CREDENTIALS,
            Self::Ldap(ldap3::LdapError::LdapResult { result }) => {
                result.rc == INVALID_CREDENTIALS
            },
            _ => false,
        }
    }
}

impl From<tokio::time::error::Elapsed> for DirectoryError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

/// Errors that may occur while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to deserialize configuration: {0}")]
    Deserialize(#[from] serde_yaml::Error),

    #[error("at least one directory connection must be configured")]
    NoConnection,

    #[error("directory `{0}` is configured more than once")]
    DuplicateName(String),

    #[error("search filter of `{0}` must contain the `{{0}}` placeholder")]
    MissingPlaceholder(String),

    #[error("pre-filter regex of `{name}` is invalid: {source}")]
    Regex {
        name: String,
        #[source]
        source: regex_lite::Error,
    },

    #[error("address of `{name}` is invalid: {source}")]
    Url {
        name: String,
        #[source]
        source: url::ParseError,
    },
}
