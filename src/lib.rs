//! Multi-directory LDAP credential validation and identity lookup.
//!
//! A [`LdapService`] searches the configured directories in order, verifies
//! passwords by re-binding as the found entry and projects directory records
//! into [`User`]s. [`UserStore`] wraps it for identity provider hosts.

#![forbid(unsafe_code)]
#![deny(unused_mut)]

pub mod cache;
pub mod config;
pub mod error;
pub mod ldap;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod user;

pub use cache::CachedUserStore;
pub use config::{Configuration, DirectoryConfig};
pub use error::{Error, Result};
pub use service::{Authenticator, LdapService};
pub use store::UserStore;
pub use user::{Flavor, User};
