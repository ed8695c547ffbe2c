//! Application users projected from directory records.

mod active_directory;
mod open_ldap;

pub use active_directory::ActiveDirectoryProjector;
pub use open_ldap::OpenLdapProjector;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ldap::Entry;

/// Claim types emitted by projectors.
pub mod claims {
    pub const SUBJECT: &str = "sub";
    pub const NAME: &str = "name";
    pub const GIVEN_NAME: &str = "given_name";
    pub const FAMILY_NAME: &str = "family_name";
    pub const PREFERRED_USERNAME: &str = "preferred_username";
    pub const EMAIL: &str = "email";
    pub const PHONE_NUMBER: &str = "phone_number";
    pub const DESCRIPTION: &str = "description";
    pub const ROLE: &str = "role";
}

/// Provider tag used when no domain was requested.
pub const LOCAL_PROVIDER: &str = "local";

/// A `(type, value)` identity attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claim {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Claim {
    /// Create a new [`Claim`].
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// User built from a directory record.
///
/// `User::default()` is the empty user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct User {
    pub subject_id: Option<String>,
    pub username: Option<String>,
    /// Domain which found the user, or [`LOCAL_PROVIDER`].
    pub provider_name: String,
    pub display_name: Option<String>,
    pub dn: String,
    pub claims: Vec<Claim>,
}

impl User {
    /// First value of claim `kind`.
    pub fn claim(&self, kind: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|claim| claim.kind == kind)
            .map(|claim| claim.value.as_str())
    }

    /// Every value of claim `kind`.
    pub fn claims_of<'a>(
        &'a self,
        kind: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |claim| claim.kind == kind)
            .map(|claim| claim.value.as_str())
    }
}

/// Build [`User`]s from one directory schema.
pub trait Projector: Send + Sync + fmt::Debug {
    /// Attributes every search must request.
    fn required_attributes(&self) -> &'static [&'static str];

    /// Project `entry` into a [`User`].
    ///
    /// Missing attributes leave fields unset; `extra_attributes` found on
    /// the entry are appended as claims, in the supplied order.
    fn project(
        &self,
        entry: &Entry,
        provider: &str,
        extra_attributes: &[String],
    ) -> User;
}

/// Directory schema users are read from.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    #[default]
    OpenLdap,
    ActiveDirectory,
}

impl Flavor {
    /// Projector of this flavor.
    pub fn projector(self) -> Arc<dyn Projector> {
        match self {
            Self::OpenLdap => Arc::new(OpenLdapProjector),
            Self::ActiveDirectory => Arc::new(ActiveDirectoryProjector),
        }
    }
}

/// Attribute names backing each base field and claim.
struct Schema {
    username: &'static str,
    display_name: &'static str,
    given_name: &'static str,
    family_name: &'static str,
    preferred_username: &'static str,
    email: &'static str,
    phone_number: &'static str,
    description: &'static str,
    member_of: &'static str,
}

impl Schema {
    fn project(
        &self,
        entry: &Entry,
        provider: &str,
        extra_attributes: &[String],
    ) -> User {
        let username = entry.get(self.username).map(str::to_owned);
        let display_name = entry.get(self.display_name).map(str::to_owned);

        let mut claims = Vec::new();
        let base = [
            (claims::SUBJECT, self.username),
            (claims::NAME, self.display_name),
            (claims::GIVEN_NAME, self.given_name),
            (claims::FAMILY_NAME, self.family_name),
            (claims::PREFERRED_USERNAME, self.preferred_username),
            (claims::EMAIL, self.email),
            (claims::PHONE_NUMBER, self.phone_number),
            (claims::DESCRIPTION, self.description),
        ];
        for (kind, attribute) in base {
            if let Some(value) = entry.get(attribute) {
                claims.push(Claim::new(kind, value));
            }
        }

        claims.extend(
            entry
                .get_all(self.member_of)
                .iter()
                .map(|group| Claim::new(claims::ROLE, group)),
        );

        for attribute in extra_attributes {
            if let Some(value) = entry.get(attribute) {
                claims.push(Claim::new(attribute, value));
            }
        }

        User {
            subject_id: username.clone(),
            username,
            provider_name: provider.to_owned(),
            display_name,
            dn: entry.dn.clone(),
            claims,
        }
    }
}
