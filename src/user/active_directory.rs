//! Active Directory users.

use super::{Projector, Schema, User};
use crate::ldap::Entry;

const SCHEMA: Schema = Schema {
    username: "sAMAccountName",
    display_name: "displayName",
    given_name: "givenName",
    family_name: "sn",
    preferred_username: "userPrincipalName",
    email: "mail",
    phone_number: "telephoneNumber",
    description: "description",
    member_of: "memberOf",
};

const REQUIRED_ATTRIBUTES: &[&str] = &[
    "distinguishedName",
    "cn",
    "name",
    "displayName",
    "givenName",
    "sn",
    "userPrincipalName",
    "sAMAccountName",
    "mail",
    "telephoneNumber",
    "description",
    "memberOf",
];

/// Project Active Directory `user` entries; `sAMAccountName` is the
/// username.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActiveDirectoryProjector;

impl Projector for ActiveDirectoryProjector {
    fn required_attributes(&self) -> &'static [&'static str] {
        REQUIRED_ATTRIBUTES
    }

    fn project(
        &self,
        entry: &Entry,
        provider: &str,
        extra_attributes: &[String],
    ) -> User {
        SCHEMA.project(entry, provider, extra_attributes)
    }
}
