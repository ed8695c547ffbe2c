//! OpenLDAP (`inetOrgPerson`) users.

use super::{Projector, Schema, User};
use crate::ldap::Entry;

const SCHEMA: Schema = Schema {
    username: "uid",
    display_name: "displayName",
    given_name: "givenName",
    family_name: "sn",
    preferred_username: "cn",
    email: "mail",
    phone_number: "telephoneNumber",
    description: "description",
    member_of: "memberOf",
};

const REQUIRED_ATTRIBUTES: &[&str] = &[
    "uid",
    "cn",
    "displayName",
    "givenName",
    "sn",
    "mail",
    "telephoneNumber",
    "description",
    "memberOf",
];

/// Project `inetOrgPerson` entries; `uid` is the username.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenLdapProjector;

impl Projector for OpenLdapProjector {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::claims;

    fn entry() -> Entry {
        Entry::new("uid=jdoe,ou=users,dc=example,dc=org")
            .with_attribute("uid", "jdoe")
            .with_attribute("cn", "John Doe")
            .with_attribute("givenName", "John")
            .with_attribute("sn", "Doe")
            .with_attribute("mail", "jdoe@example.org")
            .with_attribute("memberOf", "cn=admins,ou=groups,dc=example,dc=org")
            .with_attribute("memberOf", "cn=devs,ou=groups,dc=example,dc=org")
    }

    #[test]
    fn test_project() {
        let user = OpenLdapProjector.project(&entry(), "local", &[]);

        assert_eq!(user.username.as_deref(), Some("jdoe"));
        assert_eq!(user.subject_id.as_deref(), Some("jdoe"));
        assert_eq!(user.provider_name, "local");
        assert_eq!(user.dn, "uid=jdoe,ou=users,dc=example,dc=org");
        assert!(user.display_name.is_none());

        let kinds: Vec<&str> =
            user.claims.iter().map(|c| c.kind.as_str()).collect();
        assert_eq!(
            kinds,
            [
                claims::SUBJECT,
                claims::GIVEN_NAME,
                claims::FAMILY_NAME,
                claims::PREFERRED_USERNAME,
                claims::EMAIL,
                claims::ROLE,
                claims::ROLE,
            ]
        );
        assert_eq!(user.claims_of(claims::ROLE).count(), 2);
    }

    #[test]
    fn test_missing_username() {
        let entry = Entry::new("cn=orphan,dc=example,dc=org")
            .with_attribute("cn", "orphan");
        let user = OpenLdapProjector.project(&entry, "local", &[]);

        assert!(user.username.is_none());
        assert!(user.subject_id.is_none());
        assert_eq!(user.claim(claims::PREFERRED_USERNAME), Some("orphan"));
    }
}
