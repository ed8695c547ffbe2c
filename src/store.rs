//! User store consumed by an identity provider host.

use crate::error::Result;
use crate::service::Authenticator;
use crate::user::User;

/// Expose validate and lookup operations over an [`Authenticator`].
///
/// A failed credential check is `Ok(None)`, indistinguishable from an
/// unknown user. Errors other than [`Error::LoginFailed`] are returned
/// unchanged.
///
/// [`Error::LoginFailed`]: crate::error::Error::LoginFailed
#[derive(Debug, Clone)]
pub struct UserStore<A> {
    authenticator: A,
}

impl<A: Authenticator> UserStore<A> {
    /// Create a new [`UserStore`].
    pub fn new(authenticator: A) -> Self {
        Self { authenticator }
    }

    /// Inner [`Authenticator`].
    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    /// Check `password` against every concerned directory.
    pub async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>> {
        self.validate_credentials_in(username, password, None).await
    }

    /// Check `password` against directory `domain` only.
    pub async fn validate_credentials_in(
        &self,
        username: &str,
        password: &str,
        domain: Option<&str>,
    ) -> Result<Option<User>> {
        match self.authenticator.login(username, password, domain).await {
            Ok(user) => Ok(user),
            Err(err) if err.is_login_failed() => {
                tracing::debug!(%username, %err, "credentials rejected");
                Ok(None)
            },
            Err(err) => Err(err),
        }
    }

    /// Find a user by its subject identifier.
    pub async fn find_by_subject_id(&self, subject_id: &str) -> Option<User> {
        self.authenticator.find_user(subject_id, None).await
    }

    /// Find a user by its username.
    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        self.find_by_username_in(username, None).await
    }

    /// Find a user by its username on directory `domain` only.
    pub async fn find_by_username_in(
        &self,
        username: &str,
        domain: Option<&str>,
    ) -> Option<User> {
        self.authenticator.find_user(username, domain).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::{DirectoryError, Error, LoginFailure};

    pub const PASSWORD: &str = "correct horse";

    /// Outcome served by [`StubAuthenticator`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Outcome {
        Found,
        Missing,
        Rejected,
        Broken,
    }

    /// Authenticator knowing a single `jdoe` user and counting its calls.
    #[derive(Debug)]
    pub struct StubAuthenticator {
        pub outcome: Outcome,
        pub logins: AtomicUsize,
        pub lookups: AtomicUsize,
    }

    impl StubAuthenticator {
        pub fn new(outcome: Outcome) -> Self {
            Self {
                outcome,
                logins: AtomicUsize::new(0),
                lookups: AtomicUsize::new(0),
            }
        }

        fn user(domain: Option<&str>) -> User {
            User {
                subject_id: Some("jdoe".into()),
                username: Some("jdoe".into()),
                provider_name: domain.unwrap_or("local").into(),
                dn: "uid=jdoe,dc=example,dc=org".into(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Authenticator for StubAuthenticator {
        async fn login(
            &self,
            username: &str,
            password: &str,
            domain: Option<&str>,
        ) -> Result<Option<User>> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Broken => Err(Error::internal(
                    "directory client crashed",
                    std::io::Error::other("out of file descriptors"),
                )),
                Outcome::Rejected => Err(DirectoryError::Timeout.into()),
                Outcome::Missing => Err(LoginFailure::UserNotFound.into()),
                Outcome::Found
                    if username == "jdoe" && password == PASSWORD =>
                {
                    Ok(Some(Self::user(domain)))
                },
                Outcome::Found if username == "jdoe" => {
                    Err(LoginFailure::InvalidCredentials.into())
                },
                Outcome::Found => Err(LoginFailure::UserNotFound.into()),
            }
        }

        async fn find_user(
            &self,
            username: &str,
            domain: Option<&str>,
        ) -> Option<User> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            (self.outcome == Outcome::Found && username == "jdoe")
                .then(|| Self::user(domain))
        }
    }

    #[tokio::test]
    async fn test_validate_credentials() {
        let store = UserStore::new(StubAuthenticator::new(Outcome::Found));

        let user = store
            .validate_credentials("jdoe", PASSWORD)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.provider_name, "local");

        let user = store
            .validate_credentials_in("jdoe", PASSWORD, Some("corp"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.provider_name, "corp");

        // Wrong password and unknown user look the same.
        assert!(
            store
                .validate_credentials("jdoe", "wrong")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .validate_credentials("nobody", PASSWORD)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_login_failures_are_absorbed() {
        for outcome in [Outcome::Missing, Outcome::Rejected] {
            let store = UserStore::new(StubAuthenticator::new(outcome));
            assert!(
                store
                    .validate_credentials("jdoe", PASSWORD)
                    .await
                    .unwrap()
                    .is_none()
            );
        }
    }

    #[tokio::test]
    async fn test_unexpected_errors_propagate() {
        let store = UserStore::new(StubAuthenticator::new(Outcome::Broken));

        let err = store
            .validate_credentials("jdoe", PASSWORD)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
        assert!(err.to_string().contains("directory client crashed"));
    }

    #[tokio::test]
    async fn test_find() {
        let store = UserStore::new(StubAuthenticator::new(Outcome::Found));

        assert_eq!(
            store.find_by_subject_id("jdoe").await.unwrap().dn,
            "uid=jdoe,dc=example,dc=org"
        );
        assert!(store.find_by_username("jdoe").await.is_some());
        assert_eq!(
            store
                .find_by_username_in("jdoe", Some("corp"))
                .await
                .unwrap()
                .provider_name,
            "corp"
        );
        assert!(store.find_by_username("nobody").await.is_none());
        assert_eq!(store.authenticator().lookups.load(Ordering::SeqCst), 4);

        let store = UserStore::new(StubAuthenticator::new(Outcome::Broken));
        assert!(store.find_by_subject_id("jdoe").await.is_none());
    }
}
