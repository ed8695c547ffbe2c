//! Directory search engine and authentication workflows.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time;

use crate::config::{Configuration, DirectoryConfig};
use crate::error::{DirectoryError, Error, LoginFailure, Result};
use crate::ldap::{Connection, Connector, Entry, Ldap3Connector};
use crate::telemetry::Telemetry;
use crate::user::{LOCAL_PROVIDER, Projector, User};

/// Credential validation and user lookup against directories.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify `password` for `username`.
    ///
    /// Returns `Ok(None)` when the directory returned no record, and
    /// [`Error::LoginFailed`] when the user is unknown, the password is
    /// rejected or a directory failed.
    async fn login(
        &self,
        username: &str,
        password: &str,
        domain: Option<&str>,
    ) -> Result<Option<User>>;

    /// Find `username` without verifying any credential.
    ///
    /// Every error is logged and reported as no user.
    async fn find_user(&self, username: &str, domain: Option<&str>)
    -> Option<User>;
}

/// Open connection whose search returned records.
///
/// The connection belongs to the caller, which must close it.
struct SearchSession<'a> {
    connection: Box<dyn Connection>,
    entries: Vec<Entry>,
    directory: &'a DirectoryConfig,
}

/// [`Authenticator`] over the configured directories.
pub struct LdapService {
    config: Configuration,
    connector: Arc<dyn Connector>,
    projector: Arc<dyn Projector>,
    telemetry: Arc<dyn Telemetry>,
}

impl LdapService {
    /// Create a new [`LdapService`] talking LDAP with `ldap3`.
    pub fn new(config: Configuration, telemetry: Arc<dyn Telemetry>) -> Self {
        Self::with_connector(config, Arc::new(Ldap3Connector), telemetry)
    }

    /// Create a new [`LdapService`] opening connections with `connector`.
    pub fn with_connector(
        config: Configuration,
        connector: Arc<dyn Connector>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        let projector = config.flavor.projector();

        Self {
            config,
            connector,
            projector,
            telemetry,
        }
    }

    /// Replace the projector chosen from the configured flavor.
    pub fn with_projector(mut self, projector: Arc<dyn Projector>) -> Self {
        self.projector = projector;
        self
    }

    /// Attributes requested from `directory`.
    fn attributes(&self, directory: &DirectoryConfig) -> Vec<String> {
        let mut attributes: Vec<String> = self
            .projector
            .required_attributes()
            .iter()
            .map(|attribute| (*attribute).to_owned())
            .collect();

        for extra in &directory.extra_attributes {
            if !attributes.contains(extra) {
                attributes.push(extra.clone());
            }
        }

        attributes
    }

    /// Search `username` on each concerned directory, in order, and keep
    /// the first connection whose search returned a record.
    async fn search(
        &self,
        username: &str,
        domain: Option<&str>,
    ) -> Result<SearchSession<'_>> {
        let candidates: Vec<&DirectoryConfig> = self
            .config
            .connections()
            .iter()
            .filter(|directory| directory.is_concerned(username))
            .filter(|directory| {
                domain.is_none_or(|domain| directory.friendly_name == domain)
            })
            .collect();

        if candidates.is_empty() {
            return Err(LoginFailure::NoSearchableDirectory.into());
        }

        let mut searched = false;
        let mut last_error = None;

        for directory in candidates {
            match self.search_directory(directory, username).await {
                Ok(Some(session)) => {
                    self.telemetry
                        .record_search(&directory.friendly_name, true);
                    return Ok(session);
                },
                Ok(None) => {
                    self.telemetry
                        .record_search(&directory.friendly_name, false);
                    searched = true;
                },
                Err(err) => {
                    self.telemetry.record_directory_failure(
                        &directory.friendly_name,
                        &err,
                    );
                    last_error = Some(err);
                },
            }
        }

        match last_error {
            Some(err) if !searched => Err(err.into()),
            _ => Err(LoginFailure::UserNotFound.into()),
        }
    }

    async fn search_directory<'a>(
        &self,
        directory: &'a DirectoryConfig,
        username: &str,
    ) -> std::result::Result<Option<SearchSession<'a>>, DirectoryError> {
        let timeout = self.config.timeout();
        let mut connection =
            time::timeout(timeout, self.connector.connect(directory, timeout))
                .await??;

        let entries = self
            .bind_and_search(connection.as_mut(), directory, username)
            .await;

        match entries {
            Ok(entries) if !entries.is_empty() => Ok(Some(SearchSession {
                connection,
                entries,
                directory,
            })),
            Ok(_) => {
                self.close(connection.as_mut()).await;
                Ok(None)
            },
            Err(err) => {
                self.close(connection.as_mut()).await;
                Err(err)
            },
        }
    }

    async fn bind_and_search(
        &self,
        connection: &mut dyn Connection,
        directory: &DirectoryConfig,
        username: &str,
    ) -> std::result::Result<Vec<Entry>, DirectoryError> {
        let timeout = self.config.timeout();

        time::timeout(
            timeout,
            connection.bind(&directory.bind_dn, directory.bind_credentials()),
        )
        .await??;

        let filter = directory.search_filter_for(username);
        let attributes = self.attributes(directory);
        let entries = time::timeout(
            timeout,
            connection.search(&directory.search_base, &filter, &attributes),
        )
        .await??;

        Ok(entries)
    }

    /// Re-bind `connection` as `entry` with the caller's password.
    async fn verify(
        &self,
        connection: &mut dyn Connection,
        entry: &Entry,
        password: &str,
    ) -> std::result::Result<(), LoginFailure> {
        // An empty password is an anonymous bind, which directories accept.
        if password.is_empty() {
            return Err(LoginFailure::InvalidCredentials);
        }

        let timeout = self.config.timeout();
        let bound = time::timeout(timeout, connection.bind(&entry.dn, password))
            .await
            .map_err(DirectoryError::from)
            .and_then(std::convert::identity);

        match bound {
            Ok(()) if connection.is_bound() => Ok(()),
            Ok(()) => Err(LoginFailure::InvalidCredentials),
            Err(err) if err.is_invalid_credentials() => {
                Err(LoginFailure::InvalidCredentials)
            },
            Err(err) => Err(LoginFailure::Directory(err)),
        }
    }

    async fn close(&self, connection: &mut dyn Connection) {
        if time::timeout(self.config.timeout(), connection.close())
            .await
            .is_err()
        {
            tracing::debug!("connection close timed out");
        }
    }
}

fn provider(domain: Option<&str>) -> &str {
    domain.unwrap_or(LOCAL_PROVIDER)
}

fn non_empty(domain: Option<&str>) -> Option<&str> {
    domain.filter(|domain| !domain.is_empty())
}

#[async_trait]
impl Authenticator for LdapService {
    async fn login(
        &self,
        username: &str,
        password: &str,
        domain: Option<&str>,
    ) -> Result<Option<User>> {
        let domain = non_empty(domain);

        let SearchSession {
            mut connection,
            entries,
            directory,
        } = match self.search(username, domain).await {
            Ok(session) => session,
            Err(err) => {
                self.telemetry.record_login_failure(username, &err);
                return Err(err);
            },
        };

        let Some(entry) = entries.into_iter().next() else {
            self.close(connection.as_mut()).await;
            return Ok(None);
        };

        let verified = self.verify(connection.as_mut(), &entry, password).await;
        self.close(connection.as_mut()).await;

        match verified {
            Ok(()) => {
                let user = self.projector.project(
                    &entry,
                    provider(domain),
                    &directory.extra_attributes,
                );
                self.telemetry
                    .record_login_success(username, &user.provider_name);
                Ok(Some(user))
            },
            Err(failure) => {
                let err = Error::LoginFailed(failure);
                self.telemetry.record_login_failure(username, &err);
                Err(err)
            },
        }
    }

    async fn find_user(
        &self,
        username: &str,
        domain: Option<&str>,
    ) -> Option<User> {
        let domain = non_empty(domain);

        let SearchSession {
            mut connection,
            entries,
            directory,
        } = match self.search(username, domain).await {
            Ok(session) => session,
            Err(err) => {
                self.telemetry.record_lookup_failure(username, &err);
                return None;
            },
        };

        self.close(connection.as_mut()).await;

        entries.into_iter().next().map(|entry| {
            self.projector.project(
                &entry,
                provider(domain),
                &directory.extra_attributes,
            )
        })
    }
}
