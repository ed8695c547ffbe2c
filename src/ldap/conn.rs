use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};

use super::{Connection, Connector, Entry, Result};
use crate::config::DirectoryConfig;
use crate::error::DirectoryError;

/// Open connections with `ldap3`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ldap3Connector;

#[async_trait]
impl Connector for Ldap3Connector {
    async fn connect(
        &self,
        directory: &DirectoryConfig,
        timeout: Duration,
    ) -> Result<Box<dyn Connection>> {
        let url = directory.address()?;
        let settings = LdapConnSettings::new()
            .set_conn_timeout(timeout)
            .set_no_tls_verify(!directory.tls_verify);

        let (conn, ldap) =
            LdapConnAsync::with_settings(settings, url.as_str())
                .await
                .map_err(|source| DirectoryError::Connect {
                    url: url.to_string(),
                    source,
                })?;

        // The driver stops once every `Ldap` handle is dropped.
        let directory = directory.friendly_name.clone();
        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                tracing::warn!(
                    %directory,
                    %err,
                    "LDAP connection driver error"
                );
            }
        });

        Ok(Box::new(Ldap3Connection { ldap, bound: false }))
    }
}

/// A connection driven by `ldap3`.
struct Ldap3Connection {
    ldap: Ldap,
    bound: bool,
}

#[async_trait]
impl Connection for Ldap3Connection {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.bound = false;
        let result = self.ldap.simple_bind(dn, password).await?;

        if result.rc != 0 {
            return Err(DirectoryError::Bind {
                rc: result.rc,
                text: result.text,
            });
        }

        self.bound = true;
        Ok(())
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<Entry>> {
        let (entries, _) = self
            .ldap
            .search(base, Scope::Subtree, filter, attributes)
            .await?
            .success()?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(Entry::from)
            .collect())
    }

    fn is_bound(&self) -> bool {
        self.bound
    }

    async fn close(&mut self) {
        self.bound = false;
        if let Err(err) = self.ldap.unbind().await {
            tracing::trace!(%err, "unbind failed");
        }
    }
}
