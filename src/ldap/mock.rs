//! In-memory directories used by tests.
//!
//! Every opened connection is recorded so tests can check what was bound,
//! searched and closed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{Connection, Connector, Entry, Result};
use crate::config::DirectoryConfig;
use crate::error::DirectoryError;

const INVALID_CREDENTIALS: u32 = 49;

/// Failure injected on a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Connection is refused.
    Connect,
    /// Service account bind is rejected.
    ServiceBind,
    /// Search returns a protocol error.
    Search,
    /// Search never answers.
    Hang,
    /// User bind returns a non-credential error.
    UserBind,
}

#[derive(Debug, Default)]
struct Server {
    users: Vec<(String, Entry, String)>,
    failure: Option<Failure>,
}

/// What happened on one connection.
#[derive(Debug, Default, Clone)]
pub struct Record {
    pub directory: String,
    pub binds: Vec<String>,
    pub filters: Vec<String>,
    pub attributes: Vec<String>,
    pub closed: usize,
    pub dropped: bool,
}

#[derive(Debug, Default)]
struct State {
    servers: HashMap<String, Server>,
    records: Vec<Arc<Mutex<Record>>>,
}

/// Set of in-memory directories keyed by friendly name.
#[derive(Debug, Default, Clone)]
pub struct MockDirectory {
    state: Arc<Mutex<State>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `entry`, found by `username` and accepting `password`.
    pub fn with_user(
        self,
        directory: &str,
        username: &str,
        entry: Entry,
        password: &str,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .servers
            .entry(directory.to_owned())
            .or_default()
            .users
            .push((username.to_owned(), entry, password.to_owned()));
        self
    }

    /// Make `directory` fail.
    pub fn with_failure(self, directory: &str, failure: Failure) -> Self {
        self.state
            .lock()
            .unwrap()
            .servers
            .entry(directory.to_owned())
            .or_default()
            .failure = Some(failure);
        self
    }

    /// Every connection opened so far, in order.
    pub fn records(&self) -> Vec<Record> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .map(|record| record.lock().unwrap().clone())
            .collect()
    }

    fn server(
        &self,
        directory: &str,
    ) -> (Vec<(String, Entry, String)>, Option<Failure>) {
        let state = self.state.lock().unwrap();
        state
            .servers
            .get(directory)
            .map(|server| (server.users.clone(), server.failure))
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connector for MockDirectory {
    async fn connect(
        &self,
        directory: &DirectoryConfig,
        _timeout: Duration,
    ) -> Result<Box<dyn Connection>> {
        let (_, failure) = self.server(&directory.friendly_name);
        if failure == Some(Failure::Connect) {
            return Err(DirectoryError::Connect {
                url: directory.address()?.to_string(),
                source: ldap3::LdapError::EndOfStream,
            });
        }

        let record = Arc::new(Mutex::new(Record {
            directory: directory.friendly_name.clone(),
            ..Default::default()
        }));
        self.state.lock().unwrap().records.push(Arc::clone(&record));

        Ok(Box::new(MockConnection {
            directory: self.clone(),
            name: directory.friendly_name.clone(),
            service_dn: directory.bind_dn.clone(),
            record,
            bound: false,
        }))
    }
}

struct MockConnection {
    directory: MockDirectory,
    name: String,
    service_dn: String,
    record: Arc<Mutex<Record>>,
    bound: bool,
}

impl MockConnection {
    fn rejected() -> DirectoryError {
        DirectoryError::Bind {
            rc: INVALID_CREDENTIALS,
            text: "invalid credentials".into(),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.bound = false;
        self.record.lock().unwrap().binds.push(dn.to_owned());
        let (users, failure) = self.directory.server(&self.name);

        if dn == self.service_dn {
            if failure == Some(Failure::ServiceBind) {
                return Err(Self::rejected());
            }
        } else {
            if failure == Some(Failure::UserBind) {
                return Err(DirectoryError::Ldap(ldap3::LdapError::EndOfStream));
            }
            if !users
                .iter()
                .any(|(_, entry, pwd)| entry.dn == dn && pwd == password)
            {
                return Err(Self::rejected());
            }
        }

        self.bound = true;
        Ok(())
    }

    async fn search(
        &mut self,
        _base: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<Entry>> {
        {
            let mut record = self.record.lock().unwrap();
            record.filters.push(filter.to_owned());
            record.attributes = attributes.to_vec();
        }

        let (users, failure) = self.directory.server(&self.name);
        match failure {
            Some(Failure::Search) => {
                return Err(DirectoryError::Ldap(ldap3::LdapError::EndOfStream));
            },
            Some(Failure::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            },
            _ => {},
        }

        Ok(users
            .into_iter()
            .filter(|(username, _, _)| {
                filter.contains(&format!("={})", ldap3::ldap_escape(username)))
            })
            .map(|(_, entry, _)| entry)
            .collect())
    }

    fn is_bound(&self) -> bool {
        self.bound
    }

    async fn close(&mut self) {
        self.bound = false;
        self.record.lock().unwrap().closed += 1;
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if let Ok(mut record) = self.record.lock() {
            record.dropped = true;
        }
    }
}
