use async_trait::async_trait;
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, Scope, SearchEntry,
    SearchResult,
};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::connection::{Attributes, ConnectionFactory, DirectoryConnection};
use crate::entry::RawEntry;
use crate::error::DirectoryError;
use crate::filter::Filter;

const RC_SUCCESS: u32 = 0;
const RC_CONSTRAINT_VIOLATION: u32 = 19;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_ALREADY_EXISTS: u32 = 68;

/// How to reach and bind to the LDAP server
#[derive(Clone)]
pub struct LdapSettings {
    pub url: String,
    pub bind_dn: String,
    pub bind_password: String,
    /// Upgrade a plain `ldap://` connection with StartTLS before binding
    pub start_tls: bool,
    /// Applied to connection setup and to every operation
    pub timeout: Duration,
}

impl fmt::Debug for LdapSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapSettings")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("start_tls", &self.start_tls)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// [`ConnectionFactory`] backed by a real LDAP server. Every call dials and binds anew.
#[derive(Debug, Clone)]
pub struct LdapConnector {
    settings: LdapSettings,
}

impl LdapConnector {
    pub fn new(settings: LdapSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ConnectionFactory for LdapConnector {
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.settings.timeout)
            .set_starttls(self.settings.start_tls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.settings.url)
            .await
            .map_err(unavailable)?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "directory connection closed with an error");
            }
        });

        ldap.with_timeout(self.settings.timeout)
            .simple_bind(&self.settings.bind_dn, &self.settings.bind_password)
            .await
            .map_err(unavailable)?
            .success()
            .map_err(unavailable)?;

        debug!(url = %self.settings.url, "bound to directory");

        Ok(Box::new(LdapConnection {
            ldap,
            timeout: self.settings.timeout,
        }))
    }
}

struct LdapConnection {
    ldap: Ldap,
    timeout: Duration,
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    async fn search(
        &mut self,
        base: &str,
        filter: &Filter,
        attrs: &[&str],
    ) -> Result<Vec<RawEntry>, DirectoryError> {
        let SearchResult(entries, result) = self
            .ldap
            .with_timeout(self.timeout)
            .search(base, Scope::Subtree, &filter.to_string(), attrs.to_vec())
            .await
            .map_err(unavailable)?;

        match result.rc {
            RC_SUCCESS => {}
            // A missing search base simply has nothing under it
            RC_NO_SUCH_OBJECT => return Ok(Vec::new()),
            rc => {
                return Err(DirectoryError::Unavailable(format!(
                    "search below {} failed: {} (rc={})",
                    base, result.text, rc
                )))
            }
        }

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| RawEntry::new(entry.dn, entry.attrs))
            .collect())
    }

    async fn add(&mut self, dn: &str, attrs: Attributes) -> Result<(), DirectoryError> {
        let attrs: Vec<(String, HashSet<String>)> = attrs
            .into_iter()
            .map(|(name, values)| (name, values.into_iter().collect()))
            .collect();

        let result = self
            .ldap
            .with_timeout(self.timeout)
            .add(dn, attrs)
            .await
            .map_err(write_failed)?;
        check_write(dn, result)
    }

    async fn modify(&mut self, dn: &str, replace: Attributes) -> Result<(), DirectoryError> {
        let mods: Vec<Mod<String>> = replace
            .into_iter()
            .map(|(name, values)| Mod::Replace(name, values.into_iter().collect()))
            .collect();

        let result = self
            .ldap
            .with_timeout(self.timeout)
            .modify(dn, mods)
            .await
            .map_err(write_failed)?;
        check_write(dn, result)
    }

    async fn delete(&mut self, dn: &str) -> Result<(), DirectoryError> {
        let result = self
            .ldap
            .with_timeout(self.timeout)
            .delete(dn)
            .await
            .map_err(write_failed)?;
        check_write(dn, result)
    }

    async fn close(&mut self) -> Result<(), DirectoryError> {
        self.ldap.unbind().await.map_err(unavailable)
    }
}

fn unavailable(error: LdapError) -> DirectoryError {
    DirectoryError::Unavailable(error.to_string())
}

fn write_failed(error: LdapError) -> DirectoryError {
    DirectoryError::Write(error.to_string())
}

fn check_write(dn: &str, result: LdapResult) -> Result<(), DirectoryError> {
    match result.rc {
        RC_SUCCESS => Ok(()),
        RC_ALREADY_EXISTS => Err(DirectoryError::AlreadyExists(dn.to_string())),
        RC_CONSTRAINT_VIOLATION => Err(DirectoryError::Conflict(format!(
            "{}: {}",
            dn, result.text
        ))),
        RC_NO_SUCH_OBJECT => Err(DirectoryError::NotFound(dn.to_string())),
        rc => Err(DirectoryError::Write(format!(
            "{}: {} (rc={})",
            dn, result.text, rc
        ))),
    }
}
