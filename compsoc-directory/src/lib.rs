//! # CompSoc Directory
//!
//! Typed access to the CompSoc LDAP directory: people, societies and the groups that
//! carry administrative privileges.
//!
//! The directory is laid out as `ou=people`, `ou=societies` and `ou=groups` below a
//! configured base DN. Entries are keyed by `uid`, groups by `cn` with `member` DNs.
//!
//! Every [`DirectoryClient`] operation binds a fresh connection through a
//! [`ConnectionFactory`] and releases it before returning. [`LdapConnector`] talks to a
//! real server; [`InMemoryDirectory`] keeps entries in process for tests and local tooling.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use compsoc_directory::{DirectoryClient, EntityType, LdapConnector, LdapSettings};
//!
//! # async fn example() -> Result<(), compsoc_directory::DirectoryError> {
//! let connector = LdapConnector::new(LdapSettings {
//!     url: "ldaps://ldap.compsoc.example.org".to_string(),
//!     bind_dn: "cn=bridge,dc=compsoc,dc=ie".to_string(),
//!     bind_password: "secret".to_string(),
//!     start_tls: false,
//!     timeout: Duration::from_secs(5),
//! });
//! let directory = DirectoryClient::new(Arc::new(connector), "dc=compsoc,dc=ie");
//!
//! if let Some(entry) = directory.lookup("alice", EntityType::Person).await? {
//!     println!("{}", entry.display_name());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod connection;
mod entry;
mod error;
mod filter;
mod ldap;
mod memory;

pub use client::{DirectoryClient, Privileges, ADMIN_GROUP, COMMITTEE_GROUP};
pub use connection::{Attributes, ConnectionFactory, DirectoryConnection};
pub use entry::{
    leading_rdn, unescape_rdn_value, DirectoryEntry, EntityType, Group, NewSociety, NewUser,
    ProfileUpdate, RawEntry, Society, User,
};
pub use error::DirectoryError;
pub use filter::Filter;
pub use ldap::{LdapConnector, LdapSettings};
pub use memory::InMemoryDirectory;
