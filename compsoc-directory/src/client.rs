use ldap3::dn_escape;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::connection::{release, Attributes, ConnectionFactory};
use crate::entry::{
    DirectoryEntry, EntityType, Group, NewSociety, NewUser, ProfileUpdate, RawEntry,
};
use crate::error::DirectoryError;
use crate::filter::Filter;

pub const ADMIN_GROUP: &str = "admin";
pub const COMMITTEE_GROUP: &str = "committee";

const GROUPS_OU: &str = "groups";
const DEFAULT_GID_NUMBER: &str = "100";
const DEFAULT_LOGIN_SHELL: &str = "/bin/bash";
const HOME_ROOT: &str = "/home/users";

enum Mutation {
    Add(Attributes),
    Replace(Attributes),
    Delete,
}

/// Privilege flags derived from group membership. Admins are always committee-privileged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Privileges {
    pub is_admin: bool,
    pub is_committee: bool,
}

/// Typed queries and mutations against the directory.
///
/// Each operation opens its own connection through the factory and releases it before
/// returning, whatever the outcome.
#[derive(Clone)]
pub struct DirectoryClient {
    factory: Arc<dyn ConnectionFactory>,
    base_dn: String,
}

impl fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("base_dn", &self.base_dn)
            .finish_non_exhaustive()
    }
}

impl DirectoryClient {
    pub fn new(factory: Arc<dyn ConnectionFactory>, base_dn: impl Into<String>) -> Self {
        Self {
            factory,
            base_dn: base_dn.into(),
        }
    }

    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    fn ou_dn(&self, ou: &str) -> String {
        format!("ou={},{}", ou, self.base_dn)
    }

    /// DN of the entry `id` would have under the OU for `entity_type`.
    pub fn entry_dn(&self, id: &str, entity_type: EntityType) -> String {
        format!("uid={},{}", dn_escape(id), self.ou_dn(entity_type.ou()))
    }

    async fn search(
        &self,
        base: &str,
        filter: &Filter,
        attrs: &[&str],
    ) -> Result<Vec<RawEntry>, DirectoryError> {
        let mut conn = self.factory.connect().await?;
        let result = conn.search(base, filter, attrs).await;
        release(conn).await;
        result
    }

    async fn write(&self, dn: &str, mutation: Mutation) -> Result<(), DirectoryError> {
        let mut conn = self
            .factory
            .connect()
            .await
            .map_err(DirectoryError::into_write)?;
        let result = match mutation {
            Mutation::Add(attrs) => conn.add(dn, attrs).await,
            Mutation::Replace(attrs) => conn.modify(dn, attrs).await,
            Mutation::Delete => conn.delete(dn).await,
        };
        release(conn).await;
        result.map_err(DirectoryError::into_write)
    }

    /// Find `id` in the OU for `entity_type`. `Ok(None)` when there is no such entry.
    pub async fn lookup(
        &self,
        id: &str,
        entity_type: EntityType,
    ) -> Result<Option<DirectoryEntry>, DirectoryError> {
        let entries = self
            .search(
                &self.ou_dn(entity_type.ou()),
                &Filter::equals("uid", id),
                entity_type.attributes(),
            )
            .await?;

        if entries.len() > 1 {
            warn!(uid = %id, matches = entries.len(), "uid is not unique, using the first match");
        }

        entries
            .first()
            .map(|raw| DirectoryEntry::from_raw(entity_type, raw))
            .transpose()
    }

    /// Every entry in the OU for `entity_type`, keyed by uid.
    pub async fn list_all(
        &self,
        entity_type: EntityType,
    ) -> Result<BTreeMap<String, DirectoryEntry>, DirectoryError> {
        let entries = self
            .search(
                &self.ou_dn(entity_type.ou()),
                &Filter::present("uid"),
                entity_type.attributes(),
            )
            .await?;

        let mut all = BTreeMap::new();
        for raw in &entries {
            match DirectoryEntry::from_raw(entity_type, raw) {
                Ok(entry) => {
                    all.insert(entry.uid().to_string(), entry);
                }
                Err(e) => debug!(error = %e, "skipping malformed entry"),
            }
        }
        Ok(all)
    }

    /// Which OU `id` lives in, searching the whole tree.
    pub async fn entity_type_of(&self, id: &str) -> Result<Option<EntityType>, DirectoryError> {
        let entries = self
            .search(&self.base_dn, &Filter::equals("uid", id), &["uid"])
            .await?;
        Ok(entries
            .iter()
            .find_map(|raw| raw.ou().and_then(EntityType::from_ou)))
    }

    pub async fn uid_exists(&self, id: &str) -> Result<bool, DirectoryError> {
        let entries = self
            .search(&self.base_dn, &Filter::equals("uid", id), &["uid"])
            .await?;
        Ok(!entries.is_empty())
    }

    pub async fn group(&self, name: &str) -> Result<Option<Group>, DirectoryError> {
        let entries = self
            .search(
                &self.ou_dn(GROUPS_OU),
                &Filter::equals("cn", name),
                &["cn", "member"],
            )
            .await?;
        entries.first().map(Group::from_raw).transpose()
    }

    pub async fn groups(&self) -> Result<Vec<Group>, DirectoryError> {
        let entries = self
            .search(&self.ou_dn(GROUPS_OU), &Filter::present("cn"), &["cn", "member"])
            .await?;
        entries.iter().map(Group::from_raw).collect()
    }

    /// True when some member DN of `group_name` has the leading RDN `uid=<id>`.
    ///
    /// A missing group has no members. Only the named group is read.
    pub async fn is_member_of_group(
        &self,
        id: &str,
        group_name: &str,
    ) -> Result<bool, DirectoryError> {
        Ok(self
            .group(group_name)
            .await?
            .map(|group| group.has_member(id))
            .unwrap_or(false))
    }

    pub async fn privileges(&self, id: &str) -> Result<Privileges, DirectoryError> {
        if self.is_member_of_group(id, ADMIN_GROUP).await? {
            return Ok(Privileges {
                is_admin: true,
                is_committee: true,
            });
        }
        Ok(Privileges {
            is_admin: false,
            is_committee: self.is_member_of_group(id, COMMITTEE_GROUP).await?,
        })
    }

    /// One more than the largest `uidNumber` anywhere under the base, or 1 if there is none.
    ///
    /// Two callers that race will get the same number. The directory's unique constraint
    /// decides the winner; see [`DirectoryClient::register_user`].
    pub async fn next_numeric_id(&self) -> Result<u32, DirectoryError> {
        let entries = self
            .search(&self.base_dn, &Filter::present("uidNumber"), &["uidNumber"])
            .await?;

        let max = entries
            .iter()
            .flat_map(|raw| raw.values("uidNumber"))
            .filter_map(|value| match value.trim().parse::<u32>() {
                Ok(number) => Some(number),
                Err(_) => {
                    debug!(value = %value, "ignoring non-numeric uidNumber");
                    None
                }
            })
            .max();

        match max {
            Some(max) => max.checked_add(1).ok_or_else(|| {
                DirectoryError::Write("uidNumber space exhausted".to_string())
            }),
            None => Ok(1),
        }
    }

    pub async fn create_user(&self, user: &NewUser, uid_number: u32) -> Result<(), DirectoryError> {
        let dn = self.entry_dn(&user.uid, EntityType::Person);
        let full_name = format!("{} {}", user.given_name, user.surname);
        let mut attrs: Attributes = vec![
            values("objectClass", &["inetOrgPerson", "posixAccount", "top"]),
            value("uid", &user.uid),
            value("cn", &full_name),
            value("givenName", &user.given_name),
            value("sn", &user.surname),
            value("mail", &user.mail),
            value("employeeNumber", &user.member_id),
            value("uidNumber", &uid_number.to_string()),
            value("gidNumber", DEFAULT_GID_NUMBER),
            value("homeDirectory", &format!("{}/{}", HOME_ROOT, user.uid)),
            value("loginShell", DEFAULT_LOGIN_SHELL),
            value("gecos", &full_name),
        ];
        if let Some(password) = &user.password {
            attrs.push(value("userPassword", password));
        }

        self.write(&dn, Mutation::Add(attrs)).await?;
        info!(uid = %user.uid, uid_number, "created user entry");
        Ok(())
    }

    /// Create a people entry with a freshly assigned `uidNumber`, returning the number used.
    ///
    /// If a concurrent registration took the same number the write is retried once with a
    /// newly computed one.
    pub async fn register_user(&self, user: &NewUser) -> Result<u32, DirectoryError> {
        let mut retried = false;
        loop {
            let uid_number = self
                .next_numeric_id()
                .await
                .map_err(DirectoryError::into_write)?;
            match self.create_user(user, uid_number).await {
                Ok(()) => return Ok(uid_number),
                Err(DirectoryError::Conflict(reason)) if !retried => {
                    warn!(
                        uid = %user.uid,
                        uid_number,
                        reason = %reason,
                        "uidNumber taken, retrying"
                    );
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn create_society(&self, society: &NewSociety) -> Result<(), DirectoryError> {
        let dn = self.entry_dn(&society.uid, EntityType::Society);
        let attrs: Attributes = vec![
            values("objectClass", &["inetOrgPerson", "top"]),
            value("uid", &society.uid),
            value("cn", &format!("{} {}", society.given_name, society.surname)),
            value("givenName", &society.given_name),
            value("sn", &society.surname),
            value("mail", &society.mail),
        ];

        self.write(&dn, Mutation::Add(attrs)).await?;
        info!(uid = %society.uid, "created society entry");
        Ok(())
    }

    /// Remove an entry. There is no undo.
    pub async fn delete_entry(
        &self,
        id: &str,
        entity_type: EntityType,
    ) -> Result<(), DirectoryError> {
        let dn = self.entry_dn(id, entity_type);
        self.write(&dn, Mutation::Delete).await?;
        info!(uid = %id, entity_type = %entity_type, "deleted directory entry");
        Ok(())
    }

    pub async fn modify_entry(
        &self,
        id: &str,
        entity_type: EntityType,
        update: &ProfileUpdate,
    ) -> Result<(), DirectoryError> {
        let dn = self.entry_dn(id, entity_type);
        let replace: Attributes = vec![
            value("givenName", &update.given_name),
            value("sn", &update.surname),
            value("cn", &format!("{} {}", update.given_name, update.surname)),
            value("mail", &update.mail),
        ];

        self.write(&dn, Mutation::Replace(replace)).await?;
        info!(uid = %id, entity_type = %entity_type, "updated directory entry");
        Ok(())
    }
}

fn value(name: &str, value: &str) -> (String, Vec<String>) {
    (name.to_string(), vec![value.to_string()])
}

fn values(name: &str, values: &[&str]) -> (String, Vec<String>) {
    (
        name.to_string(),
        values.iter().map(|v| v.to_string()).collect(),
    )
}
