use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DirectoryError;

/// Which organizational unit an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Society,
}

const PERSON_ATTRIBUTES: &[&str] = &[
    "uid",
    "cn",
    "givenName",
    "sn",
    "mail",
    "employeeNumber",
    "uidNumber",
    "gidNumber",
    "homeDirectory",
    "loginShell",
];

const SOCIETY_ATTRIBUTES: &[&str] = &["uid", "cn", "givenName", "sn", "mail"];

impl EntityType {
    pub fn ou(self) -> &'static str {
        match self {
            EntityType::Person => "people",
            EntityType::Society => "societies",
        }
    }

    pub fn from_ou(ou: &str) -> Option<Self> {
        if ou.eq_ignore_ascii_case("people") {
            Some(EntityType::Person)
        } else if ou.eq_ignore_ascii_case("societies") {
            Some(EntityType::Society)
        } else {
            None
        }
    }

    /// Attributes fetched when reading an entry of this type
    pub fn attributes(self) -> &'static [&'static str] {
        match self {
            EntityType::Person => PERSON_ATTRIBUTES,
            EntityType::Society => SOCIETY_ATTRIBUTES,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ou())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "person" | "people" | "user" => Ok(EntityType::Person),
            "society" | "societies" => Ok(EntityType::Society),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

/// A directory entry as the wire returns it. Attribute names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl RawEntry {
    pub fn new<K, I>(dn: impl Into<String>, attrs: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Vec<String>)>,
    {
        let mut normalized: HashMap<String, Vec<String>> = HashMap::new();
        for (name, values) in attrs {
            normalized
                .entry(name.as_ref().to_ascii_lowercase())
                .or_default()
                .extend(values);
        }
        Self {
            dn: dn.into(),
            attrs: normalized,
        }
    }

    pub fn values(&self, attr: &str) -> &[String] {
        self.attrs
            .get(&attr.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first(&self, attr: &str) -> Option<&str> {
        self.values(attr).first().map(String::as_str)
    }

    /// The first `ou=` component of the DN.
    pub fn ou(&self) -> Option<&str> {
        split_rdns(&self.dn).into_iter().find_map(|rdn| {
            let (attr, value) = rdn.split_once('=')?;
            attr.trim()
                .eq_ignore_ascii_case("ou")
                .then(|| value.trim())
        })
    }
}

/// Split a DN into its RDNs, honouring backslash-escaped commas.
fn split_rdns(dn: &str) -> Vec<&str> {
    let mut rdns = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (index, ch) in dn.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => {
                rdns.push(&dn[start..index]);
                start = index + 1;
            }
            _ => escaped = false,
        }
    }
    rdns.push(&dn[start..]);
    rdns
}

/// The attribute type and value of a DN's leading RDN, e.g. `("uid", "alice")`.
pub fn leading_rdn(dn: &str) -> Option<(&str, &str)> {
    let first = split_rdns(dn).into_iter().next()?;
    let (attr, value) = first.split_once('=')?;
    Some((attr.trim(), value.trim()))
}

/// Undo RFC 4514 escaping in an attribute value: `\,` and hex pairs such as `\2C`.
pub fn unescape_rdn_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 == bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let pair = bytes
            .get(i + 1..i + 3)
            .filter(|pair| pair.iter().all(u8::is_ascii_hexdigit))
            .and_then(|pair| std::str::from_utf8(pair).ok())
            .and_then(|pair| u8::from_str_radix(pair, 16).ok());
        match pair {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(bytes[i + 1]);
                i += 2;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub uid: String,
    pub display_name: String,
    pub given_name: String,
    pub surname: String,
    pub mail: Vec<String>,
    pub member_id: Option<String>,
    pub uid_number: Option<u32>,
    pub gid_number: Option<u32>,
    pub home_directory: Option<String>,
    pub login_shell: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Society {
    pub uid: String,
    pub display_name: String,
    pub given_name: String,
    pub surname: String,
    pub mail: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DirectoryEntry {
    User(User),
    Society(Society),
}

impl DirectoryEntry {
    pub fn from_raw(entity_type: EntityType, raw: &RawEntry) -> Result<Self, DirectoryError> {
        let uid = raw
            .first("uid")
            .ok_or_else(|| DirectoryError::InvalidEntry {
                dn: raw.dn.clone(),
                reason: "missing uid".to_string(),
            })?
            .to_string();
        let text = |attr: &str| raw.first(attr).unwrap_or_default().to_string();
        let number = |attr: &str| raw.first(attr).and_then(|v| v.trim().parse::<u32>().ok());
        let optional = |attr: &str| raw.first(attr).map(str::to_string);

        Ok(match entity_type {
            EntityType::Person => DirectoryEntry::User(User {
                uid,
                display_name: text("cn"),
                given_name: text("givenName"),
                surname: text("sn"),
                mail: raw.values("mail").to_vec(),
                member_id: optional("employeeNumber"),
                uid_number: number("uidNumber"),
                gid_number: number("gidNumber"),
                home_directory: optional("homeDirectory"),
                login_shell: optional("loginShell"),
            }),
            EntityType::Society => DirectoryEntry::Society(Society {
                uid,
                display_name: text("cn"),
                given_name: text("givenName"),
                surname: text("sn"),
                mail: raw.values("mail").to_vec(),
            }),
        })
    }

    pub fn uid(&self) -> &str {
        match self {
            DirectoryEntry::User(user) => &user.uid,
            DirectoryEntry::Society(society) => &society.uid,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            DirectoryEntry::User(user) => &user.display_name,
            DirectoryEntry::Society(society) => &society.display_name,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            DirectoryEntry::User(_) => EntityType::Person,
            DirectoryEntry::Society(_) => EntityType::Society,
        }
    }
}

/// A group and its member DNs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub name: String,
    pub members: Vec<String>,
}

impl Group {
    pub fn from_raw(raw: &RawEntry) -> Result<Self, DirectoryError> {
        let name = raw.first("cn").ok_or_else(|| DirectoryError::InvalidEntry {
            dn: raw.dn.clone(),
            reason: "group has no cn".to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            members: raw.values("member").to_vec(),
        })
    }

    /// Unescaped ids of members whose DN starts with a `uid=` RDN.
    pub fn member_ids(&self) -> Vec<String> {
        self.members
            .iter()
            .filter_map(|dn| leading_rdn(dn))
            .filter(|(attr, _)| attr.eq_ignore_ascii_case("uid"))
            .map(|(_, value)| unescape_rdn_value(value))
            .collect()
    }

    /// Exact match on the leading RDN: `bob` matches `uid=bob,ou=people,...` but not
    /// `uid=bobby,...`.
    pub fn has_member(&self, id: &str) -> bool {
        self.member_ids().into_iter().any(|member| member == id)
    }
}

/// A new people entry, built from a confirmed registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub uid: String,
    pub given_name: String,
    pub surname: String,
    pub mail: String,
    pub member_id: String,
    pub password: Option<String>,
}

/// A new society entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSociety {
    pub uid: String,
    pub given_name: String,
    pub surname: String,
    pub mail: String,
}

impl NewSociety {
    /// The society's uid is the local part of its mail address.
    pub fn from_mail(
        mail: impl Into<String>,
        given_name: impl Into<String>,
        surname: impl Into<String>,
    ) -> Result<Self, DirectoryError> {
        let mail = mail.into();
        let uid = match mail.split_once('@') {
            Some((local, _)) if !local.is_empty() => local.to_string(),
            _ => {
                return Err(DirectoryError::InvalidEntry {
                    dn: String::new(),
                    reason: format!("{} is not a mail address", mail),
                })
            }
        };
        Ok(Self {
            uid,
            given_name: given_name.into(),
            surname: surname.into(),
            mail,
        })
    }
}

/// Profile fields an owner or an admin may change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub given_name: String,
    pub surname: String,
    pub mail: String,
}
