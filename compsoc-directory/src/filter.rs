use ldap3::ldap_escape;
use std::fmt;

use crate::entry::RawEntry;

/// A typed search filter, rendered to RFC 4515 syntax with values escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Equals(String, String),
    Present(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn equals(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals(attr.into(), value.into())
    }

    pub fn present(attr: impl Into<String>) -> Self {
        Filter::Present(attr.into())
    }

    /// Evaluate the filter against an entry held in memory.
    ///
    /// Equality is case-insensitive, matching the directory's caseIgnoreMatch rules for
    /// the naming attributes this crate searches on.
    pub fn matches(&self, entry: &RawEntry) -> bool {
        match self {
            Filter::Equals(attr, value) => entry
                .values(attr)
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(value)),
            Filter::Present(attr) => !entry.values(attr).is_empty(),
            Filter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Equals(attr, value) => write!(f, "({}={})", attr, ldap_escape(value.as_str())),
            Filter::Present(attr) => write!(f, "({}=*)", attr),
            Filter::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            Filter::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
        }
    }
}
