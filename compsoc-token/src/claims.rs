use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The `aud` claim: providers send either a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == value,
            Audience::Many(auds) => auds.iter().any(|aud| aud == value),
        }
    }
}

impl From<&str> for Audience {
    fn from(value: &str) -> Self {
        Audience::Single(value.to_string())
    }
}

impl From<String> for Audience {
    fn from(value: String) -> Self {
        Audience::Single(value)
    }
}

/// Claim set carried by every token this crate signs or verifies.
///
/// The registered claims and the two privilege flags are typed fields; anything else a
/// caller or an upstream provider puts in the payload lands in [`Claims::extra`] and is
/// serialized flat alongside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "sub", default)]
    pub subject: String,

    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    #[serde(rename = "aud", default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Audience>,

    /// Expiry as seconds since the Unix epoch
    #[serde(rename = "exp")]
    pub expiry: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_committee: Option<bool>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Claims {
    pub fn new(subject: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            subject: subject.into(),
            issuer: None,
            audience: None,
            expiry: expires_at.timestamp(),
            is_admin: None,
            is_committee: None,
            extra: BTreeMap::new(),
        }
    }

    /// Adds an extension claim, replacing any previous value under the same name.
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.expiry, 0).single()
    }

    /// Tokens are invalid at or after their expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now.timestamp()
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin.unwrap_or(false)
    }

    /// Admins carry committee privilege even when the flag itself is absent.
    pub fn is_committee(&self) -> bool {
        self.is_committee.unwrap_or(false) || self.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_wire_names_are_registered_claim_names() {
        let claims = Claims::new("alice", Utc.timestamp_opt(1_700_000_600, 0).unwrap())
            .with_claim("member_id", "s1234567");
        let value = serde_json::to_value(&claims).unwrap();

        assert_eq!(
            value,
            json!({"sub": "alice", "exp": 1_700_000_600, "member_id": "s1234567"})
        );
    }

    #[test]
    fn test_unknown_claims_land_in_extra() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "110169484474386276334",
            "iss": "https://accounts.google.com",
            "aud": ["a", "b"],
            "exp": 1_700_000_000,
            "email": "alice@example.org",
            "email_verified": true,
        }))
        .unwrap();

        assert_eq!(claims.claim_str("email"), Some("alice@example.org"));
        assert_eq!(claims.claim("email_verified"), Some(&json!(true)));
        assert!(claims.audience.as_ref().unwrap().contains("b"));
        assert!(!claims.is_admin());
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let claims = Claims::new("alice", now);
        assert!(claims.is_expired_at(now));
        assert!(!claims.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_admin_implies_committee() {
        let mut claims = Claims::new("alice", Utc::now());
        claims.is_admin = Some(true);
        claims.is_committee = Some(false);
        assert!(claims.is_committee());
    }
}
