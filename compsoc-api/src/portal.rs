use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{ApiError, HttpClient};

const NO_MEMBER: &str = "No user found";

/// Connection details for the societies portal member web service
#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Web service method that returns a single member
    pub method: String,
    /// Field the portal searches by, e.g. the member id
    pub search_by: String,
}

/// A member record as returned by the societies portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocietyMember {
    #[serde(rename = "MemberTypeTitle", default)]
    pub member_type: String,
    #[serde(rename = "MemberID")]
    pub member_id: String,
    #[serde(rename = "FirstName", default)]
    pub first_name: String,
    #[serde(rename = "LastName", default)]
    pub last_name: String,
    #[serde(rename = "Email", default)]
    pub email: String,
    #[serde(rename = "PhoneNumber", default)]
    pub phone: String,
}

/// Client for the societies portal, the source of truth for membership
#[derive(Debug, Clone)]
pub struct SocietiesPortalClient {
    http: HttpClient,
    settings: PortalSettings,
}

impl SocietiesPortalClient {
    pub fn new(http: HttpClient, settings: PortalSettings) -> Self {
        Self { http, settings }
    }

    /// Look a member up by member id.
    ///
    /// Returns `Ok(None)` when the portal reports that no such member exists.
    pub async fn find_member(&self, member_id: &str) -> Result<Option<SocietyMember>, ApiError> {
        let encode = |value: &str| STANDARD.encode(value.as_bytes());
        let query = [
            ("method", encode(&self.settings.method)),
            ("username", encode(&self.settings.username)),
            ("password", encode(&self.settings.password)),
            ("searchByOption", encode(&self.settings.search_by)),
            ("searchValue", encode(member_id)),
            ("encodeOutput", encode("true")),
        ];

        let body = self
            .http
            .get_json_with_query(&self.settings.endpoint, &query)
            .await?;

        let member = parse_member(body)?;
        debug!(member_id, found = member.is_some(), "societies portal lookup");
        Ok(member)
    }
}

fn parse_member(body: Value) -> Result<Option<SocietyMember>, ApiError> {
    let record = match body.get("member") {
        Some(Value::String(message)) if message == NO_MEMBER => return Ok(None),
        Some(member @ Value::Object(_)) => member.clone(),
        Some(other) => {
            warn!(response = %other, "unexpected member field from societies portal");
            return Err(ApiError::InvalidResponse(
                "unexpected member field in portal response".to_string(),
            ));
        }
        None => body,
    };

    serde_json::from_value(record)
        .map(Some)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse member: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(endpoint: String) -> SocietiesPortalClient {
        SocietiesPortalClient::new(
            HttpClient::new(Duration::from_secs(5)).unwrap(),
            PortalSettings {
                endpoint,
                username: "compsoc".to_string(),
                password: "secret".to_string(),
                method: "getMemberDetails".to_string(),
                search_by: "MemberID".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_find_member() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("searchValue", STANDARD.encode("12345678")))
            .and(query_param("username", STANDARD.encode("compsoc")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MemberTypeTitle": "Student",
                "MemberID": "12345678",
                "FirstName": "Alice",
                "LastName": "Liddell",
                "Email": "a.liddell1@example.org",
                "PhoneNumber": "",
            })))
            .mount(&mock_server)
            .await;

        let member = client(mock_server.uri())
            .find_member("12345678")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(member.first_name, "Alice");
        assert_eq!(member.member_id, "12345678");
    }

    #[tokio::test]
    async fn test_unknown_member() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"member": "No user found"})),
            )
            .mount(&mock_server)
            .await;

        let member = client(mock_server.uri()).find_member("0").await.unwrap();
        assert!(member.is_none());
    }

    #[test]
    fn test_nested_member_record() {
        let member = parse_member(json!({
            "member": {"MemberID": "42", "FirstName": "Bob"}
        }))
        .unwrap()
        .unwrap();
        assert_eq!(member.member_id, "42");
        assert_eq!(member.last_name, "");
    }

    #[test]
    fn test_garbage_member_field() {
        assert!(parse_member(json!({"member": 7})).is_err());
    }
}
