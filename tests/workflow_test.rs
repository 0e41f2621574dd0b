mod common;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use serde_json::json;
use std::error::Error;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use common::*;
use compsoc_api::{ApiError, HttpClient, PortalSettings, SocietiesPortalClient, SocietyMember};
use compsoc_identity::{
    BridgeError, CapabilityWorkflows, Claims, EntityType, MembershipSource, ProfileUpdate,
    VerifiedToken, MEMBER_ID_CLAIM, PURPOSE_CLAIM,
};

fn workflows(harness: &Harness) -> CapabilityWorkflows {
    let portal = SocietiesPortalClient::new(
        HttpClient::new(std::time::Duration::from_secs(5)).expect("http client"),
        PortalSettings {
            endpoint: harness.portal_url(),
            username: "compsoc".to_string(),
            password: "portal-secret".to_string(),
            method: "getMember".to_string(),
            search_by: "MemberID".to_string(),
        },
    );
    CapabilityWorkflows::new(harness.tokens.clone(), 600).with_membership(Arc::new(portal))
}

async fn mount_member(harness: &Harness, member_id: &str) {
    Mock::given(method("GET"))
        .and(path("/portal"))
        .and(query_param("searchValue", STANDARD.encode(member_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "MemberTypeTitle": "Student",
            "MemberID": member_id,
            "FirstName": "Carol",
            "LastName": "Danvers",
            "Email": "carol@example.org",
            "PhoneNumber": "",
        })))
        .mount(&harness.server)
        .await;
}

async fn session(harness: &Harness, subject: &str) -> VerifiedToken {
    let token = harness
        .tokens
        .issue(Claims::new(subject, Utc::now() + Duration::minutes(10)))
        .await
        .expect("issue session");
    harness.tokens.verify(&token).await.expect("verify session")
}

fn profile(mail: &str) -> ProfileUpdate {
    ProfileUpdate {
        given_name: "Alice".to_string(),
        surname: "Liddell".to_string(),
        mail: mail.to_string(),
    }
}

#[tokio::test]
async fn test_registration_round_trip() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    mount_member(&harness, "12345678").await;
    let workflows = workflows(&harness);

    let pending = workflows.start_registration("carol", "12345678").await?;
    assert_eq!(pending.mail, "carol@example.org");
    assert!(!harness.tokens.directory().uid_exists("carol").await?);

    let token = pending.token;

    let claims = compsoc_identity::TokenService::extract_unverified_claims(&token)?;
    assert_eq!(claims.claim_str(PURPOSE_CLAIM), Some("register"));
    assert_eq!(claims.claim_str(MEMBER_ID_CLAIM), Some("12345678"));

    let registration = workflows
        .confirm_registration(&token, Some("{SSHA}hash".to_string()))
        .await?;
    assert_eq!(registration.uid, "carol");
    assert_eq!(registration.uid_number, 1003);
    assert_eq!(registration.member.first_name, "Carol");

    let entry = harness
        .directory
        .get(&format!("uid=carol,ou=people,{}", BASE))
        .ok_or("carol was not created")?;
    assert_eq!(entry.first("cn"), Some("Carol Danvers"));
    assert_eq!(entry.first("mail"), Some("carol@example.org"));
    assert_eq!(entry.first("uidNumber"), Some("1003"));

    // Nothing is left open once the workflow finishes
    assert_eq!(harness.directory.connections_open(), 0);

    Ok(())
}

#[tokio::test]
async fn test_registration_for_existing_uid() {
    let harness = harness().await;
    let workflows = workflows(&harness);

    let result = workflows.start_registration("alice", "12345678").await;
    assert!(matches!(result, Err(BridgeError::AlreadyRegistered(uid)) if uid == "alice"));
}

#[tokio::test]
async fn test_registration_by_former_member() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    Mock::given(method("GET"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"member": "No user found"})))
        .mount(&harness.server)
        .await;
    let workflows = workflows(&harness);

    let result = workflows.start_registration("carol", "87654321").await;

    assert!(matches!(result, Err(BridgeError::NotAMember(id)) if id == "87654321"));
    assert!(!harness.tokens.directory().uid_exists("carol").await?);

    Ok(())
}

#[tokio::test]
async fn test_membership_lapses_before_confirmation() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    Mock::given(method("GET"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "MemberID": "12345678",
            "FirstName": "Carol",
            "LastName": "Danvers",
            "Email": "carol@example.org",
        })))
        .up_to_n_times(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"member": "No user found"})))
        .mount(&harness.server)
        .await;
    let workflows = workflows(&harness);

    let pending = workflows.start_registration("carol", "12345678").await?;
    let result = workflows.confirm_registration(&pending.token, None).await;

    assert!(matches!(result, Err(BridgeError::NotAMember(id)) if id == "12345678"));
    assert!(!harness.tokens.directory().uid_exists("carol").await?);

    Ok(())
}

#[tokio::test]
async fn test_registration_when_portal_fails() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    Mock::given(method("GET"))
        .and(path("/portal"))
        .respond_with(ResponseTemplate::new(500).set_body_string("maintenance"))
        .mount(&harness.server)
        .await;
    let workflows = workflows(&harness);

    let result = workflows.start_registration("carol", "12345678").await;
    assert!(matches!(result, Err(BridgeError::Membership(_))));

    Ok(())
}

#[tokio::test]
async fn test_registration_without_portal() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    let workflows = CapabilityWorkflows::new(harness.tokens.clone(), 600);

    let result = workflows.start_registration("carol", "12345678").await;
    assert!(matches!(result, Err(BridgeError::Config(_))));

    Ok(())
}

#[tokio::test]
async fn test_tokens_are_bound_to_their_purpose() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    mount_member(&harness, "12345678").await;
    let workflows = workflows(&harness);

    let register = workflows.start_registration("carol", "12345678").await?.token;
    let delete = workflows.start_deletion("bob").await?;

    let result = workflows.confirm_deletion(&register).await;
    assert!(matches!(
        result,
        Err(BridgeError::WrongPurpose { ref expected, ref found })
            if expected == "delete" && found.as_deref() == Some("register")
    ));
    assert!(harness.tokens.directory().uid_exists("bob").await?);

    let result = workflows.confirm_registration(&delete, None).await;
    assert!(matches!(result, Err(BridgeError::WrongPurpose { .. })));

    // An ordinary session token is not a capability
    let plain = harness
        .tokens
        .issue(Claims::new("bob", Utc::now() + Duration::minutes(10)))
        .await?;
    let result = workflows.confirm_deletion(&plain).await;
    assert!(matches!(result, Err(BridgeError::WrongPurpose { found: None, .. })));

    Ok(())
}

#[tokio::test]
async fn test_capability_from_another_issuer() {
    let harness = harness().await;
    let workflows = workflows(&harness);

    let token = sign_with(
        KEYCLOAK_KEY,
        None,
        &json!({
            "sub": "bob",
            "iss": harness.realm_url(),
            "exp": now_secs() + 600,
            "purpose": "delete",
        }),
    );

    let result = workflows.confirm_deletion(&token).await;
    assert!(matches!(result, Err(BridgeError::TokenInvalid)));
    assert!(harness.directory.get(&format!("uid=bob,ou=people,{}", BASE)).is_some());
}

#[tokio::test]
async fn test_expired_capability() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    let workflows = CapabilityWorkflows::new(harness.tokens.clone(), 0);

    let token = workflows.start_deletion("bob").await?;
    let result = workflows.confirm_deletion(&token).await;

    assert!(matches!(result, Err(BridgeError::TokenInvalid)));
    assert!(harness.tokens.directory().uid_exists("bob").await?);

    Ok(())
}

#[tokio::test]
async fn test_deletion_round_trip() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    let workflows = workflows(&harness);

    let token = workflows.start_deletion("bob").await?;
    assert_eq!(workflows.confirm_deletion(&token).await?, "bob");
    assert!(!harness.tokens.directory().uid_exists("bob").await?);

    // The token is still valid but there is nothing left to delete
    let replay = workflows.confirm_deletion(&token).await;
    assert!(matches!(replay, Err(BridgeError::DirectoryWrite(_))));

    Ok(())
}

#[tokio::test]
async fn test_deletion_of_unknown_user() {
    let harness = harness().await;
    let workflows = workflows(&harness);

    let result = workflows.start_deletion("mallory").await;
    assert!(matches!(result, Err(BridgeError::UnknownUser(uid)) if uid == "mallory"));
}

#[tokio::test]
async fn test_admin_delete() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    let workflows = workflows(&harness);

    let alice = session(&harness, "alice").await;
    let result = workflows.admin_delete(&alice, "bob", EntityType::Person).await;
    assert!(matches!(result, Err(BridgeError::Forbidden(_))));
    assert!(harness.tokens.directory().uid_exists("bob").await?);

    let bobby = session(&harness, "bobby").await;
    workflows.admin_delete(&bobby, "bob", EntityType::Person).await?;
    assert!(!harness.tokens.directory().uid_exists("bob").await?);

    Ok(())
}

#[tokio::test]
async fn test_upstream_privilege_claims_are_ignored() {
    let harness = harness().await;
    let workflows = workflows(&harness);

    // A realm token that claims admin is still not one of our sessions
    let token = sign_with(
        KEYCLOAK_KEY,
        None,
        &json!({
            "sub": "bob",
            "iss": harness.realm_url(),
            "exp": now_secs() + 600,
            "is_admin": true,
        }),
    );
    let upstream = harness.tokens.verify(&token).await.expect("realm token");

    let result = workflows.admin_delete(&upstream, "alice", EntityType::Person).await;
    assert!(matches!(result, Err(BridgeError::Forbidden(_))));
}

#[tokio::test]
async fn test_capability_token_is_not_a_session() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    let workflows = workflows(&harness);

    // Minted for an administrator, so it carries is_admin alongside its purpose
    let link = workflows.start_deletion("bobby").await?;
    let capability = harness.tokens.verify(&link).await?;
    assert!(capability.claims().is_admin());

    let result = workflows
        .admin_delete(&capability, "alice", EntityType::Person)
        .await;
    assert!(matches!(result, Err(BridgeError::Forbidden(_))));
    assert!(harness.tokens.directory().uid_exists("alice").await?);

    let result = workflows
        .update_profile(&capability, "alice", EntityType::Person, &profile("x@evil.example"))
        .await;
    assert!(matches!(result, Err(BridgeError::Forbidden(_))));

    Ok(())
}

#[tokio::test]
async fn test_update_profile() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    let workflows = workflows(&harness);
    let alice_dn = format!("uid=alice,ou=people,{}", BASE);

    let alice = session(&harness, "alice").await;
    workflows
        .update_profile(&alice, "alice", EntityType::Person, &profile("alice@liddell.example"))
        .await?;
    let entry = harness.directory.get(&alice_dn).ok_or("alice missing")?;
    assert_eq!(entry.first("mail"), Some("alice@liddell.example"));
    assert_eq!(entry.first("cn"), Some("Alice Liddell"));

    let bob = session(&harness, "bob").await;
    let result = workflows
        .update_profile(&bob, "alice", EntityType::Person, &profile("bob@evil.example"))
        .await;
    assert!(matches!(result, Err(BridgeError::Forbidden(_))));

    let bobby = session(&harness, "bobby").await;
    workflows
        .update_profile(&bobby, "alice", EntityType::Person, &profile("alice@example.org"))
        .await?;
    let entry = harness.directory.get(&alice_dn).ok_or("alice missing")?;
    assert_eq!(entry.first("mail"), Some("alice@example.org"));

    Ok(())
}

#[tokio::test]
async fn test_society_from_id_token() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    let workflows = workflows(&harness);

    let id_token = sign_with(
        GOOGLE_KEY,
        Some(GOOGLE_KID),
        &json!({
            "sub": "109876543210",
            "iss": GOOGLE_ISSUER,
            "aud": GOOGLE_CLIENT,
            "exp": now_secs() + 600,
            "email": "chess@socs.example.org",
            "email_verified": true,
            "given_name": "Chess",
            "family_name": "Society",
        }),
    );
    let claims = compsoc_identity::TokenService::extract_unverified_claims(&id_token)?;

    let society = workflows.register_society_from_id_token(&claims).await?;
    assert_eq!(society.uid, "chess");
    assert!(harness
        .tokens
        .directory()
        .lookup("chess", EntityType::Society)
        .await?
        .is_some());

    let again = workflows.register_society_from_id_token(&claims).await;
    assert!(matches!(again, Err(BridgeError::AlreadyRegistered(_))));

    Ok(())
}

#[tokio::test]
async fn test_society_requires_verified_mail() {
    let harness = harness().await;
    let workflows = workflows(&harness);

    let claims = Claims::new("1", Utc::now() + Duration::minutes(5))
        .with_claim("email", "chess@socs.example.org")
        .with_claim("email_verified", false);
    let result = workflows.register_society_from_id_token(&claims).await;
    assert!(matches!(result, Err(BridgeError::InvalidClaims(_))));

    let claims = Claims::new("1", Utc::now() + Duration::minutes(5));
    let result = workflows.register_society_from_id_token(&claims).await;
    assert!(matches!(result, Err(BridgeError::InvalidClaims(_))));
}

struct StaticMembership(Vec<SocietyMember>);

#[async_trait]
impl MembershipSource for StaticMembership {
    async fn find_member(&self, member_id: &str) -> Result<Option<SocietyMember>, ApiError> {
        Ok(self.0.iter().find(|m| m.member_id == member_id).cloned())
    }
}

#[tokio::test]
async fn test_custom_membership_source() -> Result<(), Box<dyn Error>> {
    let harness = harness().await;
    let workflows = CapabilityWorkflows::new(harness.tokens.clone(), 600).with_membership(
        Arc::new(StaticMembership(vec![SocietyMember {
            member_type: "Staff".to_string(),
            member_id: "555".to_string(),
            first_name: "Dave".to_string(),
            last_name: "Lister".to_string(),
            email: "dave@example.org".to_string(),
            phone: String::new(),
        }])),
    );

    let pending = workflows.start_registration("dave", "555").await?;
    assert_eq!(pending.mail, "dave@example.org");
    let registration = workflows.confirm_registration(&pending.token, None).await?;
    assert_eq!(registration.member.last_name, "Lister");

    let entry = harness
        .directory
        .get(&format!("uid=dave,ou=people,{}", BASE))
        .ok_or("dave was not created")?;
    assert_eq!(entry.first("userPassword"), None);

    Ok(())
}
