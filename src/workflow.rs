use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use compsoc_api::{ApiError, SocietiesPortalClient, SocietyMember};
use compsoc_config::ConfigError;
use compsoc_directory::{EntityType, NewSociety, NewUser, ProfileUpdate};
use compsoc_token::{Claims, VerifiedToken};

use crate::error::BridgeError;
use crate::service::TokenService;

pub const PURPOSE_CLAIM: &str = "purpose";
pub const MEMBER_ID_CLAIM: &str = "member_id";

/// What a capability token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Register,
    Delete,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Register => "register",
            Purpose::Delete => "delete",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The source of truth for who is currently a society member.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn find_member(&self, member_id: &str) -> Result<Option<SocietyMember>, ApiError>;
}

#[async_trait]
impl MembershipSource for SocietiesPortalClient {
    async fn find_member(&self, member_id: &str) -> Result<Option<SocietyMember>, ApiError> {
        SocietiesPortalClient::find_member(self, member_id).await
    }
}

/// A people entry created by a confirmed registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub uid: String,
    pub uid_number: u32,
    pub member: SocietyMember,
}

/// A registration token and where to mail it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRegistration {
    pub token: String,
    pub mail: String,
    pub member: SocietyMember,
}

/// Registration and deletion confirmation driven by short-lived capability tokens, plus the
/// session-authorized directory changes.
///
/// A capability token is the only state a pending workflow has. It is not tracked once
/// used, so it can be replayed until it expires.
#[derive(Clone)]
pub struct CapabilityWorkflows {
    tokens: TokenService,
    membership: Option<Arc<dyn MembershipSource>>,
    ttl: Duration,
}

impl CapabilityWorkflows {
    pub fn new(tokens: TokenService, ttl_secs: i64) -> Self {
        Self {
            tokens,
            membership: None,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn with_membership(mut self, membership: Arc<dyn MembershipSource>) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    async fn mint(&self, claims: Claims) -> Result<String, BridgeError> {
        self.tokens.issue(claims).await
    }

    /// Verify a capability token and check that this service minted it for `purpose`.
    async fn consume(&self, token: &str, purpose: Purpose) -> Result<VerifiedToken, BridgeError> {
        let verified = self.tokens.verify(token).await?;

        if verified.issuer() != self.tokens.issuer() {
            warn!(issuer = %verified.issuer(), "capability token from a foreign issuer");
            return Err(BridgeError::TokenInvalid);
        }

        let found = verified.claims().claim_str(PURPOSE_CLAIM);
        if found != Some(purpose.as_str()) {
            return Err(BridgeError::WrongPurpose {
                expected: purpose.to_string(),
                found: found.map(str::to_string),
            });
        }

        Ok(verified)
    }

    fn expiry(&self) -> chrono::DateTime<Utc> {
        Utc::now() + self.ttl
    }

    async fn current_member(&self, member_id: &str) -> Result<SocietyMember, BridgeError> {
        let membership = self.membership.as_ref().ok_or_else(|| {
            BridgeError::Config(ConfigError::InvalidValue(
                "no societies portal is configured".to_string(),
            ))
        })?;

        membership
            .find_member(member_id)
            .await?
            .ok_or_else(|| BridgeError::NotAMember(member_id.to_string()))
    }

    /// Mint a registration token for `preferred_username` if `member_id` is a current member.
    ///
    /// The token is meant to be mailed to the address the portal holds for the member.
    pub async fn start_registration(
        &self,
        preferred_username: &str,
        member_id: &str,
    ) -> Result<PendingRegistration, BridgeError> {
        if self.tokens.directory().uid_exists(preferred_username).await? {
            return Err(BridgeError::AlreadyRegistered(preferred_username.to_string()));
        }

        let member = self.current_member(member_id).await?;

        let claims = Claims::new(preferred_username, self.expiry())
            .with_claim(MEMBER_ID_CLAIM, member_id)
            .with_claim(PURPOSE_CLAIM, Purpose::Register.as_str());

        let token = self.mint(claims).await?;
        info!(uid = %preferred_username, "registration started");
        Ok(PendingRegistration {
            token,
            mail: member.email.clone(),
            member,
        })
    }

    /// Create the people entry a registration token asks for.
    ///
    /// Membership is checked again; the token only shows the member was eligible when it
    /// was minted.
    pub async fn confirm_registration(
        &self,
        token: &str,
        initial_password: Option<String>,
    ) -> Result<Registration, BridgeError> {
        let verified = self.consume(token, Purpose::Register).await?;
        let claims = verified.claims();

        let member_id = claims.claim_str(MEMBER_ID_CLAIM).ok_or_else(|| {
            BridgeError::InvalidClaims("registration token has no member id".to_string())
        })?;

        let member = self.current_member(member_id).await?;

        let user = NewUser {
            uid: claims.subject.clone(),
            given_name: member.first_name.clone(),
            surname: member.last_name.clone(),
            mail: member.email.clone(),
            member_id: member.member_id.clone(),
            password: initial_password,
        };

        let uid_number = self.tokens.directory().register_user(&user).await?;
        info!(uid = %user.uid, uid_number, "registration confirmed");

        Ok(Registration {
            uid: user.uid,
            uid_number,
            member,
        })
    }

    /// Mint a deletion token for the people entry `uid`.
    pub async fn start_deletion(&self, uid: &str) -> Result<String, BridgeError> {
        if self
            .tokens
            .directory()
            .lookup(uid, EntityType::Person)
            .await?
            .is_none()
        {
            return Err(BridgeError::UnknownUser(uid.to_string()));
        }

        let claims = Claims::new(uid, self.expiry())
            .with_claim(PURPOSE_CLAIM, Purpose::Delete.as_str());
        self.mint(claims).await
    }

    /// Delete the people entry a deletion token names. There is nothing to re-check.
    pub async fn confirm_deletion(&self, token: &str) -> Result<String, BridgeError> {
        let verified = self.consume(token, Purpose::Delete).await?;
        let uid = verified.subject().to_string();

        self.tokens
            .directory()
            .delete_entry(&uid, EntityType::Person)
            .await?;
        info!(uid = %uid, "deletion confirmed");
        Ok(uid)
    }

    /// Privileges only count when this service stamped them on a session, never on a
    /// capability token.
    fn session_claims<'a>(&self, session: &'a VerifiedToken) -> Result<&'a Claims, BridgeError> {
        if session.issuer() != self.tokens.issuer() {
            return Err(BridgeError::Forbidden(
                "session was not issued by this service".to_string(),
            ));
        }
        if session.claims().claim(PURPOSE_CLAIM).is_some() {
            return Err(BridgeError::Forbidden(
                "a capability token is not a session".to_string(),
            ));
        }
        Ok(session.claims())
    }

    /// Delete any entry immediately on behalf of an administrator.
    pub async fn admin_delete(
        &self,
        session: &VerifiedToken,
        target: &str,
        entity_type: EntityType,
    ) -> Result<(), BridgeError> {
        let claims = self.session_claims(session)?;
        if !claims.is_admin() {
            return Err(BridgeError::Forbidden(format!(
                "{} is not an administrator",
                claims.subject
            )));
        }

        self.tokens
            .directory()
            .delete_entry(target, entity_type)
            .await?;
        info!(admin = %claims.subject, uid = %target, "administrator deleted entry");
        Ok(())
    }

    /// Change name and mail of `target`. Allowed for the entry's owner and administrators.
    pub async fn update_profile(
        &self,
        session: &VerifiedToken,
        target: &str,
        entity_type: EntityType,
        update: &ProfileUpdate,
    ) -> Result<(), BridgeError> {
        let claims = self.session_claims(session)?;
        if claims.subject != target && !claims.is_admin() {
            return Err(BridgeError::Forbidden(format!(
                "{} may not edit {}",
                claims.subject, target
            )));
        }

        self.tokens
            .directory()
            .modify_entry(target, entity_type, update)
            .await?;
        Ok(())
    }

    /// Create a society entry from the claims of a Google ID token.
    ///
    /// `id_token_claims` must come from [`TokenService::extract_unverified_claims`] applied to
    /// a token the caller just received from the provider's token endpoint.
    pub async fn register_society_from_id_token(
        &self,
        id_token_claims: &Claims,
    ) -> Result<NewSociety, BridgeError> {
        if id_token_claims.claim("email_verified") == Some(&Value::Bool(false)) {
            return Err(BridgeError::InvalidClaims(
                "society mail address is not verified".to_string(),
            ));
        }

        let mail = id_token_claims
            .claim_str("email")
            .ok_or_else(|| BridgeError::InvalidClaims("ID token has no email".to_string()))?;
        let society = NewSociety::from_mail(
            mail,
            id_token_claims.claim_str("given_name").unwrap_or_default(),
            id_token_claims.claim_str("family_name").unwrap_or_default(),
        )
        .map_err(|e| BridgeError::InvalidClaims(e.to_string()))?;

        if self.tokens.directory().uid_exists(&society.uid).await? {
            return Err(BridgeError::AlreadyRegistered(society.uid));
        }

        self.tokens.directory().create_society(&society).await?;
        Ok(society)
    }
}
