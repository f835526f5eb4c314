//! Identity and session engine.
//!
//! Two entry protocols (email + password, phone + one-time code) converge
//! on [`AuthService::issue_session`]. Persistence, code delivery and the
//! rate limiter are injected.

use crate::auth::password::{hash_password, verify_dummy, verify_password};
use crate::auth::session::{codes_match, generate_code};
use crate::auth::sms::Sender;
use crate::auth::token::TokenSigner;
use crate::error::ServiceError;
use crate::limiter::RateLimiter;
use crate::models::{unix_now, Identity, NewIdentity, ProfileUpdate, Purpose, Role};
use crate::storage::{CodeStore, IdentityStore, StoreError};
use std::sync::Arc;
use std::time::Duration;

/// Domain used to synthesize an email for phone-only identities.
pub const PHONE_EMAIL_DOMAIN: &str = "phone.chirp";

fn placeholder_email(phone: &str) -> String {
    format!("{}@{}", phone, PHONE_EMAIL_DOMAIN)
}

fn conflict_as_duplicate(err: StoreError) -> ServiceError {
    match err {
        StoreError::Conflict(_) => ServiceError::DuplicateIdentity,
        other => ServiceError::Store(other),
    }
}

pub struct AuthService {
    identities: Arc<dyn IdentityStore>,
    codes: Arc<dyn CodeStore>,
    sender: Arc<dyn Sender>,
    limiter: Arc<RateLimiter>,
    signer: TokenSigner,
    code_ttl: Duration,
}

impl AuthService {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        codes: Arc<dyn CodeStore>,
        sender: Arc<dyn Sender>,
        limiter: Arc<RateLimiter>,
        signer: TokenSigner,
        code_ttl: Duration,
    ) -> Self {
        Self {
            identities,
            codes,
            sender,
            limiter,
            signer,
            code_ttl,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Register an email identity.
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Identity, ServiceError> {
        if self.identities.get_by_email(email).await?.is_some() {
            return Err(ServiceError::DuplicateIdentity);
        }

        let password_hash = hash_password(password).map_err(|e| ServiceError::Internal(e.to_string()))?;
        let identity = self
            .identities
            .create(NewIdentity {
                name: name.to_string(),
                email: Some(email.to_string()),
                phone_number: None,
                password_hash,
                role: Role::User,
            })
            .await
            .map_err(conflict_as_duplicate)?;

        tracing::info!(action = "signup", user_id = identity.id, "Identity created");
        Ok(identity)
    }

    /// Email + password login. Unknown email and wrong password are the same failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, ServiceError> {
        let verified = match self.identities.get_by_email(email).await? {
            Some(identity) if verify_password(password, &identity.password_hash) => Some(identity),
            Some(_) => None,
            None => {
                // Unknown email pays the same hashing cost
                verify_dummy(password);
                None
            }
        };
        let Some(identity) = verified else {
            tracing::warn!(action = "login_failed", "Invalid credentials");
            return Err(ServiceError::InvalidCredentials);
        };

        tracing::info!(action = "login", user_id = identity.id, "Password login");
        self.issue_session(&identity)
    }

    /// Issue a one-time code for `phone` and deliver it.
    ///
    /// A send failure leaves the saved code live; a retry overwrites it.
    pub async fn send_code(&self, phone: &str, purpose: Purpose) -> Result<(), ServiceError> {
        if !self.limiter.allow(phone) {
            tracing::warn!(action = "send_code_limited", phone = %phone, "Code request rate limited");
            return Err(ServiceError::RateLimited);
        }

        let code = generate_code();
        self.codes.save(phone, &code, purpose, self.code_ttl).await?;
        self.sender.send(phone, &code, purpose).await?;

        tracing::info!(action = "send_code", phone = %phone, purpose = %purpose, "Code issued");
        Ok(())
    }

    async fn check_code(&self, phone: &str, code: &str, purpose: Purpose) -> Result<(), ServiceError> {
        match self.codes.get(phone, purpose).await? {
            Some(stored) if codes_match(&stored, code) => Ok(()),
            _ => {
                tracing::warn!(action = "code_rejected", phone = %phone, purpose = %purpose, "Invalid code");
                Err(ServiceError::InvalidCode)
            }
        }
    }

    /// Register a phone identity after proving control of the phone.
    ///
    /// The code is deleted only once the identity exists, so a duplicate
    /// phone leaves it live.
    pub async fn signup_with_phone(
        &self,
        name: &str,
        phone: &str,
        code: &str,
        password: &str,
    ) -> Result<Identity, ServiceError> {
        self.check_code(phone, code, Purpose::Signup).await?;

        if self.identities.get_by_phone(phone).await?.is_some() {
            return Err(ServiceError::DuplicateIdentity);
        }

        let password_hash = hash_password(password).map_err(|e| ServiceError::Internal(e.to_string()))?;
        let identity = self
            .identities
            .create(NewIdentity {
                name: name.to_string(),
                email: Some(placeholder_email(phone)),
                phone_number: Some(phone.to_string()),
                password_hash,
                role: Role::User,
            })
            .await
            .map_err(conflict_as_duplicate)?;

        self.codes.delete(phone, Purpose::Signup).await?;

        tracing::info!(action = "signup_phone", user_id = identity.id, "Identity created");
        Ok(identity)
    }

    /// Phone + code login. The code is consumed as soon as it matches,
    /// before the identity lookup.
    pub async fn login_with_phone(&self, phone: &str, code: &str) -> Result<String, ServiceError> {
        self.check_code(phone, code, Purpose::Login).await?;
        self.codes.delete(phone, Purpose::Login).await?;

        let identity = self
            .identities
            .get_by_phone(phone)
            .await?
            .ok_or(ServiceError::IdentityNotFound)?;

        tracing::info!(action = "login_phone", user_id = identity.id, "Phone login");
        self.issue_session(&identity)
    }

    /// Sign a session token for an identity.
    pub fn issue_session(&self, identity: &Identity) -> Result<String, ServiceError> {
        self.issue_session_at(identity, unix_now())
    }

    pub fn issue_session_at(&self, identity: &Identity, now: u64) -> Result<String, ServiceError> {
        self.signer
            .issue(
                identity.id,
                identity.email.clone(),
                identity.phone_number.clone(),
                now,
            )
            .map_err(|e| ServiceError::Internal(format!("token signing: {}", e)))
    }

    /// Resolve a bearer token to the identity it names.
    pub async fn resolve_token(&self, token: &str) -> Result<Identity, ServiceError> {
        self.resolve_token_at(token, unix_now()).await
    }

    pub async fn resolve_token_at(&self, token: &str, now: u64) -> Result<Identity, ServiceError> {
        let claims = self.signer.verify(token, now).map_err(|e| {
            tracing::debug!(action = "token_rejected", error = %e, "Token rejected");
            ServiceError::InvalidToken
        })?;

        self.identities
            .get_by_id(claims.sub)
            .await?
            .ok_or(ServiceError::IdentityNotFound)
    }

    pub async fn get_identity(&self, id: i64) -> Result<Identity, ServiceError> {
        self.identities
            .get_by_id(id)
            .await?
            .ok_or(ServiceError::IdentityNotFound)
    }

    /// Overwrite every mutable profile field. Empty strings clear.
    pub async fn update_profile(
        &self,
        id: i64,
        update: ProfileUpdate,
    ) -> Result<Identity, ServiceError> {
        let mut identity = self.get_identity(id).await?;

        identity.name = update.name;
        identity.school = update.school;
        identity.student_id = update.student_id;
        identity.birthdate = update.birthdate;
        identity.address = update.address;
        identity.gender = update.gender;

        self.identities.update(&identity).await?;

        tracing::info!(action = "profile_update", user_id = id, "Profile updated");
        Ok(identity)
    }

    /// Make sure an admin identity with this email exists.
    ///
    /// Creates it if absent. An existing identity is promoted, its password untouched.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<Identity, ServiceError> {
        if let Some(mut identity) = self.identities.get_by_email(email).await? {
            if identity.role != Role::Admin {
                identity.role = Role::Admin;
                self.identities.update(&identity).await?;
                tracing::info!(action = "admin_promote", user_id = identity.id, "Identity promoted to admin");
            }
            return Ok(identity);
        }

        let password_hash = hash_password(password).map_err(|e| ServiceError::Internal(e.to_string()))?;
        let identity = self
            .identities
            .create(NewIdentity {
                name: "admin".to_string(),
                email: Some(email.to_string()),
                phone_number: None,
                password_hash,
                role: Role::Admin,
            })
            .await
            .map_err(conflict_as_duplicate)?;

        tracing::info!(action = "admin_create", user_id = identity.id, "Admin identity created");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sms::SendError;
    use crate::storage::{MemoryCodeStore, MemoryIdentityStore};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const PHONE: &str = "+8613800138000";

    /// Records every code it is asked to deliver.
    #[derive(Default)]
    struct CapturingSender {
        sent: Mutex<Vec<(String, String, Purpose)>>,
    }

    impl CapturingSender {
        fn last_code(&self) -> String {
            self.sent.lock().unwrap().last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl Sender for CapturingSender {
        async fn send(&self, phone: &str, code: &str, purpose: Purpose) -> Result<(), SendError> {
            self.sent
                .lock()
                .unwrap()
                .push((phone.to_string(), code.to_string(), purpose));
            Ok(())
        }
    }

    struct FailingSender;

    #[async_trait]
    impl Sender for FailingSender {
        async fn send(&self, _: &str, _: &str, _: Purpose) -> Result<(), SendError> {
            Err(SendError("provider unavailable".to_string()))
        }
    }

    struct Harness {
        auth: AuthService,
        sender: Arc<CapturingSender>,
        codes: Arc<MemoryCodeStore>,
    }

    fn harness(limit: u32) -> Harness {
        let sender = Arc::new(CapturingSender::default());
        let codes = Arc::new(MemoryCodeStore::new());
        let auth = AuthService::new(
            Arc::new(MemoryIdentityStore::new()),
            codes.clone(),
            sender.clone(),
            Arc::new(RateLimiter::new(limit, Duration::from_secs(60))),
            TokenSigner::new(b"engine-test-secret-xyz", Duration::from_secs(86_400)),
            Duration::from_secs(300),
        );
        Harness { auth, sender, codes }
    }

    #[tokio::test]
    async fn test_signup_and_login() {
        let h = harness(1);
        let identity = h.auth.signup("Ann", "ann@example.com", "pw").await.unwrap();
        assert_eq!(identity.role, Role::User);
        assert_ne!(identity.password_hash, "pw");

        let token = h.auth.login("ann@example.com", "pw").await.unwrap();
        let resolved = h.auth.resolve_token(&token).await.unwrap();
        assert_eq!(resolved.id, identity.id);
    }

    #[tokio::test]
    async fn test_signup_duplicate_email() {
        let h = harness(1);
        h.auth.signup("Ann", "ann@example.com", "pw").await.unwrap();
        let result = h.auth.signup("Other", "ann@example.com", "pw2").await;
        assert!(matches!(result, Err(ServiceError::DuplicateIdentity)));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = harness(1);
        h.auth.signup("Ann", "ann@example.com", "pw").await.unwrap();

        let wrong_password = h.auth.login("ann@example.com", "nope").await;
        let unknown_email = h.auth.login("bob@example.com", "pw").await;
        assert!(matches!(wrong_password, Err(ServiceError::InvalidCredentials)));
        assert!(matches!(unknown_email, Err(ServiceError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_unknown_email_runs_argon2() {
        let h = harness(1);
        let result = h.auth.login("nobody@example.com", "pw").await;
        assert!(matches!(result, Err(ServiceError::InvalidCredentials)));

        let dummy = crate::auth::password::DUMMY_HASH.get().unwrap();
        assert!(dummy.starts_with("$argon2id$"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_phone_signup_scenario() {
        let h = harness(1);

        h.auth.send_code(PHONE, Purpose::Signup).await.unwrap();
        let code = h.sender.last_code();
        assert_eq!(code.len(), 6);

        let identity = h
            .auth
            .signup_with_phone("Ann", PHONE, &code, "pw")
            .await
            .unwrap();
        assert_eq!(identity.phone_number.as_deref(), Some(PHONE));
        assert_eq!(identity.email.as_deref(), Some("+8613800138000@phone.chirp"));

        // Code is one-time
        let replay = h.auth.signup_with_phone("Ann", PHONE, &code, "pw").await;
        assert!(matches!(replay, Err(ServiceError::InvalidCode)));

        // A fresh code cannot register the same phone twice
        tokio::time::advance(Duration::from_secs(61)).await;
        h.auth.send_code(PHONE, Purpose::Signup).await.unwrap();
        let second = h.sender.last_code();
        let duplicate = h.auth.signup_with_phone("Ann", PHONE, &second, "pw").await;
        assert!(matches!(duplicate, Err(ServiceError::DuplicateIdentity)));
        // Duplicate leaves the code live
        assert!(h.codes.get(PHONE, Purpose::Signup).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_resend_invalidates_previous_code() {
        let h = harness(10);

        h.auth.send_code(PHONE, Purpose::Signup).await.unwrap();
        let first = h.sender.last_code();
        // Force a different second code
        let mut second = first.clone();
        while second == first {
            h.auth.send_code(PHONE, Purpose::Signup).await.unwrap();
            second = h.sender.last_code();
        }

        let stale = h.auth.signup_with_phone("Ann", PHONE, &first, "pw").await;
        assert!(matches!(stale, Err(ServiceError::InvalidCode)));
        assert!(h
            .auth
            .signup_with_phone("Ann", PHONE, &second, "pw")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_code_purpose_is_scoped() {
        let h = harness(10);
        h.auth.send_code(PHONE, Purpose::Signup).await.unwrap();
        let code = h.sender.last_code();

        let result = h.auth.login_with_phone(PHONE, &code).await;
        assert!(matches!(result, Err(ServiceError::InvalidCode)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_code_expires() {
        let h = harness(1);
        h.auth.send_code(PHONE, Purpose::Signup).await.unwrap();
        let code = h.sender.last_code();

        tokio::time::advance(Duration::from_secs(301)).await;
        let result = h.auth.signup_with_phone("Ann", PHONE, &code, "pw").await;
        assert!(matches!(result, Err(ServiceError::InvalidCode)));
    }

    #[tokio::test]
    async fn test_code_must_match_exactly() {
        let h = harness(1);
        h.auth.send_code(PHONE, Purpose::Signup).await.unwrap();
        let code = h.sender.last_code();

        let longer = format!("{}0", code);
        for attempt in [&code[..5], longer.as_str()] {
            let result = h.auth.signup_with_phone("Ann", PHONE, attempt, "pw").await;
            assert!(matches!(result, Err(ServiceError::InvalidCode)), "{}", attempt);
        }
        assert!(h.auth.signup_with_phone("Ann", PHONE, &code, "pw").await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_code_never_matches() {
        let h = harness(1);
        let result = h.auth.signup_with_phone("Ann", PHONE, "", "pw").await;
        assert!(matches!(result, Err(ServiceError::InvalidCode)));
    }

    #[tokio::test]
    async fn test_send_code_rate_limited() {
        let h = harness(1);
        h.auth.send_code(PHONE, Purpose::Signup).await.unwrap();
        let result = h.auth.send_code(PHONE, Purpose::Login).await;
        assert!(matches!(result, Err(ServiceError::RateLimited)));
        assert_eq!(h.sender.sent.lock().unwrap().len(), 1);

        // Other phones are unaffected
        assert!(h.auth.send_code("+1555", Purpose::Login).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_failure_keeps_code() {
        let codes = Arc::new(MemoryCodeStore::new());
        let auth = AuthService::new(
            Arc::new(MemoryIdentityStore::new()),
            codes.clone(),
            Arc::new(FailingSender),
            Arc::new(RateLimiter::new(1, Duration::from_secs(60))),
            TokenSigner::new(b"engine-test-secret-xyz", Duration::from_secs(86_400)),
            Duration::from_secs(300),
        );

        let result = auth.send_code(PHONE, Purpose::Login).await;
        assert!(matches!(result, Err(ServiceError::UpstreamSendFailure(_))));
        assert!(codes.get(PHONE, Purpose::Login).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_with_phone() {
        let h = harness(10);
        h.auth.send_code(PHONE, Purpose::Signup).await.unwrap();
        let signup_code = h.sender.last_code();
        let identity = h
            .auth
            .signup_with_phone("Ann", PHONE, &signup_code, "pw")
            .await
            .unwrap();

        h.auth.send_code(PHONE, Purpose::Login).await.unwrap();
        let login_code = h.sender.last_code();
        let token = h.auth.login_with_phone(PHONE, &login_code).await.unwrap();
        assert_eq!(h.auth.resolve_token(&token).await.unwrap().id, identity.id);

        let replay = h.auth.login_with_phone(PHONE, &login_code).await;
        assert!(matches!(replay, Err(ServiceError::InvalidCode)));
    }

    #[tokio::test]
    async fn test_login_with_phone_unknown_consumes_code() {
        let h = harness(1);
        h.auth.send_code(PHONE, Purpose::Login).await.unwrap();
        let code = h.sender.last_code();

        let result = h.auth.login_with_phone(PHONE, &code).await;
        assert!(matches!(result, Err(ServiceError::IdentityNotFound)));
        assert_eq!(h.codes.get(PHONE, Purpose::Login).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_token_expiry() {
        let h = harness(1);
        let identity = h.auth.signup("Ann", "ann@example.com", "pw").await.unwrap();
        let token = h.auth.issue_session_at(&identity, 1_000).unwrap();

        let resolved = h.auth.resolve_token_at(&token, 1_000 + 86_399).await.unwrap();
        assert_eq!(resolved.id, identity.id);

        let expired = h.auth.resolve_token_at(&token, 1_000 + 86_400).await;
        assert!(matches!(expired, Err(ServiceError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_token_for_missing_identity() {
        let h = harness(1);
        let ghost = Identity {
            id: 999,
            name: String::new(),
            email: None,
            phone_number: None,
            password_hash: String::new(),
            role: Role::User,
            school: String::new(),
            student_id: String::new(),
            birthdate: String::new(),
            address: String::new(),
            gender: String::new(),
            created_at: 0,
        };
        let token = h.auth.issue_session(&ghost).unwrap();
        let result = h.auth.resolve_token(&token).await;
        assert!(matches!(result, Err(ServiceError::IdentityNotFound)));

        let garbage = h.auth.resolve_token("not-a-token").await;
        assert!(matches!(garbage, Err(ServiceError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_update_profile_overwrites() {
        let h = harness(1);
        let identity = h.auth.signup("Ann", "ann@example.com", "pw").await.unwrap();

        let updated = h
            .auth
            .update_profile(
                identity.id,
                ProfileUpdate {
                    name: "Ann Lee".to_string(),
                    school: "MIT".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Ann Lee");
        assert_eq!(updated.school, "MIT");

        let cleared = h
            .auth
            .update_profile(identity.id, ProfileUpdate::default())
            .await
            .unwrap();
        assert_eq!(cleared.name, "");
        assert_eq!(cleared.school, "");
        // Credentials are not profile fields
        assert_eq!(cleared.email.as_deref(), Some("ann@example.com"));

        let missing = h.auth.update_profile(404, ProfileUpdate::default()).await;
        assert!(matches!(missing, Err(ServiceError::IdentityNotFound)));
    }

    #[tokio::test]
    async fn test_ensure_admin() {
        let h = harness(1);
        let created = h.auth.ensure_admin("root@example.com", "pw").await.unwrap();
        assert_eq!(created.role, Role::Admin);

        // Idempotent
        let again = h.auth.ensure_admin("root@example.com", "other").await.unwrap();
        assert_eq!(again.id, created.id);

        let user = h.auth.signup("Bob", "bob@example.com", "pw").await.unwrap();
        let promoted = h.auth.ensure_admin("bob@example.com", "ignored").await.unwrap();
        assert_eq!(promoted.id, user.id);
        assert_eq!(h.auth.get_identity(user.id).await.unwrap().role, Role::Admin);
        assert!(h.auth.login("bob@example.com", "pw").await.is_ok());
    }
}
