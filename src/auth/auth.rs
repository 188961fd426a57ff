use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{info, warn};

use crate::clients::BackendClient;
use crate::models::{GuestIdentity, SyncError, UserSession};
use crate::store::LocalStore;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: Option<i64>,
}

/// Who is using this client: a signed-in user, a guest from the join form,
/// or nobody.
///
/// Created once with [`AuthContext::init`] and handed to whatever needs it.
#[derive(Clone)]
pub struct AuthContext {
    store: LocalStore,
    user: Option<UserSession>,
    guest: Option<GuestIdentity>,
}

impl AuthContext {
    /// Load the stored credential record and guest identity
    pub fn init(store: LocalStore) -> Self {
        let mut user = store.credentials();
        if let Some(token) = user.as_ref().and_then(|u| u.token.as_deref()) {
            if token_expired(token) {
                warn!("Stored credentials have expired, signing out");
                if let Err(e) = store.clear_credentials() {
                    warn!("Failed to clear expired credentials: {}", e);
                }
                user = None;
            }
        }
        let guest = store.guest();
        if let Some(u) = &user {
            info!("Signed in as {}", u.email);
        } else if let Some(g) = &guest {
            info!("Continuing as guest {}", g.name);
        }
        Self { store, user, guest }
    }

    pub fn sign_in(&mut self, user: UserSession) -> Result<(), SyncError> {
        self.store.save_credentials(&user)?;
        info!("Signed in as {}", user.email);
        self.user = Some(user);
        Ok(())
    }

    pub fn set_guest(&mut self, guest: GuestIdentity) -> Result<(), SyncError> {
        self.store.save_guest(&guest)?;
        self.guest = Some(guest);
        Ok(())
    }

    /// Forget the signed-in user; the backend logout is best-effort
    pub async fn teardown(&mut self, api: Option<&BackendClient>) -> Result<(), SyncError> {
        if let (Some(api), Some(token)) = (api, self.token()) {
            if let Err(e) = api.logout(token).await {
                warn!("Backend logout failed: {}", e);
            }
        }
        self.store.clear_credentials()?;
        self.user = None;
        info!("Signed out");
        Ok(())
    }

    pub fn user(&self) -> Option<&UserSession> {
        self.user.as_ref()
    }

    pub fn guest(&self) -> Option<&GuestIdentity> {
        self.guest.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.token.as_deref())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.user
            .as_ref()
            .map(|u| u.name.as_str())
            .or_else(|| self.guest.as_ref().map(|g| g.name.as_str()))
    }

    /// Signed-in users are mentors and may end sessions
    pub fn is_privileged(&self) -> bool {
        self.token().is_some()
    }

    /// A session page needs either a signed-in user or a guest identity
    pub fn can_enter_session(&self) -> bool {
        self.user.is_some() || self.guest.is_some()
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }
}

/// Tokens that aren't JWTs, or carry no `exp`, never count as expired
fn token_expired(token: &str) -> bool {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    match decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => data.claims.exp.is_some_and(|exp| exp < Utc::now().timestamp()),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    fn jwt(exp: i64) -> String {
        let claims = Claims { sub: "u1".into(), exp };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap()
    }

    fn user(token: Option<String>) -> UserSession {
        UserSession { id: Some("u1".into()), name: "Ada".into(), email: "ada@example.com".into(), token }
    }

    #[test]
    fn expired_credentials_are_dropped_on_init() {
        let store = LocalStore::in_memory();
        store.save_credentials(&user(Some(jwt(Utc::now().timestamp() - 60)))).unwrap();
        let ctx = AuthContext::init(store.clone());
        assert!(ctx.user().is_none());
        assert!(store.credentials().is_none());
    }

    #[test]
    fn valid_credentials_make_a_mentor() {
        let store = LocalStore::in_memory();
        store.save_credentials(&user(Some(jwt(Utc::now().timestamp() + 3600)))).unwrap();
        let ctx = AuthContext::init(store);
        assert!(ctx.is_privileged());
        assert_eq!(ctx.display_name(), Some("Ada"));
    }

    #[test]
    fn opaque_tokens_are_kept() {
        assert!(!token_expired("not-a-jwt"));
    }

    #[test]
    fn guest_without_user_can_enter_but_not_end() {
        let store = LocalStore::in_memory();
        let mut ctx = AuthContext::init(store);
        assert!(!ctx.can_enter_session());
        ctx.set_guest(GuestIdentity { name: "Grace".into(), email: None, joined_at: Utc::now() }).unwrap();
        assert!(ctx.can_enter_session());
        assert!(!ctx.is_privileged());
        assert_eq!(ctx.display_name(), Some("Grace"));
    }

    #[tokio::test]
    async fn teardown_without_backend_clears_record() {
        let store = LocalStore::in_memory();
        let mut ctx = AuthContext::init(store.clone());
        ctx.sign_in(user(None)).unwrap();
        ctx.teardown(None).await.unwrap();
        assert!(ctx.user().is_none());
        assert!(store.credentials().is_none());
    }
}
