use chrono::Utc;
use reqwest::Url;
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::AuthContext;
use crate::clients::BackendClient;
use crate::models::{GuestIdentity, JoinRequest, SessionSnapshot, SyncError};

/// A session created from the dashboard, ready to share
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session: SessionSnapshot,
    pub share_url: String,
}

/// Check the join form before anything goes over the wire
pub fn validate_join(link: &str, name: &str, email: &str) -> Result<JoinRequest, SyncError> {
    let (link, name, email) = (link.trim(), name.trim(), email.trim());
    if link.is_empty() || name.is_empty() || email.is_empty() {
        return Err(SyncError::Validation(
            "Please provide your name, email and the session link.".to_string(),
        ));
    }
    Ok(JoinRequest {
        link: link.to_string(),
        student_name: name.to_string(),
        student_email: email.to_string(),
    })
}

/// Join as a student and remember the guest identity. Returns the link of the
/// session to open.
pub async fn join_session(
    api: &BackendClient,
    auth: &mut AuthContext,
    link: &str,
    name: &str,
    email: &str,
) -> Result<String, SyncError> {
    let request = validate_join(link, name, email)?;
    let env = api.join_session(&request).await?;

    let guest = GuestIdentity {
        name: request.student_name.clone(),
        email: Some(request.student_email.clone()),
        joined_at: Utc::now(),
    };
    if let Err(e) = auth.set_guest(guest) {
        warn!("Failed to store guest identity: {}", e);
    }

    let target = resolve_target_link(&env.data, &request.link);
    info!("Joined session {} as {}", target, request.student_name);
    Ok(target)
}

/// The backend may hand back a different link: a bare string, `{link}`,
/// `[{link}]`, or a full URL carrying `?link=`.
pub fn resolve_target_link(data: &Value, typed: &str) -> String {
    let returned = match data {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items
            .first()
            .and_then(|first| first.get("link"))
            .and_then(Value::as_str)
            .map(str::to_string),
        other => other.get("link").and_then(Value::as_str).map(str::to_string),
    };
    let target = returned.unwrap_or_else(|| typed.to_string());

    let lower = target.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        if let Ok(url) = Url::parse(&target) {
            if let Some((_, link)) = url.query_pairs().find(|(k, _)| k == "link") {
                return link.into_owned();
            }
        }
    }
    target
}

/// Create a session as the signed-in mentor
pub async fn create_session(
    api: &BackendClient,
    auth: &AuthContext,
    name: &str,
    origin: &str,
) -> Result<CreatedSession, SyncError> {
    let name = validate_session_name(name)?;
    if auth.user().is_none() {
        return Err(SyncError::Validation("Sign in to create a session.".to_string()));
    }

    let session = api.create_session(name, auth.token()).await?;
    let link = session
        .link
        .clone()
        .ok_or_else(|| SyncError::Api { status: 200, message: "Created session has no link".to_string() })?;
    let share_url = share_url(origin, &link)?;
    info!("Created session {} ({})", name, link);
    Ok(CreatedSession { session, share_url })
}

/// Trimmed session name, at least 3 characters
pub fn validate_session_name(name: &str) -> Result<&str, SyncError> {
    let name = name.trim();
    if name.chars().count() < 3 {
        return Err(SyncError::Validation(
            "Please enter a session name (3+ characters).".to_string(),
        ));
    }
    Ok(name)
}

/// `<origin>/session-join?link=<link>`
pub fn share_url(origin: &str, link: &str) -> Result<String, SyncError> {
    let mut url = Url::parse(origin)
        .and_then(|base| base.join("/session-join"))
        .map_err(|e| SyncError::Validation(format!("invalid origin {}: {}", origin, e)))?;
    url.query_pairs_mut().append_pair("link", link);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserSession;
    use crate::store::LocalStore;
    use serde_json::json;

    #[test]
    fn blank_fields_fail_validation() {
        assert!(matches!(validate_join("ABC", "  ", "a@b.c"), Err(SyncError::Validation(_))));
        let req = validate_join(" ABC ", " Grace ", "g@x.io").unwrap();
        assert_eq!(req.link, "ABC");
        assert_eq!(req.student_name, "Grace");
    }

    #[test]
    fn target_link_shapes() {
        assert_eq!(resolve_target_link(&json!("NEW"), "ABC"), "NEW");
        assert_eq!(resolve_target_link(&json!({ "link": "OBJ" }), "ABC"), "OBJ");
        assert_eq!(resolve_target_link(&json!([{ "link": "ARR" }]), "ABC"), "ARR");
        assert_eq!(resolve_target_link(&Value::Null, "ABC"), "ABC");
        assert_eq!(
            resolve_target_link(&json!("https://app.example.com/session?link=Q%2F1"), "ABC"),
            "Q/1"
        );
    }

    #[tokio::test]
    async fn short_session_name_is_rejected_before_any_request() {
        // Nothing listens here; a request would fail with an HTTP error
        let api = BackendClient::new("http://127.0.0.1:9", std::time::Duration::from_millis(200)).unwrap();
        let mut auth = AuthContext::init(LocalStore::in_memory());
        auth.sign_in(UserSession {
            id: Some("1".into()),
            name: "Ada".into(),
            email: "ada@x.io".into(),
            token: Some("tok".into()),
        })
        .unwrap();

        match create_session(&api, &auth, " ab ", "http://localhost:3000").await {
            Err(SyncError::Validation(msg)) => assert_eq!(msg, "Please enter a session name (3+ characters)."),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(validate_session_name("  Intro ").unwrap(), "Intro");
    }

    #[test]
    fn share_url_encodes_link() {
        assert_eq!(
            share_url("https://app.example.com", "a b").unwrap(),
            "https://app.example.com/session-join?link=a+b"
        );
    }
}
