use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::models::{
    ApiEnvelope, CreateSessionRequest, EndRequest, JoinRequest, LeaveRequest, LoginRequest,
    ResetPasswordRequest, RunRequest, SessionSnapshot, SignupRequest, SyncError, UserSession,
};

type Result<T> = std::result::Result<T, SyncError>;

/// Backend calls the session client depends on
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn fetch_session(&self, link: &str) -> Result<SessionSnapshot>;
    async fn increment(&self, session_id: &str) -> Result<()>;
    async fn decrement(&self, session_id: &str) -> Result<()>;
    /// Send-and-forget decrement that must not depend on the caller staying alive
    fn decrement_beacon(&self, session_id: &str);
    async fn leave(&self, session_id: &str, link: &str, token: Option<&str>) -> Result<()>;
    async fn end_session(&self, link: &str, token: &str) -> Result<()>;
    /// Raw execution response, relayed to peers untouched
    async fn run_code(&self, request: &RunRequest) -> Result<Value>;
}

#[derive(Debug)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    beacons: Mutex<Vec<JoinHandle<()>>>,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            beacons: Mutex::new(Vec::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_token(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// Wait for outstanding beacons, used right before the process exits
    pub fn flush_beacons(&self) {
        let handles: Vec<_> = match self.beacons.lock() {
            Ok(mut beacons) => beacons.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in handles {
            if handle.join().is_err() {
                warn!("Beacon thread panicked");
            }
        }
    }

    pub async fn create_session(&self, name: &str, token: Option<&str>) -> Result<SessionSnapshot> {
        let req = self.client.post(self.url("/session/create"))
            .json(&CreateSessionRequest { name: name.to_string() });
        let body = expect_ok(Self::with_token(req, token).send().await?, "Failed to create session").await?;
        created_session(&body).ok_or_else(|| SyncError::Api {
            status: 200,
            message: "Create response carried no session".to_string(),
        })
    }

    pub async fn join_session(&self, request: &JoinRequest) -> Result<ApiEnvelope> {
        let resp = self.client.post(self.url("/session/join")).json(request).send().await?;
        let status = resp.status();
        let env: ApiEnvelope = resp.json().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SyncError::Api {
                status: status.as_u16(),
                message: env.message.unwrap_or_else(|| "Failed to join session".to_string()),
            });
        }
        Ok(env)
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<UserSession> {
        let resp = self.client.post(self.url("/user/signup")).json(request).send().await?;
        let env = expect_success(resp, "Signup failed").await?;
        user_from(&env.data, &request.email)
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<UserSession> {
        let resp = self.client.post(self.url("/user/login")).json(request).send().await?;
        let env = expect_success(resp, "Invalid credentials").await?;
        user_from(&env.data, &request.email)
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        let req = Self::with_token(self.client.post(self.url("/user/logout")), Some(token));
        expect_success(req.send().await?, "Logout failed").await.map(|_| ())
    }

    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<Option<String>> {
        let resp = self.client.post(self.url("/user/reset-password")).json(request).send().await?;
        let body = expect_ok(resp, "Failed to reset password.").await?;
        Ok(body.get("message").and_then(Value::as_str).map(str::to_string))
    }
}

#[async_trait]
impl SessionApi for BackendClient {
    async fn fetch_session(&self, link: &str) -> Result<SessionSnapshot> {
        debug!("Fetching session {}", link);
        let resp = self.client.get(self.url("/session")).query(&[("link", link)]).send().await?;
        let env = expect_success(resp, "Session not found").await?;
        SessionSnapshot::from_value(&env.data).ok_or_else(|| SyncError::Api {
            status: 404,
            message: "Session not found".to_string(),
        })
    }

    async fn increment(&self, session_id: &str) -> Result<()> {
        let url = self.url(&format!("/session/increment/{}", session_id));
        self.client.post(url).send().await?.error_for_status()?;
        info!("Registered presence for session {}", session_id);
        Ok(())
    }

    async fn decrement(&self, session_id: &str) -> Result<()> {
        let url = self.url(&format!("/session/decrement/{}", session_id));
        self.client.post(url).send().await?.error_for_status()?;
        info!("Released presence for session {}", session_id);
        Ok(())
    }

    fn decrement_beacon(&self, session_id: &str) {
        let url = self.url(&format!("/session/decrement/{}", session_id));
        let timeout = self.timeout;
        // A dedicated thread with a blocking client keeps working while the
        // async runtime is being torn down.
        let spawned = std::thread::Builder::new()
            .name("decrement-beacon".to_string())
            .spawn(move || {
                let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to build beacon client: {}", e);
                        return;
                    }
                };
                if let Err(e) = client.post(&url).send() {
                    warn!("Decrement beacon to {} failed: {}", url, e);
                }
            });
        match spawned {
            Ok(handle) => match self.beacons.lock() {
                Ok(mut beacons) => beacons.push(handle),
                Err(poisoned) => poisoned.into_inner().push(handle),
            },
            Err(e) => error!("Failed to spawn decrement beacon: {}", e),
        }
    }

    async fn leave(&self, session_id: &str, link: &str, token: Option<&str>) -> Result<()> {
        let req = self.client.post(self.url("/session/leave")).json(&LeaveRequest {
            session_id: session_id.to_string(),
            link: link.to_string(),
        });
        Self::with_token(req, token).send().await?.error_for_status()?;
        Ok(())
    }

    async fn end_session(&self, link: &str, token: &str) -> Result<()> {
        let req = self.client.post(self.url("/session/end")).json(&EndRequest { link: link.to_string() });
        Self::with_token(req, Some(token)).send().await?.error_for_status()?;
        info!("Ended session {}", link);
        Ok(())
    }

    async fn run_code(&self, request: &RunRequest) -> Result<Value> {
        let resp = self.client.post(self.url("/editor/run")).json(request).send().await?;
        // Error bodies are still rendered, so the status code is not checked here
        Ok(resp.json::<Value>().await.unwrap_or(Value::Null))
    }
}

async fn expect_success(resp: Response, fallback: &str) -> Result<ApiEnvelope> {
    let status = resp.status();
    let env: ApiEnvelope = resp.json().await.unwrap_or_default();
    if status.is_success() && env.is_success() {
        return Ok(env);
    }
    Err(SyncError::Api {
        status: status.as_u16(),
        message: env.message.unwrap_or_else(|| fallback.to_string()),
    })
}

/// Any 2xx body, without looking at the envelope status. Failures carry the
/// body's `error`, else its `message`.
async fn expect_ok(resp: Response, fallback: &str) -> Result<Value> {
    let status = resp.status();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(body);
    }
    let text = |key: &str| body.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string);
    Err(SyncError::Api {
        status: status.as_u16(),
        message: text("error").or_else(|| text("message")).unwrap_or_else(|| fallback.to_string()),
    })
}

/// Session from a create response: `data`, `session` or the body itself,
/// linked by `link` or else `id`
fn created_session(body: &Value) -> Option<SessionSnapshot> {
    let inner = [body.get("data"), body.get("session")]
        .into_iter()
        .flatten()
        .find(|v| !v.is_null())
        .unwrap_or(body);
    let mut session = SessionSnapshot::from_value(inner)?;
    if session.link.is_none() {
        session.link = session.id.clone();
    }
    Some(session)
}

/// Credential record from a login/signup response: `{user, token}` or a flat user
fn user_from(data: &Value, email: &str) -> Result<UserSession> {
    let user = data.get("user").unwrap_or(data);
    let field = |key: &str| user.get(key).and_then(Value::as_str).map(str::to_string);
    let name = field("name").ok_or_else(|| SyncError::Api {
        status: 200,
        message: "Response carried no user".to_string(),
    })?;
    let id = match user.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    Ok(UserSession {
        id,
        name,
        email: field("email").unwrap_or_else(|| email.to_string()),
        token: data
            .get("token")
            .or_else(|| user.get("token"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_from_nested_payload() {
        let data = json!({ "user": { "id": 7, "name": "Ada" }, "token": "t0k" });
        let user = user_from(&data, "ada@example.com").unwrap();
        assert_eq!(user.id.as_deref(), Some("7"));
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.token.as_deref(), Some("t0k"));
    }

    #[test]
    fn created_session_unwraps_session_key_and_falls_back_to_id() {
        let session = created_session(&json!({ "session": { "id": 9, "name": "Intro" } })).unwrap();
        assert_eq!(session.id.as_deref(), Some("9"));
        assert_eq!(session.link.as_deref(), Some("9"));

        let session = created_session(&json!({ "data": [{ "id": 1, "link": "L1" }] })).unwrap();
        assert_eq!(session.link.as_deref(), Some("L1"));

        let session = created_session(&json!({ "link": "BARE" })).unwrap();
        assert_eq!(session.link.as_deref(), Some("BARE"));
    }

    #[test]
    fn user_from_requires_a_name() {
        assert!(user_from(&json!({ "token": "x" }), "a@b.c").is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = BackendClient::new("http://localhost:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/session"), "http://localhost:8000/session");
    }
}
