use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use session_sync::auth::AuthContext;
use session_sync::clients::{BackendClient, SessionApi};
use session_sync::models::{JoinRequest, RunRequest, SessionStatus, SyncError, UserSession};
use session_sync::services::{auth_service, session_service};
use session_sync::store::LocalStore;

type Calls = Arc<Mutex<Vec<String>>>;

fn record(calls: &Calls, call: impl Into<String>) {
    calls.lock().unwrap().push(call.into());
}

async fn fetch_session(State(calls): State<Calls>, Query(q): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    let link = q.get("link").cloned().unwrap_or_default();
    record(&calls, format!("fetch {}", link));
    if link == "GONE" {
        return (StatusCode::NOT_FOUND, Json(json!({ "status": "error", "message": "No such session" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "data": [{
                "id": 42,
                "link": link,
                "status": "active",
                "started_at": "2024-05-01T10:00:00Z",
                "mentor": { "id": 1, "name": "Ada" },
                "student_name": "Grace"
            }]
        })),
    )
}

async fn presence(State(calls): State<Calls>, Path((verb, id)): Path<(String, String)>) -> Json<Value> {
    record(&calls, format!("{} {}", verb, id));
    Json(json!({ "status": "success" }))
}

async fn leave(State(calls): State<Calls>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or("-");
    record(&calls, format!("leave {} {} {}", body["sessionId"], body["link"], auth));
    Json(json!({ "status": "success" }))
}

async fn run(State(calls): State<Calls>, Json(body): Json<Value>) -> Json<Value> {
    record(&calls, format!("run {} {}", body["language"], body["sessionId"]));
    Json(json!({ "status": "success", "data": { "stdout": "hi\n", "stderr": "" } }))
}

async fn join(State(calls): State<Calls>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    record(&calls, format!("join {}", body["student_name"]));
    if body["link"] == "BAD" {
        return (StatusCode::BAD_REQUEST, Json(json!({ "status": "error", "message": "Invalid link" })));
    }
    (StatusCode::OK, Json(json!({ "status": "success", "data": { "link": "ROOM-2" } })))
}

async fn login(State(calls): State<Calls>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    record(&calls, "login");
    if body["password"] != "secret" {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "status": "error", "message": "Wrong password" })));
    }
    (
        StatusCode::OK,
        Json(json!({ "status": "success", "data": { "user": { "id": 1, "name": "Ada" }, "token": "opaque" } })),
    )
}

async fn reset_password(State(calls): State<Calls>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    record(&calls, format!("reset {}", body));
    if body["access_token"] != "good-token" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Token expired", "message": "Bad request" })),
        );
    }
    (StatusCode::OK, Json(json!({ "message": "Password updated" })))
}

async fn create(State(calls): State<Calls>, headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or("-");
    record(&calls, format!("create {} {}", body["name"], auth));
    // No envelope status, session under `session`, no link
    (StatusCode::CREATED, Json(json!({ "session": { "id": 77, "name": body["name"] } })))
}

async fn spawn_backend() -> (String, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/session", get(fetch_session))
        .route("/session/:verb/:id", post(presence))
        .route("/session/leave", post(leave))
        .route("/session/join", post(join))
        .route("/editor/run", post(run))
        .route("/user/login", post(login))
        .route("/user/reset-password", post(reset_password))
        .route("/session/create", post(create))
        .with_state(calls.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), calls)
}

fn client(base: &str) -> BackendClient {
    BackendClient::new(base, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn fetch_session_unwraps_array_envelope() {
    let (base, calls) = spawn_backend().await;
    let snapshot = client(&base).fetch_session("ABC").await.unwrap();

    assert_eq!(snapshot.id.as_deref(), Some("42"));
    assert_eq!(snapshot.link.as_deref(), Some("ABC"));
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert_eq!(snapshot.mentor_name.as_deref(), Some("Ada"));
    assert!(snapshot.started_at.is_some());
    assert_eq!(calls.lock().unwrap().as_slice(), ["fetch ABC"]);
}

#[tokio::test]
async fn missing_session_surfaces_backend_message() {
    let (base, _) = spawn_backend().await;
    match client(&base).fetch_session("GONE").await {
        Err(SyncError::Api { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "No such session");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn presence_and_leave_hit_their_endpoints() {
    let (base, calls) = spawn_backend().await;
    let api = client(&base);

    api.increment("42").await.unwrap();
    api.decrement("42").await.unwrap();
    api.leave("42", "ABC", Some("tok")).await.unwrap();

    assert_eq!(
        calls.lock().unwrap().as_slice(),
        ["increment 42", "decrement 42", r#"leave "42" "ABC" Bearer tok"#]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn decrement_beacon_lands_after_flush() {
    let (base, calls) = spawn_backend().await;
    let api = Arc::new(client(&base));

    api.decrement_beacon("42");
    let flusher = api.clone();
    tokio::task::spawn_blocking(move || flusher.flush_beacons()).await.unwrap();

    assert_eq!(calls.lock().unwrap().as_slice(), ["decrement 42"]);
}

#[tokio::test]
async fn run_code_returns_raw_body() {
    let (base, calls) = spawn_backend().await;
    let body = client(&base)
        .run_code(&RunRequest {
            code: "print('hi')".to_string(),
            language: "python".to_string(),
            link: "ABC".to_string(),
            session_id: Some("42".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(body["data"]["stdout"], "hi\n");
    assert_eq!(calls.lock().unwrap().as_slice(), [r#"run "python" "42""#]);
}

#[tokio::test]
async fn join_failure_keeps_backend_message() {
    let (base, _) = spawn_backend().await;
    let err = client(&base)
        .join_session(&JoinRequest {
            link: "BAD".to_string(),
            student_name: "Grace".to_string(),
            student_email: "g@x.io".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Api { status: 400, ref message } if message == "Invalid link"));
}

#[tokio::test]
async fn join_service_stores_guest_and_follows_returned_link() {
    let (base, _) = spawn_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let mut auth = AuthContext::init(LocalStore::open(dir.path()).unwrap());

    let target = session_service::join_session(&client(&base), &mut auth, "ABC", "Grace", "g@x.io")
        .await
        .unwrap();

    assert_eq!(target, "ROOM-2");
    assert_eq!(auth.guest().map(|g| g.name.as_str()), Some("Grace"));
    assert!(auth.can_enter_session());

    // Survives a restart
    let reopened = AuthContext::init(LocalStore::open(dir.path()).unwrap());
    assert_eq!(reopened.guest().map(|g| g.name.as_str()), Some("Grace"));
}

#[tokio::test]
async fn login_signs_in_and_bad_password_does_not() {
    let (base, _) = spawn_backend().await;
    let api = client(&base);
    let mut auth = AuthContext::init(LocalStore::in_memory());

    assert!(auth_service::login(&api, &mut auth, "ada@x.io", "nope").await.is_err());
    assert!(auth.user().is_none());

    let user = auth_service::login(&api, &mut auth, "ada@x.io", "secret").await.unwrap();
    assert_eq!(user.name, "Ada");
    assert_eq!(auth.token(), Some("opaque"));
    assert!(auth.is_privileged());
}

#[tokio::test]
async fn reset_password_sends_token_and_new_password() {
    let (base, calls) = spawn_backend().await;
    let api = client(&base);

    auth_service::reset_password(&api, "good-token", "Secret123").await.unwrap();
    assert_eq!(
        calls.lock().unwrap().as_slice(),
        [r#"reset {"access_token":"good-token","newPassword":"Secret123"}"#]
    );
}

#[tokio::test]
async fn reset_password_failure_prefers_error_field() {
    let (base, calls) = spawn_backend().await;
    let api = client(&base);

    match auth_service::reset_password(&api, "stale", "Secret123").await {
        Err(SyncError::Api { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Token expired");
        }
        other => panic!("unexpected {:?}", other),
    }

    // Missing token never reaches the backend
    assert!(matches!(
        auth_service::reset_password(&api, "", "Secret123").await,
        Err(SyncError::Validation(ref msg)) if msg == "Missing or invalid reset token."
    ));
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn create_accepts_session_wrapped_reply_and_links_by_id() {
    let (base, calls) = spawn_backend().await;
    let api = client(&base);
    let mut auth = AuthContext::init(LocalStore::in_memory());
    auth.sign_in(UserSession {
        id: Some("1".to_string()),
        name: "Ada".to_string(),
        email: "ada@x.io".to_string(),
        token: Some("tok".to_string()),
    })
    .unwrap();

    let created = session_service::create_session(&api, &auth, " Intro to loops ", "https://app.example.com")
        .await
        .unwrap();

    assert_eq!(created.session.link.as_deref(), Some("77"));
    assert_eq!(created.share_url, "https://app.example.com/session-join?link=77");
    assert_eq!(calls.lock().unwrap().as_slice(), [r#"create "Intro to loops" Bearer tok"#]);
}
