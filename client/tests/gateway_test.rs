//! End-to-end tests for token attachment and the 401/403 interception,
//! driven against a canned backend served on an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::TryRecvError;

use client::error::ApiError;
use client::session::{AUTH_TOKEN_KEY, SessionStore, USER_SESSION_KEY};
use client::storage::{MemoryStore, SecureStore};
use client::types::{AttendanceResult, Role};
use client::ApiClient;

const VALID_TOKEN: &str = "tok-valid";
const EXPIRED_TOKEN: &str = "tok-expired";
const FORBIDDEN_TOKEN: &str = "tok-forbidden";

#[derive(Clone, Default)]
struct FakeBackend {
    mark_bodies: Arc<Mutex<Vec<Value>>>,
}

fn user_value() -> Value {
    json!({
        "id": "u-1",
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "role": "USER",
        "program": "Systems",
    })
}

fn attendance_value() -> Value {
    json!({
        "_id": "att-1",
        "userId": "u-1",
        "siteId": "site-1",
        "qrSessionId": "qr-1",
        "dateKey": "2026-08-04",
        "markedAt": "2026-08-04T13:05:00Z",
        "location": { "type": "Point", "coordinates": [-75.5812, 6.2442] },
        "distanceMeters": 12.5,
        "result": "ON_TIME",
        "status": "PENDING",
        "createdAt": "2026-08-04T13:05:00Z",
        "updatedAt": "2026-08-04T13:05:00Z"
    })
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    if email == "boom@example.com" {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})));
    }
    if email == "slow@example.com" {
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    if password == "password123" {
        (
            StatusCode::OK,
            Json(json!({ "token": VALID_TOKEN, "user": user_value() })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid email or password" })),
        )
    }
}

fn reject(headers: &HeaderMap) -> Option<(StatusCode, Json<Value>)> {
    match bearer(headers) {
        Some(VALID_TOKEN) => None,
        Some(FORBIDDEN_TOKEN) => Some((
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "You do not have access to this resource" })),
        )),
        _ => Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Session expired" })),
        )),
    }
}

async fn my_attendance(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if let Some(rejection) = reject(&headers) {
        return rejection;
    }
    (StatusCode::OK, Json(json!({ "items": [attendance_value()] })))
}

async fn my_schedule(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if let Some(rejection) = reject(&headers) {
        return rejection;
    }
    (StatusCode::OK, Json(json!({ "schedule": null })))
}

async fn mark_attendance(
    State(backend): State<FakeBackend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Some(rejection) = reject(&headers) {
        return rejection;
    }
    backend.mark_bodies.lock().await.push(body);
    (
        StatusCode::OK,
        Json(json!({ "attendance": attendance_value() })),
    )
}

async fn spawn_backend() -> (String, FakeBackend) {
    let backend = FakeBackend::default();
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/mobile/attendance/mine", get(my_attendance))
        .route("/api/mobile/me/schedule", get(my_schedule))
        .route("/api/mobile/attendance/mark", post(mark_attendance))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    (format!("http://{addr}"), backend)
}

fn fresh_client(base_url: &str) -> (ApiClient, SessionStore, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let sessions = SessionStore::new(store.clone());
    let api = ApiClient::new(base_url, sessions.clone()).expect("client builds");
    (api, sessions, store)
}

async fn seed_session(store: &MemoryStore, sessions: &SessionStore, token: &str) {
    store.set(AUTH_TOKEN_KEY, token).await.unwrap();
    store
        .set(USER_SESSION_KEY, &user_value().to_string())
        .await
        .unwrap();
    assert!(sessions.bootstrap().await.is_some());
}

#[tokio::test]
async fn sign_in_persists_and_attaches_the_token() {
    let (base_url, _backend) = spawn_backend().await;
    let (api, sessions, store) = fresh_client(&base_url);

    let session = sessions
        .sign_in(&api, "ada@example.com", "password123")
        .await
        .expect("sign-in succeeds");
    assert_eq!(session.token, VALID_TOKEN);
    assert_eq!(session.user.role, Role::User);
    assert_eq!(
        store.get(AUTH_TOKEN_KEY).await.unwrap().as_deref(),
        Some(VALID_TOKEN)
    );

    // an authenticated call now carries the bearer token
    let items = api.my_attendance().await.expect("history fetch succeeds");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].result, AttendanceResult::OnTime);
}

#[tokio::test]
async fn rejected_sign_in_leaves_state_untouched() {
    let (base_url, _backend) = spawn_backend().await;
    let (api, sessions, store) = fresh_client(&base_url);
    seed_session(&store, &sessions, VALID_TOKEN).await;
    let mut invalidated = sessions.subscribe_invalidated();

    let err = sessions
        .sign_in(&api, "ada@example.com", "wrong-password")
        .await
        .unwrap_err();
    match err {
        ApiError::Authentication { message } => {
            assert_eq!(message, "Invalid email or password");
        }
        other => panic!("expected Authentication, got {other:?}"),
    }

    // the failed login cleared nothing and notified nobody
    assert!(sessions.session().await.is_some());
    assert_eq!(
        store.get(AUTH_TOKEN_KEY).await.unwrap().as_deref(),
        Some(VALID_TOKEN)
    );
    assert!(matches!(invalidated.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn malformed_credentials_never_reach_the_backend() {
    let (base_url, _backend) = spawn_backend().await;
    let (api, sessions, _store) = fresh_client(&base_url);

    let err = sessions
        .sign_in(&api, "not-an-email", "password123")
        .await
        .unwrap_err();
    match err {
        ApiError::Authentication { message } => assert_eq!(message, "Invalid email format"),
        other => panic!("expected Authentication, got {other:?}"),
    }
}

#[tokio::test]
async fn server_failure_on_login_uses_the_fallback_message() {
    let (base_url, _backend) = spawn_backend().await;
    let (api, sessions, _store) = fresh_client(&base_url);

    let err = sessions
        .sign_in(&api, "boom@example.com", "password123")
        .await
        .unwrap_err();
    match err {
        ApiError::Authentication { message } => {
            assert_eq!(message, "Invalid email or password");
        }
        other => panic!("expected Authentication, got {other:?}"),
    }
}

#[tokio::test]
async fn a_401_clears_the_session_and_notifies() {
    let (base_url, _backend) = spawn_backend().await;
    let (api, sessions, store) = fresh_client(&base_url);
    seed_session(&store, &sessions, EXPIRED_TOKEN).await;
    let mut invalidated = sessions.subscribe_invalidated();

    let err = api.my_attendance().await.unwrap_err();
    match err {
        ApiError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Session expired");
        }
        other => panic!("expected Api 401, got {other:?}"),
    }

    assert!(sessions.session().await.is_none());
    assert!(store.get(AUTH_TOKEN_KEY).await.unwrap().is_none());
    assert!(store.get(USER_SESSION_KEY).await.unwrap().is_none());
    invalidated.recv().await.expect("unauthorized notification");
}

#[tokio::test]
async fn a_403_surfaces_without_touching_the_session() {
    let (base_url, _backend) = spawn_backend().await;
    let (api, sessions, store) = fresh_client(&base_url);
    seed_session(&store, &sessions, FORBIDDEN_TOKEN).await;
    let mut invalidated = sessions.subscribe_invalidated();

    let err = api.my_attendance().await.unwrap_err();
    match err {
        ApiError::Api { status, .. } => assert_eq!(status, 403),
        other => panic!("expected Api 403, got {other:?}"),
    }

    // permission denial is not an invalid session
    assert_eq!(
        sessions.token().await.as_deref(),
        Some(FORBIDDEN_TOKEN)
    );
    assert!(store.get(AUTH_TOKEN_KEY).await.unwrap().is_some());
    assert!(matches!(invalidated.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn mark_attendance_sends_the_expected_body() {
    let (base_url, backend) = spawn_backend().await;
    let (api, sessions, store) = fresh_client(&base_url);
    seed_session(&store, &sessions, VALID_TOKEN).await;

    let record = api
        .mark_attendance("qr-abc", 6.2442, -75.5812)
        .await
        .expect("mark succeeds");
    assert_eq!(record.id, "att-1");

    let bodies = backend.mark_bodies.lock().await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["qrToken"], "qr-abc");
    assert_eq!(bodies[0]["lat"], 6.2442);
    assert_eq!(bodies[0]["lng"], -75.5812);
}

#[tokio::test]
async fn empty_schedule_parses_as_none() {
    let (base_url, _backend) = spawn_backend().await;
    let (api, sessions, store) = fresh_client(&base_url);
    seed_session(&store, &sessions, VALID_TOKEN).await;

    assert!(api.my_schedule().await.expect("schedule fetch").is_none());
}

#[tokio::test]
async fn unreachable_backend_surfaces_as_a_transport_error() {
    // nothing listens on this port; connection is refused immediately
    let (api, _sessions, _store) = fresh_client("http://127.0.0.1:9");

    let err = api.my_attendance().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
}

#[tokio::test]
async fn invalidation_during_sign_in_wins_over_the_late_result() {
    let (base_url, _backend) = spawn_backend().await;
    let (api, sessions, store) = fresh_client(&base_url);

    let racing_sessions = sessions.clone();
    let racing_api = api.clone();
    let sign_in = tokio::spawn(async move {
        racing_sessions
            .sign_in(&racing_api, "slow@example.com", "password123")
            .await
    });

    // let the login request reach the (deliberately slow) backend, then
    // invalidate before it resolves
    tokio::time::sleep(Duration::from_millis(40)).await;
    sessions.invalidate().await;

    let result = sign_in.await.expect("task completes");
    assert!(matches!(result, Err(ApiError::Authentication { .. })));
    assert!(sessions.session().await.is_none());
    assert!(store.get(AUTH_TOKEN_KEY).await.unwrap().is_none());
    assert!(store.get(USER_SESSION_KEY).await.unwrap().is_none());
}
