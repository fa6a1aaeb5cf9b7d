use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use fintrack_server::{
    AppState, SharedClock, SystemClock, auth, categories, constants::*, database, reminders,
    reports, transactions,
};
use time::Duration;
use tower::util::ServiceExt;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::Key};
use uuid::Uuid;

#[derive(Clone)]
pub struct TestConfig {
    pub temp_dir_path: String,
}

impl TestConfig {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let temp_dir_path = temp_dir.path().to_string_lossy().to_string();
        std::mem::forget(temp_dir);
        Ok(Self { temp_dir_path })
    }

    pub fn data_path(&self) -> String {
        self.temp_dir_path.clone()
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

#[allow(dead_code)]
pub async fn setup_test_app() -> anyhow::Result<TestApp> {
    setup_test_app_with_clock(Arc::new(SystemClock)).await
}

pub async fn setup_test_app_with_clock(clock: SharedClock) -> anyhow::Result<TestApp> {
    let test_config = TestConfig::new()?;

    let data_path = test_config.data_path();
    std::fs::create_dir_all(&data_path)?;

    let main_db = database::init_main_db(&data_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))?;

    let app_state = AppState { main_db, clock };

    let store = MemoryStore::default();

    let session_secret = "test_secret_key_at_least_64_chars_long_test_secret_key_at_least_64_";
    let session_key = Key::try_from(session_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid session secret: {}", e))?;

    let session_layer = SessionManagerLayer::new(store)
        .with_secure(false)
        .with_name(SESSION_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::days(SESSION_EXPIRY_DAYS)))
        .with_signed(session_key);

    let router = Router::new()
        .route("/auth/register", axum::routing::post(auth::register))
        .route("/auth/login", axum::routing::post(auth::login))
        .route("/auth/me", axum::routing::get(auth::me))
        .route("/auth/logout", axum::routing::post(auth::logout))
        .route(
            "/categories",
            axum::routing::post(categories::create_category).get(categories::get_categories),
        )
        .route(
            "/categories/{id}",
            axum::routing::get(categories::get_category)
                .put(categories::update_category)
                .delete(categories::delete_category),
        )
        .route(
            "/transactions",
            axum::routing::post(transactions::create_transaction)
                .get(transactions::get_transactions),
        )
        .route(
            "/transactions/{id}",
            axum::routing::get(transactions::get_transaction)
                .put(transactions::update_transaction)
                .delete(transactions::delete_transaction),
        )
        .route("/reports/summary", axum::routing::get(reports::get_summary))
        .route(
            "/reminders",
            axum::routing::post(reminders::create_reminder).get(reminders::get_reminders),
        )
        .route(
            "/reminders/{id}",
            axum::routing::get(reminders::get_reminder)
                .put(reminders::update_reminder)
                .delete(reminders::delete_reminder),
        )
        .layer(session_layer)
        .with_state(app_state.clone());

    Ok(TestApp {
        router,
        state: app_state,
    })
}

pub async fn create_test_user(
    app_state: &AppState,
    username: &str,
    password: &str,
) -> anyhow::Result<String> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString},
    };
    use password_hash::rand_core::OsRng;

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4().to_string();

    let conn = app_state.main_db.write().await;
    conn.execute(
        "INSERT INTO users (id, name, password_hash) VALUES (?, ?, ?)",
        (user_id.as_str(), username, hash.as_str()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create test user: {}", e))?;

    Ok(user_id)
}

pub async fn login_user(app: &Router, username: &str, password: &str) -> anyhow::Result<String> {
    let payload = serde_json::json!({
        "username": username,
        "password": password
    });

    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    let set_cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v: &axum::http::HeaderValue| v.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("No session cookie in response"))?;

    Ok(set_cookie.to_string())
}

#[allow(dead_code)]
pub async fn auth_request(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: &str,
) -> anyhow::Result<(StatusCode, String)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("cookie", cookie)
        .body(Body::empty())
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read response body: {}", e))?;
    let body_str = String::from_utf8(body.to_vec())?;

    Ok((status, body_str))
}

#[allow(dead_code)]
pub async fn json_request(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: &str,
    payload: &serde_json::Value,
) -> anyhow::Result<(StatusCode, String)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("cookie", cookie)
        .body(Body::from(payload.to_string()))
        .map_err(|e| anyhow::anyhow!("Failed to build request: {}", e))?;

    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to execute request: {}", e))?;

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read response body: {}", e))?;
    let body_str = String::from_utf8(body.to_vec())?;

    Ok((status, body_str))
}
