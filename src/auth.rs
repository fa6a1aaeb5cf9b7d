use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{Json, extract::State, http::StatusCode};
use password_hash::rand_core::OsRng;
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppState;
use crate::constants::*;
use crate::models::{LoginPayload, PublicUser, RegisterPayload, User};
use crate::utils::{db_error, db_error_with_context};

const SESSION_USER_KEY: &str = "user";

pub fn validate_username(username: &str) -> Result<(), (StatusCode, String)> {
    let trimmed = username.trim();
    if trimmed.len() < MIN_USERNAME_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Username must be at least {} characters", MIN_USERNAME_LENGTH),
        ));
    }
    if trimmed.len() > MAX_USERNAME_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Username must be less than {} characters", MAX_USERNAME_LENGTH),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), (StatusCode, String)> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }
    Ok(())
}

/// Reads the logged-in user out of the session
pub async fn get_current_user(session: &Session) -> Result<User, (StatusCode, String)> {
    let user: Option<User> = session
        .get(SESSION_USER_KEY)
        .await
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, ERR_INVALID_SESSION.to_string()))?;

    user.ok_or((StatusCode::UNAUTHORIZED, ERR_UNAUTHORIZED.to_string()))
}

pub async fn register(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    validate_username(&payload.username)?;
    validate_password(&payload.password)?;
    let username = payload.username.trim().to_string();

    let conn = app_state.main_db.write().await;

    let mut existing_rows = conn
        .query(
            "SELECT id FROM users WHERE LOWER(name) = LOWER(?)",
            [username.as_str()],
        )
        .await
        .map_err(|_| db_error_with_context("failed to check existing user"))?;

    if existing_rows
        .next()
        .await
        .map_err(|_| db_error())?
        .is_some()
    {
        return Err((
            StatusCode::CONFLICT,
            "Username already exists".to_string(),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to hash password".to_string(),
            )
        })?
        .to_string();

    let user_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users (id, name, password_hash) VALUES (?, ?, ?)",
        (user_id.as_str(), username.as_str(), password_hash.as_str()),
    )
    .await
    .map_err(|_| db_error_with_context("user creation failed"))?;

    let user = User {
        id: user_id.clone(),
        username: username.clone(),
        password_hash,
    };

    session
        .insert(SESSION_USER_KEY, &user)
        .await
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, ERR_INVALID_SESSION.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(PublicUser {
            id: user_id,
            username,
        }),
    ))
}

pub async fn login(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<LoginPayload>,
) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    let username = payload.username.trim();

    let user = {
        let conn = app_state.main_db.read().await;
        let mut rows = conn
            .query(
                "SELECT id, name, password_hash FROM users WHERE name = ?",
                [username],
            )
            .await
            .map_err(|_| db_error_with_context("failed to query user"))?;

        match rows.next().await.map_err(|_| db_error())? {
            Some(row) => {
                let id: String = row.get(0).map_err(|_| db_error())?;
                let name: String = row.get(1).map_err(|_| db_error())?;
                let password_hash: String = row.get(2).map_err(|_| db_error())?;
                User {
                    id,
                    username: name,
                    password_hash,
                }
            }
            None => {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid username or password".to_string(),
                ));
            }
        }
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, ERR_DATABASE_ACCESS.to_string()))?;

    if Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Invalid username or password".to_string(),
        ));
    }

    session
        .insert(SESSION_USER_KEY, &user)
        .await
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, ERR_INVALID_SESSION.to_string()))?;

    Ok((
        StatusCode::OK,
        Json(PublicUser {
            id: user.id,
            username: user.username,
        }),
    ))
}

pub async fn me(session: Session) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    Ok((
        StatusCode::OK,
        Json(PublicUser {
            id: user.id,
            username: user.username,
        }),
    ))
}

pub async fn logout(session: Session) -> Result<StatusCode, (StatusCode, String)> {
    session
        .flush()
        .await
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, ERR_INVALID_SESSION.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}
