use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use time::Duration;
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppState;
use crate::auth::get_current_user;
use crate::constants::*;
use crate::models::{
    CreateReminderPayload, GetRemindersQuery, GetRemindersResponse, Reminder, RepeatInterval,
    UpdateReminderPayload,
};
use crate::utils::{
    db_error, db_error_with_context, timestamp_from_nanos, timestamp_nanos, validate_offset,
    validate_reminders_limit, validate_string_length, validate_timestamp,
};

pub fn validate_reminder_title(title: &str) -> Result<(), (StatusCode, String)> {
    validate_string_length(title, "Reminder title", MAX_REMINDER_TITLE_LENGTH)
}

pub fn validate_repeat_interval(value: &str) -> Result<RepeatInterval, (StatusCode, String)> {
    RepeatInterval::parse(value.trim()).ok_or((
        StatusCode::BAD_REQUEST,
        "Repeat interval must be one of 'none', 'daily', 'weekly' or 'monthly'".to_string(),
    ))
}

pub fn extract_reminder_from_row(row: libsql::Row) -> Result<Reminder, (StatusCode, String)> {
    let id: String = row
        .get(0)
        .map_err(|_| db_error_with_context("invalid reminder data"))?;
    let title: String = row
        .get(1)
        .map_err(|_| db_error_with_context("invalid reminder data"))?;
    let description: Option<String> = row
        .get(2)
        .map_err(|_| db_error_with_context("invalid reminder data"))?;
    let due_at: i64 = row
        .get(3)
        .map_err(|_| db_error_with_context("invalid reminder data"))?;
    let repeat_raw: String = row
        .get(4)
        .map_err(|_| db_error_with_context("invalid reminder data"))?;
    let repeat_interval = RepeatInterval::parse(&repeat_raw)
        .ok_or_else(|| db_error_with_context("invalid repeat interval"))?;
    let is_active: bool = row
        .get(5)
        .map_err(|_| db_error_with_context("invalid reminder data"))?;
    let created_at: i64 = row
        .get(6)
        .map_err(|_| db_error_with_context("invalid reminder data"))?;
    let updated_at: i64 = row
        .get(7)
        .map_err(|_| db_error_with_context("invalid reminder data"))?;

    Ok(Reminder {
        id,
        title,
        description,
        due_at: timestamp_from_nanos(due_at)?,
        repeat_interval,
        is_active,
        created_at: timestamp_from_nanos(created_at)?,
        updated_at: timestamp_from_nanos(updated_at)?,
    })
}

const REMINDER_COLUMNS: &str =
    "id, title, description, due_at, repeat_interval, is_active, created_at, updated_at";

pub async fn create_reminder(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateReminderPayload>,
) -> Result<(StatusCode, Json<Reminder>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    validate_reminder_title(&payload.title)?;

    let now = app_state.clock.now_utc();
    let due_at = match payload.due_at {
        Some(ref raw) => validate_timestamp(raw)?,
        // Default one hour out, matching the reminder scheduling default
        None => now + Duration::hours(1),
    };
    let repeat_interval = match payload.repeat_interval {
        Some(ref raw) => validate_repeat_interval(raw)?,
        None => RepeatInterval::None,
    };

    let reminder = Reminder {
        id: Uuid::new_v4().to_string(),
        title: payload.title.trim().to_string(),
        description: payload.description,
        due_at,
        repeat_interval,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    let conn = app_state.main_db.write().await;
    conn.execute(
        "INSERT INTO reminders (id, owner_user_id, title, description, due_at, repeat_interval, is_active, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            reminder.id.as_str(),
            user.id.as_str(),
            reminder.title.as_str(),
            reminder.description.clone(),
            timestamp_nanos(reminder.due_at),
            reminder.repeat_interval.as_str(),
            reminder.is_active,
            timestamp_nanos(now),
            timestamp_nanos(now),
        ),
    )
    .await
    .map_err(|_| db_error_with_context("reminder creation failed"))?;

    Ok((StatusCode::CREATED, Json(reminder)))
}

pub async fn get_reminders(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<GetRemindersQuery>,
) -> Result<(StatusCode, Json<GetRemindersResponse>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let limit = validate_reminders_limit(query.limit)?;
    let offset = validate_offset(query.offset)?;

    let mut conditions = vec!["owner_user_id = ?".to_string()];
    let mut params: Vec<libsql::Value> = vec![user.id.clone().into()];

    if let Some(active) = query.active {
        conditions.push("is_active = ?".to_string());
        params.push((active as i64).into());
    }

    let where_clause = conditions.join(" AND ");

    let conn = app_state.main_db.read().await;

    let count_query = format!("SELECT COUNT(*) FROM reminders WHERE {}", where_clause);
    let mut count_rows = conn
        .query(&count_query, params.clone())
        .await
        .map_err(|_| db_error_with_context("failed to count reminders"))?;

    let total_count: u32 = if let Some(row) = count_rows.next().await.map_err(|_| db_error())? {
        row.get(0).map_err(|_| db_error())?
    } else {
        0
    };

    let page_query = format!(
        "SELECT {} FROM reminders WHERE {} ORDER BY due_at ASC LIMIT ? OFFSET ?",
        REMINDER_COLUMNS, where_clause
    );
    params.push((limit as i64).into());
    params.push((offset as i64).into());

    let mut rows = conn
        .query(&page_query, params)
        .await
        .map_err(|_| db_error_with_context("failed to query reminders"))?;

    let mut reminders = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        reminders.push(extract_reminder_from_row(row)?);
    }

    Ok((
        StatusCode::OK,
        Json(GetRemindersResponse {
            reminders,
            total_count,
        }),
    ))
}

pub async fn get_reminder(
    State(app_state): State<AppState>,
    session: Session,
    Path(reminder_id): Path<String>,
) -> Result<(StatusCode, Json<Reminder>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let conn = app_state.main_db.read().await;
    let query = format!(
        "SELECT {} FROM reminders WHERE id = ? AND owner_user_id = ?",
        REMINDER_COLUMNS
    );
    let mut rows = conn
        .query(&query, (reminder_id.as_str(), user.id.as_str()))
        .await
        .map_err(|_| db_error_with_context("failed to query reminder"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => Ok((StatusCode::OK, Json(extract_reminder_from_row(row)?))),
        None => Err((StatusCode::NOT_FOUND, "Reminder not found".to_string())),
    }
}

pub async fn update_reminder(
    State(app_state): State<AppState>,
    session: Session,
    Path(reminder_id): Path<String>,
    Json(payload): Json<UpdateReminderPayload>,
) -> Result<(StatusCode, Json<Reminder>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    if payload.title.is_none()
        && payload.description.is_none()
        && payload.due_at.is_none()
        && payload.repeat_interval.is_none()
        && payload.is_active.is_none()
    {
        return Err((
            StatusCode::BAD_REQUEST,
            "At least one field must be provided for update".to_string(),
        ));
    }

    if let Some(ref title) = payload.title {
        validate_reminder_title(title)?;
    }
    let updated_due = match payload.due_at {
        Some(ref raw) => Some(validate_timestamp(raw)?),
        None => None,
    };
    let updated_repeat = match payload.repeat_interval {
        Some(ref raw) => Some(validate_repeat_interval(raw)?),
        None => None,
    };

    let existing = {
        let conn = app_state.main_db.read().await;
        let query = format!(
            "SELECT {} FROM reminders WHERE id = ? AND owner_user_id = ?",
            REMINDER_COLUMNS
        );
        let mut rows = conn
            .query(&query, (reminder_id.as_str(), user.id.as_str()))
            .await
            .map_err(|_| db_error_with_context("failed to query existing reminder"))?;

        match rows.next().await.map_err(|_| db_error())? {
            Some(row) => extract_reminder_from_row(row)?,
            None => return Err((StatusCode::NOT_FOUND, "Reminder not found".to_string())),
        }
    };

    let now = app_state.clock.now_utc();
    let updated = Reminder {
        id: existing.id,
        title: payload
            .title
            .map(|t| t.trim().to_string())
            .unwrap_or(existing.title),
        description: payload.description.or(existing.description),
        due_at: updated_due.unwrap_or(existing.due_at),
        repeat_interval: updated_repeat.unwrap_or(existing.repeat_interval),
        is_active: payload.is_active.unwrap_or(existing.is_active),
        created_at: existing.created_at,
        updated_at: now,
    };

    let conn = app_state.main_db.write().await;
    let affected_rows = conn
        .execute(
            "UPDATE reminders SET title = ?, description = ?, due_at = ?, repeat_interval = ?, is_active = ?, updated_at = ? WHERE id = ? AND owner_user_id = ?",
            (
                updated.title.as_str(),
                updated.description.clone(),
                timestamp_nanos(updated.due_at),
                updated.repeat_interval.as_str(),
                updated.is_active,
                timestamp_nanos(now),
                updated.id.as_str(),
                user.id.as_str(),
            ),
        )
        .await
        .map_err(|_| db_error_with_context("failed to update reminder"))?;

    if affected_rows == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            "Reminder not found or no changes made".to_string(),
        ));
    }

    Ok((StatusCode::OK, Json(updated)))
}

pub async fn delete_reminder(
    State(app_state): State<AppState>,
    session: Session,
    Path(reminder_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let conn = app_state.main_db.write().await;
    let affected_rows = conn
        .execute(
            "DELETE FROM reminders WHERE id = ? AND owner_user_id = ?",
            (reminder_id.as_str(), user.id.as_str()),
        )
        .await
        .map_err(|_| db_error_with_context("failed to delete reminder"))?;

    if affected_rows == 0 {
        return Err((StatusCode::NOT_FOUND, "Reminder not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
