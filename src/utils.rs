use axum::http::StatusCode;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::constants::*;

pub fn db_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ERR_DATABASE_OPERATION.to_string(),
    )
}

pub fn db_error_with_context(context: &str) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Database error: {}", context),
    )
}

pub fn validate_string_length(
    value: &str,
    field_name: &str,
    max_length: usize,
) -> Result<(), (StatusCode, String)> {
    if value.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} cannot be empty", field_name),
        ));
    }
    if value.len() > max_length {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} must be less than {} characters", field_name, max_length),
        ));
    }
    Ok(())
}

/// Parses an RFC 3339 timestamp from a request field. Instants outside the
/// storable nanosecond range are rejected, not wrapped.
pub fn validate_timestamp(value: &str) -> Result<OffsetDateTime, (StatusCode, String)> {
    let ts = OffsetDateTime::parse(value.trim(), &Rfc3339)
        .map(|ts| ts.to_offset(time::UtcOffset::UTC))
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid date format".to_string()))?;

    if i64::try_from(ts.unix_timestamp_nanos()).is_err() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Date is outside the supported range".to_string(),
        ));
    }
    Ok(ts)
}

pub fn validate_amount(amount: f64) -> Result<(), (StatusCode, String)> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Amount must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Occurrence dates are stored as unix nanoseconds for exact range queries.
/// Instants outside the i64 range saturate; stored values never reach that
/// range because [`validate_timestamp`] rejects them first, but resolved
/// report windows can (a far-future custom bound still queries correctly).
pub fn timestamp_nanos(ts: OffsetDateTime) -> i64 {
    match i64::try_from(ts.unix_timestamp_nanos()) {
        Ok(nanos) => nanos,
        Err(_) if ts.unix_timestamp_nanos() > 0 => i64::MAX,
        Err(_) => i64::MIN,
    }
}

pub fn timestamp_from_nanos(nanos: i64) -> Result<OffsetDateTime, (StatusCode, String)> {
    OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
        .map_err(|_| db_error_with_context("invalid stored timestamp"))
}

pub async fn validate_category_exists(
    db: &crate::Db,
    user_id: &str,
    category_id: &str,
) -> Result<(), (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id FROM categories WHERE id = ? AND owner_user_id = ?",
            (category_id, user_id),
        )
        .await
        .map_err(|_| db_error_with_context("failed to check category existence"))?;

    if rows.next().await.map_err(|_| db_error())?.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Category does not exist".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_limit(limit: Option<u32>, default: u32) -> Result<u32, (StatusCode, String)> {
    match limit {
        Some(l) => {
            if l == 0 {
                Err((
                    StatusCode::BAD_REQUEST,
                    "Limit must be greater than 0".to_string(),
                ))
            } else if l > MAX_LIMIT {
                Err((
                    StatusCode::BAD_REQUEST,
                    format!("Limit cannot exceed {}", MAX_LIMIT),
                ))
            } else {
                Ok(l)
            }
        }
        None => Ok(default),
    }
}

pub fn validate_categories_limit(limit: Option<u32>) -> Result<u32, (StatusCode, String)> {
    validate_limit(limit, DEFAULT_CATEGORIES_LIMIT)
}

pub fn validate_transactions_limit(limit: Option<u32>) -> Result<u32, (StatusCode, String)> {
    validate_limit(limit, DEFAULT_TRANSACTIONS_LIMIT)
}

pub fn validate_reminders_limit(limit: Option<u32>) -> Result<u32, (StatusCode, String)> {
    validate_limit(limit, DEFAULT_REMINDERS_LIMIT)
}

pub fn validate_offset(offset: Option<u32>) -> Result<u32, (StatusCode, String)> {
    match offset {
        Some(o) => {
            if o > MAX_OFFSET {
                Err((
                    StatusCode::BAD_REQUEST,
                    format!("Offset cannot exceed {}", MAX_OFFSET),
                ))
            } else {
                Ok(o)
            }
        }
        None => Ok(0),
    }
}
