use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::auth::get_current_user;
use crate::constants::*;
use crate::models::{
    CreateTransactionPayload, GetTransactionsQuery, GetTransactionsResponse, Transaction,
    TransactionKind, UpdateTransactionPayload,
};
use crate::utils::{
    db_error, db_error_with_context, timestamp_from_nanos, timestamp_nanos, validate_amount,
    validate_category_exists, validate_offset, validate_string_length, validate_timestamp,
    validate_transactions_limit,
};
use crate::{AppState, Db};

pub fn validate_kind(kind: &str) -> Result<TransactionKind, (StatusCode, String)> {
    TransactionKind::parse(kind.trim()).ok_or((
        StatusCode::BAD_REQUEST,
        "Transaction kind must be 'income' or 'expense'".to_string(),
    ))
}

pub fn validate_currency(currency: &str) -> Result<(), (StatusCode, String)> {
    validate_string_length(currency, "Currency", MAX_CURRENCY_CODE_LENGTH)
}

pub fn extract_transaction_from_row(row: libsql::Row) -> Result<Transaction, (StatusCode, String)> {
    let id: String = row
        .get(0)
        .map_err(|_| db_error_with_context("invalid transaction data"))?;
    let kind_raw: String = row
        .get(1)
        .map_err(|_| db_error_with_context("invalid transaction data"))?;
    let kind = TransactionKind::parse(&kind_raw)
        .ok_or_else(|| db_error_with_context("invalid transaction kind"))?;
    let amount: f64 = row
        .get(2)
        .map_err(|_| db_error_with_context("invalid transaction data"))?;
    let currency: String = row
        .get(3)
        .map_err(|_| db_error_with_context("invalid transaction data"))?;
    let category_id: Option<String> = row
        .get(4)
        .map_err(|_| db_error_with_context("invalid transaction data"))?;
    let subcategory_id: Option<String> = row
        .get(5)
        .map_err(|_| db_error_with_context("invalid transaction data"))?;
    let note: Option<String> = row
        .get(6)
        .map_err(|_| db_error_with_context("invalid transaction data"))?;
    let date: i64 = row
        .get(7)
        .map_err(|_| db_error_with_context("invalid transaction data"))?;
    let created_at: i64 = row
        .get(8)
        .map_err(|_| db_error_with_context("invalid transaction data"))?;
    let updated_at: i64 = row
        .get(9)
        .map_err(|_| db_error_with_context("invalid transaction data"))?;

    Ok(Transaction {
        id,
        kind,
        amount,
        currency,
        category_id,
        subcategory_id,
        note,
        date: timestamp_from_nanos(date)?,
        created_at: timestamp_from_nanos(created_at)?,
        updated_at: timestamp_from_nanos(updated_at)?,
    })
}

const TRANSACTION_COLUMNS: &str =
    "id, kind, amount, currency, category_id, subcategory_id, note, date, created_at, updated_at";

/// Range fetch used by the reporting engine; bounds are inclusive, no ordering guarantee
pub async fn fetch_transactions_in_range(
    db: &Db,
    user_id: &str,
    from: OffsetDateTime,
    to: OffsetDateTime,
) -> Result<Vec<Transaction>, (StatusCode, String)> {
    let conn = db.read().await;
    let query = format!(
        "SELECT {} FROM transactions WHERE owner_user_id = ? AND date BETWEEN ? AND ?",
        TRANSACTION_COLUMNS
    );
    let mut rows = conn
        .query(&query, (user_id, timestamp_nanos(from), timestamp_nanos(to)))
        .await
        .map_err(|_| db_error_with_context("failed to query transactions"))?;

    let mut transactions = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        transactions.push(extract_transaction_from_row(row)?);
    }
    Ok(transactions)
}

pub async fn create_transaction(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateTransactionPayload>,
) -> Result<(StatusCode, Json<Transaction>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let kind = validate_kind(&payload.kind)?;
    validate_amount(payload.amount)?;
    validate_currency(&payload.currency)?;
    if let Some(ref note) = payload.note {
        validate_string_length(note, "Note", MAX_NOTE_LENGTH)?;
    }

    // Optional category links must exist and belong to the caller
    if let Some(ref category_id) = payload.category_id {
        validate_category_exists(&app_state.main_db, &user.id, category_id).await?;
    }
    if let Some(ref subcategory_id) = payload.subcategory_id {
        validate_category_exists(&app_state.main_db, &user.id, subcategory_id).await?;
    }

    let now = app_state.clock.now_utc();
    let date = match payload.date {
        Some(ref raw) => validate_timestamp(raw)?,
        None => now,
    };

    let transaction = Transaction {
        id: Uuid::new_v4().to_string(),
        kind,
        amount: payload.amount,
        currency: payload.currency.trim().to_string(),
        category_id: payload.category_id,
        subcategory_id: payload.subcategory_id,
        note: payload.note,
        date,
        created_at: now,
        updated_at: now,
    };

    let conn = app_state.main_db.write().await;
    conn.execute(
        "INSERT INTO transactions (id, owner_user_id, kind, amount, currency, category_id, subcategory_id, note, date, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            transaction.id.as_str(),
            user.id.as_str(),
            transaction.kind.as_str(),
            transaction.amount,
            transaction.currency.as_str(),
            transaction.category_id.clone(),
            transaction.subcategory_id.clone(),
            transaction.note.clone(),
            timestamp_nanos(transaction.date),
            timestamp_nanos(now),
            timestamp_nanos(now),
        ),
    )
    .await
    .map_err(|_| db_error_with_context("transaction creation failed"))?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn get_transactions(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<GetTransactionsQuery>,
) -> Result<(StatusCode, Json<GetTransactionsResponse>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let limit = validate_transactions_limit(query.limit)?;
    let offset = validate_offset(query.offset)?;

    let mut conditions = vec!["owner_user_id = ?".to_string()];
    let mut params: Vec<libsql::Value> = vec![user.id.clone().into()];

    if let Some(ref kind) = query.kind {
        let kind = validate_kind(kind)?;
        conditions.push("kind = ?".to_string());
        params.push(kind.as_str().into());
    }
    if let Some(ref from) = query.from {
        let from = validate_timestamp(from)?;
        conditions.push("date >= ?".to_string());
        params.push(timestamp_nanos(from).into());
    }
    if let Some(ref to) = query.to {
        let to = validate_timestamp(to)?;
        conditions.push("date <= ?".to_string());
        params.push(timestamp_nanos(to).into());
    }
    if let Some(ref category_id) = query.category_id {
        conditions.push("category_id = ?".to_string());
        params.push(category_id.clone().into());
    }
    if let Some(ref subcategory_id) = query.subcategory_id {
        conditions.push("subcategory_id = ?".to_string());
        params.push(subcategory_id.clone().into());
    }

    let where_clause = conditions.join(" AND ");
    let order = if query.sort.as_deref() == Some("date_asc") {
        "ASC"
    } else {
        "DESC"
    };

    let conn = app_state.main_db.read().await;

    let count_query = format!("SELECT COUNT(*) FROM transactions WHERE {}", where_clause);
    let mut count_rows = conn
        .query(&count_query, params.clone())
        .await
        .map_err(|_| db_error_with_context("failed to count transactions"))?;

    let total_count: u32 = if let Some(row) = count_rows.next().await.map_err(|_| db_error())? {
        row.get(0).map_err(|_| db_error())?
    } else {
        0
    };

    let page_query = format!(
        "SELECT {} FROM transactions WHERE {} ORDER BY date {} LIMIT ? OFFSET ?",
        TRANSACTION_COLUMNS, where_clause, order
    );
    params.push((limit as i64).into());
    params.push((offset as i64).into());

    let mut rows = conn
        .query(&page_query, params)
        .await
        .map_err(|_| db_error_with_context("failed to query transactions"))?;

    let mut transactions = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        transactions.push(extract_transaction_from_row(row)?);
    }

    Ok((
        StatusCode::OK,
        Json(GetTransactionsResponse {
            transactions,
            total_count,
        }),
    ))
}

pub async fn get_transaction(
    State(app_state): State<AppState>,
    session: Session,
    Path(transaction_id): Path<String>,
) -> Result<(StatusCode, Json<Transaction>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let conn = app_state.main_db.read().await;
    let query = format!(
        "SELECT {} FROM transactions WHERE id = ? AND owner_user_id = ?",
        TRANSACTION_COLUMNS
    );
    let mut rows = conn
        .query(&query, (transaction_id.as_str(), user.id.as_str()))
        .await
        .map_err(|_| db_error_with_context("failed to query transaction"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => Ok((StatusCode::OK, Json(extract_transaction_from_row(row)?))),
        None => Err((StatusCode::NOT_FOUND, "Transaction not found".to_string())),
    }
}

pub async fn update_transaction(
    State(app_state): State<AppState>,
    session: Session,
    Path(transaction_id): Path<String>,
    Json(payload): Json<UpdateTransactionPayload>,
) -> Result<(StatusCode, Json<Transaction>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    if payload.kind.is_none()
        && payload.amount.is_none()
        && payload.currency.is_none()
        && payload.category_id.is_none()
        && payload.subcategory_id.is_none()
        && payload.note.is_none()
        && payload.date.is_none()
    {
        return Err((
            StatusCode::BAD_REQUEST,
            "At least one field must be provided for update".to_string(),
        ));
    }

    let updated_kind = match payload.kind {
        Some(ref kind) => Some(validate_kind(kind)?),
        None => None,
    };
    if let Some(amount) = payload.amount {
        validate_amount(amount)?;
    }
    if let Some(ref currency) = payload.currency {
        validate_currency(currency)?;
    }
    if let Some(ref note) = payload.note {
        validate_string_length(note, "Note", MAX_NOTE_LENGTH)?;
    }
    let updated_date = match payload.date {
        Some(ref raw) => Some(validate_timestamp(raw)?),
        None => None,
    };

    if let Some(ref category_id) = payload.category_id {
        validate_category_exists(&app_state.main_db, &user.id, category_id).await?;
    }
    if let Some(ref subcategory_id) = payload.subcategory_id {
        validate_category_exists(&app_state.main_db, &user.id, subcategory_id).await?;
    }

    let existing = {
        let conn = app_state.main_db.read().await;
        let query = format!(
            "SELECT {} FROM transactions WHERE id = ? AND owner_user_id = ?",
            TRANSACTION_COLUMNS
        );
        let mut rows = conn
            .query(&query, (transaction_id.as_str(), user.id.as_str()))
            .await
            .map_err(|_| db_error_with_context("failed to query existing transaction"))?;

        match rows.next().await.map_err(|_| db_error())? {
            Some(row) => extract_transaction_from_row(row)?,
            None => return Err((StatusCode::NOT_FOUND, "Transaction not found".to_string())),
        }
    };

    let now = app_state.clock.now_utc();
    let updated = Transaction {
        id: existing.id,
        kind: updated_kind.unwrap_or(existing.kind),
        amount: payload.amount.unwrap_or(existing.amount),
        currency: payload
            .currency
            .map(|c| c.trim().to_string())
            .unwrap_or(existing.currency),
        category_id: payload.category_id.or(existing.category_id),
        subcategory_id: payload.subcategory_id.or(existing.subcategory_id),
        note: payload.note.or(existing.note),
        date: updated_date.unwrap_or(existing.date),
        created_at: existing.created_at,
        updated_at: now,
    };

    let conn = app_state.main_db.write().await;
    let affected_rows = conn
        .execute(
            "UPDATE transactions SET kind = ?, amount = ?, currency = ?, category_id = ?, subcategory_id = ?, note = ?, date = ?, updated_at = ? WHERE id = ? AND owner_user_id = ?",
            (
                updated.kind.as_str(),
                updated.amount,
                updated.currency.as_str(),
                updated.category_id.clone(),
                updated.subcategory_id.clone(),
                updated.note.clone(),
                timestamp_nanos(updated.date),
                timestamp_nanos(now),
                updated.id.as_str(),
                user.id.as_str(),
            ),
        )
        .await
        .map_err(|_| db_error_with_context("failed to update transaction"))?;

    if affected_rows == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            "Transaction not found or no changes made".to_string(),
        ));
    }

    Ok((StatusCode::OK, Json(updated)))
}

pub async fn delete_transaction(
    State(app_state): State<AppState>,
    session: Session,
    Path(transaction_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let conn = app_state.main_db.write().await;
    let affected_rows = conn
        .execute(
            "DELETE FROM transactions WHERE id = ? AND owner_user_id = ?",
            (transaction_id.as_str(), user.id.as_str()),
        )
        .await
        .map_err(|_| db_error_with_context("failed to delete transaction"))?;

    if affected_rows == 0 {
        return Err((StatusCode::NOT_FOUND, "Transaction not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
