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
    Category, CreateCategoryPayload, GetCategoriesQuery, GetCategoriesResponse,
    UpdateCategoryPayload,
};
use crate::utils::{
    db_error, db_error_with_context, timestamp_from_nanos, timestamp_nanos,
    validate_categories_limit, validate_offset, validate_string_length,
};
use crate::{AppState, Db, TransactionError, with_transaction};

pub fn validate_category_name(name: &str) -> Result<(), (StatusCode, String)> {
    validate_string_length(name, "Category name", MAX_CATEGORY_NAME_LENGTH)
}

pub fn extract_category_from_row(row: libsql::Row) -> Result<Category, (StatusCode, String)> {
    let id: String = row
        .get(0)
        .map_err(|_| db_error_with_context("invalid category data"))?;
    let name: String = row
        .get(1)
        .map_err(|_| db_error_with_context("invalid category data"))?;
    let parent_id: Option<String> = row
        .get(2)
        .map_err(|_| db_error_with_context("invalid category data"))?;
    let created_at: i64 = row
        .get(3)
        .map_err(|_| db_error_with_context("invalid category data"))?;
    let updated_at: i64 = row
        .get(4)
        .map_err(|_| db_error_with_context("invalid category data"))?;

    Ok(Category {
        id,
        name,
        parent_id,
        created_at: timestamp_from_nanos(created_at)?,
        updated_at: timestamp_from_nanos(updated_at)?,
    })
}

/// Owner-scoped lookup; a missing or foreign-owned category is Ok(None), not an error
pub async fn find_category_by_id(
    db: &Db,
    user_id: &str,
    category_id: &str,
) -> Result<Option<Category>, (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, name, parent_id, created_at, updated_at FROM categories WHERE id = ? AND owner_user_id = ?",
            (category_id, user_id),
        )
        .await
        .map_err(|_| db_error_with_context("failed to query category"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => Ok(Some(extract_category_from_row(row)?)),
        None => Ok(None),
    }
}

pub async fn validate_category_not_in_use(
    db: &Db,
    user_id: &str,
    category_id: &str,
) -> Result<(), (StatusCode, String)> {
    let conn = db.read().await;

    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM transactions WHERE owner_user_id = ? AND (category_id = ? OR subcategory_id = ?)",
            (user_id, category_id, category_id),
        )
        .await
        .map_err(|_| db_error_with_context("failed to check category usage"))?;

    if let Some(row) = rows.next().await.map_err(|_| db_error())? {
        let count: u32 = row.get(0).map_err(|_| db_error())?;
        if count > 0 {
            return Err((
                StatusCode::CONFLICT,
                "Cannot delete category: it has associated transactions".to_string(),
            ));
        }
    }

    Ok(())
}

enum CreateCategoryError {
    Transaction(TransactionError),
    DbCheck,
    DbInsert,
    Conflict,
    ParentNotFound,
}

impl From<TransactionError> for CreateCategoryError {
    fn from(e: TransactionError) -> Self {
        CreateCategoryError::Transaction(e)
    }
}

impl From<CreateCategoryError> for (StatusCode, String) {
    fn from(e: CreateCategoryError) -> Self {
        match e {
            CreateCategoryError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            CreateCategoryError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            CreateCategoryError::DbCheck => {
                db_error_with_context("failed to check existing category")
            }
            CreateCategoryError::DbInsert => db_error_with_context("category creation failed"),
            CreateCategoryError::Conflict => (
                StatusCode::CONFLICT,
                "Category name already exists (case-insensitive)".to_string(),
            ),
            CreateCategoryError::ParentNotFound => (
                StatusCode::BAD_REQUEST,
                "Parent category not found".to_string(),
            ),
        }
    }
}

pub async fn create_category(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateCategoryPayload>,
) -> Result<(StatusCode, Json<Category>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    validate_category_name(&payload.name)?;
    let category_name = payload.name.trim().to_string();
    let parent_id = payload.parent_id.clone();
    let now = app_state.clock.now_utc();
    let db = &app_state.main_db;

    let category = with_transaction(db, |conn| {
        let name = category_name.clone();
        let parent_id = parent_id.clone();
        let owner_user_id = user.id.clone();
        Box::pin(async move {
            // Parent must exist and belong to the same owner; no cycle check
            if let Some(ref parent) = parent_id {
                let mut parent_rows = conn
                    .query(
                        "SELECT id FROM categories WHERE id = ? AND owner_user_id = ?",
                        (parent.as_str(), owner_user_id.as_str()),
                    )
                    .await
                    .map_err(|_| CreateCategoryError::DbCheck)?;

                if parent_rows
                    .next()
                    .await
                    .map_err(|_| CreateCategoryError::DbCheck)?
                    .is_none()
                {
                    return Err(CreateCategoryError::ParentNotFound);
                }
            }

            let mut existing_rows = conn
                .query(
                    "SELECT id FROM categories WHERE owner_user_id = ? AND LOWER(name) = LOWER(?)",
                    (owner_user_id.as_str(), name.as_str()),
                )
                .await
                .map_err(|_| CreateCategoryError::DbCheck)?;

            if existing_rows
                .next()
                .await
                .map_err(|_| CreateCategoryError::DbCheck)?
                .is_some()
            {
                return Err(CreateCategoryError::Conflict);
            }

            let category_id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO categories (id, owner_user_id, name, parent_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
                (
                    category_id.as_str(),
                    owner_user_id.as_str(),
                    name.as_str(),
                    parent_id.clone(),
                    timestamp_nanos(now),
                    timestamp_nanos(now),
                ),
            )
            .await
            .map_err(|_| CreateCategoryError::DbInsert)?;

            Ok(Category {
                id: category_id,
                name,
                parent_id,
                created_at: now,
                updated_at: now,
            })
        })
    })
    .await
    .map_err(|e: CreateCategoryError| -> (StatusCode, String) { e.into() })?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn get_categories(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<GetCategoriesQuery>,
) -> Result<(StatusCode, Json<GetCategoriesResponse>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let limit = validate_categories_limit(query.limit)?;
    let offset = validate_offset(query.offset)?;

    let search_term = query
        .search
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());
    if let Some(search) = &search_term {
        validate_string_length(search, "Search term", MAX_CATEGORY_NAME_LENGTH)?;
    }

    // Dynamic filter set, same shape for the count and page queries
    let mut conditions = vec!["owner_user_id = ?".to_string()];
    let mut params: Vec<libsql::Value> = vec![user.id.clone().into()];

    if let Some(ref parent_id) = query.parent_id {
        conditions.push("parent_id = ?".to_string());
        params.push(parent_id.clone().into());
    }
    if let Some(search) = &search_term {
        conditions.push("name LIKE ? COLLATE NOCASE".to_string());
        params.push(format!("%{}%", search).into());
    }

    let where_clause = conditions.join(" AND ");

    let conn = app_state.main_db.read().await;

    let count_query = format!("SELECT COUNT(*) FROM categories WHERE {}", where_clause);
    let mut count_rows = conn
        .query(&count_query, params.clone())
        .await
        .map_err(|_| db_error_with_context("failed to count categories"))?;

    let total_count: u32 = if let Some(row) = count_rows.next().await.map_err(|_| db_error())? {
        row.get(0).map_err(|_| db_error())?
    } else {
        0
    };

    let page_query = format!(
        "SELECT id, name, parent_id, created_at, updated_at FROM categories WHERE {} ORDER BY name ASC LIMIT ? OFFSET ?",
        where_clause
    );
    params.push((limit as i64).into());
    params.push((offset as i64).into());

    let mut rows = conn
        .query(&page_query, params)
        .await
        .map_err(|_| db_error_with_context("failed to query categories"))?;

    let mut categories = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        categories.push(extract_category_from_row(row)?);
    }

    Ok((
        StatusCode::OK,
        Json(GetCategoriesResponse {
            categories,
            total_count,
            limit,
            offset,
        }),
    ))
}

pub async fn get_category(
    State(app_state): State<AppState>,
    session: Session,
    Path(category_id): Path<String>,
) -> Result<(StatusCode, Json<Category>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    match find_category_by_id(&app_state.main_db, &user.id, &category_id).await? {
        Some(category) => Ok((StatusCode::OK, Json(category))),
        None => Err((StatusCode::NOT_FOUND, "Category not found".to_string())),
    }
}

pub async fn update_category(
    State(app_state): State<AppState>,
    session: Session,
    Path(category_id): Path<String>,
    Json(payload): Json<UpdateCategoryPayload>,
) -> Result<(StatusCode, Json<Category>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    if payload.name.is_none() && payload.parent_id.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            "At least one field must be provided for update".to_string(),
        ));
    }

    let category_name = if let Some(ref name) = payload.name {
        validate_category_name(name)?;
        Some(name.trim().to_string())
    } else {
        None
    };

    let existing_category =
        match find_category_by_id(&app_state.main_db, &user.id, &category_id).await? {
            Some(category) => category,
            None => return Err((StatusCode::NOT_FOUND, "Category not found".to_string())),
        };

    if let Some(ref parent_id) = payload.parent_id {
        if parent_id == &category_id {
            return Err((
                StatusCode::BAD_REQUEST,
                "Category cannot be its own parent".to_string(),
            ));
        }
        if find_category_by_id(&app_state.main_db, &user.id, parent_id)
            .await?
            .is_none()
        {
            return Err((
                StatusCode::BAD_REQUEST,
                "Parent category not found".to_string(),
            ));
        }
    }

    let updated_name = category_name.unwrap_or(existing_category.name);
    let updated_parent = payload.parent_id.or(existing_category.parent_id);
    let now = app_state.clock.now_utc();

    let conn = app_state.main_db.write().await;

    let mut conflict_rows = conn
        .query(
            "SELECT id FROM categories WHERE owner_user_id = ? AND LOWER(name) = LOWER(?) AND id != ?",
            (user.id.as_str(), updated_name.as_str(), category_id.as_str()),
        )
        .await
        .map_err(|_| db_error_with_context("failed to check name conflict"))?;

    if conflict_rows
        .next()
        .await
        .map_err(|_| db_error())?
        .is_some()
    {
        return Err((
            StatusCode::CONFLICT,
            "Category name already exists (case-insensitive)".to_string(),
        ));
    }

    let affected_rows = conn
        .execute(
            "UPDATE categories SET name = ?, parent_id = ?, updated_at = ? WHERE id = ? AND owner_user_id = ?",
            (
                updated_name.as_str(),
                updated_parent.clone(),
                timestamp_nanos(now),
                category_id.as_str(),
                user.id.as_str(),
            ),
        )
        .await
        .map_err(|_| db_error_with_context("failed to update category"))?;

    if affected_rows == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            "Category not found or no changes made".to_string(),
        ));
    }

    let updated_category = Category {
        id: category_id,
        name: updated_name,
        parent_id: updated_parent,
        created_at: existing_category.created_at,
        updated_at: now,
    };

    Ok((StatusCode::OK, Json(updated_category)))
}

pub async fn delete_category(
    State(app_state): State<AppState>,
    session: Session,
    Path(category_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    if find_category_by_id(&app_state.main_db, &user.id, &category_id)
        .await?
        .is_none()
    {
        return Err((StatusCode::NOT_FOUND, "Category not found".to_string()));
    }

    validate_category_not_in_use(&app_state.main_db, &user.id, &category_id).await?;

    let conn = app_state.main_db.write().await;
    let affected_rows = conn
        .execute(
            "DELETE FROM categories WHERE id = ? AND owner_user_id = ?",
            (category_id.as_str(), user.id.as_str()),
        )
        .await
        .map_err(|_| db_error_with_context("failed to delete category"))?;

    if affected_rows == 0 {
        return Err((StatusCode::NOT_FOUND, "Category not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
