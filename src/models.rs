use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

#[derive(Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
}

#[derive(Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

/// Closed two-valued kind; anything else is rejected at the boundary
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "income" => Some(TransactionKind::Income),
            "expense" => Some(TransactionKind::Expense),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Transaction {
    pub id: String,
    pub kind: TransactionKind,
    pub amount: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Deserialize)]
pub struct CreateTransactionPayload {
    pub kind: String,
    pub amount: f64,
    pub currency: String,
    pub category_id: Option<String>,
    pub subcategory_id: Option<String>,
    pub note: Option<String>,
    /// RFC 3339; defaults to the current instant when omitted
    pub date: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTransactionPayload {
    pub kind: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub category_id: Option<String>,
    pub subcategory_id: Option<String>,
    pub note: Option<String>,
    pub date: Option<String>,
}

#[derive(Deserialize)]
pub struct GetTransactionsQuery {
    pub kind: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub category_id: Option<String>,
    pub subcategory_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort: Option<String>,
}

#[derive(Serialize)]
pub struct GetTransactionsResponse {
    pub transactions: Vec<Transaction>,
    pub total_count: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Deserialize)]
pub struct CreateCategoryPayload {
    pub name: String,
    pub parent_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateCategoryPayload {
    pub name: Option<String>,
    pub parent_id: Option<String>,
}

#[derive(Deserialize)]
pub struct GetCategoriesQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub parent_id: Option<String>,
    pub search: Option<String>,
}

#[derive(Serialize)]
pub struct GetCategoriesResponse {
    pub categories: Vec<Category>,
    pub total_count: u32,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepeatInterval {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl RepeatInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatInterval::None => "none",
            RepeatInterval::Daily => "daily",
            RepeatInterval::Weekly => "weekly",
            RepeatInterval::Monthly => "monthly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(RepeatInterval::None),
            "daily" => Some(RepeatInterval::Daily),
            "weekly" => Some(RepeatInterval::Weekly),
            "monthly" => Some(RepeatInterval::Monthly),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Reminder {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub due_at: OffsetDateTime,
    pub repeat_interval: RepeatInterval,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Deserialize)]
pub struct CreateReminderPayload {
    pub title: String,
    pub description: Option<String>,
    /// RFC 3339; defaults to one hour from now when omitted
    pub due_at: Option<String>,
    pub repeat_interval: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateReminderPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_at: Option<String>,
    pub repeat_interval: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize)]
pub struct GetRemindersQuery {
    pub active: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize)]
pub struct GetRemindersResponse {
    pub reminders: Vec<Reminder>,
    pub total_count: u32,
}
