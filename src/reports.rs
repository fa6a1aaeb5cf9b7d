use std::collections::HashMap;
use std::future::Future;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};
use tower_sessions::Session;

use crate::auth::get_current_user;
use crate::categories::find_category_by_id;
use crate::clock::Clock;
use crate::constants::REPORT_TIMEOUT_SECS;
use crate::models::{Category, Transaction, TransactionKind};
use crate::transactions::fetch_transactions_in_range;
use crate::{AppState, Db};

const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// Period selectors accepted by the summary endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryPeriod {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Custom,
}

impl SummaryPeriod {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(SummaryPeriod::Daily),
            "weekly" => Some(SummaryPeriod::Weekly),
            "monthly" => Some(SummaryPeriod::Monthly),
            "yearly" => Some(SummaryPeriod::Yearly),
            "custom" => Some(SummaryPeriod::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    None,
    Category,
    Subcategory,
}

impl GroupBy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(GroupBy::None),
            "category" => Some(GroupBy::Category),
            "subcategory" => Some(GroupBy::Subcategory),
            _ => None,
        }
    }
}

/// Failures surfaced by the reporting engine. InvalidRequest is always
/// caller-fixable; Upstream is retryable by the caller, never internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    InvalidRequest(String),
    Upstream(String),
}

impl From<ReportError> for (StatusCode, String) {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ReportError::Upstream(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryTotals {
    pub income: f64,
    pub expenses: f64,
    pub savings: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category_id: String,
    pub category_name: String,
    pub income: f64,
    pub expenses: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubcategorySummary {
    pub subcategory_id: String,
    pub subcategory_name: String,
    pub income: f64,
    pub expenses: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportPeriod {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

/// Request-scoped projection; computed fresh per request, never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub period: ReportPeriod,
    pub totals: SummaryTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_category: Option<Vec<CategorySummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_subcategory: Option<Vec<SubcategorySummary>>,
}

/// Owner-scoped range query over the transaction store
pub trait TransactionSource {
    fn transactions_in_range(
        &self,
        owner_id: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> impl Future<Output = Result<Vec<Transaction>, ReportError>> + Send;
}

/// Owner-scoped lookup against the category store; no-match is Ok(None)
pub trait CategoryLookup {
    fn category_by_id(
        &self,
        owner_id: &str,
        category_id: &str,
    ) -> impl Future<Output = Result<Option<Category>, ReportError>> + Send;
}

/// Both store seams backed by the application database
pub struct DbStore<'a> {
    pub db: &'a Db,
}

impl TransactionSource for DbStore<'_> {
    async fn transactions_in_range(
        &self,
        owner_id: &str,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<Transaction>, ReportError> {
        fetch_transactions_in_range(self.db, owner_id, from, to)
            .await
            .map_err(|(_, msg)| ReportError::Upstream(msg))
    }
}

impl CategoryLookup for DbStore<'_> {
    async fn category_by_id(
        &self,
        owner_id: &str,
        category_id: &str,
    ) -> Result<Option<Category>, ReportError> {
        find_category_by_id(self.db, owner_id, category_id)
            .await
            .map_err(|(_, msg)| ReportError::Upstream(msg))
    }
}

/// Maps a period selector to a concrete inclusive [from, to] UTC window.
///
/// The custom window propagates the caller's bounds verbatim, including an
/// inverted one; every other selector derives its window from `now`.
pub fn resolve_period(
    selector: &str,
    start: Option<Date>,
    end: Option<Date>,
    now: OffsetDateTime,
) -> Result<(OffsetDateTime, OffsetDateTime), ReportError> {
    let today = now.date();
    match SummaryPeriod::parse(selector) {
        Some(SummaryPeriod::Daily) => {
            let from = today.midnight().assume_utc();
            Ok((from, from + Duration::days(1) - Duration::nanoseconds(1)))
        }
        Some(SummaryPeriod::Weekly) => {
            // Week starts Monday; Sunday counts as day seven of the same week
            let days_from_monday = today.weekday().number_days_from_monday() as i64;
            let from = (today - Duration::days(days_from_monday)).midnight().assume_utc();
            Ok((from, from + Duration::days(7) - Duration::nanoseconds(1)))
        }
        Some(SummaryPeriod::Monthly) => {
            let first = today - Duration::days(today.day() as i64 - 1);
            let month_days = time::util::days_in_year_month(first.year(), first.month());
            let from = first.midnight().assume_utc();
            Ok((from, from + Duration::days(month_days as i64) - Duration::nanoseconds(1)))
        }
        Some(SummaryPeriod::Yearly) => {
            let first = today - Duration::days(today.ordinal() as i64 - 1);
            let year_days = time::util::days_in_year(first.year());
            let from = first.midnight().assume_utc();
            Ok((from, from + Duration::days(year_days as i64) - Duration::nanoseconds(1)))
        }
        Some(SummaryPeriod::Custom) => match (start, end) {
            (Some(start), Some(end)) => Ok((
                start.midnight().assume_utc(),
                end.midnight().assume_utc(),
            )),
            _ => Err(ReportError::InvalidRequest(
                "start and end are required for custom period".to_string(),
            )),
        },
        None => Err(ReportError::InvalidRequest("invalid period".to_string())),
    }
}

#[derive(Default)]
struct Bucket {
    income: f64,
    expenses: f64,
}

/// Second aggregation pass: buckets transactions by the given key, resolving
/// each bucket's display name at most once through `categories`. Transactions
/// without the key are skipped; a failed or empty lookup leaves the name empty.
async fn group_totals<C: CategoryLookup>(
    categories: &C,
    owner_id: &str,
    transactions: &[Transaction],
    key: fn(&Transaction) -> Option<&String>,
) -> (HashMap<String, Bucket>, HashMap<String, String>) {
    let mut buckets: HashMap<String, Bucket> = HashMap::new();
    let mut names: HashMap<String, String> = HashMap::new();

    for tx in transactions {
        let Some(id) = key(tx) else {
            continue;
        };

        if !names.contains_key(id) {
            // Name lookups are cosmetic; never fail the report over one
            let name = match categories.category_by_id(owner_id, id).await {
                Ok(Some(category)) => category.name,
                Ok(None) | Err(_) => String::new(),
            };
            names.insert(id.clone(), name);
        }

        let bucket = buckets.entry(id.clone()).or_default();
        match tx.kind {
            TransactionKind::Income => bucket.income += tx.amount,
            TransactionKind::Expense => bucket.expenses += tx.amount,
        }
    }

    (buckets, names)
}

/// Orchestrates a full summary: resolve the window, fetch the owner's
/// transactions in range, aggregate totals and the requested breakdown.
/// Stateless and read-only; safe to retry from scratch on any failure.
pub async fn compute_summary<S>(
    stores: &S,
    clock: &dyn Clock,
    owner_id: &str,
    period: &str,
    start: Option<Date>,
    end: Option<Date>,
    group_by: &str,
) -> Result<SummaryReport, ReportError>
where
    S: TransactionSource + CategoryLookup,
{
    let (from, to) = resolve_period(period, start, end, clock.now_utc())?;

    let transactions = stores.transactions_in_range(owner_id, from, to).await?;

    let mut income = 0.0;
    let mut expenses = 0.0;
    for tx in &transactions {
        match tx.kind {
            TransactionKind::Income => income += tx.amount,
            TransactionKind::Expense => expenses += tx.amount,
        }
    }

    let mut report = SummaryReport {
        period: ReportPeriod {
            start: from,
            end: to,
        },
        totals: SummaryTotals {
            income,
            expenses,
            savings: income - expenses,
        },
        by_category: None,
        by_subcategory: None,
    };

    match GroupBy::parse(group_by) {
        Some(GroupBy::None) => {}
        Some(GroupBy::Category) => {
            let (buckets, names) =
                group_totals(stores, owner_id, &transactions, |tx| tx.category_id.as_ref()).await;

            let mut summaries: Vec<CategorySummary> = buckets
                .into_iter()
                .map(|(id, bucket)| CategorySummary {
                    category_name: names.get(&id).cloned().unwrap_or_default(),
                    category_id: id,
                    income: bucket.income,
                    expenses: bucket.expenses,
                })
                .collect();
            // Key order keeps repeated runs over the same data bit-identical
            summaries.sort_by(|a, b| a.category_id.cmp(&b.category_id));
            report.by_category = Some(summaries);
        }
        Some(GroupBy::Subcategory) => {
            let (buckets, names) = group_totals(stores, owner_id, &transactions, |tx| {
                tx.subcategory_id.as_ref()
            })
            .await;

            let mut summaries: Vec<SubcategorySummary> = buckets
                .into_iter()
                .map(|(id, bucket)| SubcategorySummary {
                    subcategory_name: names.get(&id).cloned().unwrap_or_default(),
                    subcategory_id: id,
                    income: bucket.income,
                    expenses: bucket.expenses,
                })
                .collect();
            summaries.sort_by(|a, b| a.subcategory_id.cmp(&b.subcategory_id));
            report.by_subcategory = Some(summaries);
        }
        None => {
            return Err(ReportError::InvalidRequest("invalid groupBy".to_string()));
        }
    }

    Ok(report)
}

/// [`compute_summary`] under a wall-clock budget; an exceeded budget surfaces
/// as retryable upstream failure, never as a hang
pub async fn compute_summary_with_timeout<S>(
    stores: &S,
    clock: &dyn Clock,
    owner_id: &str,
    period: &str,
    start: Option<Date>,
    end: Option<Date>,
    group_by: &str,
    budget: std::time::Duration,
) -> Result<SummaryReport, ReportError>
where
    S: TransactionSource + CategoryLookup,
{
    match tokio::time::timeout(
        budget,
        compute_summary(stores, clock, owner_id, period, start, end, group_by),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ReportError::Upstream(
            "report computation timed out".to_string(),
        )),
    }
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub period: Option<String>,
    #[serde(rename = "groupBy")]
    pub group_by: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

fn parse_query_date(value: &str) -> Result<Date, (StatusCode, String)> {
    Date::parse(value.trim(), DATE_FORMAT)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid date format".to_string()))
}

pub async fn get_summary(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<SummaryQuery>,
) -> Result<(StatusCode, Json<SummaryReport>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let period = query.period.as_deref().unwrap_or("monthly");
    let group_by = query.group_by.as_deref().unwrap_or("none");

    // start/end are only consulted for the custom selector
    let (start, end) = if period == "custom" {
        let start = match query.start.as_deref() {
            Some(raw) => Some(parse_query_date(raw)?),
            None => None,
        };
        let end = match query.end.as_deref() {
            Some(raw) => Some(parse_query_date(raw)?),
            None => None,
        };
        (start, end)
    } else {
        (None, None)
    };

    let store = DbStore {
        db: &app_state.main_db,
    };

    let report = compute_summary_with_timeout(
        &store,
        app_state.clock.as_ref(),
        &user.id,
        period,
        start,
        end,
        group_by,
        std::time::Duration::from_secs(REPORT_TIMEOUT_SECS),
    )
    .await
    .map_err(|e| -> (StatusCode, String) { e.into() })?;

    Ok((StatusCode::OK, Json(report)))
}
