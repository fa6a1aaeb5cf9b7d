pub mod auth;
pub mod categories;
pub mod clock;
pub mod config;
pub mod constants;
pub mod database;
pub mod models;
pub mod reminders;
pub mod reports;
pub mod transactions;
pub mod utils;

// Re-export types at crate root for convenient importing
pub use crate::clock::{Clock, SharedClock, SystemClock};
pub use crate::database::{Db, TransactionError, with_transaction};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Single application database, owner-scoped via owner_user_id columns
    pub main_db: Db,
    /// Clock the reporting engine reads "now" from; tests pin a fixed instant
    pub clock: SharedClock,
}
