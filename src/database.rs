use anyhow::Result;
use libsql::{Builder, Connection};
use std::future::Future;
use std::pin::Pin;
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id             TEXT    PRIMARY KEY,
    name           TEXT    UNIQUE NOT NULL,
    password_hash  TEXT    NOT NULL
);
"#;

const CREATE_CATEGORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id            TEXT    PRIMARY KEY,
    owner_user_id TEXT    NOT NULL,
    name          TEXT    NOT NULL,
    parent_id     TEXT,
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL,
    FOREIGN KEY (owner_user_id) REFERENCES users(id)
);
"#;

// Occurrence dates are unix nanoseconds so inclusive range queries stay exact
const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id             TEXT    PRIMARY KEY,
    owner_user_id  TEXT    NOT NULL,
    kind           TEXT    NOT NULL,
    amount         REAL    NOT NULL,
    currency       TEXT    NOT NULL,
    category_id    TEXT,
    subcategory_id TEXT,
    note           TEXT,
    date           INTEGER NOT NULL,
    created_at     INTEGER NOT NULL,
    updated_at     INTEGER NOT NULL,
    FOREIGN KEY (owner_user_id) REFERENCES users(id)
);
"#;

const CREATE_REMINDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reminders (
    id              TEXT    PRIMARY KEY,
    owner_user_id   TEXT    NOT NULL,
    title           TEXT    NOT NULL,
    description     TEXT,
    due_at          INTEGER NOT NULL,
    repeat_interval TEXT    NOT NULL,
    is_active       BOOLEAN NOT NULL DEFAULT TRUE,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL,
    FOREIGN KEY (owner_user_id) REFERENCES users(id)
);
"#;

const CREATE_TRANSACTIONS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transactions_owner_date ON transactions(owner_user_id, date);
"#;

const CREATE_CATEGORIES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_categories_owner_name ON categories(owner_user_id, name);
"#;

const CREATE_REMINDERS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_reminders_owner_due ON reminders(owner_user_id, due_at);
"#;

pub type Db = Arc<RwLock<Connection>>;

/// Application database (fintrack.db), shared by all users with owner-scoped rows
pub async fn init_main_db(data_dir: &str) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join("fintrack.db");
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    conn.execute(CREATE_USERS_TABLE, ()).await?;
    conn.execute(CREATE_CATEGORIES_TABLE, ()).await?;
    conn.execute(CREATE_TRANSACTIONS_TABLE, ()).await?;
    conn.execute(CREATE_REMINDERS_TABLE, ()).await?;
    conn.execute(CREATE_TRANSACTIONS_INDEX, ()).await?;
    conn.execute(CREATE_CATEGORIES_INDEX, ()).await?;
    conn.execute(CREATE_REMINDERS_INDEX, ()).await?;

    Ok(Arc::new(RwLock::new(conn)))
}

/// Execute a function within a database transaction, returning handler-compatible errors
///
/// The closure must return a boxed future to handle lifetime issues with async closures.
pub async fn with_transaction<F, T, E>(db: &Db, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a Connection) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>,
    E: From<TransactionError>,
{
    // Acquire write lock for exclusive access during transaction
    let conn = db.write().await;

    conn.execute("BEGIN TRANSACTION", ())
        .await
        .map_err(|_| TransactionError::Begin)?;

    match f(&conn).await {
        Ok(result) => {
            conn.execute("COMMIT", ())
                .await
                .map_err(|_| TransactionError::Commit)?;
            Ok(result)
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            Err(e)
        }
    }
}

/// Errors that can occur during transaction management
#[derive(Debug)]
pub enum TransactionError {
    Begin,
    Commit,
}
