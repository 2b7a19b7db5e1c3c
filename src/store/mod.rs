use chrono::NaiveDate;
use rusqlite::{params, Connection, ErrorCode};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::models::{score_in_range, today, MAX_SCORE, MIN_SCORE};

mod images;
mod rankings;
mod ratings;
mod users;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Lock the connection. A panic in another holder leaves the
    /// connection itself usable, so poisoning is ignored.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                creator_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                score INTEGER NOT NULL,
                time_stamp TEXT NOT NULL,
                FOREIGN KEY (creator_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (target_id) REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE(creator_id, target_id)
            );

            CREATE TABLE IF NOT EXISTS rankings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                creator_id INTEGER NOT NULL,
                image_id INTEGER NOT NULL,
                score INTEGER NOT NULL,
                FOREIGN KEY (creator_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (image_id) REFERENCES images(id) ON DELETE CASCADE,
                UNIQUE(creator_id, image_id)
            );

            CREATE INDEX IF NOT EXISTS idx_images_user_id ON images(user_id);
            CREATE INDEX IF NOT EXISTS idx_ratings_target_id ON ratings(target_id);
            CREATE INDEX IF NOT EXISTS idx_rankings_image_id ON rankings(image_id);
            "#,
        )?;
        Ok(())
    }
}

/// Collect the single integer column of a query keyed on one id
fn query_ids(conn: &Connection, sql: &str, id: i64) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>();
    ids
}

fn user_exists(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

fn image_exists(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM images WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

fn validate_score(score: i64) -> StoreResult<()> {
    if score_in_range(score) {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "score must be between {} and {}, got {}",
            MIN_SCORE, MAX_SCORE, score
        )))
    }
}

/// Map a UNIQUE violation that slipped past the pre-insert check to a conflict
fn conflict_or_database(e: rusqlite::Error, what: impl Into<String>) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict(what.into())
        }
        _ => StoreError::Database(e),
    }
}

fn parse_date(s: String) -> NaiveDate {
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").unwrap_or_else(|_| today())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let store = Store::in_memory().unwrap();
        store.init_schema().unwrap();
        store.init_schema().unwrap();
    }

    #[test]
    fn test_validate_score() {
        assert!(validate_score(MIN_SCORE).is_ok());
        assert!(validate_score(MAX_SCORE).is_ok());
        assert!(matches!(validate_score(0), Err(StoreError::Validation(_))));
        assert!(matches!(
            validate_score(MAX_SCORE + 1),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-02-29".to_string()),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(parse_date("garbage".to_string()), today());
    }
}
