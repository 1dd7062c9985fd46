//! SQLite-backed credential store.
//!
//! Tables:
//! - `accounts`: one row per account; email unique and case-insensitive;
//!   the `decisions` collection rides along as a JSON column
//!
//! Token consumption (`consume_*`) runs find-and-clear under a single
//! connection guard, so concurrent redemptions of the same token serialize
//! here and exactly one caller wins.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

use super::{normalize_email, Account, AccountDraft, Decision, Provider};
use crate::token::epoch_secs;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("account not found")]
    NotFound,

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

/// Persistence seam for the auth flow. Handlers never touch a connection;
/// they get this trait injected, which is also what the tests swap out.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, StoreError>;

    /// Insert a new account. `DuplicateEmail` when the address is taken.
    async fn create(&self, draft: AccountDraft) -> Result<Account, StoreError>;

    /// Full update of the mutable columns by id. `NotFound` when the row is
    /// gone. Returns the account with `updated_at` refreshed.
    async fn save(&self, account: &Account) -> Result<Account, StoreError>;

    async fn list(&self) -> Result<Vec<Account>, StoreError>;

    /// Find the account holding this unexpired verification code, mark it
    /// verified, and clear the code, all in one step. `None` when no row
    /// matches; wrong, expired, and unknown codes are indistinguishable.
    async fn consume_verification_token(
        &self,
        code: &str,
        now: i64,
    ) -> Result<Option<Account>, StoreError>;

    /// Find the account holding this unexpired reset token, install the new
    /// password hash, and clear the token, all in one step.
    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: i64,
    ) -> Result<Option<Account>, StoreError>;
}

/// The column list every SELECT uses, in `account_from_row` order.
const ACCOUNT_COLUMNS: &str = "id, email, password_hash, name, picture, provider, is_verified, \
     verification_token, verification_expires_at, reset_token, reset_expires_at, \
     last_login, decisions, created_at, updated_at";

pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;

        Self::init(conn)
    }

    /// Fresh in-memory store, used by tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT,
                name TEXT NOT NULL,
                picture TEXT,
                provider TEXT NOT NULL,
                is_verified INTEGER NOT NULL DEFAULT 0,
                verification_token TEXT,
                verification_expires_at INTEGER,
                reset_token TEXT,
                reset_expires_at INTEGER,
                last_login INTEGER NOT NULL,
                decisions TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_accounts_verification
                ON accounts(verification_token);
            CREATE INDEX IF NOT EXISTS idx_accounts_reset
                ON accounts(reset_token);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn get_by_id_locked(conn: &Connection, id: &str) -> Result<Option<Account>, StoreError> {
        let row = conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
            rusqlite::params![id],
            account_from_row,
        );
        match row {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1 COLLATE NOCASE"),
            rusqlite::params![normalize_email(email)],
            account_from_row,
        );
        match row {
            Ok(account) => Ok(Some(account)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, StoreError> {
        let conn = self.conn.lock();
        Self::get_by_id_locked(&conn, id)
    }

    async fn create(&self, draft: AccountDraft) -> Result<Account, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = epoch_secs();

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO accounts (id, email, password_hash, name, picture, provider,
                 is_verified, verification_token, verification_expires_at,
                 reset_token, reset_expires_at, last_login, decisions,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, NULL, ?10, '[]', ?11, ?11)",
            rusqlite::params![
                id,
                draft.email,
                draft.password_hash,
                draft.name,
                draft.picture,
                draft.provider.as_str(),
                draft.is_verified,
                draft.verification_token,
                draft.verification_expires_at,
                now,
                now,
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::DuplicateEmail);
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Account {
            id,
            email: draft.email,
            password_hash: draft.password_hash,
            name: draft.name,
            picture: draft.picture,
            provider: draft.provider,
            is_verified: draft.is_verified,
            verification_token: draft.verification_token,
            verification_expires_at: draft.verification_expires_at,
            reset_token: None,
            reset_expires_at: None,
            last_login: now,
            decisions: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn save(&self, account: &Account) -> Result<Account, StoreError> {
        let now = epoch_secs();
        let decisions_json = serde_json::to_string(&account.decisions)
            .map_err(|e| StoreError::Corrupt(format!("decisions failed to serialize: {e}")))?;

        let conn = self.conn.lock();
        // id, provider, and created_at are immutable after insert.
        let updated = conn.execute(
            "UPDATE accounts SET email = ?1, password_hash = ?2, name = ?3, picture = ?4,
                 is_verified = ?5, verification_token = ?6, verification_expires_at = ?7,
                 reset_token = ?8, reset_expires_at = ?9, last_login = ?10,
                 decisions = ?11, updated_at = ?12
             WHERE id = ?13",
            rusqlite::params![
                account.email,
                account.password_hash,
                account.name,
                account.picture,
                account.is_verified,
                account.verification_token,
                account.verification_expires_at,
                account.reset_token,
                account.reset_expires_at,
                account.last_login,
                decisions_json,
                now,
                account.id,
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(Account {
            updated_at: now,
            ..account.clone()
        })
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map([], account_from_row)?;
        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?);
        }
        Ok(accounts)
    }

    async fn consume_verification_token(
        &self,
        code: &str,
        now: i64,
    ) -> Result<Option<Account>, StoreError> {
        let conn = self.conn.lock();

        // Find-and-clear under one guard; the expiry bound is strict.
        let found = conn.query_row(
            "SELECT id FROM accounts
             WHERE verification_token = ?1 AND verification_expires_at > ?2",
            rusqlite::params![code, now],
            |row| row.get::<_, String>(0),
        );
        let id = match found {
            Ok(id) => id,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        conn.execute(
            "UPDATE accounts SET is_verified = 1, verification_token = NULL,
                 verification_expires_at = NULL, updated_at = ?2
             WHERE id = ?1",
            rusqlite::params![id, now],
        )?;

        Self::get_by_id_locked(&conn, &id)
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: i64,
    ) -> Result<Option<Account>, StoreError> {
        let conn = self.conn.lock();

        let found = conn.query_row(
            "SELECT id FROM accounts
             WHERE reset_token = ?1 AND reset_expires_at > ?2",
            rusqlite::params![token, now],
            |row| row.get::<_, String>(0),
        );
        let id = match found {
            Ok(id) => id,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        conn.execute(
            "UPDATE accounts SET password_hash = ?2, reset_token = NULL,
                 reset_expires_at = NULL, updated_at = ?3
             WHERE id = ?1",
            rusqlite::params![id, new_password_hash, now],
        )?;

        Self::get_by_id_locked(&conn, &id)
    }
}

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    let provider_raw: String = row.get(5)?;
    let provider = Provider::parse(&provider_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown provider '{provider_raw}'").into(),
        )
    })?;

    let decisions_raw: String = row.get(12)?;
    let decisions: Vec<Decision> = serde_json::from_str(&decisions_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        picture: row.get(4)?,
        provider,
        is_verified: row.get(6)?,
        verification_token: row.get(7)?,
        verification_expires_at: row.get(8)?,
        reset_token: row.get(9)?,
        reset_expires_at: row.get(10)?,
        last_login: row.get(11)?,
        decisions,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

// ── Tests ───────────────────────────────────────────────────────────
