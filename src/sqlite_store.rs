// 💾 SQLite Ledger Store - durable adapter for the LedgerStore contract
// Transactions are first-class rows (UNIQUE dedupe hash, queryable by
// account and date); statements and reports are stored as JSON documents
// keyed for lookup.

use crate::model::{Account, Statement, Transaction, VerificationReport};
use crate::store::{LedgerStore, UpsertStats};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a ledger database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("failed to open database at {}", path.as_ref().display()))?;
        Self::setup(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, handy for tests of the durable adapter itself
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::setup(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn setup(conn: &Connection) -> Result<()> {
        // WAL for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS transactions (
                dedupe_hash TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                posted TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS statements (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                user_id TEXT,
                ingested_at TEXT NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS verification_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                statement_id TEXT NOT NULL,
                executed_at TEXT NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tx_account_posted
             ON transactions(account_id, posted)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_statements_user ON statements(user_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reports_statement
             ON verification_reports(statement_id)",
            [],
        )?;

        Ok(())
    }
}

impl LedgerStore for SqliteStore {
    fn upsert_account(&self, account: &Account) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let data = serde_json::to_string(account)?;
        conn.execute(
            "INSERT INTO accounts (id, data) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = ?2, updated_at = CURRENT_TIMESTAMP",
            params![account.id, data],
        )?;
        Ok(())
    }

    fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare("SELECT data FROM accounts WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;

        match rows.next() {
            Some(row) => Ok(Some(serde_json::from_str(&row?)?)),
            None => Ok(None),
        }
    }

    fn bulk_upsert_transactions(&self, transactions: &[Transaction]) -> Result<UpsertStats> {
        let mut conn = self.conn.lock().expect("sqlite mutex poisoned");
        let db_tx = conn.transaction()?;
        let mut stats = UpsertStats::default();

        for tx in transactions {
            let exists: bool = db_tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM transactions WHERE dedupe_hash = ?1)",
                params![tx.dedupe_hash],
                |row| row.get(0),
            )?;

            let data = serde_json::to_string(tx)?;
            db_tx.execute(
                "INSERT INTO transactions (dedupe_hash, account_id, posted, data)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(dedupe_hash) DO UPDATE SET
                     account_id = ?2, posted = ?3, data = ?4,
                     updated_at = CURRENT_TIMESTAMP",
                params![
                    tx.dedupe_hash,
                    tx.account_id,
                    tx.posted.format("%Y-%m-%d").to_string(),
                    data,
                ],
            )?;

            if exists {
                stats.replaced += 1;
            } else {
                stats.inserted += 1;
            }
        }

        db_tx.commit()?;
        Ok(stats)
    }

    fn load_transactions(
        &self,
        account_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");

        // ISO dates compare lexicographically, open bounds use sentinels
        let start = start
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "0000-00-00".to_string());
        let end = end
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "9999-99-99".to_string());

        let mut stmt = conn.prepare(
            "SELECT data FROM transactions
             WHERE account_id = ?1 AND posted >= ?2 AND posted <= ?3
             ORDER BY posted ASC",
        )?;
        let rows = stmt
            .query_map(params![account_id, start, end], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).context("corrupt transaction row"))
            .collect()
    }

    fn save_statement(&self, statement: &Statement) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let data = serde_json::to_string(statement)?;
        conn.execute(
            "INSERT INTO statements (id, account_id, user_id, ingested_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 account_id = ?2, user_id = ?3, ingested_at = ?4, data = ?5",
            params![
                statement.id,
                statement.account.id,
                statement.account.user_id(),
                statement.ingested_at.to_rfc3339(),
                data,
            ],
        )?;
        Ok(())
    }

    fn load_statement(&self, id: &str) -> Result<Option<Statement>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare("SELECT data FROM statements WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;

        match rows.next() {
            Some(row) => Ok(Some(serde_json::from_str(&row?)?)),
            None => Ok(None),
        }
    }

    fn list_statements(&self, user_id: &str) -> Result<Vec<Statement>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT data FROM statements WHERE user_id = ?1 ORDER BY ingested_at DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).context("corrupt statement row"))
            .collect()
    }

    fn delete_statement(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn.lock().expect("sqlite mutex poisoned");
        let db_tx = conn.transaction()?;

        let account_id: Option<String> = db_tx
            .query_row(
                "SELECT account_id FROM statements WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .ok();
        let account_id = match account_id {
            Some(a) => a,
            None => return Ok(false),
        };

        db_tx.execute("DELETE FROM statements WHERE id = ?1", params![id])?;
        db_tx.execute(
            "DELETE FROM transactions WHERE account_id = ?1",
            params![account_id],
        )?;

        let still_referenced: bool = db_tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM statements WHERE account_id = ?1)",
            params![account_id],
            |row| row.get(0),
        )?;
        if !still_referenced {
            db_tx.execute("DELETE FROM accounts WHERE id = ?1", params![account_id])?;
        }

        db_tx.execute(
            "DELETE FROM verification_reports WHERE statement_id = ?1",
            params![id],
        )?;

        db_tx.commit()?;
        Ok(true)
    }

    fn save_verification_report(&self, report: &VerificationReport) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let data = serde_json::to_string(report)?;
        conn.execute(
            "INSERT INTO verification_reports (statement_id, executed_at, data)
             VALUES (?1, ?2, ?3)",
            params![report.statement_id, report.executed_at.to_rfc3339(), data],
        )?;
        Ok(())
    }

    fn load_verification_reports(&self, statement_id: &str) -> Result<Vec<VerificationReport>> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT data FROM verification_reports
             WHERE statement_id = ?1 ORDER BY executed_at ASC",
        )?;
        let rows = stmt
            .query_map(params![statement_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).context("corrupt report row"))
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountType, TransactionType};
    use chrono::Utc;
    use std::collections::HashMap;

    fn test_account() -> Account {
        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), serde_json::json!("user-a"));
        Account {
            id: "acct-1".to_string(),
            institution_id: "test-bank".to_string(),
            display_name: "Checking".to_string(),
            account_type: AccountType::Checking,
            currency: "USD".to_string(),
            balance: 100.0,
            balance_as_of: Utc::now(),
            metadata,
        }
    }

    fn test_tx(hash: &str, day: u32, amount: f64) -> Transaction {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: "acct-1".to_string(),
            posted: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            description: "test".to_string(),
            original_description: "test".to_string(),
            amount,
            currency: "USD".to_string(),
            transaction_type: TransactionType::from_amount(amount),
            category: None,
            subcategory: None,
            normalized_description: "test".to_string(),
            dedupe_hash: hash.to_string(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_account_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let account = test_account();

        store.upsert_account(&account).unwrap();
        let loaded = store.get_account("acct-1").unwrap().unwrap();
        assert_eq!(loaded.display_name, "Checking");
        assert_eq!(loaded.user_id(), Some("user-a"));

        // Upsert overwrites
        let mut updated = account;
        updated.balance = 250.0;
        store.upsert_account(&updated).unwrap();
        let loaded = store.get_account("acct-1").unwrap().unwrap();
        assert_eq!(loaded.balance, 250.0);
    }

    #[test]
    fn test_transaction_upsert_and_window() {
        let store = SqliteStore::open_in_memory().unwrap();

        let stats = store
            .bulk_upsert_transactions(&[test_tx("h1", 5, -10.0), test_tx("h2", 20, 25.0)])
            .unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.replaced, 0);

        // Re-upsert by hash replaces, never duplicates
        let stats = store
            .bulk_upsert_transactions(&[test_tx("h1", 5, -10.0)])
            .unwrap();
        assert_eq!(stats.replaced, 1);

        let all = store.load_transactions("acct-1", None, None).unwrap();
        assert_eq!(all.len(), 2);

        let window = store
            .load_transactions(
                "acct-1",
                NaiveDate::from_ymd_opt(2025, 1, 10),
                NaiveDate::from_ymd_opt(2025, 1, 31),
            )
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].dedupe_hash, "h2");
    }
}
