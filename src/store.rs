// 🗄️ Ledger Store - persistence behind a narrow interface
// Upserts keyed by id/hash, append-mostly statements and reports, explicit
// delete cascade. The in-memory adapter is the reference implementation for
// tests; `SqliteStore` is the durable one.

use crate::model::{Account, Statement, Transaction, VerificationReport};
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

// ============================================================================
// STORE INTERFACE
// ============================================================================

/// Counts from a bulk transaction upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub replaced: usize,
}

impl UpsertStats {
    pub fn total(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Persistence contract every storage adapter must honor.
///
/// Transactions are keyed by dedupe hash: at most one stored entry per
/// hash, the second upsert replaces the first. Deleting a statement
/// cascades to its account's transactions, the account itself if no other
/// statement references it, and the statement's verification reports.
pub trait LedgerStore: Send + Sync {
    fn upsert_account(&self, account: &Account) -> Result<()>;
    fn get_account(&self, id: &str) -> Result<Option<Account>>;

    fn bulk_upsert_transactions(&self, transactions: &[Transaction]) -> Result<UpsertStats>;
    fn load_transactions(
        &self,
        account_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>>;

    fn save_statement(&self, statement: &Statement) -> Result<()>;
    fn load_statement(&self, id: &str) -> Result<Option<Statement>>;
    fn list_statements(&self, user_id: &str) -> Result<Vec<Statement>>;
    fn delete_statement(&self, id: &str) -> Result<bool>;

    fn save_verification_report(&self, report: &VerificationReport) -> Result<()>;
    fn load_verification_reports(&self, statement_id: &str) -> Result<Vec<VerificationReport>>;
}

// ============================================================================
// IN-MEMORY ADAPTER
// ============================================================================

#[derive(Default)]
struct MemoryInner {
    accounts: HashMap<String, Account>,
    /// Keyed by dedupe hash
    transactions: HashMap<String, Transaction>,
    statements: HashMap<String, Statement>,
    reports: Vec<VerificationReport>,
}

/// Mutex-guarded maps. Individual operations serialize; per-account
/// ordering across concurrent ingestions is the caller's job.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_count(&self) -> usize {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .transactions
            .len()
    }

    pub fn report_count(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").reports.len()
    }
}

impl LedgerStore for MemoryStore {
    fn upsert_account(&self, account: &Account) -> Result<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.accounts.get(id).cloned())
    }

    fn bulk_upsert_transactions(&self, transactions: &[Transaction]) -> Result<UpsertStats> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let mut stats = UpsertStats::default();

        for tx in transactions {
            match inner.transactions.insert(tx.dedupe_hash.clone(), tx.clone()) {
                Some(_) => stats.replaced += 1,
                None => stats.inserted += 1,
            }
        }

        Ok(stats)
    }

    fn load_transactions(
        &self,
        account_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut out: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|tx| tx.account_id == account_id)
            .filter(|tx| start.map_or(true, |s| tx.posted >= s))
            .filter(|tx| end.map_or(true, |e| tx.posted <= e))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.posted.cmp(&b.posted).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    fn save_statement(&self, statement: &Statement) -> Result<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .statements
            .insert(statement.id.clone(), statement.clone());
        Ok(())
    }

    fn load_statement(&self, id: &str) -> Result<Option<Statement>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.statements.get(id).cloned())
    }

    fn list_statements(&self, user_id: &str) -> Result<Vec<Statement>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut out: Vec<Statement> = inner
            .statements
            .values()
            .filter(|st| st.account.user_id() == Some(user_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.ingested_at.cmp(&a.ingested_at));
        Ok(out)
    }

    fn delete_statement(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");

        let statement = match inner.statements.remove(id) {
            Some(st) => st,
            None => return Ok(false),
        };
        let account_id = statement.account.id.clone();

        // Cascade: the account's transactions, then the account itself if
        // no remaining statement references it, then the reports
        inner
            .transactions
            .retain(|_, tx| tx.account_id != account_id);

        let orphaned = !inner
            .statements
            .values()
            .any(|st| st.account.id == account_id);
        if orphaned {
            inner.accounts.remove(&account_id);
        }

        inner.reports.retain(|r| r.statement_id != id);

        Ok(true)
    }

    fn save_verification_report(&self, report: &VerificationReport) -> Result<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.reports.push(report.clone());
        Ok(())
    }

    fn load_verification_reports(&self, statement_id: &str) -> Result<Vec<VerificationReport>> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .reports
            .iter()
            .filter(|r| r.statement_id == statement_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
