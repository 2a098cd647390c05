// 📒 Canonical Data Model - Accounts, Statements, Transactions, Reports
// Core record shapes shared by the extractor, verifier, and storage adapters

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// ACCOUNT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
    Brokerage,
    Retirement,
    Loan,
    Other,
}

impl AccountType {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            AccountType::Checking => "Checking",
            AccountType::Savings => "Savings",
            AccountType::Credit => "Credit",
            AccountType::Brokerage => "Brokerage",
            AccountType::Retirement => "Retirement",
            AccountType::Loan => "Loan",
            AccountType::Other => "Other",
        }
    }
}

/// One logical account per (institution, external account id).
/// Upserted on every ingestion or sync; balance reflects the most recent
/// statement processed for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub institution_id: String,
    pub display_name: String,
    pub account_type: AccountType,
    pub currency: String,
    pub balance: f64,
    pub balance_as_of: DateTime<Utc>,

    /// Extensible metadata (includes "user_id" for ownership)
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Account {
    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get("user_id").and_then(|v| v.as_str())
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    /// Derive type from the signed amount (positive = credit/inflow)
    pub fn from_amount(amount: f64) -> Self {
        if amount >= 0.0 {
            TransactionType::Credit
        } else {
            TransactionType::Debit
        }
    }
}

/// Canonical ledger entry. `dedupe_hash` is the identity key: two
/// transactions with the same hash are the same economic event, and an
/// upsert by hash replaces the stored row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub posted: NaiveDate,
    pub description: String,
    pub original_description: String,

    /// Signed: positive = credit/inflow, negative = debit/outflow
    pub amount: f64,
    pub currency: String,
    pub transaction_type: TransactionType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,

    pub normalized_description: String,
    pub dedupe_hash: String,

    /// Conversion provenance, balance-after, source flags
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

// ============================================================================
// STATEMENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementSource {
    Document,
    Aggregator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Pass,
    Fail,
    Review,
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationStatus::Pending)
    }
}

/// One ingested document or aggregator pull covering a period for one
/// account. Immutable after creation except for the verification status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub id: String,
    pub account: Account,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub opening_balance: f64,
    pub closing_balance: f64,
    pub currency: String,
    pub transactions: Vec<Transaction>,
    pub source: StatementSource,
    pub ingested_at: DateTime<Utc>,
    pub verification_status: VerificationStatus,

    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Statement {
    /// Declared balance delta the transactions must explain
    pub fn balance_delta(&self) -> f64 {
        self.closing_balance - self.opening_balance
    }

    pub fn transaction_sum(&self) -> f64 {
        self.transactions.iter().map(|tx| tx.amount).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "Statement {} ({} → {}): {} transactions, opening {:.2}, closing {:.2} {}",
            self.id,
            self.period_start,
            self.period_end,
            self.transactions.len(),
            self.opening_balance,
            self.closing_balance,
            self.currency
        )
    }
}

// ============================================================================
// VERIFICATION REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationIssue {
    /// Stable machine code, e.g. "balance_mismatch"
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub severity: IssueSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl VerificationIssue {
    pub fn error(code: &str, message: String) -> Self {
        VerificationIssue {
            code: code.to_string(),
            message,
            field: None,
            severity: IssueSeverity::Error,
            remediation: None,
        }
    }

    pub fn warning(code: &str, message: String) -> Self {
        VerificationIssue {
            code: code.to_string(),
            message,
            field: None,
            severity: IssueSeverity::Warning,
            remediation: None,
        }
    }

    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    pub fn with_remediation(mut self, remediation: &str) -> Self {
        self.remediation = Some(remediation.to_string());
        self
    }
}

/// Outcome of one verification run. Append-only: re-verification creates a
/// new report rather than mutating an old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub statement_id: String,
    pub status: VerificationStatus,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub issues: Vec<VerificationIssue>,
    /// Which verifier produced this report ("external" / "local_fallback")
    pub source: String,
    pub executed_at: DateTime<Utc>,

    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VerificationReport {
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Error)
    }

    /// Ingestion aborts only on Fail with at least one ERROR issue;
    /// Review (warnings only) is non-fatal.
    pub fn is_fatal(&self) -> bool {
        self.status == VerificationStatus::Fail && self.has_errors()
    }

    pub fn error_codes(&self) -> Vec<String> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
            .map(|i| i.code.clone())
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "Verification of {}: {:?} (confidence {:.2}, {} issues)",
            self.statement_id,
            self.status,
            self.confidence,
            self.issues.len()
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_type_from_amount() {
        assert_eq!(TransactionType::from_amount(25.0), TransactionType::Credit);
        assert_eq!(TransactionType::from_amount(0.0), TransactionType::Credit);
        assert_eq!(TransactionType::from_amount(-0.01), TransactionType::Debit);
    }

    #[test]
    fn test_report_fatality() {
        let mut report = VerificationReport {
            statement_id: "st-1".to_string(),
            status: VerificationStatus::Review,
            confidence: 0.6,
            issues: vec![VerificationIssue::warning(
                "duplicate_transaction",
                "dup".to_string(),
            )],
            source: "local_fallback".to_string(),
            executed_at: Utc::now(),
            metadata: HashMap::new(),
        };

        // Review with warnings only is never fatal
        assert!(!report.is_fatal());

        report.status = VerificationStatus::Fail;
        report
            .issues
            .push(VerificationIssue::error("balance_mismatch", "off".to_string()));
        assert!(report.is_fatal());
        assert_eq!(report.error_codes(), vec!["balance_mismatch".to_string()]);
    }

    #[test]
    fn test_statement_arithmetic() {
        let account = Account {
            id: "acct-1".to_string(),
            institution_id: "bank-1".to_string(),
            display_name: "Checking".to_string(),
            account_type: AccountType::Checking,
            currency: "USD".to_string(),
            balance: 3810.0,
            balance_as_of: Utc::now(),
            metadata: HashMap::new(),
        };

        let tx = |amount: f64| Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: "acct-1".to_string(),
            posted: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            description: "x".to_string(),
            original_description: "x".to_string(),
            amount,
            currency: "USD".to_string(),
            transaction_type: TransactionType::from_amount(amount),
            category: None,
            subcategory: None,
            normalized_description: "x".to_string(),
            dedupe_hash: String::new(),
            metadata: HashMap::new(),
        };

        let statement = Statement {
            id: "st-1".to_string(),
            account,
            period_start: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            opening_balance: 1500.0,
            closing_balance: 3810.0,
            currency: "USD".to_string(),
            transactions: vec![tx(2500.0), tx(-190.0)],
            source: StatementSource::Document,
            ingested_at: Utc::now(),
            verification_status: VerificationStatus::Pending,
            metadata: HashMap::new(),
        };

        assert!((statement.balance_delta() - 2310.0).abs() < 1e-9);
        assert!((statement.transaction_sum() - 2310.0).abs() < 1e-9);
    }
}
