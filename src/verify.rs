// ⚖️ Ingestion Verifier - reconcile extracted data before it is trusted
// Delegates to an external verification service when one is configured;
// falls back to local arithmetic and structural checks on unavailability.
// Reports are append-only: re-verification creates a fresh report.

use crate::model::{
    IssueSeverity, Statement, VerificationIssue, VerificationReport, VerificationStatus,
};
use chrono::Utc;
use std::collections::HashMap;

// ============================================================================
// EXTERNAL SERVICE BOUNDARY
// ============================================================================

/// Context handed to the external verification service alongside the
/// structured statement
#[derive(Debug, Clone)]
pub struct VerifyContext {
    pub statement_id: String,
    pub source: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// External verification collaborator.
///
/// Implementations enforce their own bounded timeout and map timeout,
/// transport error, or disabled configuration to `None`; the verifier then
/// runs local fallback checks instead of skipping verification.
pub trait VerificationService: Send + Sync {
    fn verify(&self, statement: &Statement, ctx: &VerifyContext) -> Option<VerificationReport>;
}

// ============================================================================
// INGESTION VERIFIER
// ============================================================================

pub struct IngestionVerifier {
    external: Option<Box<dyn VerificationService>>,

    /// Tolerance for balance reconciliation, in units of the statement
    /// currency (default: 1.0)
    pub tolerance: f64,
}

impl IngestionVerifier {
    /// Verifier with local fallback checks only
    pub fn local_only() -> Self {
        IngestionVerifier {
            external: None,
            tolerance: 1.0,
        }
    }

    /// Verifier that delegates to an external service first
    pub fn with_external(service: Box<dyn VerificationService>) -> Self {
        IngestionVerifier {
            external: Some(service),
            tolerance: 1.0,
        }
    }

    /// Verify a statement. An available external service is authoritative;
    /// otherwise the local fallback checks run.
    pub fn verify(&self, statement: &Statement) -> VerificationReport {
        if let Some(service) = &self.external {
            let ctx = VerifyContext {
                statement_id: statement.id.clone(),
                source: format!("{:?}", statement.source).to_uppercase(),
                metadata: statement.metadata.clone(),
            };
            if let Some(report) = service.verify(statement, &ctx) {
                return report;
            }
        }

        self.local_verify(statement)
    }

    /// Local fallback checks: period validity, balance reconciliation,
    /// in-statement duplicate rows
    fn local_verify(&self, statement: &Statement) -> VerificationReport {
        let mut issues = Vec::new();

        self.check_period(statement, &mut issues);
        self.check_balance(statement, &mut issues);
        self.check_duplicates(statement, &mut issues);

        let status = derive_status(&issues);
        let confidence = match status {
            VerificationStatus::Pass => 0.9,
            VerificationStatus::Review => 0.6,
            _ => 0.1,
        };

        VerificationReport {
            statement_id: statement.id.clone(),
            status,
            confidence,
            issues,
            source: "local_fallback".to_string(),
            executed_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    fn check_period(&self, statement: &Statement, issues: &mut Vec<VerificationIssue>) {
        if statement.period_start > statement.period_end {
            issues.push(
                VerificationIssue::error(
                    "period_invalid",
                    format!(
                        "statement period starts {} but ends {}",
                        statement.period_start, statement.period_end
                    ),
                )
                .with_field("period_start"),
            );
        }
    }

    fn check_balance(&self, statement: &Statement, issues: &mut Vec<VerificationIssue>) {
        let sum = statement.transaction_sum();
        let delta = statement.balance_delta();
        let difference = (sum - delta).abs();

        if difference > self.tolerance {
            issues.push(
                VerificationIssue::error(
                    "balance_mismatch",
                    format!(
                        "transactions sum to {:.2} but declared balances move {:.2} ({} difference {:.2})",
                        sum, delta, statement.currency, difference
                    ),
                )
                .with_field("closing_balance")
                .with_remediation(
                    "check for missing or duplicated transactions, or a mis-read opening/closing balance",
                ),
            );
        }
    }

    /// Duplicate rows share (account, date, amount to 2dp, currency, raw
    /// description) within the same statement
    fn check_duplicates(&self, statement: &Statement, issues: &mut Vec<VerificationIssue>) {
        let mut seen: HashMap<String, usize> = HashMap::new();

        for tx in &statement.transactions {
            let signature = format!(
                "{}|{}|{:.2}|{}|{}",
                tx.account_id, tx.posted, tx.amount, tx.currency, tx.original_description
            );
            *seen.entry(signature).or_insert(0) += 1;
        }

        for (signature, count) in seen {
            if count > 1 {
                issues.push(VerificationIssue::warning(
                    "duplicate_transaction",
                    format!("{} identical rows in statement: {}", count, signature),
                ));
            }
        }
    }
}

/// Any ERROR issue → Fail; no errors but at least one issue → Review;
/// no issues → Pass
fn derive_status(issues: &[VerificationIssue]) -> VerificationStatus {
    if issues.iter().any(|i| i.severity == IssueSeverity::Error) {
        VerificationStatus::Fail
    } else if !issues.is_empty() {
        VerificationStatus::Review
    } else {
        VerificationStatus::Pass
    }
}

// ============================================================================
// TESTS
// ============================================================================
