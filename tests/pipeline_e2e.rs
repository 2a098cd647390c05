// End-to-end ingestion scenarios through the public API.

use ledgerline::{
    AssistedRow, ExtractOptions, ExtractionAssist, IngestionPipeline, LedgerStore, MemoryStore,
    SqliteStore, VerificationStatus,
};
use std::sync::Arc;

const STATEMENT_TEXT: &str = "\
First National Bank
Checking Account
Account Number: 00123456
Statement Period: 01/01/2025 - 01/31/2025
Opening Balance: $1,500.00
01/05/2025  Payroll ACME Corp       $2,500.00
01/12/2025  Grocery Store           -$190.00
Closing Balance: $3,810.00
";

fn user_options() -> ExtractOptions {
    ExtractOptions {
        user_id: Some("user-a".to_string()),
        ..Default::default()
    }
}

#[test]
fn ingest_reconciles_and_persists_ledger() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = IngestionPipeline::new(store.clone());

    let outcome = pipeline
        .ingest_document(STATEMENT_TEXT.as_bytes(), &user_options())
        .unwrap();

    // 2500 - 190 = 2310 = 3810 - 1500: exact reconciliation passes
    assert_eq!(outcome.report.status, VerificationStatus::Pass);
    assert!(outcome.report.issues.is_empty());

    // Exactly 2 ledger entries, account balance 3810, one PASS report
    assert_eq!(store.transaction_count(), 2);
    assert_eq!(store.report_count(), 1);
    let account = store
        .get_account(&outcome.statement.account.id)
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, 3810.0);

    let reports = store
        .load_verification_reports(&outcome.statement.id)
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, VerificationStatus::Pass);
}

#[test]
fn reingestion_leaves_no_duplicates() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = IngestionPipeline::new(store.clone());

    pipeline
        .ingest_document(STATEMENT_TEXT.as_bytes(), &user_options())
        .unwrap();
    pipeline
        .ingest_document(STATEMENT_TEXT.as_bytes(), &user_options())
        .unwrap();

    assert_eq!(store.transaction_count(), 2);
}

/// An assist whose reply is unusable; the extractor must fall through to
/// pattern extraction without raising.
struct BrokenAssist;
impl ExtractionAssist for BrokenAssist {
    fn assisted_extract(&self, _window: &str) -> Option<Vec<AssistedRow>> {
        None
    }
}

#[test]
fn broken_assist_falls_back_to_pattern_extraction() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = IngestionPipeline::new(store.clone()).with_assist(Box::new(BrokenAssist));

    let outcome = pipeline
        .ingest_document(STATEMENT_TEXT.as_bytes(), &user_options())
        .unwrap();

    assert_eq!(outcome.statement.transactions.len(), 2);
    assert_eq!(
        outcome.statement.metadata["extracted_by_assist"],
        serde_json::json!(false)
    );
    assert!(outcome.statement.transactions.iter().all(|tx| tx
        .metadata
        .get("extracted_by_assist")
        .is_none()));
}

#[test]
fn duplicate_rows_are_flagged_but_ingestion_proceeds() {
    // Two identical rows; balances account for both, so only the duplicate
    // warning fires and the statement lands in Review
    let text = "\
Statement Period: 01/01/2025 - 01/31/2025
Opening Balance: $100.00
01/10/2025  Coffee Shop   -$40.00
01/10/2025  Coffee Shop   -$40.00
Closing Balance: $20.00
";

    let store = Arc::new(MemoryStore::new());
    let pipeline = IngestionPipeline::new(store.clone());

    let outcome = pipeline
        .ingest_document(text.as_bytes(), &user_options())
        .unwrap();

    assert_eq!(outcome.report.status, VerificationStatus::Review);
    assert!(outcome
        .report
        .issues
        .iter()
        .any(|i| i.code == "duplicate_transaction"));

    // The two rows share a dedupe hash, so the ledger holds one entry
    assert_eq!(store.transaction_count(), 1);
    assert_eq!(
        outcome.statement.verification_status,
        VerificationStatus::Review
    );
}

#[test]
fn delete_statement_cascades_through_store() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = IngestionPipeline::new(store.clone());

    let outcome = pipeline
        .ingest_document(STATEMENT_TEXT.as_bytes(), &user_options())
        .unwrap();

    assert!(store.delete_statement(&outcome.statement.id).unwrap());
    assert_eq!(store.transaction_count(), 0);
    assert!(store
        .get_account(&outcome.statement.account.id)
        .unwrap()
        .is_none());
    assert!(store.list_statements("user-a").unwrap().is_empty());
}

#[test]
fn sqlite_backed_pipeline_roundtrip() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let pipeline = IngestionPipeline::new(store.clone());

    let outcome = pipeline
        .ingest_document(STATEMENT_TEXT.as_bytes(), &user_options())
        .unwrap();
    assert_eq!(outcome.report.status, VerificationStatus::Pass);

    // Durable adapter honors the same contract as the reference store
    let loaded = store.load_statement(&outcome.statement.id).unwrap().unwrap();
    assert_eq!(loaded.transactions.len(), 2);
    assert_eq!(loaded.verification_status, VerificationStatus::Pass);

    let ledger = store
        .load_transactions(&outcome.statement.account.id, None, None)
        .unwrap();
    assert_eq!(ledger.len(), 2);

    assert!(store.delete_statement(&outcome.statement.id).unwrap());
    assert!(store
        .load_transactions(&outcome.statement.account.id, None, None)
        .unwrap()
        .is_empty());
}
