// 🔁 Ingestion / Sync Orchestration
// Two entry flows over the same assembly path:
//   document ingestion: Extract → Verify (may abort) → categorize/convert →
//   persist; aggregator sync: fetch → map → categorize/convert → persist.
// Both are idempotent: identical source data re-derives identical dedupe
// hashes and overwrites in place.

use crate::aggregator::{map_account_type, BankAggregator};
use crate::categorize::{CategorizationInput, Categorizer};
use crate::error::{PipelineError, Result};
use crate::extract::{build_transaction, ExtractOptions, ExtractionAssist, StatementExtractor};
use crate::fx::CurrencyConverter;
use crate::model::{Account, Statement, Transaction, VerificationReport};
use crate::normalize::HASH_VERSION;
use crate::store::{LedgerStore, UpsertStats};
use crate::verify::{IngestionVerifier, VerificationService};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug)]
pub struct IngestOutcome {
    pub statement: Statement,
    pub report: VerificationReport,
    pub upserts: UpsertStats,
}

#[derive(Debug)]
pub struct SyncOutcome {
    pub accounts: Vec<Account>,
    pub upserts: UpsertStats,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct IngestionPipeline {
    extractor: StatementExtractor,
    verifier: IngestionVerifier,
    categorizer: Categorizer,
    converter: CurrencyConverter,
    aggregator: Option<Box<dyn BankAggregator>>,
    store: Arc<dyn LedgerStore>,

    /// When set, transaction amounts are converted into this currency at
    /// assembly time; the dedupe hash always covers the pre-conversion
    /// amount and currency
    pub base_currency: Option<String>,
}

impl IngestionPipeline {
    /// Pipeline with local-only collaborators: pattern extraction, fallback
    /// verification, built-in rules, empty rate cache
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        IngestionPipeline {
            extractor: StatementExtractor::new(None),
            verifier: IngestionVerifier::local_only(),
            categorizer: Categorizer::new(),
            converter: CurrencyConverter::new(Default::default()),
            aggregator: None,
            store,
            base_currency: None,
        }
    }

    pub fn with_assist(mut self, assist: Box<dyn ExtractionAssist>) -> Self {
        self.extractor = StatementExtractor::new(Some(assist));
        self
    }

    pub fn with_external_verifier(mut self, service: Box<dyn VerificationService>) -> Self {
        self.verifier = IngestionVerifier::with_external(service);
        self
    }

    pub fn with_categorizer(mut self, categorizer: Categorizer) -> Self {
        self.categorizer = categorizer;
        self
    }

    pub fn with_converter(mut self, converter: CurrencyConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_aggregator(mut self, aggregator: Box<dyn BankAggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn with_base_currency(mut self, currency: &str) -> Self {
        self.base_currency = Some(currency.to_uppercase());
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Document ingestion
    // ------------------------------------------------------------------------

    /// Ingest one statement document.
    ///
    /// The verification report is persisted unconditionally; ingestion
    /// aborts (and nothing else is persisted) only when the report is Fail
    /// with at least one ERROR issue. Review is non-fatal.
    pub fn ingest_document(&self, bytes: &[u8], options: &ExtractOptions) -> Result<IngestOutcome> {
        let mut statement = self.extractor.extract(bytes, options)?;

        let report = self.verifier.verify(&statement);
        self.store.save_verification_report(&report)?;

        if report.is_fatal() {
            return Err(PipelineError::Verification {
                codes: report.error_codes(),
                message: report.summary(),
            });
        }

        statement.verification_status = report.status;
        statement.transactions = self.finalize(statement.transactions);

        self.store.upsert_account(&statement.account)?;
        let upserts = self.store.bulk_upsert_transactions(&statement.transactions)?;
        self.store.save_statement(&statement)?;

        Ok(IngestOutcome {
            statement,
            report,
            upserts,
        })
    }

    // ------------------------------------------------------------------------
    // Aggregator sync
    // ------------------------------------------------------------------------

    /// Pull accounts and transactions from the configured aggregator for a
    /// date window. No verification stage: aggregator data is assumed
    /// pre-validated by the provider.
    pub fn sync_accounts(
        &self,
        access_token: &str,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SyncOutcome> {
        let aggregator = self.aggregator.as_ref().ok_or_else(|| {
            PipelineError::Validation("no aggregator configured for this pipeline".to_string())
        })?;

        let external_accounts = aggregator
            .fetch_accounts(access_token)
            .map_err(PipelineError::Storage)?;

        let mut accounts = Vec::with_capacity(external_accounts.len());
        let mut upserts = UpsertStats::default();

        for ext in external_accounts {
            // One logical account per (institution, external account id)
            let account_id = format!("{}-{}", ext.institution_id, ext.id);
            let mut metadata = std::collections::HashMap::new();
            metadata.insert("user_id".to_string(), serde_json::json!(user_id));
            metadata.insert("external_id".to_string(), serde_json::json!(ext.id));

            let account = Account {
                id: account_id.clone(),
                institution_id: ext.institution_id.clone(),
                display_name: ext.name.clone(),
                account_type: map_account_type(&ext.account_type),
                currency: ext.currency.to_uppercase(),
                balance: ext.balance,
                balance_as_of: Utc::now(),
                metadata,
            };
            self.store.upsert_account(&account)?;

            let feed = aggregator
                .fetch_transactions(access_token, &ext.id, start, end)
                .map_err(PipelineError::Storage)?;

            let transactions: Vec<Transaction> = feed
                .into_iter()
                .map(|row| {
                    build_transaction(
                        &account_id,
                        row.date,
                        &row.description,
                        row.amount,
                        None,
                        &row.currency,
                        "aggregator",
                    )
                })
                .collect();
            let transactions = self.finalize(transactions);

            let stats = self.store.bulk_upsert_transactions(&transactions)?;
            upserts.inserted += stats.inserted;
            upserts.replaced += stats.replaced;
            accounts.push(account);
        }

        Ok(SyncOutcome { accounts, upserts })
    }

    // ------------------------------------------------------------------------
    // Shared assembly
    // ------------------------------------------------------------------------

    /// Categorize (one batch call per statement/account), convert to the
    /// base currency, and stamp assembly metadata. Document order is
    /// preserved.
    fn finalize(&self, transactions: Vec<Transaction>) -> Vec<Transaction> {
        let inputs: Vec<CategorizationInput> = transactions
            .iter()
            .map(|tx| CategorizationInput {
                dedupe_hash: tx.dedupe_hash.clone(),
                description: tx.description.clone(),
                amount: tx.amount,
                currency: tx.currency.clone(),
            })
            .collect();
        let assignments = self.categorizer.categorize_batch(&inputs);

        transactions
            .into_iter()
            .map(|mut tx| {
                if let Some(assignment) = assignments.get(&tx.dedupe_hash) {
                    tx.category = Some(assignment.category.clone());
                    tx.subcategory = Some(assignment.subcategory.clone());
                    tx.metadata.insert(
                        "category_confidence".to_string(),
                        serde_json::json!(assignment.confidence),
                    );
                }

                if let Some(base) = &self.base_currency {
                    if !tx.currency.eq_ignore_ascii_case(base) {
                        let original_amount = tx.amount;
                        let original_currency = tx.currency.clone();
                        let conversion =
                            self.converter.convert(tx.amount, &tx.currency, base, tx.posted);

                        tx.amount = conversion.amount;
                        tx.currency = base.clone();
                        tx.metadata.insert(
                            "original_amount".to_string(),
                            serde_json::json!(original_amount),
                        );
                        tx.metadata.insert(
                            "original_currency".to_string(),
                            serde_json::json!(original_currency),
                        );
                        tx.metadata
                            .insert("fx_rate".to_string(), serde_json::json!(conversion.rate));
                    }
                }

                tx.metadata
                    .insert("hash_version".to_string(), serde_json::json!(HASH_VERSION));
                tx
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{ExternalAccount, ExternalTransaction, StaticAggregator};
    use crate::fx::RateCache;
    use crate::model::{AccountType, VerificationStatus};
    use crate::store::MemoryStore;

    const SAMPLE: &str = "\
First National Bank
Checking Account
Account Number: 00123456
Statement Period: 01/01/2025 - 01/31/2025
Opening Balance: $1,500.00
01/05/2025  Payroll ACME Corp       $2,500.00
01/12/2025  Grocery Store           -$190.00
Closing Balance: $3,810.00
";

    fn pipeline() -> (IngestionPipeline, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = IngestionPipeline::new(store.clone());
        (pipeline, store)
    }

    #[test]
    fn test_document_ingestion_end_to_end() {
        let (pipeline, store) = pipeline();
        let options = ExtractOptions {
            user_id: Some("user-a".to_string()),
            ..Default::default()
        };

        let outcome = pipeline.ingest_document(SAMPLE.as_bytes(), &options).unwrap();

        // sum = 2310 = 3810 - 1500: exact reconciliation
        assert_eq!(outcome.report.status, VerificationStatus::Pass);
        assert!(outcome.report.issues.is_empty());
        assert_eq!(outcome.statement.verification_status, VerificationStatus::Pass);

        // Two transactions, categorized and hash-stamped
        assert_eq!(outcome.upserts.inserted, 2);
        assert_eq!(store.transaction_count(), 2);
        let payroll = &outcome.statement.transactions[0];
        assert_eq!(payroll.category.as_deref(), Some("Income"));
        assert_eq!(payroll.metadata["hash_version"], serde_json::json!(1));
        let grocery = &outcome.statement.transactions[1];
        assert_eq!(grocery.category.as_deref(), Some("Food & Dining"));

        // Account balance is the closing balance, as of period end
        let account = store.get_account(&outcome.statement.account.id).unwrap().unwrap();
        assert_eq!(account.balance, 3810.0);
        assert_eq!(account.account_type, AccountType::Checking);

        // One PASS report persisted
        assert_eq!(store.report_count(), 1);
        let listed = store.list_statements("user-a").unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_reingestion_is_idempotent() {
        let (pipeline, store) = pipeline();
        let options = ExtractOptions::default();

        let first = pipeline.ingest_document(SAMPLE.as_bytes(), &options).unwrap();
        let second = pipeline.ingest_document(SAMPLE.as_bytes(), &options).unwrap();

        // Identical source data re-derives identical hashes: the second run
        // replaces rather than duplicates
        assert_eq!(first.upserts.inserted, 2);
        assert_eq!(second.upserts.replaced, 2);
        assert_eq!(second.upserts.inserted, 0);
        assert_eq!(store.transaction_count(), 2);

        let mut h1: Vec<_> = first
            .statement
            .transactions
            .iter()
            .map(|tx| tx.dedupe_hash.clone())
            .collect();
        let mut h2: Vec<_> = second
            .statement
            .transactions
            .iter()
            .map(|tx| tx.dedupe_hash.clone())
            .collect();
        h1.sort();
        h2.sort();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_fatal_verification_aborts_without_persisting_ledger() {
        let (pipeline, store) = pipeline();

        // Declared balances move 9999 but transactions sum to 2310
        let bad = SAMPLE.replace("$3,810.00", "$9,999.00");
        let err = pipeline
            .ingest_document(bad.as_bytes(), &ExtractOptions::default())
            .unwrap_err();

        match err {
            PipelineError::Verification { codes, .. } => {
                assert!(codes.contains(&"balance_mismatch".to_string()));
            }
            other => panic!("expected verification failure, got {other:?}"),
        }

        // The report is persisted; the statement/account/transactions are not
        assert_eq!(store.report_count(), 1);
        assert_eq!(store.transaction_count(), 0);
        assert!(store.list_statements("user-a").unwrap().is_empty());
    }

    #[test]
    fn test_base_currency_conversion_provenance() {
        let store = Arc::new(MemoryStore::new());
        let cache = RateCache::seed(&[("EUR", "USD", 1.10)]);
        let pipeline = IngestionPipeline::new(store)
            .with_converter(CurrencyConverter::new(cache))
            .with_base_currency("USD");

        let payload = serde_json::json!({
            "account_id": "acct-eu",
            "period_start": "2025-01-01",
            "period_end": "2025-01-31",
            "opening_balance": 0.0,
            "closing_balance": 100.0,
            "currency": "EUR",
            "transactions": [
                { "date": "2025-01-10", "description": "Consulting invoice", "amount": 100.0 }
            ]
        });

        let outcome = pipeline
            .ingest_document(b"ignored", &ExtractOptions::default().with_structured(payload))
            .unwrap();

        let tx = &outcome.statement.transactions[0];
        assert_eq!(tx.currency, "USD");
        assert!((tx.amount - 110.0).abs() < 1e-9);
        assert_eq!(tx.metadata["original_currency"], serde_json::json!("EUR"));
        assert_eq!(tx.metadata["original_amount"], serde_json::json!(100.0));
        assert_eq!(tx.metadata["fx_rate"], serde_json::json!(1.10));
    }

    #[test]
    fn test_aggregator_sync() {
        let store = Arc::new(MemoryStore::new());
        let feed = StaticAggregator {
            accounts: vec![ExternalAccount {
                id: "ext-9".to_string(),
                institution_id: "plaid-bank".to_string(),
                name: "Everyday Checking".to_string(),
                account_type: "depository".to_string(),
                currency: "usd".to_string(),
                balance: 812.44,
            }],
            transactions: vec![ExternalTransaction {
                account_id: "ext-9".to_string(),
                date: NaiveDate::from_ymd_opt(2025, 1, 8).unwrap(),
                description: "UBER TRIP 8812".to_string(),
                amount: -23.10,
                currency: "USD".to_string(),
            }],
        };
        let pipeline = IngestionPipeline::new(store.clone()).with_aggregator(Box::new(feed));

        let outcome = pipeline
            .sync_accounts(
                "token",
                "user-a",
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            )
            .unwrap();

        assert_eq!(outcome.accounts.len(), 1);
        let account = &outcome.accounts[0];
        assert_eq!(account.id, "plaid-bank-ext-9");
        assert_eq!(account.account_type, AccountType::Checking);
        assert_eq!(account.currency, "USD");

        assert_eq!(outcome.upserts.inserted, 1);
        let ledger = store.load_transactions("plaid-bank-ext-9", None, None).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].category.as_deref(), Some("Transport"));

        // Re-sync with the same window replaces in place
        let again = pipeline
            .sync_accounts(
                "token",
                "user-a",
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            )
            .unwrap();
        assert_eq!(again.upserts.replaced, 1);
        assert_eq!(store.transaction_count(), 1);
    }

    #[test]
    fn test_sync_without_aggregator_is_an_error() {
        let (pipeline, _) = pipeline();
        let err = pipeline
            .sync_accounts(
                "token",
                "user-a",
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}
