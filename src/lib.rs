// Ledgerline - Statement Ingestion & Reconciliation Pipeline
// Exposes all modules for use by callers, adapters, and tests

pub mod aggregator;
pub mod categorize;
pub mod error;
pub mod extract;
pub mod fx;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod sqlite_store;
pub mod store;
pub mod verify;

// Re-export commonly used types
pub use aggregator::{
    map_account_type, BankAggregator, ExternalAccount, ExternalTransaction, StaticAggregator,
};
pub use categorize::{CategorizationInput, Categorizer, CategoryAssignment, CategoryRule};
pub use error::{PipelineError, Result};
pub use extract::{AssistedRow, ExtractOptions, ExtractionAssist, StatementExtractor};
pub use fx::{Conversion, CurrencyConverter, RateCache};
pub use model::{
    Account, AccountType, IssueSeverity, Statement, StatementSource, Transaction,
    TransactionType, VerificationIssue, VerificationReport, VerificationStatus,
};
pub use normalize::{dedupe_hash, normalize_description, HASH_VERSION};
pub use pipeline::{IngestOutcome, IngestionPipeline, SyncOutcome};
pub use sqlite_store::SqliteStore;
pub use store::{LedgerStore, MemoryStore, UpsertStats};
pub use verify::{IngestionVerifier, VerificationService, VerifyContext};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
