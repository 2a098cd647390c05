// 🏦 Bank Aggregator boundary - external account/transaction feeds
// The aggregator is a data source, not core logic: this module holds the
// feed types, the trait implementations must satisfy, and the institution
// type lookup used when mapping feeds to canonical accounts.

use crate::model::AccountType;
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// FEED TYPES
// ============================================================================

/// Account as reported by the aggregator, before canonical mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalAccount {
    pub id: String,
    pub institution_id: String,
    pub name: String,
    /// Raw institution type string, normalized via `map_account_type`
    pub account_type: String,
    pub currency: String,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalTransaction {
    pub account_id: String,
    pub date: NaiveDate,
    pub description: String,
    /// Signed: positive = credit/inflow
    pub amount: f64,
    pub currency: String,
}

// ============================================================================
// AGGREGATOR TRAIT
// ============================================================================

/// External bank-data provider.
///
/// Implementations own their transport, auth, and timeouts; fetch errors
/// surface as storage-style failures to the caller. Link-token and token
/// exchange flows live with the implementation, outside this crate.
pub trait BankAggregator: Send + Sync {
    fn fetch_accounts(&self, access_token: &str) -> Result<Vec<ExternalAccount>>;

    fn fetch_transactions(
        &self,
        access_token: &str,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExternalTransaction>>;
}

// ============================================================================
// INSTITUTION TYPE LOOKUP
// ============================================================================

/// Normalize an aggregator's account-type string. Fixed table; unknown
/// strings map to Other.
pub fn map_account_type(raw: &str) -> AccountType {
    match raw.trim().to_lowercase().as_str() {
        "depository" | "checking" | "cash management" => AccountType::Checking,
        "savings" | "money market" | "cd" => AccountType::Savings,
        "credit" | "credit card" => AccountType::Credit,
        "brokerage" | "investment" => AccountType::Brokerage,
        "retirement" | "ira" | "roth" | "401k" | "403b" => AccountType::Retirement,
        "loan" | "mortgage" | "student" | "auto" => AccountType::Loan,
        _ => AccountType::Other,
    }
}

// ============================================================================
// STATIC FEED (deterministic test/dev implementation)
// ============================================================================

/// Canned aggregator serving a fixed feed; the deterministic stand-in used
/// when no live provider is configured
#[derive(Default)]
pub struct StaticAggregator {
    pub accounts: Vec<ExternalAccount>,
    pub transactions: Vec<ExternalTransaction>,
}

impl BankAggregator for StaticAggregator {
    fn fetch_accounts(&self, _access_token: &str) -> Result<Vec<ExternalAccount>> {
        Ok(self.accounts.clone())
    }

    fn fetch_transactions(
        &self,
        _access_token: &str,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExternalTransaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|tx| tx.account_id == account_id && tx.date >= start && tx.date <= end)
            .cloned()
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_lookup() {
        assert_eq!(map_account_type("depository"), AccountType::Checking);
        assert_eq!(map_account_type("SAVINGS"), AccountType::Savings);
        assert_eq!(map_account_type("credit card"), AccountType::Credit);
        assert_eq!(map_account_type("401k"), AccountType::Retirement);
        assert_eq!(map_account_type("mortgage"), AccountType::Loan);
        assert_eq!(map_account_type("crypto-wallet"), AccountType::Other);
    }

    #[test]
    fn test_static_feed_windows() {
        let aggregator = StaticAggregator {
            accounts: vec![],
            transactions: vec![
                ExternalTransaction {
                    account_id: "ext-1".to_string(),
                    date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
                    description: "Coffee".to_string(),
                    amount: -4.5,
                    currency: "USD".to_string(),
                },
                ExternalTransaction {
                    account_id: "ext-1".to_string(),
                    date: NaiveDate::from_ymd_opt(2025, 2, 5).unwrap(),
                    description: "Coffee".to_string(),
                    amount: -4.5,
                    currency: "USD".to_string(),
                },
            ],
        };

        let january = aggregator
            .fetch_transactions(
                "token",
                "ext-1",
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            )
            .unwrap();
        assert_eq!(january.len(), 1);
    }
}
