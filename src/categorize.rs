// 🏷️ Categorizer - Rules as Data
// Ordered keyword rules over normalized descriptions; first match wins.
// Unmatched descriptions fall back to a sign/magnitude default - absence of
// a match is a category, not an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Rule ID for tracking
    pub id: String,

    /// Keywords matched case-insensitively against the description;
    /// any keyword hit fires the rule
    pub keywords: Vec<String>,

    pub category: String,
    pub subcategory: String,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
}

impl CategoryRule {
    fn new(id: &str, keywords: &[&str], category: &str, subcategory: &str) -> Self {
        CategoryRule {
            id: id.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            confidence: RULE_CONFIDENCE,
        }
    }

    pub fn matches(&self, description: &str) -> bool {
        let lower = description.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

/// Confidence for a keyword-rule hit
pub const RULE_CONFIDENCE: f64 = 0.75;

/// Debits with magnitude above this default to Bills & Utilities
pub const LARGE_DEBIT_THRESHOLD: f64 = 500.0;

// ============================================================================
// ASSIGNMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub category: String,
    pub subcategory: String,
    pub confidence: f64,
    /// Rule that fired, None for the sign/magnitude fallback
    pub rule_id: Option<String>,
}

/// One transaction's worth of categorization input
#[derive(Debug, Clone)]
pub struct CategorizationInput {
    pub dedupe_hash: String,
    pub description: String,
    pub amount: f64,
    pub currency: String,
}

// ============================================================================
// CATEGORIZER
// ============================================================================

pub struct Categorizer {
    rules: Vec<CategoryRule>,
}

impl Categorizer {
    /// Categorizer with the built-in rule table
    pub fn new() -> Self {
        Categorizer {
            rules: default_rules(),
        }
    }

    /// Categorizer with a custom ordered rule table
    pub fn from_rules(rules: Vec<CategoryRule>) -> Self {
        Categorizer { rules }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Categorize one description/amount pair. First matching rule wins;
    /// no match falls back to the sign/magnitude default.
    pub fn categorize(&self, description: &str, amount: f64) -> CategoryAssignment {
        for rule in &self.rules {
            if rule.matches(description) {
                return CategoryAssignment {
                    category: rule.category.clone(),
                    subcategory: rule.subcategory.clone(),
                    confidence: rule.confidence,
                    rule_id: Some(rule.id.clone()),
                };
            }
        }

        self.fallback(amount)
    }

    /// Batch API: one call per statement/account, keyed by dedupe hash
    pub fn categorize_batch(
        &self,
        inputs: &[CategorizationInput],
    ) -> HashMap<String, CategoryAssignment> {
        inputs
            .iter()
            .map(|input| {
                (
                    input.dedupe_hash.clone(),
                    self.categorize(&input.description, input.amount),
                )
            })
            .collect()
    }

    fn fallback(&self, amount: f64) -> CategoryAssignment {
        if amount >= 0.0 {
            CategoryAssignment {
                category: "Income".to_string(),
                subcategory: "Other Income".to_string(),
                confidence: 0.4,
                rule_id: None,
            }
        } else if amount.abs() > LARGE_DEBIT_THRESHOLD {
            CategoryAssignment {
                category: "Bills & Utilities".to_string(),
                subcategory: "Other Bills".to_string(),
                confidence: 0.35,
                rule_id: None,
            }
        } else {
            CategoryAssignment {
                category: "Shopping".to_string(),
                subcategory: "General Merchandise".to_string(),
                confidence: 0.35,
                rule_id: None,
            }
        }
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// DEFAULT RULE TABLE
// ============================================================================

/// Built-in ordered rule table. Income first so payroll descriptions that
/// also mention a merchant resolve as income.
fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "income",
            &[
                "payroll", "direct deposit", "salary", "paycheck", "dividend",
            ],
            "Income",
            "Salary",
        ),
        CategoryRule::new(
            "refund",
            &["refund", "reimbursement", "cashback", "cash back"],
            "Income",
            "Refunds",
        ),
        CategoryRule::new(
            "groceries",
            &[
                "grocery", "supermarket", "whole foods", "trader joe", "kroger",
                "safeway", "aldi", "heb",
            ],
            "Food & Dining",
            "Groceries",
        ),
        CategoryRule::new(
            "dining",
            &[
                "restaurant", "cafe", "coffee", "starbucks", "mcdonald", "chipotle",
                "doordash", "grubhub", "uber eats", "pizza",
            ],
            "Food & Dining",
            "Restaurants",
        ),
        CategoryRule::new(
            "transport",
            &[
                "uber", "lyft", "taxi", "metro", "transit", "parking", "gas station",
                "shell", "chevron", "exxon", "fuel",
            ],
            "Transport",
            "Ground Transport",
        ),
        CategoryRule::new(
            "housing",
            &["rent", "mortgage", "landlord", "lease", "hoa"],
            "Housing",
            "Rent & Mortgage",
        ),
        CategoryRule::new(
            "utilities",
            &[
                "electric", "water bill", "internet", "comcast", "verizon", "at&t",
                "t-mobile", "utility",
            ],
            "Bills & Utilities",
            "Utilities",
        ),
        CategoryRule::new(
            "entertainment",
            &[
                "netflix", "spotify", "hulu", "cinema", "theater", "steam", "playstation",
            ],
            "Entertainment",
            "Streaming & Media",
        ),
        CategoryRule::new(
            "travel",
            &[
                "airline", "airlines", "hotel", "airbnb", "delta air", "united air",
                "expedia", "booking.com",
            ],
            "Travel",
            "Flights & Lodging",
        ),
        CategoryRule::new(
            "investments",
            &[
                "vanguard", "fidelity", "schwab", "robinhood", "brokerage", "401k",
            ],
            "Investments",
            "Brokerage",
        ),
        CategoryRule::new(
            "cash",
            &["atm", "cash withdrawal", "cash deposit"],
            "Cash",
            "ATM",
        ),
        CategoryRule::new(
            "fees",
            &[
                "overdraft", "service fee", "monthly fee", "late fee", "interest charge",
            ],
            "Fees & Charges",
            "Bank Fees",
        ),
        CategoryRule::new(
            "insurance",
            &["insurance", "geico", "allstate", "premium"],
            "Insurance",
            "Premiums",
        ),
        CategoryRule::new(
            "education",
            &["tuition", "university", "college", "student loan", "coursera"],
            "Education",
            "Tuition & Courses",
        ),
        CategoryRule::new(
            "health",
            &["pharmacy", "cvs", "walgreens", "clinic", "dental", "hospital"],
            "Health",
            "Medical",
        ),
        CategoryRule::new(
            "shopping",
            &["amazon", "walmart", "target", "costco", "ebay", "best buy"],
            "Shopping",
            "General Merchandise",
        ),
    ]
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let categorizer = Categorizer::new();

        // "payroll" hits the income rule even though "store" could be retail
        let assignment = categorizer.categorize("payroll acme corp", 2500.0);
        assert_eq!(assignment.category, "Income");
        assert_eq!(assignment.confidence, RULE_CONFIDENCE);
        assert_eq!(assignment.rule_id, Some("income".to_string()));
    }

    #[test]
    fn test_keyword_rules() {
        let categorizer = Categorizer::new();

        assert_eq!(
            categorizer.categorize("grocery store", -190.0).category,
            "Food & Dining"
        );
        assert_eq!(
            categorizer.categorize("UBER TRIP 8842", -23.0).category,
            "Transport"
        );
        assert_eq!(
            categorizer.categorize("netflix.com", -15.99).category,
            "Entertainment"
        );
    }

    #[test]
    fn test_determinism() {
        let categorizer = Categorizer::new();
        let a = categorizer.categorize("starbucks 123 main st", -6.4);
        let b = categorizer.categorize("starbucks 123 main st", -6.4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_positive_is_income() {
        let categorizer = Categorizer::new();
        let assignment = categorizer.categorize("zzq unmatched wire", 120.0);

        assert_eq!(assignment.category, "Income");
        assert_eq!(assignment.subcategory, "Other Income");
        assert_eq!(assignment.confidence, 0.4);
        assert_eq!(assignment.rule_id, None);
    }

    #[test]
    fn test_fallback_by_magnitude() {
        let categorizer = Categorizer::new();

        let large = categorizer.categorize("zzq unmatched", -900.0);
        assert_eq!(large.category, "Bills & Utilities");
        assert_eq!(large.subcategory, "Other Bills");
        assert_eq!(large.confidence, 0.35);

        let small = categorizer.categorize("zzq unmatched", -40.0);
        assert_eq!(small.category, "Shopping");
        assert_eq!(small.subcategory, "General Merchandise");
        assert_eq!(small.confidence, 0.35);
    }

    #[test]
    fn test_batch_keyed_by_hash() {
        let categorizer = Categorizer::new();
        let inputs = vec![
            CategorizationInput {
                dedupe_hash: "h1".to_string(),
                description: "payroll acme corp".to_string(),
                amount: 2500.0,
                currency: "USD".to_string(),
            },
            CategorizationInput {
                dedupe_hash: "h2".to_string(),
                description: "grocery store".to_string(),
                amount: -190.0,
                currency: "USD".to_string(),
            },
        ];

        let assignments = categorizer.categorize_batch(&inputs);
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments["h1"].category, "Income");
        assert_eq!(assignments["h2"].category, "Food & Dining");
    }

    #[test]
    fn test_custom_rule_order_is_respected() {
        let rules = vec![
            CategoryRule::new("specific", &["amazon prime"], "Entertainment", "Streaming & Media"),
            CategoryRule::new("general", &["amazon"], "Shopping", "General Merchandise"),
        ];
        let categorizer = Categorizer::from_rules(rules);

        assert_eq!(
            categorizer.categorize("amazon prime video", -8.99).category,
            "Entertainment"
        );
        assert_eq!(
            categorizer.categorize("amazon marketplace", -30.0).category,
            "Shopping"
        );
    }
}
