// 🏗️ Statement Extractor - raw bytes/text to structured statement
// Layered strategy: structured passthrough → text decode → header/period/
// balance inference → assisted window extraction → regex line templates.
// Partial fields take documented defaults; verification is the acceptance
// gate, not extraction.

use crate::error::{PipelineError, Result};
use crate::model::{
    Account, AccountType, Statement, StatementSource, Transaction, TransactionType,
    VerificationStatus,
};
use crate::normalize::{dedupe_hash, normalize_description};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// EXTRACTION ASSIST (external collaborator)
// ============================================================================

/// Row returned by an assisted extraction call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistedRow {
    pub date: String,
    pub description: String,
    pub amount: f64,
}

/// External text/structured extraction capability.
///
/// Implementations own their timeouts: a call that hangs or errors must
/// return `None` so the extractor can fall through to local handling. The
/// extractor never blocks on an unavailable assist.
pub trait ExtractionAssist: Send + Sync {
    /// Decode document bytes to plain text. `None` = cannot help.
    fn extract_text(&self, _bytes: &[u8]) -> Option<String> {
        None
    }

    /// Extract transaction rows from a bounded text window.
    /// `None` or a malformed reply falls back to pattern extraction.
    fn assisted_extract(&self, _window: &str) -> Option<Vec<AssistedRow>>;
}

// ============================================================================
// EXTRACT OPTIONS
// ============================================================================

/// Caller-supplied hints for one extraction call
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub account_id_hint: Option<String>,
    pub institution_hint: Option<String>,
    pub user_id: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ExtractOptions {
    /// Attach a fully structured statement payload, bypassing document
    /// parsing entirely (test/integration path)
    pub fn with_structured(mut self, payload: serde_json::Value) -> Self {
        self.metadata
            .insert("structured_statement".to_string(), payload);
        self
    }
}

// ============================================================================
// STRUCTURED PASSTHROUGH PAYLOAD
// ============================================================================

#[derive(Debug, Deserialize)]
struct StructuredPayload {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    institution_id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    account_type: Option<AccountType>,
    period_start: NaiveDate,
    period_end: NaiveDate,
    opening_balance: f64,
    closing_balance: f64,
    currency: String,
    transactions: Vec<StructuredRow>,
}

#[derive(Debug, Deserialize)]
struct StructuredRow {
    date: NaiveDate,
    description: String,
    amount: f64,
    #[serde(default)]
    transaction_type: Option<TransactionType>,
}

// ============================================================================
// LINE PATTERN TABLE
// ============================================================================

/// Ordered regex templates for a transaction line: first matching template
/// wins for a given line. Each captures `date`, `desc`, `amount`; an
/// optional trailing running balance is tolerated and ignored.
fn default_line_patterns() -> Vec<Regex> {
    let amount = r"\(?-?[$€£]?-?[\d,]+\.\d{2}\)?";
    let dates = [
        // slash date: 01/05/2025 or 1/5/25
        r"\d{1,2}/\d{1,2}/\d{2,4}",
        // ISO date: 2025-01-05
        r"\d{4}-\d{2}-\d{2}",
        // month-name date: Jan 5, 2025 / January 5 2025
        r"[A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4}",
    ];

    dates
        .iter()
        .map(|date| {
            let pattern = format!(
                r"^\s*(?P<date>{d})\s+(?P<desc>.+?)\s+(?P<amount>{a})(?:\s+{a})?\s*$",
                d = date,
                a = amount
            );
            Regex::new(&pattern).expect("line pattern must compile")
        })
        .collect()
}

/// Header-label fragments that disqualify a matched line's description
const DESCRIPTION_BLACKLIST: &[&str] = &[
    "balance",
    "statement",
    "account number",
    "page",
    "subtotal",
    "total for",
    "date description",
];

// ============================================================================
// STATEMENT EXTRACTOR
// ============================================================================

pub struct StatementExtractor {
    assist: Option<Box<dyn ExtractionAssist>>,

    /// Character budget for the assisted extraction window; bounds the cost
    /// of a single assist call
    pub assist_window_budget: usize,

    patterns: Vec<Regex>,
    account_number_re: Regex,
    currency_re: Regex,
    period_re: Regex,
    opening_balance_re: Regex,
    closing_balance_re: Regex,
    date_token_re: Regex,
}

impl StatementExtractor {
    pub fn new(assist: Option<Box<dyn ExtractionAssist>>) -> Self {
        StatementExtractor {
            assist,
            assist_window_budget: 6000,
            patterns: default_line_patterns(),
            account_number_re: Regex::new(
                r"(?i)account\s*(?:number|no\.?|#)\s*:?\s*([0-9*][0-9*-]{3,19})",
            )
            .expect("account number pattern must compile"),
            currency_re: Regex::new(r"\b(USD|EUR|GBP|CAD|AUD|JPY|CHF|MXN|INR|BRL)\b")
                .expect("currency pattern must compile"),
            period_re: Regex::new(
                r"(?i)(?:statement\s+period[:\s]*)?(\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{2}-\d{2})\s*(?:-|–|to|through)\s*(\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{2}-\d{2})",
            )
            .expect("period pattern must compile"),
            opening_balance_re: Regex::new(
                r"(?i)(?:opening|beginning|previous)\s+balance[^0-9$€£(-]*(\(?-?[$€£]?-?[\d,]+\.?\d*\)?)",
            )
            .expect("opening balance pattern must compile"),
            closing_balance_re: Regex::new(
                r"(?i)(?:closing|ending|new)\s+balance[^0-9$€£(-]*(\(?-?[$€£]?-?[\d,]+\.?\d*\)?)",
            )
            .expect("closing balance pattern must compile"),
            date_token_re: Regex::new(r"\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{2}-\d{2}")
                .expect("date token pattern must compile"),
        }
    }

    /// Extract a structured statement from raw content.
    ///
    /// Fatal only when the input is undecodable/empty or a structured
    /// passthrough payload fails schema validation; every other missing
    /// field takes a documented default.
    pub fn extract(&self, bytes: &[u8], options: &ExtractOptions) -> Result<Statement> {
        // Strategy (a): structured passthrough
        if let Some(payload) = options.metadata.get("structured_statement") {
            return self.from_structured(payload.clone(), options);
        }

        // Strategy (b): decode to text, preferring the external capability
        let text = self
            .assist
            .as_ref()
            .and_then(|a| a.extract_text(bytes))
            .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned());

        if text.trim().is_empty() {
            return Err(PipelineError::Extraction(
                "document is empty or could not be decoded to text".to_string(),
            ));
        }

        let now = Utc::now();

        // Strategies (c)-(e): header, period, balances
        let (account_id, account_type, institution, currency) = self.infer_header(&text, options, now);
        let (period_start, period_end) = self.infer_period(&text, now);
        let opening_balance = self.infer_balance(&text, &self.opening_balance_re).unwrap_or(0.0);
        let closing_balance = self.infer_balance(&text, &self.closing_balance_re).unwrap_or(0.0);

        // Strategy (f): transaction lines, assisted first, pattern fallback
        let mut extraction_method = "pattern";
        let mut rows = self.try_assisted(&text);
        if let Some(ref r) = rows {
            if r.is_empty() {
                rows = None;
            }
        }
        let rows = match rows {
            Some(r) => {
                extraction_method = "assisted";
                r
            }
            None => self.pattern_extract(&text),
        };

        let transactions: Vec<Transaction> = rows
            .into_iter()
            .map(|(posted, description, amount)| {
                build_transaction(
                    &account_id,
                    posted,
                    &description,
                    amount,
                    None,
                    &currency,
                    extraction_method,
                )
            })
            .collect();

        let account = Account {
            id: account_id,
            institution_id: institution,
            display_name: format!("{} account", account_type.name()),
            account_type,
            currency: currency.clone(),
            balance: closing_balance,
            balance_as_of: period_end
                .and_hms_opt(0, 0, 0)
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or(now),
            metadata: user_metadata(options),
        };

        let mut metadata = HashMap::new();
        metadata.insert(
            "extraction_method".to_string(),
            serde_json::json!(extraction_method),
        );
        metadata.insert(
            "extracted_by_assist".to_string(),
            serde_json::json!(extraction_method == "assisted"),
        );

        Ok(Statement {
            id: uuid::Uuid::new_v4().to_string(),
            account,
            period_start,
            period_end,
            opening_balance,
            closing_balance,
            currency,
            transactions,
            source: StatementSource::Document,
            ingested_at: now,
            verification_status: VerificationStatus::Pending,
            metadata,
        })
    }

    // ------------------------------------------------------------------------
    // Strategy (a): structured passthrough
    // ------------------------------------------------------------------------

    fn from_structured(
        &self,
        payload: serde_json::Value,
        options: &ExtractOptions,
    ) -> Result<Statement> {
        // Schema validation only; period/balance math is the verifier's call
        let payload: StructuredPayload = serde_json::from_value(payload)
            .map_err(|e| PipelineError::Validation(format!("structured payload: {}", e)))?;

        let now = Utc::now();
        let account_id = payload
            .account_id
            .or_else(|| options.account_id_hint.clone())
            .unwrap_or_else(|| format!("doc-{}", now.timestamp_millis()));
        let currency = payload.currency.to_uppercase();

        let transactions = payload
            .transactions
            .into_iter()
            .map(|row| {
                build_transaction(
                    &account_id,
                    row.date,
                    &row.description,
                    row.amount,
                    row.transaction_type,
                    &currency,
                    "passthrough",
                )
            })
            .collect();

        let account_type = payload.account_type.unwrap_or(AccountType::Checking);
        let account = Account {
            id: account_id,
            institution_id: payload
                .institution_id
                .or_else(|| options.institution_hint.clone())
                .unwrap_or_else(|| "unknown-bank".to_string()),
            display_name: payload
                .display_name
                .unwrap_or_else(|| format!("{} account", account_type.name())),
            account_type,
            currency: currency.clone(),
            balance: payload.closing_balance,
            balance_as_of: payload
                .period_end
                .and_hms_opt(0, 0, 0)
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or(now),
            metadata: user_metadata(options),
        };

        let mut metadata = HashMap::new();
        metadata.insert(
            "extraction_method".to_string(),
            serde_json::json!("passthrough"),
        );
        metadata.insert("extracted_by_assist".to_string(), serde_json::json!(false));

        Ok(Statement {
            id: uuid::Uuid::new_v4().to_string(),
            account,
            period_start: payload.period_start,
            period_end: payload.period_end,
            opening_balance: payload.opening_balance,
            closing_balance: payload.closing_balance,
            currency,
            transactions,
            source: StatementSource::Document,
            ingested_at: now,
            verification_status: VerificationStatus::Pending,
            metadata,
        })
    }

    // ------------------------------------------------------------------------
    // Strategy (c): header inference
    // ------------------------------------------------------------------------

    fn infer_header(
        &self,
        text: &str,
        options: &ExtractOptions,
        now: DateTime<Utc>,
    ) -> (String, AccountType, String, String) {
        let lower = text.to_lowercase();

        let account_id = options.account_id_hint.clone().or_else(|| {
            self.account_number_re
                .captures(text)
                .map(|c| format!("acct-{}", c[1].to_lowercase()))
        });
        let account_id = account_id.unwrap_or_else(|| format!("doc-{}", now.timestamp_millis()));

        let account_type = if lower.contains("savings") {
            AccountType::Savings
        } else if lower.contains("credit card") || lower.contains("credit account") {
            AccountType::Credit
        } else {
            // "checking" or no keyword at all
            AccountType::Checking
        };

        let institution = options
            .institution_hint
            .clone()
            .or_else(|| detect_institution(&lower))
            .unwrap_or_else(|| "unknown-bank".to_string());

        let currency = self
            .currency_re
            .captures(text)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "USD".to_string());

        (account_id, account_type, institution, currency)
    }

    // ------------------------------------------------------------------------
    // Strategy (d): period inference
    // ------------------------------------------------------------------------

    fn infer_period(&self, text: &str, now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
        if let Some(caps) = self.period_re.captures(text) {
            if let (Some(start), Some(end)) = (parse_date(&caps[1]), parse_date(&caps[2])) {
                return (start, end);
            }
        }

        // Default: the current calendar month
        let today = now.date_naive();
        let start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
            .unwrap_or(today);
        let end = last_day_of_month(today.year(), today.month()).unwrap_or(today);
        (start, end)
    }

    // ------------------------------------------------------------------------
    // Strategy (e): balance inference
    // ------------------------------------------------------------------------

    fn infer_balance(&self, text: &str, re: &Regex) -> Option<f64> {
        re.captures(text).and_then(|c| parse_amount(&c[1]))
    }

    // ------------------------------------------------------------------------
    // Strategy (f-i): assisted extraction over a bounded window
    // ------------------------------------------------------------------------

    fn try_assisted(&self, text: &str) -> Option<Vec<(NaiveDate, String, f64)>> {
        let assist = self.assist.as_ref()?;
        let window = self.locate_window(text);
        let rows = assist.assisted_extract(window)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            // Any unparseable row invalidates the whole assisted reply
            let date = parse_date(&row.date)?;
            if row.description.trim().is_empty() || row.amount == 0.0 || !row.amount.is_finite() {
                return None;
            }
            out.push((date, row.description.trim().to_string(), row.amount));
        }
        Some(out)
    }

    /// Trimmed window around the first date-like token, capped at the
    /// character budget
    fn locate_window<'a>(&self, text: &'a str) -> &'a str {
        let start = self
            .date_token_re
            .find(text)
            .map(|m| {
                // Back up to the start of that line
                text[..m.start()].rfind('\n').map(|p| p + 1).unwrap_or(0)
            })
            .unwrap_or(0);

        let slice = &text[start..];
        let mut end = slice.len().min(self.assist_window_budget);
        while end < slice.len() && !slice.is_char_boundary(end) {
            end += 1;
        }
        slice[..end].trim()
    }

    // ------------------------------------------------------------------------
    // Strategy (f-ii): per-line regex templates
    // ------------------------------------------------------------------------

    fn pattern_extract(&self, text: &str) -> Vec<(NaiveDate, String, f64)> {
        let mut rows = Vec::new();

        'line: for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            for pattern in &self.patterns {
                let caps = match pattern.captures(line) {
                    Some(c) => c,
                    None => continue,
                };

                let desc = caps["desc"].trim().to_string();
                let desc_lower = desc.to_lowercase();
                if desc.is_empty()
                    || DESCRIPTION_BLACKLIST.iter().any(|b| desc_lower.contains(b))
                {
                    continue 'line;
                }

                let date = match parse_date(&caps["date"]) {
                    Some(d) => d,
                    None => continue 'line,
                };
                let amount = match parse_amount(&caps["amount"]) {
                    Some(a) if a != 0.0 => a,
                    _ => continue 'line,
                };

                rows.push((date, desc, amount));
                continue 'line; // first matching template wins
            }
        }

        rows
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn user_metadata(options: &ExtractOptions) -> HashMap<String, serde_json::Value> {
    let mut metadata = HashMap::new();
    if let Some(user) = &options.user_id {
        metadata.insert("user_id".to_string(), serde_json::json!(user));
    }
    metadata
}

/// Assemble a canonical transaction from extracted fields. The dedupe hash
/// covers the extracted amount and currency; currency conversion later
/// rewrites the amount but never the hash.
pub(crate) fn build_transaction(
    account_id: &str,
    posted: NaiveDate,
    description: &str,
    amount: f64,
    explicit_type: Option<TransactionType>,
    currency: &str,
    extraction_method: &str,
) -> Transaction {
    let normalized = normalize_description(description);
    let hash = dedupe_hash(account_id, posted, amount, currency, &normalized);

    let mut metadata = HashMap::new();
    metadata.insert(
        "extraction_method".to_string(),
        serde_json::json!(extraction_method),
    );
    if extraction_method == "assisted" {
        metadata.insert("extracted_by_assist".to_string(), serde_json::json!(true));
    }

    Transaction {
        id: uuid::Uuid::new_v4().to_string(),
        account_id: account_id.to_string(),
        posted,
        description: description.to_string(),
        original_description: description.to_string(),
        amount,
        currency: currency.to_uppercase(),
        transaction_type: explicit_type.unwrap_or_else(|| TransactionType::from_amount(amount)),
        category: None,
        subcategory: None,
        normalized_description: normalized,
        dedupe_hash: hash,
        metadata,
    }
}

fn detect_institution(lower_text: &str) -> Option<String> {
    // Known institution name fragments, checked in order
    const FRAGMENTS: &[(&str, &str)] = &[
        ("bank of america", "bank-of-america"),
        ("wells fargo", "wells-fargo"),
        ("chase", "chase"),
        ("citibank", "citi"),
        ("citi", "citi"),
        ("capital one", "capital-one"),
        ("american express", "american-express"),
        ("discover", "discover"),
        ("us bank", "us-bank"),
        ("pnc", "pnc"),
        ("td bank", "td-bank"),
        ("ally", "ally"),
        ("charles schwab", "schwab"),
        ("fidelity", "fidelity"),
        ("scotiabank", "scotiabank"),
    ];

    FRAGMENTS
        .iter()
        .find(|(fragment, _)| lower_text.contains(fragment))
        .map(|(_, id)| id.to_string())
}

/// Parse a date in any of the tolerated formats
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim().replace(',', "");
    for format in ["%m/%d/%Y", "%m/%d/%y", "%Y-%m-%d", "%b %d %Y", "%B %d %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&s, format) {
            return Some(date);
        }
    }
    None
}

/// Parse a monetary amount: currency symbols and thousands separators are
/// stripped; parenthesized or minus-prefixed values are negative
pub(crate) fn parse_amount(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let negative_parens = trimmed.starts_with('(') && trimmed.ends_with(')');

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    if negative_parens && value > 0.0 {
        Some(-value)
    } else {
        Some(value)
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

// ============================================================================
// TESTS
// ============================================================================
