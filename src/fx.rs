// 💱 Currency Converter - rate cache with pluggable sources
// Identity when currencies match; unknown pairs cache a 1.0 placeholder so
// repeated lookups for an unconfigured pair are stable. A production rate
// source seeds the cache; the core never fetches.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

// ============================================================================
// RATE CACHE
// ============================================================================

/// Injectable, mutex-guarded rate cache keyed by unordered currency pair.
/// Construct one per pipeline (or share across pipelines); tests get
/// isolated instances.
pub struct RateCache {
    rates: Mutex<HashMap<(String, String), f64>>,
}

impl RateCache {
    pub fn new() -> Self {
        RateCache {
            rates: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-seed several pair rates at once
    pub fn seed(pairs: &[(&str, &str, f64)]) -> Self {
        let cache = RateCache::new();
        for (from, to, rate) in pairs {
            cache.set_rate(from, to, *rate);
        }
        cache
    }

    /// Set the rate for a pair. The key is unordered: setting USD→EUR also
    /// answers EUR→USD lookups (with the same stored number, see
    /// `CurrencyConverter::convert`).
    pub fn set_rate(&self, from: &str, to: &str, rate: f64) {
        let key = pair_key(from, to);
        self.rates
            .lock()
            .expect("rate cache mutex poisoned")
            .insert(key, rate);
    }

    pub fn get_rate(&self, from: &str, to: &str) -> Option<f64> {
        let key = pair_key(from, to);
        self.rates
            .lock()
            .expect("rate cache mutex poisoned")
            .get(&key)
            .copied()
    }

    /// Rate for a pair, inserting the 1.0 placeholder if unconfigured.
    /// The placeholder is documented behavior: the reference converter
    /// defaults rather than fails for unknown pairs.
    fn rate_or_default(&self, from: &str, to: &str) -> f64 {
        let key = pair_key(from, to);
        *self
            .rates
            .lock()
            .expect("rate cache mutex poisoned")
            .entry(key)
            .or_insert(1.0)
    }

    pub fn len(&self) -> usize {
        self.rates.lock().expect("rate cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    let a = a.to_uppercase();
    let b = b.to_uppercase();
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// ============================================================================
// CONVERTER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub amount: f64,
    pub rate: f64,
}

pub struct CurrencyConverter {
    cache: RateCache,
}

impl CurrencyConverter {
    pub fn new(cache: RateCache) -> Self {
        CurrencyConverter { cache }
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    /// Convert an amount between currencies as of a date.
    ///
    /// `from == to` (case-insensitive) is the identity: rate 1.0, no cache
    /// mutation. Otherwise the cached pair rate applies; an unconfigured
    /// pair records a 1.0 placeholder first. The as-of date is carried for
    /// rate sources that key by day; the cache itself is date-agnostic.
    pub fn convert(&self, amount: f64, from: &str, to: &str, _as_of: NaiveDate) -> Conversion {
        if from.eq_ignore_ascii_case(to) {
            return Conversion { amount, rate: 1.0 };
        }

        let stored = self.cache.rate_or_default(from, to);

        // Stored rates are directional from the lexically smaller code;
        // invert for the opposite direction
        let (low, _) = pair_key(from, to);
        let rate = if from.to_uppercase() == low {
            stored
        } else if stored != 0.0 {
            1.0 / stored
        } else {
            1.0
        };

        Conversion {
            amount: amount * rate,
            rate,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
