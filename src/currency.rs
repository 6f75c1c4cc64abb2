// Currency rates, conversion and display
// Every rate is "units per 1 NGN"; conversions always go through NGN.

use crate::api::{ApiClient, ApiError};
use crate::container::{Mutable, Resource, ValidationError};
use crate::storage::{KeyValueStore, StorageError, PREFERRED_CURRENCY_KEY};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const BASE_CURRENCY: &str = "NGN";

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub id: u64,
    pub code: String,
    pub name: String,
    pub symbol: String,
    pub rate: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Currency {
    pub fn is_base(&self) -> bool {
        self.code.eq_ignore_ascii_case(BASE_CURRENCY)
    }
}

// Result of a conversion that also reports codes it had to guess for
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub amount: f64,
    pub unknown: Vec<String>,
}

impl Conversion {
    pub fn is_exact(&self) -> bool {
        self.unknown.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RateTable {
    rates: HashMap<String, f64>,
}

impl RateTable {
    pub fn new() -> Self {
        let mut rates = HashMap::new();
        rates.insert(BASE_CURRENCY.to_string(), 1.0);
        Self { rates }
    }

    // Built from the server currency table; inactive and nonsensical rates are skipped
    pub fn from_currencies(currencies: &[Currency]) -> Self {
        let mut table = Self::new();
        for currency in currencies.iter().filter(|c| c.active && !c.is_base()) {
            if currency.rate.is_finite() && currency.rate > 0.0 {
                table.rates.insert(currency.code.to_uppercase(), currency.rate);
            } else {
                tracing::warn!(
                    code = %currency.code,
                    rate = currency.rate,
                    "ignoring invalid currency rate"
                );
            }
        }
        table
    }

    /// Last-resort rates for when the server table could not be loaded.
    /// Not a source of truth: anything loaded from the API replaces it wholesale.
    pub fn fallback() -> Self {
        Self::new()
            .with_rate("USD", 0.00065)
            .with_rate("EUR", 0.0006)
            .with_rate("GBP", 0.00051)
            .with_rate("GHS", 0.0078)
            .with_rate("KES", 0.084)
            .with_rate("ZAR", 0.012)
    }

    // The base rate stays pinned at 1
    pub fn with_rate(mut self, code: &str, rate: f64) -> Self {
        let code = code.to_uppercase();
        if code != BASE_CURRENCY {
            self.rates.insert(code, rate);
        }
        self
    }

    pub fn rate(&self, code: &str) -> Option<f64> {
        self.rates.get(&code.to_uppercase()).copied()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rate(code).is_some()
    }

    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.rates.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn convert_checked(&self, amount: f64, from: &str, to: &str) -> Conversion {
        if from.eq_ignore_ascii_case(to) {
            return Conversion {
                amount,
                unknown: Vec::new(),
            };
        }

        let mut unknown = Vec::new();
        let mut lookup = |code: &str| {
            self.rate(code).unwrap_or_else(|| {
                unknown.push(code.to_string());
                1.0
            })
        };
        let from_rate = lookup(from);
        let to_rate = lookup(to);

        if !unknown.is_empty() {
            tracing::warn!(?unknown, from, to, "unknown currency, converting at rate 1");
        }

        Conversion {
            amount: amount / from_rate * to_rate,
            unknown,
        }
    }
}

// Two-hop conversion: from -> NGN -> to. Unknown codes convert at rate 1.
pub fn convert(amount: f64, from: &str, to: &str, rates: &RateTable) -> f64 {
    rates.convert_checked(amount, from, to).amount
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, String>,
}

impl SymbolTable {
    pub fn from_currencies(currencies: &[Currency]) -> Self {
        Self {
            symbols: currencies
                .iter()
                .map(|c| (c.code.to_uppercase(), c.symbol.clone()))
                .collect(),
        }
    }

    // Last-resort symbols, same caveat as RateTable::fallback
    pub fn fallback() -> Self {
        let symbols = [
            ("NGN", "₦"),
            ("USD", "$"),
            ("EUR", "€"),
            ("GBP", "£"),
            ("GHS", "₵"),
            ("KES", "KSh"),
            ("ZAR", "R"),
        ]
        .into_iter()
        .map(|(code, symbol)| (code.to_string(), symbol.to_string()))
        .collect();
        Self { symbols }
    }

    pub fn symbol(&self, code: &str) -> Option<&str> {
        self.symbols.get(&code.to_uppercase()).map(String::as_str)
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

// symbol + grouped amount with at most two fraction digits and no zero padding.
// Unknown codes use the code itself as the symbol.
pub fn format(amount: f64, currency: &str, symbols: &SymbolTable) -> String {
    let symbol = symbols.symbol(currency).unwrap_or(currency);
    if !amount.is_finite() {
        return format!("{}{}", symbol, amount);
    }

    let fixed = format!("{:.2}", amount.abs());
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let fraction = fraction.trim_end_matches('0');
    let negative = amount < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0');

    let mut rendered = String::new();
    if negative {
        rendered.push('-');
    }
    rendered.push_str(symbol);
    rendered.push_str(&group_thousands(integer));
    if !fraction.is_empty() {
        rendered.push('.');
        rendered.push_str(fraction);
    }
    rendered
}

// Static locale -> currency lookup, keyed on the region part of a tag like "en-NG"
pub fn locale_currency(locale: &str) -> Option<&'static str> {
    let region = locale
        .split(|c| c == '-' || c == '_')
        .nth(1)?
        .split('.')
        .next()?
        .to_uppercase();

    let code = match region.as_str() {
        "NG" => "NGN",
        "US" => "USD",
        "GB" => "GBP",
        "GH" => "GHS",
        "KE" => "KES",
        "ZA" => "ZAR",
        "DE" | "FR" | "ES" | "IT" | "NL" | "IE" | "PT" | "BE" | "AT" | "FI" | "GR" => "EUR",
        _ => return None,
    };
    Some(code)
}

// Admin currency table at /admin/currencies
#[derive(Debug, Clone, Default)]
pub struct CurrencyResource;

#[async_trait]
impl Resource for CurrencyResource {
    type State = Vec<Currency>;

    fn label(&self) -> &str {
        "Currencies"
    }

    async fn fetch(&self, api: &ApiClient) -> Result<Vec<Currency>, ApiError> {
        api.get("/admin/currencies").await
    }
}

#[async_trait]
impl Mutable for CurrencyResource {
    // Whole-record replacement of one currency
    type Draft = Currency;

    fn validate(&self, current: &Vec<Currency>, draft: &Currency) -> Result<(), ValidationError> {
        let existing = current
            .iter()
            .find(|c| c.id == draft.id)
            .ok_or_else(|| {
                ValidationError::new("id", format!("currency {} is not loaded", draft.id))
            })?;

        if existing.is_base() || draft.is_base() {
            if draft.rate != 1.0 || !draft.code.eq_ignore_ascii_case(&existing.code) {
                return Err(ValidationError::new(
                    "rate",
                    format!("{} is the base currency and its rate is fixed at 1", BASE_CURRENCY),
                ));
            }
            if !draft.active {
                return Err(ValidationError::new("active", "the base currency cannot be disabled"));
            }
        }
        if !(draft.rate.is_finite() && draft.rate > 0.0) {
            return Err(ValidationError::new("rate", "must be a positive number"));
        }
        if draft.symbol.trim().is_empty() {
            return Err(ValidationError::required("symbol"));
        }
        Ok(())
    }

    async fn submit(
        &self,
        api: &ApiClient,
        current: &Vec<Currency>,
        draft: &Currency,
    ) -> Result<Vec<Currency>, ApiError> {
        let saved: Currency = api.put(&format!("/admin/currencies/{}", draft.id), draft).await?;
        Ok(current
            .iter()
            .map(|c| if c.id == saved.id { saved.clone() } else { c.clone() })
            .collect())
    }
}

// Preferred display currency, persisted across reloads
#[derive(Clone)]
pub struct CurrencyPreference {
    store: Arc<dyn KeyValueStore>,
    locale: Option<String>,
}

impl CurrencyPreference {
    pub fn new(store: Arc<dyn KeyValueStore>, locale: Option<String>) -> Self {
        Self { store, locale }
    }

    // Stored choice, else the locale's currency, else NGN
    pub fn preferred(&self) -> String {
        self.store
            .get(PREFERRED_CURRENCY_KEY)
            .filter(|code| !code.trim().is_empty())
            .or_else(|| {
                self.locale
                    .as_deref()
                    .and_then(locale_currency)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| BASE_CURRENCY.to_string())
    }

    pub fn set_preferred(&self, code: &str) -> Result<(), StorageError> {
        self.store.set(PREFERRED_CURRENCY_KEY, &code.to_uppercase())
    }

    pub fn reset(&self) -> Result<(), StorageError> {
        self.store.remove(PREFERRED_CURRENCY_KEY)
    }
}

// Everything a view needs to show prices in the user's currency
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyDisplay {
    pub rates: RateTable,
    pub symbols: SymbolTable,
    pub target: String,
}

impl CurrencyDisplay {
    // An empty server table means nothing loaded yet; fall back to the defaults
    pub fn new(currencies: &[Currency], target: impl Into<String>) -> Self {
        if currencies.is_empty() {
            return Self {
                rates: RateTable::fallback(),
                symbols: SymbolTable::fallback(),
                target: target.into(),
            };
        }
        Self {
            rates: RateTable::from_currencies(currencies),
            symbols: SymbolTable::from_currencies(currencies),
            target: target.into(),
        }
    }

    pub fn display(&self, amount: f64, from: &str) -> String {
        let converted = convert(amount, from, &self.target, &self.rates);
        format(converted, &self.target, &self.symbols)
    }
}
