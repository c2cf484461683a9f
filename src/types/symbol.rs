use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::Error;

const QUOTE_SUFFIXES: [&str; 4] = ["USDT", "USDC", "USD", "EUR"];

/// Canonical uppercase asset identifier, e.g. `BTC`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Trims and uppercases `raw`. Pair notation (`btc/usd`, `BTC-USDT`,
    /// `eth_usdc`) is reduced to its base asset.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let upper = raw.trim().to_uppercase();

        let base = match upper.split_once(['/', '-', '_']) {
            Some((base, quote)) if QUOTE_SUFFIXES.contains(&quote) => base.to_string(),
            Some(_) => return Err(Error::InvalidSymbol(raw.to_string())),
            None => upper,
        };

        if base.is_empty() || !base.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidSymbol(raw.to_string()));
        }

        Ok(Symbol(base))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Instrument id in `BASE{sep}QUOTE` form, e.g. `BTC_USDT`.
    pub fn pair(&self, separator: &str, quote: &str) -> String {
        format!("{}{}{}", self.0, separator, quote.to_uppercase())
    }
}

impl FromStr for Symbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
