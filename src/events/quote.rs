use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use crate::types::price::Price;
use crate::types::symbol::Symbol;
use crate::types::timestamp::Timestamp;

/// Where a quote came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTag {
    Primary,
    Secondary,
    StableFixed,
    StaleCache,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Primary => "primary",
            SourceTag::Secondary => "secondary",
            SourceTag::StableFixed => "stable-fixed",
            SourceTag::StaleCache => "stale-cache",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priced observation of one asset. Never mutated after creation; use
/// `with_source` to derive a re-tagged copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: Price,
    pub change_24h: Option<f64>,  // signed percentage
    pub volume_24h: Option<f64>,
    pub high_24h: Option<Price>,
    pub low_24h: Option<Price>,
    pub observed_at: Timestamp,
    pub source: SourceTag,
}

impl Quote {
    pub fn new(symbol: Symbol, price: Price, source: SourceTag) -> Self {
        Quote {
            symbol,
            price,
            change_24h: None,
            volume_24h: None,
            high_24h: None,
            low_24h: None,
            observed_at: Timestamp::now(),
            source,
        }
    }

    /// Synthesized quote for a fixed-price asset.
    pub fn stable(symbol: Symbol, price: Price) -> Self {
        Quote {
            change_24h: Some(0.0),
            ..Quote::new(symbol, price, SourceTag::StableFixed)
        }
    }

    pub fn with_source(&self, source: SourceTag) -> Self {
        Quote {
            source,
            ..self.clone()
        }
    }

    pub fn age(&self) -> Duration {
        self.observed_at.elapsed()
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.symbol, self.price, self.source)?;
        if let Some(change) = self.change_24h {
            write!(f, " {:+.2}%", change)?;
        }
        Ok(())
    }
}
