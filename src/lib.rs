pub mod config;
pub mod error;
pub mod events;
pub mod observability;
pub mod price_infra;
pub mod types;
pub mod utils;

pub use error::{Error, Result, SourceError};
pub use events::feed::{ConnectionState, FeedEvent};
pub use events::quote::{Quote, SourceTag};
pub use price_infra::service::PriceService;
pub use types::price::Price;
pub use types::symbol::Symbol;
