pub mod feed;
pub mod quote;
