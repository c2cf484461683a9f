pub mod price;
pub mod symbol;
pub mod timestamp;
