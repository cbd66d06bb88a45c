pub mod base;
pub mod price;
