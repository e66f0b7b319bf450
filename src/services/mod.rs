// Product catalog
pub mod catalog;
