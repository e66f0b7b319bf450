pub mod common;
pub mod health;
pub mod products;

pub use crate::AppState;
