//! Read model views.

pub mod balances;

pub use balances::{BalanceView, CachedBalance};
