//! Balance projection for the inventory ledger.
//!
//! This crate derives balances from ledger events:
//! - [`projector`] pure aggregation: point-in-time balance and window totals
//! - [`KeyState`] running balance/allocation of one key and checked replay
//! - [`Projection`] and [`ProjectionProcessor`] for feeding the log to read models
//! - [`BalanceView`] write-through cache of current per-key balances

pub mod error;
pub mod key_state;
pub mod processor;
pub mod projection;
pub mod projector;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use key_state::{KeyState, Rejection, Shortfall, replay_checked};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use projector::{
    Breakdown, WindowFilter, WindowProjection, project_balance, project_state, project_window,
};
pub use read_model::ReadModel;
pub use views::{BalanceView, CachedBalance};
