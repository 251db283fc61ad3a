//! Append-only ledger event store.
//!
//! Holds the four kinds of inventory movement as immutable, time-ordered
//! events keyed by site and equipment type. Two backends share the
//! [`EventStore`] trait: [`InMemoryEventStore`] and [`PostgresEventStore`].

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::{ActorId, BalanceKey, EquipmentTypeId, SiteId};
pub use error::{EventStoreError, Result, ValidationError};
pub use event::{
    Effect, EventEnvelope, EventId, EventKind, LedgerEvent, Movement, Sequence, UnknownEventKind,
    Version, parse_instant,
};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use query::EventQuery;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
