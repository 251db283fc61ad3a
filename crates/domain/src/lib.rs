//! Domain layer for the inventory ledger.
//!
//! This crate provides the write and read paths over the event store:
//! - [`ConsistencyGuard`] checks every movement against current balances
//!   under per-key locks before committing it
//! - [`QueryGateway`] answers dashboard, listing and balance queries
//! - [`LedgerService`] facade combining both over a shared balance cache
//! - [`Catalog`] lookup of sites and equipment types

pub mod catalog;
pub mod commands;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod locks;
pub mod service;

pub use catalog::{Catalog, CatalogError, EquipmentType, InMemoryCatalog, Site};
pub use commands::{RecordAcquisition, RecordAllocation, RecordConsumption, RecordTransfer};
pub use error::DomainError;
pub use gateway::{
    BalanceReport, Dashboard, DashboardBreakdown, DashboardFilters, DashboardMetrics,
    EquipmentTypeRef, EventListing, ListFilters, QueryGateway, SiteRef,
};
pub use guard::{CommitReceipt, ConsistencyGuard, DEFAULT_LOCK_TIMEOUT, SiteBalance};
pub use locks::{KeyGuards, KeyLocks};
pub use service::LedgerService;
