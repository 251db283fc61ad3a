//! Identity types shared by every layer of the inventory ledger.

mod types;

pub use types::{ActorId, BalanceKey, EquipmentTypeId, SiteId};
