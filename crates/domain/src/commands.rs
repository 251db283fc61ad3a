//! Ledger commands, one per kind of movement.
//!
//! Each command carries the actor resolved by the caller and turns into a
//! single [`LedgerEvent`].

use chrono::{DateTime, Utc};
use common::{ActorId, EquipmentTypeId, SiteId};
use event_store::LedgerEvent;

/// Command to record stock purchased into a site.
#[derive(Debug, Clone)]
pub struct RecordAcquisition {
    pub site: SiteId,
    pub equipment_type: EquipmentTypeId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
    pub recorded_by: ActorId,
}

/// Command to record stock moved from one site to another.
#[derive(Debug, Clone)]
pub struct RecordTransfer {
    pub from_site: SiteId,
    pub to_site: SiteId,
    pub equipment_type: EquipmentTypeId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
    pub recorded_by: ActorId,
}

/// Command to record stock checked out to a person.
#[derive(Debug, Clone)]
pub struct RecordAllocation {
    pub site: SiteId,
    pub equipment_type: EquipmentTypeId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
    pub assigned_to: String,
    pub recorded_by: ActorId,
}

/// Command to record stock expended at a site.
#[derive(Debug, Clone)]
pub struct RecordConsumption {
    pub site: SiteId,
    pub equipment_type: EquipmentTypeId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
    pub expended_by: String,
    pub note: Option<String>,
    pub recorded_by: ActorId,
}

fn noted(event: LedgerEvent, note: Option<String>) -> LedgerEvent {
    match note {
        Some(note) if !note.trim().is_empty() => event.with_note(note),
        _ => event,
    }
}

impl From<RecordAcquisition> for LedgerEvent {
    fn from(cmd: RecordAcquisition) -> Self {
        noted(
            LedgerEvent::acquisition(
                cmd.site,
                cmd.equipment_type,
                cmd.quantity,
                cmd.occurred_at,
                cmd.recorded_by,
            ),
            cmd.note,
        )
    }
}

impl From<RecordTransfer> for LedgerEvent {
    fn from(cmd: RecordTransfer) -> Self {
        noted(
            LedgerEvent::transfer(
                cmd.from_site,
                cmd.to_site,
                cmd.equipment_type,
                cmd.quantity,
                cmd.occurred_at,
                cmd.recorded_by,
            ),
            cmd.note,
        )
    }
}

impl From<RecordAllocation> for LedgerEvent {
    fn from(cmd: RecordAllocation) -> Self {
        LedgerEvent::allocation(
            cmd.site,
            cmd.equipment_type,
            cmd.quantity,
            cmd.occurred_at,
            cmd.assigned_to.trim(),
            cmd.recorded_by,
        )
    }
}

impl From<RecordConsumption> for LedgerEvent {
    fn from(cmd: RecordConsumption) -> Self {
        noted(
            LedgerEvent::consumption(
                cmd.site,
                cmd.equipment_type,
                cmd.quantity,
                cmd.occurred_at,
                cmd.expended_by.trim(),
                cmd.recorded_by,
            ),
            cmd.note,
        )
    }
}
