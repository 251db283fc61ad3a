//! Pure balance aggregation over ledger events.
//!
//! Nothing here touches the store or shared state. Callers pass the event
//! slice they care about and get the same answer for the same slice,
//! whatever order the events were committed in.

use chrono::{DateTime, Utc};
use common::{BalanceKey, EquipmentTypeId, SiteId};
use event_store::{Effect, EventEnvelope};
use serde::{Deserialize, Serialize};

use crate::key_state::KeyState;
use crate::{ProjectionError, Result};

/// Optional site and equipment-type restriction for a window.
///
/// An omitted filter aggregates every matching key independently; raw
/// quantities of different equipment types are summed as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowFilter {
    pub site: Option<SiteId>,
    pub equipment_type: Option<EquipmentTypeId>,
}

impl WindowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_key(key: BalanceKey) -> Self {
        Self {
            site: Some(key.site),
            equipment_type: Some(key.equipment_type),
        }
    }

    pub fn site(mut self, site: SiteId) -> Self {
        self.site = Some(site);
        self
    }

    pub fn equipment_type(mut self, equipment_type: EquipmentTypeId) -> Self {
        self.equipment_type = Some(equipment_type);
        self
    }

    /// Effects of an event that fall inside this filter.
    fn effects(&self, envelope: &EventEnvelope) -> Vec<Effect> {
        let event = &envelope.event;
        if self
            .equipment_type
            .is_some_and(|equipment_type| event.equipment_type != equipment_type)
        {
            return Vec::new();
        }
        event
            .effects()
            .into_iter()
            .filter(|(site, _)| self.site.is_none_or(|wanted| wanted == *site))
            .map(|(_, effect)| effect)
            .collect()
    }
}

/// In-window movement totals by direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    pub purchases: i64,
    pub transfer_in: i64,
    pub transfer_out: i64,
}

/// Opening and closing balances of a window plus what moved inside it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowProjection {
    /// Balance from events strictly before `start`.
    pub opening: i64,
    /// Balance from events at or before `end`.
    pub closing: i64,
    pub net_movement: i64,
    pub breakdown: Breakdown,
    /// Allocated quantity in the window. Not part of the balance.
    pub assigned: i64,
    pub expended: i64,
}

/// Custody balance of one key from every event at or before `as_of`.
///
/// Allocations are excluded. Summation is commutative, so input order does
/// not matter.
pub fn project_balance<'a, I>(
    events: I,
    site: SiteId,
    equipment_type: EquipmentTypeId,
    as_of: DateTime<Utc>,
) -> i64
where
    I: IntoIterator<Item = &'a EventEnvelope>,
{
    let filter = WindowFilter::new().site(site).equipment_type(equipment_type);
    events
        .into_iter()
        .filter(|envelope| envelope.occurred_at() <= as_of)
        .flat_map(|envelope| filter.effects(envelope))
        .map(|effect| effect.balance_delta())
        .fold(0, i64::saturating_add)
}

/// Balance and outstanding allocation of one key as of an instant.
///
/// Allocation drawdown depends on order, so events are replayed in
/// `(occurred_at, sequence)` order regardless of how they are passed in.
pub fn project_state<'a, I>(events: I, key: BalanceKey, as_of: DateTime<Utc>) -> KeyState
where
    I: IntoIterator<Item = &'a EventEnvelope>,
{
    let filter = WindowFilter::for_key(key);
    let mut relevant: Vec<&EventEnvelope> = events
        .into_iter()
        .filter(|envelope| envelope.occurred_at() <= as_of)
        .collect();
    relevant.sort_by_key(|envelope| envelope.order_key());

    relevant
        .into_iter()
        .flat_map(|envelope| filter.effects(envelope))
        .fold(KeyState::default(), KeyState::applied)
}

/// Projects opening, closing and in-window totals for `[start, end]`.
///
/// Opening counts events strictly before `start`; closing counts events at
/// or before `end`; the breakdown covers `start <= occurred_at <= end`.
/// An empty event set yields all zeros. Totals across many keys saturate
/// at `i64::MAX`.
pub fn project_window<'a, I>(
    events: I,
    filter: &WindowFilter,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<WindowProjection>
where
    I: IntoIterator<Item = &'a EventEnvelope>,
{
    if start > end {
        return Err(ProjectionError::InvalidRange { start, end });
    }

    let mut projection = WindowProjection::default();

    for envelope in events {
        let occurred_at = envelope.occurred_at();
        if occurred_at > end {
            continue;
        }
        let in_window = occurred_at >= start;

        for effect in filter.effects(envelope) {
            let delta = effect.balance_delta();
            projection.closing = projection.closing.saturating_add(delta);
            if !in_window {
                projection.opening = projection.opening.saturating_add(delta);
                continue;
            }
            let total = match effect {
                Effect::Purchase(_) => &mut projection.breakdown.purchases,
                Effect::TransferIn(_) => &mut projection.breakdown.transfer_in,
                Effect::TransferOut(_) => &mut projection.breakdown.transfer_out,
                Effect::Allocation(_) => &mut projection.assigned,
                Effect::Consumption(_) => &mut projection.expended,
            };
            *total = total.saturating_add(effect.quantity());
        }
    }

    projection.net_movement = projection.closing.saturating_sub(projection.opening);
    Ok(projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use event_store::{LedgerEvent, Sequence};

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    fn commit(events: Vec<LedgerEvent>) -> Vec<EventEnvelope> {
        events
            .into_iter()
            .enumerate()
            .map(|(i, event)| EventEnvelope::commit(event, Sequence::new(i as i64 + 1)))
            .collect()
    }

    #[test]
    fn empty_set_projects_zero() {
        let none: Vec<EventEnvelope> = Vec::new();
        let projection = project_window(&none, &WindowFilter::new(), t(1), t(2)).unwrap();
        assert_eq!(projection, WindowProjection::default());
        assert_eq!(
            project_balance(&none, SiteId::new(), EquipmentTypeId::new(), t(1)),
            0
        );
    }

    #[test]
    fn start_after_end_is_invalid() {
        let none: Vec<EventEnvelope> = Vec::new();
        let result = project_window(&none, &WindowFilter::new(), t(3), t(2));
        assert!(matches!(result, Err(ProjectionError::InvalidRange { .. })));
    }

    #[test]
    fn instant_window_includes_event_in_closing_only() {
        let site = SiteId::new();
        let rifle = EquipmentTypeId::new();
        let events = commit(vec![LedgerEvent::acquisition(site, rifle, 5, t(2), "qm")]);

        let projection = project_window(&events, &WindowFilter::new(), t(2), t(2)).unwrap();
        assert_eq!(projection.opening, 0);
        assert_eq!(projection.closing, 5);
        assert_eq!(projection.breakdown.purchases, 5);

        let projection = project_window(&events, &WindowFilter::new(), t(3), t(3)).unwrap();
        assert_eq!(projection.opening, 5);
        assert_eq!(projection.closing, 5);
        assert_eq!(projection.net_movement, 0);
    }

    #[test]
    fn balance_ignores_allocations_and_future_events() {
        let site = SiteId::new();
        let rifle = EquipmentTypeId::new();
        let events = commit(vec![
            LedgerEvent::acquisition(site, rifle, 10, t(1), "qm"),
            LedgerEvent::allocation(site, rifle, 3, t(2), "sgt. lee", "qm"),
            LedgerEvent::consumption(site, rifle, 2, t(4), "sgt. lee", "qm"),
        ]);

        assert_eq!(project_balance(&events, site, rifle, t(3)), 10);
        assert_eq!(project_balance(&events, site, rifle, t(4)), 8);
    }

    #[test]
    fn state_replays_in_occurrence_order() {
        let site = SiteId::new();
        let rifle = EquipmentTypeId::new();
        // Committed out of occurrence order
        let events = commit(vec![
            LedgerEvent::consumption(site, rifle, 2, t(4), "cpl. diaz", "qm"),
            LedgerEvent::allocation(site, rifle, 3, t(2), "cpl. diaz", "qm"),
            LedgerEvent::acquisition(site, rifle, 10, t(1), "qm"),
        ]);

        let key = BalanceKey::new(site, rifle);
        assert_eq!(project_state(&events, key, t(3)), KeyState::new(10, 3));
        assert_eq!(project_state(&events, key, t(5)), KeyState::new(8, 1));
    }

    #[test]
    fn unfiltered_window_counts_both_transfer_sides() {
        let a = SiteId::new();
        let b = SiteId::new();
        let rifle = EquipmentTypeId::new();
        let events = commit(vec![
            LedgerEvent::acquisition(a, rifle, 10, t(1), "qm"),
            LedgerEvent::transfer(a, b, rifle, 4, t(2), "qm"),
        ]);

        let projection = project_window(&events, &WindowFilter::new(), t(1), t(2)).unwrap();
        assert_eq!(projection.closing, 10);
        assert_eq!(projection.breakdown.transfer_in, 4);
        assert_eq!(projection.breakdown.transfer_out, 4);

        let only_b = project_window(&events, &WindowFilter::new().site(b), t(1), t(2)).unwrap();
        assert_eq!(only_b.closing, 4);
        assert_eq!(only_b.breakdown.transfer_out, 0);
    }

    #[test]
    fn totals_across_keys_saturate() {
        let (a, b, rifle) = (SiteId::new(), SiteId::new(), EquipmentTypeId::new());
        let events = commit(vec![
            LedgerEvent::acquisition(a, rifle, i64::MAX, t(1), "qm"),
            LedgerEvent::acquisition(b, rifle, i64::MAX, t(2), "qm"),
        ]);

        let projection = project_window(&events, &WindowFilter::new(), t(2), t(3)).unwrap();
        assert_eq!(projection.opening, i64::MAX);
        assert_eq!(projection.closing, i64::MAX);
        assert_eq!(projection.breakdown.purchases, i64::MAX);
        assert_eq!(projection.net_movement, 0);

        assert_eq!(project_balance(&events, a, rifle, t(3)), i64::MAX);
    }
}
