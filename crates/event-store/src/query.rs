use chrono::{DateTime, Utc};
use common::{BalanceKey, EquipmentTypeId, SiteId};

use crate::{EventEnvelope, EventKind, ValidationError};

/// Builder for constructing event queries.
///
/// Allows filtering events by site, equipment type, kind, and occurrence time.
/// Results are always ordered by `occurred_at`, then commit sequence.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Filter by site. A transfer matches on either side.
    pub site: Option<SiteId>,

    /// Filter by equipment type.
    pub equipment_type: Option<EquipmentTypeId>,

    /// Filter by event kinds (any of these kinds).
    pub kinds: Option<Vec<EventKind>>,

    /// Events that occurred at or after this instant.
    pub from: Option<DateTime<Utc>>,

    /// Events that occurred at or before this instant.
    pub until: Option<DateTime<Utc>>,

    /// Events that occurred strictly before this instant.
    pub before: Option<DateTime<Utc>>,

    /// Maximum number of events to return.
    pub limit: Option<usize>,

    /// Number of events to skip.
    pub offset: Option<usize>,
}

impl EventQuery {
    /// Creates a new empty query matching every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for everything touching one balance key.
    pub fn for_key(key: BalanceKey) -> Self {
        Self {
            site: Some(key.site),
            equipment_type: Some(key.equipment_type),
            ..Default::default()
        }
    }

    /// Creates a query for events of a single kind.
    pub fn for_kind(kind: EventKind) -> Self {
        Self {
            kinds: Some(vec![kind]),
            ..Default::default()
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

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kinds = Some(vec![kind]);
        self
    }

    pub fn kinds(mut self, kinds: Vec<EventKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Filters to events at or after this instant (inclusive).
    pub fn from(mut self, instant: DateTime<Utc>) -> Self {
        self.from = Some(instant);
        self
    }

    /// Filters to events at or before this instant (inclusive).
    pub fn until(mut self, instant: DateTime<Utc>) -> Self {
        self.until = Some(instant);
        self
    }

    /// Filters to events strictly before this instant.
    pub fn before(mut self, instant: DateTime<Utc>) -> Self {
        self.before = Some(instant);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Checks that the page bounds fit a signed 64-bit SQL parameter.
    pub fn validate(&self) -> Result<(), ValidationError> {
        page_bound("limit", self.limit)?;
        page_bound("offset", self.offset)?;
        Ok(())
    }

    /// Limit as a SQL parameter.
    pub(crate) fn sql_limit(&self) -> Result<Option<i64>, ValidationError> {
        page_bound("limit", self.limit)
    }

    /// Offset as a SQL parameter.
    pub(crate) fn sql_offset(&self) -> Result<Option<i64>, ValidationError> {
        page_bound("offset", self.offset)
    }

    /// Whether an event passes every filter except limit/offset.
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        let event = &envelope.event;
        if let Some(site) = self.site
            && !event.touches_site(site)
        {
            return false;
        }
        if let Some(equipment_type) = self.equipment_type
            && event.equipment_type != equipment_type
        {
            return false;
        }
        if let Some(ref kinds) = self.kinds
            && !kinds.contains(&event.kind())
        {
            return false;
        }
        if let Some(from) = self.from
            && event.occurred_at < from
        {
            return false;
        }
        if let Some(until) = self.until
            && event.occurred_at > until
        {
            return false;
        }
        if let Some(before) = self.before
            && event.occurred_at >= before
        {
            return false;
        }
        true
    }
}

fn page_bound(field: &'static str, value: Option<usize>) -> Result<Option<i64>, ValidationError> {
    value
        .map(|v| i64::try_from(v).map_err(|_| ValidationError::PageOutOfRange { field, value: v }))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LedgerEvent, Sequence};
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn query_builder_chain() {
        let site = SiteId::new();
        let query = EventQuery::new()
            .site(site)
            .kind(EventKind::Transfer)
            .from(at(1))
            .until(at(5))
            .limit(100)
            .offset(0);

        assert_eq!(query.site, Some(site));
        assert_eq!(query.kinds, Some(vec![EventKind::Transfer]));
        assert_eq!(query.from, Some(at(1)));
        assert_eq!(query.until, Some(at(5)));
        assert_eq!(query.limit, Some(100));
        assert_eq!(query.offset, Some(0));
    }

    #[test]
    fn site_filter_matches_either_side_of_transfer() {
        let from = SiteId::new();
        let to = SiteId::new();
        let event = LedgerEvent::transfer(from, to, EquipmentTypeId::new(), 1, at(2), "a");
        let envelope = EventEnvelope::commit(event, Sequence::new(1));

        assert!(EventQuery::new().site(from).matches(&envelope));
        assert!(EventQuery::new().site(to).matches(&envelope));
        assert!(!EventQuery::new().site(SiteId::new()).matches(&envelope));
    }

    #[test]
    fn time_bounds_are_inclusive_except_before() {
        let event = LedgerEvent::acquisition(SiteId::new(), EquipmentTypeId::new(), 1, at(3), "a");
        let envelope = EventEnvelope::commit(event, Sequence::new(1));

        assert!(EventQuery::new().from(at(3)).matches(&envelope));
        assert!(EventQuery::new().until(at(3)).matches(&envelope));
        assert!(!EventQuery::new().before(at(3)).matches(&envelope));
        assert!(EventQuery::new().before(at(4)).matches(&envelope));
    }

    #[test]
    fn page_bounds_must_fit_i64() {
        assert_eq!(EventQuery::new().limit(50).offset(10).sql_limit(), Ok(Some(50)));
        assert!(EventQuery::new().validate().is_ok());

        let query = EventQuery::new().limit(usize::MAX);
        assert_eq!(
            query.validate(),
            Err(ValidationError::PageOutOfRange {
                field: "limit",
                value: usize::MAX
            })
        );
        assert!(EventQuery::new().offset(usize::MAX).sql_offset().is_err());
    }
}
