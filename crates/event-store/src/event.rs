use chrono::{DateTime, Utc};
use common::{ActorId, BalanceKey, EquipmentTypeId, SiteId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ValidationError;

/// Unique identifier for a committed ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Commit sequence assigned by the store.
///
/// Strictly increasing across the whole log. Breaks ties between events
/// that share an `occurred_at`, so projection order is total and replayable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    /// Creates a sequence from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the next sequence.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw sequence value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-key version used for optimistic concurrency control.
///
/// Counts the committed events touching a (site, equipment type) key.
/// Starts at 0 for a key nothing has touched.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for an untouched key.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// The four kinds of ledger events, without their payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Acquisition,
    Transfer,
    Allocation,
    Consumption,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Acquisition,
        EventKind::Transfer,
        EventKind::Allocation,
        EventKind::Consumption,
    ];

    /// Stable name used for storage and filtering.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Acquisition => "acquisition",
            EventKind::Transfer => "transfer",
            EventKind::Allocation => "allocation",
            EventKind::Consumption => "consumption",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no event kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl std::str::FromStr for EventKind {
    type Err = UnknownEventKind;

    /// Accepts the kind names plus the route nouns used by the recording forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "acquisition" | "acquisitions" | "purchase" | "purchases" => Ok(EventKind::Acquisition),
            "transfer" | "transfers" => Ok(EventKind::Transfer),
            "allocation" | "allocations" | "assignment" | "assignments" => {
                Ok(EventKind::Allocation)
            }
            "consumption" | "consumptions" | "expenditure" | "expenditures" => {
                Ok(EventKind::Consumption)
            }
            _ => Err(UnknownEventKind(s.to_string())),
        }
    }
}

/// Kind-specific part of a ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Movement {
    /// Stock purchased into a site.
    Acquisition {
        site: SiteId,
        note: Option<String>,
    },

    /// Stock moved between two sites as one logical event.
    Transfer {
        from_site: SiteId,
        to_site: SiteId,
        note: Option<String>,
    },

    /// Stock at a site checked out to a person. Does not leave custody.
    Allocation { site: SiteId, assigned_to: String },

    /// Stock permanently expended at a site.
    Consumption {
        site: SiteId,
        expended_by: String,
        note: Option<String>,
    },
}

impl Movement {
    pub fn kind(&self) -> EventKind {
        match self {
            Movement::Acquisition { .. } => EventKind::Acquisition,
            Movement::Transfer { .. } => EventKind::Transfer,
            Movement::Allocation { .. } => EventKind::Allocation,
            Movement::Consumption { .. } => EventKind::Consumption,
        }
    }
}

/// The effect of an event on one site's balance for its equipment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Purchase(i64),
    TransferIn(i64),
    TransferOut(i64),
    Allocation(i64),
    Consumption(i64),
}

impl Effect {
    /// Signed change to the custody balance. Allocations do not change it.
    pub fn balance_delta(&self) -> i64 {
        match *self {
            Effect::Purchase(q) | Effect::TransferIn(q) => q,
            Effect::TransferOut(q) | Effect::Consumption(q) => -q,
            Effect::Allocation(_) => 0,
        }
    }

    pub fn quantity(&self) -> i64 {
        match *self {
            Effect::Purchase(q)
            | Effect::TransferIn(q)
            | Effect::TransferOut(q)
            | Effect::Allocation(q)
            | Effect::Consumption(q) => q,
        }
    }

    /// Whether the effect draws on stock that must already be there.
    pub fn is_debit(&self) -> bool {
        matches!(
            self,
            Effect::TransferOut(_) | Effect::Allocation(_) | Effect::Consumption(_)
        )
    }
}

/// A ledger event as submitted, before the store commits it.
///
/// Shared envelope fields plus the kind-specific [`Movement`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub equipment_type: EquipmentTypeId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
    pub recorded_by: ActorId,
    pub movement: Movement,
}

impl LedgerEvent {
    pub fn acquisition(
        site: SiteId,
        equipment_type: EquipmentTypeId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
        recorded_by: impl Into<ActorId>,
    ) -> Self {
        Self {
            equipment_type,
            quantity,
            occurred_at,
            recorded_by: recorded_by.into(),
            movement: Movement::Acquisition { site, note: None },
        }
    }

    pub fn transfer(
        from_site: SiteId,
        to_site: SiteId,
        equipment_type: EquipmentTypeId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
        recorded_by: impl Into<ActorId>,
    ) -> Self {
        Self {
            equipment_type,
            quantity,
            occurred_at,
            recorded_by: recorded_by.into(),
            movement: Movement::Transfer {
                from_site,
                to_site,
                note: None,
            },
        }
    }

    pub fn allocation(
        site: SiteId,
        equipment_type: EquipmentTypeId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
        assigned_to: impl Into<String>,
        recorded_by: impl Into<ActorId>,
    ) -> Self {
        Self {
            equipment_type,
            quantity,
            occurred_at,
            recorded_by: recorded_by.into(),
            movement: Movement::Allocation {
                site,
                assigned_to: assigned_to.into(),
            },
        }
    }

    pub fn consumption(
        site: SiteId,
        equipment_type: EquipmentTypeId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
        expended_by: impl Into<String>,
        recorded_by: impl Into<ActorId>,
    ) -> Self {
        Self {
            equipment_type,
            quantity,
            occurred_at,
            recorded_by: recorded_by.into(),
            movement: Movement::Consumption {
                site,
                expended_by: expended_by.into(),
                note: None,
            },
        }
    }

    /// Attaches a free-text note. Allocations carry no note and ignore it.
    pub fn with_note(mut self, text: impl Into<String>) -> Self {
        match &mut self.movement {
            Movement::Acquisition { note, .. }
            | Movement::Transfer { note, .. }
            | Movement::Consumption { note, .. } => *note = Some(text.into()),
            Movement::Allocation { .. } => {}
        }
        self
    }

    pub fn kind(&self) -> EventKind {
        self.movement.kind()
    }

    /// Checks the structural rules every stored event must satisfy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quantity <= 0 {
            return Err(ValidationError::NonPositiveQuantity(self.quantity));
        }
        match &self.movement {
            Movement::Transfer {
                from_site, to_site, ..
            } if from_site == to_site => Err(ValidationError::SelfTransfer),
            Movement::Allocation { assigned_to, .. } if assigned_to.trim().is_empty() => {
                Err(ValidationError::MissingField("assigned_to"))
            }
            Movement::Consumption { expended_by, .. } if expended_by.trim().is_empty() => {
                Err(ValidationError::MissingField("expended_by"))
            }
            _ => Ok(()),
        }
    }

    /// Per-site effects of this event. A transfer has two, every other kind one.
    pub fn effects(&self) -> Vec<(SiteId, Effect)> {
        let q = self.quantity;
        match &self.movement {
            Movement::Acquisition { site, .. } => vec![(*site, Effect::Purchase(q))],
            Movement::Transfer {
                from_site, to_site, ..
            } => vec![
                (*from_site, Effect::TransferOut(q)),
                (*to_site, Effect::TransferIn(q)),
            ],
            Movement::Allocation { site, .. } => vec![(*site, Effect::Allocation(q))],
            Movement::Consumption { site, .. } => vec![(*site, Effect::Consumption(q))],
        }
    }

    /// The effect on one site, if this event touches it.
    pub fn effect_at(&self, site: SiteId) -> Option<Effect> {
        self.effects()
            .into_iter()
            .find_map(|(s, effect)| (s == site).then_some(effect))
    }

    /// Sites this event touches, source first for transfers.
    pub fn sites(&self) -> Vec<SiteId> {
        self.effects().into_iter().map(|(site, _)| site).collect()
    }

    pub fn touches_site(&self, site: SiteId) -> bool {
        self.sites().contains(&site)
    }

    /// Balance keys this event touches.
    pub fn balance_keys(&self) -> Vec<BalanceKey> {
        self.sites()
            .into_iter()
            .map(|site| BalanceKey::new(site, self.equipment_type))
            .collect()
    }
}

/// A committed ledger event with the metadata the store assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// Commit sequence, used as the secondary ordering key.
    pub sequence: Sequence,

    /// When the store committed the event.
    pub recorded_at: DateTime<Utc>,

    /// The event itself.
    pub event: LedgerEvent,
}

impl EventEnvelope {
    /// Wraps a validated event with fresh commit metadata.
    pub fn commit(event: LedgerEvent, sequence: Sequence) -> Self {
        Self {
            event_id: EventId::new(),
            sequence,
            recorded_at: Utc::now(),
            event,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.event.occurred_at
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    /// Projection order: by `occurred_at`, then by commit sequence.
    pub fn order_key(&self) -> (DateTime<Utc>, Sequence) {
        (self.event.occurred_at, self.sequence)
    }
}

/// Parses a boundary timestamp into an instant.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ValidationError::InvalidTimestamp {
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn sequence_and_version_advance() {
        assert_eq!(Sequence::new(4).next(), Sequence::new(5));
        assert_eq!(Version::initial().next(), Version::new(1));
        assert!(Sequence::new(1) < Sequence::new(2));
    }

    #[test]
    fn event_kind_parses_route_nouns() {
        assert_eq!("purchases".parse::<EventKind>(), Ok(EventKind::Acquisition));
        assert_eq!("Assignments".parse::<EventKind>(), Ok(EventKind::Allocation));
        assert_eq!("expenditure".parse::<EventKind>(), Ok(EventKind::Consumption));
        assert_eq!("transfer".parse::<EventKind>(), Ok(EventKind::Transfer));
        assert!("returns".parse::<EventKind>().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_quantity() {
        let event = LedgerEvent::acquisition(SiteId::new(), EquipmentTypeId::new(), 0, t(1), "a");
        assert_eq!(
            event.validate(),
            Err(ValidationError::NonPositiveQuantity(0))
        );

        let event = LedgerEvent::acquisition(SiteId::new(), EquipmentTypeId::new(), -3, t(1), "a");
        assert_eq!(
            event.validate(),
            Err(ValidationError::NonPositiveQuantity(-3))
        );
    }

    #[test]
    fn validate_rejects_self_transfer() {
        let site = SiteId::new();
        let event = LedgerEvent::transfer(site, site, EquipmentTypeId::new(), 5, t(1), "a");
        assert_eq!(event.validate(), Err(ValidationError::SelfTransfer));
    }

    #[test]
    fn validate_rejects_blank_assignee() {
        let event =
            LedgerEvent::allocation(SiteId::new(), EquipmentTypeId::new(), 1, t(1), "  ", "a");
        assert_eq!(
            event.validate(),
            Err(ValidationError::MissingField("assigned_to"))
        );
    }

    #[test]
    fn transfer_has_two_effects() {
        let from = SiteId::new();
        let to = SiteId::new();
        let event = LedgerEvent::transfer(from, to, EquipmentTypeId::new(), 4, t(1), "a");

        assert_eq!(
            event.effects(),
            vec![(from, Effect::TransferOut(4)), (to, Effect::TransferIn(4))]
        );
        assert_eq!(event.effect_at(to), Some(Effect::TransferIn(4)));
        assert_eq!(event.effect_at(SiteId::new()), None);
        assert_eq!(event.balance_keys().len(), 2);
    }

    #[test]
    fn allocation_does_not_change_balance() {
        assert_eq!(Effect::Allocation(3).balance_delta(), 0);
        assert_eq!(Effect::Consumption(3).balance_delta(), -3);
        assert_eq!(Effect::Purchase(3).balance_delta(), 3);
        assert!(!Effect::TransferIn(3).is_debit());
    }

    #[test]
    fn with_note_sets_note_on_noted_kinds() {
        let event = LedgerEvent::acquisition(SiteId::new(), EquipmentTypeId::new(), 1, t(1), "a")
            .with_note("initial issue");
        assert!(matches!(
            event.movement,
            Movement::Acquisition { note: Some(ref n), .. } if n == "initial issue"
        ));
    }

    #[test]
    fn movement_serializes_with_type_tag() {
        let event = LedgerEvent::consumption(
            SiteId::new(),
            EquipmentTypeId::new(),
            2,
            t(1),
            "cpl. jones",
            "a",
        );
        let json = serde_json::to_value(&event.movement).unwrap();
        assert_eq!(json["type"], "Consumption");
        assert_eq!(json["data"]["expended_by"], "cpl. jones");
    }

    #[test]
    fn parse_instant_accepts_rfc3339_only() {
        assert_eq!(parse_instant("2024-03-01T05:00:00Z").unwrap(), t(5));
        assert_eq!(parse_instant("2024-03-01T07:00:00+02:00").unwrap(), t(5));
        assert!(matches!(
            parse_instant("yesterday"),
            Err(ValidationError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn envelope_order_key_breaks_ties_by_sequence() {
        let event = LedgerEvent::acquisition(SiteId::new(), EquipmentTypeId::new(), 1, t(1), "a");
        let first = EventEnvelope::commit(event.clone(), Sequence::new(1));
        let second = EventEnvelope::commit(event, Sequence::new(2));
        assert!(first.order_key() < second.order_key());
    }
}
