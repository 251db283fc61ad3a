use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a site holding inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(Uuid);

impl SiteId {
    /// Creates a new random site ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a site ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SiteId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SiteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for SiteId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SiteId> for Uuid {
    fn from(id: SiteId) -> Self {
        id.0
    }
}

/// Unique identifier for an equipment type (a category with its own unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquipmentTypeId(Uuid);

impl EquipmentTypeId {
    /// Creates a new random equipment type ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an equipment type ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EquipmentTypeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EquipmentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EquipmentTypeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for EquipmentTypeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EquipmentTypeId> for Uuid {
    fn from(id: EquipmentTypeId) -> Self {
        id.0
    }
}

/// The authenticated principal that recorded a ledger event.
///
/// Supplied by the identity resolver outside the ledger; treated as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Creates an actor ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the actor ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The unit of balance tracking and mutual exclusion: one equipment type at one site.
///
/// Ordering is by site first, then equipment type. Writers touching several
/// keys acquire them in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BalanceKey {
    pub site: SiteId,
    pub equipment_type: EquipmentTypeId,
}

impl BalanceKey {
    pub fn new(site: SiteId, equipment_type: EquipmentTypeId) -> Self {
        Self {
            site,
            equipment_type,
        }
    }
}

impl std::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.site, self.equipment_type)
    }
}
