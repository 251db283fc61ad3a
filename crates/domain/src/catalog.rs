//! Reference data: sites and equipment types.
//!
//! The ledger only reads the catalog, to check that referenced ids exist
//! and to resolve display names.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use common::{EquipmentTypeId, SiteId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// A physical location holding inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
}

/// A category of trackable asset with its unit of measure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentType {
    pub id: EquipmentTypeId,
    pub name: String,
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    "units".to_string()
}

/// Errors raised while loading or editing the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("equipment type name already in use: {0}")]
    DuplicateName(String),

    #[error("name must not be empty")]
    EmptyName,

    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Site and equipment-type lookup.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn site(&self, id: SiteId) -> Option<Site>;

    async fn equipment_type(&self, id: EquipmentTypeId) -> Option<EquipmentType>;

    /// All sites, sorted by name.
    async fn sites(&self) -> Vec<Site>;

    /// All equipment types, sorted by name.
    async fn equipment_types(&self) -> Vec<EquipmentType>;
}

/// Catalog file layout: `{"sites": [...], "equipment_types": [...]}`.
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    sites: Vec<Site>,
    #[serde(default)]
    equipment_types: Vec<EquipmentType>,
}

#[derive(Default)]
struct Entries {
    sites: HashMap<SiteId, Site>,
    equipment_types: HashMap<EquipmentTypeId, EquipmentType>,
}

/// In-memory catalog, optionally seeded from a JSON file.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    entries: Arc<RwLock<Entries>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a catalog from JSON. Every entry must carry its id, since
    /// committed events refer to it. Missing units default to `units`.
    pub async fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let catalog = Self::new();
        for site in file.sites {
            catalog.insert_site(site).await?;
        }
        for equipment_type in file.equipment_types {
            catalog.insert_equipment_type(equipment_type).await?;
        }
        Ok(catalog)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json).await
    }

    pub async fn add_site(&self, name: impl Into<String>) -> Result<Site, CatalogError> {
        let site = Site {
            id: SiteId::new(),
            name: name.into(),
        };
        self.insert_site(site.clone()).await?;
        Ok(site)
    }

    /// Adds an equipment type. Names are unique, ignoring case.
    pub async fn add_equipment_type(
        &self,
        name: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<EquipmentType, CatalogError> {
        let equipment_type = EquipmentType {
            id: EquipmentTypeId::new(),
            name: name.into(),
            unit: unit.into(),
        };
        self.insert_equipment_type(equipment_type.clone()).await?;
        Ok(equipment_type)
    }

    async fn insert_site(&self, mut site: Site) -> Result<(), CatalogError> {
        site.name = site.name.trim().to_string();
        if site.name.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        self.entries.write().await.sites.insert(site.id, site);
        Ok(())
    }

    async fn insert_equipment_type(
        &self,
        mut equipment_type: EquipmentType,
    ) -> Result<(), CatalogError> {
        equipment_type.name = equipment_type.name.trim().to_string();
        if equipment_type.name.is_empty() {
            return Err(CatalogError::EmptyName);
        }

        let mut entries = self.entries.write().await;
        let taken = entries.equipment_types.values().any(|existing| {
            existing.id != equipment_type.id
                && existing.name.eq_ignore_ascii_case(&equipment_type.name)
        });
        if taken {
            return Err(CatalogError::DuplicateName(equipment_type.name));
        }
        entries
            .equipment_types
            .insert(equipment_type.id, equipment_type);
        Ok(())
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn site(&self, id: SiteId) -> Option<Site> {
        self.entries.read().await.sites.get(&id).cloned()
    }

    async fn equipment_type(&self, id: EquipmentTypeId) -> Option<EquipmentType> {
        self.entries.read().await.equipment_types.get(&id).cloned()
    }

    async fn sites(&self) -> Vec<Site> {
        let mut sites: Vec<_> = self.entries.read().await.sites.values().cloned().collect();
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        sites
    }

    async fn equipment_types(&self) -> Vec<EquipmentType> {
        let mut types: Vec<_> = self
            .entries
            .read()
            .await
            .equipment_types
            .values()
            .cloned()
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }
}
