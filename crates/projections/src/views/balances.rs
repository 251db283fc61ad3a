//! Balance read model - per-key tail state kept in step with the ledger.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::BalanceKey;
use event_store::{EventEnvelope, Sequence, Version};
use tokio::sync::RwLock;

use crate::key_state::KeyState;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;
use crate::{ProjectionError, Result};

/// Cached state of one balance key after its latest event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachedBalance {
    pub state: KeyState,
    /// Number of events applied to this key; matches the store's key version.
    pub version: Version,
    /// Projection order key of the latest event applied.
    pub last_event: Option<(DateTime<Utc>, Sequence)>,
}

impl CachedBalance {
    /// Whether an event occurring at `occurred_at` lands after everything
    /// already applied, so the tail state can be checked directly.
    pub fn is_tail(&self, occurred_at: DateTime<Utc>) -> bool {
        self.last_event.is_none_or(|(latest, _)| occurred_at >= latest)
    }

    pub fn last_occurred_at(&self) -> Option<DateTime<Utc>> {
        self.last_event.map(|(at, _)| at)
    }
}

struct BalanceState {
    keys: HashMap<BalanceKey, CachedBalance>,
    position: ProjectionPosition,
}

/// Write-through cache of the current balance of every key.
///
/// Rebuilt from the full log on startup. Afterwards the write path feeds it
/// each committed event: in-order events through [`Projection::handle`],
/// back-dated ones through [`BalanceView::apply_replayed`] with the state the
/// caller recomputed from history.
#[derive(Clone)]
pub struct BalanceView {
    state: Arc<RwLock<BalanceState>>,
}

impl BalanceView {
    /// Creates a new empty balance view.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(BalanceState {
                keys: HashMap::new(),
                position: ProjectionPosition::zero(),
            })),
        }
    }

    /// Gets the cached balance of a key. Untouched keys are all zero.
    pub async fn get(&self, key: BalanceKey) -> CachedBalance {
        self.state
            .read()
            .await
            .keys
            .get(&key)
            .copied()
            .unwrap_or_default()
    }

    /// Overwrites a key, e.g. after reloading it from the store.
    pub async fn set(&self, key: BalanceKey, cached: CachedBalance) {
        self.state.write().await.keys.insert(key, cached);
    }

    /// Records a committed event whose keys were replayed by the caller.
    ///
    /// Used for back-dated events, where the tail state cannot be advanced
    /// by applying effects.
    pub async fn apply_replayed(&self, event: &EventEnvelope, replayed: &[(BalanceKey, KeyState)]) {
        let mut state = self.state.write().await;
        for (key, key_state) in replayed {
            let cached = state.keys.entry(*key).or_default();
            cached.state = *key_state;
            cached.version = cached.version.next();
            cached.last_event = cached.last_event.max(Some(event.order_key()));
        }
        state.position = state.position.advance(event.sequence);
    }
}

impl Default for BalanceView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for BalanceView {
    fn name(&self) -> &'static str {
        "BalanceView"
    }

    /// Applies an event at the tail of each key it touches.
    ///
    /// Fails without changing anything if the event sorts before the latest
    /// event already applied to one of its keys.
    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let order_key = event.order_key();
        let effects = event.event.effects();
        let equipment_type = event.event.equipment_type;

        let mut state = self.state.write().await;

        for (site, _) in &effects {
            let key = BalanceKey::new(*site, equipment_type);
            if let Some(cached) = state.keys.get(&key)
                && cached.last_event.is_some_and(|latest| latest > order_key)
            {
                return Err(ProjectionError::Projection(format!(
                    "event {} is out of order for {}",
                    event.event_id, key
                )));
            }
        }

        for (site, effect) in effects {
            let cached = state
                .keys
                .entry(BalanceKey::new(site, equipment_type))
                .or_default();
            cached.state.apply(effect);
            cached.version = cached.version.next();
            cached.last_event = Some(order_key);
        }
        state.position = state.position.advance(event.sequence);

        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.keys.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

#[async_trait]
impl ReadModel for BalanceView {
    fn name(&self) -> &'static str {
        "BalanceView"
    }

    async fn count(&self) -> usize {
        self.state.read().await.keys.len()
    }
}
