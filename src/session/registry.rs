//! Match Registry
//!
//! Maps match ids to live coordinators. Coordinators are created lazily on
//! first reference and dropped once their result has propagated. The map
//! lock is only held for lookup and creation, never for session logic.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::session::competitor::{Competitor, Seat};
use crate::session::coordinator::MatchCoordinator;
use crate::session::{Collaborators, SessionConfig, SessionError};
use crate::store::MatchId;

/// Concurrency-safe match id to coordinator map.
pub struct MatchRegistry {
    coordinators: RwLock<BTreeMap<MatchId, Arc<MatchCoordinator>>>,
    config: SessionConfig,
    deps: Collaborators,
    this: Weak<MatchRegistry>,
}

impl MatchRegistry {
    /// Create an empty registry.
    pub fn new(config: SessionConfig, deps: Collaborators) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            coordinators: RwLock::new(BTreeMap::new()),
            config,
            deps,
            this: this.clone(),
        })
    }

    /// Look up a live coordinator.
    pub async fn get(&self, id: MatchId) -> Option<Arc<MatchCoordinator>> {
        self.coordinators.read().await.get(&id).cloned()
    }

    /// Return the coordinator for `id`, creating it from the stored match
    /// record on first reference. Concurrent first references create it once.
    pub async fn get_or_create(&self, id: MatchId) -> Result<Arc<MatchCoordinator>, SessionError> {
        if let Some(existing) = self.get(id).await {
            return Ok(existing);
        }

        let mut coordinators = self.coordinators.write().await;
        if let Some(existing) = coordinators.get(&id) {
            return Ok(existing.clone());
        }

        let record = self
            .deps
            .store
            .load_match(id)
            .await?
            .ok_or(SessionError::UnknownMatch(id))?;

        let coordinator = MatchCoordinator::new(record, &self.config, self.deps.clone(), self.this.clone());
        coordinators.insert(id, coordinator.clone());
        info!(match_id = %id, room = %coordinator.room(), "coordinator created");

        Ok(coordinator)
    }

    /// Seat `competitor` in match `id`, opening the match if needed.
    pub async fn decide_seat(&self, id: MatchId, competitor: Competitor) -> Result<Seat, SessionError> {
        self.get_or_create(id).await?.decide_seat(competitor).await
    }

    /// Drop a coordinator. Returns it if it was registered.
    pub async fn remove(&self, id: MatchId) -> Option<Arc<MatchCoordinator>> {
        let removed = self.coordinators.write().await.remove(&id);
        if removed.is_some() {
            debug!(match_id = %id, "coordinator removed");
        }
        removed
    }

    /// Number of live coordinators.
    pub async fn len(&self) -> usize {
        self.coordinators.read().await.len()
    }

    /// Whether no coordinators are live.
    pub async fn is_empty(&self) -> bool {
        self.coordinators.read().await.is_empty()
    }

    /// Ids of live coordinators, ascending.
    pub async fn match_ids(&self) -> Vec<MatchId> {
        self.coordinators.read().await.keys().copied().collect()
    }
}
