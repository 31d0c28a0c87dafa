//! In-memory sync backend.
//!
//! This is the reference implementation of `RemoteSync`. It keeps the
//! bookkeeping a real backend keeps (per-node parents, details and the
//! winning input) in HashMaps behind `parking_lot` locks, and resolves
//! competitions with a per-input score instead of calling models.
//!
//! ## Limitations
//!
//! - **No models**: details are synthetic strings; the winner of a pairing
//!   is the parent whose winning input has the higher score (ties go left).
//! - **Single session**: one `MemorySync` serves one session at a time.
//!
//! Use this backend for:
//! - Testing the session driver end to end
//! - Failure injection (`fail_next`) to exercise retry paths
//! - Embedding when no remote processors are available

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::model::{EntityId, display_label, processor_kind};
use crate::{Error, Result};
use super::*;

const DEFAULT_KIND: &str = "Processor";

/// One journaled call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncCall {
    pub op: SyncOp,
    pub at: DateTime<Utc>,
    pub ok: bool,
}

// ============================================================================
// MemorySync
// ============================================================================

/// In-memory reference backend. Clones share state.
#[derive(Clone, Default)]
pub struct MemorySync {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    /// Inputs in allocation order.
    inputs: RwLock<Vec<EntityId>>,
    details: RwLock<HashMap<EntityId, String>>,
    /// node → the nodes it was recorded from
    parents: RwLock<HashMap<EntityId, Vec<EntityId>>>,
    /// node → input that won up to it
    winners: RwLock<HashMap<EntityId, EntityId>>,
    scores: RwLock<HashMap<EntityId, i64>>,
    neighborhoods: RwLock<Neighborhoods>,
    /// op → remaining injected failures
    failures: Mutex<HashMap<SyncOp, u32>>,
    journal: Mutex<Vec<SyncCall>>,
    broadcasts: AtomicU64,
}

impl MemorySync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score an input for competitions. Unscored inputs count as 0.
    pub fn set_score(&self, id: impl Into<EntityId>, score: i64) {
        self.inner.scores.write().insert(id.into(), score);
    }

    /// Neighborhoods returned by the next `relink` calls.
    pub fn set_neighborhoods(&self, neighborhoods: Neighborhoods) {
        *self.inner.neighborhoods.write() = neighborhoods;
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail_next(&self, op: SyncOp, times: u32) {
        *self.inner.failures.lock().entry(op).or_default() += times;
    }

    /// All calls so far, oldest first.
    pub fn journal(&self) -> Vec<SyncCall> {
        self.inner.journal.lock().clone()
    }

    /// Successful calls of one operation.
    pub fn calls(&self, op: SyncOp) -> usize {
        self.inner.journal.lock().iter().filter(|c| c.op == op && c.ok).count()
    }

    pub fn broadcasts(&self) -> u64 {
        self.inner.broadcasts.load(Ordering::Relaxed)
    }

    pub fn parents_of(&self, id: &EntityId) -> Option<Vec<EntityId>> {
        self.inner.parents.read().get(id).cloned()
    }

    pub fn winner_of(&self, id: &EntityId) -> Option<EntityId> {
        self.inner.winners.read().get(id).cloned()
    }

    /// Journal the call, consuming one injected failure if any is pending.
    fn enter(&self, op: SyncOp) -> Result<()> {
        let failed = {
            let mut failures = self.inner.failures.lock();
            match failures.get_mut(&op) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        self.inner.journal.lock().push(SyncCall { op, at: Utc::now(), ok: !failed });
        if failed {
            debug!(%op, "injected failure");
            return Err(Error::RemoteSync { op, message: "injected failure".into() });
        }
        Ok(())
    }

    /// Pick the parent whose winning input scores highest; ties go left.
    fn compete(&self, parents: &[EntityId]) -> Option<(EntityId, EntityId)> {
        let winners = self.inner.winners.read();
        let scores = self.inner.scores.read();
        let mut best: Option<(EntityId, EntityId, i64)> = None;
        for parent in parents {
            let input = winners.get(parent).cloned().unwrap_or_else(|| parent.clone());
            let score = scores.get(&input).copied().unwrap_or(0);
            if best.as_ref().is_none_or(|(_, _, s)| score > *s) {
                best = Some((parent.clone(), input, score));
            }
        }
        best.map(|(parent, input, _)| (parent, input))
    }

    fn detail(&self, id: &EntityId) -> Option<String> {
        self.inner.details.read().get(id).cloned()
    }
}

// ============================================================================
// RemoteSync impl
// ============================================================================

#[async_trait]
impl RemoteSync for MemorySync {
    async fn init_entities(&self, count: usize, kinds: &[String]) -> Result<Vec<EntityId>> {
        self.enter(SyncOp::InitEntities)?;

        let mut per_kind: HashMap<&str, usize> = HashMap::new();
        let ids: Vec<EntityId> = (0..count)
            .map(|i| {
                let kind = if kinds.is_empty() { DEFAULT_KIND } else { kinds[i % kinds.len()].as_str() };
                let n = per_kind.entry(kind).or_default();
                *n += 1;
                EntityId::named(format!("{kind}_{n}"))
            })
            .collect();

        self.inner.details.write().clear();
        self.inner.parents.write().clear();
        self.inner.winners.write().clear();
        {
            let mut details = self.inner.details.write();
            let mut winners = self.inner.winners.write();
            for id in &ids {
                details.insert(id.clone(), id.to_string());
                winners.insert(id.clone(), id.clone());
            }
        }
        *self.inner.inputs.write() = ids.clone();
        debug!(count, "allocated inputs");
        Ok(ids)
    }

    async fn emit(&self, updates: &[EmitUpdate]) -> Result<()> {
        self.enter(SyncOp::Emit)?;
        let mut details = self.inner.details.write();
        let mut parents = self.inner.parents.write();
        let mut winners = self.inner.winners.write();
        for u in updates {
            details.insert(u.target.clone(), format!("Gist from {}", u.source));
            parents.entry(u.target.clone()).or_default().push(u.source.clone());
            winners.insert(u.target.clone(), u.source.clone());
        }
        Ok(())
    }

    async fn reduce(&self, round: u32, updates: &[ReduceUpdate]) -> Result<ReduceAck> {
        self.enter(SyncOp::Reduce)?;
        let mut ack = ReduceAck::default();
        for u in updates {
            let Some((parent, input)) = self.compete(&u.parents) else { continue };
            let detail = self.detail(&parent).unwrap_or_default();
            self.inner.details.write().insert(u.target.clone(), detail);
            self.inner.parents.write().insert(u.target.clone(), u.parents.to_vec());
            self.inner.winners.write().insert(u.target.clone(), input.clone());
            ack.winners.insert(u.target.clone(), input);
        }
        debug!(round, pairings = updates.len(), "reduce recorded");
        Ok(ack)
    }

    async fn finalize(
        &self,
        target: &EntityId,
        parents: &[EntityId],
        payload: &str,
    ) -> Result<FinalizeAck> {
        self.enter(SyncOp::Finalize)?;
        let winner = match self.compete(parents) {
            Some((_, input)) => Some(input),
            None => self.winner_of(target),
        };
        let answer = match &winner {
            Some(w) => format!("Answer: {payload}\n\nWinner: {w}"),
            None => format!("Answer: {payload}"),
        };
        self.inner.details.write().insert(target.clone(), answer);
        self.inner.parents.write().insert(target.clone(), parents.to_vec());
        if let Some(w) = &winner {
            self.inner.winners.write().insert(target.clone(), w.clone());
        }
        Ok(FinalizeAck { winner })
    }

    async fn broadcast(&self) -> Result<()> {
        self.enter(SyncOp::Broadcast)?;
        self.inner.broadcasts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn relink(&self) -> Result<Neighborhoods> {
        self.enter(SyncOp::Relink)?;
        // Derived nodes are regenerated next cycle; only inputs survive.
        let inputs = self.inner.inputs.read().clone();
        self.inner.details.write().retain(|id, _| inputs.contains(id));
        self.inner.parents.write().clear();
        self.inner.winners.write().retain(|id, _| inputs.contains(id));
        Ok(self.inner.neighborhoods.read().clone())
    }

    async fn fetch_entity_detail(&self, id: &EntityId) -> Result<serde_json::Value> {
        self.enter(SyncOp::FetchDetail)?;
        let detail = self.detail(id).ok_or_else(|| Error::NotFound(format!("Entity '{id}'")))?;

        let parents: serde_json::Map<String, serde_json::Value> = self
            .parents_of(id)
            .unwrap_or_default()
            .iter()
            .map(|p| (p.to_string(), json!(self.detail(p).unwrap_or_else(|| "No details available".into()))))
            .collect();

        let is_input = self.inner.inputs.read().contains(id);
        let processor = match id.as_name() {
            Some(name) if is_input => {
                let linked: Vec<String> = self
                    .inner
                    .neighborhoods
                    .read()
                    .get(id)
                    .map(|ids| ids.iter().map(ToString::to_string).collect())
                    .unwrap_or_default();
                json!({
                    "name": name,
                    "kind": processor_kind(name),
                    "label": display_label(name),
                    "linked": linked,
                })
            }
            _ => serde_json::Value::Null,
        };

        Ok(json!({
            "id": id.to_string(),
            "self": detail,
            "parents": parents,
            "winner": self.winner_of(id).map(|w| w.to_string()),
            "processor": processor,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_names_per_kind() {
        let sync = MemorySync::new();
        let kinds = vec!["VisionProcessor".to_string(), "LanguageProcessor".to_string()];
        let ids = sync.init_entities(3, &kinds).await.unwrap();
        let names: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["VisionProcessor_1", "LanguageProcessor_1", "VisionProcessor_2"]);

        let ids = sync.init_entities(2, &[]).await.unwrap();
        assert_eq!(ids[1], EntityId::named("Processor_2"));
    }

    #[tokio::test]
    async fn test_reduce_picks_higher_score() {
        let sync = MemorySync::new();
        let ids = sync.init_entities(3, &[]).await.unwrap();
        sync.set_score(ids[1].clone(), 5);

        let ack = sync
            .reduce(1, &[
                ReduceUpdate { target: EntityId::seq(4), parents: [ids[0].clone(), ids[1].clone()].into_iter().collect() },
                ReduceUpdate { target: EntityId::seq(5), parents: [ids[2].clone()].into_iter().collect() },
            ])
            .await
            .unwrap();
        assert_eq!(ack.winners[&EntityId::seq(4)], ids[1]);
        assert_eq!(ack.winners[&EntityId::seq(5)], ids[2]);

        // ties go left
        let ack = sync
            .finalize(&EntityId::seq(6), &[EntityId::seq(4), EntityId::seq(5)], "done")
            .await
            .unwrap();
        assert_eq!(ack.winner, Some(ids[1].clone()));
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed() {
        let sync = MemorySync::new();
        sync.fail_next(SyncOp::Broadcast, 2);
        assert!(matches!(sync.broadcast().await, Err(Error::RemoteSync { op: SyncOp::Broadcast, .. })));
        assert!(sync.broadcast().await.is_err());
        sync.broadcast().await.unwrap();
        assert_eq!(sync.broadcasts(), 1);
        assert_eq!(sync.calls(SyncOp::Broadcast), 1);
        assert_eq!(sync.journal().len(), 3);
    }

    #[tokio::test]
    async fn test_detail_for_input_and_unknown() {
        let sync = MemorySync::new();
        let ids = sync.init_entities(2, &["CodeProcessor".to_string()]).await.unwrap();
        let mut hood = Neighborhoods::new();
        hood.insert(ids[0].clone(), vec![ids[1].clone()]);
        sync.set_neighborhoods(hood);

        let detail = sync.fetch_entity_detail(&ids[0]).await.unwrap();
        assert_eq!(detail["self"], "CodeProcessor_1");
        assert_eq!(detail["processor"]["label"], "Code");
        assert_eq!(detail["processor"]["linked"][0], "CodeProcessor_2");

        let err = sync.fetch_entity_detail(&EntityId::seq(99)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
