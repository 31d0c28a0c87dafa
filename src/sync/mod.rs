//! # Remote Sync Trait
//!
//! The contract between a session and the backend that actually runs the
//! processors. The session issues exactly one call per phase and never
//! reads payload content back into the tree topology.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemorySync` | `memory` | In-process reference backend for tests and embedding |

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::EntityId;
use crate::Result;

pub use memory::MemorySync;

// ============================================================================
// Operations
// ============================================================================

/// Names of the remote operations, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncOp {
    InitEntities,
    Emit,
    Reduce,
    Finalize,
    Broadcast,
    Relink,
    FetchDetail,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncOp::InitEntities => "init_entities",
            SyncOp::Emit => "emit",
            SyncOp::Reduce => "reduce",
            SyncOp::Finalize => "finalize",
            SyncOp::Broadcast => "broadcast",
            SyncOp::Relink => "relink",
            SyncOp::FetchDetail => "fetch_entity_detail",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// One input's contribution into its layer-0 slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitUpdate {
    pub source: EntityId,
    pub target: EntityId,
}

/// One pairing result of a reduce round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceUpdate {
    pub target: EntityId,
    pub parents: SmallVec<[EntityId; 2]>,
}

/// Reduce acknowledgement, optionally naming the winning input per target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceAck {
    pub winners: HashMap<EntityId, EntityId>,
}

/// Finalize acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeAck {
    pub winner: Option<EntityId>,
}

/// Entity → entities it should be linked with next cycle.
pub type Neighborhoods = BTreeMap<EntityId, Vec<EntityId>>;

// ============================================================================
// RemoteSync Trait
// ============================================================================

/// The backend collaborator.
///
/// Failures are reported as `Error::RemoteSync` and are safe to retry: the
/// session has not mutated anything when a call fails.
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Allocate `count` entities; returns their ids in left-to-right order.
    async fn init_entities(&self, count: usize, kinds: &[String]) -> Result<Vec<EntityId>>;

    /// Record each input's contribution into its layer-0 slot.
    async fn emit(&self, updates: &[EmitUpdate]) -> Result<()>;

    /// Record the pairings of one reduce round.
    async fn reduce(&self, round: u32, updates: &[ReduceUpdate]) -> Result<ReduceAck>;

    /// Record convergence into the terminal entity.
    async fn finalize(
        &self,
        target: &EntityId,
        parents: &[EntityId],
        payload: &str,
    ) -> Result<FinalizeAck>;

    /// Trigger downward propagation of the result.
    async fn broadcast(&self) -> Result<()>;

    /// Fresh layer-0 neighborhoods for the next cycle.
    async fn relink(&self) -> Result<Neighborhoods>;

    /// Free-form detail payload for one entity.
    async fn fetch_entity_detail(&self, id: &EntityId) -> Result<serde_json::Value>;
}

/// Shared handles forward to the backend they point at.
#[async_trait]
impl<S: RemoteSync + ?Sized> RemoteSync for Arc<S> {
    async fn init_entities(&self, count: usize, kinds: &[String]) -> Result<Vec<EntityId>> {
        (**self).init_entities(count, kinds).await
    }

    async fn emit(&self, updates: &[EmitUpdate]) -> Result<()> {
        (**self).emit(updates).await
    }

    async fn reduce(&self, round: u32, updates: &[ReduceUpdate]) -> Result<ReduceAck> {
        (**self).reduce(round, updates).await
    }

    async fn finalize(
        &self,
        target: &EntityId,
        parents: &[EntityId],
        payload: &str,
    ) -> Result<FinalizeAck> {
        (**self).finalize(target, parents, payload).await
    }

    async fn broadcast(&self) -> Result<()> {
        (**self).broadcast().await
    }

    async fn relink(&self) -> Result<Neighborhoods> {
        (**self).relink().await
    }

    async fn fetch_entity_detail(&self, id: &EntityId) -> Result<serde_json::Value> {
        (**self).fetch_entity_detail(id).await
    }
}
