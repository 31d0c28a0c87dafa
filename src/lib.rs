//! # ctm-rs — Up-tree Tournament Controller
//!
//! Drives a Conscious Turing Machine session through its phase cycle and
//! keeps the reduction graph that a viewer renders.
//!
//! ## Design Principles
//!
//! 1. **Pure topology**: layer sizes and pairings are functions of `k` alone
//! 2. **Trait-first**: `RemoteSync` is the contract with the processor backend
//! 3. **One session object**: plan, phase, round and graph live together
//! 4. **Retry-safe steps**: nothing mutates until the backend call succeeds
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ctm_rs::{MemorySync, Session, SessionConfig};
//!
//! # async fn example() -> ctm_rs::Result<()> {
//! let config = SessionConfig::with_kinds(["VisionProcessor", "LanguageProcessor", "AudioProcessor"]);
//! let mut session = Session::new(config, MemorySync::new())?;
//!
//! // PREPARE, EMIT, REDUCE(1), FINALIZE, BROADCAST, RELINK
//! for _ in 0..6 {
//!     let report = session.step_with_retry().await?;
//!     println!("{} → {}", report.phase, report.next);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Cycle
//!
//! | Phase | Remote call | Graph effect |
//! |-------|-------------|--------------|
//! | PREPARE | `init_entities` | layer-0 inputs |
//! | EMIT | `emit` | none |
//! | REDUCE(r) | `reduce` | layer `r` + reduction relations |
//! | FINALIZE | `finalize` | terminal entity |
//! | BROADCAST | `broadcast` | every non-neighborhood relation reversed |
//! | RELINK | `relink` | reset to layer 0, fresh neighborhood relations |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod plan;
pub mod tournament;
pub mod phase;
pub mod graph;
pub mod sync;
pub mod session;
pub mod config;
pub mod export;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Entity, EntityId, Role, Relation, RelationKind, Element, ElementRef,
};

// ============================================================================
// Re-exports: Topology
// ============================================================================

pub use plan::{LayerPlan, compute_layer_sizes, compute_layer_start_id};
pub use tournament::{BuiltLayer, Pairing, build_layer, build_layer_from};
pub use phase::{Phase, PhaseMachine, advance};
pub use graph::GraphAccumulator;

// ============================================================================
// Re-exports: Sync + Session
// ============================================================================

pub use sync::{
    RemoteSync, MemorySync, SyncOp, EmitUpdate, ReduceUpdate, ReduceAck,
    FinalizeAck, Neighborhoods,
};
pub use session::{Session, SessionSnapshot, StepReport};
pub use config::{SessionConfig, RetryPolicy};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid entity count: {0} (need at least 1)")]
    InvalidEntityCount(usize),

    #[error("Layer index {layer} out of range: plan has {layers} layers")]
    LayerIndexOutOfRange { layer: usize, layers: usize },

    #[error("Layer {layer} size mismatch: expected {expected}, got {got}")]
    LayerSizeMismatch { layer: usize, expected: usize, got: usize },

    #[error("Remote sync error in {op}: {message}")]
    RemoteSync { op: SyncOp, message: String },

    #[error("Unknown phase: {0}")]
    UnknownPhase(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Backend failures are retryable; everything else is a caller or data bug.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RemoteSync { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
