//! Relation (edge) in the reduction graph.

use serde::{Deserialize, Serialize};
use super::EntityId;

/// What a relation means in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Lower-layer entity feeding an upper-layer entity.
    Reduction,
    /// Same-layer link between two layer-0 inputs, supplied by the backend.
    Neighborhood,
}

/// A directed relation. Identity is just `(source, target)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: RelationKind,
}

impl Relation {
    pub fn reduction(source: EntityId, target: EntityId) -> Self {
        Self { source, target, kind: RelationKind::Reduction }
    }

    pub fn neighborhood(source: EntityId, target: EntityId) -> Self {
        Self { source, target, kind: RelationKind::Neighborhood }
    }

    /// Flip direction in place.
    pub fn reverse(&mut self) {
        std::mem::swap(&mut self.source, &mut self.target);
    }

    pub fn is_neighborhood(&self) -> bool {
        self.kind == RelationKind::Neighborhood
    }

    pub fn touches(&self, id: &EntityId) -> bool {
        &self.source == id || &self.target == id
    }

    /// The "other" end of the relation from the given entity.
    pub fn other_end(&self, from: &EntityId) -> Option<&EntityId> {
        if from == &self.source { Some(&self.target) }
        else if from == &self.target { Some(&self.source) }
        else { None }
    }
}
