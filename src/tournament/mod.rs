//! Tournament builder: which lower-layer entities feed each upper entity.
//!
//! Pairing is strict consecutive left-to-right: previous-layer entities
//! `0&1` feed new entity 0, `2&3` feed new entity 1, and so on. When the
//! previous layer is odd, its last entity carries forward alone. There is
//! no first/last special-casing and no borrowing from two layers back.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::model::{EntityId, Relation};
use crate::plan::compute_layer_start_id;
use crate::{Error, Result};

/// One upper-layer entity and the one or two entities that feed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub target: EntityId,
    pub sources: SmallVec<[EntityId; 2]>,
}

impl Pairing {
    /// True when this entity is the odd leftover of its layer.
    pub fn is_solo(&self) -> bool {
        self.sources.len() == 1
    }
}

/// Topology of one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltLayer {
    pub layer: usize,
    pub entities: Vec<EntityId>,
    /// Empty for layer 0.
    pub pairings: Vec<Pairing>,
}

impl BuiltLayer {
    /// Reduction relations from every source to its target, in pairing order.
    pub fn relations(&self) -> Vec<Relation> {
        self.pairings
            .iter()
            .flat_map(|p| {
                p.sources
                    .iter()
                    .map(|s| Relation::reduction(s.clone(), p.target.clone()))
            })
            .collect()
    }
}

/// Build `layer` using the global sequence ids for both layers.
pub fn build_layer(sizes: &[usize], layer: usize) -> Result<BuiltLayer> {
    check_layer(sizes, layer)?;
    if layer == 0 {
        return Ok(BuiltLayer { layer, entities: seq_ids(sizes, 0), pairings: Vec::new() });
    }
    let previous = seq_ids(sizes, layer - 1);
    build_layer_from(sizes, layer, &previous)
}

/// Build `layer` pairing the supplied previous-layer ids.
///
/// Used for layer 1, whose sources are the named inputs rather than
/// sequence ids.
pub fn build_layer_from(sizes: &[usize], layer: usize, previous: &[EntityId]) -> Result<BuiltLayer> {
    check_layer(sizes, layer)?;
    if layer == 0 {
        return build_layer(sizes, 0);
    }
    let expected = sizes[layer - 1];
    if previous.len() != expected {
        return Err(Error::LayerSizeMismatch { layer: layer - 1, expected, got: previous.len() });
    }

    let entities = seq_ids(sizes, layer);
    let pairings: Vec<Pairing> = previous
        .chunks(2)
        .zip(&entities)
        .map(|(sources, target)| Pairing {
            target: target.clone(),
            sources: sources.iter().cloned().collect(),
        })
        .collect();

    debug_assert_eq!(pairings.len(), sizes[layer]);
    Ok(BuiltLayer { layer, entities, pairings })
}

fn check_layer(sizes: &[usize], layer: usize) -> Result<()> {
    if layer >= sizes.len() {
        return Err(Error::LayerIndexOutOfRange { layer, layers: sizes.len() });
    }
    Ok(())
}

fn seq_ids(sizes: &[usize], layer: usize) -> Vec<EntityId> {
    let start = compute_layer_start_id(sizes, layer);
    (start..start + sizes[layer]).map(EntityId::seq).collect()
}
