//! Layer planner: the shape of the reduction tree for `k` inputs.
//!
//! Pure functions. Layer 0 holds the `k` inputs, every further layer holds
//! `ceil(prev / 2)` entities, and the plan ends at the first layer of size 1.
//! Ids are 1-based and global across layers: layer 0 owns `1..=k`, layer 1
//! starts at `k + 1`, and so on.

use std::ops::Range;

use crate::model::EntityId;
use crate::{Error, Result};

/// Layer sizes for `k` inputs, ending at (and including) the first `1`.
pub fn compute_layer_sizes(k: usize) -> Result<Vec<usize>> {
    if k < 1 {
        return Err(Error::InvalidEntityCount(k));
    }
    let mut sizes = vec![k];
    let mut current = k;
    while current > 1 {
        current = current.div_ceil(2);
        sizes.push(current);
    }
    Ok(sizes)
}

/// First global id of `layer`: sum of all earlier sizes, plus one.
pub fn compute_layer_start_id(sizes: &[usize], layer: usize) -> usize {
    sizes.iter().take(layer).sum::<usize>() + 1
}

/// The computed layer structure for one entity count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPlan {
    sizes: Vec<usize>,
}

impl LayerPlan {
    pub fn new(k: usize) -> Result<Self> {
        Ok(Self { sizes: compute_layer_sizes(k)? })
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Number of inputs (`k`).
    pub fn entity_count(&self) -> usize {
        self.sizes[0]
    }

    pub fn layer_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn layer_size(&self, layer: usize) -> Result<usize> {
        self.sizes.get(layer).copied().ok_or(Error::LayerIndexOutOfRange {
            layer,
            layers: self.sizes.len(),
        })
    }

    pub fn start_id(&self, layer: usize) -> usize {
        compute_layer_start_id(&self.sizes, layer)
    }

    /// Global id range of a layer.
    pub fn id_range(&self, layer: usize) -> Result<Range<usize>> {
        let size = self.layer_size(layer)?;
        let start = self.start_id(layer);
        Ok(start..start + size)
    }

    pub fn layer_ids(&self, layer: usize) -> Result<Vec<EntityId>> {
        Ok(self.id_range(layer)?.map(EntityId::seq).collect())
    }

    /// Reduce rounds between the inputs and the terminal layer.
    ///
    /// Excludes layer 0 and the final size-1 layer, which FINALIZE builds.
    pub fn reduce_rounds(&self) -> u32 {
        self.sizes.len().saturating_sub(2) as u32
    }

    /// Index of the size-1 layer.
    pub fn terminal_layer(&self) -> usize {
        self.sizes.len() - 1
    }

    /// Entities created above layer 0 over one full cycle.
    pub fn derived_entities(&self) -> usize {
        self.sizes.iter().sum::<usize>() - self.entity_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_small() {
        assert_eq!(compute_layer_sizes(1).unwrap(), vec![1]);
        assert_eq!(compute_layer_sizes(2).unwrap(), vec![2, 1]);
        assert_eq!(compute_layer_sizes(3).unwrap(), vec![3, 2, 1]);
        assert_eq!(compute_layer_sizes(6).unwrap(), vec![6, 3, 2, 1]);
        assert_eq!(compute_layer_sizes(7).unwrap(), vec![7, 4, 2, 1]);
    }

    #[test]
    fn test_sizes_reject_zero() {
        assert!(matches!(compute_layer_sizes(0), Err(Error::InvalidEntityCount(0))));
    }

    #[test]
    fn test_start_ids() {
        let sizes = [6, 3, 2, 1];
        assert_eq!(compute_layer_start_id(&sizes, 0), 1);
        assert_eq!(compute_layer_start_id(&sizes, 1), 7);
        assert_eq!(compute_layer_start_id(&sizes, 2), 10);
        assert_eq!(compute_layer_start_id(&sizes, 3), 12);
    }

    #[test]
    fn test_plan_accessors() {
        let plan = LayerPlan::new(6).unwrap();
        assert_eq!(plan.reduce_rounds(), 2);
        assert_eq!(plan.terminal_layer(), 3);
        assert_eq!(plan.derived_entities(), 6);
        assert_eq!(plan.id_range(1).unwrap(), 7..10);
        assert_eq!(plan.layer_ids(3).unwrap(), vec![EntityId::seq(12)]);
        assert!(matches!(
            plan.layer_size(4),
            Err(Error::LayerIndexOutOfRange { layer: 4, layers: 4 })
        ));
    }

    #[test]
    fn test_single_input_has_no_rounds() {
        let plan = LayerPlan::new(1).unwrap();
        assert_eq!(plan.reduce_rounds(), 0);
        assert_eq!(plan.terminal_layer(), 0);
        assert_eq!(plan.derived_entities(), 0);
    }
}
