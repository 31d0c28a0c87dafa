//! Graph accumulator: every entity and relation produced in one cycle.
//!
//! Append-only during a cycle, with two whole-graph transforms:
//! `reverse_all` for the broadcast and `reset_to` for the relink
//! truncation. Single mutator; no interior locking.

pub mod neighborhood;

use hashbrown::HashMap;

use crate::model::*;

pub use neighborhood::neighborhood_relations;

/// Live set of entities and relations.
#[derive(Debug, Clone, Default)]
pub struct GraphAccumulator {
    entities: Vec<Entity>,
    relations: Vec<Relation>,
    /// entity id → position in `entities`
    index: HashMap<EntityId, usize>,
}

impl GraphAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add entities and relations.
    ///
    /// Ids are caller-owned and must already be unique; debug builds assert it.
    pub fn append(
        &mut self,
        entities: impl IntoIterator<Item = Entity>,
        relations: impl IntoIterator<Item = Relation>,
    ) {
        for entity in entities {
            let previous = self.index.insert(entity.id.clone(), self.entities.len());
            debug_assert!(previous.is_none(), "duplicate entity id {}", entity.id);
            self.entities.push(entity);
        }
        self.relations.extend(relations);
    }

    /// Swap source and target of every relation not matched by `exclude`.
    pub fn reverse_all(&mut self, exclude: impl Fn(&Relation) -> bool) -> usize {
        let mut flipped = 0;
        for rel in self.relations.iter_mut().filter(|r| !exclude(&**r)) {
            rel.reverse();
            flipped += 1;
        }
        flipped
    }

    /// Discard every entity and relation not matched by `keep`.
    pub fn reset_to(&mut self, keep: impl Fn(ElementRef<'_>) -> bool) {
        self.entities.retain(|e| keep(ElementRef::Entity(e)));
        self.relations.retain(|r| keep(ElementRef::Relation(r)));
        self.reindex();
    }

    /// Drop all neighborhood relations and append the fresh set.
    pub fn replace_neighborhood(&mut self, relations: impl IntoIterator<Item = Relation>) {
        self.relations.retain(|r| !r.is_neighborhood());
        self.relations.extend(relations);
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.relations.clear();
        self.index.clear();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Entities first, then relations.
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.entities
            .iter()
            .map(ElementRef::Entity)
            .chain(self.relations.iter().map(ElementRef::Relation))
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.index.get(id).map(|&i| &self.entities[i])
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.index.contains_key(id)
    }

    /// Entities of one layer, in insertion order.
    pub fn layer(&self, layer: usize) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(move |e| e.layer == layer)
    }

    pub fn layer_ids(&self, layer: usize) -> Vec<EntityId> {
        self.layer(layer).map(|e| e.id.clone()).collect()
    }

    /// Relations pointing at `id`.
    pub fn incoming<'a>(&'a self, id: &'a EntityId) -> impl Iterator<Item = &'a Relation> {
        self.relations.iter().filter(move |r| &r.target == id)
    }

    pub fn terminal(&self) -> Option<&Entity> {
        self.entities.iter().find(|e| e.is_terminal())
    }

    /// Highest layer present.
    pub fn depth(&self) -> usize {
        self.entities.iter().map(|e| e.layer).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entities.len() + self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }

    fn reindex(&mut self) {
        self.index = self
            .entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
    }
}

/// True for layer-0 entities and the neighborhood relations among them.
///
/// The relink predicate: everything it rejects is regenerated next cycle.
pub fn is_layer_zero(element: ElementRef<'_>) -> bool {
    match element {
        ElementRef::Entity(e) => e.layer == 0,
        ElementRef::Relation(r) => r.is_neighborhood(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::build_layer;
    use crate::plan::compute_layer_sizes;

    fn inputs(k: usize) -> Vec<Entity> {
        (1..=k).map(|i| Entity::input(EntityId::seq(i))).collect()
    }

    fn grown(k: usize) -> GraphAccumulator {
        let sizes = compute_layer_sizes(k).unwrap();
        let mut g = GraphAccumulator::new();
        g.append(inputs(k), [Relation::neighborhood(EntityId::seq(1), EntityId::seq(2))]);
        for layer in 1..sizes.len() {
            let built = build_layer(&sizes, layer).unwrap();
            let entities = built.entities.iter().map(|id| Entity::reduction(id.clone(), layer));
            g.append(entities, built.relations());
        }
        g
    }

    #[test]
    fn test_append_and_lookup() {
        let g = grown(6);
        assert_eq!(g.entities().len(), 12);
        // 1 neighborhood + 6 + 3 + 2 reduction relations
        assert_eq!(g.relations().len(), 12);
        assert_eq!(g.entity(&EntityId::seq(12)).unwrap().layer, 3);
        assert_eq!(g.incoming(&EntityId::seq(11)).count(), 1);
        assert_eq!(g.incoming(&EntityId::seq(10)).count(), 2);
        assert_eq!(g.depth(), 3);
    }

    #[test]
    fn test_reverse_all_skips_neighborhood() {
        let mut g = grown(4);
        let before = g.relations().to_vec();
        let flipped = g.reverse_all(Relation::is_neighborhood);
        assert_eq!(flipped, before.len() - 1);
        for (now, was) in g.relations().iter().zip(&before) {
            if was.is_neighborhood() {
                assert_eq!(now, was);
            } else {
                assert_eq!(now.source, was.target);
                assert_eq!(now.target, was.source);
            }
        }
        g.reverse_all(Relation::is_neighborhood);
        assert_eq!(g.relations(), &before[..]);
    }

    #[test]
    fn test_reset_to_layer_zero() {
        let mut g = grown(5);
        g.reset_to(is_layer_zero);
        assert_eq!(g.entities(), &inputs(5)[..]);
        assert_eq!(g.relations().len(), 1);
        assert!(g.relations()[0].is_neighborhood());
        assert!(!g.contains(&EntityId::seq(6)));
        assert!(g.contains(&EntityId::seq(5)));
    }

    #[test]
    fn test_replace_neighborhood() {
        let mut g = grown(3);
        g.replace_neighborhood([Relation::neighborhood(EntityId::seq(2), EntityId::seq(3))]);
        let hood: Vec<&Relation> = g.relations().iter().filter(|r| r.is_neighborhood()).collect();
        assert_eq!(hood.len(), 1);
        assert_eq!(hood[0].source, EntityId::seq(2));
    }

    #[test]
    #[should_panic(expected = "duplicate entity id")]
    #[cfg(debug_assertions)]
    fn test_duplicate_ids_assert_in_debug() {
        let mut g = GraphAccumulator::new();
        g.append(inputs(2), []);
        g.append(inputs(1), []);
    }
}
