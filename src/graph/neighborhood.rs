//! Neighborhood relations between layer-0 inputs.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::model::{EntityId, Relation};

/// Build neighborhood relations from a backend mapping.
///
/// `order` is the left-to-right order of the inputs. Ids not in `order`
/// and self-links are skipped, each unordered pair appears once, and every
/// relation points from the left input to the right one. Relations come
/// out sorted by the positions of their endpoints.
pub fn neighborhood_relations<'a, I, J>(mapping: I, order: &[EntityId]) -> Vec<Relation>
where
    I: IntoIterator<Item = (&'a EntityId, J)>,
    J: IntoIterator<Item = &'a EntityId>,
{
    let position: HashMap<&EntityId, usize> =
        order.iter().enumerate().map(|(i, id)| (id, i)).collect();
    // (left, right) positions; ordered so output follows input order
    let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();

    for (from, linked) in mapping {
        let Some(&a) = position.get(from) else {
            tracing::warn!(entity = %from, "skipping neighborhood of unknown entity");
            continue;
        };
        for to in linked {
            let Some(&b) = position.get(to) else {
                tracing::warn!(entity = %to, from = %from, "skipping link to unknown entity");
                continue;
            };
            if a == b {
                continue;
            }
            pairs.insert((a.min(b), a.max(b)));
        }
    }
    pairs
        .into_iter()
        .map(|(l, r)| Relation::neighborhood(order[l].clone(), order[r].clone()))
        .collect()
}
