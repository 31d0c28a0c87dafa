//! Element — explicit tagged union of entities and relations.

use serde::{Deserialize, Serialize};
use super::{Entity, Relation};

/// An owned graph element, as exported to viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "group")]
pub enum Element {
    #[serde(rename = "nodes")]
    Entity(Entity),
    #[serde(rename = "edges")]
    Relation(Relation),
}

/// A borrowed graph element, handed to accumulator predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRef<'a> {
    Entity(&'a Entity),
    Relation(&'a Relation),
}

impl ElementRef<'_> {
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            ElementRef::Entity(e) => Some(e),
            ElementRef::Relation(_) => None,
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match self {
            ElementRef::Relation(r) => Some(r),
            ElementRef::Entity(_) => None,
        }
    }

    pub fn to_element(&self) -> Element {
        match self {
            ElementRef::Entity(e) => Element::Entity((*e).clone()),
            ElementRef::Relation(r) => Element::Relation((*r).clone()),
        }
    }
}

impl<'a> From<&'a Entity> for ElementRef<'a> {
    fn from(e: &'a Entity) -> Self {
        ElementRef::Entity(e)
    }
}

impl<'a> From<&'a Relation> for ElementRef<'a> {
    fn from(r: &'a Relation) -> Self {
        ElementRef::Relation(r)
    }
}
