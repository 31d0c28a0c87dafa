//! # Reduction Graph Model
//!
//! Plain DTOs shared by every stage: plan → tournament → accumulator →
//! sync → export. This module is pure data: no I/O, no state, no async.

pub mod entity;
pub mod relation;
pub mod element;

pub use entity::{Entity, EntityId, Role, processor_kind, display_label};
pub use relation::{Relation, RelationKind};
pub use element::{Element, ElementRef};
