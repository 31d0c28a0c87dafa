//! Entity (node) in the reduction graph.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque entity identifier.
///
/// Layer-0 inputs carry the name the backend assigned them
/// (e.g. `"VisionProcessor_1"`); every other entity carries a 1-based
/// global sequence number rendered as `n<seq>`.
///
/// On the wire both forms are strings, so ids survive as JSON object keys.
/// `n<seq>` reads back as a sequence id; names of that shape are reserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Repr);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Repr {
    Seq(usize),
    Name(String),
}

impl EntityId {
    pub fn seq(n: usize) -> Self {
        Self(Repr::Seq(n))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(Repr::Name(name.into()))
    }

    pub fn as_seq(&self) -> Option<usize> {
        match &self.0 {
            Repr::Seq(n) => Some(*n),
            Repr::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.0 {
            Repr::Name(s) => Some(s),
            Repr::Seq(_) => None,
        }
    }

    /// Parse the wire form. Inverse of `Display`.
    pub fn parse(s: &str) -> Self {
        match seq_of(s) {
            Some(n) => Self::seq(n),
            None => Self::named(s),
        }
    }

    /// A name that would print the same as a sequence id.
    pub fn is_reserved_name(&self) -> bool {
        self.as_name().and_then(seq_of).is_some()
    }
}

/// `"n12"` → 12. Leading zeros are not a sequence id, so `parse` stays
/// the exact inverse of `Display`.
fn seq_of(s: &str) -> Option<usize> {
    let digits = s.strip_prefix('n')?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Repr::Seq(n) => write!(f, "n{n}"),
            Repr::Name(s) => f.write_str(s),
        }
    }
}

impl From<&str> for EntityId {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for EntityId {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

/// Position of an entity in the reduction tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Layer 0: a processor taking part in the round.
    Input,
    /// Intermediate competition result.
    Reduction,
    /// The single merged output at the top of the tree.
    Terminal,
}

/// An entity in the reduction graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub label: String,
    /// Processor type of an input (`"VisionProcessor"`), `None` otherwise.
    pub kind: Option<String>,
    pub layer: usize,
    pub role: Role,
    /// Layer-0 entity that won the competition up to this entity.
    pub winner: Option<EntityId>,
}

impl Entity {
    /// A layer-0 input. Kind and label are derived from the backend name.
    pub fn input(id: EntityId) -> Self {
        let (kind, label) = match id.as_name() {
            Some(name) => (Some(processor_kind(name).to_string()), display_label(name)),
            None => (None, id.to_string()),
        };
        Self { id, label, kind, layer: 0, role: Role::Input, winner: None }
    }

    pub fn reduction(id: EntityId, layer: usize) -> Self {
        Self {
            label: id.to_string(),
            id,
            kind: None,
            layer,
            role: Role::Reduction,
            winner: None,
        }
    }

    pub fn terminal(id: EntityId, layer: usize) -> Self {
        Self {
            id,
            label: "o".into(),
            kind: None,
            layer,
            role: Role::Terminal,
            winner: None,
        }
    }

    /// Record the competition winner and relabel accordingly.
    pub fn with_winner(mut self, winner: EntityId, winner_label: &str) -> Self {
        self.label = match self.role {
            Role::Terminal => format!("o ({winner_label})"),
            _ => winner_label.to_string(),
        };
        self.winner = Some(winner);
        self
    }

    pub fn is_input(&self) -> bool {
        self.role == Role::Input
    }

    pub fn is_terminal(&self) -> bool {
        self.role == Role::Terminal
    }
}

/// Processor type: the part of a backend name before the first `_`.
pub fn processor_kind(name: &str) -> &str {
    name.split_once('_').map_or(name, |(kind, _)| kind)
}

/// Short display label: `"VideoProcessor_1"` becomes `"Video"`.
pub fn display_label(name: &str) -> String {
    let kind = processor_kind(name);
    let label = kind.replace("Processor", "");
    if label.is_empty() { kind.to_string() } else { label }
}
