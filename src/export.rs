//! Graph export — dump the accumulator for a viewer.
//!
//! Two formats:
//!
//! ```text
//! GraphAccumulator → export_dot()      → Graphviz digraph (dot -Tsvg)
//! GraphAccumulator → export_elements() → [{group: "nodes"|"edges", ...}] JSON
//! ```

use std::io::Write;

use crate::graph::GraphAccumulator;
use crate::model::*;
use crate::Result;

/// Export the graph as a Graphviz `digraph`.
///
/// Inputs are boxes, the terminal a double circle, neighborhood relations
/// dashed and arrowless. Layers are ranked so the tree reads bottom-up.
pub fn export_dot(graph: &GraphAccumulator, writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "// ctm-rs reduction graph")?;
    writeln!(writer, "// Entities: {}", graph.entities().len())?;
    writeln!(writer, "// Relations: {}", graph.relations().len())?;
    writeln!(writer, "digraph ctm {{")?;
    writeln!(writer, "  rankdir=BT;")?;

    for layer in 0..=graph.depth() {
        let ids: Vec<String> = graph.layer(layer).map(|e| quote(&e.id.to_string())).collect();
        if ids.is_empty() {
            continue;
        }
        writeln!(writer, "  {{ rank=same; {}; }}", ids.join("; "))?;
    }

    for entity in graph.entities() {
        let shape = match entity.role {
            Role::Input => "box",
            Role::Reduction => "ellipse",
            Role::Terminal => "doublecircle",
        };
        writeln!(
            writer,
            "  {} [label={}, shape={}];",
            quote(&entity.id.to_string()),
            quote(&entity.label),
            shape,
        )?;
    }

    for rel in graph.relations() {
        let style = match rel.kind {
            RelationKind::Reduction => "",
            RelationKind::Neighborhood => " [style=dashed, dir=none]",
        };
        writeln!(
            writer,
            "  {} -> {}{};",
            quote(&rel.source.to_string()),
            quote(&rel.target.to_string()),
            style,
        )?;
    }

    writeln!(writer, "}}")?;
    Ok(())
}

/// Export the graph as a JSON element list, entities first.
pub fn export_elements(graph: &GraphAccumulator) -> Result<serde_json::Value> {
    let elements: Vec<Element> = graph.elements().map(|el| el.to_element()).collect();
    Ok(serde_json::to_value(elements)?)
}

/// Quote a DOT identifier.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
