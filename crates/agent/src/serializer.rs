//! Structured-data → bullet-list text rendering.
//!
//! Tool results and plan arguments are arbitrary JSON-like structures, some
//! of them huge and some (when a host hands us a graph) self-referential.
//! This module renders any such value into indented bullets that are safe to
//! paste into a prompt:
//!
//! ```text
//! - title: Chapter one
//! - sections:
//!   - section #1:
//!     - heading: Opening
//!     - body: First line
//!       second line
//! ```
//!
//! Rules, in precedence order:
//!
//! 1. Past the maximum depth a single `[max depth exceeded]` bullet is
//!    emitted and nothing below it is visited.
//! 2. A container already on the current path emits a single
//!    `[circular reference]` bullet. A container already expanded elsewhere
//!    in the same render emits `[shown above]` instead, so shared
//!    sub-structures cost one expansion.
//! 3. Array elements are labelled with the singular of their key
//!    (`items` → `item #1`) or a positional `[n]`; long arrays end with a
//!    `… N more items` marker.
//! 4. Multi-line strings keep their first line inline and indent the rest.
//! 5. Objects recurse per key.
//!
//! `serde_json::Value` is a tree, so cycles can only come from a
//! [`DataGraph`]: an arena of nodes whose containers refer to children by
//! [`NodeId`]. The visited sets hold ids, which keeps the cycle guard
//! independent of pointer identity.

use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Write as _;

use quillclaw_config::SerializerConfig;

pub const MAX_DEPTH_MARKER: &str = "[max depth exceeded]";
pub const CIRCULAR_MARKER: &str = "[circular reference]";
pub const REPEATED_MARKER: &str = "[shown above]";

const INDENT: &str = "  ";

// ── Graph ─────────────────────────────────────────────────────────────────

/// Index of a node inside a [`DataGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// One JSON-like value. Containers hold child ids, not children.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<NodeId>),
    Object(Vec<(String, NodeId)>),
}

impl Node {
    fn is_container(&self) -> bool {
        matches!(self, Node::Array(_) | Node::Object(_))
    }
}

/// Arena of [`Node`]s. Allows shared and cyclic structure.
#[derive(Debug, Clone, Default)]
pub struct DataGraph {
    nodes: Vec<Node>,
}

impl DataGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lift a JSON value into a fresh graph, returning the graph and its root.
    pub fn from_json(value: &Value) -> (Self, NodeId) {
        let mut graph = Self::new();
        let root = graph.insert_json(value);
        (graph, root)
    }

    /// Copy a JSON value into this graph.
    pub fn insert_json(&mut self, value: &Value) -> NodeId {
        let node = match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => Node::Number(n.clone()),
            Value::String(s) => Node::String(s.clone()),
            Value::Array(items) => {
                let children = items.iter().map(|item| self.insert_json(item)).collect();
                Node::Array(children)
            }
            Value::Object(map) => {
                let fields = map
                    .iter()
                    .map(|(key, item)| (key.clone(), self.insert_json(item)))
                    .collect();
                Node::Object(fields)
            }
        };
        self.push(node)
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Append `child` to the array at `array`. Returns `false` if `array`
    /// is not an array node.
    pub fn append(&mut self, array: NodeId, child: NodeId) -> bool {
        match self.nodes.get_mut(array.0) {
            Some(Node::Array(children)) => {
                children.push(child);
                true
            }
            _ => false,
        }
    }

    /// Set `key` on the object at `object`, replacing an existing entry.
    /// Returns `false` if `object` is not an object node.
    pub fn set_field(&mut self, object: NodeId, key: impl Into<String>, child: NodeId) -> bool {
        let key = key.into();
        match self.nodes.get_mut(object.0) {
            Some(Node::Object(fields)) => {
                if let Some(slot) = fields.iter_mut().find(|(k, _)| *k == key) {
                    slot.1 = child;
                } else {
                    fields.push((key, child));
                }
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ── Limits ────────────────────────────────────────────────────────────────

/// Bounds on rendering work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderLimits {
    /// Containers nested deeper than this are replaced by a marker.
    pub max_depth: usize,
    /// Elements rendered per array before the remainder marker.
    pub max_array_items: usize,
}

impl Default for RenderLimits {
    fn default() -> Self {
        Self {
            max_depth: 15,
            max_array_items: 100,
        }
    }
}

impl From<&SerializerConfig> for RenderLimits {
    fn from(config: &SerializerConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_array_items: config.max_array_items,
        }
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────

/// Where a node sits while being rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct Position<'a> {
    /// Indentation level of the node's own bullets.
    pub indent: usize,
    /// Key of the enclosing field, used to label array elements.
    pub array_context: Option<&'a str>,
}

/// Render a JSON value with the given limits.
pub fn render_json(value: &Value, limits: &RenderLimits) -> String {
    let (graph, root) = DataGraph::from_json(value);
    render_graph(&graph, root, limits)
}

/// Render the graph rooted at `root` from indent zero.
pub fn render_graph(graph: &DataGraph, root: NodeId, limits: &RenderLimits) -> String {
    let mut out = String::new();
    let mut visited = HashSet::new();
    render_into(&mut out, graph, root, Position::default(), &mut visited, limits);
    out
}

/// Render `id` into `out` at `position`.
///
/// `visited` collects every container expanded so far. Passing the same set
/// to several calls renders each shared container once across all of them.
pub fn render_into(
    out: &mut String,
    graph: &DataGraph,
    id: NodeId,
    position: Position<'_>,
    visited: &mut HashSet<NodeId>,
    limits: &RenderLimits,
) {
    Renderer {
        graph,
        limits,
        path: HashSet::new(),
        visited,
        out,
    }
    .node(id, position.indent, 1, position.array_context);
}

struct Renderer<'r> {
    graph: &'r DataGraph,
    limits: &'r RenderLimits,
    /// Containers between the root and the current node.
    path: HashSet<NodeId>,
    visited: &'r mut HashSet<NodeId>,
    out: &'r mut String,
}

impl Renderer<'_> {
    fn node(&mut self, id: NodeId, indent: usize, depth: usize, array_context: Option<&str>) {
        if depth > self.limits.max_depth {
            self.bullet(indent, MAX_DEPTH_MARKER);
            return;
        }
        let graph = self.graph;
        let Some(node) = graph.node(id) else {
            self.bullet(indent, "[missing node]");
            return;
        };
        if node.is_container() {
            if self.path.contains(&id) {
                self.bullet(indent, CIRCULAR_MARKER);
                return;
            }
            if !self.visited.insert(id) {
                self.bullet(indent, REPEATED_MARKER);
                return;
            }
        }

        match node {
            Node::Object(fields) => {
                self.path.insert(id);
                for (key, child) in fields {
                    self.entry(key, *child, indent, depth, Some(key.as_str()));
                }
                self.path.remove(&id);
            }
            Node::Array(children) => {
                self.path.insert(id);
                let singular = array_context.and_then(singularize);
                for (i, child) in children.iter().take(self.limits.max_array_items).enumerate() {
                    let label = match &singular {
                        Some(name) => format!("{name} #{}", i + 1),
                        None => format!("[{}]", i + 1),
                    };
                    self.entry(&label, *child, indent, depth, singular.as_deref());
                }
                if children.len() > self.limits.max_array_items {
                    let rest = children.len() - self.limits.max_array_items;
                    self.bullet(indent, &format!("… {rest} more items"));
                }
                self.path.remove(&id);
            }
            scalar => {
                let text = scalar_text(scalar);
                self.text_bullet(indent, None, &text);
            }
        }
    }

    /// One labelled child: inline for scalars, header plus nested bullets for containers.
    fn entry(
        &mut self,
        label: &str,
        child: NodeId,
        indent: usize,
        depth: usize,
        context: Option<&str>,
    ) {
        match self.graph.node(child) {
            Some(node) if !node.is_container() => {
                let text = scalar_text(node);
                self.text_bullet(indent, Some(label), &text);
            }
            _ => {
                self.bullet(indent, &format!("{label}:"));
                self.node(child, indent + 1, depth + 1, context);
            }
        }
    }

    fn text_bullet(&mut self, indent: usize, label: Option<&str>, text: &str) {
        let mut lines = text.lines();
        let first = lines.next().unwrap_or("");
        match label {
            Some(label) => self.bullet(indent, &format!("{label}: {first}")),
            None => self.bullet(indent, first),
        }
        for line in lines {
            self.pad(indent + 1);
            self.out.push_str(line);
            self.out.push('\n');
        }
    }

    fn bullet(&mut self, indent: usize, text: &str) {
        self.pad(indent);
        let _ = writeln!(self.out, "- {text}");
    }

    fn pad(&mut self, indent: usize) {
        for _ in 0..indent {
            self.out.push_str(INDENT);
        }
    }
}

fn scalar_text(node: &Node) -> String {
    match node {
        Node::Null => "null".into(),
        Node::Bool(b) => b.to_string(),
        Node::Number(n) => n.to_string(),
        Node::String(s) if s.is_empty() => "\"\"".into(),
        Node::String(s) => s.clone(),
        Node::Array(_) | Node::Object(_) => String::new(),
    }
}

/// Singular form of a plural field name, if it looks like one.
///
/// `items` → `item`, `entries` → `entry`, `matches` → `match`,
/// `next_steps` → `next step`. Returns `None` for words that do not look
/// plural (`status`, `address`, `analysis`).
pub fn singularize(key: &str) -> Option<String> {
    let key = key.trim();
    let lower = key.to_ascii_lowercase();
    if lower.len() < 3
        || !lower.ends_with('s')
        || lower.ends_with("ss")
        || lower.ends_with("us")
        || lower.ends_with("is")
    {
        return None;
    }

    let stem = if lower.ends_with("ies") {
        format!("{}y", &key[..key.len() - 3])
    } else if ["ches", "shes", "xes", "zes", "sses"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        key[..key.len() - 2].to_string()
    } else {
        key[..key.len() - 1].to_string()
    };

    Some(stem.replace('_', " "))
}
