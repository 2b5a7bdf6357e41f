//! Minimal document tree: elements and text nodes, text ranges, and the
//! wrap/unwrap operations behind the reading highlight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::{DomError, HighlightError};
use crate::highlight::{HighlightToken, Highlighter};
use crate::lock;
use crate::platform::{Selection, TextSelector};

pub const MARKER_TAG: &str = "span";
pub const MARKER_CLASS: &str = "read-anything-highlight";
pub const HIGHLIGHT_STYLE: &str = "background-color: #ffeb3b";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A position inside a text node, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: Boundary,
    pub end: Boundary,
}

impl TextRange {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        Self { start, end }
    }

    /// A range inside a single text node.
    pub fn within(node: NodeId, start: usize, end: usize) -> Self {
        Self {
            start: Boundary { node, offset: start },
            end: Boundary { node, offset: end },
        }
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Bookkeeping for one wrapped range, enough to restore it exactly.
#[derive(Debug, Clone)]
pub struct Wrapped {
    marker: NodeId,
    original: NodeId,
    before: Option<NodeId>,
    after: Option<NodeId>,
}

impl Wrapped {
    pub fn marker(&self) -> NodeId {
        self.marker
    }
}

/// Arena of nodes addressed by [`NodeId`]. Slots of the nodes a highlight
/// creates are recycled once it is removed, so repeated highlighting does
/// not grow the arena.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: NodeId,
    selection: Option<TextRange>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut document = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
            selection: None,
        };
        document.root = document.create_element("body");
        document
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element {
            tag: tag.to_string(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let node = Node {
            parent: None,
            children: Vec::new(),
            data,
        };
        if let Some(slot) = self.free.pop() {
            self.nodes[slot] = node;
            return NodeId(slot);
        }
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Return the slot of a detached, childless node to the arena.
    fn release(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get_mut(node.0) else {
            return;
        };
        if node == self.root || n.parent.is_some() || !n.children.is_empty() || self.free.contains(&node.0) {
            return;
        }
        n.data = NodeData::Text(String::new());
        self.free.push(node.0);
    }

    /// Nodes currently allocated, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DomError> {
        self.nodes.get_mut(id.0).ok_or(DomError::UnknownNode(id.0))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let len = self.node(parent)?.children.len();
        self.insert_child(parent, len, child)
    }

    /// Insert `child` at `index` among `parent`'s children, moving it out of
    /// its current parent first.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<(), DomError> {
        if !matches!(self.node(parent)?.data, NodeData::Element { .. }) {
            return Err(DomError::NotAnElement(parent.0));
        }
        self.node(child)?;
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::Cycle(child.0));
        }

        self.detach(child)?;
        let children = &mut self.node_mut(parent)?.children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Remove `node` (and its subtree) from its parent. No-op when already
    /// detached.
    pub fn detach(&mut self, node: NodeId) -> Result<(), DomError> {
        let Some(parent) = self.node(node)?.parent else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|child| *child != node);
        self.node_mut(node)?.parent = None;
        Ok(())
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id.0).and_then(|n| n.parent);
        }
        false
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(node.0).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Whether `node` is reachable from the document root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.is_inclusive_ancestor(self.root, node)
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Text(text) => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), DomError> {
        match &mut self.node_mut(node)?.data {
            NodeData::Text(current) => {
                *current = text.to_string();
                Ok(())
            }
            NodeData::Element { .. } => Err(DomError::NotAnElement(node.0)),
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        match &mut self.node_mut(node)?.data {
            NodeData::Element { attributes, .. } => {
                match attributes.iter_mut().find(|(key, _)| key == name) {
                    Some((_, current)) => *current = value.to_string(),
                    None => attributes.push((name.to_string(), value.to_string())),
                }
                Ok(())
            }
            NodeData::Text(_) => Err(DomError::NotAnElement(node.0)),
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            NodeData::Text(_) => None,
        }
    }

    /// Concatenated text of `node` and its descendants, in document order.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        let Some(n) = self.nodes.get(node.0) else {
            return;
        };
        match &n.data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element { .. } => {
                for child in &n.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// HTML-like serialization of `node`, used to compare document shapes.
    pub fn markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out);
        out
    }

    fn write_markup(&self, node: NodeId, out: &mut String) {
        let Some(n) = self.nodes.get(node.0) else {
            return;
        };
        match &n.data {
            NodeData::Text(text) => {
                for c in text.chars() {
                    match c {
                        '&' => out.push_str("&amp;"),
                        '<' => out.push_str("&lt;"),
                        '>' => out.push_str("&gt;"),
                        c => out.push(c),
                    }
                }
            }
            NodeData::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push_str(&format!(" {}=\"{}\"", name, value.replace('"', "&quot;")));
                }
                out.push('>');
                for child in &n.children {
                    self.write_markup(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    pub fn set_selection(&mut self, range: Option<TextRange>) {
        self.selection = range;
    }

    pub fn selection(&self) -> Option<TextRange> {
        self.selection
    }

    /// Text covered by `range`. Both boundaries must sit in attached text
    /// nodes, start before end in document order.
    pub fn range_text(&self, range: &TextRange) -> Option<String> {
        let start_text = self.text(range.start.node)?;
        let end_text = self.text(range.end.node)?;

        if range.start.node == range.end.node {
            if range.start.offset > range.end.offset {
                return None;
            }
            return char_slice(start_text, range.start.offset, range.end.offset).map(str::to_string);
        }

        let order = self.text_nodes_in_order();
        let first = order.iter().position(|n| *n == range.start.node)?;
        let last = order.iter().position(|n| *n == range.end.node)?;
        if first > last {
            return None;
        }

        let mut out = String::new();
        out.push_str(char_slice(start_text, range.start.offset, start_text.chars().count())?);
        for node in &order[first + 1..last] {
            out.push_str(self.text(*node).unwrap_or_default());
        }
        out.push_str(char_slice(end_text, 0, range.end.offset)?);
        Some(out)
    }

    /// Text of the current selection, empty when nothing is selected.
    pub fn selected_text(&self) -> String {
        self.selection
            .and_then(|range| self.range_text(&range))
            .unwrap_or_default()
    }

    fn text_nodes_in_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(n) = self.nodes.get(id.0) else {
                continue;
            };
            match n.data {
                NodeData::Text(_) => out.push(id),
                NodeData::Element { .. } => stack.extend(n.children.iter().rev()),
            }
        }
        out
    }

    /// Wrap the characters covered by `range` in a new `tag` element.
    ///
    /// The original text node keeps its identity and moves inside the
    /// marker; the text before and after the range becomes new sibling text
    /// nodes, created only when non-empty.
    pub fn wrap_range(
        &mut self,
        range: &TextRange,
        tag: &str,
        attributes: &[(&str, &str)],
    ) -> Result<Wrapped, HighlightError> {
        if range.start.node != range.end.node {
            return Err(HighlightError::SpansNodes);
        }
        let original = range.start.node;
        let text = self
            .node(original)
            .map_err(HighlightError::from)
            .and_then(|n| match &n.data {
                NodeData::Text(text) => Ok(text.clone()),
                NodeData::Element { .. } => Err(HighlightError::NotText),
            })?;
        let parent = match self.parent(original) {
            Some(parent) if self.is_attached(original) => parent,
            _ => return Err(HighlightError::Detached),
        };

        let (start, end) = (range.start.offset, range.end.offset);
        let len = text.chars().count();
        if start > end || end > len {
            return Err(HighlightError::OutOfBounds { start, end, len });
        }
        if start == end {
            return Err(HighlightError::Empty);
        }

        let before_text = char_slice(&text, 0, start).unwrap_or_default().to_string();
        let middle_text = char_slice(&text, start, end).unwrap_or_default().to_string();
        let after_text = char_slice(&text, end, len).unwrap_or_default().to_string();

        let index = self
            .children(parent)
            .iter()
            .position(|child| *child == original)
            .ok_or(HighlightError::Detached)?;

        let marker = self.create_element(tag);
        for (name, value) in attributes {
            self.set_attribute(marker, name, value)?;
        }
        self.insert_child(parent, index, marker)?;
        self.set_text(original, &middle_text)?;
        self.append_child(marker, original)?;

        let mut marker_index = index;
        let before = if before_text.is_empty() {
            None
        } else {
            let node = self.create_text(&before_text);
            self.insert_child(parent, index, node)?;
            marker_index += 1;
            Some(node)
        };
        let after = if after_text.is_empty() {
            None
        } else {
            let node = self.create_text(&after_text);
            self.insert_child(parent, marker_index + 1, node)?;
            Some(node)
        };

        Ok(Wrapped {
            marker,
            original,
            before,
            after,
        })
    }

    /// Replace the marker by its own text content, merged back into the
    /// original text node. Returns `false` when the marker is no longer in
    /// the document.
    pub fn unwrap_marker(&mut self, wrapped: &Wrapped) -> bool {
        let marker = wrapped.marker;
        let parent = match self.parent(marker) {
            Some(parent) if self.is_attached(marker) => parent,
            _ => return false,
        };

        let sibling_text = |doc: &Self, node: Option<NodeId>| -> String {
            node.filter(|n| doc.parent(*n) == Some(parent))
                .and_then(|n| doc.text(n))
                .unwrap_or_default()
                .to_string()
        };
        let restored = format!(
            "{}{}{}",
            sibling_text(self, wrapped.before),
            self.text_content(marker),
            sibling_text(self, wrapped.after),
        );

        let index = self
            .children(parent)
            .iter()
            .position(|child| *child == marker)
            .unwrap_or_default();

        let mut removed = Vec::new();
        let result = (|| -> Result<(), DomError> {
            for split in [wrapped.before, wrapped.after].into_iter().flatten() {
                if self.parent(split) == Some(parent) {
                    self.detach(split)?;
                    removed.push(split);
                }
            }
            let index = self
                .children(parent)
                .iter()
                .position(|child| *child == marker)
                .unwrap_or(index);
            self.detach(marker)?;
            self.set_text(wrapped.original, &restored)?;
            self.insert_child(parent, index, wrapped.original)
        })();

        match result {
            Ok(()) => {
                removed.push(marker);
                for node in removed {
                    self.release(node);
                }
            }
            Err(e) => tracing::debug!("Failed to restore highlighted text: {}", e),
        }
        true
    }
}

/// Slice `text` by character offsets.
fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    let byte_at = |offset: usize| -> Option<usize> {
        if offset == text.chars().count() {
            Some(text.len())
        } else {
            text.char_indices().nth(offset).map(|(i, _)| i)
        }
    };
    let (from, to) = (byte_at(start)?, byte_at(end)?);
    text.get(from..to)
}

/// Highlights ranges of a shared [`Document`] by wrapping them in a styled
/// marker element.
pub struct DomHighlighter {
    document: Arc<Mutex<Document>>,
    wrapped: Mutex<HashMap<HighlightToken, Wrapped>>,
    next_token: AtomicU64,
}

impl DomHighlighter {
    pub fn new(document: Arc<Mutex<Document>>) -> Self {
        Self {
            document,
            wrapped: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        }
    }

    /// Marker element of a live highlight.
    pub fn marker(&self, token: HighlightToken) -> Option<NodeId> {
        lock(&self.wrapped).get(&token).map(Wrapped::marker)
    }
}

impl Highlighter for DomHighlighter {
    fn apply(&self, range: &TextRange) -> Result<HighlightToken, HighlightError> {
        let wrapped = lock(&self.document).wrap_range(
            range,
            MARKER_TAG,
            &[("class", MARKER_CLASS), ("style", HIGHLIGHT_STYLE)],
        )?;
        let token = HighlightToken::new(self.next_token.fetch_add(1, Ordering::Relaxed) + 1);
        lock(&self.wrapped).insert(token, wrapped);
        Ok(token)
    }

    fn remove(&self, token: HighlightToken) {
        let Some(wrapped) = lock(&self.wrapped).remove(&token) else {
            return;
        };
        if !lock(&self.document).unwrap_marker(&wrapped) {
            tracing::debug!("Highlight marker {:?} already detached, skipping", wrapped.marker);
        }
    }
}

/// Reads the selection of a shared [`Document`].
pub struct DocumentSelector {
    document: Arc<Mutex<Document>>,
}

impl DocumentSelector {
    pub fn new(document: Arc<Mutex<Document>>) -> Self {
        Self { document }
    }
}

impl TextSelector for DocumentSelector {
    fn get_selection(&self) -> Result<Option<Selection>> {
        let document = lock(&self.document);
        let Some(range) = document.selection() else {
            return Ok(None);
        };
        let text = document
            .range_text(&range)
            .ok_or_else(|| anyhow::anyhow!("Selection boundaries are not in attached text nodes"))?;
        Ok(Some(Selection {
            text,
            range: Some(range),
        }))
    }

    fn is_supported(&self) -> bool {
        true
    }
}
