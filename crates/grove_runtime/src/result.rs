//! The response under construction.
//!
//! Result nodes live in an arena and refer to their parent by index, so a
//! child never owns its parent. Hash nodes reserve their keys, in selection
//! order, when they are created; array nodes are sized to their list up
//! front. Every field writes into its own slot, so the response comes out in
//! selection order no matter in which order deferred values complete.

use crate::error::PathSegment;
use crate::value::{Json, Value};
use indexmap::IndexMap;

/// Index of a node in a [`ResultTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// The content of one response position.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Reserved, not yet written.
    Pending,
    Leaf(Json),
    Child(NodeId),
    /// Removed from the response.
    Skipped,
}

impl Slot {
    pub const NULL: Slot = Slot::Leaf(Json::Null);

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Leaf(Json::Null))
    }
}

#[derive(Debug)]
enum NodeKind {
    Hash(IndexMap<String, Slot>),
    Array(Vec<Slot>),
}

/// Where a node hangs in its parent.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub parent: NodeId,
    pub key: PathSegment,
    pub non_null: bool,
}

#[derive(Debug)]
struct ResultNode {
    kind: NodeKind,
    attachment: Option<Attachment>,
    dead: bool,
    type_name: String,
    object: Value,
    eager: bool,
}

/// An arena of result nodes. The first node is the root.
#[derive(Debug, Default)]
pub struct ResultTree {
    nodes: Vec<ResultNode>,
    root_nulled: bool,
}

impl ResultTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hash node with `keys` reserved, attached to its parent's slot.
    pub fn add_hash<'k>(
        &mut self,
        attachment: Option<Attachment>,
        type_name: &str,
        object: Value,
        keys: impl IntoIterator<Item = &'k str>,
    ) -> NodeId {
        let slots = keys
            .into_iter()
            .map(|key| (key.to_string(), Slot::Pending))
            .collect();
        self.push(NodeKind::Hash(slots), attachment, type_name, object)
    }

    /// Adds an array node with `len` pending items.
    pub fn add_array(
        &mut self,
        attachment: Option<Attachment>,
        type_name: &str,
        object: Value,
        len: usize,
    ) -> NodeId {
        self.push(NodeKind::Array(vec![Slot::Pending; len]), attachment, type_name, object)
    }

    fn push(
        &mut self,
        kind: NodeKind,
        attachment: Option<Attachment>,
        type_name: &str,
        object: Value,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        // Children of a dead node start dead.
        let dead = attachment
            .as_ref()
            .is_some_and(|a| self.nodes[a.parent.0].dead);
        self.nodes.push(ResultNode {
            kind,
            attachment: attachment.clone(),
            dead,
            type_name: type_name.to_string(),
            object,
            eager: false,
        });
        if let Some(Attachment {
            parent,
            key,
            non_null,
        }) = attachment
        {
            self.set_result(parent, &key, Slot::Child(id), non_null);
        }
        id
    }

    /// Adds reserved keys to a hash node, keeping existing ones in place.
    pub fn reserve<'k>(&mut self, node: NodeId, keys: impl IntoIterator<Item = &'k str>) {
        if let NodeKind::Hash(slots) = &mut self.nodes[node.0].kind {
            for key in keys {
                slots.entry(key.to_string()).or_insert(Slot::Pending);
            }
        }
    }

    /// Writes `slot` at `key` of `node`.
    ///
    /// A null written where `is_non_null` holds is not stored: it bubbles to
    /// the node's own slot in its parent, repeating while that slot is
    /// non-null too, and every node it passes through is marked dead. A null
    /// reaching the root nulls the whole response. Returns true when such an
    /// invalid null was accepted, so the caller can report it exactly once.
    /// Writes into dead nodes are discarded.
    pub fn set_result(
        &mut self,
        node: NodeId,
        key: &PathSegment,
        slot: Slot,
        is_non_null: bool,
    ) -> bool {
        if self.nodes[node.0].dead {
            return false;
        }
        if slot.is_null() && is_non_null {
            match self.nodes[node.0].attachment.clone() {
                None => self.root_nulled = true,
                Some(Attachment {
                    parent,
                    key,
                    non_null,
                }) => {
                    self.set_result(parent, &key, Slot::NULL, non_null);
                    self.mark_dead(node);
                }
            }
            return true;
        }
        match (&mut self.nodes[node.0].kind, key) {
            (NodeKind::Hash(slots), PathSegment::Field(name)) => {
                if let Some(existing) = slots.get_mut(name.as_str()) {
                    *existing = slot;
                } else {
                    slots.insert(name.clone(), slot);
                }
            }
            (NodeKind::Array(items), PathSegment::Index(index)) => {
                if *index >= items.len() {
                    items.resize(index + 1, Slot::Pending);
                }
                items[*index] = slot;
            }
            _ => {}
        }
        false
    }

    /// Marks a node and every node below it dead.
    pub fn mark_dead(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let entry = &mut self.nodes[id.0];
            entry.dead = true;
            let slots: Box<dyn Iterator<Item = &Slot>> = match &entry.kind {
                NodeKind::Hash(slots) => Box::new(slots.values()),
                NodeKind::Array(items) => Box::new(items.iter()),
            };
            stack.extend(slots.filter_map(|slot| match slot {
                Slot::Child(child) => Some(*child),
                _ => None,
            }));
        }
    }

    pub fn is_dead(&self, node: NodeId) -> bool {
        self.nodes[node.0].dead
    }

    /// True once a null has bubbled to the root.
    pub fn is_root_nulled(&self) -> bool {
        self.root_nulled
    }

    pub fn get(&self, node: NodeId, key: &PathSegment) -> Option<&Slot> {
        match (&self.nodes[node.0].kind, key) {
            (NodeKind::Hash(slots), PathSegment::Field(name)) => slots.get(name.as_str()),
            (NodeKind::Array(items), PathSegment::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].attachment.as_ref().map(|a| a.parent)
    }

    pub fn is_array(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Array(_))
    }

    /// The type the node was built for.
    pub fn type_name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].type_name
    }

    /// The application value the node was built for.
    pub fn object(&self, node: NodeId) -> &Value {
        &self.nodes[node.0].object
    }

    pub fn is_eager(&self, node: NodeId) -> bool {
        self.nodes[node.0].eager
    }

    pub fn set_eager(&mut self, node: NodeId, eager: bool) {
        self.nodes[node.0].eager = eager;
    }

    /// Number of nodes from `node` up to the root, inclusive. The root is at
    /// depth 1.
    pub fn depth(&self, node: NodeId) -> usize {
        let mut depth = 1;
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// The response path of `node`.
    pub fn path(&self, node: NodeId) -> Vec<PathSegment> {
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let attachment = self.nodes[id.0].attachment.as_ref();
            if let Some(attachment) = attachment {
                path.push(attachment.key.clone());
            }
            current = attachment.map(|a| a.parent);
        }
        path.reverse();
        path
    }

    /// The response path of `key` within `node`.
    pub fn path_to(&self, node: NodeId, key: &PathSegment) -> Vec<PathSegment> {
        let mut path = self.path(node);
        path.push(key.clone());
        path
    }

    /// Serializes the tree below `root`. `None` when a null reached the
    /// root.
    pub fn to_json(&self, root: NodeId) -> Option<Json> {
        (!self.root_nulled).then(|| self.node_json(root))
    }

    fn node_json(&self, node: NodeId) -> Json {
        match &self.nodes[node.0].kind {
            NodeKind::Hash(slots) => Json::Object(
                slots
                    .iter()
                    .filter_map(|(key, slot)| {
                        let value = match slot {
                            Slot::Pending | Slot::Skipped => return None,
                            Slot::Leaf(json) => json.clone(),
                            Slot::Child(child) => self.node_json(*child),
                        };
                        Some((key.clone(), value))
                    })
                    .collect(),
            ),
            NodeKind::Array(items) => Json::Array(
                items
                    .iter()
                    .filter_map(|slot| match slot {
                        Slot::Skipped => None,
                        Slot::Pending => Some(Json::Null),
                        Slot::Leaf(json) => Some(json.clone()),
                        Slot::Child(child) => Some(self.node_json(*child)),
                    })
                    .collect(),
            ),
        }
    }
}
