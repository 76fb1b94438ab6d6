use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Bit span of a node, measured from the start of the top-level input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct BitRange {
    pub start: u64,
    pub len: u64,
}

impl BitRange {
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Zero-length ranges mark virtual nodes that consumed nothing.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, other: &BitRange) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }

    /// Byte span covering the range, rounding outwards.
    pub fn byte_span(&self) -> (u64, u64) {
        let first = self.start / 8;
        let last = self.end().div_ceil(8);
        (first, last - first)
    }
}

impl fmt::Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start % 8 == 0 && self.len % 8 == 0 {
            write!(f, "{:#x}+{}", self.start / 8, self.len / 8)
        } else {
            write!(f, "{:#x}.{}+{}b", self.start / 8, self.start % 8, self.len)
        }
    }
}

/// Index of a node inside its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Decoded value of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned { width: u32, value: u64 },
    Signed { width: u32, value: i64 },
    Float { width: u32, value: f64 },
    Bool(bool),
    Bytes(Vec<u8>),
    Utf8(String),
    /// Named fields in decode order. Names may repeat.
    Compound(Vec<NodeId>),
    Sequence(Vec<NodeId>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Unsigned { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Signed { value, .. } => Some(*value),
            Value::Unsigned { value, .. } => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        match self {
            Value::Compound(c) | Value::Sequence(c) => c,
            _ => &[],
        }
    }

    pub fn is_scope(&self) -> bool {
        matches!(self, Value::Compound(_) | Value::Sequence(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unsigned { .. } => "unsigned",
            Value::Signed { .. } => "signed",
            Value::Float { .. } => "float",
            Value::Bool(_) => "bool",
            Value::Bytes(_) => "bytes",
            Value::Utf8(_) => "utf8",
            Value::Compound(_) => "compound",
            Value::Sequence(_) => "sequence",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unsigned { value, .. } => write!(f, "{value} ({value:#x})"),
            Value::Signed { value, .. } => write!(f, "{value}"),
            Value::Float { value, .. } => write!(f, "{value}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Bytes(b) if b.len() > 16 => {
                write!(f, "{}... ({} bytes)", hex::encode(&b[..16]), b.len())
            }
            Value::Bytes(b) => write!(f, "{}", hex::encode(b)),
            Value::Utf8(s) => write!(f, "{s:?}"),
            Value::Compound(c) => write!(f, "{{{} fields}}", c.len()),
            Value::Sequence(c) => write!(f, "[{} items]", c.len()),
        }
    }
}

/// Shape of a format's root node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootShape {
    #[default]
    Compound,
    Sequence,
}

impl RootShape {
    pub(crate) fn empty(self) -> Value {
        match self {
            RootShape::Compound => Value::Compound(Vec::new()),
            RootShape::Sequence => Value::Sequence(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NodeData {
    pub(crate) name: String,
    pub(crate) value: Value,
    pub(crate) range: BitRange,
    pub(crate) format: Option<Arc<str>>,
}

/// Node store for one top-level decode.
///
/// Scopes are allocated when opened and appended to their parent only once
/// sealed, so truncating back to an earlier length drops a speculative
/// subtree without touching anything reachable from the root.
#[derive(Debug, Default)]
pub(crate) struct Arena {
    nodes: Vec<NodeData>,
}

impl Arena {
    pub(crate) fn alloc(
        &mut self,
        name: &str,
        value: Value,
        range: BitRange,
        format: Option<Arc<str>>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            name: name.to_string(),
            value,
            range,
            format,
        });
        id
    }

    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Value::Compound(c) | Value::Sequence(c) = &mut self.nodes[parent.index()].value {
            c.push(child);
        }
    }

    pub(crate) fn seal(&mut self, id: NodeId, range: BitRange) {
        self.nodes[id.index()].range = range;
    }

    pub(crate) fn range(&self, id: NodeId) -> BitRange {
        self.nodes[id.index()].range
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    pub(crate) fn into_tree(self, root: NodeId) -> Tree {
        Tree {
            nodes: self.nodes,
            root,
        }
    }
}

/// A decoded field tree. Read-only once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Tree {
    pub fn root(&self) -> NodeRef<'_> {
        self.node(self.root)
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by dotted path relative to the root, e.g.
    /// `nalu[1].nalu.nal_unit_type`. `name[i]` selects the i-th child with
    /// that name; a bare `[i]` selects by position.
    pub fn select(&self, path: &str) -> Option<NodeRef<'_>> {
        let mut cur = self.root();
        for seg in path.split('.').filter(|s| !s.is_empty()) {
            let (name, idx) = parse_segment(seg)?;
            cur = match (name, idx) {
                ("", Some(i)) => cur.child_at(i)?,
                (n, Some(i)) => cur.children_named(n).nth(i)?,
                (n, None) => cur.child(n)?,
            };
        }
        Some(cur)
    }
}

fn parse_segment(seg: &str) -> Option<(&str, Option<usize>)> {
    match seg.find('[') {
        Some(open) => {
            let close = seg.rfind(']')?;
            if close <= open {
                return None;
            }
            let idx = seg[open + 1..close].trim().parse().ok()?;
            Some((&seg[..open], Some(idx)))
        }
        None => Some((seg, None)),
    }
}

/// Borrowed handle to one node of a [`Tree`].
#[derive(Clone, Copy)]
pub struct NodeRef<'t> {
    tree: &'t Tree,
    id: NodeId,
}

impl<'t> NodeRef<'t> {
    fn data(&self) -> &'t NodeData {
        &self.tree.nodes[self.id.index()]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &'t str {
        &self.data().name
    }

    pub fn value(&self) -> &'t Value {
        &self.data().value
    }

    pub fn range(&self) -> BitRange {
        self.data().range
    }

    /// Name of the format whose root this node is, if any.
    pub fn format(&self) -> Option<&'t str> {
        self.data().format.as_deref()
    }

    pub fn len(&self) -> usize {
        self.value().children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'t>> + use<'t> {
        let tree = self.tree;
        self.value()
            .children()
            .iter()
            .map(move |&id| NodeRef { tree, id })
    }

    pub fn child_at(&self, index: usize) -> Option<NodeRef<'t>> {
        self.value()
            .children()
            .get(index)
            .map(|&id| NodeRef { tree: self.tree, id })
    }

    /// First child called `name`.
    pub fn child(&self, name: &str) -> Option<NodeRef<'t>> {
        self.children_named(name).next()
    }

    pub fn children_named<'n>(
        &self,
        name: &'n str,
    ) -> impl Iterator<Item = NodeRef<'t>> + use<'t, 'n> {
        self.children().filter(move |c| c.name() == name)
    }

    /// Ids of this node and every descendant, depth-first.
    pub fn descendants(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![self.id];
        while let Some(id) = stack.pop() {
            out.push(id);
            let kids = self.tree.nodes[id.index()].value.children();
            stack.extend(kids.iter().rev());
        }
        out
    }

    /// Structural equality ignoring bit positions: names, producing
    /// formats and values must match all the way down.
    pub fn values_eq(&self, other: &NodeRef<'_>) -> bool {
        if self.name() != other.name() || self.format() != other.format() {
            return false;
        }
        match (self.value(), other.value()) {
            (Value::Compound(a), Value::Compound(b)) | (Value::Sequence(a), Value::Sequence(b)) => {
                a.len() == b.len()
                    && self
                        .children()
                        .zip(other.children())
                        .all(|(x, y)| x.values_eq(&y))
            }
            (a, b) => !a.is_scope() && a == b,
        }
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("name", &self.name())
            .field("value", self.value())
            .field("range", &self.range())
            .field("format", &self.format())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tree {
        let mut a = Arena::default();
        let root = a.alloc("root", Value::Sequence(vec![]), BitRange::new(0, 24), None);
        for (i, v) in [1u64, 2, 3].into_iter().enumerate() {
            let rec = a.alloc("rec", Value::Compound(vec![]), BitRange::new(i as u64 * 8, 8), None);
            let f = a.alloc(
                "x",
                Value::Unsigned { width: 8, value: v },
                BitRange::new(i as u64 * 8, 8),
                None,
            );
            a.append_child(rec, f);
            a.append_child(root, rec);
        }
        a.into_tree(root)
    }

    #[test]
    fn bool_is_not_an_unsigned() {
        let v = Value::Bool(true);
        assert_eq!(v.as_u64(), None);
        assert_eq!(v.as_i64(), None);
        assert_eq!(v.as_bool(), Some(true));
    }

    #[test]
    fn select_by_path() {
        let t = sample();
        assert_eq!(t.select("rec[1].x").unwrap().value().as_u64(), Some(2));
        assert_eq!(t.select("[2].x").unwrap().value().as_u64(), Some(3));
        assert_eq!(t.select("rec.x").unwrap().value().as_u64(), Some(1));
        assert!(t.select("rec[5]").is_none());
        assert!(t.select("nope").is_none());
        assert_eq!(t.select("").unwrap().name(), "root");
    }

    #[test]
    fn descendants_depth_first() {
        let t = sample();
        let ids = t.root().descendants();
        assert_eq!(ids.len(), 7);
        assert_eq!(t.node(ids[1]).name(), "rec");
        assert_eq!(t.node(ids[2]).name(), "x");
    }

    #[test]
    fn values_eq_ignores_ranges() {
        let t = sample();
        let a = t.root().child_at(0).unwrap();
        let b = t.root().child_at(1).unwrap();
        assert!(!a.values_eq(&b));
        assert!(a.values_eq(&a));
    }

    #[test]
    fn range_display() {
        assert_eq!(BitRange::new(16, 8).to_string(), "0x2+1");
        assert_eq!(BitRange::new(17, 3).to_string(), "0x2.1+3b");
        assert_eq!(BitRange::new(3, 7).byte_span(), (0, 2));
    }
}
