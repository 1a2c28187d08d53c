// Panel layout domain model - recursive split-pane tree
//
// Every operation borrows the current tree and returns a new one, so a reader
// holding the old value never sees a half-applied change.
use super::telemetry::SeriesKey;
use std::fmt;

pub const DEFAULT_SPLIT_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PanelId(u64);

impl PanelId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panel-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub id: PanelId,
    selected_series: Vec<SeriesKey>,
}

impl Leaf {
    fn empty(id: PanelId) -> Self {
        Self {
            id,
            selected_series: Vec::new(),
        }
    }

    /// Series bound to this pane, in the order they were first assigned.
    pub fn selected_series(&self) -> &[SeriesKey] {
        &self.selected_series
    }

    pub fn shows(&self, key: &str) -> bool {
        self.selected_series.iter().any(|k| k == key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub id: PanelId,
    pub direction: SplitDirection,
    pub ratio: f64,
    pub first: Box<PanelNode>,
    pub second: Box<PanelNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelNode {
    Leaf(Leaf),
    Split(Split),
}

impl PanelNode {
    pub fn id(&self) -> PanelId {
        match self {
            PanelNode::Leaf(leaf) => leaf.id,
            PanelNode::Split(split) => split.id,
        }
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Leaf>) {
        match self {
            PanelNode::Leaf(leaf) => out.push(leaf),
            PanelNode::Split(split) => {
                split.first.collect_leaves(out);
                split.second.collect_leaves(out);
            }
        }
    }

    fn find_leaf(&self, id: PanelId) -> Option<&Leaf> {
        match self {
            PanelNode::Leaf(leaf) if leaf.id == id => Some(leaf),
            PanelNode::Leaf(_) => None,
            PanelNode::Split(split) => split
                .first
                .find_leaf(id)
                .or_else(|| split.second.find_leaf(id)),
        }
    }

    /// The slot holding the leaf `id`, so callers can replace the node in place.
    fn leaf_slot_mut(&mut self, id: PanelId) -> Option<&mut PanelNode> {
        if matches!(self, PanelNode::Leaf(leaf) if leaf.id == id) {
            return Some(self);
        }
        match self {
            PanelNode::Leaf(_) => None,
            PanelNode::Split(split) => {
                if let Some(slot) = split.first.leaf_slot_mut(id) {
                    return Some(slot);
                }
                split.second.leaf_slot_mut(id)
            }
        }
    }

    fn split_mut(&mut self, id: PanelId) -> Option<&mut Split> {
        match self {
            PanelNode::Leaf(_) => None,
            PanelNode::Split(split) => {
                if split.id == id {
                    return Some(split);
                }
                if let Some(found) = split.first.split_mut(id) {
                    return Some(found);
                }
                split.second.split_mut(id)
            }
        }
    }

    /// Drops the leaf `id`, collapsing any split left with a single child.
    /// Returns `None` when nothing remains of this subtree.
    fn without_leaf(self, id: PanelId) -> Option<PanelNode> {
        match self {
            PanelNode::Leaf(leaf) if leaf.id == id => None,
            PanelNode::Leaf(leaf) => Some(PanelNode::Leaf(leaf)),
            PanelNode::Split(split) => {
                let Split {
                    id: split_id,
                    direction,
                    ratio,
                    first,
                    second,
                } = split;
                match ((*first).without_leaf(id), (*second).without_leaf(id)) {
                    (Some(first), Some(second)) => Some(PanelNode::Split(Split {
                        id: split_id,
                        direction,
                        ratio,
                        first: Box::new(first),
                        second: Box::new(second),
                    })),
                    (Some(only), None) | (None, Some(only)) => Some(only),
                    (None, None) => None,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelTree {
    root: PanelNode,
    next_id: u64,
}

impl PanelTree {
    pub fn new() -> Self {
        Self {
            root: PanelNode::Leaf(Leaf::empty(PanelId(0))),
            next_id: 1,
        }
    }

    fn allocate(&mut self) -> PanelId {
        let id = PanelId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn root(&self) -> &PanelNode {
        &self.root
    }

    /// Leaves in depth-first, first-child-first order.
    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut out = Vec::new();
        self.root.collect_leaves(&mut out);
        out
    }

    pub fn leaf(&self, id: PanelId) -> Option<&Leaf> {
        self.root.find_leaf(id)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Closing is offered only while another pane would remain.
    pub fn can_close(&self, id: PanelId) -> bool {
        self.leaf(id).is_some() && self.leaf_count() > 1
    }

    pub fn split(&self, leaf_id: PanelId, direction: SplitDirection) -> Self {
        let mut next = self.clone();
        let split_id = next.allocate();
        let sibling_id = next.allocate();
        let Some(slot) = next.root.leaf_slot_mut(leaf_id) else {
            return self.clone();
        };
        let displaced = std::mem::replace(slot, PanelNode::Leaf(Leaf::empty(sibling_id)));
        *slot = PanelNode::Split(Split {
            id: split_id,
            direction,
            ratio: DEFAULT_SPLIT_RATIO,
            first: Box::new(displaced),
            second: Box::new(PanelNode::Leaf(Leaf::empty(sibling_id))),
        });
        next
    }

    pub fn close(&self, leaf_id: PanelId) -> Self {
        if self.leaf(leaf_id).is_none() {
            return self.clone();
        }
        let mut next = self.clone();
        let root = std::mem::replace(&mut next.root, PanelNode::Leaf(Leaf::empty(leaf_id)));
        match root.without_leaf(leaf_id) {
            Some(remaining) => next.root = remaining,
            None => {
                let fresh = next.allocate();
                next.root = PanelNode::Leaf(Leaf::empty(fresh));
            }
        }
        next
    }

    pub fn assign_series(&self, leaf_id: PanelId, key: &str) -> Self {
        self.with_leaf(leaf_id, |leaf| {
            if !leaf.shows(key) {
                leaf.selected_series.push(key.to_string());
            }
        })
    }

    pub fn unassign_series(&self, leaf_id: PanelId, key: &str) -> Self {
        self.with_leaf(leaf_id, |leaf| leaf.selected_series.retain(|k| k != key))
    }

    /// Resizes a split. Ratios outside the open interval (0, 1) are ignored.
    pub fn set_ratio(&self, split_id: PanelId, ratio: f64) -> Self {
        if !(ratio.is_finite() && ratio > 0.0 && ratio < 1.0) {
            return self.clone();
        }
        let mut next = self.clone();
        let Some(split) = next.root.split_mut(split_id) else {
            return self.clone();
        };
        split.ratio = ratio;
        next
    }

    fn with_leaf(&self, leaf_id: PanelId, edit: impl FnOnce(&mut Leaf)) -> Self {
        let mut next = self.clone();
        let Some(PanelNode::Leaf(leaf)) = next.root.leaf_slot_mut(leaf_id) else {
            return self.clone();
        };
        edit(leaf);
        next
    }
}

impl Default for PanelTree {
    fn default() -> Self {
        Self::new()
    }
}
