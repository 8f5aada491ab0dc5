//! Before/after snapshot tree with LCA-based jump navigation: a flat
//! `Vec<UndoNode>` arena indexed by `NodeId`, the same arena-plus-stable-id
//! shape territories and guilds use for their own name-keyed cross-references.

use serde::{Deserialize, Serialize};

use crate::core::error::{CoreError, CoreResult};
use crate::core::options::TerritoryOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

#[derive(Serialize, Deserialize)]
struct UndoNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    active_child: Option<NodeId>,
    /// `None` only for the root ("Initial State").
    territory: Option<String>,
    before: Option<TerritoryOptions>,
    after: Option<TerritoryOptions>,
    description: String,
    timestamp_unix_secs: u64,
}

/// An edit in flight between `start_edit` and `end_edit`, guarding against
/// overlapping edits the same way a single mutable borrow would.
struct PendingEdit {
    territory: String,
    before: TerritoryOptions,
}

#[derive(Serialize, Deserialize)]
pub struct UndoTree {
    nodes: Vec<UndoNode>,
    current: NodeId,
    #[serde(skip)]
    pending: Option<PendingEdit>,
    #[serde(skip)]
    busy: bool,
}

impl UndoTree {
    pub fn new() -> Self {
        let root = UndoNode {
            parent: None,
            children: Vec::new(),
            active_child: None,
            territory: None,
            before: None,
            after: None,
            description: "Initial State".to_string(),
            timestamp_unix_secs: 0,
        };
        Self {
            nodes: vec![root],
            current: NodeId(0),
            pending: None,
            busy: false,
        }
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    fn enter(&mut self) -> CoreResult<()> {
        if self.busy {
            return Err(CoreError::Busy);
        }
        self.busy = true;
        Ok(())
    }

    fn exit(&mut self) {
        self.busy = false;
    }

    /// Captures the before-snapshot.
    pub fn start_edit(&mut self, territory: &str, before: TerritoryOptions) -> CoreResult<()> {
        self.enter()?;
        if self.pending.is_some() {
            self.exit();
            return Err(CoreError::Busy);
        }
        self.pending = Some(PendingEdit {
            territory: territory.to_string(),
            before,
        });
        self.exit();
        Ok(())
    }

    /// Captures the after-snapshot and, if the diff is non-empty, appends a
    /// new child beneath `current`, deactivating former siblings. Returns
    /// the new node id, or `None` if the edit was a no-op.
    pub fn end_edit(
        &mut self,
        territory: &str,
        after: TerritoryOptions,
        description: impl Into<String>,
        now_unix_secs: u64,
    ) -> CoreResult<Option<NodeId>> {
        self.enter()?;
        let pending = match self.pending.take() {
            Some(p) if p.territory == territory => p,
            Some(other) => {
                self.pending = Some(other);
                self.exit();
                return Err(CoreError::NotFound(territory.to_string()));
            }
            None => {
                self.exit();
                return Err(CoreError::NotFound(territory.to_string()));
            }
        };

        if pending.before == after {
            self.exit();
            return Ok(None);
        }

        let new_id = NodeId(self.nodes.len());
        self.nodes.push(UndoNode {
            parent: Some(self.current),
            children: Vec::new(),
            active_child: None,
            territory: Some(territory.to_string()),
            before: Some(pending.before),
            after: Some(after),
            description: description.into(),
            timestamp_unix_secs: now_unix_secs,
        });

        let parent = self.current;
        self.nodes[parent.0].children.push(new_id);
        self.nodes[parent.0].active_child = Some(new_id);
        self.current = new_id;
        self.exit();
        Ok(Some(new_id))
    }

    /// Applies the current node's before-snapshot and moves `current` to its
    /// parent. Returns `(territory, options_to_apply)`, or `None` at root.
    pub fn undo(&mut self) -> CoreResult<Option<(String, TerritoryOptions)>> {
        self.enter()?;
        let node = &self.nodes[self.current.0];
        let Some(parent) = node.parent else {
            self.exit();
            return Ok(None);
        };
        let territory = node.territory.clone().expect("non-root node always has a territory");
        let before = node.before.clone().expect("non-root node always has a before snapshot");
        self.current = parent;
        self.exit();
        Ok(Some((territory, before)))
    }

    /// Applies the active child's after-snapshot and moves `current` there.
    /// Returns `None` if there is no active child to redo into.
    pub fn redo(&mut self) -> CoreResult<Option<(String, TerritoryOptions)>> {
        self.enter()?;
        let Some(active_child) = self.nodes[self.current.0].active_child else {
            self.exit();
            return Ok(None);
        };
        let child = &self.nodes[active_child.0];
        let territory = child.territory.clone().expect("non-root node always has a territory");
        let after = child.after.clone().expect("non-root node always has an after snapshot");
        self.current = active_child;
        self.exit();
        Ok(Some((territory, after)))
    }

    fn ancestors(&self, mut node: NodeId) -> Vec<NodeId> {
        let mut path = vec![node];
        while let Some(parent) = self.nodes[node.0].parent {
            path.push(parent);
            node = parent;
        }
        path
    }

    fn lowest_common_ancestor(&self, a: NodeId, b: NodeId) -> NodeId {
        let ancestors_a: Vec<NodeId> = self.ancestors(a);
        let ancestors_b: std::collections::HashSet<usize> = self.ancestors(b).iter().map(|n| n.0).collect();
        for candidate in ancestors_a {
            if ancestors_b.contains(&candidate.0) {
                return candidate;
            }
        }
        NodeId(0)
    }

    /// Computes the LCA of `current` and `target`, applies `before`
    /// snapshots while ascending to it, then `after` snapshots while
    /// descending to `target`, marking the descent path active. Returns the
    /// ordered list of `(territory, options)` the caller must apply in
    /// sequence.
    pub fn jump(&mut self, target: NodeId) -> CoreResult<Vec<(String, TerritoryOptions)>> {
        self.enter()?;
        if target.0 >= self.nodes.len() {
            self.exit();
            return Err(CoreError::NotFound(format!("undo node {}", target.0)));
        }

        let lca = self.lowest_common_ancestor(self.current, target);
        let mut applies = Vec::new();

        // Ascend current -> lca, applying `before` snapshots.
        let mut cursor = self.current;
        while cursor != lca {
            let node = &self.nodes[cursor.0];
            let territory = node.territory.clone().expect("ascending node has a territory");
            let before = node.before.clone().expect("ascending node has a before snapshot");
            applies.push((territory, before));
            cursor = node.parent.expect("ascent terminates at lca before reaching root's parent");
        }

        // Descend lca -> target, applying `after` snapshots and marking the
        // path active as we go.
        let mut descent_path = Vec::new();
        let mut cursor = target;
        while cursor != lca {
            descent_path.push(cursor);
            cursor = self.nodes[cursor.0].parent.expect("descent terminates at lca before reaching root's parent");
        }
        descent_path.reverse();

        let mut parent_cursor = lca;
        for &node_id in &descent_path {
            self.nodes[parent_cursor.0].active_child = Some(node_id);
            let node = &self.nodes[node_id.0];
            let territory = node.territory.clone().expect("descending node has a territory");
            let after = node.after.clone().expect("descending node has an after snapshot");
            applies.push((territory, after));
            parent_cursor = node_id;
        }

        self.current = target;
        self.exit();
        Ok(applies)
    }
}

impl Default for UndoTree {
    fn default() -> Self {
        Self::new()
    }
}

impl bevy_ecs::prelude::Resource for UndoTree {}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(damage: u8) -> TerritoryOptions {
        TerritoryOptions {
            upgrades: crate::core::options::UpgradeLevels {
                damage,
                ..Default::default()
            },
            ..TerritoryOptions::default()
        }
    }

    #[test]
    fn no_op_edit_creates_no_node() {
        let mut tree = UndoTree::new();
        tree.start_edit("A", opts(0)).unwrap();
        let result = tree.end_edit("A", opts(0), "no change", 0).unwrap();
        assert!(result.is_none());
        assert_eq!(tree.current(), NodeId(0));
    }

    #[test]
    fn undo_then_redo_restores_state() {
        let mut tree = UndoTree::new();
        tree.start_edit("A", opts(0)).unwrap();
        let node = tree.end_edit("A", opts(5), "damage 0->5", 1).unwrap().unwrap();
        assert_eq!(tree.current(), node);

        let (territory, restored) = tree.undo().unwrap().unwrap();
        assert_eq!(territory, "A");
        assert_eq!(restored.upgrades.damage, 0);
        assert_eq!(tree.current(), NodeId(0));

        let (territory, restored) = tree.redo().unwrap().unwrap();
        assert_eq!(territory, "A");
        assert_eq!(restored.upgrades.damage, 5);
    }

    #[test]
    fn branching_and_jump_matches_scenario_five() {
        let mut tree = UndoTree::new();
        tree.start_edit("A", opts(0)).unwrap();
        let branch_a = tree.end_edit("A", opts(5), "A 0->5", 1).unwrap().unwrap();

        tree.start_edit("B", opts(0)).unwrap();
        tree.end_edit("B", opts(3), "B 0->3", 3).unwrap().unwrap();

        tree.undo().unwrap();
        tree.undo().unwrap();
        assert_eq!(tree.current(), NodeId(0));

        tree.start_edit("A", opts(0)).unwrap();
        let branch_b = tree.end_edit("A", opts(7), "A 0->7", 5).unwrap().unwrap();
        assert_eq!(tree.current(), branch_b);

        let applied = tree.jump(branch_a).unwrap();
        assert_eq!(applied.last().unwrap().1.upgrades.damage, 5);

        let applied_back = tree.jump(branch_b).unwrap();
        assert_eq!(applied_back.last().unwrap().1.upgrades.damage, 7);
    }

    #[test]
    fn busy_rejects_concurrent_start_edit() {
        let mut tree = UndoTree::new();
        tree.start_edit("A", opts(0)).unwrap();
        assert!(matches!(tree.start_edit("B", opts(0)), Err(CoreError::Busy)));
    }
}
