//! Commit (spec §2 "Commit", §3 "Runtime instance"): walks a new virtual
//! tree, applies reconciliation at every level, expands composite-widget
//! boundaries by invoking their `render` with fresh or carried-over hook
//! state, and records the committed runtime tree.
//!
//! Grounded in Design Notes §9 "Arenas for runtime trees": the committed
//! tree is a flat `HashMap<InstanceId, RuntimeNode>` arena with children
//! stored as `InstanceId` index vectors rather than owning pointers, the
//! way the teacher's `render_tree::RenderTree` (unseen in this pack, used
//! here only as a naming precedent) keeps focus/hover bookkeeping behind
//! `RefCell`-guarded lookups instead of an owned `Rc` tree.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::CoreResult;
use crate::instance::{Cleanup, InstanceId, InstanceIdAllocator, InstanceRegistry, PendingEffect};
use crate::reconcile::{self, ChildTag, PrevChild};
use crate::vnode::VNode;

/// One node of the committed runtime tree (spec §3 "Runtime instance").
pub struct RuntimeNode {
    /// The VNode that produced this instance on the most recent commit. For
    /// a composite instance this is the placeholder element (props only);
    /// its single child is the expanded render output.
    pub vnode: VNode,
    pub children: Vec<InstanceId>,
}

/// The arena of committed runtime instances, keyed by `InstanceId`.
#[derive(Default)]
pub struct CommittedTree {
    nodes: HashMap<InstanceId, RuntimeNode>,
    root: Option<InstanceId>,
}

impl CommittedTree {
    pub fn new() -> Self {
        Self { nodes: HashMap::new(), root: None }
    }

    pub fn root(&self) -> Option<InstanceId> {
        self.root
    }

    pub fn node(&self, id: InstanceId) -> Option<&RuntimeNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Disjoint instance-id sets touched by one commit, mirroring the
/// reconciler's contract at the whole-tree scale (spec §4.1).
pub struct CommitReport {
    pub reused: HashSet<InstanceId>,
    pub allocated: HashSet<InstanceId>,
    pub unmounted: HashSet<InstanceId>,
}

/// Owns the instance-id allocator, the hook/state registry, and the
/// committed tree across frames.
pub struct Runtime {
    pub registry: Rc<InstanceRegistry>,
    alloc: InstanceIdAllocator,
    tree: CommittedTree,
}

impl Runtime {
    pub fn new() -> Self {
        Self { registry: InstanceRegistry::new(), alloc: InstanceIdAllocator::new(), tree: CommittedTree::new() }
    }

    pub fn tree(&self) -> &CommittedTree {
        &self.tree
    }

    /// Commits a freshly produced root VNode against the previously
    /// committed tree. Recursively expands composite boundaries, reconciles
    /// children level by level, runs the post-commit effect/cleanup flush,
    /// and garbage-collects any registry state no longer referenced by the
    /// new tree (spec §4.2 "Garbage collection").
    pub fn commit(&mut self, root_vnode: VNode) -> CoreResult<CommitReport> {
        let mut reused = HashSet::new();
        let mut allocated = HashSet::new();
        let mut unmounted = HashSet::new();
        let mut effects: Vec<PendingEffect> = Vec::new();
        let mut cleanups: Vec<Cleanup> = Vec::new();

        let root_id = self.resolve_root_id(&root_vnode, &mut reused, &mut allocated, &mut unmounted);
        self.commit_subtree(root_id, root_vnode, &mut reused, &mut allocated, &mut unmounted, &mut effects, &mut cleanups)?;
        self.tree.root = Some(root_id);

        self.registry.flush(cleanups, effects);

        let mounted: HashSet<InstanceId> = self.tree.nodes.keys().copied().collect();
        self.registry.collect_garbage(&mounted);

        Ok(CommitReport { reused, allocated, unmounted })
    }

    /// Decides whether the previously committed root instance can be
    /// carried over (same kind, same composite identity if either is a
    /// composite widget), mirroring the reconciler's compatibility rule at
    /// the root, which has no sibling slot id of its own (spec §4.1).
    fn resolve_root_id(
        &mut self,
        root_vnode: &VNode,
        reused: &mut HashSet<InstanceId>,
        allocated: &mut HashSet<InstanceId>,
        unmounted: &mut HashSet<InstanceId>,
    ) -> InstanceId {
        let prev_root = self.tree.root;
        let compatible = prev_root
            .and_then(|id| self.tree.nodes.get(&id))
            .map(|prev| {
                prev.vnode.kind_tag() == root_vnode.kind_tag()
                    && match (&prev.vnode.composite, &root_vnode.composite) {
                        (None, None) => true,
                        (Some(a), Some(b)) => a.component_id == b.component_id,
                        _ => false,
                    }
            })
            .unwrap_or(false);

        if compatible {
            let id = prev_root.expect("compatible implies a previous root");
            reused.insert(id);
            id
        } else {
            if let Some(old_id) = prev_root {
                self.prune_subtree(old_id, unmounted);
            }
            let id = self.alloc.alloc();
            allocated.insert(id);
            id
        }
    }

    /// Expands `vnode` at `id` (calling into its composite, if any),
    /// reconciles its children against whatever was previously committed at
    /// `id`, recurses into each, and records the resulting node.
    fn commit_subtree(
        &mut self,
        id: InstanceId,
        vnode: VNode,
        reused: &mut HashSet<InstanceId>,
        allocated: &mut HashSet<InstanceId>,
        unmounted: &mut HashSet<InstanceId>,
        effects: &mut Vec<PendingEffect>,
        cleanups: &mut Vec<Cleanup>,
    ) -> CoreResult<()> {
        let mut node_vnode = vnode;
        let child_vnodes: Vec<VNode> = if let Some(marker) = node_vnode.composite.clone() {
            node_vnode.children = Vec::new();
            let cursor = InstanceRegistry::begin_render(&self.registry, id);
            let rendered = marker.composite.render(&cursor);
            cleanups.extend(cursor.pending_cleanups());
            effects.extend(cursor.end_render()?);
            vec![rendered]
        } else {
            std::mem::take(&mut node_vnode.children)
        };

        let prev_children: Vec<PrevChild> = self
            .tree
            .nodes
            .get(&id)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|&cid| self.tree.nodes.get(&cid).map(|c| (cid, c)))
                    .map(|(cid, c)| PrevChild {
                        instance_id: cid,
                        key: c.vnode.key.clone(),
                        tag: c.vnode.kind_tag(),
                        composite_id: c.vnode.composite.as_ref().map(|m| m.component_id.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let out = reconcile::reconcile(id, &prev_children, &child_vnodes, &mut self.alloc)?;

        let mut new_children = Vec::with_capacity(out.children.len());
        for rc in out.children {
            match rc.tag {
                ChildTag::Reused => {
                    reused.insert(rc.instance_id);
                }
                ChildTag::New => {
                    allocated.insert(rc.instance_id);
                }
            }
            let child_vnode = rc.vnode.clone();
            let child_id = rc.instance_id;
            self.commit_subtree(child_id, child_vnode, reused, allocated, unmounted, effects, cleanups)?;
            new_children.push(child_id);
        }
        for unmounted_id in out.unmounted {
            self.prune_subtree(unmounted_id, unmounted);
        }

        self.tree.nodes.insert(id, RuntimeNode { vnode: node_vnode, children: new_children });
        Ok(())
    }

    /// Removes `id` and every descendant from the committed arena,
    /// recording each in `unmounted`. Registry state is reclaimed
    /// separately by `collect_garbage` once the whole commit has settled.
    fn prune_subtree(&mut self, id: InstanceId, unmounted: &mut HashSet<InstanceId>) {
        if let Some(node) = self.tree.nodes.remove(&id) {
            unmounted.insert(id);
            for child in node.children {
                self.prune_subtree(child, unmounted);
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::RenderCursor;
    use crate::vnode::{BoxProps, Composite, TextProps, VNodeKind};
    use std::cell::Cell;

    fn row(children: Vec<VNode>) -> VNode {
        VNode::new(VNodeKind::Row(BoxProps::default())).with_children(children)
    }

    fn text(s: &str) -> VNode {
        VNode::new(VNodeKind::Text(TextProps { content: s.to_string(), ..Default::default() }))
    }

    #[test]
    fn first_commit_allocates_everything() {
        let mut rt = Runtime::new();
        let report = rt.commit(row(vec![text("a"), text("b")])).unwrap();
        assert_eq!(report.allocated.len(), 3);
        assert!(report.reused.is_empty());
        assert_eq!(rt.tree().len(), 3);
    }

    #[test]
    fn second_commit_with_same_shape_reuses_all() {
        let mut rt = Runtime::new();
        rt.commit(row(vec![text("a"), text("b")])).unwrap();
        let report = rt.commit(row(vec![text("a2"), text("b2")])).unwrap();
        assert_eq!(report.reused.len(), 3);
        assert!(report.allocated.is_empty());
        assert!(report.unmounted.is_empty());
    }

    #[test]
    fn shrinking_children_unmounts_the_rest() {
        let mut rt = Runtime::new();
        rt.commit(row(vec![text("a"), text("b"), text("c")])).unwrap();
        let report = rt.commit(row(vec![text("a")])).unwrap();
        assert_eq!(report.unmounted.len(), 2);
    }

    struct Counter {
        calls: Cell<u32>,
    }

    impl Composite for Counter {
        fn component_id(&self) -> &'static str {
            "commit_tests::Counter"
        }

        fn render(&self, cursor: &RenderCursor) -> VNode {
            let (value, setter) = cursor.use_state(|| 0i32).unwrap();
            self.calls.set(self.calls.get() + 1);
            let _ = setter;
            text(&format!("count={value}"))
        }
    }

    #[test]
    fn composite_hook_state_survives_reuse() {
        let mut rt = Runtime::new();
        let counter = Rc::new(Counter { calls: Cell::new(0) });
        let root: VNode = VNode::new(VNodeKind::Row(BoxProps::default())).with_composite(counter.clone());
        rt.commit(root.clone()).unwrap();
        rt.commit(root).unwrap();
        assert_eq!(counter.calls.get(), 2);
    }
}
