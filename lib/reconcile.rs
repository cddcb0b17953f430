//! Reconciler (spec §4.1).
//!
//! A pure function over an owned snapshot of the previous children and a
//! borrowed slice of the new VNodes, producing the new ordered child list
//! plus the reused/allocated/unmounted instance-id sets. `prev` is owned
//! (not borrowed from the committed arena) so [`crate::commit`] can build it
//! from a live traversal of `self.tree.nodes` without holding a borrow
//! across the mutation that follows — the teacher's own diff step (unseen
//! in this pack, referenced from `lib/vdom.rs`) is likewise a pure
//! comparison kept separate from tree mutation.

use std::collections::{HashMap, HashSet};

use crate::error::CoreError;
use crate::instance::{InstanceId, InstanceIdAllocator};
use crate::vnode::{VNode, VNodeKindTag};

/// A previously-committed child's identity, snapshotted out of the
/// committed arena: just enough to decide slot id and compatibility.
#[derive(Clone)]
pub struct PrevChild {
    pub instance_id: InstanceId,
    pub key: Option<String>,
    pub tag: VNodeKindTag,
    pub composite_id: Option<String>,
}

/// Whether a reconciled child's instance was carried over or freshly made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildTag {
    Reused,
    New,
}

/// One entry of the reconciler's new ordered child list.
pub struct ReconciledChild<'a> {
    pub tag: ChildTag,
    pub slot_id: String,
    pub vnode: &'a VNode,
    pub instance_id: InstanceId,
}

/// The reconciler's four disjoint outputs (spec §4.1 "Contract").
pub struct ReconcileOutput<'a> {
    pub children: Vec<ReconciledChild<'a>>,
    pub reused: HashSet<InstanceId>,
    pub allocated: HashSet<InstanceId>,
    pub unmounted: HashSet<InstanceId>,
}

fn slot_id_of(index: usize, key: &Option<String>) -> String {
    match key {
        Some(k) => format!("k:{k}"),
        None => format!("i:{index}"),
    }
}

/// "same `kind`; if either is a composite widget, the composite widget keys
/// must match exactly" (spec §4.1 "Slot identity").
fn compatible(prev: &PrevChild, next: &VNode) -> bool {
    if prev.tag != next.kind_tag() {
        return false;
    }
    match (&prev.composite_id, &next.composite) {
        (None, None) => true,
        (Some(a), Some(b)) => *a == b.component_id,
        _ => false,
    }
}

/// Returns the indices of the first pair of equal slot ids, if any.
fn find_duplicate(slot_ids: &[String]) -> Option<(usize, usize)> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for (i, id) in slot_ids.iter().enumerate() {
        if let Some(&first) = seen.get(id.as_str()) {
            return Some((first, i));
        }
        seen.insert(id.as_str(), i);
    }
    None
}

/// Reconciles `next` against `prev` under `parent`, allocating fresh
/// instance ids for unmatched new children via `alloc`.
pub fn reconcile<'a>(
    parent: InstanceId,
    prev: &[PrevChild],
    next: &'a [VNode],
    alloc: &mut InstanceIdAllocator,
) -> Result<ReconcileOutput<'a>, CoreError> {
    let prev_slots: Vec<String> = prev.iter().enumerate().map(|(i, c)| slot_id_of(i, &c.key)).collect();
    let next_slots: Vec<String> = next.iter().enumerate().map(|(i, v)| slot_id_of(i, &v.key)).collect();

    if let Some((a, b)) = find_duplicate(&prev_slots) {
        return Err(CoreError::DuplicateKey {
            parent,
            key: prev_slots[a].clone(),
            first_index: a,
            second_index: b,
        });
    }
    if let Some((a, b)) = find_duplicate(&next_slots) {
        return Err(CoreError::DuplicateKey {
            parent,
            key: next_slots[a].clone(),
            first_index: a,
            second_index: b,
        });
    }

    let any_keyed = prev.iter().any(|c| c.key.is_some()) || next.iter().any(|v| v.key.is_some());

    let mut children = Vec::with_capacity(next.len());
    let mut reused = HashSet::new();
    let mut allocated = HashSet::new();
    let mut unmounted = HashSet::new();

    if !any_keyed {
        // Fast path: match purely by position.
        for (i, vnode) in next.iter().enumerate() {
            if let Some(prev_child) = prev.get(i) {
                if compatible(prev_child, vnode) {
                    reused.insert(prev_child.instance_id);
                    children.push(ReconciledChild {
                        tag: ChildTag::Reused,
                        slot_id: next_slots[i].clone(),
                        vnode,
                        instance_id: prev_child.instance_id,
                    });
                    continue;
                }
                unmounted.insert(prev_child.instance_id);
            }
            let id = alloc.alloc();
            allocated.insert(id);
            children.push(ReconciledChild { tag: ChildTag::New, slot_id: next_slots[i].clone(), vnode, instance_id: id });
        }
        for prev_child in prev.iter().skip(next.len()) {
            unmounted.insert(prev_child.instance_id);
        }
    } else {
        // Keyed path: match by slot id.
        let mut by_slot: HashMap<&str, (usize, &PrevChild)> = HashMap::new();
        for (i, (slot, child)) in prev_slots.iter().zip(prev.iter()).enumerate() {
            by_slot.insert(slot.as_str(), (i, child));
        }
        let mut claimed = vec![false; prev.len()];

        for (i, vnode) in next.iter().enumerate() {
            let slot = next_slots[i].as_str();
            let matched = by_slot.get(slot).and_then(|&(pi, candidate)| {
                if !claimed[pi] && compatible(candidate, vnode) {
                    Some((pi, candidate.instance_id))
                } else {
                    None
                }
            });
            match matched {
                Some((pi, instance_id)) => {
                    claimed[pi] = true;
                    reused.insert(instance_id);
                    children.push(ReconciledChild {
                        tag: ChildTag::Reused,
                        slot_id: next_slots[i].clone(),
                        vnode,
                        instance_id,
                    });
                }
                None => {
                    let id = alloc.alloc();
                    allocated.insert(id);
                    children.push(ReconciledChild { tag: ChildTag::New, slot_id: next_slots[i].clone(), vnode, instance_id: id });
                }
            }
        }
        for (pi, claimed) in claimed.iter().enumerate() {
            if !claimed {
                unmounted.insert(prev[pi].instance_id);
            }
        }
    }

    Ok(ReconcileOutput { children, reused, allocated, unmounted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vnode::{BoxProps, VNode, VNodeKind};

    fn row() -> VNode {
        VNode::new(VNodeKind::Row(BoxProps::default()))
    }

    fn prev_of(id: InstanceId, vnode: &VNode) -> PrevChild {
        PrevChild {
            instance_id: id,
            key: vnode.key.clone(),
            tag: vnode.kind_tag(),
            composite_id: vnode.composite.as_ref().map(|m| m.component_id.clone()),
        }
    }

    #[test]
    fn fast_path_reuses_by_index() {
        let mut alloc = InstanceIdAllocator::new();
        let a = alloc.alloc();
        let b = alloc.alloc();
        let ra = row();
        let rb = row();
        let prev = [prev_of(a, &ra), prev_of(b, &rb)];
        let next = [row(), row(), row()];
        let out = reconcile(99, &prev, &next, &mut alloc).unwrap();
        assert_eq!(out.reused, HashSet::from([a, b]));
        assert_eq!(out.allocated.len(), 1);
        assert!(out.unmounted.is_empty());
    }

    #[test]
    fn keyed_path_reuses_across_reorder() {
        let mut alloc = InstanceIdAllocator::new();
        let a = alloc.alloc();
        let b = alloc.alloc();
        let ra = row().with_key("a");
        let rb = row().with_key("b");
        let prev = [prev_of(a, &ra), prev_of(b, &rb)];
        let next = [row().with_key("b"), row().with_key("a")];
        let out = reconcile(1, &prev, &next, &mut alloc).unwrap();
        assert_eq!(out.children[0].instance_id, b);
        assert_eq!(out.children[1].instance_id, a);
        assert!(out.unmounted.is_empty());
        assert!(out.allocated.is_empty());
    }

    #[test]
    fn duplicate_key_is_fatal() {
        let mut alloc = InstanceIdAllocator::new();
        let next = [row().with_key("x"), row().with_key("x")];
        let err = reconcile(7, &[], &next, &mut alloc).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { parent: 7, .. }));
    }

    #[test]
    fn incompatible_kind_unmounts_and_reallocates() {
        let mut alloc = InstanceIdAllocator::new();
        let a = alloc.alloc();
        let ra = row();
        let prev = [prev_of(a, &ra)];
        let next = [VNode::new(VNodeKind::Column(BoxProps::default()))];
        let out = reconcile(1, &prev, &next, &mut alloc).unwrap();
        assert!(out.unmounted.contains(&a));
        assert_eq!(out.allocated.len(), 1);
    }
}
