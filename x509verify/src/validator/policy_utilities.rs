//! Utility functions related to certificate policy processing. Functions, structures, etc. in this
//! file are pub(crate).
//!
//! The valid_policy_tree is backed by an arena, i.e., the `nodes` vector in [`ValidPolicyTree`].
//! Nodes refer to parents and children by index. Rows list the indices of the live nodes at each
//! depth; a node that is deleted is removed from its row and from its parent's list of children
//! but remains in the arena.

use std::collections::BTreeSet;

use const_oid::db::rfc5280::ANY_POLICY;
use der::asn1::ObjectIdentifier;

use crate::validator::policy_tree::{PolicyNode, ValidPolicyTree};

/// `add_node` appends a node to the arena, links it to `parent` and lists it in row `depth`. If
/// `parent` already has a child with the same valid_policy no node is added and the index of the
/// existing child is returned.
pub(crate) fn add_node(
    tree: &mut ValidPolicyTree,
    valid_policy: ObjectIdentifier,
    qualifier_set: Option<Vec<u8>>,
    expected_policy_set: BTreeSet<ObjectIdentifier>,
    depth: usize,
    cert_depth: usize,
    parent: Option<usize>,
) -> usize {
    if let Some(parent) = parent {
        if let Some(existing) = child_with_policy(tree, parent, &valid_policy) {
            return existing;
        }
    }

    let index = tree.nodes.len();
    tree.nodes.push(PolicyNode {
        valid_policy,
        qualifier_set,
        expected_policy_set,
        depth,
        cert_depth,
        parent,
        children: vec![],
    });
    if let Some(parent) = parent {
        tree.nodes[parent].children.push(index);
    }
    while tree.rows.len() <= depth {
        tree.rows.push(vec![]);
    }
    tree.rows[depth].push(index);
    index
}

/// `child_with_policy` returns the index of the child of `parent` whose valid_policy is `oid`
pub(crate) fn child_with_policy(
    tree: &ValidPolicyTree,
    parent: usize,
    oid: &ObjectIdentifier,
) -> Option<usize> {
    tree.nodes[parent]
        .children
        .iter()
        .find(|c| tree.nodes[**c].valid_policy == *oid)
        .copied()
}

/// `row_contains_policy` returns the index of the node in row `depth` whose valid_policy is `oid`
pub(crate) fn row_contains_policy(
    tree: &ValidPolicyTree,
    depth: usize,
    oid: &ObjectIdentifier,
) -> Option<usize> {
    tree.rows
        .get(depth)?
        .iter()
        .find(|i| tree.nodes[**i].valid_policy == *oid)
        .copied()
}

/// `delete_node` removes a node and its descendants from the tree
pub(crate) fn delete_node(tree: &mut ValidPolicyTree, index: usize) {
    let children = std::mem::take(&mut tree.nodes[index].children);
    for c in children {
        delete_node(tree, c);
    }
    if let Some(parent) = tree.nodes[index].parent {
        tree.nodes[parent].children.retain(|c| *c != index);
    }
    let depth = tree.nodes[index].depth;
    if let Some(row) = tree.rows.get_mut(depth) {
        row.retain(|i| *i != index);
    }
}

/// `prune_childless` deletes nodes of depth `max_depth` or less that have no children, repeating
/// until no such nodes remain. Rows are visited deepest first so removals cascade upward.
pub(crate) fn prune_childless(tree: &mut ValidPolicyTree, max_depth: usize) {
    let last = max_depth.min(tree.rows.len().saturating_sub(1));
    for depth in (0..=last).rev() {
        if depth >= tree.rows.len() {
            continue;
        }
        let childless: Vec<usize> = tree.rows[depth]
            .iter()
            .filter(|i| tree.nodes[**i].children.is_empty())
            .copied()
            .collect();
        for i in childless {
            delete_node(tree, i);
        }
    }
}

/// `harvest_valid_policy_node_set` collects the nodes whose parent has a valid_policy of
/// anyPolicy, descending from the root through anyPolicy nodes.
pub(crate) fn harvest_valid_policy_node_set(
    tree: &ValidPolicyTree,
    index: usize,
    valid_policy_node_set: &mut Vec<usize>,
) {
    let node = &tree.nodes[index];
    if node.valid_policy == ANY_POLICY {
        for c in &node.children {
            valid_policy_node_set.push(*c);
            harvest_valid_policy_node_set(tree, *c, valid_policy_node_set);
        }
    }
}

/// `is_live` returns true if the node at `index` is listed in its row
pub(crate) fn is_live(tree: &ValidPolicyTree, index: usize) -> bool {
    let depth = tree.nodes[index].depth;
    matches!(tree.rows.get(depth), Some(row) if row.contains(&index))
}
