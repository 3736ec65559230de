//! Indented listing of a valid policy tree

use std::io::Write;

use const_oid::ObjectIdentifier;

use crate::{util::pdv_utilities::oid_lookup, validator::policy_tree::*};

fn policy_name(oid: &ObjectIdentifier) -> String {
    oid_lookup(oid).unwrap_or_else(|_| oid.to_string())
}

fn print_node(out: &mut dyn Write, node: &PolicyNode, indent: usize) {
    let marker = if node.qualifier_set.is_some() {
        " (qualified)"
    } else {
        ""
    };
    let _ = writeln!(
        out,
        "{:indent$}Policy: {}{}",
        "",
        policy_name(&node.valid_policy),
        marker,
        indent = indent
    );
}

fn print_node_list(out: &mut dyn Write, tree: &ValidPolicyTree, label: &str, nodes: &[usize], indent: usize) {
    let _ = writeln!(out, "{:indent$}{}:", "", label, indent = indent);
    if nodes.is_empty() {
        let _ = writeln!(out, "{:indent$}<empty>", "", indent = indent + 2);
    }
    for node in nodes.iter().filter_map(|i| tree.node(*i)) {
        print_node(out, node, indent + 2);
    }
}

/// `print_policy_tree` writes the outcome of policy processing: whether an explicit policy was
/// required, the authority-constrained policy set and the user-constrained policy set. Write errors
/// are ignored.
pub fn print_policy_tree(tree: &ValidPolicyTree, out: &mut dyn Write, indent: usize) {
    let _ = writeln!(
        out,
        "{:indent$}Require explicit Policy: {}",
        "",
        if tree.require_explicit_policy {
            "True"
        } else {
            "False"
        },
        indent = indent
    );
    print_node_list(out, tree, "Authority Policies", &tree.authority_policies, indent);
    print_node_list(out, tree, "User Policies", &tree.user_policies, indent);
}

/// `print_policy_tree_rows` writes every row of the tree, one level per certificate, with each
/// node's expected policy set.
pub fn print_policy_tree_rows(tree: &ValidPolicyTree, out: &mut dyn Write, indent: usize) {
    if tree.is_null() {
        let _ = writeln!(out, "{:indent$}<NULL policy tree>", "", indent = indent);
        return;
    }
    for (depth, row) in tree.rows.iter().enumerate() {
        let _ = writeln!(out, "{:indent$}Level {}:", "", depth, indent = indent);
        for node in row.iter().filter_map(|i| tree.node(*i)) {
            print_node(out, node, indent + 2);
            let expected: Vec<String> = node.expected_policy_set.iter().map(policy_name).collect();
            let _ = writeln!(
                out,
                "{:indent$}Expected: {}",
                "",
                expected.join(", "),
                indent = indent + 4
            );
        }
    }
}
