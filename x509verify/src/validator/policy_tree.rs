//! Policy tree-based certificate policy processing

use std::collections::{BTreeMap, BTreeSet};

use const_oid::db::rfc5280::ANY_POLICY;
use der::{asn1::ObjectIdentifier, Encode};
use log::debug;
use x509_cert::ext::pkix::certpolicy::PolicyInformation;

use crate::{
    util::error::*, util::pdv_utilities::*, validator::pdv_certificate::PDVCertificate,
    validator::policy_utilities::*,
};

/// `PolicyNode` is a node in the valid_policy_tree described in RFC 5280 section 6.1.2.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PolicyNode {
    /// Policy this node represents
    pub valid_policy: ObjectIdentifier,
    /// DER-encoded policy qualifiers associated with valid_policy, if any
    pub qualifier_set: Option<Vec<u8>>,
    /// Policies that would satisfy valid_policy in the next certificate
    pub expected_policy_set: BTreeSet<ObjectIdentifier>,
    /// Row of the tree containing the node. The root is at depth 0.
    pub depth: usize,
    /// Index in the chain (leaf is 0) of the certificate that produced the node
    pub cert_depth: usize,
    /// Index of the parent node, None for the root
    pub parent: Option<usize>,
    /// Indices of the child nodes
    pub children: Vec<usize>,
}

impl PolicyNode {
    /// Returns true if valid_policy is anyPolicy
    pub fn is_any_policy(&self) -> bool {
        self.valid_policy == ANY_POLICY
    }
}

/// `ValidPolicyTree` is the outcome of certificate policy processing.
///
/// Nodes are held in an arena and addressed by index. `rows[d]` lists the live nodes at depth
/// `d`. A NULL tree has no rows. Nodes deleted during processing remain in `nodes`, which allows
/// the authority policy set to be inspected after the user policy set has been computed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidPolicyTree {
    /// Every node created during processing
    pub nodes: Vec<PolicyNode>,
    /// Live nodes by depth
    pub rows: Vec<Vec<usize>>,
    /// valid_policy_node_set harvested at wrap-up, before intersection with the user policies
    pub authority_policies: Vec<usize>,
    /// Leaf row after intersection with the user policies
    pub user_policies: Vec<usize>,
    /// True when explicit_policy was 0 at the end of processing
    pub require_explicit_policy: bool,
}

impl ValidPolicyTree {
    /// Returns true if the tree is NULL
    pub fn is_null(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the live nodes at `depth`, or an empty slice
    pub fn row(&self, depth: usize) -> &[usize] {
        match self.rows.get(depth) {
            Some(row) => row.as_slice(),
            None => &[],
        }
    }

    /// Returns the node at `index`, if any
    pub fn node(&self, index: usize) -> Option<&PolicyNode> {
        self.nodes.get(index)
    }

    /// Policies of the authority-constrained policy node set
    pub fn authority_policy_set(&self) -> BTreeSet<ObjectIdentifier> {
        self.policy_set(&self.authority_policies)
    }

    /// Policies of the user-constrained policy node set
    pub fn user_policy_set(&self) -> BTreeSet<ObjectIdentifier> {
        self.policy_set(&self.user_policies)
    }

    fn policy_set(&self, indices: &[usize]) -> BTreeSet<ObjectIdentifier> {
        indices
            .iter()
            .filter_map(|i| self.nodes.get(*i))
            .map(|n| n.valid_policy)
            .collect()
    }

    fn make_null(&mut self) {
        self.rows.clear();
    }
}

/// `PolicyFailure` is returned by [`evaluate_policies`]. `depth` is the chain index of the
/// certificate being processed when the failure was detected (leaf is 0).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PolicyFailure {
    /// `NoValidPolicy` or `InvalidPolicyExtension`
    pub status: PathValidationStatus,
    /// Depth of the certificate that caused the failure
    pub depth: usize,
}

fn encode_qualifiers(pi: &PolicyInformation) -> Option<Vec<u8>> {
    pi.policy_qualifiers.as_ref().and_then(|q| q.to_der().ok())
}

/// `evaluate_policies` implements certificate policy processing per RFC 5280 sections 6.1.2
/// through 6.1.5.
///
/// `chain` is ordered leaf first. The last certificate is treated as the trust anchor and is
/// excluded from processing when self-issued; otherwise it is processed as certificate 1.
/// `user_policies` is the user-initial-policy-set, with anyPolicy indicating any policy is
/// acceptable. The three booleans are the initial-explicit-policy, initial-any-policy-inhibit and
/// initial-policy-mapping-inhibit inputs.
///
/// It references the following certificate extensions:
/// - certificatePolicies
/// - policyMappings
/// - policyConstraints
/// - inhibitAnyPolicy
pub fn evaluate_policies(
    chain: &[&PDVCertificate],
    user_policies: &BTreeSet<ObjectIdentifier>,
    explicit_policy_required: bool,
    inhibit_any_policy: bool,
    inhibit_policy_mapping: bool,
) -> core::result::Result<ValidPolicyTree, PolicyFailure> {
    let processed = match chain.last() {
        Some(anchor) if is_self_issued(&anchor.decoded_cert) => &chain[..chain.len() - 1],
        _ => chain,
    };
    let n = processed.len();
    let mut tree = ValidPolicyTree::default();
    if 0 == n {
        return Ok(tree);
    }

    // Initialize state variables (RFC 5280 6.1.2 d, e and f)
    let mut explicit_policy = if explicit_policy_required { 0 } else { n + 1 };
    let mut inhibit_any = if inhibit_any_policy { 0 } else { n + 1 };
    let mut policy_mapping = if inhibit_policy_mapping { 0 } else { n + 1 };

    // Create first node per 6.1.2.a
    add_node(
        &mut tree,
        ANY_POLICY,
        None,
        BTreeSet::from([ANY_POLICY]),
        0,
        n,
        None,
    );

    let user_any = user_policies.is_empty() || user_policies.contains(&ANY_POLICY);

    for i in 1..=n {
        let cert_depth = n - i;
        let cert = processed[cert_depth];
        let self_issued = is_self_issued(&cert.decoded_cert);
        let failure = |status| PolicyFailure {
            status,
            depth: cert_depth,
        };

        match cert.certificate_policies() {
            // (d) If the certificate policies extension is present in the certificate and the
            // valid_policy_tree is not NULL, process the policy information
            Some(cps) if !tree.is_null() => {
                let mut any_policy_qualifiers = None;
                let mut has_any_policy = false;

                // (1) For each policy P not equal to anyPolicy in the certificate policies extension
                for pi in &cps.0 {
                    let p = pi.policy_identifier;
                    if ANY_POLICY == p {
                        has_any_policy = true;
                        any_policy_qualifiers = encode_qualifiers(pi);
                        continue;
                    }

                    // (i) nodes of depth i-1 whose expected_policy_set contains P
                    let mut parents: Vec<usize> = tree
                        .row(i - 1)
                        .iter()
                        .filter(|idx| tree.nodes[**idx].expected_policy_set.contains(&p))
                        .copied()
                        .collect();

                    // (ii) if there was no match, the node of depth i-1 with anyPolicy
                    if parents.is_empty() {
                        if let Some(any) = row_contains_policy(&tree, i - 1, &ANY_POLICY) {
                            parents.push(any);
                        }
                    }

                    let qualifiers = encode_qualifiers(pi);
                    for parent in parents {
                        add_node(
                            &mut tree,
                            p,
                            qualifiers.clone(),
                            BTreeSet::from([p]),
                            i,
                            cert_depth,
                            Some(parent),
                        );
                    }
                }

                // (2) If the certificate policies extension includes anyPolicy and either
                // inhibit_anyPolicy is greater than 0 or i<n and the certificate is self-issued,
                // then for each node of depth i-1, for each value in the expected_policy_set
                // that does not appear in a child node, generate a child node.
                if has_any_policy && (inhibit_any > 0 || (i < n && self_issued)) {
                    for parent in tree.row(i - 1).to_vec() {
                        let expected: Vec<ObjectIdentifier> = tree.nodes[parent]
                            .expected_policy_set
                            .iter()
                            .copied()
                            .collect();
                        for ep in expected {
                            add_node(
                                &mut tree,
                                ep,
                                any_policy_qualifiers.clone(),
                                BTreeSet::from([ep]),
                                i,
                                cert_depth,
                                Some(parent),
                            );
                        }
                    }
                }

                // (3) If there is a node of depth i-1 or less without any child nodes, delete it.
                // Repeat until there are no such nodes.
                prune_childless(&mut tree, i - 1);
                if tree.row(i).is_empty() {
                    tree.make_null();
                }
            }
            // (e) If the certificate policies extension is not present, set the
            // valid_policy_tree to NULL.
            _ => {
                if !tree.is_null() {
                    debug!(
                        "Valid policy tree is NULL after processing certificate issued to {}",
                        name_to_string(cert.subject())
                    );
                }
                tree.make_null();
            }
        }

        // (f) Verify that either explicit_policy is greater than 0 or the valid_policy_tree is
        // not equal to NULL
        if 0 == explicit_policy && tree.is_null() {
            log_error_for_cert(cert, "no valid policy and explicit policy is required");
            return Err(failure(PathValidationStatus::NoValidPolicy));
        }

        if i != n {
            // 6.1.4 preparation for certificate i+1
            if let Some(pm) = cert.policy_mappings() {
                // (a) If a policy mappings extension is present, verify that the special value
                // anyPolicy does not appear as an issuerDomainPolicy or a subjectDomainPolicy.
                if pm.0.iter().any(|m| {
                    ANY_POLICY == m.issuer_domain_policy || ANY_POLICY == m.subject_domain_policy
                }) {
                    log_error_for_cert(cert, "anyPolicy appears in policy mappings extension");
                    return Err(failure(PathValidationStatus::InvalidPolicyExtension));
                }

                // (b) If a policy mappings extension is present, then for each issuerDomainPolicy
                // ID-P in the policy mappings extension:
                let mut mappings: BTreeMap<ObjectIdentifier, BTreeSet<ObjectIdentifier>> =
                    BTreeMap::new();
                for m in &pm.0 {
                    mappings
                        .entry(m.issuer_domain_policy)
                        .or_default()
                        .insert(m.subject_domain_policy);
                }

                if !tree.is_null() {
                    if policy_mapping > 0 {
                        // (1) If the policy_mapping variable is greater than 0, for each node of
                        // depth i with valid_policy ID-P, set expected_policy_set to the set of
                        // subjectDomainPolicy values ID-P maps to. If no node of depth i has
                        // valid_policy ID-P but there is a node of depth i with anyPolicy,
                        // generate a child of the anyPolicy node of depth i-1.
                        for (idp, sdps) in mappings {
                            let matching: Vec<usize> = tree
                                .row(i)
                                .iter()
                                .filter(|idx| tree.nodes[**idx].valid_policy == idp)
                                .copied()
                                .collect();
                            if !matching.is_empty() {
                                for m in matching {
                                    tree.nodes[m].expected_policy_set = sdps.clone();
                                }
                            } else if let Some(any) = row_contains_policy(&tree, i, &ANY_POLICY) {
                                let parent = row_contains_policy(&tree, i - 1, &ANY_POLICY)
                                    .or(tree.nodes[any].parent);
                                let qualifiers = tree.nodes[any].qualifier_set.clone();
                                add_node(&mut tree, idp, qualifiers, sdps, i, cert_depth, parent);
                            }
                        }
                    } else {
                        // (2) If the policy_mapping variable is equal to 0, delete each node of
                        // depth i with valid_policy ID-P, then prune childless nodes of depth
                        // i-1 or less.
                        for idp in mappings.keys() {
                            let matching: Vec<usize> = tree
                                .row(i)
                                .iter()
                                .filter(|idx| tree.nodes[**idx].valid_policy == *idp)
                                .copied()
                                .collect();
                            for m in matching {
                                delete_node(&mut tree, m);
                            }
                        }
                        prune_childless(&mut tree, i - 1);
                        if tree.row(i).is_empty() {
                            tree.make_null();
                        }
                    }
                }
            }

            // (h) If certificate i is not self-issued, decrement each non-zero counter
            if !self_issued {
                explicit_policy = explicit_policy.saturating_sub(1);
                policy_mapping = policy_mapping.saturating_sub(1);
                inhibit_any = inhibit_any.saturating_sub(1);
            }

            // (i) If a policy constraints extension is included in the certificate, lower
            // explicit_policy and policy_mapping as indicated
            if let Some(pc) = cert.policy_constraints() {
                if let Some(rep) = pc.require_explicit_policy {
                    explicit_policy = explicit_policy.min(rep as usize);
                }
                if let Some(ipm) = pc.inhibit_policy_mapping {
                    policy_mapping = policy_mapping.min(ipm as usize);
                }
            }

            // (j) If the inhibitAnyPolicy extension is included in the certificate, lower
            // inhibit_anyPolicy as indicated
            if let Some(skip_certs) = cert.inhibit_any_policy() {
                inhibit_any = inhibit_any.min(skip_certs as usize);
            }
        } else {
            // 6.1.5 wrap-up procedure

            // (a) If explicit_policy is not 0, decrement explicit_policy by 1.
            explicit_policy = explicit_policy.saturating_sub(1);

            // (b) If a policy constraints extension is included in the certificate and
            // requireExplicitPolicy is present and has a value of 0, set explicit_policy to 0.
            if let Some(pc) = cert.policy_constraints() {
                if Some(0) == pc.require_explicit_policy {
                    explicit_policy = 0;
                }
            }

            // (g) Calculate the intersection of the valid_policy_tree and the
            // user-initial-policy-set.
            if !tree.is_null() {
                let mut valid_policy_node_set = vec![];
                harvest_valid_policy_node_set(&tree, 0, &mut valid_policy_node_set);
                tree.authority_policies = valid_policy_node_set.clone();

                if !user_any {
                    // (ii) delete each node in the valid_policy_node_set whose valid_policy is
                    // not anyPolicy and not in the user-initial-policy-set
                    for index in &valid_policy_node_set {
                        let node = &tree.nodes[*index];
                        if is_live(&tree, *index)
                            && !node.is_any_policy()
                            && !user_policies.contains(&node.valid_policy)
                        {
                            delete_node(&mut tree, *index);
                        }
                    }

                    // (iii) if there is a node of depth n with anyPolicy, create a node for each
                    // user policy not represented in the valid_policy_node_set, then delete the
                    // anyPolicy node of depth n
                    if let Some(any) = row_contains_policy(&tree, n, &ANY_POLICY) {
                        let qualifiers = tree.nodes[any].qualifier_set.clone();
                        let parent = tree.nodes[any].parent;
                        for p in user_policies {
                            let present = valid_policy_node_set.iter().any(|v| {
                                is_live(&tree, *v) && tree.nodes[*v].valid_policy == *p
                            });
                            if !present {
                                add_node(
                                    &mut tree,
                                    *p,
                                    qualifiers.clone(),
                                    BTreeSet::from([*p]),
                                    n,
                                    cert_depth,
                                    parent,
                                );
                            }
                        }
                        delete_node(&mut tree, any);
                    }

                    // (iv) prune childless nodes of depth n-1 or less
                    prune_childless(&mut tree, n - 1);
                    if tree.row(n).is_empty() {
                        tree.make_null();
                    }
                }
                tree.user_policies = tree.row(n).to_vec();
            }

            tree.require_explicit_policy = 0 == explicit_policy;

            // Verify that either explicit_policy is greater than 0 or the intersection is not NULL
            if 0 == explicit_policy && tree.is_null() {
                log_error_for_cert(cert, "no acceptable policy and explicit policy is required");
                return Err(failure(PathValidationStatus::NoValidPolicy));
            }
        }
    }

    if tree.is_null() {
        debug!("Certificate policy processing yielded a NULL valid policy tree");
    } else {
        debug!(
            "Certificate policy processing yielded {} user policies",
            tree.user_policies.len()
        );
    }
    Ok(tree)
}
