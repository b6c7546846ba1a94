//! LZ-009: BLAKE3 hashing for node payloads and plans.

use super::types::{NodePayload, ProvisioningPlan, ResourceNode};
use std::collections::BTreeMap;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash ordered components, NUL-separated so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Hash of everything the emitter receives for a node: its payload and the
/// identifiers of externally provisioned dependencies.
pub fn hash_node(node: &ResourceNode) -> String {
    let mut components: Vec<String> = vec![node.kind.to_string()];
    match &node.payload {
        NodePayload::TransitGateway {
            name,
            asn,
            dns_support,
            vpn_ecmp_support,
            default_route_table_association,
            default_route_table_propagation,
            auto_accept_sharing_attachments,
        } => {
            components.push(name.clone());
            components.push(asn.to_string());
            for switch in [
                dns_support,
                vpn_ecmp_support,
                default_route_table_association,
                default_route_table_propagation,
                auto_accept_sharing_attachments,
            ] {
                components.push(switch.to_string());
            }
        }
        NodePayload::RouteTable {
            name,
            transit_gateway,
        } => {
            components.push(name.clone());
            components.push(transit_gateway.clone());
        }
        NodePayload::ResourceShare {
            name,
            principals,
            resources,
            allow_external_principals,
        } => {
            components.push(name.clone());
            components.push(principals.join(","));
            components.push(resources.join(","));
            components.push(allow_external_principals.to_string());
        }
    }
    for (name, id) in &node.external {
        components.push(format!("{}={}", name, id));
    }

    let refs: Vec<&str> = components.iter().map(String::as_str).collect();
    composite_hash(&refs)
}

/// Hash of the dependency identifiers handed to the emitter, `name=id` in name order.
pub fn hash_dependencies(dependencies: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = dependencies
        .iter()
        .map(|(name, id)| format!("{}={}", name, id))
        .collect();
    let refs: Vec<&str> = pairs.iter().map(String::as_str).collect();
    composite_hash(&refs)
}

/// Fingerprint of a whole plan: partitions, order, edges and payloads.
/// Identical inputs resolve to identical fingerprints.
pub fn plan_fingerprint(plan: &ProvisioningPlan) -> String {
    let mut hasher = blake3::Hasher::new();
    for partition in &plan.partitions {
        hasher.update(partition.partition.to_string().as_bytes());
        hasher.update(b"\n");
        for node in &partition.nodes {
            hasher.update(node.id.as_bytes());
            hasher.update(b"\0");
            hasher.update(hash_node(node).as_bytes());
            for dep in &node.depends_on {
                hasher.update(b"\0");
                hasher.update(dep.as_bytes());
            }
            hasher.update(b"\n");
        }
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}
