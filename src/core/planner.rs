//! LZ-012: Change planning — diff a provisioning plan against partition locks.

use super::hasher::hash_node;
use super::types::*;
use std::collections::{HashMap, HashSet};

/// Classify every node of the plan against the recorded partition state.
pub fn plan(plan: &ProvisioningPlan, locks: &HashMap<Partition, PartitionLock>) -> ChangeSet {
    let mut set = ChangeSet::default();

    for partition in &plan.partitions {
        let lock = locks.get(&partition.partition);
        let mut changed: HashSet<&str> = HashSet::new();
        for node in &partition.nodes {
            let mut action = determine_action(node, lock);
            // Dependents are re-emitted against the new identifiers
            if action == PlanAction::NoOp
                && node.depends_on.iter().any(|d| changed.contains(d.as_str()))
            {
                action = PlanAction::Update;
            }
            if action != PlanAction::NoOp {
                changed.insert(&node.id);
            }
            match action {
                PlanAction::Create => set.to_create += 1,
                PlanAction::Update => set.to_update += 1,
                PlanAction::NoOp => set.unchanged += 1,
            }
            set.changes.push(PlannedChange {
                node_id: node.id.clone(),
                partition: partition.partition.clone(),
                kind: node.kind,
                action,
                description: describe_action(node, action),
            });
        }
    }

    set
}

/// Action for one node given its partition's lock.
pub fn determine_action(node: &ResourceNode, lock: Option<&PartitionLock>) -> PlanAction {
    let Some(recorded) = lock.and_then(|l| l.nodes.get(&node.id)) else {
        return PlanAction::Create;
    };
    if recorded.status == NodeStatus::Converged && recorded.hash == hash_node(node) {
        PlanAction::NoOp
    } else {
        // Failed, unknown, or drifted from the declared payload
        PlanAction::Update
    }
}

/// Human-readable description of a planned action.
pub fn describe_action(node: &ResourceNode, action: PlanAction) -> String {
    match action {
        PlanAction::Create => match &node.payload {
            NodePayload::TransitGateway { asn, .. } => {
                format!("{}: create transit gateway (ASN {})", node.id, asn)
            }
            NodePayload::RouteTable {
                transit_gateway, ..
            } => format!("{}: create route table on {}", node.id, transit_gateway),
            NodePayload::ResourceShare {
                principals,
                resources,
                ..
            } => format!(
                "{}: share {} with {} principal(s)",
                node.id,
                resources.join(", "),
                principals.len()
            ),
        },
        PlanAction::Update => format!("{}: update (configuration changed)", node.id),
        PlanAction::NoOp => format!("{}: no changes", node.id),
    }
}
