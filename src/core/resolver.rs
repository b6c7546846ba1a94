//! LZ-008: Dependency resolution and plan construction.
//!
//! Flattens the network configuration into declarations, expands each
//! declaration's deployment targets into (account, region) partitions, creates
//! one node per declaration and partition, wires dependency edges inside each
//! partition, and orders every partition with Kahn's algorithm. Ties break by
//! declaration order so identical inputs always produce identical plans.

use super::error::PlanError;
use super::index::{ReferenceIndex, ResourceRef};
use super::parser::{implicit_share_name, route_table_name};
use super::types::*;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};

/// A declared resource before target expansion.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub kind: ResourceKind,

    /// Logical name, unique across the configuration
    pub name: String,

    pub targets: DeploymentTargets,

    /// Sharing principals, resolved into the payload
    pub principals: Option<ShareTargets>,

    /// Logical names this declaration depends on
    pub references: Vec<String>,

    pub payload: NodePayload,
    pub parameter: Option<String>,
}

/// Plan plus the declarations and partitions that were excluded from it.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub plan: ProvisioningPlan,
    pub errors: Vec<PlanError>,
}

/// Flatten the network configuration into declarations, in source order.
pub fn declarations(config: &AcceleratorConfig) -> Vec<Declaration> {
    let mut out = Vec::new();

    for tgw in &config.network.transit_gateways {
        out.push(Declaration {
            kind: ResourceKind::TransitGateway,
            name: tgw.name.clone(),
            targets: tgw.deployment_targets.clone(),
            principals: None,
            references: tgw.depends_on.clone(),
            payload: NodePayload::TransitGateway {
                name: tgw.name.clone(),
                asn: tgw.asn,
                dns_support: tgw.dns_support,
                vpn_ecmp_support: tgw.vpn_ecmp_support,
                default_route_table_association: tgw.default_route_table_association,
                default_route_table_propagation: tgw.default_route_table_propagation,
                auto_accept_sharing_attachments: tgw.auto_accept_sharing_attachments,
            },
            parameter: Some(format!(
                "/accelerator/network/transitGateways/{}/id",
                tgw.name
            )),
        });

        for rt in &tgw.route_tables {
            out.push(Declaration {
                kind: ResourceKind::TransitGatewayRouteTable,
                name: route_table_name(&tgw.name, &rt.name),
                targets: tgw.deployment_targets.clone(),
                principals: None,
                references: vec![tgw.name.clone()],
                payload: NodePayload::RouteTable {
                    name: rt.name.clone(),
                    transit_gateway: tgw.name.clone(),
                },
                parameter: Some(format!(
                    "/accelerator/network/transitGateways/{}/routeTables/{}/id",
                    tgw.name, rt.name
                )),
            });
        }

        if let Some(share_targets) = &tgw.share_targets {
            let name = implicit_share_name(&tgw.name);
            out.push(Declaration {
                kind: ResourceKind::ResourceShare,
                name: name.clone(),
                targets: tgw.deployment_targets.clone(),
                principals: Some(share_targets.clone()),
                references: vec![tgw.name.clone()],
                payload: NodePayload::ResourceShare {
                    name: name.clone(),
                    principals: Vec::new(),
                    resources: vec![tgw.name.clone()],
                    allow_external_principals: false,
                },
                parameter: Some(format!("/accelerator/network/resourceShares/{}/arn", name)),
            });
        }
    }

    for share in &config.network.resource_shares {
        let mut references = share.resources.clone();
        for dep in &share.depends_on {
            if !references.contains(dep) {
                references.push(dep.clone());
            }
        }
        out.push(Declaration {
            kind: ResourceKind::ResourceShare,
            name: share.name.clone(),
            targets: share.deployment_targets.clone(),
            principals: Some(share.share_targets.clone()),
            references,
            payload: NodePayload::ResourceShare {
                name: share.name.clone(),
                principals: Vec::new(),
                resources: share.resources.clone(),
                allow_external_principals: share.allow_external_principals,
            },
            parameter: Some(format!(
                "/accelerator/network/resourceShares/{}/arn",
                share.name
            )),
        });
    }

    out
}

/// Expand a deployment target into partitions.
///
/// Accounts listed directly and accounts under listed OUs, minus excluded
/// accounts, crossed with the target regions (or every enabled region) minus
/// excluded regions, restricted to each account's enabled regions.
pub fn expand_targets(
    targets: &DeploymentTargets,
    index: &ReferenceIndex,
    enabled_regions: &[String],
) -> Result<Vec<Partition>, Vec<Symbol>> {
    let mut missing = Vec::new();
    let mut accounts: BTreeSet<&str> = BTreeSet::new();

    for ou in &targets.organizational_units {
        match index.organizational_unit(ou) {
            Some(record) => accounts.extend(record.accounts.iter().map(String::as_str)),
            None => missing.push(Symbol::OrganizationalUnit(ou.clone())),
        }
    }
    for account in &targets.accounts {
        match index.account(account) {
            Some(id) => {
                accounts.insert(id);
            }
            None => missing.push(Symbol::Account(account.clone())),
        }
    }
    for excluded in &targets.excluded_accounts {
        match index.account(excluded) {
            Some(id) => {
                accounts.remove(id);
            }
            None => missing.push(Symbol::Account(excluded.clone())),
        }
    }
    if !missing.is_empty() {
        return Err(missing);
    }

    let regions: Vec<&String> = targets
        .regions
        .as_deref()
        .unwrap_or(enabled_regions)
        .iter()
        .filter(|r| !targets.excluded_regions.contains(r))
        .collect();

    let mut partitions = BTreeSet::new();
    for account in accounts {
        let allowed = index.regions_for(account);
        for region in &regions {
            if allowed.is_none_or(|a| a.contains(region)) {
                partitions.insert(Partition::new(account, region.as_str()));
            }
        }
    }
    Ok(partitions.into_iter().collect())
}

/// Resolve sharing principals: OU ARNs first, then account IDs.
pub fn resolve_principals(
    share: &ShareTargets,
    index: &ReferenceIndex,
) -> Result<Vec<String>, Vec<Symbol>> {
    let mut missing = Vec::new();
    let mut principals: Vec<String> = Vec::new();
    let mut push = |p: &str| {
        if !principals.iter().any(|existing| existing == p) {
            principals.push(p.to_string());
        }
    };

    for ou in &share.organizational_units {
        match index.organizational_unit(ou) {
            Some(record) => push(&record.arn),
            None => missing.push(Symbol::OrganizationalUnit(ou.clone())),
        }
    }
    for account in &share.accounts {
        match index.account(account) {
            Some(id) => push(id),
            None => missing.push(Symbol::Account(account.clone())),
        }
    }

    if missing.is_empty() {
        Ok(principals)
    } else {
        Err(missing)
    }
}

/// A node awaiting edge construction.
struct Pending {
    node: ResourceNode,
    references: Vec<String>,
}

/// Resolve the plan, failing if anything was excluded.
pub fn resolve(
    config: &ValidatedConfig,
    index: &ReferenceIndex,
) -> Result<ProvisioningPlan, Vec<PlanError>> {
    let resolution = resolve_partial(config, index);
    if resolution.errors.is_empty() {
        Ok(resolution.plan)
    } else {
        Err(resolution.errors)
    }
}

/// Resolve every independently resolvable declaration and partition.
pub fn resolve_partial(config: &ValidatedConfig, index: &ReferenceIndex) -> Resolution {
    let mut errors = Vec::new();
    let mut partitions: BTreeMap<Partition, Vec<Pending>> = BTreeMap::new();

    for decl in declarations(config) {
        let targets = expand_targets(&decl.targets, index, &config.global.enabled_regions);
        let principals = decl
            .principals
            .as_ref()
            .map(|share| resolve_principals(share, index))
            .transpose();
        let (targets, principals) = match (targets, principals) {
            (Ok(targets), Ok(principals)) => (targets, principals),
            (targets, principals) => {
                let mut symbols = targets.err().unwrap_or_default();
                symbols.extend(principals.err().unwrap_or_default());
                errors.push(PlanError::UnresolvedTarget {
                    kind: decl.kind,
                    resource: decl.name.clone(),
                    symbols,
                });
                continue;
            }
        };

        let mut payload = decl.payload.clone();
        if let (Some(resolved), NodePayload::ResourceShare { principals, .. }) =
            (principals, &mut payload)
        {
            *principals = resolved;
        }

        if targets.is_empty() {
            tracing::warn!(resource = %decl.name, "deployment targets select no account/region pairs");
        }

        for partition in targets {
            let node = ResourceNode {
                id: ResourceNode::node_id(&partition, decl.kind, &decl.name),
                kind: decl.kind,
                name: decl.name.clone(),
                partition: partition.clone(),
                payload: payload.clone(),
                depends_on: Vec::new(),
                external: BTreeMap::new(),
                parameter: decl.parameter.clone(),
            };
            partitions.entry(partition).or_default().push(Pending {
                node,
                references: decl.references.clone(),
            });
        }
    }

    let mut plan = ProvisioningPlan::default();
    for (partition, pending) in partitions {
        let nodes = link_partition(pending, index, &mut errors);
        if nodes.is_empty() {
            continue;
        }
        match order_partition(nodes) {
            Ok(ordered) => plan.partitions.push(PartitionPlan {
                partition,
                nodes: ordered,
            }),
            Err(cycle) => {
                tracing::warn!(partition = %partition, "dependency cycle, partition excluded");
                errors.push(PlanError::CyclicDependency { partition, cycle });
            }
        }
    }

    tracing::info!(
        partitions = plan.partitions.len(),
        nodes = plan.node_count(),
        errors = errors.len(),
        "plan resolved"
    );
    Resolution { plan, errors }
}

/// Add dependency edges inside one partition and drop nodes whose
/// dependencies cannot be satisfied, along with everything depending on them.
fn link_partition(
    pending: Vec<Pending>,
    index: &ReferenceIndex,
    errors: &mut Vec<PlanError>,
) -> Vec<ResourceNode> {
    let by_name: HashMap<String, NodeId> = pending
        .iter()
        .map(|p| (p.node.name.clone(), p.node.id.clone()))
        .collect();

    let mut nodes = Vec::with_capacity(pending.len());
    let mut excluded: HashSet<NodeId> = HashSet::new();

    for Pending {
        mut node,
        references,
    } in pending
    {
        for reference in references {
            if let Some(id) = by_name.get(&reference) {
                if !node.depends_on.contains(id) {
                    node.depends_on.push(id.clone());
                }
                continue;
            }
            match index.resource(&reference) {
                Some(ResourceRef::Provisioned(id)) => {
                    node.external.insert(reference, id.clone());
                }
                _ => {
                    if excluded.insert(node.id.clone()) {
                        errors.push(PlanError::UnresolvedDependency {
                            node: node.id.clone(),
                            dependency: reference,
                            excluded: false,
                        });
                    }
                }
            }
        }
        nodes.push(node);
    }

    // Exclusion propagates to dependents
    loop {
        let mut changed = false;
        for node in &nodes {
            if excluded.contains(&node.id) {
                continue;
            }
            if let Some(dep) = node.depends_on.iter().find(|d| excluded.contains(*d)) {
                errors.push(PlanError::UnresolvedDependency {
                    node: node.id.clone(),
                    dependency: dep.clone(),
                    excluded: true,
                });
                excluded.insert(node.id.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    nodes.retain(|n| !excluded.contains(&n.id));
    nodes
}

/// Topologically order one partition's nodes (given in declaration order).
/// Kahn's algorithm with a min-heap on declaration position for tie-breaking.
/// On a cycle, returns the node IDs of one cycle.
fn order_partition(nodes: Vec<ResourceNode>) -> Result<Vec<ResourceNode>, Vec<NodeId>> {
    let position: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for dep in &node.depends_on {
            if let Some(&d) = position.get(dep.as_str()) {
                dependents[d].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(current)) = ready.pop() {
        order.push(current);
        for &next in &dependents[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(find_cycle(&nodes, &position, &in_degree));
    }

    let mut slots: Vec<Option<ResourceNode>> = nodes.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

/// Follow unprocessed dependencies from the first stuck node until a node
/// repeats. Every stuck node has at least one stuck dependency.
fn find_cycle(
    nodes: &[ResourceNode],
    position: &HashMap<&str, usize>,
    in_degree: &[usize],
) -> Vec<NodeId> {
    let stuck = |i: usize| in_degree[i] > 0;
    let Some(start) = (0..nodes.len()).find(|&i| stuck(i)) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if let Some(at) = path.iter().position(|&p| p == current) {
            return path[at..].iter().map(|&i| nodes[i].id.clone()).collect();
        }
        path.push(current);
        let next = nodes[current]
            .depends_on
            .iter()
            .filter_map(|d| position.get(d.as_str()).copied())
            .find(|&d| stuck(d));
        match next {
            Some(n) => current = n,
            None => return path.iter().map(|&i| nodes[i].id.clone()).collect(),
        }
    }
}
