//! LZ-013: Plan emitter boundary.
//!
//! A [`PlanEmitter`] turns one resource node into a provisioned resource and
//! returns its identifier. The core never talks to a cloud API; emitters are
//! supplied by the caller. [`SimulatedEmitter`] produces deterministic
//! identifiers for rehearsals and tests.

use super::error::EmitError;
use super::types::{NodePayload, ResourceKind, ResourceNode};
use std::collections::{BTreeMap, BTreeSet};

/// One node handed to an emitter, with the identifiers it depends on.
#[derive(Debug, Clone)]
pub struct EmitRequest<'a> {
    pub node: &'a ResourceNode,

    /// Logical name → identifier, for every dependency of the node
    pub dependencies: BTreeMap<String, String>,
}

impl EmitRequest<'_> {
    /// Identifier of a dependency by logical name.
    pub fn dependency(&self, name: &str) -> Result<&str, EmitError> {
        self.dependencies
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| {
                EmitError::new(format!("{}: no identifier for dependency '{}'", self.node.id, name))
            })
    }
}

/// Provisions resource nodes.
pub trait PlanEmitter: Sync {
    fn emit(&self, request: &EmitRequest<'_>) -> Result<String, EmitError>;
}

/// Emitter producing deterministic identifiers without side effects.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEmitter {
    failing: BTreeSet<String>,
}

impl SimulatedEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every node whose ID or logical name is listed.
    pub fn failing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: names.into_iter().map(Into::into).collect(),
        }
    }

    fn digest(id: &str) -> String {
        blake3::hash(id.as_bytes()).to_hex().to_string()
    }
}

impl PlanEmitter for SimulatedEmitter {
    fn emit(&self, request: &EmitRequest<'_>) -> Result<String, EmitError> {
        let node = request.node;
        if self.failing.contains(&node.id) || self.failing.contains(&node.name) {
            return Err(EmitError::new(format!("simulated failure for {}", node.id)));
        }

        let hex = Self::digest(&node.id);
        let prefix = id_prefix(node.kind);
        match &node.payload {
            NodePayload::TransitGateway { .. } => Ok(format!("{}{}", prefix, &hex[..17])),
            NodePayload::RouteTable {
                transit_gateway, ..
            } => {
                request.dependency(transit_gateway)?;
                Ok(format!("{}{}", prefix, &hex[..17]))
            }
            NodePayload::ResourceShare { resources, .. } => {
                for resource in resources {
                    request.dependency(resource)?;
                }
                Ok(format!(
                    "{}{}:{}:resource-share/{}-{}-{}-{}-{}",
                    prefix,
                    node.partition.region,
                    node.partition.account,
                    &hex[0..8],
                    &hex[8..12],
                    &hex[12..16],
                    &hex[16..20],
                    &hex[20..32]
                ))
            }
        }
    }
}

/// Prefix an identifier of the given kind is expected to carry.
pub fn id_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::TransitGateway => "tgw-",
        ResourceKind::TransitGatewayRouteTable => "tgw-rtb-",
        ResourceKind::ResourceShare => "arn:aws:ram:",
    }
}
