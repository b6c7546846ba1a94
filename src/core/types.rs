//! LZ-001: Landing zone types.
//!
//! Defines the YAML document types for global settings, accounts, organization
//! and network configuration, plus the provisioning plan, state lock, and
//! provisioning event types. Document types derive Serialize/Deserialize for
//! YAML roundtripping and JsonSchema for schema export.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

// ============================================================================
// global-config.yaml
// ============================================================================

/// Global settings shared by every account and region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Region hosting the pipeline and the management stacks
    pub home_region: String,

    /// Regions governed by the landing zone
    pub enabled_regions: Vec<String>,

    /// Role assumed in member accounts from the management account
    pub management_account_access_role: String,

    pub control_tower: ControlTowerConfig,

    pub logging: LoggingConfig,

    pub data_protection: Option<DataProtectionConfig>,

    /// Emission policy
    pub policy: Policy,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            home_region: String::new(),
            enabled_regions: Vec::new(),
            management_account_access_role: "AWSControlTowerExecution".to_string(),
            control_tower: ControlTowerConfig::default(),
            logging: LoggingConfig::default(),
            data_protection: None,
            policy: Policy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ControlTowerConfig {
    pub enable: bool,
}

impl Default for ControlTowerConfig {
    fn default() -> Self {
        Self { enable: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Account name receiving centralized logs
    pub account: String,
    pub cloudtrail: CloudtrailConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            account: "Log Archive".to_string(),
            cloudtrail: CloudtrailConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CloudtrailConfig {
    pub enable: bool,
    pub organization_trail: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DataProtectionConfig {
    pub enable: bool,
    pub identity_perimeter: PerimeterConfig,
    pub resource_perimeter: PerimeterConfig,
    pub network_perimeter: PerimeterConfig,
}

impl Default for DataProtectionConfig {
    fn default() -> Self {
        Self {
            enable: true,
            identity_perimeter: PerimeterConfig::default(),
            resource_perimeter: PerimeterConfig::default(),
            network_perimeter: PerimeterConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PerimeterConfig {
    pub enable: bool,
}

impl Default for PerimeterConfig {
    fn default() -> Self {
        Self { enable: true }
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Emission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Policy {
    /// Failure handling inside a partition
    pub failure: FailurePolicy,

    /// Emit independent partitions concurrently
    pub parallel_partitions: bool,

    /// Append provisioning events to the per-partition JSONL log
    pub events: bool,

    /// Persist partition state after emission
    pub lock_file: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            failure: FailurePolicy::default(),
            parallel_partitions: false,
            events: true,
            lock_file: true,
        }
    }
}

/// Failure handling strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    StopOnFirst,
    ContinueIndependent,
}

// ============================================================================
// accounts-config.yaml / organization-config.yaml
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct AccountsConfig {
    pub mandatory_accounts: Vec<AccountConfig>,
    pub workload_accounts: Vec<AccountConfig>,
}

impl AccountsConfig {
    /// Every declared account, mandatory accounts first.
    pub fn all(&self) -> impl Iterator<Item = &AccountConfig> {
        self.mandatory_accounts
            .iter()
            .chain(self.workload_accounts.iter())
    }

    /// Email of the account declared under `name`.
    pub fn get_email(&self, name: &str) -> Option<&str> {
        self.all()
            .find(|a| a.name == name)
            .map(|a| a.email.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct AccountConfig {
    pub name: String,
    pub email: String,
    pub organizational_unit: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct OrganizationConfig {
    pub organizational_units: Vec<OrganizationalUnitConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct OrganizationalUnitConfig {
    pub name: String,
}

// ============================================================================
// network-config.yaml
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub transit_gateways: Vec<TransitGatewayConfig>,
    pub resource_shares: Vec<ResourceShareConfig>,
}

/// `enable` / `disable` switch used by transit gateway options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EnableDisable {
    Enable,
    Disable,
}

impl fmt::Display for EnableDisable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enable => write!(f, "enable"),
            Self::Disable => write!(f, "disable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct TransitGatewayConfig {
    pub name: String,

    /// Accounts and regions the gateway is provisioned in
    pub deployment_targets: DeploymentTargets,

    /// Amazon side BGP ASN
    pub asn: u32,

    pub dns_support: EnableDisable,
    pub vpn_ecmp_support: EnableDisable,
    pub default_route_table_association: EnableDisable,
    pub default_route_table_propagation: EnableDisable,
    pub auto_accept_sharing_attachments: EnableDisable,

    pub route_tables: Vec<RouteTableConfig>,

    /// Principals the gateway is shared with
    pub share_targets: Option<ShareTargets>,

    /// Explicit ordering against other declared resources
    pub depends_on: Vec<String>,
}

impl Default for TransitGatewayConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            deployment_targets: DeploymentTargets::default(),
            asn: 64512,
            dns_support: EnableDisable::Enable,
            vpn_ecmp_support: EnableDisable::Enable,
            default_route_table_association: EnableDisable::Enable,
            default_route_table_propagation: EnableDisable::Enable,
            auto_accept_sharing_attachments: EnableDisable::Disable,
            route_tables: Vec::new(),
            share_targets: None,
            depends_on: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RouteTableConfig {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ResourceShareConfig {
    pub name: String,
    pub deployment_targets: DeploymentTargets,

    /// Logical names of the shared resources
    pub resources: Vec<String>,

    pub share_targets: ShareTargets,
    pub allow_external_principals: bool,
    pub depends_on: Vec<String>,
}

/// Selector expanding to a set of (account, region) pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DeploymentTargets {
    pub organizational_units: Vec<String>,
    pub accounts: Vec<String>,
    pub excluded_accounts: Vec<String>,

    /// Regions to deploy to; defaults to the enabled regions
    pub regions: Option<Vec<String>>,

    pub excluded_regions: Vec<String>,
}

/// Sharing principals. These resolve to identifiers, never to plan nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ShareTargets {
    pub organizational_units: Vec<String>,
    pub accounts: Vec<String>,
}

// ============================================================================
// Aggregate configuration
// ============================================================================

/// All four documents of a configuration directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorConfig {
    pub global: GlobalConfig,
    pub accounts: AccountsConfig,
    pub organization: OrganizationConfig,
    pub network: NetworkConfig,
}

/// A configuration that passed schema and semantic validation.
///
/// Only the loader in [`crate::core::parser`] constructs this type.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    inner: AcceleratorConfig,
}

impl ValidatedConfig {
    pub(crate) fn new(inner: AcceleratorConfig) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> AcceleratorConfig {
        self.inner
    }
}

impl Deref for ValidatedConfig {
    type Target = AcceleratorConfig;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

// ============================================================================
// Symbols and partitions
// ============================================================================

/// A symbolic reference found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum Symbol {
    Account(String),
    OrganizationalUnit(String),
    Resource(String),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(n) => write!(f, "account '{}'", n),
            Self::OrganizationalUnit(n) => write!(f, "organizational unit '{}'", n),
            Self::Resource(n) => write!(f, "resource '{}'", n),
        }
    }
}

/// An (account, region) pair. Partitions are emitted independently.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub account: String,
    pub region: String,
}

impl Partition {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    /// Directory name used under the state directory.
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.account, self.region)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.region)
    }
}

// ============================================================================
// Provisioning plan
// ============================================================================

/// Node identifier: `account/region/kind/name`.
pub type NodeId = String;

/// Kind of provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    TransitGateway,
    TransitGatewayRouteTable,
    ResourceShare,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransitGateway => write!(f, "transit-gateway"),
            Self::TransitGatewayRouteTable => write!(f, "route-table"),
            Self::ResourceShare => write!(f, "resource-share"),
        }
    }
}

/// Configuration handed to the emitter for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodePayload {
    TransitGateway {
        name: String,
        asn: u32,
        dns_support: EnableDisable,
        vpn_ecmp_support: EnableDisable,
        default_route_table_association: EnableDisable,
        default_route_table_propagation: EnableDisable,
        auto_accept_sharing_attachments: EnableDisable,
    },
    RouteTable {
        name: String,
        transit_gateway: String,
    },
    ResourceShare {
        name: String,
        /// OU ARNs and account IDs, in declaration order
        principals: Vec<String>,
        /// Logical names of the shared resources
        resources: Vec<String>,
        allow_external_principals: bool,
    },
}

/// One target-scoped instance of a declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: NodeId,
    pub kind: ResourceKind,

    /// Logical name (`tgw`, `tgw/route-table`, `share`)
    pub name: String,

    pub partition: Partition,
    pub payload: NodePayload,

    /// Nodes in the same partition that must be emitted first
    pub depends_on: Vec<NodeId>,

    /// Dependencies already provisioned outside this plan (name → ID)
    #[serde(default)]
    pub external: BTreeMap<String, String>,

    /// Parameter name the emitted identifier is published under
    #[serde(default)]
    pub parameter: Option<String>,
}

impl ResourceNode {
    pub fn node_id(partition: &Partition, kind: ResourceKind, name: &str) -> NodeId {
        format!("{}/{}/{}", partition, kind, name)
    }
}

/// Nodes of one partition, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionPlan {
    pub partition: Partition,
    pub nodes: Vec<ResourceNode>,
}

impl PartitionPlan {
    pub fn position(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }
}

/// Dependency-ordered, partitioned set of nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningPlan {
    /// Partitions sorted by (account, region)
    pub partitions: Vec<PartitionPlan>,
}

impl ProvisioningPlan {
    pub fn partition(&self, partition: &Partition) -> Option<&PartitionPlan> {
        self.partitions.iter().find(|p| &p.partition == partition)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.partitions.iter().flat_map(|p| p.nodes.iter())
    }

    pub fn node_count(&self) -> usize {
        self.partitions.iter().map(|p| p.nodes.len()).sum()
    }

    /// Total order: partitions in key order, nodes in emission order.
    pub fn execution_order(&self) -> Vec<&str> {
        self.nodes().map(|n| n.id.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

/// Action to take on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Update,
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::NoOp => write!(f, "NO-OP"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub node_id: NodeId,
    pub partition: Partition,
    pub kind: ResourceKind,
    pub action: PlanAction,
    pub description: String,
}

/// Changes grouped in plan order, with summary counts.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub changes: Vec<PlannedChange>,
    pub to_create: u32,
    pub to_update: u32,
    pub unchanged: u32,
}

// ============================================================================
// State / Lock file
// ============================================================================

/// Per-partition state lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionLock {
    pub schema: String,
    pub account: String,
    pub region: String,
    pub generated_at: String,
    pub generator: String,

    /// Per-node state, in emission order
    pub nodes: IndexMap<NodeId, NodeLock>,
}

impl PartitionLock {
    pub fn partition(&self) -> Partition {
        Partition::new(&self.account, &self.region)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLock {
    pub kind: ResourceKind,
    pub status: NodeStatus,

    /// Identifier returned by the emitter
    #[serde(default)]
    pub resolved_id: Option<String>,

    #[serde(default)]
    pub applied_at: Option<String>,

    #[serde(default)]
    pub duration_seconds: Option<f64>,

    /// BLAKE3 hash of the emitted payload
    pub hash: String,

    /// BLAKE3 hash of the dependency identifiers the node was emitted with
    #[serde(default)]
    pub dependencies: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Converged,
    Failed,
    Unknown,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "CONVERGED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ============================================================================
// Provisioning events
// ============================================================================

/// Structured event reported while emitting a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvisioningEvent {
    EmissionStarted {
        partition: String,
        run_id: String,
        version: String,
    },
    NodeStarted {
        partition: String,
        node: String,
        action: String,
    },
    NodeSucceeded {
        partition: String,
        node: String,
        resolved_id: String,
        duration_seconds: f64,
    },
    NodeFailed {
        partition: String,
        node: String,
        error: String,
    },
    NodeSkipped {
        partition: String,
        node: String,
        reason: String,
    },
    EmissionCompleted {
        partition: String,
        run_id: String,
        succeeded: u32,
        unchanged: u32,
        failed: u32,
        skipped: u32,
        total_seconds: f64,
    },
}

impl ProvisioningEvent {
    pub fn partition(&self) -> &str {
        match self {
            Self::EmissionStarted { partition, .. }
            | Self::NodeStarted { partition, .. }
            | Self::NodeSucceeded { partition, .. }
            | Self::NodeFailed { partition, .. }
            | Self::NodeSkipped { partition, .. }
            | Self::EmissionCompleted { partition, .. } => partition,
        }
    }
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: ProvisioningEvent,
}

// ============================================================================
// Emission result
// ============================================================================

/// Result of emitting a single partition.
#[derive(Debug, Clone)]
pub struct EmissionResult {
    pub partition: Partition,
    pub succeeded: u32,
    pub unchanged: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total_duration: std::time::Duration,
}

// ============================================================================
// Tests
// ============================================================================
