//! LZ-002: Schema descriptions and the versioned schema registry.
//!
//! A schema is plain data: object schemas map field names to a type and a
//! required flag. Registries are constructed values, so two schema versions
//! can validate side by side.

use super::types::{AccountsConfig, GlobalConfig, NetworkConfig, OrganizationConfig};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::fmt;

/// Region codes accepted wherever a region is expected.
pub const REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ca-central-1",
    "cn-north-1",
    "cn-northwest-1",
    "eu-central-1",
    "eu-north-1",
    "eu-south-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-gov-east-1",
    "us-gov-west-1",
    "us-west-1",
    "us-west-2",
];

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    NonEmptyString,
    Integer { min: i64, max: i64 },
    Boolean,
    Enum(Vec<String>),
    Array(Box<FieldType>),
    Map(Box<FieldType>),
    Object(ObjectSchema),
}

impl FieldType {
    pub fn enumeration(values: &[&str]) -> Self {
        Self::Enum(values.iter().map(|v| v.to_string()).collect())
    }

    pub fn array_of(inner: FieldType) -> Self {
        Self::Array(Box::new(inner))
    }

    pub fn map_of(inner: FieldType) -> Self {
        Self::Map(Box::new(inner))
    }

    pub fn region() -> Self {
        Self::enumeration(REGIONS)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String | Self::Enum(_) => write!(f, "string"),
            Self::NonEmptyString => write!(f, "non-empty string"),
            Self::Integer { .. } => write!(f, "integer"),
            Self::Boolean => write!(f, "boolean"),
            Self::Array(_) => write!(f, "sequence"),
            Self::Map(_) | Self::Object(_) => write!(f, "mapping"),
        }
    }
}

/// One field of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
}

/// Fields of a mapping, in declaration order. Keys not listed are rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub fields: IndexMap<String, FieldSpec>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldSpec {
                field_type,
                required: true,
            },
        );
        self
    }

    pub fn optional(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.insert(
            name.to_string(),
            FieldSpec {
                field_type,
                required: false,
            },
        );
        self
    }
}

/// The four documents of a configuration directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum DocumentKind {
    Global,
    Accounts,
    Organization,
    Network,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Global,
        DocumentKind::Accounts,
        DocumentKind::Organization,
        DocumentKind::Network,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Global => "global-config.yaml",
            Self::Accounts => "accounts-config.yaml",
            Self::Organization => "organization-config.yaml",
            Self::Network => "network-config.yaml",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// Schemas for every document kind at one version.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    version: String,
    documents: BTreeMap<DocumentKind, ObjectSchema>,
}

impl SchemaRegistry {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            documents: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, kind: DocumentKind, schema: ObjectSchema) {
        self.documents.insert(kind, schema);
    }

    pub fn get(&self, kind: DocumentKind) -> Option<&ObjectSchema> {
        self.documents.get(&kind)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The built-in 1.0 schemas.
    pub fn v1() -> Self {
        let mut registry = Self::new("1.0");
        registry.register(DocumentKind::Global, global_schema());
        registry.register(DocumentKind::Accounts, accounts_schema());
        registry.register(DocumentKind::Organization, organization_schema());
        registry.register(DocumentKind::Network, network_schema());
        registry
    }
}

fn enable_flag() -> FieldType {
    FieldType::Object(ObjectSchema::new().required("enable", FieldType::Boolean))
}

fn global_schema() -> ObjectSchema {
    let cloudtrail = ObjectSchema::new()
        .required("enable", FieldType::Boolean)
        .required("organizationTrail", FieldType::Boolean);
    let logging = ObjectSchema::new()
        .required("account", FieldType::NonEmptyString)
        .required("cloudtrail", FieldType::Object(cloudtrail));
    let data_protection = ObjectSchema::new()
        .required("enable", FieldType::Boolean)
        .required("identityPerimeter", enable_flag())
        .required("resourcePerimeter", enable_flag())
        .required("networkPerimeter", enable_flag());
    let policy = ObjectSchema::new()
        .optional(
            "failure",
            FieldType::enumeration(&["stop_on_first", "continue_independent"]),
        )
        .optional("parallelPartitions", FieldType::Boolean)
        .optional("events", FieldType::Boolean)
        .optional("lockFile", FieldType::Boolean);

    ObjectSchema::new()
        .required("homeRegion", FieldType::region())
        .required("enabledRegions", FieldType::array_of(FieldType::region()))
        .optional("managementAccountAccessRole", FieldType::NonEmptyString)
        .optional("controlTower", enable_flag())
        .optional("logging", FieldType::Object(logging))
        .optional("dataProtection", FieldType::Object(data_protection))
        .optional("policy", FieldType::Object(policy))
}

fn accounts_schema() -> ObjectSchema {
    let account = FieldType::Object(
        ObjectSchema::new()
            .required("name", FieldType::NonEmptyString)
            .required("email", FieldType::NonEmptyString)
            .required("organizationalUnit", FieldType::NonEmptyString)
            .optional("description", FieldType::String),
    );
    ObjectSchema::new()
        .required("mandatoryAccounts", FieldType::array_of(account.clone()))
        .optional("workloadAccounts", FieldType::array_of(account))
}

fn organization_schema() -> ObjectSchema {
    let ou = ObjectSchema::new().required("name", FieldType::NonEmptyString);
    ObjectSchema::new().required(
        "organizationalUnits",
        FieldType::array_of(FieldType::Object(ou)),
    )
}

fn names() -> FieldType {
    FieldType::array_of(FieldType::NonEmptyString)
}

fn deployment_targets() -> FieldType {
    FieldType::Object(
        ObjectSchema::new()
            .optional("organizationalUnits", names())
            .optional("accounts", names())
            .optional("excludedAccounts", names())
            .optional("regions", FieldType::array_of(FieldType::region()))
            .optional("excludedRegions", FieldType::array_of(FieldType::region())),
    )
}

fn share_targets() -> FieldType {
    FieldType::Object(
        ObjectSchema::new()
            .optional("organizationalUnits", names())
            .optional("accounts", names()),
    )
}

fn network_schema() -> ObjectSchema {
    let switch = || FieldType::enumeration(&["enable", "disable"]);
    let route_table = ObjectSchema::new().required("name", FieldType::NonEmptyString);
    let transit_gateway = ObjectSchema::new()
        .required("name", FieldType::NonEmptyString)
        .required("deploymentTargets", deployment_targets())
        .required(
            "asn",
            FieldType::Integer {
                min: 0,
                max: i64::from(u32::MAX),
            },
        )
        .optional("dnsSupport", switch())
        .optional("vpnEcmpSupport", switch())
        .optional("defaultRouteTableAssociation", switch())
        .optional("defaultRouteTablePropagation", switch())
        .optional("autoAcceptSharingAttachments", switch())
        .optional(
            "routeTables",
            FieldType::array_of(FieldType::Object(route_table)),
        )
        .optional("shareTargets", share_targets())
        .optional("dependsOn", names());
    let resource_share = ObjectSchema::new()
        .required("name", FieldType::NonEmptyString)
        .required("deploymentTargets", deployment_targets())
        .required("resources", names())
        .required("shareTargets", share_targets())
        .optional("allowExternalPrincipals", FieldType::Boolean)
        .optional("dependsOn", names());

    ObjectSchema::new()
        .optional(
            "transitGateways",
            FieldType::array_of(FieldType::Object(transit_gateway)),
        )
        .optional(
            "resourceShares",
            FieldType::array_of(FieldType::Object(resource_share)),
        )
}

/// JSON Schema of a document's typed form, for editors and CI linters.
pub fn json_schema(kind: DocumentKind) -> serde_json::Value {
    let schema = match kind {
        DocumentKind::Global => schemars::schema_for!(GlobalConfig),
        DocumentKind::Accounts => schemars::schema_for!(AccountsConfig),
        DocumentKind::Organization => schemars::schema_for!(OrganizationConfig),
        DocumentKind::Network => schemars::schema_for!(NetworkConfig),
    };
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}
