//! LZ-004: Configuration loading and semantic validation.
//!
//! Loads the four documents of a configuration directory. Each document is
//! parsed, validated against the registry's schema, stripped of explicit
//! nulls, and deserialized over its default struct. Cross-document checks
//! then run on the typed tree:
//! - `homeRegion` and deployment regions must be enabled
//! - account, OU and logical resource names must be unique
//! - `dependsOn` must name another declared resource
//! - transit gateway ASNs must be private
//! - the logging account and every account's OU must be declared

use super::error::{ConfigError, ValidationError};
use super::schema::{DocumentKind, SchemaRegistry};
use super::types::*;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_yaml_ng::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

/// OU every account may be placed in without declaring it.
pub const ROOT_OU: &str = "Root";

/// Raw contents of the four configuration documents.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub global: String,
    pub accounts: String,
    pub organization: String,
    pub network: String,
}

impl ConfigSources {
    pub fn get(&self, kind: DocumentKind) -> &str {
        match kind {
            DocumentKind::Global => &self.global,
            DocumentKind::Accounts => &self.accounts,
            DocumentKind::Organization => &self.organization,
            DocumentKind::Network => &self.network,
        }
    }

    /// Read every document from a configuration directory.
    pub fn read_dir(dir: &Path) -> Result<Self, Vec<ConfigError>> {
        let mut errors = Vec::new();
        let mut read = |kind: DocumentKind| {
            let path = dir.join(kind.file_name());
            std::fs::read_to_string(&path).unwrap_or_else(|source| {
                errors.push(ConfigError::Io { path, source });
                String::new()
            })
        };
        let sources = Self {
            global: read(DocumentKind::Global),
            accounts: read(DocumentKind::Accounts),
            organization: read(DocumentKind::Organization),
            network: read(DocumentKind::Network),
        };
        if errors.is_empty() {
            Ok(sources)
        } else {
            Err(errors)
        }
    }
}

/// Parse a YAML (or JSON) document without validating it.
pub fn parse_document(kind: DocumentKind, content: &str) -> Result<Value, ConfigError> {
    serde_yaml_ng::from_str(content).map_err(|e| ConfigError::MalformedDocument {
        document: kind.file_name().to_string(),
        detail: e.to_string(),
    })
}

/// Parse, validate, and deserialize one document.
pub fn load_document<T: DeserializeOwned>(
    kind: DocumentKind,
    content: &str,
    registry: &SchemaRegistry,
) -> Result<T, Vec<ConfigError>> {
    let document = kind.file_name().to_string();
    let value = parse_document(kind, content).map_err(|e| vec![e])?;

    let schema = registry.get(kind).ok_or_else(|| {
        vec![ConfigError::Validation {
            document: document.clone(),
            error: ValidationError::semantic(
                "<root>",
                format!("no schema registered in version {}", registry.version()),
            ),
        }]
    })?;

    // An empty document stands for an empty mapping when nothing is required
    let value = if value.is_null() && schema.fields.values().all(|f| !f.required) {
        Value::Mapping(Default::default())
    } else {
        value
    };

    super::validator::validate(&value, schema).map_err(|errors| {
        errors
            .into_iter()
            .map(|error| ConfigError::Validation {
                document: document.clone(),
                error,
            })
            .collect::<Vec<_>>()
    })?;

    serde_yaml_ng::from_value(strip_nulls(value)).map_err(|e| {
        vec![ConfigError::MalformedDocument {
            document,
            detail: e.to_string(),
        }]
    })
}

/// Remove explicit nulls from mappings so defaults apply field by field.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

/// Load and validate a configuration from in-memory documents.
pub fn load_config(
    sources: &ConfigSources,
    registry: &SchemaRegistry,
) -> Result<ValidatedConfig, Vec<ConfigError>> {
    let mut errors = Vec::new();

    let global = collect(
        load_document::<GlobalConfig>(DocumentKind::Global, &sources.global, registry),
        &mut errors,
    );
    let accounts = collect(
        load_document::<AccountsConfig>(DocumentKind::Accounts, &sources.accounts, registry),
        &mut errors,
    );
    let organization = collect(
        load_document::<OrganizationConfig>(
            DocumentKind::Organization,
            &sources.organization,
            registry,
        ),
        &mut errors,
    );
    let network = collect(
        load_document::<NetworkConfig>(DocumentKind::Network, &sources.network, registry),
        &mut errors,
    );

    let (Some(global), Some(accounts), Some(organization), Some(network)) =
        (global, accounts, organization, network)
    else {
        return Err(errors);
    };

    let config = AcceleratorConfig {
        global,
        accounts,
        organization,
        network,
    };
    let semantic = validate_config(&config);
    if !semantic.is_empty() {
        return Err(semantic);
    }
    tracing::debug!(
        transit_gateways = config.network.transit_gateways.len(),
        resource_shares = config.network.resource_shares.len(),
        "configuration validated"
    );
    Ok(ValidatedConfig::new(config))
}

fn collect<T>(result: Result<T, Vec<ConfigError>>, errors: &mut Vec<ConfigError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(mut e) => {
            errors.append(&mut e);
            None
        }
    }
}

/// Load and validate a configuration directory.
pub fn load_config_dir(
    dir: &Path,
    registry: &SchemaRegistry,
) -> Result<ValidatedConfig, Vec<ConfigError>> {
    let sources = ConfigSources::read_dir(dir)?;
    load_config(&sources, registry)
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
}

/// Private ranges for the Amazon side ASN.
fn is_private_asn(asn: u32) -> bool {
    (64512..=65534).contains(&asn) || (4_200_000_000..=4_294_967_294).contains(&asn)
}

/// Logical names of every declared resource, in declaration order.
pub fn logical_names(network: &NetworkConfig) -> Vec<String> {
    let mut names = Vec::new();
    for tgw in &network.transit_gateways {
        names.push(tgw.name.clone());
        for rt in &tgw.route_tables {
            names.push(route_table_name(&tgw.name, &rt.name));
        }
        if tgw.share_targets.is_some() {
            names.push(implicit_share_name(&tgw.name));
        }
    }
    for share in &network.resource_shares {
        names.push(share.name.clone());
    }
    names
}

/// Logical name of a route table owned by a transit gateway.
pub fn route_table_name(tgw: &str, route_table: &str) -> String {
    format!("{}/{}", tgw, route_table)
}

/// Name of the share created for a gateway with `shareTargets`.
pub fn implicit_share_name(tgw: &str) -> String {
    format!("{}TransitGatewayShare", tgw)
}

/// Validate cross-document constraints. Returns a list of errors (empty = valid).
pub fn validate_config(config: &AcceleratorConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    let mut push = |kind: DocumentKind, error: ValidationError| {
        errors.push(ConfigError::Validation {
            document: kind.file_name().to_string(),
            error,
        });
    };

    // Global
    let global = &config.global;
    if !global.enabled_regions.contains(&global.home_region) {
        push(
            DocumentKind::Global,
            ValidationError::semantic(
                "homeRegion",
                format!("home region '{}' is not enabled", global.home_region),
            ),
        );
    }
    let mut seen_regions = HashSet::new();
    for (i, region) in global.enabled_regions.iter().enumerate() {
        if !seen_regions.insert(region) {
            push(
                DocumentKind::Global,
                ValidationError::semantic(
                    format!("enabledRegions[{}]", i),
                    format!("region '{}' listed twice", region),
                ),
            );
        }
    }
    if config.accounts.get_email(&global.logging.account).is_none() {
        push(
            DocumentKind::Global,
            ValidationError::semantic(
                "logging.account",
                format!("logging account '{}' is not declared", global.logging.account),
            ),
        );
    }

    // Organization
    let mut ous = HashSet::new();
    for (i, ou) in config.organization.organizational_units.iter().enumerate() {
        if !ous.insert(ou.name.as_str()) {
            push(
                DocumentKind::Organization,
                ValidationError::semantic(
                    format!("organizationalUnits[{}].name", i),
                    format!("duplicate organizational unit '{}'", ou.name),
                ),
            );
        }
    }

    // Accounts
    let mut account_names = HashSet::new();
    let mut emails = HashSet::new();
    let lists = [
        ("mandatoryAccounts", &config.accounts.mandatory_accounts),
        ("workloadAccounts", &config.accounts.workload_accounts),
    ];
    for (list, accounts) in lists {
        for (i, account) in accounts.iter().enumerate() {
            let base = format!("{}[{}]", list, i);
            if !account_names.insert(account.name.as_str()) {
                push(
                    DocumentKind::Accounts,
                    ValidationError::semantic(
                        format!("{}.name", base),
                        format!("duplicate account '{}'", account.name),
                    ),
                );
            }
            if !email_pattern().is_match(&account.email) {
                push(
                    DocumentKind::Accounts,
                    ValidationError::semantic(
                        format!("{}.email", base),
                        format!("'{}' is not an email address", account.email),
                    ),
                );
            } else if !emails.insert(account.email.to_lowercase()) {
                push(
                    DocumentKind::Accounts,
                    ValidationError::semantic(
                        format!("{}.email", base),
                        format!("email '{}' used by more than one account", account.email),
                    ),
                );
            }
            if account.organizational_unit != ROOT_OU
                && !ous.contains(account.organizational_unit.as_str())
            {
                push(
                    DocumentKind::Accounts,
                    ValidationError::semantic(
                        format!("{}.organizationalUnit", base),
                        format!(
                            "organizational unit '{}' is not declared",
                            account.organizational_unit
                        ),
                    ),
                );
            }
        }
    }

    // Network
    let declared = logical_names(&config.network);
    let mut seen = HashSet::new();
    for name in &declared {
        if !seen.insert(name.as_str()) {
            push(
                DocumentKind::Network,
                ValidationError::semantic(
                    "<root>",
                    format!("logical name '{}' declared more than once", name),
                ),
            );
        }
    }

    let enabled = &global.enabled_regions;
    let mut check_targets = |base: &str, targets: &DeploymentTargets| {
        let mut found = Vec::new();
        if targets.organizational_units.is_empty() && targets.accounts.is_empty() {
            found.push(ValidationError::semantic(
                format!("{}.deploymentTargets", base),
                "selects no organizational units or accounts",
            ));
        }
        let region_lists = [
            ("regions", targets.regions.as_deref().unwrap_or_default()),
            ("excludedRegions", targets.excluded_regions.as_slice()),
        ];
        for (field, regions) in region_lists {
            for (i, region) in regions.iter().enumerate() {
                if !enabled.contains(region) {
                    found.push(ValidationError::semantic(
                        format!("{}.deploymentTargets.{}[{}]", base, field, i),
                        format!("region '{}' is not enabled", region),
                    ));
                }
            }
        }
        found
    };

    let mut network_errors = Vec::new();
    for (i, tgw) in config.network.transit_gateways.iter().enumerate() {
        let base = format!("transitGateways[{}]", i);
        network_errors.extend(check_targets(&base, &tgw.deployment_targets));
        if !is_private_asn(tgw.asn) {
            network_errors.push(ValidationError::semantic(
                format!("{}.asn", base),
                format!(
                    "ASN {} is outside 64512..=65534 and 4200000000..=4294967294",
                    tgw.asn
                ),
            ));
        }
        network_errors.extend(check_depends_on(&base, &tgw.name, &tgw.depends_on, &declared));
    }
    for (i, share) in config.network.resource_shares.iter().enumerate() {
        let base = format!("resourceShares[{}]", i);
        network_errors.extend(check_targets(&base, &share.deployment_targets));
        if share.share_targets.organizational_units.is_empty()
            && share.share_targets.accounts.is_empty()
        {
            network_errors.push(ValidationError::semantic(
                format!("{}.shareTargets", base),
                "shares with no principals",
            ));
        }
        network_errors.extend(check_depends_on(
            &base,
            &share.name,
            &share.depends_on,
            &declared,
        ));
    }
    for error in network_errors {
        push(DocumentKind::Network, error);
    }

    errors
}

fn check_depends_on(
    base: &str,
    name: &str,
    depends_on: &[String],
    declared: &[String],
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (i, dep) in depends_on.iter().enumerate() {
        let path = format!("{}.dependsOn[{}]", base, i);
        if dep == name {
            errors.push(ValidationError::semantic(
                path,
                format!("resource '{}' depends on itself", name),
            ));
        } else if !declared.iter().any(|d| d == dep) {
            errors.push(ValidationError::semantic(
                path,
                format!("resource '{}' depends on unknown resource '{}'", name, dep),
            ));
        }
    }
    errors
}
