//! LZ-006: Reference index — symbolic names to resolved identifiers.
//!
//! Walks the validated configuration, collects every account, OU and
//! resource reference with its field path, and resolves each distinct symbol
//! through the directory exactly once. Unresolved symbols are reported once
//! each, with the first referencing entity and the number of further
//! references.

use super::directory::{Directory, OuRecord};
use super::error::ResolutionError;
use super::parser::logical_names;
use super::types::{DeploymentTargets, ShareTargets, Symbol, ValidatedConfig};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// How a resource name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    /// Declared in this configuration; becomes a plan node
    Declared,
    /// Provisioned outside this configuration
    Provisioned(String),
}

/// Resolved symbols for one configuration and directory snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    accounts: BTreeMap<String, String>,
    organizational_units: BTreeMap<String, OuRecord>,
    resources: BTreeMap<String, ResourceRef>,
    account_regions: BTreeMap<String, Vec<String>>,
    emitted: BTreeMap<String, String>,
}

/// Where a symbol is referenced.
struct Occurrence {
    symbol: Symbol,
    entity: String,
    path: String,
}

fn account_id_pattern() -> &'static Regex {
    static ACCOUNT_ID: OnceLock<Regex> = OnceLock::new();
    ACCOUNT_ID.get_or_init(|| Regex::new(r"^\d{12}$").expect("valid account id regex"))
}

/// True for a literal 12-digit account ID.
pub fn is_account_id(reference: &str) -> bool {
    account_id_pattern().is_match(reference)
}

impl ReferenceIndex {
    /// Build the index, failing with every unresolved symbol.
    pub fn build<D: Directory + ?Sized>(
        config: &ValidatedConfig,
        directory: &D,
    ) -> Result<Self, Vec<ResolutionError>> {
        let (index, errors) = Self::build_partial(config, directory);
        if errors.is_empty() {
            Ok(index)
        } else {
            Err(errors)
        }
    }

    /// Build the index from whatever resolves, returning the errors alongside.
    pub fn build_partial<D: Directory + ?Sized>(
        config: &ValidatedConfig,
        directory: &D,
    ) -> (Self, Vec<ResolutionError>) {
        let occurrences = collect_occurrences(config);
        let declared: BTreeSet<String> = logical_names(&config.network).into_iter().collect();

        let mut index = Self::default();
        let mut unresolved: Vec<(Symbol, usize)> = Vec::new();
        let mut seen: BTreeSet<&Symbol> = BTreeSet::new();

        for (i, occ) in occurrences.iter().enumerate() {
            if !seen.insert(&occ.symbol) {
                continue;
            }

            let resolved = match &occ.symbol {
                Symbol::Account(reference) => match resolve_account(config, directory, reference) {
                    Some(id) => {
                        index.accounts.insert(reference.clone(), id);
                        true
                    }
                    None => false,
                },
                Symbol::OrganizationalUnit(name) => match directory.lookup_ou(name) {
                    Ok(record) => {
                        index.organizational_units.insert(name.clone(), record);
                        true
                    }
                    Err(_) => false,
                },
                Symbol::Resource(name) => {
                    if declared.contains(name) {
                        index.resources.insert(name.clone(), ResourceRef::Declared);
                        true
                    } else if let Ok(id) = directory.lookup_resource(name) {
                        index
                            .resources
                            .insert(name.clone(), ResourceRef::Provisioned(id));
                        true
                    } else {
                        false
                    }
                }
            };
            if !resolved {
                tracing::debug!(symbol = %occ.symbol, path = %occ.path, "unresolved reference");
                unresolved.push((occ.symbol.clone(), i));
            }
        }

        let mut errors = Vec::new();
        for (symbol, first) in unresolved {
            let occ = &occurrences[first];
            let total = occurrences.iter().filter(|o| o.symbol == symbol).count();
            errors.push(ResolutionError {
                symbol,
                entity: occ.entity.clone(),
                path: occ.path.clone(),
                other_occurrences: total - 1,
            });
        }

        // Region restrictions for every account reachable through a target
        let mut account_ids: BTreeSet<String> = index.accounts.values().cloned().collect();
        for record in index.organizational_units.values() {
            account_ids.extend(record.accounts.iter().cloned());
        }
        for id in account_ids {
            if let Some(regions) = directory.account_regions(&id) {
                index.account_regions.insert(id, regions);
            }
        }

        tracing::debug!(
            accounts = index.accounts.len(),
            organizational_units = index.organizational_units.len(),
            resources = index.resources.len(),
            unresolved = errors.len(),
            "reference index built"
        );
        (index, errors)
    }

    /// Account ID for an account reference (name, email, or ID).
    pub fn account(&self, reference: &str) -> Option<&str> {
        self.accounts.get(reference).map(String::as_str)
    }

    pub fn organizational_unit(&self, name: &str) -> Option<&OuRecord> {
        self.organizational_units.get(name)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceRef> {
        self.resources.get(name)
    }

    /// Enabled regions of an account, when the directory restricts them.
    pub fn regions_for(&self, account_id: &str) -> Option<&[String]> {
        self.account_regions.get(account_id).map(Vec::as_slice)
    }

    /// Record the identifier an emitter returned for a plan node.
    pub fn register_resource(&mut self, node: &str, id: impl Into<String>) {
        self.emitted.insert(node.to_string(), id.into());
    }

    /// Identifier registered for a plan node.
    pub fn emitted(&self, node: &str) -> Option<&str> {
        self.emitted.get(node).map(String::as_str)
    }

    pub fn emitted_count(&self) -> usize {
        self.emitted.len()
    }
}

fn resolve_account<D: Directory + ?Sized>(
    config: &ValidatedConfig,
    directory: &D,
    reference: &str,
) -> Option<String> {
    if is_account_id(reference) {
        return Some(reference.to_string());
    }
    let email = if reference.contains('@') {
        reference
    } else {
        config.accounts.get_email(reference)?
    };
    directory.lookup_account_id(email).ok()
}

fn collect_occurrences(config: &ValidatedConfig) -> Vec<Occurrence> {
    let mut out = vec![Occurrence {
        symbol: Symbol::Account(config.global.logging.account.clone()),
        entity: "logging configuration".to_string(),
        path: "logging.account".to_string(),
    }];

    for (i, tgw) in config.network.transit_gateways.iter().enumerate() {
        let entity = format!("transit gateway '{}'", tgw.name);
        let base = format!("transitGateways[{}]", i);
        push_targets(&mut out, &entity, &base, &tgw.deployment_targets);
        if let Some(share) = &tgw.share_targets {
            push_principals(&mut out, &entity, &base, share);
        }
        push_resources(&mut out, &entity, &format!("{}.dependsOn", base), &tgw.depends_on);
    }

    for (i, share) in config.network.resource_shares.iter().enumerate() {
        let entity = format!("resource share '{}'", share.name);
        let base = format!("resourceShares[{}]", i);
        push_targets(&mut out, &entity, &base, &share.deployment_targets);
        push_principals(&mut out, &entity, &base, &share.share_targets);
        push_resources(&mut out, &entity, &format!("{}.resources", base), &share.resources);
        push_resources(&mut out, &entity, &format!("{}.dependsOn", base), &share.depends_on);
    }

    out
}

fn push_list(
    out: &mut Vec<Occurrence>,
    entity: &str,
    path: &str,
    names: &[String],
    symbol: fn(String) -> Symbol,
) {
    for (j, name) in names.iter().enumerate() {
        out.push(Occurrence {
            symbol: symbol(name.clone()),
            entity: entity.to_string(),
            path: format!("{}[{}]", path, j),
        });
    }
}

fn push_targets(out: &mut Vec<Occurrence>, entity: &str, base: &str, targets: &DeploymentTargets) {
    let base = format!("{}.deploymentTargets", base);
    push_list(
        out,
        entity,
        &format!("{}.organizationalUnits", base),
        &targets.organizational_units,
        Symbol::OrganizationalUnit,
    );
    push_list(out, entity, &format!("{}.accounts", base), &targets.accounts, Symbol::Account);
    push_list(
        out,
        entity,
        &format!("{}.excludedAccounts", base),
        &targets.excluded_accounts,
        Symbol::Account,
    );
}

fn push_principals(out: &mut Vec<Occurrence>, entity: &str, base: &str, share: &ShareTargets) {
    let base = format!("{}.shareTargets", base);
    push_list(
        out,
        entity,
        &format!("{}.organizationalUnits", base),
        &share.organizational_units,
        Symbol::OrganizationalUnit,
    );
    push_list(out, entity, &format!("{}.accounts", base), &share.accounts, Symbol::Account);
}

fn push_resources(out: &mut Vec<Occurrence>, entity: &str, path: &str, names: &[String]) {
    push_list(out, entity, path, names, Symbol::Resource);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::directory::tests::{fixture, CountingDirectory};
    use crate::core::parser::tests::config_with_network;

    const SHARED: &str = r#"
transitGateways:
  - name: Core
    asn: 65000
    deploymentTargets:
      organizationalUnits: [Infrastructure]
      excludedAccounts: ["222222222222"]
    shareTargets:
      organizationalUnits: [Infrastructure, Security]
      accounts: [Network, "333333333333"]
resourceShares:
  - name: LegacyShare
    deploymentTargets:
      organizationalUnits: [Infrastructure]
    resources: [Core, LegacyTgw]
    shareTargets:
      accounts: [mgmt@example.com]
"#;

    #[test]
    fn test_lz006_build_resolves_everything() {
        let config = config_with_network(SHARED);
        let index = ReferenceIndex::build(&config, &fixture()).unwrap();
        assert_eq!(index.account("Network"), Some("111111111111"));
        assert_eq!(index.account("333333333333"), Some("333333333333"));
        assert_eq!(index.account("mgmt@example.com"), Some("000000000000"));
        assert_eq!(index.account("Log Archive"), Some("999999999999"));
        assert!(index
            .organizational_unit("Security")
            .unwrap()
            .arn
            .ends_with("ou-sec"));
        assert_eq!(index.resource("Core"), Some(&ResourceRef::Declared));
        assert_eq!(
            index.resource("LegacyTgw"),
            Some(&ResourceRef::Provisioned("tgw-0legacy".into()))
        );
        assert_eq!(index.regions_for("111111111111"), Some(&["us-east-1".to_string()][..]));
        assert_eq!(index.regions_for("999999999999"), None);
    }

    #[test]
    fn test_lz006_each_symbol_looked_up_once() {
        let config = config_with_network(SHARED);
        let dir = CountingDirectory::new(fixture());
        let index = ReferenceIndex::build(&config, &dir).unwrap();
        // Infrastructure appears three times, looked up once
        assert_eq!(dir.count("ou:Infrastructure"), 1);
        assert_eq!(dir.count("account:network@example.com"), 1);
        // Literal IDs never reach the directory
        assert_eq!(dir.count("account:333333333333"), 0);
        // Declared resources never reach the directory
        assert_eq!(dir.count("resource:Core"), 0);
        assert_eq!(dir.count("resource:LegacyTgw"), 1);
        let ou = index.organizational_unit("Infrastructure").unwrap();
        assert_eq!(ou.accounts.len(), 2);
    }

    #[test]
    fn test_lz006_one_error_per_unresolved_symbol() {
        let config = config_with_network(
            r#"
transitGateways:
  - name: Core
    asn: 65000
    deploymentTargets:
      organizationalUnits: [Workloads, Infrastructure]
    shareTargets:
      organizationalUnits: [Workloads]
      accounts: [ghost@example.com]
  - name: Edge
    asn: 65001
    deploymentTargets:
      organizationalUnits: [Workloads]
      accounts: [Network]
"#,
        );
        let errors = ReferenceIndex::build(&config, &fixture()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].symbol, Symbol::OrganizationalUnit("Workloads".into()));
        assert_eq!(errors[0].entity, "transit gateway 'Core'");
        assert_eq!(
            errors[0].path,
            "transitGateways[0].deploymentTargets.organizationalUnits[0]"
        );
        assert_eq!(errors[0].other_occurrences, 2);
        assert_eq!(errors[1].symbol, Symbol::Account("ghost@example.com".into()));
        assert_eq!(errors[1].other_occurrences, 0);

        // Unrelated symbols still resolve
        let (index, partial_errors) = ReferenceIndex::build_partial(&config, &fixture());
        assert_eq!(partial_errors, errors);
        assert!(index.organizational_unit("Infrastructure").is_some());
        assert_eq!(index.account("Network"), Some("111111111111"));
    }

    #[test]
    fn test_lz006_undeclared_account_name() {
        let config = config_with_network(
            r#"
transitGateways:
  - name: Core
    asn: 65000
    deploymentTargets:
      accounts: [Audit]
"#,
        );
        let errors = ReferenceIndex::build(&config, &fixture()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol, Symbol::Account("Audit".into()));
    }

    #[test]
    fn test_lz006_unknown_resource() {
        let config = config_with_network(
            r#"
resourceShares:
  - name: Share
    deploymentTargets:
      accounts: [Network]
    resources: [Phantom]
    shareTargets:
      accounts: [Network]
"#,
        );
        let errors = ReferenceIndex::build(&config, &fixture()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol, Symbol::Resource("Phantom".into()));
        assert_eq!(errors[0].path, "resourceShares[0].resources[0]");
    }

    #[test]
    fn test_lz006_build_is_idempotent() {
        let config = config_with_network(SHARED);
        let a = ReferenceIndex::build(&config, &fixture()).unwrap();
        let b = ReferenceIndex::build(&config, &fixture()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.account("Network"), a.account("Network"));
    }

    #[test]
    fn test_lz006_register_resource() {
        let config = config_with_network(SHARED);
        let mut index = ReferenceIndex::build(&config, &fixture()).unwrap();
        let node = "111111111111/us-east-1/transit-gateway/Core";
        assert_eq!(index.emitted(node), None);
        index.register_resource(node, "tgw-0123");
        assert_eq!(index.emitted(node), Some("tgw-0123"));
        assert_eq!(index.emitted_count(), 1);
    }

    #[test]
    fn test_lz006_account_id_pattern() {
        assert!(is_account_id("123456789012"));
        assert!(!is_account_id("12345678901"));
        assert!(!is_account_id("Network"));
        assert!(!is_account_id("1234567890123"));
    }
}
