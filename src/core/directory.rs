//! LZ-005: Account and organization directory.
//!
//! The directory is the external source of truth for account IDs, OU ARNs
//! and membership, per-account enabled regions, and identifiers of resources
//! provisioned by earlier runs. [`StaticDirectory`] reads a YAML snapshot.

use super::error::DirectoryError;
use super::index::is_account_id;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

fn ou_arn_pattern() -> &'static Regex {
    static OU_ARN: OnceLock<Regex> = OnceLock::new();
    OU_ARN.get_or_init(|| {
        Regex::new(r"^arn:aws[a-z-]*:organizations::\d{12}:ou/o-[a-z0-9]+/ou-[a-z0-9-]+$")
            .expect("valid OU ARN regex")
    })
}

/// An organizational unit as known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OuRecord {
    pub arn: String,

    /// Member account IDs
    #[serde(default)]
    pub accounts: Vec<String>,
}

/// Lookups the reference index relies on.
pub trait Directory {
    fn lookup_account_id(&self, email: &str) -> Result<String, DirectoryError>;

    fn lookup_ou(&self, name: &str) -> Result<OuRecord, DirectoryError>;

    /// Regions enabled for an account, when the directory restricts them.
    fn account_regions(&self, _account_id: &str) -> Option<Vec<String>> {
        None
    }

    /// Identifier of a resource provisioned outside this configuration.
    fn lookup_resource(&self, name: &str) -> Result<String, DirectoryError> {
        Err(DirectoryError::NotFound {
            kind: "resource",
            name: name.to_string(),
        })
    }
}

/// Directory backed by a YAML snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct StaticDirectory {
    /// Email → account ID
    pub accounts: BTreeMap<String, String>,

    pub organizational_units: BTreeMap<String, OuRecord>,

    /// Account ID → enabled regions
    pub account_regions: BTreeMap<String, Vec<String>>,

    /// Resource name → identifier
    pub resources: BTreeMap<String, String>,
}

impl StaticDirectory {
    /// Parse a directory snapshot from a string.
    pub fn from_yaml(yaml: &str) -> Result<Self, DirectoryError> {
        Self::parse(yaml, "<inline>")
    }

    /// Load a directory snapshot from disk.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let content = std::fs::read_to_string(path).map_err(|e| DirectoryError::Read {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(yaml: &str, origin: &str) -> Result<Self, DirectoryError> {
        let directory: Self = serde_yaml_ng::from_str(yaml).map_err(|e| DirectoryError::Parse {
            path: origin.to_string(),
            detail: e.to_string(),
        })?;
        directory.check_identifiers().map_err(|detail| DirectoryError::Parse {
            path: origin.to_string(),
            detail,
        })?;
        Ok(directory)
    }

    /// Account IDs must be 12 digits and OU ARNs well formed.
    fn check_identifiers(&self) -> Result<(), String> {
        let members = self.organizational_units.values().flat_map(|ou| ou.accounts.iter());
        let ids = self
            .accounts
            .values()
            .chain(self.account_regions.keys())
            .chain(members);
        for id in ids {
            if !is_account_id(id) {
                return Err(format!("'{}' is not a 12-digit account ID", id));
            }
        }
        for (name, ou) in &self.organizational_units {
            if !ou_arn_pattern().is_match(&ou.arn) {
                return Err(format!("organizational unit '{}' has malformed ARN '{}'", name, ou.arn));
            }
        }
        Ok(())
    }
}

impl Directory for StaticDirectory {
    fn lookup_account_id(&self, email: &str) -> Result<String, DirectoryError> {
        self.accounts
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(email))
            .map(|(_, id)| id.clone())
            .ok_or_else(|| DirectoryError::NotFound {
                kind: "account",
                name: email.to_string(),
            })
    }

    fn lookup_ou(&self, name: &str) -> Result<OuRecord, DirectoryError> {
        self.organizational_units
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound {
                kind: "organizational unit",
                name: name.to_string(),
            })
    }

    fn account_regions(&self, account_id: &str) -> Option<Vec<String>> {
        self.account_regions.get(account_id).cloned()
    }

    fn lookup_resource(&self, name: &str) -> Result<String, DirectoryError> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound {
                kind: "resource",
                name: name.to_string(),
            })
    }
}
