//! Secret entries and the persisted vault document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// Addressing
// ============================================================================

/// Location of one secret: (project, category, key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretAddress {
    pub project: String,
    pub category: String,
    pub key: String,
}

impl SecretAddress {
    pub fn new(
        project: impl Into<String>,
        category: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            category: category.into(),
            key: key.into(),
        }
    }
}

impl std::str::FromStr for SecretAddress {
    type Err = String;

    /// Parses `project/category/key`. The key may itself contain `/`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(c), Some(k)) if !p.is_empty() && !c.is_empty() && !k.is_empty() => {
                Ok(Self::new(p, c, k))
            }
            _ => Err(format!("expected project/category/key, got '{s}'")),
        }
    }
}

impl fmt::Display for SecretAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.category, self.key)
    }
}

// ============================================================================
// Metadata keys
// ============================================================================

/// Well-known `meta` keys.
pub mod meta_keys {
    /// Environment variable the secret is usually exported as.
    pub const ENV_VAR: &str = "envVar";
    /// Provenance of the current value (`manual`, `rotation`, ...).
    pub const SOURCE: &str = "source";
    /// Back-reference to the governing rotation policy.
    pub const ROTATION_POLICY_ID: &str = "rotationPolicyId";
}

// ============================================================================
// Versioning
// ============================================================================

/// How a write treats the value it replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Versioning {
    /// Archive the replaced value into `previous_values`.
    pub enabled: bool,
    /// Retention bound for `previous_values`.
    pub keep: usize,
}

impl Versioning {
    pub fn retain(keep: usize) -> Self {
        Self {
            enabled: true,
            keep,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            keep: 0,
        }
    }
}

// ============================================================================
// SecretEntry
// ============================================================================

/// One stored secret. `value` and every element of `previous_values` are
/// sealed by the vault cipher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretEntry {
    pub value: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    pub version: u64,
    /// Newest first.
    #[serde(default)]
    pub previous_values: Vec<String>,
}

impl SecretEntry {
    /// A fresh, unversioned entry around an already sealed value.
    pub fn new(sealed_value: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            value: sealed_value.into(),
            description: String::new(),
            tags: BTreeSet::new(),
            expires: None,
            created: now,
            last_updated: now,
            meta: BTreeMap::new(),
            version: 1,
            previous_values: Vec::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// Normalise an entry written where nothing existed before.
    pub(crate) fn into_first_version(mut self, now: DateTime<Utc>) -> Self {
        self.version = 1;
        self.created = now;
        self.last_updated = now;
        self.previous_values.clear();
        self
    }

    /// Turn `self` into the successor of `previous`.
    ///
    /// The version always advances; history is inherited from `previous`
    /// and, when versioning is enabled, the replaced value is pushed to the
    /// front and the list trimmed from the back.
    pub(crate) fn supersede(
        mut self,
        previous: SecretEntry,
        versioning: Versioning,
        now: DateTime<Utc>,
    ) -> Self {
        self.version = previous.version.saturating_add(1);
        self.created = previous.created;
        self.last_updated = now;
        self.previous_values = previous.previous_values;
        if versioning.enabled {
            self.previous_values.insert(0, previous.value);
            self.previous_values.truncate(versioning.keep);
        }
        self
    }
}

// ============================================================================
// Vault document
// ============================================================================

/// Secrets of one category, keyed by secret key.
pub type Category = BTreeMap<String, SecretEntry>;

/// Categories of one project.
pub type Project = BTreeMap<String, Category>;

/// The whole persisted vault: project → category → key → entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultDocument {
    pub projects: BTreeMap<String, Project>,
}

impl VaultDocument {
    pub fn entry(&self, address: &SecretAddress) -> Option<&SecretEntry> {
        self.projects
            .get(&address.project)?
            .get(&address.category)?
            .get(&address.key)
    }

    /// The category map for `(project, category)`, created on demand.
    pub fn category_mut(&mut self, project: &str, category: &str) -> &mut Category {
        self.projects
            .entry(project.to_string())
            .or_default()
            .entry(category.to_string())
            .or_default()
    }

    pub fn remove(&mut self, address: &SecretAddress) -> Option<SecretEntry> {
        self.projects
            .get_mut(&address.project)?
            .get_mut(&address.category)?
            .remove(&address.key)
    }

    /// Every entry of a project, optionally narrowed to one category.
    pub fn entries(&self, project: &str, category: Option<&str>) -> Vec<(SecretAddress, &SecretEntry)> {
        let Some(categories) = self.projects.get(project) else {
            return Vec::new();
        };
        categories
            .iter()
            .filter(|(name, _)| category.map_or(true, |wanted| wanted == name.as_str()))
            .flat_map(|(category_name, secrets)| {
                secrets.iter().map(move |(key, entry)| {
                    (SecretAddress::new(project, category_name.as_str(), key.as_str()), entry)
                })
            })
            .collect()
    }
}
