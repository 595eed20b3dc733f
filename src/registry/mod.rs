//! In-memory dataset registry
//!
//! Datasets are keyed by a canonical identifier. Any number of aliases may
//! point at one identifier. Entries and aliases live under one `RwLock`, so
//! lookups run in parallel and every mutation is serialized.

pub mod resolver;

pub use resolver::{ReferencedEntry, Resolution, ResolvedVia};

use crate::core::{DaemonError, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

/// What a write does when its key is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Fail with `DuplicateIdentifier` / `AliasConflict`.
    Reject,
    /// Replace the existing value.
    Overwrite,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Overwrite => "overwrite",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("policy must be one of: reject, overwrite (got '{other}')")),
        }
    }
}

/// One registered dataset.
#[derive(Debug)]
pub struct DatasetEntry<T> {
    pub identifier: String,
    pub payload: Arc<T>,
    pub created_at: DateTime<Utc>,
}

impl<T> Clone for DatasetEntry<T> {
    fn clone(&self) -> Self {
        Self {
            identifier: self.identifier.clone(),
            payload: Arc::clone(&self.payload),
            created_at: self.created_at,
        }
    }
}

struct RegistryInner<T> {
    entries: HashMap<String, DatasetEntry<T>>,
    /// alias -> identifier
    aliases: HashMap<String, String>,
    next_id: u64,
}

impl<T> RegistryInner<T> {
    /// Lowest numeric identifier at or above `next_id` that is not taken.
    fn free_id(&self) -> Result<u64> {
        let mut candidate = self.next_id;
        while self.entries.contains_key(&candidate.to_string()) {
            candidate = candidate
                .checked_add(1)
                .ok_or(DaemonError::IdentifiersExhausted)?;
        }
        Ok(candidate)
    }

    /// Aliases targeting `identifier`, sorted.
    fn aliases_of(&self, identifier: &str) -> Vec<String> {
        let mut aliases: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == identifier)
            .map(|(alias, _)| alias.clone())
            .collect();
        aliases.sort();
        aliases
    }

    fn observe_identifier(&mut self, identifier: &str) {
        if let Ok(numeric) = identifier.parse::<u64>() {
            if numeric >= self.next_id {
                self.next_id = numeric.saturating_add(1);
            }
        }
    }
}

/// Process-wide dataset registry
///
/// Both conflict policies are fixed at construction and never change for
/// the lifetime of the registry.
pub struct Registry<T> {
    inner: RwLock<RegistryInner<T>>,
    duplicate_policy: ConflictPolicy,
    alias_policy: ConflictPolicy,
}

impl<T> Registry<T> {
    /// Registry that rejects duplicate identifiers and conflicting aliases.
    pub fn new() -> Self {
        Self::with_policies(ConflictPolicy::Reject, ConflictPolicy::Reject)
    }

    pub fn with_policies(duplicate_policy: ConflictPolicy, alias_policy: ConflictPolicy) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                entries: HashMap::new(),
                aliases: HashMap::new(),
                next_id: 1,
            }),
            duplicate_policy,
            alias_policy,
        }
    }

    pub fn duplicate_policy(&self) -> ConflictPolicy {
        self.duplicate_policy
    }

    pub fn alias_policy(&self) -> ConflictPolicy {
        self.alias_policy
    }

    /// Register a dataset under `identifier`, taking ownership of the payload.
    ///
    /// Under `Overwrite` the payload and `created_at` are replaced and aliases
    /// that already point at `identifier` keep pointing at it.
    pub fn register(&self, identifier: &str, payload: T) -> Result<()> {
        if identifier.is_empty() {
            return Err(DaemonError::Config("identifier cannot be empty".to_string()));
        }

        let mut inner = self.inner.write()?;

        if inner.entries.contains_key(identifier) {
            match self.duplicate_policy {
                ConflictPolicy::Reject => {
                    return Err(DaemonError::DuplicateIdentifier(identifier.to_string()));
                }
                ConflictPolicy::Overwrite => {
                    debug!("Overwriting dataset '{}'", identifier);
                }
            }
        }

        inner.entries.insert(
            identifier.to_string(),
            DatasetEntry {
                identifier: identifier.to_string(),
                payload: Arc::new(payload),
                created_at: Utc::now(),
            },
        );
        info!("Registered dataset '{}'", identifier);
        Ok(())
    }

    /// Register a dataset under the next free numeric identifier.
    pub fn register_next(&self, payload: T) -> Result<String> {
        let mut inner = self.inner.write()?;

        let candidate = inner.free_id()?;
        inner.next_id = candidate.saturating_add(1);

        let identifier = candidate.to_string();
        inner.entries.insert(
            identifier.clone(),
            DatasetEntry {
                identifier: identifier.clone(),
                payload: Arc::new(payload),
                created_at: Utc::now(),
            },
        );
        info!("Registered dataset '{}'", identifier);
        Ok(identifier)
    }

    /// Register a dataset and bind an alias to it in one step.
    ///
    /// Both policies are checked before anything is written, so a rejected
    /// alias leaves the registry untouched. Without an identifier the next
    /// numeric one is allocated.
    pub fn register_with_alias(
        &self,
        identifier: Option<&str>,
        alias: &str,
        payload: T,
    ) -> Result<String> {
        if alias.is_empty() {
            return Err(DaemonError::Config("alias cannot be empty".to_string()));
        }
        if identifier.is_some_and(str::is_empty) {
            return Err(DaemonError::Config("identifier cannot be empty".to_string()));
        }

        let mut inner = self.inner.write()?;

        let identifier = match identifier {
            Some(identifier) => {
                if inner.entries.contains_key(identifier)
                    && self.duplicate_policy == ConflictPolicy::Reject
                {
                    return Err(DaemonError::DuplicateIdentifier(identifier.to_string()));
                }
                identifier.to_string()
            }
            None => inner.free_id()?.to_string(),
        };

        if let Some(bound_to) = inner.aliases.get(alias) {
            if *bound_to != identifier && self.alias_policy == ConflictPolicy::Reject {
                return Err(DaemonError::AliasConflict {
                    alias: alias.to_string(),
                    bound_to: bound_to.clone(),
                });
            }
        }

        inner.observe_identifier(&identifier);

        inner.entries.insert(
            identifier.clone(),
            DatasetEntry {
                identifier: identifier.clone(),
                payload: Arc::new(payload),
                created_at: Utc::now(),
            },
        );
        inner.aliases.insert(alias.to_string(), identifier.clone());
        info!("Registered dataset '{}' as '{}'", identifier, alias);
        Ok(identifier)
    }

    pub fn get(&self, identifier: &str) -> Result<Arc<T>> {
        self.entry(identifier).map(|entry| entry.payload)
    }

    pub fn entry(&self, identifier: &str) -> Result<DatasetEntry<T>> {
        let inner = self.inner.read()?;
        inner
            .entries
            .get(identifier)
            .cloned()
            .ok_or_else(|| DaemonError::NotFound(identifier.to_string()))
    }

    pub fn contains(&self, identifier: &str) -> Result<bool> {
        Ok(self.inner.read()?.entries.contains_key(identifier))
    }

    /// Remove a dataset together with every alias that targets it.
    pub fn deregister(&self, identifier: &str) -> Result<DatasetEntry<T>> {
        let mut inner = self.inner.write()?;

        let entry = inner
            .entries
            .remove(identifier)
            .ok_or_else(|| DaemonError::NotFound(identifier.to_string()))?;
        inner.aliases.retain(|_, target| target.as_str() != identifier);

        info!("Deregistered dataset '{}'", identifier);
        Ok(entry)
    }

    /// Point `alias` at `identifier`.
    ///
    /// Re-binding an alias to the identifier it already targets always succeeds.
    pub fn bind_alias(&self, alias: &str, identifier: &str) -> Result<()> {
        if alias.is_empty() {
            return Err(DaemonError::Config("alias cannot be empty".to_string()));
        }

        let mut inner = self.inner.write()?;

        if !inner.entries.contains_key(identifier) {
            return Err(DaemonError::UnknownIdentifier(identifier.to_string()));
        }

        if let Some(bound_to) = inner.aliases.get(alias) {
            if bound_to == identifier {
                return Ok(());
            }
            if self.alias_policy == ConflictPolicy::Reject {
                return Err(DaemonError::AliasConflict {
                    alias: alias.to_string(),
                    bound_to: bound_to.clone(),
                });
            }
            debug!("Rebinding alias '{}' from '{}' to '{}'", alias, bound_to, identifier);
        }

        inner.aliases.insert(alias.to_string(), identifier.to_string());
        Ok(())
    }

    /// Look up the identifier an alias points at. No side effects.
    pub fn resolve_alias(&self, alias: &str) -> Result<String> {
        let inner = self.inner.read()?;
        inner
            .aliases
            .get(alias)
            .cloned()
            .ok_or_else(|| DaemonError::UnknownAlias(alias.to_string()))
    }

    pub fn unbind_alias(&self, alias: &str) -> Result<String> {
        let mut inner = self.inner.write()?;
        inner
            .aliases
            .remove(alias)
            .ok_or_else(|| DaemonError::UnknownAlias(alias.to_string()))
    }

    /// Aliases targeting `identifier`, sorted.
    pub fn aliases_of(&self, identifier: &str) -> Result<Vec<String>> {
        Ok(self.inner.read()?.aliases_of(identifier))
    }

    /// Snapshot of every entry with its aliases, ordered by identifier.
    pub fn list(&self) -> Result<Vec<(DatasetEntry<T>, Vec<String>)>> {
        let inner = self.inner.read()?;

        let mut by_target: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (alias, target) in &inner.aliases {
            by_target.entry(target.as_str()).or_default().push(alias.clone());
        }

        let mut listed: Vec<(DatasetEntry<T>, Vec<String>)> = inner
            .entries
            .values()
            .map(|entry| {
                let mut aliases = by_target
                    .get(entry.identifier.as_str())
                    .cloned()
                    .unwrap_or_default();
                aliases.sort();
                (entry.clone(), aliases)
            })
            .collect();
        listed.sort_by(|a, b| a.0.identifier.cmp(&b.0.identifier));
        Ok(listed)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.read()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
