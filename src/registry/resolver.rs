//! Reference resolution: identifier first, alias second.

use super::{DatasetEntry, Registry};
use crate::core::{DaemonError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedVia {
    Identifier,
    Alias,
}

/// An entry fetched by reference, with the aliases bound to it at that moment.
pub struct ReferencedEntry<T> {
    pub resolution: Resolution,
    pub entry: DatasetEntry<T>,
    pub aliases: Vec<String>,
}

/// Canonical identifier a reference resolved to, and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub identifier: String,
    pub via: ResolvedVia,
}

impl<T> Registry<T> {
    /// Map a client-supplied reference to a canonical identifier.
    ///
    /// A reference that names both an identifier and an alias resolves to the
    /// identifier. Both namespaces are checked under one read lock.
    pub fn resolve(&self, reference: &str) -> Result<Resolution> {
        let inner = self.inner.read()?;

        if inner.entries.contains_key(reference) {
            return Ok(Resolution {
                identifier: reference.to_string(),
                via: ResolvedVia::Identifier,
            });
        }

        match inner.aliases.get(reference) {
            Some(identifier) if inner.entries.contains_key(identifier) => Ok(Resolution {
                identifier: identifier.clone(),
                via: ResolvedVia::Alias,
            }),
            _ => Err(DaemonError::UnresolvedReference(reference.to_string())),
        }
    }

    /// Resolve a reference and fetch its entry and aliases under one read
    /// lock, so a concurrent deregistration cannot split the result.
    pub fn get_by_reference(&self, reference: &str) -> Result<ReferencedEntry<T>> {
        let inner = self.inner.read()?;

        let (entry, via) = match inner.entries.get(reference) {
            Some(entry) => (entry, ResolvedVia::Identifier),
            None => inner
                .aliases
                .get(reference)
                .and_then(|identifier| inner.entries.get(identifier))
                .map(|entry| (entry, ResolvedVia::Alias))
                .ok_or_else(|| DaemonError::UnresolvedReference(reference.to_string()))?,
        };

        Ok(ReferencedEntry {
            resolution: Resolution {
                identifier: entry.identifier.clone(),
                via,
            },
            aliases: inner.aliases_of(&entry.identifier),
            entry: entry.clone(),
        })
    }
}
