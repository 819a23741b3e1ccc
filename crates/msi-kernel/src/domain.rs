//! Capability domains.
//!
//! The manager owns every domain record; lanes and callers only ever hold a
//! [`DomainId`]. A check against `None` is the host context and always passes,
//! a check against an unknown id always fails.

use std::collections::HashMap;

use msi_types::{DomainId, DomainManifest, Grant, Perms};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::KernelError;

#[derive(Debug, Clone)]
struct DomainRecord {
    name: String,
    grants: Vec<Grant>,
    sealed: bool,
}

#[derive(Debug, Default)]
pub struct DomainManager {
    domains: RwLock<HashMap<DomainId, DomainRecord>>,
}

impl DomainManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, manifest: &DomainManifest) -> DomainId {
        let id = DomainId::generate();
        let record = DomainRecord {
            name: manifest.name.clone(),
            grants: manifest.grants.clone(),
            sealed: manifest.seal,
        };
        debug!(
            domain = %id,
            name = %record.name,
            grants = record.grants.len(),
            sealed = record.sealed,
            "domain created"
        );
        self.domains.write().insert(id.clone(), record);
        id
    }

    /// Appends a grant. Redundant grants are kept; checks are existential.
    pub fn grant(&self, domain: &DomainId, grant: Grant) -> Result<(), KernelError> {
        let mut domains = self.domains.write();
        let record = domains
            .get_mut(domain)
            .ok_or_else(|| KernelError::UnknownDomain(domain.clone()))?;
        if record.sealed {
            return Err(KernelError::DomainSealed {
                domain: domain.clone(),
                name: record.name.clone(),
            });
        }
        debug!(domain = %domain, grant = %grant.resource(), "grant added");
        record.grants.push(grant);
        Ok(())
    }

    pub fn seal(&self, domain: &DomainId) -> Result<(), KernelError> {
        let mut domains = self.domains.write();
        let record = domains
            .get_mut(domain)
            .ok_or_else(|| KernelError::UnknownDomain(domain.clone()))?;
        record.sealed = true;
        Ok(())
    }

    pub fn allowed(&self, domain: Option<&DomainId>, want: &Grant) -> bool {
        let Some(domain) = domain else {
            return true;
        };
        let domains = self.domains.read();
        match domains.get(domain) {
            Some(record) => record.grants.iter().any(|held| grant_covers(held, want)),
            None => false,
        }
    }

    pub fn name(&self, domain: &DomainId) -> Option<String> {
        self.domains.read().get(domain).map(|r| r.name.clone())
    }

    pub fn exists(&self, domain: &DomainId) -> bool {
        self.domains.read().contains_key(domain)
    }

    pub fn is_sealed(&self, domain: &DomainId) -> bool {
        self.domains
            .read()
            .get(domain)
            .map(|r| r.sealed)
            .unwrap_or(false)
    }

    /// Snapshot of the grants currently held by a domain.
    pub fn grants(&self, domain: &DomainId) -> Option<Vec<Grant>> {
        self.domains.read().get(domain).map(|r| r.grants.clone())
    }

    pub fn domain_count(&self) -> usize {
        self.domains.read().len()
    }

    pub fn list(&self) -> Vec<DomainId> {
        self.domains.read().keys().cloned().collect()
    }

    pub fn remove(&self, domain: &DomainId) {
        self.domains.write().remove(domain);
    }

    pub fn clear(&self) {
        self.domains.write().clear();
    }
}

/// Whether a held grant satisfies a wanted grant of the same kind.
///
/// Event prefixes match in either direction, so a domain holding `percept/`
/// may also act on the parent topic `percept`.
pub fn grant_covers(held: &Grant, want: &Grant) -> bool {
    match (held, want) {
        (
            Grant::Events { topic_prefix: held },
            Grant::Events { topic_prefix: want },
        ) => want.starts_with(held.as_str()) || held.starts_with(want.as_str()),
        (
            Grant::State {
                name: held_name,
                perms: held_perms,
            },
            Grant::State {
                name: want_name,
                perms: want_perms,
            },
        ) => held_name == want_name && perms_cover(*held_perms, *want_perms),
        (
            Grant::Assoc {
                space: held_space,
                perms: held_perms,
            },
            Grant::Assoc {
                space: want_space,
                perms: want_perms,
            },
        ) => held_space == want_space && perms_cover(*held_perms, *want_perms),
        (Grant::Clock, Grant::Clock) => true,
        (Grant::Accel { which: held }, Grant::Accel { which: want }) => held == want,
        _ => false,
    }
}

fn perms_cover(held: Perms, want: Perms) -> bool {
    held == Perms::RW || held == want
}
