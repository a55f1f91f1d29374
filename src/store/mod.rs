//! Transactional RRset storage.
//!
//! The zone sync and answer engines only see the [`Store`] and
//! [`Transaction`] traits. Backends are picked by identifier at startup with
//! [`open`]; an unknown identifier is fatal.

pub mod memory;

use rustc_hash::FxHashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::dns::enums::DNSResourceType;
use crate::dns::name::Name;
use crate::rrset::{RRset, SearchKey};

pub use memory::MemoryStore;

/// Backend used when the configuration names none
pub const DEFAULT_BACKEND: &str = "memory";

/// Identifiers [`open`] accepts
pub const BACKENDS: &[&str] = &["memory"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store backend '{0}' is not available")]
    UnavailableBackend(String),

    #[error("Transaction is read-only")]
    ReadOnly,

    #[error("Transaction has been released")]
    Released,

    #[error("Transaction conflicts with a concurrent commit")]
    Conflict,

    #[error("Corrupt store entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of an encloser lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encloser {
    /// Longest existing name that is an ancestor-or-equal of the queried name,
    /// or the zone cut when `cut` is set
    pub name: Name,
    /// The walk stopped at a delegation; its NS set was loaded into scratch
    pub cut: bool,
}

pub trait Transaction: Send {
    fn is_readonly(&self) -> bool;

    /// Load the RRset at `name`/`rtype` into `scratch`. Returns false if absent.
    fn get(&self, name: &Name, rtype: DNSResourceType, scratch: &mut RRset) -> Result<bool>;

    /// Insert or replace the RRset, returning its key
    fn set(&mut self, rrset: &RRset) -> Result<SearchKey>;

    fn del(&mut self, key: &SearchKey) -> Result<()>;

    /// Keys of every RRset belonging to `zone`. Names under a nested zone apex
    /// (one holding its own SOA) belong to that zone and are left out.
    fn scan(&self, zone: &Name) -> Result<FxHashSet<SearchKey>>;

    /// Load the SOA of the zone with the longest apex that is an
    /// ancestor-or-equal of `name`. Returns false if no zone encloses it.
    fn zone(&self, name: &Name, scratch: &mut RRset) -> Result<bool>;

    /// Walk from the apex of `soa`'s zone toward `name`. The first name below
    /// the apex holding an NS set is a zone cut; its NS set is loaded into
    /// `scratch`. Otherwise returns the deepest existing name on the way.
    fn encloser(&self, name: &Name, soa: &RRset, scratch: &mut RRset) -> Result<Encloser>;

    fn commit(&mut self) -> Result<()>;

    fn abort(&mut self);

    /// Release the snapshot without committing; the handle can be renewed
    fn reset(&mut self);

    /// Start a new transaction on a released handle
    fn renew(&mut self) -> Result<()>;
}

pub trait Store: Send + Sync {
    fn backend(&self) -> &'static str;

    fn txn(&self, readonly: bool) -> Result<Box<dyn Transaction>>;
}

/// Open the backend registered under `backend`
pub fn open(backend: &str) -> Result<Arc<dyn Store>> {
    match backend {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(StoreError::UnavailableBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_known_backend() {
        for id in BACKENDS {
            assert_eq!(open(id).unwrap().backend(), *id);
        }
        assert!(BACKENDS.contains(&DEFAULT_BACKEND));
    }

    #[test]
    fn test_open_unknown_backend() {
        assert_eq!(
            open("lmdb").err(),
            Some(StoreError::UnavailableBackend("lmdb".to_string()))
        );
    }
}
