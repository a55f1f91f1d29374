//! In-memory backend with snapshot isolation.
//!
//! Readers hold an `Arc` of an immutable snapshot. A write transaction copies
//! the snapshot's entries on its first mutation and swaps a new snapshot in on
//! commit, provided no other writer committed since it started.

use bytes::Bytes;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{Encloser, Result, Store, StoreError, Transaction};
use crate::dns::enums::DNSResourceType;
use crate::dns::name::{Bsearcher, Name};
use crate::rrset::{RRset, SearchKey};

#[derive(Debug, Clone)]
struct StoredSet {
    owner: Name,
    ttl: u32,
    rdcount: u16,
    rdata: Bytes,
}

type Entries = BTreeMap<SearchKey, StoredSet>;

impl std::borrow::Borrow<[u8]> for SearchKey {
    fn borrow(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Zone apexes in canonical order, searched by owner
#[derive(Debug, Default)]
struct ZoneIndex {
    apexes: Vec<Name>,
    searcher: Option<Bsearcher>,
}

impl ZoneIndex {
    fn build(entries: &Entries) -> Self {
        // Key order is canonical order, so the apexes come out sorted.
        let apexes: Vec<Name> = entries
            .iter()
            .filter(|(key, _)| key.rtype() == DNSResourceType::SOA)
            .map(|(_, set)| set.owner.clone())
            .collect();
        debug_assert!(apexes.windows(2).all(|w| w[0] < w[1]));
        let searcher = Some(Bsearcher::new(apexes.len()));
        Self { apexes, searcher }
    }

    /// Longest apex that is an ancestor-or-equal of `name`
    fn find(&self, name: &Name) -> Option<&Name> {
        let searcher = self.searcher.as_ref()?;
        name.ancestors().find_map(|ancestor| {
            let i = searcher.search(&self.apexes, ancestor.wire())?;
            (self.apexes[i] == ancestor).then(|| &self.apexes[i])
        })
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    generation: u64,
    entries: Entries,
    zones: ZoneIndex,
}

impl Snapshot {
    fn new(generation: u64, entries: Entries) -> Self {
        let zones = ZoneIndex::build(&entries);
        Self {
            generation,
            entries,
            zones,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    current: RwLock<Arc<Snapshot>>,
}

/// Store backend keeping every RRset in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of RRsets in the latest committed snapshot
    pub fn len(&self) -> usize {
        self.shared.current.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn txn(&self, readonly: bool) -> Result<Box<dyn Transaction>> {
        let mut txn = MemoryTxn {
            shared: Arc::clone(&self.shared),
            readonly,
            base: None,
            working: None,
        };
        txn.renew()?;
        Ok(Box::new(txn))
    }
}

struct MemoryTxn {
    shared: Arc<Shared>,
    readonly: bool,
    base: Option<Arc<Snapshot>>,
    /// Private copy of the entries, made on the first mutation
    working: Option<Entries>,
}

impl MemoryTxn {
    fn base(&self) -> Result<&Arc<Snapshot>> {
        self.base.as_ref().ok_or(StoreError::Released)
    }

    fn entries(&self) -> Result<&Entries> {
        match &self.working {
            Some(working) => Ok(working),
            None => Ok(&self.base()?.entries),
        }
    }

    fn entries_mut(&mut self) -> Result<&mut Entries> {
        if self.readonly {
            return Err(StoreError::ReadOnly);
        }
        if self.working.is_none() {
            let copy = self.base()?.entries.clone();
            self.working = Some(copy);
        }
        self.working.as_mut().ok_or(StoreError::Released)
    }

    fn load(
        entries: &Entries,
        key: &SearchKey,
        rtype: DNSResourceType,
        scratch: &mut RRset,
    ) -> Result<bool> {
        let Some(set) = entries.get(key) else {
            return Ok(false);
        };
        scratch
            .load(set.owner.clone(), rtype, set.ttl, set.rdcount, &set.rdata)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(true)
    }
}

fn soa_key_for(owner_lookup: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(owner_lookup.len() + 3);
    key.extend_from_slice(owner_lookup);
    key.push(0);
    key.extend_from_slice(&u16::from(DNSResourceType::SOA).to_be_bytes());
    key
}

/// Keys starting with `prefix`, in order
fn with_prefix<'a>(
    entries: &'a Entries,
    prefix: &'a [u8],
) -> impl Iterator<Item = (&'a SearchKey, &'a StoredSet)> + 'a {
    entries
        .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(key, _)| key.as_bytes().starts_with(prefix))
}

impl Transaction for MemoryTxn {
    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn get(&self, name: &Name, rtype: DNSResourceType, scratch: &mut RRset) -> Result<bool> {
        let key = SearchKey::new(name, rtype);
        Self::load(self.entries()?, &key, rtype, scratch)
    }

    fn set(&mut self, rrset: &RRset) -> Result<SearchKey> {
        let key = rrset.search_key();
        let stored = StoredSet {
            owner: rrset.owner().clone(),
            ttl: rrset.ttl(),
            rdcount: rrset.rdcount(),
            rdata: Bytes::copy_from_slice(rrset.packed()),
        };
        trace!("set {}", key);
        self.entries_mut()?.insert(key.clone(), stored);
        Ok(key)
    }

    fn del(&mut self, key: &SearchKey) -> Result<()> {
        trace!("del {}", key);
        self.entries_mut()?.remove(key);
        Ok(())
    }

    fn scan(&self, zone: &Name) -> Result<FxHashSet<SearchKey>> {
        let entries = self.entries()?;
        let prefix = SearchKey::prefix(zone);
        let mut keys = FxHashSet::default();
        let mut nested: Option<&[u8]> = None;
        let mut last_owner: Option<&[u8]> = None;

        for (key, _) in with_prefix(entries, &prefix) {
            let owner = key.owner_lookup();
            if let Some(apex) = nested {
                if owner.starts_with(apex) {
                    continue;
                }
                nested = None;
            }
            if last_owner != Some(owner) {
                last_owner = Some(owner);
                if owner != prefix.as_slice()
                    && entries.contains_key(soa_key_for(owner).as_slice())
                {
                    nested = Some(owner);
                    continue;
                }
            }
            keys.insert(key.clone());
        }
        Ok(keys)
    }

    fn zone(&self, name: &Name, scratch: &mut RRset) -> Result<bool> {
        let apex = match &self.working {
            // Uncommitted changes are not indexed yet; check each ancestor.
            Some(working) => name.ancestors().find(|ancestor| {
                working.contains_key(&SearchKey::new(ancestor, DNSResourceType::SOA))
            }),
            None => self.base()?.zones.find(name).cloned(),
        };
        match apex {
            Some(apex) => self.get(&apex, DNSResourceType::SOA, scratch),
            None => Ok(false),
        }
    }

    fn encloser(&self, name: &Name, soa: &RRset, scratch: &mut RRset) -> Result<Encloser> {
        let entries = self.entries()?;
        let apex = soa.owner();
        let mut encloser = Encloser {
            name: apex.clone(),
            cut: false,
        };
        if !name.is_subdomain_of(apex) {
            return Ok(encloser);
        }

        let depth = name.label_count() - apex.label_count();
        let chain: Vec<Name> = name.ancestors().take(depth).collect();
        for candidate in chain.into_iter().rev() {
            let prefix = SearchKey::prefix(&candidate);
            if with_prefix(entries, &prefix).next().is_none() {
                break;
            }
            let ns = SearchKey::new(&candidate, DNSResourceType::NS);
            if Self::load(entries, &ns, DNSResourceType::NS, scratch)? {
                debug!("zone cut at {} for {}", candidate, name);
                return Ok(Encloser {
                    name: candidate,
                    cut: true,
                });
            }
            encloser.name = candidate;
        }
        Ok(encloser)
    }

    fn commit(&mut self) -> Result<()> {
        let base = self.base.take().ok_or(StoreError::Released)?;
        let Some(working) = self.working.take() else {
            return Ok(());
        };
        let mut current = self.shared.current.write();
        if current.generation != base.generation {
            return Err(StoreError::Conflict);
        }
        let generation = base.generation + 1;
        debug!("committing generation {} with {} entries", generation, working.len());
        *current = Arc::new(Snapshot::new(generation, working));
        Ok(())
    }

    fn abort(&mut self) {
        self.base = None;
        self.working = None;
    }

    fn reset(&mut self) {
        self.abort();
    }

    fn renew(&mut self) -> Result<()> {
        self.working = None;
        self.base = Some(Arc::clone(&self.shared.current.read()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn rrset(owner: &str, rtype: DNSResourceType, data: &[u8]) -> RRset {
        let mut rr = RRset::new(n(owner), rtype, 300);
        rr.push_rdata(data).unwrap();
        rr
    }

    fn soa(owner: &str) -> RRset {
        let mut rdata = Vec::new();
        rdata.extend_from_slice(n("ns.invalid.").wire());
        rdata.extend_from_slice(n("admin.invalid.").wire());
        rdata.extend_from_slice(&[0u8; 20]);
        rrset(owner, DNSResourceType::SOA, &rdata)
    }

    fn populate(store: &MemoryStore, sets: &[RRset]) {
        let mut txn = store.txn(false).unwrap();
        for set in sets {
            txn.set(set).unwrap();
        }
        txn.commit().unwrap();
    }

    #[test]
    fn test_snapshot_isolation() {
        let store = MemoryStore::new();
        let reader = store.txn(true).unwrap();
        populate(&store, &[rrset("a.example.", DNSResourceType::A, &[1, 2, 3, 4])]);

        let mut scratch = RRset::default();
        assert!(!reader.get(&n("a.example."), DNSResourceType::A, &mut scratch).unwrap());
        let fresh = store.txn(true).unwrap();
        assert!(fresh.get(&n("A.EXAMPLE."), DNSResourceType::A, &mut scratch).unwrap());
        assert_eq!(scratch.rdsetget(0).unwrap().data(), &[1, 2, 3, 4]);
        assert_eq!(scratch.owner().to_string(), "a.example.");
    }

    #[test]
    fn test_reset_and_renew() {
        let store = MemoryStore::new();
        let mut reader = store.txn(true).unwrap();
        reader.reset();
        let mut scratch = RRset::default();
        assert_eq!(
            reader.get(&n("a.example."), DNSResourceType::A, &mut scratch),
            Err(StoreError::Released)
        );
        populate(&store, &[rrset("a.example.", DNSResourceType::A, &[1, 2, 3, 4])]);
        reader.renew().unwrap();
        assert!(reader.get(&n("a.example."), DNSResourceType::A, &mut scratch).unwrap());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let store = MemoryStore::new();
        let mut reader = store.txn(true).unwrap();
        let set = rrset("a.example.", DNSResourceType::A, &[1, 2, 3, 4]);
        assert_eq!(reader.set(&set), Err(StoreError::ReadOnly));
        assert_eq!(reader.del(&set.search_key()), Err(StoreError::ReadOnly));
    }

    #[test]
    fn test_abort_discards_and_conflict_detected() {
        let store = MemoryStore::new();
        let mut txn = store.txn(false).unwrap();
        txn.set(&rrset("a.example.", DNSResourceType::A, &[1, 2, 3, 4])).unwrap();
        txn.abort();
        assert!(store.is_empty());

        let mut first = store.txn(false).unwrap();
        let mut second = store.txn(false).unwrap();
        first.set(&rrset("a.example.", DNSResourceType::A, &[1, 2, 3, 4])).unwrap();
        second.set(&rrset("b.example.", DNSResourceType::A, &[1, 2, 3, 5])).unwrap();
        first.commit().unwrap();
        assert_eq!(second.commit(), Err(StoreError::Conflict));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_scan_excludes_nested_zone() {
        let store = MemoryStore::new();
        populate(
            &store,
            &[
                soa("example."),
                rrset("www.example.", DNSResourceType::A, &[1, 1, 1, 1]),
                rrset("sub.example.", DNSResourceType::NS, n("ns.sub.example.").wire()),
                soa("hosted.example."),
                rrset("hosted.example.", DNSResourceType::NS, n("ns.invalid.").wire()),
                rrset("x.hosted.example.", DNSResourceType::A, &[2, 2, 2, 2]),
                rrset("hostedx.example.", DNSResourceType::A, &[3, 3, 3, 3]),
                rrset("example.org.", DNSResourceType::A, &[4, 4, 4, 4]),
            ],
        );
        let txn = store.txn(true).unwrap();
        let keys = txn.scan(&n("example.")).unwrap();
        let mut names: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "example. SOA",
                "hostedx.example. A",
                "sub.example. NS",
                "www.example. A",
            ]
        );
        assert_eq!(txn.scan(&n("hosted.example.")).unwrap().len(), 3);
    }

    #[test]
    fn test_zone_picks_longest_apex() {
        let store = MemoryStore::new();
        populate(&store, &[soa("example."), soa("hosted.example."), soa("org.")]);
        let txn = store.txn(true).unwrap();
        let mut scratch = RRset::default();

        assert!(txn.zone(&n("a.b.example."), &mut scratch).unwrap());
        assert_eq!(scratch.owner(), &n("example."));
        assert!(txn.zone(&n("x.hosted.example."), &mut scratch).unwrap());
        assert_eq!(scratch.owner(), &n("hosted.example."));
        assert!(txn.zone(&n("org."), &mut scratch).unwrap());
        assert!(!txn.zone(&n("example.net."), &mut scratch).unwrap());
        assert!(!txn.zone(&n("."), &mut scratch).unwrap());
    }

    #[test]
    fn test_zone_index_with_zero_byte_labels() {
        let store = MemoryStore::new();
        populate(&store, &[soa("x.a."), soa("a\\000b."), soa("c.")]);
        let txn = store.txn(true).unwrap();
        let mut scratch = RRset::default();

        assert!(txn.zone(&n("www.a\\000b."), &mut scratch).unwrap());
        assert_eq!(scratch.owner(), &n("a\\000b."));
        assert!(txn.zone(&n("www.x.a."), &mut scratch).unwrap());
        assert_eq!(scratch.owner(), &n("x.a."));
        assert!(!txn.zone(&n("b.a."), &mut scratch).unwrap());
        assert_eq!(txn.scan(&n("a\\000b.")).unwrap().len(), 1);
    }

    #[test]
    fn test_zone_sees_uncommitted_soa() {
        let store = MemoryStore::new();
        let mut txn = store.txn(false).unwrap();
        txn.set(&soa("example.")).unwrap();
        let mut scratch = RRset::default();
        assert!(txn.zone(&n("www.example."), &mut scratch).unwrap());
    }

    #[test]
    fn test_encloser_walk() {
        let store = MemoryStore::new();
        let apex = soa("example.");
        populate(
            &store,
            &[
                apex.clone(),
                rrset("example.", DNSResourceType::NS, n("ns.example.").wire()),
                rrset("www.example.", DNSResourceType::A, &[1, 1, 1, 1]),
                rrset("a.b.example.", DNSResourceType::A, &[1, 1, 1, 2]),
                rrset("sub.example.", DNSResourceType::NS, n("ns.sub.example.").wire()),
            ],
        );
        let txn = store.txn(true).unwrap();
        let mut scratch = RRset::default();

        let found = txn.encloser(&n("www.example."), &apex, &mut scratch).unwrap();
        assert_eq!(found, Encloser { name: n("www.example."), cut: false });

        let found = txn.encloser(&n("nx.example."), &apex, &mut scratch).unwrap();
        assert_eq!(found, Encloser { name: n("example."), cut: false });

        // Empty non-terminal: b.example. owns nothing but has a descendant.
        let found = txn.encloser(&n("b.example."), &apex, &mut scratch).unwrap();
        assert_eq!(found, Encloser { name: n("b.example."), cut: false });

        let found = txn.encloser(&n("deep.www.example."), &apex, &mut scratch).unwrap();
        assert_eq!(found, Encloser { name: n("www.example."), cut: false });

        let found = txn.encloser(&n("host.sub.example."), &apex, &mut scratch).unwrap();
        assert_eq!(found, Encloser { name: n("sub.example."), cut: true });
        assert_eq!(scratch.rtype(), DNSResourceType::NS);

        // The apex NS set is not a cut.
        let found = txn.encloser(&n("example."), &apex, &mut scratch).unwrap();
        assert_eq!(found, Encloser { name: n("example."), cut: false });
    }
}
