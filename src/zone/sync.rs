//! Reconcile a zone file with the store.
//!
//! A sync replaces every RRset of the zone with what the file holds and
//! deletes what the file no longer mentions, all inside one write
//! transaction. When the file's SOA serial matches the stored one nothing is
//! written.

use rustc_hash::FxHashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{Result, ZoneError, ZoneParser, ZoneRecord};
use crate::dns::enums::DNSResourceType;
use crate::dns::name::Name;
use crate::rrset::{RRset, SearchKey};
use crate::sort::heapsort;
use crate::store::{Store, Transaction};

/// Extension of zone files picked up by [`ZoneSync::sync_dir`]
pub const ZONE_FILE_EXTENSION: &str = "zone";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Serial matched the stored SOA; nothing was written
    Unchanged,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub zone: Name,
    pub outcome: SyncOutcome,
    pub serial: u32,
    /// RRsets written, the SOA included
    pub updated: usize,
    /// RRsets deleted because the file no longer has them
    pub removed: usize,
    pub elapsed: Duration,
}

/// Per-run diff state
struct Diff {
    apex: Name,
    candidates: FxHashSet<SearchKey>,
    written: FxHashSet<SearchKey>,
}

pub struct ZoneSync<'a> {
    store: &'a dyn Store,
    /// RRset being assembled from consecutive records
    pending: RRset,
    /// Scratch for SOA lookups: the stored serial, then enclosing zones
    current: RRset,
}

impl<'a> ZoneSync<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            pending: RRset::default(),
            current: RRset::default(),
        }
    }

    /// Sync the records of one zone. The first record must be its SOA.
    pub fn sync_records<I>(&mut self, records: I) -> Result<SyncReport>
    where
        I: IntoIterator<Item = Result<ZoneRecord>>,
    {
        let started = Instant::now();
        let mut records = records.into_iter();
        let soa = match records.next() {
            Some(record) => record?,
            None => return Err(ZoneError::MissingSOA),
        };
        if soa.rtype != DNSResourceType::SOA {
            return Err(ZoneError::MissingSOA);
        }

        let mut txn = self.store.txn(false)?;
        let result = self.apply(txn.as_mut(), soa, &mut records, started);
        if result.is_err() {
            txn.abort();
        }
        result
    }

    fn apply(
        &mut self,
        txn: &mut dyn Transaction,
        soa: ZoneRecord,
        records: &mut dyn Iterator<Item = Result<ZoneRecord>>,
        started: Instant,
    ) -> Result<SyncReport> {
        let apex = soa.owner.clone();
        self.pending.reset(apex.clone(), DNSResourceType::SOA, soa.ttl);
        self.pending.push_rdata(&soa.rdata)?;
        let serial = self.pending.soa_serial()?;

        let stored_serial = if txn.get(&apex, DNSResourceType::SOA, &mut self.current)? {
            Some(self.current.soa_serial()?)
        } else {
            None
        };

        if stored_serial == Some(serial) {
            txn.abort();
            info!("Zone {} unchanged at serial {}", apex, serial);
            return Ok(SyncReport {
                zone: apex,
                outcome: SyncOutcome::Unchanged,
                serial,
                updated: 0,
                removed: 0,
                elapsed: started.elapsed(),
            });
        }

        let candidates = txn.scan(&apex)?;
        debug!(
            "Zone {} serial {:?} -> {}, {} stored RRsets",
            apex,
            stored_serial,
            serial,
            candidates.len()
        );
        let mut diff = Diff {
            apex,
            candidates,
            written: FxHashSet::default(),
        };

        for record in records {
            self.merge(txn, &mut diff, record?)?;
        }
        self.flush(txn, &mut diff)?;

        let mut doomed: Vec<SearchKey> = diff.candidates.drain().collect();
        heapsort(&mut doomed, |a, b| a < b);
        for key in &doomed {
            debug!("Removing {}", key);
            txn.del(key)?;
        }

        txn.commit()?;

        let report = SyncReport {
            zone: diff.apex,
            outcome: SyncOutcome::Updated,
            serial,
            updated: diff.written.len(),
            removed: doomed.len(),
            elapsed: started.elapsed(),
        };
        info!(
            "Zone {} updated to serial {}: {} RRsets written, {} removed in {:?}",
            report.zone, report.serial, report.updated, report.removed, report.elapsed
        );
        Ok(report)
    }

    /// Add one record to the pending RRset, flushing it first when the record
    /// starts a different owner or type.
    fn merge(
        &mut self,
        txn: &mut dyn Transaction,
        diff: &mut Diff,
        record: ZoneRecord,
    ) -> Result<()> {
        if record.rtype == DNSResourceType::SOA {
            return Err(ZoneError::DuplicateSOA);
        }
        if !record.owner.is_subdomain_of(&diff.apex) {
            return Err(ZoneError::OutOfZone {
                owner: record.owner.to_string(),
                zone: diff.apex.to_string(),
            });
        }
        // Delegation and glue records at or below a zone hosted here belong
        // to that zone's own file
        if *self.pending.owner() != record.owner
            && txn.zone(&record.owner, &mut self.current)?
            && *self.current.owner() != diff.apex
        {
            debug!(
                "Skipping {} {}: inside hosted zone {}",
                record.owner,
                record.rtype,
                self.current.owner()
            );
            return Ok(());
        }

        if *self.pending.owner() != record.owner || self.pending.rtype() != record.rtype {
            self.flush(txn, diff)?;
            let key = SearchKey::new(&record.owner, record.rtype);
            // A group split across the file continues the set already written
            if !diff.written.contains(&key)
                || !txn.get(&record.owner, record.rtype, &mut self.pending)?
            {
                self.pending.reset(record.owner, record.rtype, record.ttl);
            }
        }
        self.pending.push_rdata(&record.rdata)?;
        Ok(())
    }

    fn flush(&mut self, txn: &mut dyn Transaction, diff: &mut Diff) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let key = txn.set(&self.pending)?;
        diff.candidates.remove(&key);
        diff.written.insert(key);
        self.pending.clear();
        Ok(())
    }

    /// Parse and sync zone file contents. `origin` completes relative names
    /// until the file sets its own `$ORIGIN`.
    pub fn sync_str(&mut self, contents: &str, origin: Option<Name>) -> Result<SyncReport> {
        let parser = match origin {
            Some(origin) => ZoneParser::new(contents).with_origin(origin),
            None => ZoneParser::new(contents),
        };
        self.sync_records(parser)
    }

    /// Sync one zone file. The file stem (`example.com.zone`) is the default
    /// origin.
    pub fn sync_file<P: AsRef<Path>>(&mut self, path: P) -> Result<SyncReport> {
        let path = path.as_ref();
        info!("Syncing zone file: {}", path.display());
        let contents = ZoneParser::read_file(path)?;
        self.sync_str(&contents, origin_from_path(path))
    }

    /// Sync a single zone file, or every `*.zone` file of a directory in name
    /// order. A failing file is reported and the rest still run; `stop` is
    /// checked between files.
    pub fn sync_dir<P: AsRef<Path>>(
        &mut self,
        root: P,
        stop: &AtomicBool,
    ) -> Result<Vec<(PathBuf, Result<SyncReport>)>> {
        let root = root.as_ref();
        let files = if root.is_dir() {
            zone_files(root)?
        } else {
            vec![root.to_path_buf()]
        };

        let mut results = Vec::with_capacity(files.len());
        for path in files {
            if stop.load(Ordering::Relaxed) {
                info!("Sync stopped before {}", path.display());
                break;
            }
            let result = self.sync_file(&path);
            if let Err(e) = &result {
                warn!("Failed to sync {}: {}", path.display(), e);
            }
            results.push((path, result));
        }
        Ok(results)
    }
}

fn zone_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(ZONE_FILE_EXTENSION)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn origin_from_path(path: &Path) -> Option<Name> {
    let stem = path.file_stem()?.to_str()?;
    let origin = format!("{}.", stem.trim_end_matches('.'));
    origin.parse().ok()
}
