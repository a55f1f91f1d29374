//! Resource record sets and their packed rdata storage.
//!
//! All rdata entries of one RRset live in a single buffer as
//! `[u16 rdlen][rdlen bytes][pad]`, one after another, `rdcount` of them.
//! Each entry occupies [`rdata_array_size`] bytes.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

use crate::dns::enums::{DNSResourceClass, DNSResourceType};
use crate::dns::name::{HasOwner, Name, dname_len};
use crate::dns::wire::{self, WireReader, WireWriter};
use crate::error::DnsError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RdataError {
    #[error("Rdata index {index} out of range for set of {count}")]
    OutOfRange { index: u16, count: u16 },

    #[error("Rdata entry of {0} bytes exceeds the 65535 byte limit")]
    TooLarge(usize),

    #[error("RRset already holds the maximum number of entries")]
    TooMany,

    #[error("Rdata buffer does not match its entry count: {0}")]
    Corrupt(String),
}

/// Bytes one rdata entry of `rdlen` data bytes occupies in the set buffer:
/// the length header plus data, rounded up to an even size.
#[inline]
pub const fn rdata_array_size(rdlen: u16) -> usize {
    (2 + rdlen as usize + 1) & !1
}

/// One rdata entry of a set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rdata<'a> {
    data: &'a [u8],
}

impl<'a> Rdata<'a> {
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn rdlen(&self) -> u16 {
        self.data.len() as u16
    }

    #[inline]
    pub fn array_size(&self) -> usize {
        rdata_array_size(self.rdlen())
    }
}

/// Entry at byte `offset` of a packed buffer
fn entry_at(buf: &[u8], offset: usize) -> Result<Rdata<'_>, RdataError> {
    let mut reader = WireReader::new(buf);
    let corrupt = |e: crate::error::WireError| RdataError::Corrupt(e.to_string());
    reader.seek(offset).map_err(corrupt)?;
    let rdlen = reader.read_u16().map_err(corrupt)?;
    let data = reader.read_bytes(rdlen as usize).map_err(corrupt)?;
    if offset + rdata_array_size(rdlen) > buf.len() {
        return Err(RdataError::Corrupt(format!(
            "entry at {offset} runs past the end of the buffer"
        )));
    }
    Ok(Rdata { data })
}

/// Total array size of `count` entries packed in `buf`
fn packed_len(buf: &[u8], count: u16) -> Result<usize, RdataError> {
    let mut offset = 0;
    for _ in 0..count {
        offset += entry_at(buf, offset)?.array_size();
    }
    Ok(offset)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RRset {
    owner: Name,
    rtype: DNSResourceType,
    rclass: DNSResourceClass,
    ttl: u32,
    rdcount: u16,
    rdata: BytesMut,
}

impl RRset {
    pub fn new(owner: Name, rtype: DNSResourceType, ttl: u32) -> Self {
        Self {
            owner,
            rtype,
            rclass: DNSResourceClass::IN,
            ttl,
            rdcount: 0,
            rdata: BytesMut::new(),
        }
    }

    /// Start over as an empty set for a new owner and type, keeping the
    /// buffer's capacity.
    pub fn reset(&mut self, owner: Name, rtype: DNSResourceType, ttl: u32) {
        self.clear();
        self.owner = owner;
        self.rtype = rtype;
        self.ttl = ttl;
    }

    /// Drop all rdata entries, keeping the buffer's capacity
    pub fn clear(&mut self) {
        self.rdata.clear();
        self.rdcount = 0;
    }

    /// Replace the contents with an already packed rdata buffer.
    ///
    /// The buffer is validated against `rdcount`, since it usually comes from
    /// storage rather than from [`RRset::push_rdata`].
    pub fn load(
        &mut self,
        owner: Name,
        rtype: DNSResourceType,
        ttl: u32,
        rdcount: u16,
        packed: &[u8],
    ) -> Result<(), RdataError> {
        let len = packed_len(packed, rdcount)?;
        if len != packed.len() {
            return Err(RdataError::Corrupt(format!(
                "{rdcount} entries use {len} of {} bytes",
                packed.len()
            )));
        }
        self.reset(owner, rtype, ttl);
        self.rdata.extend_from_slice(packed);
        self.rdcount = rdcount;
        Ok(())
    }

    /// Append one rdata entry
    pub fn push_rdata(&mut self, data: &[u8]) -> Result<(), RdataError> {
        let rdlen = u16::try_from(data.len()).map_err(|_| RdataError::TooLarge(data.len()))?;
        if self.rdcount == u16::MAX {
            return Err(RdataError::TooMany);
        }
        let size = rdata_array_size(rdlen);
        self.rdata.reserve(size);
        self.rdata.put_u16(rdlen);
        self.rdata.put_slice(data);
        if size > 2 + data.len() {
            self.rdata.put_u8(0);
        }
        self.rdcount += 1;
        Ok(())
    }

    /// Total size of the packed rdata, found by walking every entry
    pub fn rdsetlen(&self) -> usize {
        // push_rdata and load keep the buffer consistent with rdcount.
        packed_len(&self.rdata, self.rdcount).unwrap_or(self.rdata.len())
    }

    /// The `n`th rdata entry
    pub fn rdsetget(&self, n: u16) -> Result<Rdata<'_>, RdataError> {
        if n >= self.rdcount {
            return Err(RdataError::OutOfRange {
                index: n,
                count: self.rdcount,
            });
        }
        let mut offset = 0;
        for _ in 0..n {
            offset += entry_at(&self.rdata, offset)?.array_size();
        }
        entry_at(&self.rdata, offset)
    }

    /// `(index, entry)` pairs in storage order
    pub fn rdata_iter(&self) -> RdataIter<'_> {
        RdataIter {
            buf: &self.rdata,
            count: self.rdcount,
            index: 0,
            offset: 0,
        }
    }

    #[inline]
    pub fn owner(&self) -> &Name {
        &self.owner
    }

    #[inline]
    pub fn rtype(&self) -> DNSResourceType {
        self.rtype
    }

    #[inline]
    pub fn rclass(&self) -> DNSResourceClass {
        self.rclass
    }

    #[inline]
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    #[inline]
    pub fn rdcount(&self) -> u16 {
        self.rdcount
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rdcount == 0
    }

    /// The packed rdata buffer
    pub fn packed(&self) -> &[u8] {
        &self.rdata
    }

    pub fn search_key(&self) -> SearchKey {
        SearchKey::new(&self.owner, self.rtype)
    }

    /// Serial number carried by an SOA set's first entry
    pub fn soa_serial(&self) -> Result<u32, DnsError> {
        if self.rtype != DNSResourceType::SOA {
            return Err(DnsError::MalformedRecord(format!(
                "{} {} is not an SOA",
                self.owner, self.rtype
            )));
        }
        let rdata = self
            .rdsetget(0)
            .map_err(|e| DnsError::MalformedRecord(e.to_string()))?;
        let mut reader = WireReader::new(rdata.data());
        let mname = dname_len(reader.rest())?;
        reader.seek(mname)?;
        let rname = dname_len(reader.rest())?;
        reader.seek(rname)?;
        Ok(reader.read_u32()?)
    }

    /// Wire size of every record in the set, uncompressed
    pub fn wire_size(&self) -> usize {
        self.rdata_iter()
            .map(|(_, rdata)| self.owner.len() + 10 + rdata.data().len())
            .sum()
    }

    /// Write every record of the set. On error the writer may hold a partial
    /// record; callers that need all-or-nothing check [`RRset::wire_size`].
    pub fn write_records(&self, writer: &mut WireWriter<'_>) -> wire::Result<()> {
        for (_, rdata) in self.rdata_iter() {
            writer.write_bytes(self.owner.wire())?;
            writer.write_u16(self.rtype.into())?;
            writer.write_u16(self.rclass.into())?;
            writer.write_u32(self.ttl)?;
            writer.write_u16(rdata.rdlen())?;
            writer.write_bytes(rdata.data())?;
        }
        Ok(())
    }
}

impl HasOwner for RRset {
    fn owner(&self) -> &[u8] {
        self.owner.wire()
    }
}

/// Iterator over the entries of an [`RRset`]
#[derive(Debug, Clone)]
pub struct RdataIter<'a> {
    buf: &'a [u8],
    count: u16,
    index: u16,
    offset: usize,
}

impl<'a> Iterator for RdataIter<'a> {
    type Item = (u16, Rdata<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let rdata = entry_at(self.buf, self.offset).ok()?;
        let item = (self.index, rdata);
        self.offset += rdata.array_size();
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.count - self.index) as usize;
        (0, Some(left))
    }
}

/// Store key of an RRset: `lookup(owner) || 0x00 || type`.
///
/// The lookup form lists lowercased labels from the root outward, so byte
/// order of keys is canonical name order, then type order, and the keys of a
/// name and all of its descendants share the name's lookup prefix.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SearchKey(Bytes);

impl SearchKey {
    pub fn new(owner: &Name, rtype: DNSResourceType) -> Self {
        let mut key = Vec::with_capacity(owner.len() + 3);
        owner.write_lookup(&mut key);
        key.push(0);
        key.extend_from_slice(&u16::from(rtype).to_be_bytes());
        SearchKey(Bytes::from(key))
    }

    /// Prefix shared by the keys of `name` and all of its descendants
    pub fn prefix(name: &Name) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(name.len());
        name.write_lookup(&mut prefix);
        prefix
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DnsError> {
        if bytes.len() < 3 || bytes[bytes.len() - 3] != 0 {
            return Err(DnsError::MalformedRecord("truncated search key".to_string()));
        }
        Ok(SearchKey(Bytes::copy_from_slice(bytes)))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lookup form of the owner, without terminator or type
    pub fn owner_lookup(&self) -> &[u8] {
        &self.0[..self.0.len().saturating_sub(3)]
    }

    pub fn owner(&self) -> Result<Name, DnsError> {
        Name::from_lookup(self.owner_lookup())
    }

    pub fn rtype(&self) -> DNSResourceType {
        let n = self.0.len();
        if n < 2 {
            return DNSResourceType::Unknown(0);
        }
        u16::from_be_bytes([self.0[n - 2], self.0[n - 1]]).into()
    }
}

impl fmt::Debug for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner() {
            Ok(owner) => write!(f, "SearchKey({owner}/{})", self.rtype()),
            Err(_) => write!(f, "SearchKey({:?})", self.0),
        }
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner() {
            Ok(owner) => write!(f, "{owner} {}", self.rtype()),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}
