//! Wire-format domain names, canonical ordering and owner-sorted binary search.

use bytes::Bytes;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use super::wire::WireReader;
use crate::error::{DnsError, Result};

/// Maximum wire length of a domain name, root label included
pub const MAX_NAME_LEN: usize = 255;

/// Maximum length of a single label
pub const MAX_LABEL_LEN: usize = 63;

/// Wire length of the name starting at `wire[0]`, root label included.
///
/// The walk trusts only the label headers and gives up after
/// [`MAX_NAME_LEN`] bytes, so a chain that never reaches the root label is an
/// error rather than an unbounded loop.
pub fn dname_len(wire: &[u8]) -> Result<usize> {
    let mut pos = 0usize;
    loop {
        if pos >= MAX_NAME_LEN {
            return Err(DnsError::NameTooLong);
        }
        let Some(&len) = wire.get(pos) else {
            return Err(DnsError::UnterminatedName);
        };
        match len & 0xc0 {
            0x00 => {}
            0xc0 => return Err(DnsError::CompressedName),
            _ => return Err(DnsError::InvalidLabelLength(len)),
        }
        pos += 1 + len as usize;
        if len == 0 {
            return Ok(pos);
        }
    }
}

/// Start offsets of the non-root labels, leftmost first.
fn label_offsets(wire: &[u8]) -> SmallVec<[u8; 128]> {
    let mut offsets = SmallVec::new();
    let mut pos = 0usize;
    while pos < wire.len() && pos < MAX_NAME_LEN {
        let len = wire[pos] as usize;
        if len == 0 {
            break;
        }
        offsets.push(pos as u8);
        pos += 1 + len;
    }
    offsets
}

#[inline]
fn label_at(wire: &[u8], offset: u8) -> &[u8] {
    let start = offset as usize + 1;
    let end = (start + wire[offset as usize] as usize).min(wire.len());
    &wire[start..end]
}

#[inline]
fn cmp_label(a: &[u8], b: &[u8]) -> Ordering {
    a.iter()
        .map(u8::to_ascii_lowercase)
        .cmp(b.iter().map(u8::to_ascii_lowercase))
}

/// Canonical DNS name order (RFC 4034 §6.1): labels are compared from the
/// root outward, case-insensitively, and an ancestor sorts before its
/// descendants.
pub fn dname_cmp(a: &[u8], b: &[u8]) -> Ordering {
    let la = label_offsets(a);
    let lb = label_offsets(b);
    for (&oa, &ob) in la.iter().rev().zip(lb.iter().rev()) {
        match cmp_label(label_at(a, oa), label_at(b, ob)) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    la.len().cmp(&lb.len())
}

/// An uncompressed wire-format domain name
#[derive(Clone)]
pub struct Name(Bytes);

impl Name {
    pub fn root() -> Self {
        Name(Bytes::from_static(&[0]))
    }

    /// Read an uncompressed name at the reader's cursor
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self> {
        let len = dname_len(reader.rest())?;
        let wire = reader.read_bytes(len)?;
        Ok(Name(Bytes::copy_from_slice(wire)))
    }

    /// Rebuild a name from its lookup form (see [`Name::write_lookup`])
    pub fn from_lookup(lookup: &[u8]) -> Result<Self> {
        let labels: SmallVec<[&[u8]; 16]> = lookup
            .split(|&b| b == 0)
            .filter(|label| !label.is_empty())
            .collect();
        let mut wire = Vec::with_capacity(lookup.len() + 1);
        for encoded in labels.iter().rev() {
            let label = unescape_lookup_label(encoded)?;
            if label.len() > MAX_LABEL_LEN {
                return Err(DnsError::InvalidLabelLength(label.len().min(255) as u8));
            }
            wire.push(label.len() as u8);
            wire.extend_from_slice(&label);
        }
        wire.push(0);
        if wire.len() > MAX_NAME_LEN {
            return Err(DnsError::NameTooLong);
        }
        Ok(Name(Bytes::from(wire)))
    }

    #[inline]
    pub fn wire(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Number of labels, not counting the root
    pub fn label_count(&self) -> usize {
        label_offsets(&self.0).len()
    }

    /// Labels from left to right, root excluded
    pub fn labels(&self) -> impl Iterator<Item = &[u8]> + '_ {
        label_offsets(&self.0)
            .into_iter()
            .map(move |offset| label_at(&self.0, offset))
    }

    /// The name with its leftmost label removed; `None` for the root
    pub fn parent(&self) -> Option<Name> {
        if self.is_root() {
            return None;
        }
        let skip = 1 + self.0[0] as usize;
        Some(Name(self.0.slice(skip..)))
    }

    /// This name and each of its ancestors, ending with the root
    pub fn ancestors(&self) -> impl Iterator<Item = Name> {
        std::iter::successors(Some(self.clone()), Name::parent)
    }

    /// True if `self` equals `other` or lies below it
    pub fn is_subdomain_of(&self, other: &Name) -> bool {
        let ours = self.label_count();
        let theirs = other.label_count();
        if theirs > ours {
            return false;
        }
        let mut tail = self.clone();
        for _ in 0..ours - theirs {
            match tail.parent() {
                Some(parent) => tail = parent,
                None => return false,
            }
        }
        tail == *other
    }

    /// Append the lookup form: lowercased labels from the root outward, each
    /// followed by a zero byte. Byte order of lookup forms is canonical order.
    ///
    /// Label bytes 0x00 and 0x01 are written as `01 01` and `01 02`, so a zero
    /// byte only ever ends a label and the encoding keeps byte order.
    pub fn write_lookup(&self, out: &mut Vec<u8>) {
        let offsets = label_offsets(&self.0);
        for &offset in offsets.iter().rev() {
            for b in label_at(&self.0, offset).iter().map(u8::to_ascii_lowercase) {
                match b {
                    0x00 | LOOKUP_ESCAPE => out.extend_from_slice(&[LOOKUP_ESCAPE, b + 1]),
                    _ => out.push(b),
                }
            }
            out.push(0);
        }
    }
}

const LOOKUP_ESCAPE: u8 = 0x01;

fn unescape_lookup_label(encoded: &[u8]) -> Result<SmallVec<[u8; 64]>> {
    let mut label = SmallVec::new();
    let mut bytes = encoded.iter();
    while let Some(&b) = bytes.next() {
        if b != LOOKUP_ESCAPE {
            label.push(b);
            continue;
        }
        match bytes.next() {
            Some(&escaped @ (0x01 | 0x02)) => label.push(escaped - 1),
            _ => {
                return Err(DnsError::InvalidName(
                    "bad escape in lookup form".to_string(),
                ));
            }
        }
    }
    Ok(label)
}

impl Default for Name {
    fn default() -> Self {
        Name::root()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for b in self.0.iter() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        dname_cmp(&self.0, &other.0)
    }
}

impl FromStr for Name {
    type Err = DnsError;

    /// Parse presentation form, with `\X` and `\DDD` escapes. Names are
    /// taken as absolute whether or not they carry the trailing dot.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == "." {
            return Ok(Name::root());
        }

        let bytes = s.as_bytes();
        let mut labels: Vec<SmallVec<[u8; 64]>> = Vec::new();
        let mut label = SmallVec::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'.' => {
                    labels.push(std::mem::take(&mut label));
                    i += 1;
                }
                b'\\' => {
                    let rest = &bytes[i + 1..];
                    if rest.len() >= 3 && rest[..3].iter().all(u8::is_ascii_digit) {
                        let value = rest[..3]
                            .iter()
                            .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
                        let value = u8::try_from(value)
                            .map_err(|_| DnsError::InvalidName(format!("bad escape in {s:?}")))?;
                        label.push(value);
                        i += 4;
                    } else if let Some(&c) = rest.first() {
                        label.push(c);
                        i += 2;
                    } else {
                        return Err(DnsError::InvalidName(format!("dangling escape in {s:?}")));
                    }
                }
                b => {
                    label.push(b);
                    i += 1;
                }
            }
        }
        // Without a trailing dot the last label is still open
        if !label.is_empty() {
            labels.push(label);
        }

        let mut wire = Vec::with_capacity(s.len() + 2);
        for label in &labels {
            if label.is_empty() {
                return Err(DnsError::InvalidName(format!("empty label in {s:?}")));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(DnsError::InvalidLabelLength(label.len().min(255) as u8));
            }
            wire.push(label.len() as u8);
            wire.extend_from_slice(label);
        }
        wire.push(0);
        if wire.len() > MAX_NAME_LEN {
            return Err(DnsError::NameTooLong);
        }
        Ok(Name(Bytes::from(wire)))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels() {
            for &b in label {
                match b {
                    b'.' | b'\\' => write!(f, "\\{}", b as char)?,
                    0x21..=0x7e => write!(f, "{}", b as char)?,
                    _ => write!(f, "\\{:03}", b)?,
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

/// Anything that can be located by owner name in a canonically sorted array
pub trait HasOwner {
    /// Owner name in wire form
    fn owner(&self) -> &[u8];
}

impl HasOwner for Name {
    fn owner(&self) -> &[u8] {
        &self.0
    }
}

/// Number of halving steps after which [`bsearch`] has converged for an
/// array of `len` elements.
pub fn steps_for(len: usize) -> u32 {
    usize::BITS - len.leading_zeros()
}

/// Binary search over `array`, sorted ascending by owner.
///
/// Returns the index of the element whose owner equals `target`. When no
/// such element exists the search converges on the nearest element below
/// `target`; if `target` sorts before every element that is index 0. Only an
/// empty array yields `None`. With fewer than [`steps_for`] steps the result
/// is wherever the window had narrowed to.
pub fn bsearch<T: HasOwner>(array: &[T], target: &[u8], steps: u32) -> Option<usize> {
    if array.is_empty() {
        return None;
    }
    // Window is [low, low + len). Every element at or above low + len sorts
    // after the target, and array[low] sorts before it once low has moved.
    let mut low = 0usize;
    let mut len = array.len();
    for _ in 0..steps {
        if len == 0 {
            break;
        }
        let half = len / 2;
        let mid = low + half;
        match dname_cmp(array[mid].owner(), target) {
            Ordering::Less => {
                low = mid;
                len -= half;
                if len == 1 && half == 0 {
                    break;
                }
            }
            Ordering::Equal => return Some(mid),
            Ordering::Greater => len = half,
        }
    }
    Some(low)
}

/// [`bsearch`] with the step count computed once for a fixed array length
#[derive(Debug, Clone, Copy)]
pub struct Bsearcher {
    len: usize,
    steps: u32,
}

impl Bsearcher {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            steps: steps_for(len),
        }
    }

    /// Search an array of the length this searcher was built for
    pub fn search<T: HasOwner>(&self, array: &[T], target: &[u8]) -> Option<usize> {
        debug_assert_eq!(array.len(), self.len);
        bsearch(array, target, self.steps)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn test_dname_len() {
        assert_eq!(dname_len(&[0]).unwrap(), 1);
        assert_eq!(dname_len(n("www.example.").wire()).unwrap(), 13);
        // Trailing bytes after the root label are not part of the name.
        assert_eq!(dname_len(&[1, b'a', 0, 9, 9]).unwrap(), 3);
    }

    #[test]
    fn test_dname_len_rejects_malformed() {
        assert_eq!(dname_len(&[]), Err(DnsError::UnterminatedName));
        assert_eq!(dname_len(&[3, b'a', b'b']), Err(DnsError::UnterminatedName));
        assert_eq!(dname_len(&[0xc0, 0x0c]), Err(DnsError::CompressedName));
        assert_eq!(dname_len(&[0x41]), Err(DnsError::InvalidLabelLength(0x41)));

        // 64 labels of length 3 never reach the root within 255 bytes.
        let mut long = Vec::new();
        for _ in 0..64 {
            long.extend_from_slice(&[3, b'a', b'b', b'c']);
        }
        long.push(0);
        assert_eq!(dname_len(&long), Err(DnsError::NameTooLong));
    }

    #[test]
    fn test_name_parse_and_display() {
        assert!(n(".").is_root());
        assert_eq!(n("").to_string(), ".");
        assert_eq!(n("www.Example.").to_string(), "www.Example.");
        assert_eq!(n("www.example"), n("WWW.EXAMPLE."));
        assert!("a..b".parse::<Name>().is_err());
        assert!(format!("{}.", "a".repeat(64)).parse::<Name>().is_err());
    }

    #[test]
    fn test_name_escapes() {
        let name = n("a\\.b.\\065\\200.");
        assert_eq!(name.wire(), b"\x03a.b\x02A\xc8\x00");
        assert_eq!(name.to_string(), "a\\.b.A\\200.");
        assert_eq!(n(&name.to_string()), name);
        assert!("a\\".parse::<Name>().is_err());
        assert!("\\256.".parse::<Name>().is_err());
    }

    #[test]
    fn test_parent_and_subdomain() {
        let name = n("a.b.example.");
        assert_eq!(name.parent().unwrap(), n("b.example."));
        assert_eq!(name.ancestors().count(), 4);
        assert!(name.is_subdomain_of(&n("example.")));
        assert!(name.is_subdomain_of(&n("B.EXAMPLE.")));
        assert!(name.is_subdomain_of(&name));
        assert!(!name.is_subdomain_of(&n("c.example.")));
        assert!(!n("example.").is_subdomain_of(&name));
        assert!(n("ample.").parent().unwrap().is_root());
    }

    #[test]
    fn test_canonical_order_rfc4034_example() {
        let sorted = [
            "example.",
            "a.example.",
            "yljkjljk.a.example.",
            "Z.a.example.",
            "zABC.a.EXAMPLE.",
            "z.example.",
            "*.z.example.",
        ];
        // '*' (0x2a) sorts before letters, so it belongs right after z.example.
        for pair in sorted.windows(2) {
            assert_eq!(
                dname_cmp(n(pair[0]).wire(), n(pair[1]).wire()),
                Ordering::Less,
                "{} < {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_dname_cmp_reflexive_and_case_insensitive() {
        for s in [".", "com.", "Www.Example.com."] {
            assert_eq!(dname_cmp(n(s).wire(), n(s).wire()), Ordering::Equal);
        }
        assert_eq!(
            dname_cmp(n("WWW.example.").wire(), n("www.EXAMPLE.").wire()),
            Ordering::Equal
        );
        assert_eq!(dname_cmp(n(".").wire(), n("com.").wire()), Ordering::Less);
    }

    #[test]
    fn test_lookup_form_round_trip() {
        let name = n("www.Example.");
        let mut key = Vec::new();
        name.write_lookup(&mut key);
        assert_eq!(key, b"example\0www\0");
        assert_eq!(Name::from_lookup(&key).unwrap(), name);
        assert!(Name::from_lookup(&[]).unwrap().is_root());
    }

    #[test]
    fn test_lookup_form_escapes_low_label_bytes() {
        let name = n("a\\000b.\\001.");
        let mut key = Vec::new();
        name.write_lookup(&mut key);
        assert_eq!(key, b"\x01\x02\0a\x01\x01b\0");
        assert_eq!(Name::from_lookup(&key).unwrap(), name);
        assert_eq!(Name::from_lookup(&key).unwrap().wire(), name.wire());
        assert!(Name::from_lookup(b"a\x01\0").is_err());
        assert!(Name::from_lookup(b"a\x01\x03\0").is_err());
    }

    #[test]
    fn test_lookup_order_matches_canonical_with_low_label_bytes() {
        let names = ["a.", "a\\000.", "a\\000b.", "a\\001.", "a\\002.", "x.a.", "ab."];
        for a in names {
            for b in names {
                let (mut ka, mut kb) = (Vec::new(), Vec::new());
                n(a).write_lookup(&mut ka);
                n(b).write_lookup(&mut kb);
                assert_eq!(
                    ka.cmp(&kb),
                    dname_cmp(n(a).wire(), n(b).wire()),
                    "{a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn test_bsearch_absent_returns_predecessor() {
        let names: Vec<Name> = ["b.", "d.", "f.", "h."].iter().map(|s| n(s)).collect();
        let steps = steps_for(names.len());
        assert_eq!(bsearch(&names, n("d.").wire(), steps), Some(1));
        assert_eq!(bsearch(&names, n("e.").wire(), steps), Some(1));
        assert_eq!(bsearch(&names, n("g.").wire(), steps), Some(2));
        assert_eq!(bsearch(&names, n("z.").wire(), steps), Some(3));
        // Below every element: the search stays on the first one.
        assert_eq!(bsearch(&names, n("a.").wire(), steps), Some(0));
        assert_eq!(bsearch::<Name>(&[], n("a.").wire(), 0), None);
    }

    #[test]
    fn test_bsearcher_matches_bsearch() {
        let names: Vec<Name> = (0..37).map(|i| n(&format!("h{i:03}."))).collect();
        let searcher = Bsearcher::new(names.len());
        for (i, name) in names.iter().enumerate() {
            assert_eq!(searcher.search(&names, name.wire()), Some(i));
        }
    }
}
