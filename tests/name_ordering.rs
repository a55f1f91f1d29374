use std::cmp::Ordering;

use zonekeep::dns::enums::DNSResourceType;
use zonekeep::dns::name::{Bsearcher, HasOwner, Name, bsearch, dname_cmp, steps_for};
use zonekeep::rrset::SearchKey;
use zonekeep::sort::heapsort;

fn name(s: &str) -> Name {
    s.parse().unwrap()
}

/// `count` distinct names spread over a few subtrees, in canonical order
fn sorted_names(count: usize) -> Vec<Name> {
    let mut names: Vec<Name> = (0..count)
        .map(|i| name(&format!("h{}.z{}.example.", i * 7919 % 100_003, i % 5)))
        .collect();
    heapsort(&mut names, |a, b| dname_cmp(a.owner(), b.owner()) == Ordering::Less);
    names
}

#[test]
fn test_bsearch_finds_every_element_for_powers_of_two() {
    let mut len = 1;
    while len <= 1024 {
        let names = sorted_names(len);
        let searcher = Bsearcher::new(names.len());
        for (index, target) in names.iter().enumerate() {
            assert_eq!(
                searcher.search(&names, target.wire()),
                Some(index),
                "len {len} index {index}"
            );
        }
        len *= 2;
    }
}

#[test]
fn test_bsearch_finds_every_element_for_other_lengths() {
    for len in [3, 5, 6, 7, 9, 100, 1000, 1023, 1025] {
        let names = sorted_names(len);
        for (index, target) in names.iter().enumerate() {
            assert_eq!(bsearch(&names, target.wire(), steps_for(len)), Some(index));
        }
    }
}

#[test]
fn test_bsearch_absent_target_returns_predecessor() {
    let names = sorted_names(64);
    let searcher = Bsearcher::new(names.len());
    for (index, present) in names.iter().enumerate() {
        // A child sorts right after its parent and before the parent's
        // next sibling
        let absent = name(&format!("zz.{}", present));
        let found = searcher.search(&names, absent.wire()).unwrap();
        assert_eq!(found, index);
        assert_eq!(dname_cmp(names[found].wire(), absent.wire()), Ordering::Less);
        if let Some(next) = names.get(found + 1) {
            assert_eq!(dname_cmp(next.wire(), absent.wire()), Ordering::Greater);
        }
    }

    assert_eq!(searcher.search(&names, Name::root().wire()), Some(0));
    let empty: Vec<Name> = Vec::new();
    assert_eq!(bsearch(&empty, name("a.").wire(), 8), None);
}

#[test]
fn test_dname_cmp_is_a_total_order() {
    let samples: Vec<Name> = [
        ".", "example.", "a.example.", "yljkjljk.a.example.", "Z.a.example.",
        "zABC.a.EXAMPLE.", "z.example.", "\\001.z.example.", "*.z.example.", "\\200.z.example.",
        "ab.", "a.b.", "b.",
    ]
    .iter()
    .map(|s| name(s))
    .collect();

    for a in &samples {
        assert_eq!(dname_cmp(a.wire(), a.wire()), Ordering::Equal);
        for b in &samples {
            let ab = dname_cmp(a.wire(), b.wire());
            assert_eq!(ab, dname_cmp(b.wire(), a.wire()).reverse());
            assert_eq!(ab == Ordering::Equal, a == b);
            for c in &samples {
                if ab == Ordering::Less && dname_cmp(b.wire(), c.wire()) == Ordering::Less {
                    assert_eq!(dname_cmp(a.wire(), c.wire()), Ordering::Less);
                }
            }
        }
    }
}

#[test]
fn test_rfc4034_canonical_order() {
    let expected = [
        "example.",
        "a.example.",
        "yljkjljk.a.example.",
        "Z.a.example.",
        "zABC.a.EXAMPLE.",
        "z.example.",
        "\\001.z.example.",
        "*.z.example.",
        "\\200.z.example.",
    ];
    let mut names: Vec<Name> = expected.iter().rev().map(|s| name(s)).collect();
    names.sort();
    let shown: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    assert_eq!(shown, expected);
}

#[test]
fn test_search_key_order_matches_canonical_order() {
    let owners = [
        "example.", "a.example.", "Z.a.example.", "a-b.example.", "b.example.", "ab.example.",
        "a.b.example.", "x.a.example.", "a\\000b.example.", "a\\000.example.", "a\\001.example.",
    ];
    let types = [DNSResourceType::A, DNSResourceType::NS, DNSResourceType::SOA, DNSResourceType::TXT];
    let mut pairs = Vec::new();
    for owner in owners {
        for rtype in types {
            pairs.push((name(owner), rtype));
        }
    }

    for (owner_a, type_a) in &pairs {
        for (owner_b, type_b) in &pairs {
            let canonical = dname_cmp(owner_a.wire(), owner_b.wire())
                .then(u16::from(*type_a).cmp(&u16::from(*type_b)));
            let keys = SearchKey::new(owner_a, *type_a).cmp(&SearchKey::new(owner_b, *type_b));
            assert_eq!(keys, canonical, "{owner_a} {type_a} vs {owner_b} {type_b}");
        }
        assert_eq!(&SearchKey::new(owner_a, *type_a).owner().unwrap(), owner_a);
    }
}

#[test]
fn test_search_key_prefix_covers_subtree() {
    let apex = name("example.");
    let prefix = SearchKey::prefix(&apex);
    for inside in ["example.", "www.example.", "a.b.EXAMPLE."] {
        let key = SearchKey::new(&name(inside), DNSResourceType::A);
        assert!(key.as_bytes().starts_with(&prefix), "{inside}");
    }
    for outside in ["example.com.", "xexample.", "com."] {
        let key = SearchKey::new(&name(outside), DNSResourceType::A);
        assert!(!key.as_bytes().starts_with(&prefix), "{outside}");
    }

    // A zero byte inside a label must not look like a label boundary.
    let prefix = SearchKey::prefix(&name("x\\000y.example."));
    let key = SearchKey::new(&name("y.x.example."), DNSResourceType::A);
    assert!(!key.as_bytes().starts_with(&prefix));
}
