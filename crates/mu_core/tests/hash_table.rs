use mu_core::hash_table::next_prime;
use mu_core::{HashTable, HashTraits};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

#[derive(Debug)]
struct Entry {
    key: u32,
    tag: &'static str,
}

struct ByKey;

impl HashTraits<Entry> for ByKey {
    fn hash(item: &Entry) -> u64 {
        // Deliberately poor so chains get long.
        (item.key % 5) as u64
    }

    fn equals(a: &Entry, b: &Entry) -> bool {
        a.key == b.key
    }
}

#[test]
fn insert_is_idempotent() {
    let mut t: HashTable<Entry, ByKey> = HashTable::new();
    let first = t.insert(Entry { key: 3, tag: "first" }) as *const Entry;
    let second = t.insert(Entry {
        key: 3,
        tag: "second",
    });
    assert_eq!(second.tag, "first");
    assert_eq!(second as *const Entry, first);
    assert_eq!(t.len(), 1);
}

#[test]
fn reinserting_moves_the_item_to_the_front_of_its_chain() {
    let mut t: HashTable<Entry, ByKey> = HashTable::new();
    for key in [0, 5, 10] {
        t.insert(Entry { key, tag: "" });
    }
    let order = |t: &HashTable<Entry, ByKey>| t.iter().map(|e| e.key).collect::<Vec<_>>();
    assert_eq!(order(&t), [10, 5, 0]);
    let kept = t.insert(Entry { key: 0, tag: "again" });
    assert_eq!(kept.tag, "");
    assert_eq!(order(&t), [0, 10, 5]);
    assert_eq!(t.len(), 3);
}

#[test]
fn grows_to_prime_sizes() {
    let mut t: HashTable<Entry, ByKey> = HashTable::new();
    assert_eq!(t.table_size(), 7);
    for key in 0..8 {
        t.insert(Entry { key, tag: "" });
    }
    assert_eq!(t.table_size(), next_prime(14));
    assert_eq!(t.table_size(), 17);
}

#[test]
fn remove_and_clear() {
    let mut t: HashTable<Entry, ByKey> = HashTable::new();
    for key in 0..20 {
        t.insert(Entry { key, tag: "" });
    }
    let removed = t.remove(&Entry { key: 10, tag: "" });
    assert_eq!(removed.map(|e| e.key), Some(10));
    assert!(!t.contains(&Entry { key: 10, tag: "" }));
    assert!(t.contains(&Entry { key: 15, tag: "" }));
    assert_eq!(t.len(), 19);
    t.clear();
    assert!(t.is_empty());
    assert_eq!(t.iter().count(), 0);
}

#[test]
fn next_prime_values() {
    assert_eq!(next_prime(0), 2);
    assert_eq!(next_prime(7), 7);
    assert_eq!(next_prime(8), 11);
    assert_eq!(next_prime(90), 97);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64, max_shrink_iters: 200, .. ProptestConfig::default()
    })]
    #[test]
    fn every_key_survives_resizes(keys in proptest::collection::vec(0u32..500, 0..300)) {
        let mut t: HashTable<Entry, ByKey> = HashTable::new();
        for &key in &keys {
            t.insert(Entry { key, tag: "" });
        }
        let mut distinct = keys.clone();
        distinct.sort_unstable();
        distinct.dedup();
        prop_assert_eq!(t.len(), distinct.len());
        for &key in &distinct {
            let entry = Entry { key, tag: "" };
            prop_assert!(t.contains(&entry));
        }
        let mut seen: Vec<u32> = t.iter().map(|e| e.key).collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, distinct);
    }
}
