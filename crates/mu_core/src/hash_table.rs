//! Chained hash table with prime-sized bucket arrays.
//!
//! Items live in singly linked chains hanging off each bucket. Hashing and
//! equality come from a `HashTraits` implementation rather than the item's own
//! `Hash`/`Eq`, so one item type can be keyed several ways. Iteration walks
//! buckets in index order and is not stable across a resize.

use std::marker::PhantomData;

/// Hash/equality pair used to key a `HashTable`.
pub trait HashTraits<T> {
    fn hash(item: &T) -> u64;
    fn equals(a: &T, b: &T) -> bool;
}

struct Item<T> {
    value: T,
    hash: u64,
    next: Option<Box<Item<T>>>,
}

const INITIAL_SIZE: usize = 7;

pub struct HashTable<T, Tr> {
    buckets: Vec<Option<Box<Item<T>>>>,
    len: usize,
    _traits: PhantomData<fn() -> Tr>,
}

/// Smallest prime not below `n`.
pub fn next_prime(n: usize) -> usize {
    fn is_prime(n: usize) -> bool {
        if n < 2 {
            return false;
        }
        if n % 2 == 0 {
            return n == 2;
        }
        let mut d = 3;
        while d * d <= n {
            if n % d == 0 {
                return false;
            }
            d += 2;
        }
        true
    }
    let mut candidate = n.max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

impl<T, Tr: HashTraits<T>> Default for HashTable<T, Tr> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Tr: HashTraits<T>> HashTable<T, Tr> {
    pub fn new() -> Self {
        Self::with_table_size(INITIAL_SIZE)
    }

    pub fn with_table_size(size: usize) -> Self {
        let size = next_prime(size);
        let mut buckets = Vec::with_capacity(size);
        buckets.resize_with(size, || None);
        Self {
            buckets,
            len: 0,
            _traits: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets.
    #[inline]
    pub fn table_size(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// Finds the item with the given hash that satisfies `pred`.
    pub fn find_by(&self, hash: u64, mut pred: impl FnMut(&T) -> bool) -> Option<&T> {
        let mut link = self.buckets[self.bucket_of(hash)].as_deref();
        while let Some(item) = link {
            if item.hash == hash && pred(&item.value) {
                return Some(&item.value);
            }
            link = item.next.as_deref();
        }
        None
    }

    /// Finds the stored item equal to `probe`.
    pub fn find(&self, probe: &T) -> Option<&T> {
        self.find_by(Tr::hash(probe), |v| Tr::equals(v, probe))
    }

    pub fn contains(&self, probe: &T) -> bool {
        self.find(probe).is_some()
    }

    /// Inserts `value` unless an equal item is already present, and returns
    /// whichever item the table holds afterwards. A present item moves to
    /// the front of its chain.
    pub fn insert(&mut self, value: T) -> &T {
        let hash = Tr::hash(&value);
        let mut item = match self.unlink(hash, &value) {
            Some(existing) => existing,
            None => {
                if self.len >= self.buckets.len() {
                    self.resize(next_prime(self.buckets.len() * 2));
                }
                Box::new(Item {
                    value,
                    hash,
                    next: None,
                })
            }
        };
        let b = self.bucket_of(hash);
        item.next = self.buckets[b].take();
        self.len += 1;
        &self.buckets[b].insert(item).value
    }

    /// Removes and returns the item equal to `probe`.
    pub fn remove(&mut self, probe: &T) -> Option<T> {
        self.unlink(Tr::hash(probe), probe).map(|item| item.value)
    }

    /// Detaches the item equal to `probe` from its chain.
    fn unlink(&mut self, hash: u64, probe: &T) -> Option<Box<Item<T>>> {
        let b = self.bucket_of(hash);
        let mut link = &mut self.buckets[b];
        loop {
            let found = match link.as_deref() {
                None => return None,
                Some(item) => item.hash == hash && Tr::equals(&item.value, probe),
            };
            if found {
                let mut removed = link.take()?;
                *link = removed.next.take();
                self.len -= 1;
                return Some(removed);
            }
            link = &mut link.as_mut()?.next;
        }
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            let mut link = bucket.take();
            while let Some(mut item) = link {
                link = item.next.take();
            }
        }
        self.len = 0;
    }

    /// Rehashes every item into `new_size` buckets (rounded up to a prime),
    /// visiting old buckets in index order.
    pub fn resize(&mut self, new_size: usize) {
        let new_size = next_prime(new_size.max(1));
        let mut buckets: Vec<Option<Box<Item<T>>>> = Vec::with_capacity(new_size);
        buckets.resize_with(new_size, || None);
        for bucket in &mut self.buckets {
            let mut link = bucket.take();
            while let Some(mut item) = link {
                link = item.next.take();
                let b = (item.hash % new_size as u64) as usize;
                item.next = buckets[b].take();
                buckets[b] = Some(item);
            }
        }
        self.buckets = buckets;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            buckets: &self.buckets,
            bucket: 0,
            link: None,
        }
    }
}

impl<T, Tr> Drop for HashTable<T, Tr> {
    fn drop(&mut self) {
        for bucket in &mut self.buckets {
            let mut link = bucket.take();
            while let Some(mut item) = link {
                link = item.next.take();
            }
        }
    }
}

pub struct Iter<'a, T> {
    buckets: &'a [Option<Box<Item<T>>>],
    bucket: usize,
    link: Option<&'a Item<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        loop {
            if let Some(item) = self.link {
                self.link = item.next.as_deref();
                return Some(&item.value);
            }
            let bucket = self.buckets.get(self.bucket)?;
            self.bucket += 1;
            self.link = bucket.as_deref();
        }
    }
}

impl<'a, T, Tr: HashTraits<T>> IntoIterator for &'a HashTable<T, Tr> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
