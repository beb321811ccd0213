//! C1: ordered key->value map keyed on a pluggable hash (spec §4.1).
//!
//! Grounded on `original_source/libcitadel/lib/hash.c`: a linear
//! `Members` array holding payloads in insertion order, plus a
//! `LookupTable` sorted by hash key for binary-search `get`. Sorting the
//! lookup table by payload or by key (instead of by hash) "taints" the
//! container, downgrading `get` to a linear scan, exactly as the C
//! original's `tainted` flag describes.

use std::cmp::Ordering;

/// Pluggable hashing strategies (`original_source/libcitadel/lib/hash.c`:
/// `HashLittle`, `FourHash`, `lFlathash`, `Flathash`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// Jenkins one-at-a-time style 32-bit hash over arbitrary bytes.
    Jenkins32,
    /// Treat the first 4 bytes as a case-normalized 4-character code.
    FourCharCode,
    /// Treat the key as a little-endian 32-bit integer.
    IntLe32,
    /// Treat the key as a native-width signed integer (i64 here).
    NativeInt,
}

impl HashAlgorithm {
    pub fn hash(self, key: &[u8]) -> u64 {
        match self {
            HashAlgorithm::Jenkins32 => jenkins_one_at_a_time(key),
            HashAlgorithm::FourCharCode => four_char_code(key),
            HashAlgorithm::IntLe32 => {
                let mut buf = [0u8; 4];
                let n = key.len().min(4);
                buf[..n].copy_from_slice(&key[..n]);
                u32::from_le_bytes(buf) as u64
            }
            HashAlgorithm::NativeInt => {
                let mut buf = [0u8; 8];
                let n = key.len().min(8);
                buf[..n].copy_from_slice(&key[..n]);
                i64::from_ne_bytes(buf) as u64
            }
        }
    }
}

fn jenkins_one_at_a_time(key: &[u8]) -> u64 {
    let mut hash: u32 = 0;
    for &b in key {
        hash = hash.wrapping_add(b as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash as u64
}

fn four_char_code(key: &[u8]) -> u64 {
    let mut buf = [b' '; 4];
    let n = key.len().min(4);
    for i in 0..n {
        buf[i] = key[i].to_ascii_uppercase();
    }
    u32::from_be_bytes(buf) as u64
}

struct Member<V> {
    key: Vec<u8>,
    hash: u64,
    value: V,
}

/// One entry in the hash-sorted lookup table; `position` indexes `members`.
struct LookupEntry {
    hash: u64,
    position: usize,
}

/// Iteration direction / stride. A negative step walks backwards.
#[derive(Debug, Clone, Copy)]
pub struct IterStep(pub i64);

pub struct HashList<V> {
    members: Vec<Option<Member<V>>>,
    lookup: Vec<LookupEntry>,
    algorithm: HashAlgorithm,
    unique: bool,
    /// `true` once a non-hash sort has reordered `lookup`; downgrades `get`.
    tainted: bool,
}

impl<V> HashList<V> {
    pub fn new(algorithm: HashAlgorithm, unique: bool) -> Self {
        Self {
            members: Vec::new(),
            lookup: Vec::new(),
            algorithm,
            unique,
            tainted: false,
        }
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn tainted(&self) -> bool {
        self.tainted
    }

    /// Insert `value` under `key`, invoking `destructor` on any value it
    /// replaces (uniqueness on) — mirrors the C original's
    /// `DeleteHashDataFunc` callback on collision/removal.
    pub fn put<F: FnOnce(V)>(&mut self, key: &[u8], value: V, destructor: F) {
        let hash = self.algorithm.hash(key);

        if self.unique
            && let Some(pos) = self.find_position(hash, key)
        {
            let old = self.members[pos].take();
            self.members[pos] = Some(Member {
                key: key.to_vec(),
                hash,
                value,
            });
            if let Some(old) = old {
                destructor(old.value);
            }
            return;
        }

        let position = self.members.len();
        self.members.push(Some(Member {
            key: key.to_vec(),
            hash,
            value,
        }));
        let insert_at = self.lookup.partition_point(|e| e.hash < hash);
        self.lookup.insert(insert_at, LookupEntry { hash, position });
    }

    fn find_position(&self, hash: u64, key: &[u8]) -> Option<usize> {
        if self.tainted {
            self.lookup
                .iter()
                .find(|e| e.hash == hash && self.members[e.position].as_ref().is_some_and(|m| m.key == key))
                .map(|e| e.position)
        } else {
            let start = self.lookup.partition_point(|e| e.hash < hash);
            self.lookup[start..]
                .iter()
                .take_while(|e| e.hash == hash)
                .find(|e| self.members[e.position].as_ref().is_some_and(|m| m.key == key))
                .map(|e| e.position)
        }
    }

    /// O(log n) when untainted, O(n) once a key/payload sort has tainted
    /// the container (spec §4.1, §9).
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let hash = self.algorithm.hash(key);
        self.find_position(hash, key)
            .and_then(|pos| self.members[pos].as_ref().map(|m| &m.value))
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let hash = self.algorithm.hash(key);
        let pos = self.find_position(hash, key)?;
        self.members[pos].as_mut().map(|m| &mut m.value)
    }

    /// Remove an entry by key, running its destructor if present.
    pub fn remove<F: FnOnce(V)>(&mut self, key: &[u8], destructor: F) -> bool {
        let hash = self.algorithm.hash(key);
        let Some(pos) = self.find_position(hash, key) else {
            return false;
        };
        if let Some(m) = self.members[pos].take() {
            destructor(m.value);
        }
        self.lookup.retain(|e| e.position != pos);
        true
    }

    pub fn clear<F: Fn(V)>(&mut self, destructor: F) {
        for m in self.members.drain(..).flatten() {
            destructor(m.value);
        }
        self.lookup.clear();
        self.tainted = false;
    }

    /// Sort the lookup table by plaintext key, tainting the container.
    pub fn sort_by_key(&mut self) {
        self.lookup.sort_by(|a, b| {
            let ka = self.members[a.position].as_ref().map(|m| &m.key);
            let kb = self.members[b.position].as_ref().map(|m| &m.key);
            ka.cmp(&kb)
        });
        self.tainted = true;
    }

    /// Sort the lookup table by payload comparator, tainting the container.
    pub fn sort_by_payload<F: Fn(&V, &V) -> Ordering>(&mut self, cmp: F) {
        self.lookup.sort_by(|a, b| {
            match (&self.members[a.position], &self.members[b.position]) {
                (Some(ma), Some(mb)) => cmp(&ma.value, &mb.value),
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (None, None) => Ordering::Equal,
            }
        });
        self.tainted = true;
    }

    /// Restore hash order, clearing taint.
    pub fn sort_by_hash(&mut self) {
        self.lookup.sort_by_key(|e| e.hash);
        self.tainted = false;
    }

    /// Iterate starting at `start` with the given step; negative steps
    /// walk backwards. Returns owned (key, &value) pairs in visitation
    /// order.
    pub fn iterate(&self, start: usize, step: IterStep) -> Vec<(&[u8], &V)> {
        let mut out = Vec::new();
        if self.lookup.is_empty() || step.0 == 0 {
            return out;
        }
        let len = self.lookup.len() as i64;
        let mut pos = start as i64;
        while pos >= 0 && pos < len {
            let entry = &self.lookup[pos as usize];
            if let Some(m) = &self.members[entry.position] {
                out.push((m.key.as_slice(), &m.value));
            }
            pos += step.0;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let mut h: HashList<i32> = HashList::new(HashAlgorithm::Jenkins32, true);
        h.put(b"alpha", 1, |_| {});
        h.put(b"beta", 2, |_| {});
        assert_eq!(h.get(b"alpha"), Some(&1));
        assert_eq!(h.get(b"beta"), Some(&2));
        assert_eq!(h.get(b"gamma"), None);
    }

    #[test]
    fn unique_put_replaces_and_destructs() {
        let mut h: HashList<i32> = HashList::new(HashAlgorithm::Jenkins32, true);
        let mut destroyed = Vec::new();
        h.put(b"k", 1, |_| {});
        h.put(b"k", 2, |old| destroyed.push(old));
        assert_eq!(h.get(b"k"), Some(&2));
        assert_eq!(destroyed, vec![1]);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn non_unique_put_keeps_both() {
        let mut h: HashList<i32> = HashList::new(HashAlgorithm::Jenkins32, false);
        h.put(b"k", 1, |_| {});
        h.put(b"k", 2, |_| {});
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn sort_by_key_taints_then_sort_by_hash_clears() {
        let mut h: HashList<i32> = HashList::new(HashAlgorithm::Jenkins32, true);
        h.put(b"z", 1, |_| {});
        h.put(b"a", 2, |_| {});
        assert!(!h.tainted());
        h.sort_by_key();
        assert!(h.tainted());
        assert_eq!(h.get(b"a"), Some(&2));
        h.sort_by_hash();
        assert!(!h.tainted());
    }

    #[test]
    fn iterate_negative_step_walks_backwards() {
        let mut h: HashList<i32> = HashList::new(HashAlgorithm::Jenkins32, true);
        for i in 0..5 {
            h.put(format!("k{i}").as_bytes(), i, |_| {});
        }
        let forward = h.iterate(0, IterStep(1));
        let backward = h.iterate((h.len() - 1) as usize, IterStep(-1));
        let fwd_vals: Vec<i32> = forward.iter().map(|(_, v)| **v).collect();
        let mut bwd_vals: Vec<i32> = backward.iter().map(|(_, v)| **v).collect();
        bwd_vals.reverse();
        assert_eq!(fwd_vals, bwd_vals);
    }

    #[test]
    fn remove_compacts_lookup_not_members() {
        let mut h: HashList<i32> = HashList::new(HashAlgorithm::Jenkins32, true);
        h.put(b"a", 1, |_| {});
        h.put(b"b", 2, |_| {});
        assert!(h.remove(b"a", |_| {}));
        assert_eq!(h.len(), 1);
        assert_eq!(h.get(b"a"), None);
        assert_eq!(h.get(b"b"), Some(&2));
    }
}
