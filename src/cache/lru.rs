use std::collections::HashMap;
use std::hash::Hash;
use std::mem;

struct Entry<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Fixed-capacity map evicting the least recently used entry on overflow.
///
/// Entries live in a slab and are threaded onto a doubly linked recency list
/// by index, most recent at `head`. Slots are reused on eviction, so the slab
/// never grows past `capacity`.
pub struct LruCache<K, V> {
    map: HashMap<K, usize>,
    entries: Vec<Entry<K, V>>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Creates a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            map: HashMap::new(),
            entries: Vec::new(),
            head: None,
            tail: None,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `key` and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        Some(&self.entries[idx].value)
    }

    /// Looks up `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key).map(|&idx| &self.entries[idx].value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Inserts or updates `key` as most recently used. Returns the entry
    /// evicted to make room, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            self.entries[idx].value = value;
            self.move_to_front(idx);
            return None;
        }

        let fresh = Entry {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };

        if self.entries.len() < self.capacity {
            let idx = self.entries.len();
            self.entries.push(fresh);
            self.map.insert(key, idx);
            self.push_front(idx);
            return None;
        }

        // Full: recycle the least recently used slot.
        let idx = self.tail?;
        self.unlink(idx);
        let old = mem::replace(&mut self.entries[idx], fresh);
        self.map.remove(&old.key);
        self.map.insert(key, idx);
        self.push_front(idx);

        Some((old.key, old.value))
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.entries.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            keys.push(self.entries[idx].key.clone());
            cursor = self.entries[idx].next;
        }
        keys
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let entry = &self.entries[idx];
            (entry.prev, entry.next)
        };

        match prev {
            Some(p) => self.entries[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.entries[n].prev = prev,
            None => self.tail = prev,
        }

        let entry = &mut self.entries[idx];
        entry.prev = None;
        entry.next = None;
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let entry = &mut self.entries[idx];
            entry.prev = None;
            entry.next = old_head;
        }

        if let Some(h) = old_head {
            self.entries[h].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = LruCache::new(3);
        assert!(cache.put(1u32, "a").is_none());
        assert!(cache.put(2, "b").is_none());
        assert!(cache.put(3, "c").is_none());

        // Touch 1 so 2 becomes the eviction candidate.
        assert_eq!(cache.get(&1), Some(&"a"));

        assert_eq!(cache.put(4, "d"), Some((2, "b")));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.keys(), vec![4, 1, 3]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_update_refreshes_without_eviction() {
        let mut cache = LruCache::new(2);
        cache.put(1u32, 10u32);
        cache.put(2, 20);

        assert!(cache.put(1, 11).is_none());
        assert_eq!(cache.peek(&1), Some(&11));
        assert_eq!(cache.put(3, 30), Some((2, 20)));
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let mut cache = LruCache::new(2);
        cache.put(1u32, ());
        cache.put(2, ());

        assert!(cache.peek(&1).is_some());
        assert_eq!(cache.put(3, ()), Some((1, ())));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = LruCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(1u32, ());
        assert_eq!(cache.put(2, ()), Some((1, ())));
        assert!(cache.contains(&2));
    }

    #[test]
    fn test_matches_reference_model() {
        const CAPACITY: usize = 16;
        let mut cache = LruCache::new(CAPACITY);
        // Most recently used last.
        let mut model: Vec<u32> = Vec::new();

        let mut seed = 0x2545_f491_u32;
        for _ in 0..5_000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let key = (seed >> 16) % 40;

            if seed & 1 == 0 {
                let hit = cache.get(&key).is_some();
                assert_eq!(hit, model.contains(&key));
                if hit {
                    model.retain(|k| *k != key);
                    model.push(key);
                }
            } else {
                let evicted = cache.put(key, key * 2).map(|(k, _)| k);
                let expected = if model.contains(&key) {
                    model.retain(|k| *k != key);
                    None
                } else if model.len() == CAPACITY {
                    Some(model.remove(0))
                } else {
                    None
                };
                model.push(key);
                assert_eq!(evicted, expected);
            }

            let mut mru: Vec<u32> = model.clone();
            mru.reverse();
            assert_eq!(cache.keys(), mru);
        }
    }
}
