//! Open-addressed hash table keyed by interned strings.
//!
//! Used for globals, instance fields, class methods and the string intern
//! set. Keys are compared by identity, which is sound because every string
//! is interned; [`Table::find_string`] is the one lookup that compares
//! contents, for interning itself.

use std::mem;

use crate::vm::value::{ObjRef, Value};

const MAX_LOAD_NUMERATOR: usize = 3;
const MAX_LOAD_DENOMINATOR: usize = 4;
const MIN_CAPACITY: usize = 8;

/// A string key together with its cached hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrKey {
    pub obj: ObjRef,
    pub hash: u32,
}

impl StrKey {
    pub fn new(obj: ObjRef, hash: u32) -> Self {
        Self { obj, hash }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Entry {
    Empty,
    /// A deleted entry. Probing continues past it and it still counts toward
    /// the load factor until the next resize.
    Tombstone,
    Occupied { key: StrKey, value: Value },
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Length is zero or a power of two.
    entries: Vec<Entry>,
    /// Occupied entries plus tombstones.
    count: usize,
    /// Occupied entries only.
    live: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Probe mask: always `2^n - 1` once allocated.
    pub fn capacity_mask(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    pub fn get(&self, key: StrKey) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        match self.entries[self.find_slot(key)] {
            Entry::Occupied { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Insert or overwrite. Returns true when the key was not present.
    pub fn set(&mut self, key: StrKey, value: Value) -> bool {
        if (self.count + 1) * MAX_LOAD_DENOMINATOR > self.entries.len() * MAX_LOAD_NUMERATOR {
            let capacity = if self.entries.len() < MIN_CAPACITY {
                MIN_CAPACITY
            } else {
                self.entries.len() * 2
            };
            self.resize(capacity);
        }

        let slot = self.find_slot(key);
        let is_new = match self.entries[slot] {
            Entry::Occupied { .. } => false,
            Entry::Empty => {
                self.count += 1;
                self.live += 1;
                true
            }
            // Reusing a tombstone: it is already part of `count`.
            Entry::Tombstone => {
                self.live += 1;
                true
            }
        };
        self.entries[slot] = Entry::Occupied { key, value };
        is_new
    }

    /// Remove `key`, leaving a tombstone. Returns true if it was present.
    pub fn delete(&mut self, key: StrKey) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let slot = self.find_slot(key);
        if !matches!(self.entries[slot], Entry::Occupied { .. }) {
            return false;
        }
        self.entries[slot] = Entry::Tombstone;
        self.live -= 1;
        true
    }

    /// Copy every live entry of `self` into `to`.
    pub fn add_all(&self, to: &mut Table) {
        for (key, value) in self.iter() {
            to.set(key, value);
        }
    }

    /// Look up an interned string by content. `matches` is called only for
    /// entries whose hash equals `hash` and should compare length and bytes.
    pub fn find_string(&self, hash: u32, mut matches: impl FnMut(ObjRef) -> bool) -> Option<ObjRef> {
        if self.entries.is_empty() {
            return None;
        }
        let mask = self.capacity_mask();
        let mut index = hash as usize & mask;
        loop {
            match self.entries[index] {
                Entry::Empty => return None,
                Entry::Tombstone => {}
                Entry::Occupied { key, .. } => {
                    if key.hash == hash && matches(key.obj) {
                        return Some(key.obj);
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    /// Delete every entry whose key is not marked. Used on the weak intern
    /// set right before sweeping.
    pub fn remove_white(&mut self, is_marked: impl Fn(ObjRef) -> bool) {
        for entry in self.entries.iter_mut() {
            if let Entry::Occupied { key, .. } = *entry {
                if !is_marked(key.obj) {
                    *entry = Entry::Tombstone;
                    self.live -= 1;
                }
            }
        }
    }

    /// Iterate over live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (StrKey, Value)> + '_ {
        self.entries.iter().filter_map(|entry| match *entry {
            Entry::Occupied { key, value } => Some((key, value)),
            _ => None,
        })
    }

    /// Bytes owned by the entry array.
    pub fn heap_size(&self) -> usize {
        self.entries.capacity() * mem::size_of::<Entry>()
    }

    /// Index of the entry holding `key`, or of the slot where it would be
    /// inserted (the first tombstone passed, else the empty slot that ended
    /// the probe). Requires a non-empty entry array.
    fn find_slot(&self, key: StrKey) -> usize {
        let mask = self.capacity_mask();
        let mut index = key.hash as usize & mask;
        let mut tombstone = None;
        loop {
            match self.entries[index] {
                Entry::Empty => return tombstone.unwrap_or(index),
                Entry::Tombstone => {
                    tombstone.get_or_insert(index);
                }
                Entry::Occupied { key: existing, .. } => {
                    if existing.obj == key.obj {
                        return index;
                    }
                }
            }
            index = (index + 1) & mask;
        }
    }

    fn resize(&mut self, capacity: usize) {
        let old = mem::replace(&mut self.entries, vec![Entry::Empty; capacity]);
        self.count = 0;
        self.live = 0;
        for entry in old {
            if let Entry::Occupied { key, value } = entry {
                let slot = self.find_slot(key);
                self.entries[slot] = Entry::Occupied { key, value };
                self.count += 1;
                self.live += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(n: u32, hash: u32) -> StrKey {
        StrKey::new(ObjRef(n), hash)
    }

    #[test]
    fn test_set_get_overwrite() {
        let mut table = Table::new();
        assert!(table.set(key(1, 10), Value::Number(1.0)));
        assert!(!table.set(key(1, 10), Value::Number(2.0)));
        assert_eq!(table.get(key(1, 10)), Some(Value::Number(2.0)));
        assert_eq!(table.get(key(2, 10)), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_delete_leaves_probe_chain_intact() {
        let mut table = Table::new();
        // Same hash, so the three keys share a probe sequence.
        table.set(key(1, 3), Value::Number(1.0));
        table.set(key(2, 3), Value::Number(2.0));
        table.set(key(3, 3), Value::Number(3.0));

        assert!(table.delete(key(2, 3)));
        assert!(!table.delete(key(2, 3)));
        assert_eq!(table.get(key(2, 3)), None);
        assert_eq!(table.get(key(3, 3)), Some(Value::Number(3.0)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_tombstone_reused_without_growing_count() {
        let mut table = Table::new();
        table.set(key(1, 5), Value::Nil);
        table.delete(key(1, 5));
        assert_eq!(table.count, 1);
        table.set(key(2, 5), Value::Nil);
        assert_eq!(table.count, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_growth_keeps_mask_shape() {
        let mut table = Table::new();
        assert_eq!(table.capacity_mask(), 0);
        for i in 0..100 {
            table.set(key(i, i.wrapping_mul(2_654_435_761)), Value::Number(i as f64));
        }
        let mask = table.capacity_mask();
        assert!((mask + 1).is_power_of_two());
        assert!(table.count * 4 <= (mask + 1) * 3);
        for i in 0..100 {
            assert_eq!(
                table.get(key(i, i.wrapping_mul(2_654_435_761))),
                Some(Value::Number(i as f64))
            );
        }
    }

    #[test]
    fn test_resize_drops_tombstones() {
        let mut table = Table::new();
        for i in 0..6 {
            table.set(key(i, i), Value::Nil);
        }
        for i in 0..6 {
            table.delete(key(i, i));
        }
        assert_eq!(table.count, 6);
        // The seventh insert crosses the load factor and rehashes.
        table.set(key(100, 100), Value::Nil);
        assert_eq!(table.count, 1);
        assert_eq!(table.capacity_mask(), 15);
    }

    #[test]
    fn test_add_all_and_find_string() {
        let mut from = Table::new();
        from.set(key(7, 42), Value::Bool(true));
        from.set(key(8, 43), Value::Bool(false));
        let mut to = Table::new();
        from.add_all(&mut to);
        assert_eq!(to.len(), 2);

        assert_eq!(to.find_string(42, |obj| obj == ObjRef(7)), Some(ObjRef(7)));
        assert_eq!(to.find_string(42, |_| false), None);
        assert_eq!(to.find_string(99, |_| true), None);
    }

    #[test]
    fn test_remove_white() {
        let mut table = Table::new();
        table.set(key(1, 1), Value::Nil);
        table.set(key(2, 2), Value::Nil);
        table.remove_white(|obj| obj == ObjRef(2));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(key(1, 1)), None);
        assert_eq!(table.get(key(2, 2)), Some(Value::Nil));
    }
}
