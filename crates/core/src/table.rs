//! Open-addressing hash table with linear probing and tombstone deletion.
//!
//! Used for two purposes that share the same implementation: the VM's
//! globals table (`Rc<StringObj> -> Value`) and the string interner (where
//! the value is always `Value::Nil` and the table is really a set). Keys are
//! always already-canonical interned strings, so slot lookup by key can use
//! pointer identity (`Rc::ptr_eq`); the one place that needs to compare raw
//! bytes is `find_string`, used by the interner before an object exists to
//! compare against.

use std::rc::Rc;

use crate::object::StringObj;
use crate::value::Value;

const MAX_LOAD_FACTOR: f64 = 0.75;
const INITIAL_CAPACITY: usize = 8;

/// A single bucket. Modeling empty/tombstone/live as an enum (rather than
/// the reference implementation's `(null key, sentinel value)` pairs) makes
/// illegal states unrepresentable.
#[derive(Clone, Default)]
enum Slot {
    #[default]
    Empty,
    Tombstone,
    Live(Rc<StringObj>, Value),
}

#[derive(Debug, Default)]
pub struct Table {
    entries: Vec<Slot>,
    /// Live entries plus tombstones, per the invariant in the spec.
    count: usize,
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Empty => write!(f, "Empty"),
            Slot::Tombstone => write!(f, "Tombstone"),
            Slot::Live(k, _) => write!(f, "Live({})", k.as_str()),
        }
    }
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Probe for `key` starting at `hash mod capacity`. Returns the index of
    /// the matching live slot, or the first tombstone seen (falling back to
    /// the terminating empty slot if none), so callers can use the result
    /// for both lookup and insertion. Termination is guaranteed because the
    /// table never lets load factor reach 1.
    fn find_slot(entries: &[Slot], capacity: usize, key: &Rc<StringObj>) -> usize {
        let mut index = (key.hash as usize) % capacity;
        let mut tombstone: Option<usize> = None;
        loop {
            match &entries[index] {
                Slot::Empty => return tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                Slot::Live(k, _) => {
                    if Rc::ptr_eq(k, key) {
                        return index;
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    fn grow(&mut self) {
        let new_capacity = if self.entries.is_empty() {
            INITIAL_CAPACITY
        } else {
            self.entries.len() * 2
        };

        let mut new_entries = vec![Slot::Empty; new_capacity];
        let mut new_count = 0;
        for slot in std::mem::take(&mut self.entries) {
            if let Slot::Live(key, value) = slot {
                let idx = Self::find_slot(&new_entries, new_capacity, &key);
                new_entries[idx] = Slot::Live(key, value);
                new_count += 1;
            }
        }

        self.entries = new_entries;
        self.count = new_count;
    }

    /// Insert or overwrite `key`. Returns `true` if `key` was not already
    /// present (a genuinely new entry, not a tombstone reuse).
    pub fn set(&mut self, key: Rc<StringObj>, value: Value) -> bool {
        if self.count + 1 > (self.capacity() as f64 * MAX_LOAD_FACTOR) as usize {
            self.grow();
        }

        let idx = Self::find_slot(&self.entries, self.capacity(), &key);
        let is_new = matches!(self.entries[idx], Slot::Empty);
        if is_new {
            self.count += 1;
        }
        self.entries[idx] = Slot::Live(key, value);
        is_new
    }

    pub fn get(&self, key: &Rc<StringObj>) -> Option<&Value> {
        if self.count == 0 {
            return None;
        }
        let idx = Self::find_slot(&self.entries, self.capacity(), key);
        match &self.entries[idx] {
            Slot::Live(_, value) => Some(value),
            _ => None,
        }
    }

    /// Writes a tombstone in place of a live entry; `count` is left
    /// unchanged because tombstones still occupy a probe slot.
    pub fn delete(&mut self, key: &Rc<StringObj>) -> bool {
        if self.count == 0 {
            return false;
        }
        let idx = Self::find_slot(&self.entries, self.capacity(), key);
        if matches!(self.entries[idx], Slot::Live(..)) {
            self.entries[idx] = Slot::Tombstone;
            true
        } else {
            false
        }
    }

    /// Content-based probe used only by the string interner, before the
    /// candidate string has been allocated as an object: compares
    /// `(hash, length, bytes)` instead of identity.
    pub fn find_string(&self, bytes: &[u8], hash: u32) -> Option<Rc<StringObj>> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.capacity();
        let mut index = (hash as usize) % capacity;
        loop {
            match &self.entries[index] {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Live(key, _) => {
                    if key.hash == hash && key.len() == bytes.len() && key.as_str().as_bytes() == bytes
                    {
                        return Some(Rc::clone(key));
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Heap;

    #[test]
    fn set_get_delete_roundtrip() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let key = heap.copy_string("answer");

        assert!(table.set(Rc::clone(&key), Value::Number(42.0)));
        assert_eq!(table.get(&key), Some(&Value::Number(42.0)));

        assert!(table.delete(&key));
        assert_eq!(table.get(&key), None);
        // Deleting again fails: it's already a tombstone, not a live entry.
        assert!(!table.delete(&key));
    }

    #[test]
    fn resetting_a_key_is_not_a_new_entry() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let key = heap.copy_string("x");

        assert!(table.set(Rc::clone(&key), Value::Number(1.0)));
        assert!(!table.set(Rc::clone(&key), Value::Number(2.0)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&key), Some(&Value::Number(2.0)));
    }

    #[test]
    fn count_is_live_plus_tombstones_and_rehash_drops_tombstones() {
        let mut heap = Heap::new();
        let mut table = Table::new();

        let names: Vec<_> = (0..20).map(|i| heap.copy_string(&format!("k{i}"))).collect();
        for (i, key) in names.iter().enumerate() {
            table.set(Rc::clone(key), Value::Number(i as f64));
        }
        // Delete half of them, turning them into tombstones.
        for key in names.iter().step_by(2) {
            table.delete(key);
        }
        assert_eq!(table.len(), names.len());

        // Insert enough new keys to force a rehash; tombstones should not
        // survive it, so len() should settle back to exactly the live set.
        for i in 20..40 {
            let key = heap.copy_string(&format!("k{i}"));
            table.set(key, Value::Number(i as f64));
        }
        let expected_live = names.len() / 2 + 20;
        assert_eq!(table.len(), expected_live);
    }

    #[test]
    fn find_string_locates_interned_text_by_content() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let key = heap.copy_string("hello");
        table.set(Rc::clone(&key), Value::Nil);

        let hash = crate::object::fnv1a_hash(b"hello");
        let found = table.find_string(b"hello", hash).unwrap();
        assert!(Rc::ptr_eq(&found, &key));

        assert!(table.find_string(b"nope", crate::object::fnv1a_hash(b"nope")).is_none());
    }
}
