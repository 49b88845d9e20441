// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of the [`ConnectionTable`].

use std::fmt;

use log::warn;
use slab::Slab;

/// A bounded table of open connections that remembers the order in
/// which they were inserted.
///
/// Entries live in a [`Slab`] and are additionally threaded onto an
/// intrusive doubly-linked list, oldest first. When the table is full,
/// [`ConnectionTable::insert`] evicts the oldest entry to make room.
/// Dropping an entry is what closes its connection, so removal and
/// eviction hand the entry back to the caller, who drops it.
pub struct ConnectionTable<T> {
    entries: Slab<Entry<T>>,
    capacity: usize,
    oldest: Option<usize>,
    newest: Option<usize>,
    next_serial: u64,
}

struct Entry<T> {
    value: T,
    serial: u64,
    older: Option<usize>,
    newer: Option<usize>,
}

/// A handle to an entry of a [`ConnectionTable`].
///
/// Slab keys are reused after removal, so a handle also carries the
/// serial number of the insertion that produced it. A handle to a
/// removed entry never refers to a later one.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Handle {
    key: usize,
    serial: u64,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.serial)
    }
}

impl<T> ConnectionTable<T> {
    /// Creates an empty table holding at most `capacity` entries. A
    /// capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Slab::with_capacity(capacity.min(PREALLOCATION_LIMIT)),
            capacity,
            oldest: None,
            newest: None,
            next_serial: 0,
        }
    }

    /// Inserts `value` as the newest entry.
    ///
    /// If the table is full, the oldest entry is first removed and
    /// returned alongside the new entry's handle.
    pub fn insert(&mut self, value: T) -> (Handle, Option<T>) {
        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some(key) = self.oldest {
                warn!(
                    "Connection table is full ({} entries); evicting the oldest connection.",
                    self.capacity,
                );
                evicted = Some(self.unlink(key));
            }
        }

        let serial = self.next_serial;
        self.next_serial += 1;
        let key = self.entries.insert(Entry {
            value,
            serial,
            older: self.newest,
            newer: None,
        });
        match self.newest {
            Some(newest) => self.entries[newest].newer = Some(key),
            None => self.oldest = Some(key),
        }
        self.newest = Some(key);
        (Handle { key, serial }, evicted)
    }

    /// Removes the entry referred to by `handle`, returning it. Removing
    /// an entry that is already gone does nothing.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        if self.contains(handle) {
            Some(self.unlink(handle.key))
        } else {
            None
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.entries
            .get(handle.key)
            .filter(|entry| entry.serial == handle.serial)
            .map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.entries
            .get_mut(handle.key)
            .filter(|entry| entry.serial == handle.serial)
            .map(|entry| &mut entry.value)
    }

    /// Returns the handle of the oldest entry.
    pub fn oldest(&self) -> Option<Handle> {
        self.oldest.map(|key| self.handle_at(key))
    }

    /// Iterates over the entries from oldest to newest.
    pub fn iter(&self) -> Iter<T> {
        Iter {
            table: self,
            next: self.oldest,
        }
    }

    /// Collects the handles of all entries, oldest first. The result
    /// stays valid to walk while the table is modified.
    pub fn handles(&self) -> Vec<Handle> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes every entry, returning them oldest first.
    pub fn clear(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.len());
        while let Some(key) = self.oldest {
            drained.push(self.unlink(key));
        }
        drained
    }

    fn handle_at(&self, key: usize) -> Handle {
        Handle {
            key,
            serial: self.entries[key].serial,
        }
    }

    fn unlink(&mut self, key: usize) -> T {
        let entry = self.entries.remove(key);
        match entry.older {
            Some(older) => self.entries[older].newer = entry.newer,
            None => self.oldest = entry.newer,
        }
        match entry.newer {
            Some(newer) => self.entries[newer].older = entry.older,
            None => self.newest = entry.older,
        }
        entry.value
    }
}

/// Bounds the up-front slab allocation for very large capacities.
const PREALLOCATION_LIMIT: usize = 4096;

/// An iterator over the entries of a [`ConnectionTable`], oldest first.
pub struct Iter<'a, T> {
    table: &'a ConnectionTable<T>,
    next: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Handle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.next?;
        let entry = &self.table.entries[key];
        self.next = entry.newer;
        Some((
            Handle {
                key,
                serial: entry.serial,
            },
            &entry.value,
        ))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn values(table: &ConnectionTable<u32>) -> Vec<u32> {
        table.iter().map(|(_, value)| *value).collect()
    }

    #[test]
    fn insertion_order_is_kept() {
        let mut table = ConnectionTable::new(8);
        for i in 0..5 {
            assert!(table.insert(i).1.is_none());
        }
        assert_eq!(values(&table), [0, 1, 2, 3, 4]);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn overflow_evicts_the_oldest() {
        let capacity = 4;
        let mut table = ConnectionTable::new(capacity);
        let mut evicted = Vec::new();
        for i in 0..(capacity as u32 + 3) {
            if let (_, Some(old)) = table.insert(i) {
                evicted.push(old);
            }
        }
        assert_eq!(evicted, [0, 1, 2]);
        assert_eq!(table.len(), capacity);
        assert_eq!(values(&table), [3, 4, 5, 6]);
    }

    #[test]
    fn removal_is_idempotent() {
        let mut table = ConnectionTable::new(4);
        let (a, _) = table.insert(1);
        let (b, _) = table.insert(2);
        let (c, _) = table.insert(3);
        assert_eq!(table.remove(b), Some(2));
        assert_eq!(table.remove(b), None);
        assert_eq!(values(&table), [1, 3]);
        assert_eq!(table.remove(a), Some(1));
        assert_eq!(table.remove(c), Some(3));
        assert!(table.is_empty());
        assert_eq!(table.oldest(), None);
    }

    #[test]
    fn stale_handles_do_not_alias_new_entries() {
        let mut table = ConnectionTable::new(1);
        let (old, _) = table.insert(10);
        let (new, evicted) = table.insert(20);
        assert_eq!(evicted, Some(10));
        assert_ne!(old, new);
        assert_eq!(table.get(old), None);
        assert_eq!(table.get_mut(new).copied(), Some(20));
        assert_eq!(table.remove(old), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn handles_survive_modification() {
        let mut table = ConnectionTable::new(4);
        for i in 0..4 {
            table.insert(i);
        }
        let handles = table.handles();
        for handle in &handles {
            if table.get(*handle).map_or(false, |value| value % 2 == 0) {
                table.remove(*handle);
            }
        }
        assert_eq!(values(&table), [1, 3]);
        table.insert(4);
        assert_eq!(values(&table), [1, 3, 4]);
    }

    #[test]
    fn clear_drains_oldest_first() {
        let mut table = ConnectionTable::new(3);
        for i in 0..5 {
            table.insert(i);
        }
        assert_eq!(table.clear(), [2, 3, 4]);
        assert!(table.is_empty());
        table.insert(7);
        assert_eq!(values(&table), [7]);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut table = ConnectionTable::new(0);
        assert_eq!(table.capacity(), 1);
        table.insert(1);
        assert_eq!(table.insert(2).1, Some(1));
    }
}
