//! Global vertex id → dense local index lookup.
//!
//! [`FastMap`] has two modes. The identity ("no-hash") mode answers every key
//! below its capacity with the key itself and is used when one rank owns the
//! whole graph. The hashed mode stores explicit entries and additionally
//! records, in insertion order, every key newly assigned by
//! [`FastMap::get_or_assign`] or [`FastMap::insert_unique`]; relabeling
//! uses that list to enumerate ghosts.

use hashbrown::HashMap;

/// Lookup structure from global id to local index.
#[derive(Clone, Debug, Default)]
pub enum FastMap {
    /// Not initialized, or cleared.
    #[default]
    Empty,
    /// `get(k) == Some(k)` for every `k < n`.
    Identity { n: u64 },
    /// Explicit entries plus the keys inserted as new (unique) values.
    Hashed {
        entries: HashMap<u64, u64>,
        unique_keys: Vec<u64>,
    },
}

impl FastMap {
    /// Hashed map sized for roughly `capacity` entries.
    pub fn init(capacity: usize) -> Self {
        FastMap::Hashed {
            entries: HashMap::with_capacity(capacity),
            unique_keys: Vec::new(),
        }
    }

    /// Pass-through map over `[0, n)`.
    pub fn init_identity(n: u64) -> Self {
        FastMap::Identity { n }
    }

    /// True when in identity mode.
    pub fn is_identity(&self) -> bool {
        matches!(self, FastMap::Identity { .. })
    }

    /// Hashed map sized for `capacity` entries, or `None` if the table
    /// cannot be allocated.
    pub fn try_init(capacity: usize) -> Option<Self> {
        let mut entries = HashMap::new();
        entries.try_reserve(capacity).ok()?;
        Some(FastMap::Hashed {
            entries,
            unique_keys: Vec::new(),
        })
    }

    /// Insert or overwrite `key → value`, returning the previous value.
    /// No-op in identity mode.
    pub fn insert(&mut self, key: u64, value: u64) -> Option<u64> {
        match self {
            FastMap::Hashed { entries, .. } => entries.insert(key, value),
            _ => None,
        }
    }

    /// Insert `key → value` and record `key` as newly discovered.
    ///
    /// Callers must only use this for keys that are absent
    /// (see [`FastMap::get_or_assign`]).
    pub fn insert_unique(&mut self, key: u64, value: u64) {
        if let FastMap::Hashed {
            entries,
            unique_keys,
        } = self
        {
            entries.insert(key, value);
            unique_keys.push(key);
        }
    }

    /// Return the value for `key`, assigning `next` (and recording the key as
    /// unique) when absent. The flag reports whether an insertion happened.
    pub fn get_or_assign(&mut self, key: u64, next: u64) -> (u64, bool) {
        match self {
            FastMap::Hashed {
                entries,
                unique_keys,
            } => match entries.entry(key) {
                hashbrown::hash_map::Entry::Occupied(e) => (*e.get(), false),
                hashbrown::hash_map::Entry::Vacant(e) => {
                    e.insert(next);
                    unique_keys.push(key);
                    (next, true)
                }
            },
            FastMap::Identity { n } if key < *n => (key, false),
            _ => (next, false),
        }
    }

    /// Local index of `key`, if known.
    #[inline]
    pub fn get(&self, key: u64) -> Option<u64> {
        match self {
            FastMap::Empty => None,
            FastMap::Identity { n } => (key < *n).then_some(key),
            FastMap::Hashed { entries, .. } => entries.get(&key).copied(),
        }
    }

    /// Keys inserted through the unique path, in insertion order.
    pub fn unique_keys(&self) -> &[u64] {
        match self {
            FastMap::Hashed { unique_keys, .. } => unique_keys,
            _ => &[],
        }
    }

    /// Number of unique insertions since initialization.
    pub fn num_unique(&self) -> usize {
        self.unique_keys().len()
    }

    /// Number of explicit entries (identity mode reports its range).
    pub fn len(&self) -> usize {
        match self {
            FastMap::Empty => 0,
            FastMap::Identity { n } => *n as usize,
            FastMap::Hashed { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the unique-key list, e.g. after canonical reordering.
    pub(crate) fn set_unique_keys(&mut self, keys: Vec<u64>) {
        if let FastMap::Hashed { unique_keys, .. } = self {
            *unique_keys = keys;
        }
    }

    /// Drop all entries and release their storage.
    pub fn clear(&mut self) {
        *self = FastMap::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mode_passes_through_below_capacity() {
        let m = FastMap::init_identity(10);
        assert_eq!(m.get(0), Some(0));
        assert_eq!(m.get(9), Some(9));
        assert_eq!(m.get(10), None);
        assert_eq!(m.num_unique(), 0);
    }

    #[test]
    fn get_or_assign_tracks_new_keys_only() {
        let mut m = FastMap::init(8);
        m.insert(100, 0);
        m.insert(101, 1);
        assert_eq!(m.get_or_assign(100, 2), (0, false));
        assert_eq!(m.get_or_assign(500, 2), (2, true));
        assert_eq!(m.get_or_assign(500, 3), (2, false));
        assert_eq!(m.get_or_assign(7, 3), (3, true));
        assert_eq!(m.unique_keys(), &[500, 7]);
        assert_eq!(m.num_unique(), 2);
        assert_eq!(m.len(), 4);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut m = FastMap::init(4);
        m.insert_unique(3, 9);
        m.clear();
        assert!(m.is_empty());
        assert_eq!(m.get(3), None);
        assert!(m.unique_keys().is_empty());
        m.clear();
        assert!(m.is_empty());
    }
}
