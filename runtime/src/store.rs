//! Ordered key-value store with nested write caches.
//!
//! Every handler that may fail runs on top of a cache layer. Reads fall
//! through the layers from the top; writes, deletions and emitted events stay
//! in the top layer until it is committed into the one below or discarded.

use {
    crate::events::Event,
    log::*,
    std::collections::BTreeMap,
};

#[derive(Debug, Default)]
struct CacheLayer {
    /// `None` marks a deletion.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    events: Vec<Event>,
}

#[derive(Debug, Default)]
pub struct KvStore {
    base: BTreeMap<Vec<u8>, Vec<u8>>,
    layers: Vec<CacheLayer>,
    events: Vec<Event>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        for layer in self.layers.iter().rev() {
            if let Some(value) = layer.writes.get(key) {
                return value.clone();
            }
        }
        self.base.get(key).cloned()
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        match self.layers.last_mut() {
            Some(layer) => {
                layer.writes.insert(key, Some(value));
            }
            None => {
                self.base.insert(key, value);
            }
        }
    }

    pub fn delete(&mut self, key: &[u8]) {
        match self.layers.last_mut() {
            Some(layer) => {
                layer.writes.insert(key.to_vec(), None);
            }
            None => {
                self.base.remove(key);
            }
        }
    }

    /// All live entries whose key starts with `prefix`, in key order.
    pub fn iter_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = self
            .base
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        for layer in &self.layers {
            for (k, v) in layer
                .writes
                .range(prefix.to_vec()..)
                .take_while(|(k, _)| k.starts_with(prefix))
            {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect()
    }

    /// Number of open cache layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Open a new cache layer.
    pub fn cache(&mut self) {
        self.layers.push(CacheLayer::default());
    }

    /// Merge the top cache layer into the one below it.
    pub fn commit(&mut self) {
        let Some(top) = self.layers.pop() else {
            warn!("commit called without an open cache layer");
            return;
        };
        match self.layers.last_mut() {
            Some(below) => {
                below.writes.extend(top.writes);
                below.events.extend(top.events);
            }
            None => {
                for (key, value) in top.writes {
                    match value {
                        Some(value) => {
                            self.base.insert(key, value);
                        }
                        None => {
                            self.base.remove(&key);
                        }
                    }
                }
                self.events.extend(top.events);
            }
        }
    }

    /// Drop the top cache layer with its writes and events.
    pub fn discard(&mut self) {
        if self.layers.pop().is_none() {
            warn!("discard called without an open cache layer");
        }
    }

    /// Discard every layer above `depth`.
    pub fn rollback_to(&mut self, depth: usize) {
        while self.layers.len() > depth {
            self.layers.pop();
        }
    }

    pub fn emit(&mut self, event: Event) {
        match self.layers.last_mut() {
            Some(layer) => layer.events.push(event),
            None => self.events.push(event),
        }
    }

    /// Events committed to the base layer.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events visible from the top layer, committed ones first.
    pub fn pending_events(&self) -> Vec<&Event> {
        self.events
            .iter()
            .chain(self.layers.iter().flat_map(|l| l.events.iter()))
            .collect()
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Number of committed keys, for diagnostics.
    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> Event {
        Event::SetMimir {
            key: name.to_string(),
            value: 1,
        }
    }

    #[test]
    fn test_commit_merges_down() {
        let mut store = KvStore::new();
        store.set(b"a".to_vec(), b"1".to_vec());
        store.cache();
        store.set(b"b".to_vec(), b"2".to_vec());
        store.delete(b"a");
        store.emit(event("x"));
        assert_eq!(store.get(b"a"), None);
        assert!(store.events().is_empty());
        store.commit();
        assert_eq!(store.depth(), 0);
        assert_eq!(store.get(b"a"), None);
        assert_eq!(store.get(b"b"), Some(b"2".to_vec()));
        assert_eq!(store.events().len(), 1);
    }

    #[test]
    fn test_discard_drops_writes_and_events() {
        let mut store = KvStore::new();
        store.set(b"a".to_vec(), b"1".to_vec());
        store.cache();
        store.set(b"a".to_vec(), b"2".to_vec());
        store.cache();
        store.emit(event("y"));
        store.set(b"c".to_vec(), b"3".to_vec());
        store.discard();
        assert_eq!(store.get(b"c"), None);
        assert_eq!(store.get(b"a"), Some(b"2".to_vec()));
        store.rollback_to(0);
        assert_eq!(store.get(b"a"), Some(b"1".to_vec()));
        assert!(store.pending_events().is_empty());
    }

    #[test]
    fn test_iter_prefix_merges_layers() {
        let mut store = KvStore::new();
        store.set(b"pool//a".to_vec(), b"1".to_vec());
        store.set(b"pool//b".to_vec(), b"2".to_vec());
        store.set(b"vault//a".to_vec(), b"3".to_vec());
        store.cache();
        store.delete(b"pool//a");
        store.set(b"pool//c".to_vec(), b"4".to_vec());
        let keys: Vec<Vec<u8>> = store
            .iter_prefix(b"pool//")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"pool//b".to_vec(), b"pool//c".to_vec()]);
    }
}
