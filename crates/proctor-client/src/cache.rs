//! Item and response caches.
//!
//! Preloaded item definitions are what make offline navigation possible: a
//! move can be resolved locally only when the target item is cached. The
//! caches are owned exclusively by one session proxy, so there is no
//! internal locking.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use proctor_core::map::{NavigationDirection, TestMap};
use proctor_core::tags::{Scope, Tag};

/// A preloaded item: its definition plus whatever mutable presentation
/// state the client accumulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedItem {
    pub identifier: Tag,
    pub definition: Value,
    #[serde(default)]
    pub state: Option<Value>,
}

/// Bounded cache of preloaded items.
///
/// Eviction is not required for correctness — a test has finitely many
/// items — but a configured capacity keeps the cache from growing without
/// bound; the oldest entry is evicted first.
#[derive(Debug, Default)]
pub struct ItemCache {
    /// Maximum number of cached items; 0 means unbounded.
    capacity: usize,
    items: HashMap<Tag, CachedItem>,
    insertion_order: VecDeque<Tag>,
}

impl ItemCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn insert(&mut self, item: CachedItem) {
        let id = item.identifier.clone();
        if self.items.insert(id.clone(), item).is_none() {
            self.insertion_order.push_back(id);
            if self.capacity > 0 && self.items.len() > self.capacity {
                if let Some(evicted) = self.insertion_order.pop_front() {
                    tracing::debug!(item = %evicted, "evicting cached item");
                    self.items.remove(&evicted);
                }
            }
        }
    }

    pub fn get(&self, id: &Tag) -> Option<&CachedItem> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &Tag) -> Option<&mut CachedItem> {
        self.items.get_mut(id)
    }

    pub fn has_item(&self, id: &Tag) -> bool {
        self.items.contains_key(id)
    }

    /// Whether the item one step forward from `position` is cached.
    pub fn has_next_item(&self, map: &TestMap, position: usize) -> bool {
        self.has_target(map, position, NavigationDirection::Next)
    }

    /// Whether the item one step back from `position` is cached.
    pub fn has_previous_item(&self, map: &TestMap, position: usize) -> bool {
        self.has_target(map, position, NavigationDirection::Previous)
    }

    fn has_target(&self, map: &TestMap, position: usize, direction: NavigationDirection) -> bool {
        map.target_position(position, direction, Scope::Item, None)
            .and_then(|p| map.entry_at(p))
            .map(|e| self.has_item(&e.item))
            .unwrap_or(false)
    }
}

/// Correct and submitted responses, kept for offline allow-skip validation.
#[derive(Debug, Default)]
pub struct ResponseCache {
    correct: HashMap<Tag, Value>,
    submitted: HashMap<Tag, Value>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_correct(&mut self, id: Tag, response: Value) {
        self.correct.insert(id, response);
    }

    pub fn set_submitted(&mut self, id: Tag, response: Value) {
        self.submitted.insert(id, response);
    }

    pub fn correct(&self, id: &Tag) -> Option<&Value> {
        self.correct.get(id)
    }

    pub fn submitted(&self, id: &Tag) -> Option<&Value> {
        self.submitted.get(id)
    }

    pub fn has_submitted(&self, id: &Tag) -> bool {
        self.submitted.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::map::{ItemDef, PartDef, SectionDef};

    fn cached(id: &str) -> CachedItem {
        CachedItem {
            identifier: Tag::new(id),
            definition: serde_json::json!({"type": "choice"}),
            state: None,
        }
    }

    fn linear_map(ids: &[&str]) -> TestMap {
        TestMap {
            id: Tag::new("test-x"),
            label: String::new(),
            time_limits: None,
            extra_time_ms: 0,
            parts: vec![PartDef {
                id: Tag::new("part-1"),
                navigation_mode: Default::default(),
                time_limits: None,
                sections: vec![SectionDef {
                    id: Tag::new("section-A"),
                    label: String::new(),
                    time_limits: None,
                    items: ids
                        .iter()
                        .map(|id| ItemDef {
                            id: Tag::new(*id),
                            label: String::new(),
                            categories: vec![],
                            time_limits: None,
                            allow_skipping: true,
                        })
                        .collect(),
                }],
            }],
        }
    }

    #[test]
    fn directional_lookups_consult_the_map() {
        let map = linear_map(&["item-1", "item-2", "item-3"]);
        let mut cache = ItemCache::new(0);
        cache.insert(cached("item-1"));
        cache.insert(cached("item-2"));

        assert!(cache.has_next_item(&map, 0));
        assert!(!cache.has_next_item(&map, 1), "item-3 is not cached");
        assert!(!cache.has_next_item(&map, 2), "no item past the last");
        assert!(cache.has_previous_item(&map, 1));
        assert!(!cache.has_previous_item(&map, 0));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut cache = ItemCache::new(2);
        cache.insert(cached("item-1"));
        cache.insert(cached("item-2"));
        cache.insert(cached("item-3"));

        assert_eq!(cache.len(), 2);
        assert!(!cache.has_item(&Tag::new("item-1")));
        assert!(cache.has_item(&Tag::new("item-2")));
        assert!(cache.has_item(&Tag::new("item-3")));
    }

    #[test]
    fn reinsert_updates_in_place() {
        let mut cache = ItemCache::new(2);
        cache.insert(cached("item-1"));
        let mut updated = cached("item-1");
        updated.state = Some(serde_json::json!({"visited": true}));
        cache.insert(updated);

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&Tag::new("item-1")).unwrap().state.is_some());
    }

    #[test]
    fn response_cache_tracks_both_sides() {
        let mut responses = ResponseCache::new();
        let id = Tag::new("item-1");
        responses.set_correct(id.clone(), serde_json::json!("B"));
        responses.set_submitted(id.clone(), serde_json::json!("A"));

        assert_eq!(responses.correct(&id), Some(&serde_json::json!("B")));
        assert_eq!(responses.submitted(&id), Some(&serde_json::json!("A")));
        assert!(responses.has_submitted(&id));
        assert!(!responses.has_submitted(&Tag::new("item-2")));
    }
}
