//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for cache eviction.

use std::collections::HashMap;
use std::hash::Hash;

/// Slot index of the head sentinel. `nodes[HEAD].next` is the oldest key.
const HEAD: usize = 0;
/// Slot index of the tail sentinel. `nodes[TAIL].prev` is the newest key.
const TAIL: usize = 1;

#[derive(Debug)]
struct Node<K> {
    key: Option<K>,
    prev: usize,
    next: usize,
}

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Keys live in a doubly-linked list stored in a slot vector:
/// - Next to the head sentinel = Least recently used
/// - Next to the tail sentinel = Most recently used
///
/// Freed slots are recycled through a free list, so every operation is O(1).
#[derive(Debug)]
pub struct LruTracker<K> {
    nodes: Vec<Node<K>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
}

impl<K: Hash + Eq + Clone> LruTracker<K> {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self {
            nodes: vec![
                Node {
                    key: None,
                    prev: HEAD,
                    next: TAIL,
                },
                Node {
                    key: None,
                    prev: HEAD,
                    next: TAIL,
                },
            ],
            free: Vec::new(),
            index: HashMap::new(),
        }
    }

    // == Touch ==
    /// Marks a key as recently used (moves to the tail).
    ///
    /// If key exists, unlinks it then relinks at the tail.
    /// If key is new, allocates a slot at the tail.
    pub fn touch(&mut self, key: &K) {
        if let Some(&slot) = self.index.get(key) {
            self.unlink(slot);
            self.link_back(slot);
            return;
        }

        let slot = self.alloc(key.clone());
        self.link_back(slot);
        self.index.insert(key.clone(), slot);
    }

    // == Remove ==
    /// Removes a key from the tracker. Returns false if it was not tracked.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(slot) => {
                self.unlink(slot);
                self.release(slot);
                true
            }
            None => false,
        }
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if tracker is empty.
    pub fn evict_oldest(&mut self) -> Option<K> {
        let slot = self.nodes[HEAD].next;
        if slot == TAIL {
            return None;
        }

        self.unlink(slot);
        let key = self.release(slot)?;
        self.index.remove(&key);
        Some(key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&K> {
        self.nodes[self.nodes[HEAD].next].key.as_ref()
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    // == Clear ==
    /// Forgets every key.
    pub fn clear(&mut self) {
        self.nodes.truncate(2);
        self.nodes[HEAD].next = TAIL;
        self.nodes[TAIL].prev = HEAD;
        self.free.clear();
        self.index.clear();
    }

    // == Iter ==
    /// Iterates keys from least to most recently used.
    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            nodes: &self.nodes,
            cursor: self.nodes[HEAD].next,
        }
    }

    fn alloc(&mut self, key: K) -> usize {
        let node = Node {
            key: Some(key),
            prev: HEAD,
            next: TAIL,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, slot: usize) -> Option<K> {
        self.free.push(slot);
        self.nodes[slot].key.take()
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }

    fn link_back(&mut self, slot: usize) {
        let last = self.nodes[TAIL].prev;
        self.nodes[slot].prev = last;
        self.nodes[slot].next = TAIL;
        self.nodes[last].next = slot;
        self.nodes[TAIL].prev = slot;
    }
}

impl<K: Hash + Eq + Clone> Default for LruTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}

// == Iterator ==
/// Iterator over tracked keys, oldest first.
pub struct Iter<'a, K> {
    nodes: &'a [Node<K>],
    cursor: usize,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == TAIL {
            return None;
        }
        let node = &self.nodes[self.cursor];
        self.cursor = node.next;
        node.key.as_ref()
    }
}
