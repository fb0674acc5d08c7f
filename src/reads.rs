use std::collections::{HashSet, VecDeque};

use tracing::warn;

use crate::models::Post;
use crate::storage::{KeyValueStore, StoreError};

pub const READS_KEY: &str = "readPosts";
pub const DEFAULT_CAPACITY: usize = 2000;

/// Which posts the reader has opened, oldest first. Bounded: once full, the
/// oldest read is forgotten.
#[derive(Debug, Clone)]
pub struct ReadTracker {
    order: VecDeque<i64>,
    index: HashSet<i64>,
    capacity: usize,
}

impl ReadTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            index: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn load<S: KeyValueStore + ?Sized>(store: &S, capacity: usize) -> Self {
        let stored: Vec<i64> = match store.get(READS_KEY) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring unreadable read history: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        let mut tracker = Self::new(capacity);
        for no in stored {
            tracker.remember(no);
        }
        tracker
    }

    fn remember(&mut self, no: i64) -> bool {
        if !self.index.insert(no) {
            return false;
        }
        self.order.push_back(no);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.index.remove(&oldest);
            }
        }
        true
    }

    fn save<S: KeyValueStore + ?Sized>(&self, store: &mut S) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&self.order)?;
        store.set(READS_KEY, raw)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_read(&self, no: i64) -> bool {
        self.index.contains(&no)
    }

    /// Returns true when `no` was not read before.
    pub fn mark_read<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &mut S,
        no: i64,
    ) -> Result<bool, StoreError> {
        if !self.remember(no) {
            return Ok(false);
        }
        self.save(store)?;
        Ok(true)
    }

    /// Marks every post in `posts` read. Returns how many were new.
    pub fn mark_all<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &mut S,
        posts: &[Post],
    ) -> Result<usize, StoreError> {
        let added = posts.iter().filter(|p| self.remember(p.no)).count();
        if added > 0 {
            self.save(store)?;
        }
        Ok(added)
    }

    pub fn unread_count(&self, posts: &[Post]) -> usize {
        posts.iter().filter(|p| !self.is_read(p.no)).count()
    }

    pub fn clear<S: KeyValueStore + ?Sized>(&mut self, store: &mut S) -> Result<(), StoreError> {
        self.order.clear();
        self.index.clear();
        store.remove(READS_KEY)
    }
}
