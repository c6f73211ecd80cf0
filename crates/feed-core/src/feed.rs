use std::collections::{HashSet, VecDeque};

use crate::types::Event;

/// Default retention cap for a mounted feed.
pub const DEFAULT_MAX_ITEMS: usize = 500;

/// Result of merging one event into the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The event was new and is now visible.
    Inserted,
    /// The id was already known; nothing changed.
    Duplicate,
}

/// Ordered, deduplicated feed contents (newest first) with bounded retention.
///
/// `known_ids` always holds exactly the ids present in `events`.
#[derive(Debug, Clone)]
pub struct FeedState {
    events: VecDeque<Event>,
    known_ids: HashSet<String>,
    max_items: usize,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITEMS)
    }
}

impl FeedState {
    /// Create an empty feed with an item cap (`max_items >= 1`).
    pub fn new(max_items: usize) -> Self {
        Self {
            events: VecDeque::new(),
            known_ids: HashSet::new(),
            max_items: max_items.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.known_ids.contains(id)
    }

    /// Events in display order, newest first.
    pub fn events(&self) -> impl ExactSizeIterator<Item = &Event> {
        self.events.iter()
    }

    pub fn to_vec(&self) -> Vec<Event> {
        self.events.iter().cloned().collect()
    }

    /// Append snapshot items behind whatever is already present, keeping server order.
    ///
    /// Items whose id is already known (including repeats inside the snapshot
    /// itself) are skipped. Returns how many items were added.
    pub fn extend_snapshot(&mut self, items: impl IntoIterator<Item = Event>) -> usize {
        let mut added = 0;
        for event in items {
            if self.known_ids.contains(&event.id) {
                continue;
            }
            self.known_ids.insert(event.id.clone());
            self.events.push_back(event);
            added += 1;
        }
        self.trim_to_max();
        added
    }

    /// Merge one live event at the most-recent end unless its id is already known.
    ///
    /// `created_at` is deliberately ignored: arrival order decides position.
    pub fn merge(&mut self, event: Event) -> MergeOutcome {
        if self.known_ids.contains(&event.id) {
            return MergeOutcome::Duplicate;
        }
        self.known_ids.insert(event.id.clone());
        self.events.push_front(event);
        self.trim_to_max();
        MergeOutcome::Inserted
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.known_ids.clear();
    }

    fn trim_to_max(&mut self) {
        while self.events.len() > self.max_items {
            if let Some(evicted) = self.events.pop_back() {
                self.known_ids.remove(&evicted.id);
            }
        }
    }
}
