//! Collection state and its transitions.
//!
//! Everything here is synchronous: the async side ([`super::CollectionLoader`])
//! decides *when* a transition happens, this module decides *what* it does.

use crate::api::{Item, ItemFlag, Page};
use std::collections::HashSet;
use uuid::Uuid;

/// Which kind of page fetch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// First page after a reset
    Initial,
    /// Any subsequent page
    NextPage,
}

/// Loading phase as seen by a renderer. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    InitialLoading,
    PageLoading,
    BackgroundRefreshing,
}

/// Accumulated items plus pagination bookkeeping.
///
/// Items keep fetch order. Appends skip ids that are already present, so the
/// list never holds the same entity twice; the cursor still advances by what
/// the server returned so offsets stay aligned with the server's view.
#[derive(Debug, Clone)]
pub struct CollectionState<T> {
    items: Vec<T>,
    ids: HashSet<Uuid>,
    cursor: u64,
    has_more: bool,
    in_flight: Option<FetchKind>,
    background_refreshing: bool,
    error: Option<String>,
}

impl<T> Default for CollectionState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            ids: HashSet::new(),
            cursor: 0,
            has_more: true,
            in_flight: None,
            background_refreshing: false,
            error: None,
        }
    }
}

impl<T: Item> CollectionState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn in_flight(&self) -> Option<FetchKind> {
        self.in_flight
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }

    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn phase(&self) -> LoadPhase {
        match self.in_flight {
            Some(FetchKind::Initial) => LoadPhase::InitialLoading,
            Some(FetchKind::NextPage) => LoadPhase::PageLoading,
            None if self.background_refreshing => LoadPhase::BackgroundRefreshing,
            None => LoadPhase::Idle,
        }
    }

    /// Drop everything and mark the initial fetch as in flight.
    pub fn reset(&mut self) {
        let background_refreshing = self.background_refreshing;
        *self = Self::default();
        self.background_refreshing = background_refreshing;
        self.in_flight = Some(FetchKind::Initial);
    }

    /// Drop everything and go idle (no identity).
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Mark a next-page fetch as started.
    ///
    /// Returns false (and changes nothing) if a fetch is already in flight or
    /// the collection is exhausted.
    pub fn begin_next_page(&mut self) -> bool {
        if self.in_flight.is_some() || !self.has_more {
            return false;
        }
        self.in_flight = Some(FetchKind::NextPage);
        true
    }

    /// Apply a fetched page. Returns the number of items actually appended.
    pub fn append_page(&mut self, page: Page<T>) -> usize {
        self.in_flight = None;
        self.error = None;
        self.cursor = self.cursor.saturating_add(page.items.len() as u64);
        self.has_more = page.has_more;

        let mut added = 0;
        for item in page.items {
            if self.ids.insert(item.id()) {
                self.items.push(item);
                added += 1;
            }
        }
        added
    }

    /// Record a failed page fetch. Cursor and items are left untouched.
    pub fn fail_page(&mut self, message: String) {
        self.in_flight = None;
        self.error = Some(message);
    }

    pub fn set_error(&mut self, message: String) {
        self.error = Some(message);
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn set_background_refreshing(&mut self, refreshing: bool) {
        self.background_refreshing = refreshing;
    }

    /// Set `flag` on the item with `id`. Returns false if no such item.
    pub fn set_flag(&mut self, id: Uuid, flag: ItemFlag, value: bool) -> bool {
        match self.items.iter_mut().find(|item| item.id() == id) {
            Some(item) => {
                item.set_flag(flag, value);
                true
            }
            None => false,
        }
    }

    /// Remove the item with `id`, keeping the order of the rest.
    pub fn remove(&mut self, id: Uuid) -> bool {
        if !self.ids.remove(&id) {
            return false;
        }
        self.items.retain(|item| item.id() != id);
        true
    }
}
