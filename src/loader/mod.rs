//! Incremental collection loading.
//!
//! [`CollectionLoader`] grows an ordered list of items page by page from a
//! [`PageSource`]. Every remote call runs in a spawned task; completions come
//! back as [`LoaderEvent`]s over the loader's own channel and are applied by
//! the owner through [`CollectionLoader::next_event`] (or
//! [`CollectionLoader::apply`]).
//!
//! Each [`CollectionLoader::reset`] starts a new session generation. Events
//! carry the generation they were spawned under and are dropped on mismatch,
//! so a slow response for a previous user can never leak into the list of
//! the current one.

mod source;
mod state;

pub use source::{BookmarksSource, PageSource, PostsSource};
pub use state::{CollectionState, FetchKind, LoadPhase};

use crate::api::{ApiError, Item, ItemFlag, Page};
use crate::identity::Identity;
use crate::util::catch_task_panic;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Default number of items requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Capacity of the completion channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

const ERR_NO_IDENTITY: &str = "No user selected";

/// Tunables for a [`CollectionLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    pub page_size: u32,
    /// Pull fresh content once when a fetch comes back empty and exhausted.
    pub fallback_pull: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            fallback_pull: true,
        }
    }
}

/// Which background task an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderTask {
    Page(FetchKind),
    SetFlag { item_id: Uuid, flag: ItemFlag },
    Remove { item_id: Uuid },
}

/// Completion of a spawned loader task.
#[derive(Debug)]
pub enum LoaderEvent<T> {
    PageLoaded {
        generation: u64,
        kind: FetchKind,
        result: Result<Page<T>, ApiError>,
    },
    FlagSet {
        generation: u64,
        item_id: Uuid,
        flag: ItemFlag,
        value: bool,
        result: Result<(), ApiError>,
    },
    Removed {
        generation: u64,
        item_id: Uuid,
        result: Result<(), ApiError>,
    },
    TaskPanicked {
        generation: u64,
        task: LoaderTask,
        error: String,
    },
}

impl<T> LoaderEvent<T> {
    pub fn generation(&self) -> u64 {
        match self {
            LoaderEvent::PageLoaded { generation, .. }
            | LoaderEvent::FlagSet { generation, .. }
            | LoaderEvent::Removed { generation, .. }
            | LoaderEvent::TaskPanicked { generation, .. } => *generation,
        }
    }
}

/// What applying an event changed, for callers that render incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderUpdate {
    PageLoaded {
        added: usize,
        has_more: bool,
    },
    /// Remote flag change confirmed. `present` is false when the item is not
    /// in the local list, in which case nothing local changed.
    FlagChanged {
        item_id: Uuid,
        flag: ItemFlag,
        value: bool,
        present: bool,
    },
    ItemRemoved {
        item_id: Uuid,
        present: bool,
    },
    Failed(String),
    /// Event belonged to an earlier session and was dropped.
    Stale,
}

/// Incrementally loaded, identity-scoped list of items.
pub struct CollectionLoader<S: PageSource> {
    source: Arc<S>,
    options: LoaderOptions,
    state: CollectionState<S::Item>,
    identity: Option<Identity>,
    generation: u64,
    page_task: Option<JoinHandle<()>>,
    mutation_tasks: Vec<JoinHandle<()>>,
    pending_flags: HashSet<(Uuid, ItemFlag)>,
    pending_removals: HashSet<Uuid>,
    event_tx: mpsc::Sender<LoaderEvent<S::Item>>,
    event_rx: mpsc::Receiver<LoaderEvent<S::Item>>,
}

impl<S: PageSource> CollectionLoader<S> {
    pub fn new(source: S, options: LoaderOptions) -> Self {
        Self::with_shared_source(Arc::new(source), options)
    }

    pub fn with_shared_source(source: Arc<S>, options: LoaderOptions) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            source,
            options: LoaderOptions {
                page_size: options.page_size.max(1),
                ..options
            },
            state: CollectionState::new(),
            identity: None,
            generation: 0,
            page_task: None,
            mutation_tasks: Vec::new(),
            pending_flags: HashSet::new(),
            pending_removals: HashSet::new(),
            event_tx,
            event_rx,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn options(&self) -> LoaderOptions {
        self.options
    }

    pub fn items(&self) -> &[S::Item] {
        self.state.items()
    }

    pub fn cursor(&self) -> u64 {
        self.state.cursor()
    }

    pub fn has_more(&self) -> bool {
        self.state.has_more()
    }

    pub fn phase(&self) -> LoadPhase {
        self.state.phase()
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error()
    }

    pub fn clear_error(&mut self) {
        self.state.clear_error();
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while a page fetch or a mutation of the current session is
    /// outstanding.
    pub fn is_busy(&self) -> bool {
        self.state.in_flight().is_some()
            || !self.pending_flags.is_empty()
            || !self.pending_removals.is_empty()
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Start a fresh session for `identity` and fetch the first page.
    ///
    /// Anything in flight for the previous session is invalidated; calling
    /// this repeatedly is safe and the last call wins.
    pub fn reset(&mut self, identity: Identity) {
        self.invalidate();
        tracing::debug!(
            user_id = %identity.user_id,
            generation = self.generation,
            "Resetting collection"
        );
        self.identity = Some(identity);
        self.state.reset();
        self.spawn_page_fetch(FetchKind::Initial, 0);
    }

    /// Reload from the first page with the current identity.
    ///
    /// Returns false when no identity is set.
    pub fn refresh(&mut self) -> bool {
        match self.identity.clone() {
            Some(identity) => {
                self.reset(identity);
                true
            }
            None => false,
        }
    }

    /// Drop the identity and every item, cancelling outstanding work.
    pub fn close(&mut self) {
        self.invalidate();
        self.identity = None;
        self.state.clear();
    }

    fn invalidate(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.page_task.take() {
            handle.abort();
        }
        self.pending_flags.clear();
        self.pending_removals.clear();
    }

    pub fn set_background_refreshing(&mut self, refreshing: bool) {
        self.state.set_background_refreshing(refreshing);
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Fetch the page after the cursor.
    ///
    /// Returns false without any remote call when a page load is already in
    /// flight, the collection is exhausted or no identity is set.
    pub fn load_next_page(&mut self) -> bool {
        if self.identity.is_none() {
            tracing::debug!("load_next_page without identity, ignoring");
            return false;
        }
        if !self.state.begin_next_page() {
            tracing::debug!(
                in_flight = ?self.state.in_flight(),
                has_more = self.state.has_more(),
                "load_next_page skipped"
            );
            return false;
        }
        let offset = self.state.cursor();
        self.spawn_page_fetch(FetchKind::NextPage, offset);
        true
    }

    /// Flip `flag` on the item with `item_id`.
    ///
    /// The remote call is made first; the local flag only changes once the
    /// server confirms. An item missing from the list is treated as having
    /// the flag unset. Returns false if no identity is set or a change to the
    /// same flag on the same item is still outstanding.
    pub fn toggle_item_flag(&mut self, item_id: Uuid, flag: ItemFlag) -> bool {
        let Some(identity) = self.identity.clone() else {
            self.state.set_error(ERR_NO_IDENTITY.to_string());
            return false;
        };
        if !self.pending_flags.insert((item_id, flag)) {
            tracing::debug!(%item_id, flag = flag.label(), "Flag change already pending");
            return false;
        }

        let value = !self
            .state
            .get(item_id)
            .map(|item| item.flag(flag))
            .unwrap_or(false);
        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let tx = self.event_tx.clone();
        let task = LoaderTask::SetFlag { item_id, flag };

        let handle = spawn_reporting(generation, task, tx, async move {
            let result = source.set_flag(&identity, item_id, flag, value).await;
            LoaderEvent::FlagSet {
                generation,
                item_id,
                flag,
                value,
                result,
            }
        });
        self.track_mutation(handle);
        true
    }

    /// Delete the item remotely, then drop it from the list.
    ///
    /// Returns false if no identity is set or a removal of the same item is
    /// already outstanding.
    pub fn remove_item(&mut self, item_id: Uuid) -> bool {
        let Some(identity) = self.identity.clone() else {
            self.state.set_error(ERR_NO_IDENTITY.to_string());
            return false;
        };
        if !self.pending_removals.insert(item_id) {
            return false;
        }

        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let tx = self.event_tx.clone();

        let handle = spawn_reporting(
            generation,
            LoaderTask::Remove { item_id },
            tx,
            async move {
                let result = source.remove(&identity, item_id).await;
                LoaderEvent::Removed {
                    generation,
                    item_id,
                    result,
                }
            },
        );
        self.track_mutation(handle);
        true
    }

    fn track_mutation(&mut self, handle: JoinHandle<()>) {
        self.mutation_tasks.retain(|h| !h.is_finished());
        self.mutation_tasks.push(handle);
    }

    fn spawn_page_fetch(&mut self, kind: FetchKind, offset: u64) {
        let Some(identity) = self.identity.clone() else {
            return;
        };
        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let options = self.options;
        let tx = self.event_tx.clone();

        tracing::debug!(
            user_id = %identity.user_id,
            generation,
            offset,
            limit = options.page_size,
            ?kind,
            "Fetching page"
        );

        let handle = spawn_reporting(generation, LoaderTask::Page(kind), tx, async move {
            let result = fetch_with_fallback(&*source, &identity, options, offset).await;
            LoaderEvent::PageLoaded {
                generation,
                kind,
                result,
            }
        });
        self.page_task = Some(handle);
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Wait for the next completion and apply it.
    pub async fn next_event(&mut self) -> Option<LoaderUpdate> {
        let event = self.event_rx.recv().await?;
        Some(self.apply(event))
    }

    /// Apply every completion that has already arrived, without waiting.
    pub fn drain_events(&mut self) -> Vec<LoaderUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            updates.push(self.apply(event));
        }
        updates
    }

    /// Apply completions until nothing of the current session is in flight.
    pub async fn settle(&mut self) -> Vec<LoaderUpdate> {
        let mut updates = Vec::new();
        while self.is_busy() {
            match self.next_event().await {
                Some(update) => updates.push(update),
                None => break,
            }
        }
        updates
    }

    /// Apply one completion event to the collection.
    pub fn apply(&mut self, event: LoaderEvent<S::Item>) -> LoaderUpdate {
        if event.generation() != self.generation {
            tracing::debug!(
                event_generation = event.generation(),
                current = self.generation,
                "Discarding stale loader event"
            );
            return LoaderUpdate::Stale;
        }

        match event {
            LoaderEvent::PageLoaded { kind, result, .. } => {
                self.page_task = None;
                match result {
                    Ok(page) => {
                        let received = page.items.len();
                        let added = self.state.append_page(page);
                        tracing::debug!(
                            ?kind,
                            received,
                            added,
                            cursor = self.state.cursor(),
                            has_more = self.state.has_more(),
                            "Page loaded"
                        );
                        LoaderUpdate::PageLoaded {
                            added,
                            has_more: self.state.has_more(),
                        }
                    }
                    Err(e) => {
                        tracing::warn!(?kind, error = %e, "Page load failed");
                        let message = e.user_message();
                        self.state.fail_page(message.clone());
                        LoaderUpdate::Failed(message)
                    }
                }
            }
            LoaderEvent::FlagSet {
                item_id,
                flag,
                value,
                result,
                ..
            } => {
                self.pending_flags.remove(&(item_id, flag));
                match result {
                    Ok(()) => {
                        let present = self.state.set_flag(item_id, flag, value);
                        LoaderUpdate::FlagChanged {
                            item_id,
                            flag,
                            value,
                            present,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%item_id, flag = flag.label(), error = %e, "Flag change failed");
                        let message = e.user_message();
                        self.state.set_error(message.clone());
                        LoaderUpdate::Failed(message)
                    }
                }
            }
            LoaderEvent::Removed {
                item_id, result, ..
            } => {
                self.pending_removals.remove(&item_id);
                match result {
                    Ok(()) => LoaderUpdate::ItemRemoved {
                        item_id,
                        present: self.state.remove(item_id),
                    },
                    Err(e) => {
                        tracing::warn!(%item_id, error = %e, "Remove failed");
                        let message = e.user_message();
                        self.state.set_error(message.clone());
                        LoaderUpdate::Failed(message)
                    }
                }
            }
            LoaderEvent::TaskPanicked { task, error, .. } => {
                let message = format!("Background task failed: {}", error);
                match task {
                    LoaderTask::Page(_) => {
                        self.page_task = None;
                        self.state.fail_page(message.clone());
                    }
                    LoaderTask::SetFlag { item_id, flag } => {
                        self.pending_flags.remove(&(item_id, flag));
                        self.state.set_error(message.clone());
                    }
                    LoaderTask::Remove { item_id } => {
                        self.pending_removals.remove(&item_id);
                        self.state.set_error(message.clone());
                    }
                }
                LoaderUpdate::Failed(message)
            }
        }
    }
}

impl<S: PageSource> Drop for CollectionLoader<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.page_task.take() {
            handle.abort();
        }
        for handle in self.mutation_tasks.drain(..) {
            handle.abort();
        }
    }
}

/// Fetch one page, pulling fresh content once if the collection looks
/// exhausted and empty.
async fn fetch_with_fallback<S: PageSource>(
    source: &S,
    identity: &Identity,
    options: LoaderOptions,
    offset: u64,
) -> Result<Page<S::Item>, ApiError> {
    let page = source
        .fetch_page(identity, options.page_size, offset)
        .await?;
    if !options.fallback_pull || !page.items.is_empty() || page.has_more {
        return Ok(page);
    }

    match source.pull_fresh_content(identity).await {
        Ok(0) => {
            tracing::debug!(offset, "No fresh content, collection exhausted");
            Ok(page)
        }
        Ok(new_items) => {
            tracing::debug!(offset, new_items, "Fresh content pulled, retrying page");
            source
                .fetch_page(identity, options.page_size, offset)
                .await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Fallback pull failed");
            Ok(page)
        }
    }
}

/// Spawn `work`, send its event, and report a panic as
/// [`LoaderEvent::TaskPanicked`].
fn spawn_reporting<T, F>(
    generation: u64,
    task: LoaderTask,
    tx: mpsc::Sender<LoaderEvent<T>>,
    work: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: std::future::Future<Output = LoaderEvent<T>> + Send + 'static,
{
    tokio::spawn(async move {
        let event = match catch_task_panic(work).await {
            Ok(event) => event,
            Err(panic_msg) => {
                tracing::error!(?task, error = %panic_msg, "Loader task panicked");
                LoaderEvent::TaskPanicked {
                    generation,
                    task,
                    error: panic_msg,
                }
            }
        };
        if let Err(e) = tx.send(event).await {
            tracing::warn!(error = %e, "Channel send failed (receiver dropped)");
        }
    })
}
