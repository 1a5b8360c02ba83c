//! Session state shared by every front end.
//!
//! A [`Session`] owns the API client, the active identity, one loader per
//! listing (posts and bookmarks), the background refresh poller and the single
//! user-facing status line. Identity changes flow from here into the loaders;
//! the loaders never read the identity store themselves.

use crate::api::{ApiError, GatorClient, ItemFlag};
use crate::config::Config;
use crate::identity::{Identity, IdentityError, IdentityStore};
use crate::loader::{
    BookmarksSource, CollectionLoader, LoaderOptions, LoaderUpdate, PostsSource,
};
use crate::poller::{PollOutcome, PollerConfig, RefreshPoller, NO_NEW_CONTENT_MESSAGE};
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

/// Seconds a status message stays visible.
const STATUS_TTL_SECS: u64 = 3;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Api(e) => e.user_message(),
            SessionError::Identity(e) => e.to_string(),
        }
    }
}

/// Something a background task changed, tagged by where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Posts(LoaderUpdate),
    Bookmarks(LoaderUpdate),
    Refresh(PollOutcome),
}

pub struct Session {
    client: GatorClient,
    store: IdentityStore,
    identity: Option<Identity>,
    loader_options: LoaderOptions,
    pub posts: CollectionLoader<PostsSource>,
    pub bookmarks: CollectionLoader<BookmarksSource>,
    poller: RefreshPoller,
    status_message: Option<(Cow<'static, str>, Instant)>,
}

impl Session {
    pub fn new(client: GatorClient, store: IdentityStore, config: &Config) -> Self {
        Self::with_options(
            client,
            store,
            config.loader_options(),
            config.poller_config(),
        )
    }

    pub fn with_options(
        client: GatorClient,
        store: IdentityStore,
        loader_options: LoaderOptions,
        poller_config: PollerConfig,
    ) -> Self {
        Self {
            posts: CollectionLoader::new(PostsSource::new(client.clone()), loader_options),
            bookmarks: CollectionLoader::new(BookmarksSource::new(client.clone()), loader_options),
            poller: RefreshPoller::new(poller_config),
            client,
            store,
            identity: None,
            loader_options,
            status_message: None,
        }
    }

    pub fn client(&self) -> &GatorClient {
        &self.client
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn poller(&self) -> &RefreshPoller {
        &self.poller
    }

    /// The active identity, or a precondition error when nobody is selected.
    pub fn require_identity(&self) -> Result<&Identity, ApiError> {
        self.identity
            .as_ref()
            .ok_or(ApiError::Precondition("No user selected"))
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// Load the saved identity, if any. Loaders are not started; call
    /// [`Session::open_posts`] or [`Session::open_bookmarks`] for that.
    pub fn restore(&mut self) -> Result<Option<&Identity>, IdentityError> {
        self.identity = self.store.load()?;
        Ok(self.identity.as_ref())
    }

    /// Look up `name` on the server and make it the active user.
    pub async fn select_user(&mut self, name: &str) -> Result<&Identity, SessionError> {
        let user = self.client.get_user(name).await?;
        self.switch_identity(Some(Identity::from(user)))?;
        self.set_status(format!("Switched to {}", name.trim()));
        self.require_identity().map_err(SessionError::from)
    }

    /// Create a user and make it the active one.
    pub async fn create_user(&mut self, name: &str) -> Result<&Identity, SessionError> {
        let user = self.client.create_user(name).await?;
        tracing::info!(user_id = %user.id, "Created user");
        self.switch_identity(Some(Identity::from(user)))?;
        self.set_status("User created");
        self.require_identity().map_err(SessionError::from)
    }

    /// Rename the active user.
    pub async fn rename_user(&mut self, new_name: &str) -> Result<&Identity, SessionError> {
        let user_id = self.require_identity()?.user_id;
        let user = self.client.update_user(user_id, new_name).await?;
        let identity = Identity::from(user);
        self.store.save(Some(&identity))?;
        self.identity = Some(identity);
        self.set_status("User renamed");
        self.require_identity().map_err(SessionError::from)
    }

    /// Delete the active user on the server and log out.
    pub async fn delete_user(&mut self) -> Result<(), SessionError> {
        let user_id = self.require_identity()?.user_id;
        self.client.delete_user(user_id).await?;
        tracing::info!(%user_id, "Deleted user");
        self.logout()?;
        self.set_status("User deleted");
        Ok(())
    }

    /// Forget the active user.
    pub fn logout(&mut self) -> Result<(), IdentityError> {
        self.switch_identity(None)
    }

    /// Persist the new identity, then drop everything tied to the old one.
    fn switch_identity(&mut self, identity: Option<Identity>) -> Result<(), IdentityError> {
        self.store.save(identity.as_ref())?;
        self.poller.stop();
        self.posts.set_background_refreshing(false);

        match &identity {
            Some(identity) => {
                tracing::info!(user_id = %identity.user_id, "Identity changed");
                if self.posts.identity().is_some() {
                    self.posts.reset(identity.clone());
                }
                if self.bookmarks.identity().is_some() {
                    self.bookmarks.reset(identity.clone());
                }
            }
            None => {
                tracing::info!("Logged out");
                self.posts.close();
                self.bookmarks.close();
            }
        }
        self.identity = identity;
        Ok(())
    }

    // ========================================================================
    // Listings
    // ========================================================================

    /// Start (or restart) the post listing, optionally for one feed.
    pub fn open_posts(&mut self, feed_id: Option<Uuid>) -> Result<(), ApiError> {
        let identity = self.require_identity()?.clone();
        if self.posts.source().feed_id() != feed_id {
            let source = match feed_id {
                Some(feed_id) => PostsSource::for_feed(self.client.clone(), feed_id),
                None => PostsSource::new(self.client.clone()),
            };
            self.poller.stop();
            self.posts = CollectionLoader::new(source, self.loader_options);
        }
        self.posts.reset(identity);
        Ok(())
    }

    pub fn open_bookmarks(&mut self) -> Result<(), ApiError> {
        let identity = self.require_identity()?.clone();
        self.bookmarks.reset(identity);
        Ok(())
    }

    /// Toggle a flag on a post, keeping the bookmark listing in step.
    pub fn toggle_post_flag(&mut self, post_id: Uuid, flag: ItemFlag) -> bool {
        self.posts.toggle_item_flag(post_id, flag)
    }

    /// Remove a post from the bookmark listing.
    pub fn remove_bookmark(&mut self, post_id: Uuid) -> bool {
        self.bookmarks.remove_item(post_id)
    }

    // ========================================================================
    // Background refresh
    // ========================================================================

    /// Begin a background refresh run for the post listing.
    pub fn start_refresh(&mut self) -> bool {
        let Some(identity) = self.identity.clone() else {
            self.set_status("No user selected");
            return false;
        };
        let source = Arc::clone(self.posts.source());
        if !self.poller.start(identity, source) {
            return false;
        }
        self.posts.set_background_refreshing(true);
        self.set_status("Checking for new posts...");
        true
    }

    pub fn stop_refresh(&mut self) {
        self.poller.stop();
        self.posts.set_background_refreshing(false);
    }

    /// Run a refresh to completion and return its final outcome.
    pub async fn refresh_now(&mut self) -> Option<PollOutcome> {
        if !self.start_refresh() {
            return None;
        }
        let outcome = self.poller.wait_settled().await?;
        self.handle_poll_outcome(&outcome);
        Some(outcome)
    }

    fn handle_poll_outcome(&mut self, outcome: &PollOutcome) {
        match outcome {
            PollOutcome::NewContent(count) => {
                self.set_status(format!("Found {} new posts", count));
                if let Some(identity) = self.identity.clone() {
                    self.posts.reset(identity);
                }
            }
            PollOutcome::NoNewContent => self.set_status(NO_NEW_CONTENT_MESSAGE),
            PollOutcome::Failed(message) => self.set_status(message.clone()),
            PollOutcome::Progress { .. } | PollOutcome::Stale => return,
        }
        self.poller.finish();
        self.posts.set_background_refreshing(false);
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Wait for the next completion from any background task and apply it.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let update = tokio::select! {
            Some(update) = self.posts.next_event() => SessionUpdate::Posts(update),
            Some(update) = self.bookmarks.next_event() => SessionUpdate::Bookmarks(update),
            Some(outcome) = self.poller.next_event() => SessionUpdate::Refresh(outcome),
            else => return None,
        };
        self.after_update(&update);
        Some(update)
    }

    /// Apply every completion that has already arrived.
    pub fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        let mut updates: Vec<SessionUpdate> = self
            .posts
            .drain_events()
            .into_iter()
            .map(SessionUpdate::Posts)
            .collect();
        updates.extend(
            self.bookmarks
                .drain_events()
                .into_iter()
                .map(SessionUpdate::Bookmarks),
        );
        updates.extend(
            self.poller
                .drain_events()
                .into_iter()
                .map(SessionUpdate::Refresh),
        );
        for update in &updates {
            self.after_update(update);
        }
        updates
    }

    fn after_update(&mut self, update: &SessionUpdate) {
        match update {
            SessionUpdate::Posts(LoaderUpdate::Failed(message))
            | SessionUpdate::Bookmarks(LoaderUpdate::Failed(message)) => {
                self.set_status(message.clone());
            }
            SessionUpdate::Posts(LoaderUpdate::FlagChanged {
                flag: ItemFlag::Bookmarked,
                value,
                ..
            }) => {
                self.set_status(if *value {
                    "Bookmark added"
                } else {
                    "Bookmark removed"
                });
                if self.bookmarks.identity().is_some() {
                    self.bookmarks.refresh();
                }
            }
            SessionUpdate::Bookmarks(LoaderUpdate::ItemRemoved { .. }) => {
                self.set_status("Bookmark removed");
            }
            SessionUpdate::Refresh(outcome) => self.handle_poll_outcome(outcome),
            _ => {}
        }
    }

    // ========================================================================
    // Status line
    // ========================================================================

    /// Set status message (will auto-expire after 3 seconds)
    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
    }

    pub fn status(&self) -> Option<&str> {
        self.status_message.as_ref().map(|(msg, _)| msg.as_ref())
    }

    /// Clear status message if expired. Returns true if a message was cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed().as_secs() >= STATUS_TTL_SECS {
                self.status_message = None;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadPhase;
    use crate::poller::PollerState;
    use std::path::PathBuf;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const USER: &str = "11111111-1111-1111-1111-111111111111";

    fn temp_store() -> (IdentityStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("gator-session-{}", Uuid::new_v4()));
        (IdentityStore::new(&dir), dir)
    }

    fn post_json(n: u32) -> String {
        format!(
            r#"{{"ID":"00000000-0000-0000-0000-{n:012}","Title":"Post {n}","Url":"https://e.com/{n}","FeedName":"F","is_read":false,"is_bookmarked":false}}"#
        )
    }

    fn posts_body(range: std::ops::Range<u32>, has_more: bool) -> String {
        let posts: Vec<String> = range.map(post_json).collect();
        format!(r#"{{"posts":[{}],"hasMore":{}}}"#, posts.join(","), has_more)
    }

    async fn mount_user(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/users/alice"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(r#"{{"ID":"{USER}","Name":"alice"}}"#)),
            )
            .mount(server)
            .await;
    }

    async fn session_for(server: &MockServer, store: IdentityStore) -> Session {
        let client = GatorClient::new(&format!("{}/api", server.uri())).unwrap();
        Session::with_options(
            client,
            store,
            LoaderOptions::default(),
            PollerConfig {
                interval: Duration::from_millis(20),
                iterations: 3,
            },
        )
    }

    #[tokio::test]
    async fn test_select_user_persists_identity() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        let (store, dir) = temp_store();
        let mut session = session_for(&server, store.clone()).await;

        let identity = session.select_user("alice").await.unwrap().clone();
        assert_eq!(identity.name, "alice");
        assert_eq!(store.load().unwrap(), Some(identity.clone()));
        assert_eq!(session.status(), Some("Switched to alice"));

        // A fresh session picks the identity up again
        let mut restored = session_for(&server, store).await;
        assert_eq!(restored.restore().unwrap(), Some(&identity));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_unknown_user_leaves_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/nobody"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"error":"User not found"}"#))
            .mount(&server)
            .await;
        let (store, dir) = temp_store();
        let mut session = session_for(&server, store).await;

        let err = session.select_user("nobody").await.unwrap_err();
        assert_eq!(err.user_message(), "User not found");
        assert!(session.identity().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_open_posts_requires_identity() {
        let server = MockServer::start().await;
        let (store, _dir) = temp_store();
        let mut session = session_for(&server, store).await;

        assert!(matches!(
            session.open_posts(None),
            Err(ApiError::Precondition(_))
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_posts_load_for_selected_user() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("/api/posts/{USER}")))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(posts_body(0..10, true)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/posts/{USER}")))
            .and(query_param("offset", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_string(posts_body(10..13, false)))
            .mount(&server)
            .await;

        let (store, dir) = temp_store();
        let mut session = session_for(&server, store).await;
        session.select_user("alice").await.unwrap();
        session.open_posts(None).unwrap();
        session.posts.settle().await;
        assert!(session.posts.load_next_page());
        session.posts.settle().await;

        assert_eq!(session.posts.items().len(), 13);
        assert_eq!(session.posts.cursor(), 13);
        assert!(!session.posts.has_more());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("/api/posts/{USER}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(posts_body(0..2, false)))
            .mount(&server)
            .await;

        let (store, dir) = temp_store();
        let mut session = session_for(&server, store.clone()).await;
        session.select_user("alice").await.unwrap();
        session.open_posts(None).unwrap();
        session.posts.settle().await;
        assert_eq!(session.posts.items().len(), 2);

        session.logout().unwrap();
        assert!(session.identity().is_none());
        assert!(session.posts.items().is_empty());
        assert!(session.posts.identity().is_none());
        assert_eq!(store.load().unwrap(), None);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_refresh_reports_no_new_posts() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/api/feeds/fetch/{USER}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"count":0}"#))
            .mount(&server)
            .await;

        let (store, dir) = temp_store();
        let mut session = session_for(&server, store).await;
        session.select_user("alice").await.unwrap();

        let outcome = session.refresh_now().await;
        assert_eq!(outcome, Some(PollOutcome::NoNewContent));
        assert_eq!(session.status(), Some(NO_NEW_CONTENT_MESSAGE));
        assert_eq!(session.poller().state(), PollerState::Idle);
        assert_eq!(session.posts.phase(), LoadPhase::Idle);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_refresh_with_new_posts_reloads() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/api/feeds/fetch/{USER}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"newPosts":2,"feedsFetched":1,"totalFeeds":1}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/posts/{USER}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(posts_body(0..4, false)))
            .mount(&server)
            .await;

        let (store, dir) = temp_store();
        let mut session = session_for(&server, store).await;
        session.select_user("alice").await.unwrap();
        session.open_posts(None).unwrap();
        session.posts.settle().await;

        let outcome = session.refresh_now().await;
        assert!(matches!(outcome, Some(PollOutcome::NewContent(n)) if n >= 2));
        assert!(session.status().is_some_and(|s| s.starts_with("Found")));
        // Reset started a fresh initial load
        assert_eq!(session.posts.phase(), LoadPhase::InitialLoading);
        session.posts.settle().await;
        assert_eq!(session.posts.items().len(), 4);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_refresh_without_identity() {
        let server = MockServer::start().await;
        let (store, _dir) = temp_store();
        let mut session = session_for(&server, store).await;

        assert_eq!(session.refresh_now().await, None);
        assert_eq!(session.status(), Some("No user selected"));
    }

    fn post_uuid(n: u32) -> Uuid {
        Uuid::parse_str(&format!("00000000-0000-0000-0000-{n:012}")).unwrap()
    }

    fn bookmarks_body(range: std::ops::Range<u32>) -> String {
        let items: Vec<String> = range
            .map(|n| {
                format!(
                    r#"{{"ID":"{}","Title":"Saved {n}","Url":"https://e.com/{n}","FeedName":"F"}}"#,
                    post_uuid(n)
                )
            })
            .collect();
        format!(r#"{{"bookmarks":[{}],"hasMore":false}}"#, items.join(","))
    }

    async fn mount_empty_pull(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(format!("/api/feeds/fetch/{USER}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"count":0}"#))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_bookmarking_a_post_reloads_bookmarks() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        mount_empty_pull(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("/api/posts/{USER}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(posts_body(0..3, false)))
            .mount(&server)
            .await;
        // Empty until the bookmark exists
        Mock::given(method("GET"))
            .and(path(format!("/api/bookmarks/{USER}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(bookmarks_body(0..0)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/bookmarks/{USER}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(bookmarks_body(1..2)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/bookmarks"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let (store, dir) = temp_store();
        let mut session = session_for(&server, store).await;
        session.select_user("alice").await.unwrap();
        session.open_posts(None).unwrap();
        session.open_bookmarks().unwrap();
        session.posts.settle().await;
        session.bookmarks.settle().await;
        assert!(session.bookmarks.items().is_empty());

        assert!(session.toggle_post_flag(post_uuid(1), ItemFlag::Bookmarked));
        let update = session.next_update().await.unwrap();
        assert!(matches!(
            update,
            SessionUpdate::Posts(LoaderUpdate::FlagChanged {
                flag: ItemFlag::Bookmarked,
                value: true,
                ..
            })
        ));
        assert_eq!(session.status(), Some("Bookmark added"));
        assert!(session.posts.items()[1].is_bookmarked);

        assert_eq!(session.bookmarks.phase(), LoadPhase::InitialLoading);
        session.bookmarks.settle().await;
        let titles: Vec<&str> = session
            .bookmarks
            .items()
            .iter()
            .map(|b| b.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Saved 1"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_remove_bookmark_updates_status() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("/api/bookmarks/{USER}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(bookmarks_body(0..3)))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("/api/bookmarks/{USER}/{}", post_uuid(1))))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (store, dir) = temp_store();
        let mut session = session_for(&server, store).await;
        session.select_user("alice").await.unwrap();
        session.open_bookmarks().unwrap();
        session.bookmarks.settle().await;

        assert!(session.remove_bookmark(post_uuid(1)));
        let mut updates = Vec::new();
        for _ in 0..100 {
            updates = session.drain_updates();
            if !updates.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(matches!(
            updates.as_slice(),
            [SessionUpdate::Bookmarks(LoaderUpdate::ItemRemoved { present: true, .. })]
        ));
        assert_eq!(session.status(), Some("Bookmark removed"));
        assert_eq!(session.bookmarks.items().len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_stop_refresh_mid_run() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        mount_empty_pull(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("/api/posts/{USER}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(posts_body(0..2, false)))
            .mount(&server)
            .await;

        let (store, dir) = temp_store();
        let mut session = session_for(&server, store).await;
        session.select_user("alice").await.unwrap();
        session.open_posts(None).unwrap();
        session.posts.settle().await;

        assert!(session.start_refresh());
        assert_eq!(session.poller().state(), PollerState::Polling);
        assert_eq!(session.posts.phase(), LoadPhase::BackgroundRefreshing);

        session.stop_refresh();
        assert_eq!(session.poller().state(), PollerState::Idle);
        assert_eq!(session.posts.phase(), LoadPhase::Idle);

        // Well past the whole run: nothing else reaches the server
        tokio::time::sleep(Duration::from_millis(150)).await;
        let pulls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path().starts_with("/api/feeds/fetch"))
            .count();
        assert_eq!(pulls, 0);
        assert!(session
            .drain_updates()
            .iter()
            .all(|u| *u == SessionUpdate::Refresh(PollOutcome::Stale)));
        assert_eq!(session.poller().state(), PollerState::Idle);
        assert_eq!(session.posts.items().len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_status_expires_after_3_seconds() {
        let server = MockServer::start().await;
        let (store, _dir) = temp_store();
        let mut session = session_for(&server, store).await;

        tokio::time::pause();
        session.set_status("Test message");
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!session.clear_expired_status());
        assert!(session.status().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(session.clear_expired_status());
        assert!(session.status().is_none());
    }
}
