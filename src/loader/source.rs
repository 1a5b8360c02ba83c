//! Remote collections the loader can page through.

use crate::api::{ApiError, Bookmark, GatorClient, Item, ItemFlag, Page, Post};
use crate::identity::Identity;
use std::future::Future;
use uuid::Uuid;

/// A paginated remote collection scoped to one identity.
///
/// Implementations are thin adapters over [`GatorClient`]; tests provide
/// in-memory fakes.
pub trait PageSource: Send + Sync + 'static {
    type Item: Item + Clone + Send + Sync + 'static;

    /// Fetch up to `limit` items starting at `offset`.
    fn fetch_page(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u64,
    ) -> impl Future<Output = Result<Page<Self::Item>, ApiError>> + Send;

    /// Ask the backend to re-poll upstream feeds. Returns the number of new
    /// items it found.
    fn pull_fresh_content(
        &self,
        _identity: &Identity,
    ) -> impl Future<Output = Result<u64, ApiError>> + Send {
        std::future::ready(Ok(0))
    }

    /// Set `flag` on the remote item.
    fn set_flag(
        &self,
        identity: &Identity,
        item_id: Uuid,
        flag: ItemFlag,
        value: bool,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Delete the remote item from this collection.
    fn remove(
        &self,
        _identity: &Identity,
        _item_id: Uuid,
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        std::future::ready(Err(ApiError::Precondition(
            "Items cannot be removed from this list",
        )))
    }
}

/// Read and bookmark flags are shared by posts and bookmarks.
async fn set_post_flag(
    client: &GatorClient,
    identity: &Identity,
    post_id: Uuid,
    flag: ItemFlag,
    value: bool,
) -> Result<(), ApiError> {
    let user_id = identity.user_id;
    match (flag, value) {
        (ItemFlag::Read, true) => client.mark_read(user_id, post_id).await,
        (ItemFlag::Read, false) => client.mark_unread(user_id, post_id).await,
        (ItemFlag::Bookmarked, true) => client.create_bookmark(user_id, post_id).await,
        (ItemFlag::Bookmarked, false) => client.delete_bookmark(user_id, post_id).await,
    }
}

/// The user's post timeline, optionally restricted to one feed.
#[derive(Debug, Clone)]
pub struct PostsSource {
    client: GatorClient,
    feed_id: Option<Uuid>,
}

impl PostsSource {
    pub fn new(client: GatorClient) -> Self {
        Self {
            client,
            feed_id: None,
        }
    }

    pub fn for_feed(client: GatorClient, feed_id: Uuid) -> Self {
        Self {
            client,
            feed_id: Some(feed_id),
        }
    }

    pub fn feed_id(&self) -> Option<Uuid> {
        self.feed_id
    }
}

impl PageSource for PostsSource {
    type Item = Post;

    async fn fetch_page(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u64,
    ) -> Result<Page<Post>, ApiError> {
        self.client
            .list_posts(identity.user_id, limit, offset, self.feed_id)
            .await
    }

    async fn pull_fresh_content(&self, identity: &Identity) -> Result<u64, ApiError> {
        let fresh = self.client.pull_fresh_content(identity.user_id).await?;
        tracing::debug!(
            user_id = %identity.user_id,
            new_posts = fresh.new_item_count,
            feeds_fetched = ?fresh.feeds_fetched,
            "Pulled fresh content"
        );
        Ok(fresh.new_item_count)
    }

    async fn set_flag(
        &self,
        identity: &Identity,
        item_id: Uuid,
        flag: ItemFlag,
        value: bool,
    ) -> Result<(), ApiError> {
        set_post_flag(&self.client, identity, item_id, flag, value).await
    }
}

/// The user's bookmarks, newest first.
#[derive(Debug, Clone)]
pub struct BookmarksSource {
    client: GatorClient,
}

impl BookmarksSource {
    pub fn new(client: GatorClient) -> Self {
        Self { client }
    }
}

impl PageSource for BookmarksSource {
    type Item = Bookmark;

    async fn fetch_page(
        &self,
        identity: &Identity,
        limit: u32,
        offset: u64,
    ) -> Result<Page<Bookmark>, ApiError> {
        self.client
            .list_bookmarks(identity.user_id, limit, offset)
            .await
    }

    async fn set_flag(
        &self,
        identity: &Identity,
        item_id: Uuid,
        flag: ItemFlag,
        value: bool,
    ) -> Result<(), ApiError> {
        set_post_flag(&self.client, identity, item_id, flag, value).await
    }

    async fn remove(&self, identity: &Identity, item_id: Uuid) -> Result<(), ApiError> {
        self.client.delete_bookmark(identity.user_id, item_id).await
    }
}
