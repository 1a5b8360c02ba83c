use super::normalize::{lenient_bool, nullable_string, nullable_time};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Item Flags
// ============================================================================

/// Per-item boolean flags that change independently of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemFlag {
    Read,
    Bookmarked,
}

impl ItemFlag {
    pub fn label(self) -> &'static str {
        match self {
            ItemFlag::Read => "read",
            ItemFlag::Bookmarked => "bookmarked",
        }
    }
}

/// A record that can live in an incrementally loaded collection.
///
/// Identity is by [`Item::id`]: two values with the same id are the same
/// logical entity even if their payloads differ between fetches.
pub trait Item {
    fn id(&self) -> Uuid;
    fn flag(&self, flag: ItemFlag) -> bool;
    fn set_flag(&mut self, flag: ItemFlag, value: bool);
}

// ============================================================================
// Users
// ============================================================================

/// Entry of the user list. The backend returns bare names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct UserSummary {
    pub name: String,
}

impl From<String> for UserSummary {
    fn from(name: String) -> Self {
        Self { name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    #[serde(rename = "id", alias = "ID", alias = "Id")]
    pub id: Uuid,
    #[serde(rename = "name", alias = "Name")]
    pub name: String,
    #[serde(
        rename = "created_at",
        alias = "CreatedAt",
        default,
        deserialize_with = "nullable_time"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "updated_at",
        alias = "UpdatedAt",
        default,
        deserialize_with = "nullable_time"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Feeds and Follows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Feed {
    #[serde(rename = "id", alias = "ID", alias = "Id", default)]
    pub id: Option<Uuid>,
    #[serde(rename = "name", alias = "Name")]
    pub name: String,
    #[serde(rename = "url", alias = "Url", alias = "URL")]
    pub url: String,
    #[serde(rename = "user_id", alias = "UserID", alias = "UserId", default)]
    pub owner_id: Option<Uuid>,
    #[serde(
        rename = "username",
        alias = "Username",
        alias = "UserName",
        alias = "user_name",
        default,
        deserialize_with = "nullable_string"
    )]
    pub owner_name: Option<String>,
    #[serde(
        rename = "created_at",
        alias = "CreatedAt",
        default,
        deserialize_with = "nullable_time"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "last_fetched_at",
        alias = "LastFetchedAt",
        default,
        deserialize_with = "nullable_time"
    )]
    pub last_fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Follow {
    #[serde(rename = "id", alias = "ID", alias = "Id", default)]
    pub id: Option<Uuid>,
    #[serde(rename = "user_id", alias = "UserID", alias = "UserId", default)]
    pub user_id: Option<Uuid>,
    #[serde(rename = "feed_id", alias = "FeedID", alias = "FeedId", default)]
    pub feed_id: Option<Uuid>,
    #[serde(
        rename = "feed_name",
        alias = "FeedName",
        default,
        deserialize_with = "nullable_string"
    )]
    pub feed_name: Option<String>,
    #[serde(
        rename = "user_name",
        alias = "UserName",
        default,
        deserialize_with = "nullable_string"
    )]
    pub user_name: Option<String>,
}

/// Whether `follows` contains the feed at `feed_url`.
///
/// Follow records only carry the feed name, so the URL is resolved to a feed
/// through `feeds` first and matched by name (falling back to feed id when the
/// follow has one).
pub fn is_following(feed_url: &str, feeds: &[Feed], follows: &[Follow]) -> bool {
    let Some(feed) = feeds.iter().find(|f| f.url == feed_url) else {
        return false;
    };
    follows.iter().any(|follow| {
        let by_id = matches!((follow.feed_id, feed.id), (Some(a), Some(b)) if a == b);
        by_id || follow.feed_name.as_deref() == Some(feed.name.as_str())
    })
}

// ============================================================================
// Posts and Bookmarks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Post {
    #[serde(rename = "id", alias = "ID", alias = "Id")]
    pub id: Uuid,
    #[serde(rename = "title", alias = "Title", default)]
    pub title: String,
    #[serde(rename = "url", alias = "Url", alias = "URL", default)]
    pub url: String,
    #[serde(
        rename = "description",
        alias = "Description",
        default,
        deserialize_with = "nullable_string"
    )]
    pub description: Option<String>,
    #[serde(
        rename = "published_at",
        alias = "PublishedAt",
        default,
        deserialize_with = "nullable_time"
    )]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(rename = "feed_name", alias = "FeedName", default)]
    pub feed_name: String,
    #[serde(
        rename = "is_read",
        alias = "IsRead",
        default,
        deserialize_with = "lenient_bool"
    )]
    pub is_read: bool,
    #[serde(
        rename = "is_bookmarked",
        alias = "IsBookmarked",
        default,
        deserialize_with = "lenient_bool"
    )]
    pub is_bookmarked: bool,
}

impl Item for Post {
    fn id(&self) -> Uuid {
        self.id
    }

    fn flag(&self, flag: ItemFlag) -> bool {
        match flag {
            ItemFlag::Read => self.is_read,
            ItemFlag::Bookmarked => self.is_bookmarked,
        }
    }

    fn set_flag(&mut self, flag: ItemFlag, value: bool) {
        match flag {
            ItemFlag::Read => self.is_read = value,
            ItemFlag::Bookmarked => self.is_bookmarked = value,
        }
    }
}

/// A bookmarked post. `id` is the post id, which is also the key used to
/// delete the bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Bookmark {
    #[serde(rename = "id", alias = "ID", alias = "Id")]
    pub id: Uuid,
    #[serde(rename = "title", alias = "Title", default)]
    pub title: String,
    #[serde(rename = "url", alias = "Url", alias = "URL", default)]
    pub url: String,
    #[serde(
        rename = "description",
        alias = "Description",
        default,
        deserialize_with = "nullable_string"
    )]
    pub description: Option<String>,
    #[serde(
        rename = "published_at",
        alias = "PublishedAt",
        default,
        deserialize_with = "nullable_time"
    )]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(rename = "feed_name", alias = "FeedName", default)]
    pub feed_name: String,
    #[serde(
        rename = "bookmarked_at",
        alias = "BookmarkedAt",
        default,
        deserialize_with = "nullable_time"
    )]
    pub bookmarked_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "is_read",
        alias = "IsRead",
        default,
        deserialize_with = "lenient_bool"
    )]
    pub is_read: bool,
    #[serde(skip, default = "bookmarked")]
    pub is_bookmarked: bool,
}

fn bookmarked() -> bool {
    true
}

impl Item for Bookmark {
    fn id(&self) -> Uuid {
        self.id
    }

    fn flag(&self, flag: ItemFlag) -> bool {
        match flag {
            ItemFlag::Read => self.is_read,
            ItemFlag::Bookmarked => self.is_bookmarked,
        }
    }

    fn set_flag(&mut self, flag: ItemFlag, value: bool) {
        match flag {
            ItemFlag::Read => self.is_read = value,
            ItemFlag::Bookmarked => self.is_bookmarked = value,
        }
    }
}

// ============================================================================
// Pages
// ============================================================================

/// One fetch's worth of items plus the server's continuation flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self { items, has_more }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct PostsEnvelope {
    #[serde(default)]
    pub posts: Option<Vec<Post>>,
    #[serde(rename = "hasMore", alias = "has_more", default)]
    pub has_more: Option<bool>,
}

#[derive(Deserialize)]
pub(crate) struct BookmarksEnvelope {
    #[serde(default)]
    pub bookmarks: Option<Vec<Bookmark>>,
    #[serde(rename = "hasMore", alias = "has_more", default)]
    pub has_more: Option<bool>,
}

/// Result of asking the backend to re-poll upstream feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FreshContent {
    #[serde(rename = "newPosts", alias = "new_posts", alias = "count", default)]
    pub new_item_count: u64,
    #[serde(rename = "feedsFetched", alias = "feeds_fetched", default)]
    pub feeds_fetched: Option<u64>,
    #[serde(rename = "totalFeeds", alias = "total_feeds", default)]
    pub total_feeds: Option<u64>,
}

// ============================================================================
// Request Bodies
// ============================================================================

#[derive(Serialize)]
pub(crate) struct NameBody<'a> {
    pub name: &'a str,
}

#[derive(Serialize)]
pub(crate) struct CreateFeedBody<'a> {
    pub name: &'a str,
    pub url: &'a str,
    pub user_id: Uuid,
}

#[derive(Serialize)]
pub(crate) struct UpdateFeedBody<'a> {
    pub name: &'a str,
    pub url: &'a str,
}

#[derive(Serialize)]
pub(crate) struct FollowBody<'a> {
    pub user_id: Uuid,
    pub feed_url: &'a str,
}

#[derive(Serialize)]
pub(crate) struct UserPostBody {
    pub user_id: Uuid,
    pub post_id: Uuid,
}
