use super::error::ApiError;
use super::types::{
    Bookmark, BookmarksEnvelope, CreateFeedBody, Feed, Follow, FollowBody, FreshContent, NameBody,
    Page, Post, PostsEnvelope, UpdateFeedBody, User, UserPostBody, UserSummary,
};
use crate::util::{validate_base_url, validate_feed_name, validate_feed_url};
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// Default API root used by the Gator backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5005/api";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Stateless client for the Gator REST API.
///
/// Cloning is cheap: the underlying `reqwest::Client` shares its connection pool.
/// Every inbound payload is normalized into the canonical records in
/// [`super::types`], whatever casing or nullable encoding the backend used.
#[derive(Clone, Debug)]
pub struct GatorClient {
    http: reqwest::Client,
    base: Url,
    timeout: Duration,
}

impl GatorClient {
    /// Create a client for the API rooted at `base_url` with the default timeout.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base = validate_base_url(base_url).map_err(|e| ApiError::InvalidInput(e.to_string()))?;

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, ApiError> {
        let url = self.endpoint(&["users"])?;
        let users: Option<Vec<UserSummary>> = self.get_json(url).await?;
        Ok(users.unwrap_or_default())
    }

    pub async fn get_user(&self, name: &str) -> Result<User, ApiError> {
        let name = require_text(name, "User name is required")?;
        let url = self.endpoint(&["users", name])?;
        self.get_json(url).await
    }

    pub async fn create_user(&self, name: &str) -> Result<User, ApiError> {
        let name = require_text(name, "User name is required")?;
        let url = self.endpoint(&["users"])?;
        self.send_json(Method::POST, url, &NameBody { name }).await
    }

    pub async fn update_user(&self, id: Uuid, name: &str) -> Result<User, ApiError> {
        let name = require_text(name, "User name is required")?;
        let url = self.endpoint(&["users", &id.to_string()])?;
        self.send_json(Method::PUT, url, &NameBody { name }).await
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<(), ApiError> {
        let url = self.endpoint(&["users", &id.to_string()])?;
        self.send_empty(Method::DELETE, url).await
    }

    // ========================================================================
    // Feeds
    // ========================================================================

    pub async fn list_feeds(&self) -> Result<Vec<Feed>, ApiError> {
        let url = self.endpoint(&["feeds"])?;
        let feeds: Option<Vec<Feed>> = self.get_json(url).await?;
        Ok(feeds.unwrap_or_default())
    }

    /// Register a new feed owned by `owner_id`.
    ///
    /// The URL is normalized (scheme added when missing) and validated locally
    /// before the request is sent.
    pub async fn create_feed(&self, name: &str, url: &str, owner_id: Uuid) -> Result<Feed, ApiError> {
        let name = validate_feed_name(name).map_err(|e| ApiError::InvalidInput(e.to_string()))?;
        let feed_url = validate_feed_url(url).map_err(|e| ApiError::InvalidInput(e.to_string()))?;
        let endpoint = self.endpoint(&["feeds"])?;
        let body = CreateFeedBody {
            name,
            url: feed_url.as_str(),
            user_id: owner_id,
        };
        self.send_json(Method::POST, endpoint, &body).await
    }

    pub async fn update_feed(&self, id: Uuid, name: &str, url: &str) -> Result<Feed, ApiError> {
        let name = validate_feed_name(name).map_err(|e| ApiError::InvalidInput(e.to_string()))?;
        let feed_url = validate_feed_url(url).map_err(|e| ApiError::InvalidInput(e.to_string()))?;
        let endpoint = self.endpoint(&["feeds", &id.to_string()])?;
        let body = UpdateFeedBody {
            name,
            url: feed_url.as_str(),
        };
        self.send_json(Method::PUT, endpoint, &body).await
    }

    pub async fn delete_feed(&self, id: Uuid) -> Result<(), ApiError> {
        let url = self.endpoint(&["feeds", &id.to_string()])?;
        self.send_empty(Method::DELETE, url).await
    }

    // ========================================================================
    // Follows
    // ========================================================================

    pub async fn list_follows(&self, user_id: Uuid) -> Result<Vec<Follow>, ApiError> {
        let url = self.endpoint(&["follows", &user_id.to_string()])?;
        let follows: Option<Vec<Follow>> = self.get_json(url).await?;
        Ok(follows.unwrap_or_default())
    }

    pub async fn follow(&self, user_id: Uuid, feed_url: &str) -> Result<Follow, ApiError> {
        let feed_url = require_text(feed_url, "Feed URL is required")?;
        let url = self.endpoint(&["follows"])?;
        self.send_json(Method::POST, url, &FollowBody { user_id, feed_url })
            .await
    }

    pub async fn unfollow(&self, user_id: Uuid, feed_url: &str) -> Result<(), ApiError> {
        let feed_url = require_text(feed_url, "Feed URL is required")?;
        let mut url = self.endpoint(&["follows", &user_id.to_string()])?;
        url.query_pairs_mut().append_pair("feedUrl", feed_url);
        self.send_empty(Method::DELETE, url).await
    }

    // ========================================================================
    // Posts
    // ========================================================================

    /// Fetch one page of the user's posts, optionally restricted to one feed.
    pub async fn list_posts(
        &self,
        user_id: Uuid,
        limit: u32,
        offset: u64,
        feed_id: Option<Uuid>,
    ) -> Result<Page<Post>, ApiError> {
        let mut url = self.endpoint(&["posts", &user_id.to_string()])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("limit", &limit.to_string())
                .append_pair("offset", &offset.to_string());
            if let Some(feed_id) = feed_id {
                query.append_pair("feed_id", &feed_id.to_string());
            }
        }

        let response: PageResponse<PostsEnvelope, Post> = self.get_json(url).await?;
        Ok(match response {
            PageResponse::Envelope(env) => into_page(env.posts, env.has_more, limit),
            PageResponse::List(items) => into_page(Some(items), None, limit),
        })
    }

    /// Ask the backend to re-poll every feed the user follows.
    pub async fn pull_fresh_content(&self, user_id: Uuid) -> Result<FreshContent, ApiError> {
        let url = self.endpoint(&["feeds", "fetch", &user_id.to_string()])?;
        let body = self.send(self.http.request(Method::POST, url)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Delete every post of every user.
    pub async fn delete_all_posts(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["admin", "posts"])?;
        self.send_empty(Method::DELETE, url).await
    }

    // ========================================================================
    // Bookmarks and Read Status
    // ========================================================================

    pub async fn list_bookmarks(
        &self,
        user_id: Uuid,
        limit: u32,
        offset: u64,
    ) -> Result<Page<Bookmark>, ApiError> {
        let mut url = self.endpoint(&["bookmarks", &user_id.to_string()])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());

        let response: PageResponse<BookmarksEnvelope, Bookmark> = self.get_json(url).await?;
        Ok(match response {
            PageResponse::Envelope(env) => into_page(env.bookmarks, env.has_more, limit),
            PageResponse::List(items) => into_page(Some(items), None, limit),
        })
    }

    pub async fn create_bookmark(&self, user_id: Uuid, post_id: Uuid) -> Result<(), ApiError> {
        let url = self.endpoint(&["bookmarks"])?;
        self.send_body(Method::POST, url, &UserPostBody { user_id, post_id })
            .await
    }

    pub async fn delete_bookmark(&self, user_id: Uuid, post_id: Uuid) -> Result<(), ApiError> {
        let url = self.endpoint(&["bookmarks", &user_id.to_string(), &post_id.to_string()])?;
        self.send_empty(Method::DELETE, url).await
    }

    pub async fn mark_read(&self, user_id: Uuid, post_id: Uuid) -> Result<(), ApiError> {
        let url = self.endpoint(&["reads"])?;
        self.send_body(Method::POST, url, &UserPostBody { user_id, post_id })
            .await
    }

    pub async fn mark_unread(&self, user_id: Uuid, post_id: Uuid) -> Result<(), ApiError> {
        let url = self.endpoint(&["reads", &user_id.to_string(), &post_id.to_string()])?;
        self.send_empty(Method::DELETE, url).await
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Build `<base>/<segments...>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidInput(format!("Base URL cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let body = self.send(self.http.request(Method::GET, url)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.http.request(method, url).header(CONTENT_TYPE, "application/json");
        let body = self.send(request.body(serde_json::to_vec(body)?)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_body<B: Serialize>(&self, method: Method, url: Url, body: &B) -> Result<(), ApiError> {
        let request = self.http.request(method, url).header(CONTENT_TYPE, "application/json");
        self.send(request.body(serde_json::to_vec(body)?)).await?;
        Ok(())
    }

    async fn send_empty(&self, method: Method, url: Url) -> Result<(), ApiError> {
        self.send(self.http.request(method, url)).await?;
        Ok(())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let request = request.header(ACCEPT, "application/json").build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(method = %method, url = %url, "Sending API request");

        // The deadline covers the body as well as the headers
        let exchange = async {
            let response = self.http.execute(request).await.map_err(ApiError::transport)?;
            let status = response.status();
            let body = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
            Ok::<_, ApiError>((status, body))
        };
        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ApiError::Timeout)??;

        if !status.is_success() {
            let err = ApiError::from_status(status.as_u16(), &body);
            tracing::warn!(method = %method, url = %url, status = status.as_u16(), error = %err, "API request failed");
            return Err(err);
        }

        Ok(body)
    }
}

/// Paged endpoints answer with an envelope; older backends return a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum PageResponse<E, T> {
    Envelope(E),
    List(Vec<T>),
}

/// Fold a decoded page into [`Page`]. Without an explicit `hasMore`, a full
/// page is taken to mean more may follow.
fn into_page<T>(items: Option<Vec<T>>, has_more: Option<bool>, limit: u32) -> Page<T> {
    let items = items.unwrap_or_default();
    let has_more = has_more.unwrap_or(items.len() == limit as usize);
    Page::new(items, has_more)
}

fn require_text<'a>(value: &'a str, message: &'static str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Precondition(message));
    }
    Ok(trimmed)
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, ApiError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ApiError::transport)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
