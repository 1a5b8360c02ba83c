use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gator::api::{is_following, ApiError, Bookmark, GatorClient, Post};
use gator::app::{Session, SessionUpdate};
use gator::config::Config;
use gator::identity::IdentityStore;
use gator::loader::{CollectionLoader, PageSource};
use gator::poller::PollOutcome;
use gator::util::{
    format_timestamp, normalize_feed_url, strip_control_chars, summarize, truncate_to_width,
    validate_base_url,
};
use std::path::PathBuf;
use uuid::Uuid;

/// Maximum title width in listings (terminal columns)
const TITLE_WIDTH: usize = 80;

/// Get the config directory path (~/.config/gator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("gator"))
}

#[derive(Parser, Debug)]
#[command(name = "gator", about = "Terminal client for the Gator feed aggregator")]
struct Args {
    /// API base URL (overrides GATOR_API_URL and the config file)
    #[arg(long, value_name = "URL", global = true)]
    api_url: Option<String>,

    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage users
    Users {
        #[command(subcommand)]
        action: UsersCommand,
    },
    /// Show the active user
    Whoami,
    /// Forget the active user
    Logout,
    /// Manage feeds
    Feeds {
        #[command(subcommand)]
        action: FeedsCommand,
    },
    /// Manage the active user's follows
    Follows {
        #[command(subcommand)]
        action: FollowsCommand,
    },
    /// List posts, newest first
    Posts {
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
        /// Only show posts from this feed
        #[arg(long, value_name = "FEED_ID")]
        feed: Option<Uuid>,
    },
    /// List bookmarked posts
    Bookmarks {
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Bookmark a post
    Bookmark { post_id: Uuid },
    /// Remove a bookmark
    Unbookmark { post_id: Uuid },
    /// Mark a post as read
    Read { post_id: Uuid },
    /// Mark a post as unread
    Unread { post_id: Uuid },
    /// Pull fresh content for a few seconds and show new posts
    Refresh,
    /// Administrative operations
    Admin {
        #[command(subcommand)]
        action: AdminCommand,
    },
}

#[derive(Subcommand, Debug)]
enum UsersCommand {
    /// List all users
    List,
    /// Create a user and switch to it
    Create { name: String },
    /// Switch to an existing user
    Select { name: String },
    /// Rename the active user
    Rename { new_name: String },
    /// Delete the active user
    Delete,
}

#[derive(Subcommand, Debug)]
enum FeedsCommand {
    /// List all feeds
    List,
    /// Add a feed owned by the active user
    Add { name: String, url: String },
    /// Change a feed's name and URL
    Update { id: Uuid, name: String, url: String },
    /// Delete a feed
    Delete { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum FollowsCommand {
    /// List followed feeds
    List,
    /// Follow a feed by URL
    Follow { url: String },
    /// Unfollow a feed by URL
    Unfollow { url: String },
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
    /// Delete every post of every user
    DeletePosts {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Turn an API error into its one-line user message.
fn api<T>(result: Result<T, ApiError>) -> Result<T> {
    result.map_err(|e| anyhow::anyhow!(e.user_message()))
}

async fn run(args: Args) -> Result<()> {
    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    // Identity file lives here: user-only access
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?
        .with_env_overrides(args.api_url.clone());

    let base_url = validate_base_url(&config.api_base_url)
        .with_context(|| format!("Invalid API base URL '{}'", config.api_base_url))?;
    let client = api(GatorClient::with_timeout(
        base_url.as_str(),
        config.request_timeout(),
    ))?;

    let store = IdentityStore::new(&config_dir);
    let mut session = Session::new(client, store, &config);
    if let Err(e) = session.restore() {
        tracing::warn!(error = %e, "Failed to load saved identity");
    }

    match args.command {
        Command::Users { action } => users(&mut session, action).await,
        Command::Whoami => {
            match session.identity() {
                Some(identity) => println!("{} ({})", identity.name, identity.user_id),
                None => println!("No user selected"),
            }
            Ok(())
        }
        Command::Logout => {
            session.logout().context("Failed to clear saved identity")?;
            println!("Logged out");
            Ok(())
        }
        Command::Feeds { action } => feeds(&session, action).await,
        Command::Follows { action } => follows(&session, action).await,
        Command::Posts { pages, feed } => {
            api(session.open_posts(feed))?;
            page_through(&mut session.posts, pages, print_post).await
        }
        Command::Bookmarks { pages } => {
            api(session.open_bookmarks())?;
            page_through(&mut session.bookmarks, pages, print_bookmark).await
        }
        Command::Bookmark { post_id } => {
            let user_id = api(session.require_identity())?.user_id;
            api(session.client().create_bookmark(user_id, post_id).await)?;
            println!("Bookmark added");
            Ok(())
        }
        Command::Unbookmark { post_id } => {
            let user_id = api(session.require_identity())?.user_id;
            api(session.client().delete_bookmark(user_id, post_id).await)?;
            println!("Bookmark removed");
            Ok(())
        }
        Command::Read { post_id } => {
            let user_id = api(session.require_identity())?.user_id;
            api(session.client().mark_read(user_id, post_id).await)?;
            println!("Marked as read");
            Ok(())
        }
        Command::Unread { post_id } => {
            let user_id = api(session.require_identity())?.user_id;
            api(session.client().mark_unread(user_id, post_id).await)?;
            println!("Marked as unread");
            Ok(())
        }
        Command::Refresh => refresh(&mut session).await,
        Command::Admin {
            action: AdminCommand::DeletePosts { yes },
        } => {
            if !yes {
                anyhow::bail!("Refusing to delete all posts without --yes");
            }
            api(session.client().delete_all_posts().await)?;
            println!("All posts deleted");
            Ok(())
        }
    }
}

async fn users(session: &mut Session, action: UsersCommand) -> Result<()> {
    match action {
        UsersCommand::List => {
            let users = api(session.client().list_users().await)?;
            if users.is_empty() {
                println!("No users yet. Create one with `gator users create <NAME>`.");
            }
            let current = session.identity().map(|i| i.name.clone());
            for user in users {
                let marker = if current.as_deref() == Some(user.name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{} {}", marker, strip_control_chars(&user.name));
            }
        }
        UsersCommand::Create { name } => {
            let identity = session
                .create_user(&name)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Created user {} ({})", identity.name, identity.user_id);
        }
        UsersCommand::Select { name } => {
            let identity = session
                .select_user(&name)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Switched to {} ({})", identity.name, identity.user_id);
        }
        UsersCommand::Rename { new_name } => {
            let identity = session
                .rename_user(&new_name)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Renamed to {}", identity.name);
        }
        UsersCommand::Delete => {
            session
                .delete_user()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("User deleted");
        }
    }
    Ok(())
}

async fn feeds(session: &Session, action: FeedsCommand) -> Result<()> {
    let client = session.client();
    match action {
        FeedsCommand::List => {
            let feeds = api(client.list_feeds().await)?;
            let follows = match session.identity() {
                Some(identity) => api(client.list_follows(identity.user_id).await)?,
                None => Vec::new(),
            };
            if feeds.is_empty() {
                println!("No feeds yet. Add one with `gator feeds add <NAME> <URL>`.");
            }
            for feed in &feeds {
                let marker = if is_following(&feed.url, &feeds, &follows) {
                    "*"
                } else {
                    " "
                };
                let id = feed.id.map(|id| id.to_string()).unwrap_or_default();
                println!(
                    "{} {}  {}  {}",
                    marker,
                    strip_control_chars(&feed.name),
                    strip_control_chars(&feed.url),
                    id
                );
                if let Some(owner) = &feed.owner_name {
                    println!("    added by {}", strip_control_chars(owner));
                }
            }
        }
        FeedsCommand::Add { name, url } => {
            let user_id = api(session.require_identity())?.user_id;
            let feed = api(client.create_feed(&name, &url, user_id).await)?;
            println!("Added feed {} ({})", feed.name, feed.url);
        }
        FeedsCommand::Update { id, name, url } => {
            let feed = api(client.update_feed(id, &name, &url).await)?;
            println!("Updated feed {} ({})", feed.name, feed.url);
        }
        FeedsCommand::Delete { id } => {
            api(client.delete_feed(id).await)?;
            println!("Feed deleted");
        }
    }
    Ok(())
}

async fn follows(session: &Session, action: FollowsCommand) -> Result<()> {
    let client = session.client();
    let user_id = api(session.require_identity())?.user_id;
    match action {
        FollowsCommand::List => {
            let follows = api(client.list_follows(user_id).await)?;
            if follows.is_empty() {
                println!("Not following any feeds");
            }
            for follow in follows {
                println!(
                    "{}",
                    strip_control_chars(follow.feed_name.as_deref().unwrap_or("(unnamed feed)"))
                );
            }
        }
        FollowsCommand::Follow { url } => {
            let url = normalize_feed_url(&url);
            let follow = api(client.follow(user_id, &url).await)?;
            println!(
                "Now following {}",
                follow.feed_name.as_deref().unwrap_or(url.as_str())
            );
        }
        FollowsCommand::Unfollow { url } => {
            let url = normalize_feed_url(&url);
            api(client.unfollow(user_id, &url).await)?;
            println!("Unfollowed {}", url);
        }
    }
    Ok(())
}

/// Load and print up to `pages` pages from an already reset loader.
async fn page_through<S, F>(loader: &mut CollectionLoader<S>, pages: u32, print: F) -> Result<()>
where
    S: PageSource,
    F: Fn(&S::Item),
{
    let mut printed = 0;
    for page in 0..pages.max(1) {
        if page > 0 && !loader.load_next_page() {
            break;
        }
        loader.settle().await;
        if let Some(error) = loader.error() {
            anyhow::bail!("{}", error);
        }
        for item in &loader.items()[printed..] {
            print(item);
        }
        printed = loader.items().len();
    }

    if printed == 0 {
        println!("Nothing here yet");
    } else if loader.has_more() {
        println!("-- more available (use --pages {}) --", pages + 1);
    }
    Ok(())
}

fn flag_marks(is_read: bool, is_bookmarked: bool) -> String {
    format!(
        "{}{}",
        if is_read { " " } else { "•" },
        if is_bookmarked { "★" } else { " " }
    )
}

fn print_post(post: &Post) {
    println!(
        "{} {}",
        flag_marks(post.is_read, post.is_bookmarked),
        truncate_to_width(&strip_control_chars(&post.title), TITLE_WIDTH)
    );
    println!(
        "    {} | {} | {}",
        strip_control_chars(&post.feed_name),
        format_timestamp(post.published_at.as_ref()),
        post.id
    );
    println!("    {}", strip_control_chars(&post.url));
    if let Some(description) = post.description.as_deref() {
        let summary = summarize(description);
        if !summary.is_empty() {
            println!("    {}", summary);
        }
    }
}

fn print_bookmark(bookmark: &Bookmark) {
    println!(
        "{} {}",
        flag_marks(bookmark.is_read, true),
        truncate_to_width(&strip_control_chars(&bookmark.title), TITLE_WIDTH)
    );
    println!(
        "    {} | saved {} | {}",
        strip_control_chars(&bookmark.feed_name),
        format_timestamp(bookmark.bookmarked_at.as_ref()),
        bookmark.id
    );
    println!("    {}", strip_control_chars(&bookmark.url));
}

async fn refresh(session: &mut Session) -> Result<()> {
    if !session.start_refresh() {
        anyhow::bail!(
            "{}",
            session.status().unwrap_or("Refresh could not be started")
        );
    }
    println!("Checking for new posts...");

    let outcome = loop {
        match session.next_update().await {
            Some(SessionUpdate::Refresh(PollOutcome::Progress {
                iteration,
                new_items_so_far,
            })) => {
                tracing::info!(iteration, new_items_so_far, "Refresh progress");
            }
            Some(SessionUpdate::Refresh(outcome)) if outcome.is_final() => break outcome,
            Some(_) => {}
            None => anyhow::bail!("Refresh ended unexpectedly"),
        }
    };

    if let Some(status) = session.status() {
        println!("{}", status);
    }
    match outcome {
        PollOutcome::NewContent(_) => {
            // The session already reset the post listing
            session.posts.settle().await;
            if let Some(error) = session.posts.error() {
                anyhow::bail!("{}", error);
            }
            for post in session.posts.items() {
                print_post(post);
            }
            Ok(())
        }
        PollOutcome::Failed(message) => anyhow::bail!("{}", message),
        _ => Ok(()),
    }
}
