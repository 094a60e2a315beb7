//! Publishing documents as WordPress posts.
//!
//! [`WordPressStore`] holds the publish and bootstrap logic; the SQL lives
//! behind [`PostBackend`] so the logic runs the same against MySQL and
//! against the in-memory backend used in tests.

pub mod mysql;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::WordPressConfig;

/// Status given to every inserted post.
pub const POST_STATUS: &str = "publish";

/// Comment and ping status given to every inserted post.
pub const DISCUSSION_STATUS: &str = "closed";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("MySQL error: {0}")]
    Mysql(#[from] ::mysql::Error),

    #[error("database error: {0}")]
    Backend(String),

    #[error("invalid table prefix {0:?}: only ASCII letters, digits and '_' are allowed")]
    InvalidPrefix(String),
}

/// A post row about to be inserted. Dates are set by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub author_id: u64,
    pub title: String,
    pub content: Vec<u8>,
    pub status: String,
    pub comment_status: String,
    pub ping_status: String,
    pub slug: String,
    pub guid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A new post was inserted and committed.
    Published,
    /// A post with the same title already exists; nothing was written.
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    Existing,
    Created,
}

/// Statements the store needs from a database connection. Calls between
/// `begin` and `commit`/`rollback` belong to one transaction.
pub trait PostBackend {
    fn begin(&mut self) -> Result<(), StoreError>;

    /// Number of rows in `table` whose title equals `title` exactly.
    fn count_titles(&mut self, table: &str, title: &str) -> Result<u64, StoreError>;

    fn insert_post(&mut self, table: &str, post: &NewPost) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;

    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError>;

    /// Create `table` with the WordPress posts layout.
    fn create_posts_table(&mut self, table: &str) -> Result<(), StoreError>;
}

/// The WordPress side of the pipeline: one long-lived connection, reused
/// for every publish until [`WordPressStore::close`].
pub struct WordPressStore<B: PostBackend> {
    backend: B,
    table: String,
    site_url: String,
    author_id: u64,
}

/// Name of the posts table for a given prefix.
pub fn posts_table(prefix: &str) -> Result<String, StoreError> {
    if prefix.is_empty()
        || !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(StoreError::InvalidPrefix(prefix.to_string()));
    }
    Ok(format!("{prefix}posts"))
}

impl<B: PostBackend> WordPressStore<B> {
    pub fn new(backend: B, config: &WordPressConfig) -> Result<Self, StoreError> {
        Ok(Self {
            backend,
            table: posts_table(&config.table_prefix)?,
            site_url: config.site_url.trim_end_matches('/').to_string(),
            author_id: config.author_id,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The row inserted for a document titled `title`.
    pub fn new_post(&self, title: &str, content: &[u8]) -> NewPost {
        NewPost {
            author_id: self.author_id,
            title: title.to_string(),
            content: content.to_vec(),
            status: POST_STATUS.to_string(),
            comment_status: DISCUSSION_STATUS.to_string(),
            ping_status: DISCUSSION_STATUS.to_string(),
            slug: title.to_string(),
            guid: format!("{}/{title}/", self.site_url),
        }
    }

    /// Insert a post unless one with the same title exists. Any failure
    /// rolls the transaction back and is returned to the caller.
    pub fn publish(&mut self, title: &str, content: &[u8]) -> Result<PublishOutcome, StoreError> {
        match self.publish_in_transaction(title, content) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(rollback_err) = self.backend.rollback() {
                    warn!("Rollback after failed publish of {title:?} failed: {rollback_err}");
                }
                error!("Failed to publish {title:?}: {e}");
                Err(e)
            }
        }
    }

    fn publish_in_transaction(
        &mut self,
        title: &str,
        content: &[u8],
    ) -> Result<PublishOutcome, StoreError> {
        self.backend.begin()?;

        if self.backend.count_titles(&self.table, title)? > 0 {
            self.backend.rollback()?;
            info!("A post titled {title:?} already exists, not publishing again");
            return Ok(PublishOutcome::AlreadyExists);
        }

        let post = self.new_post(title, content);
        self.backend.insert_post(&self.table, &post)?;
        self.backend.commit()?;
        info!("Published post {title:?}");
        Ok(PublishOutcome::Published)
    }

    /// Create the posts table if it does not exist yet.
    pub fn ensure_schema(&mut self) -> Result<SchemaStatus, StoreError> {
        if self.backend.table_exists(&self.table)? {
            info!("Database check complete: table {} exists", self.table);
            return Ok(SchemaStatus::Existing);
        }

        info!("Database check complete: table {} is missing, creating it", self.table);
        self.backend.create_posts_table(&self.table)?;
        info!("Created table {}", self.table);
        Ok(SchemaStatus::Created)
    }

    /// Release the connection.
    pub fn close(self) {
        info!("Closing database connection");
        drop(self.backend);
    }
}
