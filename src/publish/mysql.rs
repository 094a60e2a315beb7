use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder};
use tracing::{debug, info};

use super::{NewPost, PostBackend, StoreError};
use crate::config::WordPressConfig;

/// Columns of a WordPress posts table, in declaration order, after the
/// `ID` primary key.
pub const POST_COLUMNS: [&str; 22] = [
    "post_author",
    "post_date",
    "post_date_gmt",
    "post_content",
    "post_title",
    "post_excerpt",
    "post_status",
    "comment_status",
    "ping_status",
    "post_password",
    "post_name",
    "to_ping",
    "pinged",
    "post_modified",
    "post_modified_gmt",
    "post_content_filtered",
    "post_parent",
    "guid",
    "menu_order",
    "post_type",
    "post_mime_type",
    "comment_count",
];

/// DDL for a posts table named `table`, matching the layout WordPress
/// itself creates.
pub fn posts_table_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE {table} (\
         ID BIGINT(20) UNSIGNED NOT NULL AUTO_INCREMENT, \
         post_author BIGINT(20) UNSIGNED NOT NULL DEFAULT 0, \
         post_date DATETIME NOT NULL DEFAULT '0000-00-00 00:00:00', \
         post_date_gmt DATETIME NOT NULL DEFAULT '0000-00-00 00:00:00', \
         post_content LONGTEXT NOT NULL, \
         post_title TEXT NOT NULL, \
         post_excerpt TEXT NOT NULL, \
         post_status VARCHAR(20) NOT NULL DEFAULT 'publish', \
         comment_status VARCHAR(20) NOT NULL DEFAULT 'closed', \
         ping_status VARCHAR(20) NOT NULL DEFAULT 'closed', \
         post_password VARCHAR(255) NOT NULL DEFAULT '', \
         post_name VARCHAR(200) NOT NULL DEFAULT '', \
         to_ping TEXT NOT NULL, \
         pinged TEXT NOT NULL, \
         post_modified DATETIME NOT NULL DEFAULT '0000-00-00 00:00:00', \
         post_modified_gmt DATETIME NOT NULL DEFAULT '0000-00-00 00:00:00', \
         post_content_filtered LONGTEXT NOT NULL, \
         post_parent BIGINT(20) UNSIGNED NOT NULL DEFAULT 0, \
         guid VARCHAR(255) NOT NULL DEFAULT '', \
         menu_order INT(11) NOT NULL DEFAULT 0, \
         post_type VARCHAR(20) NOT NULL DEFAULT 'post', \
         post_mime_type VARCHAR(100) NOT NULL DEFAULT '', \
         comment_count BIGINT(20) NOT NULL DEFAULT 0, \
         PRIMARY KEY (ID))"
    )
}

/// Parameterized insert for a posts table. Placeholders, in order: author,
/// content, title, status, comment status, ping status, slug, guid.
pub fn insert_post_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} ({}) VALUES \
         (?, NOW(), NOW(), ?, ?, '', ?, ?, ?, '', ?, '', '', NOW(), NOW(), '', 0, ?, 0, 'post', '', 0)",
        POST_COLUMNS.join(", ")
    )
}

/// Counts rows whose title equals the bound value byte for byte. WordPress
/// declares `post_title` with a case-insensitive, space-padding collation,
/// so a plain `=` would match `Q3` and `q3 ` against `q3`.
pub fn count_titles_sql(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {table} WHERE post_title = CAST(? AS BINARY)")
}

/// Session SQL modes that reject the zero-date defaults of the posts table.
pub const INCOMPATIBLE_SQL_MODES: [&str; 6] = [
    "NO_ZERO_DATE",
    "NO_ZERO_IN_DATE",
    "ONLY_FULL_GROUP_BY",
    "STRICT_TRANS_TABLES",
    "STRICT_ALL_TABLES",
    "TRADITIONAL",
];

/// `mode` with the incompatible entries removed.
pub fn compatible_sql_mode(mode: &str) -> String {
    mode.split(',')
        .map(str::trim)
        .filter(|m| {
            let upper = m.to_ascii_uppercase();
            !m.is_empty() && !INCOMPATIBLE_SQL_MODES.contains(&upper.as_str())
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// `LIKE` pattern matching exactly `table`: `_` is a wildcard otherwise.
pub fn like_exact(table: &str) -> String {
    table.replace('_', "\\_")
}

/// A single MySQL connection used for every statement.
pub struct MysqlBackend {
    conn: Conn,
}

impl MysqlBackend {
    pub fn connect(config: &WordPressConfig) -> Result<Self, StoreError> {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(config.host.as_str()))
            .tcp_port(config.port)
            .user(Some(config.user.as_str()))
            .pass(Some(config.password.as_str()))
            .db_name(Some(config.database.as_str()));
        let conn = Conn::new(opts)?;
        info!(
            "Connected to MySQL database {} at {}:{}",
            config.database, config.host, config.port
        );
        let mut backend = Self { conn };
        backend.relax_sql_mode()?;
        Ok(backend)
    }

    /// Drop the session SQL modes under which the posts table DDL fails.
    fn relax_sql_mode(&mut self) -> Result<(), StoreError> {
        let current: Option<String> = self.conn.query_first("SELECT @@SESSION.sql_mode")?;
        let current = current.unwrap_or_default();
        let relaxed = compatible_sql_mode(&current);
        if relaxed != current {
            debug!("Session sql_mode {current:?} -> {relaxed:?}");
            self.conn.exec_drop("SET SESSION sql_mode = ?", (relaxed,))?;
        }
        Ok(())
    }
}

impl PostBackend for MysqlBackend {
    fn begin(&mut self) -> Result<(), StoreError> {
        self.conn.query_drop("START TRANSACTION")?;
        Ok(())
    }

    fn count_titles(&mut self, table: &str, title: &str) -> Result<u64, StoreError> {
        let count: Option<u64> = self
            .conn
            .exec_first(count_titles_sql(table), (title.to_string(),))?;
        Ok(count.unwrap_or(0))
    }

    fn insert_post(&mut self, table: &str, post: &NewPost) -> Result<(), StoreError> {
        self.conn.exec_drop(
            insert_post_sql(table),
            (
                post.author_id,
                post.content.clone(),
                post.title.clone(),
                post.status.clone(),
                post.comment_status.clone(),
                post.ping_status.clone(),
                post.slug.clone(),
                post.guid.clone(),
            ),
        )?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.conn.query_drop("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.conn.query_drop("ROLLBACK")?;
        Ok(())
    }

    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        let found: Option<String> = self
            .conn
            .query_first(format!("SHOW TABLES LIKE '{}'", like_exact(table)))?;
        Ok(found.is_some())
    }

    fn create_posts_table(&mut self, table: &str) -> Result<(), StoreError> {
        self.conn.query_drop(posts_table_ddl(table))?;
        Ok(())
    }
}
