use crate::error::{Result, ScraperError};
use crate::record::{Image, Post};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE image (
    file_hash    VARCHAR(40) PRIMARY KEY,
    file_ext     TEXT NOT NULL,
    content_type TEXT NOT NULL,
    width        INTEGER NOT NULL,
    height       INTEGER NOT NULL,
    size         BIGINT NOT NULL
);
CREATE TABLE post (
    name            TEXT PRIMARY KEY,
    image_file_hash VARCHAR(40) NOT NULL REFERENCES image(file_hash) ON DELETE CASCADE,
    subreddit_name  VARCHAR(20) NOT NULL,
    submitted       INTEGER NOT NULL,
    enacted         BOOLEAN NOT NULL DEFAULT 0
);
CREATE INDEX ix_post_subreddit_name ON post (subreddit_name);
CREATE INDEX ix_post_enacted ON post (enacted);
";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        debug!("Opened database {}", path.display());
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn })
    }

    /// Drop existing tables if needed and create new ones.
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(&format!(
            "BEGIN;
             DROP TABLE IF EXISTS post;
             DROP TABLE IF EXISTS image;
             {SCHEMA}
             COMMIT;"
        ))?;
        info!("Created post and image tables");
        Ok(())
    }

    /// Run `f` inside one transaction, rolling back if it fails.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    /// Fail with a hint unless `initialize` has created the tables.
    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('post', 'image')",
            [],
            |row| row.get(0),
        )?;
        if tables < 2 {
            return Err(ScraperError::Config {
                message: "database is not initialized, run `reddit_scraper initialize` first"
                    .to_string(),
            });
        }
        Ok(())
    }

    pub fn get_post(&self, name: &str) -> Result<Option<Post>> {
        let post = self
            .conn
            .query_row(
                "SELECT name, image_file_hash, subreddit_name, submitted, enacted
                 FROM post WHERE name = ?1",
                params![name],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    /// Most recently submitted saved post for a subreddit.
    pub fn latest_post(&self, subreddit: &str) -> Result<Option<Post>> {
        let post = self
            .conn
            .query_row(
                "SELECT name, image_file_hash, subreddit_name, submitted, enacted
                 FROM post WHERE subreddit_name = ?1
                 ORDER BY submitted DESC, name DESC LIMIT 1",
                params![subreddit],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    pub fn post_count(&self, subreddit: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM post WHERE subreddit_name = ?1",
            params![subreddit],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn get_image(&self, file_hash: &str) -> Result<Option<Image>> {
        let image = self
            .conn
            .query_row(
                "SELECT file_hash, file_ext, content_type, width, height, size
                 FROM image WHERE file_hash = ?1",
                params![file_hash],
                |row| {
                    Ok(Image {
                        file_hash: row.get(0)?,
                        file_ext: row.get(1)?,
                        content_type: row.get(2)?,
                        width: row.get(3)?,
                        height: row.get(4)?,
                        size: row.get::<_, i64>(5)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(image)
    }

    pub fn insert_image(&self, image: &Image) -> Result<()> {
        self.conn.execute(
            "INSERT INTO image (file_hash, file_ext, content_type, width, height, size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                image.file_hash,
                image.file_ext,
                image.content_type,
                image.width,
                image.height,
                image.size as i64
            ],
        )?;
        Ok(())
    }

    /// Returns `false` when a post with the same name is already saved.
    pub fn insert_post(&self, post: &Post) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO post (name, image_file_hash, subreddit_name, submitted, enacted)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                post.name,
                post.image_file_hash,
                post.subreddit_name,
                post.submitted.timestamp(),
                post.enacted
            ],
        )?;
        Ok(inserted == 1)
    }
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let submitted: i64 = row.get(3)?;
    Ok(Post {
        name: row.get(0)?,
        image_file_hash: row.get(1)?,
        subreddit_name: row.get(2)?,
        submitted: DateTime::<Utc>::from_timestamp(submitted, 0).unwrap_or_default(),
        enacted: row.get(4)?,
    })
}
