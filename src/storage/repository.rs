// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{OptionalExtension, Row, params};
use tokio_rusqlite::Connection;

use crate::error::StoreError;
use crate::storage::model::{
    Author, Chapter, DownloadStatus, Enclosure, Entry, EpisodeAction, EpisodeActionKind,
    ErrorLogEntry, Feed, FeedAction, LocalEpisodeState, SubscriptionAction,
};
use crate::storage::schema::SCHEMA;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything the store knows about one feed, read in a single pass.
/// The reconciliation diff runs against this.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub feed: Feed,
    pub entries: Vec<Entry>,
    pub authors: Vec<Author>,
    pub enclosures: Vec<Enclosure>,
    pub chapters: Vec<Chapter>,
}

/// The full set of row changes one feed refresh produced.
/// Applied atomically by [`Repository::apply_feed_update`].
#[derive(Debug, Clone, Default)]
pub struct FeedChangeSet {
    pub feed_url: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub dirname: Option<String>,
    pub last_updated: i64,
    pub last_hash: String,
    pub clear_new: bool,
    pub insert_entries: Vec<Entry>,
    pub update_entries: Vec<Entry>,
    pub insert_authors: Vec<Author>,
    pub update_authors: Vec<Author>,
    /// (entry id, author name)
    pub delete_authors: Vec<(String, String)>,
    pub insert_enclosures: Vec<Enclosure>,
    /// Updates duration/size/title/type/url, keeps playback state
    pub update_enclosures: Vec<Enclosure>,
    /// Entry ids whose playback position and download state reset
    pub reset_enclosures: Vec<String>,
    pub delete_enclosures: Vec<String>,
    pub insert_chapters: Vec<Chapter>,
    pub update_chapters: Vec<Chapter>,
    /// (entry id, start)
    pub delete_chapters: Vec<(String, i64)>,
}

/// Async repository over the SQLite store
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(db_path)
                .await
                .map_err(|e| StoreError::OpenFailed {
                    path: PathBuf::from(db_path),
                    source: tokio_rusqlite::Error::Error(e),
                })?;
        Self::init(conn).await
    }

    /// In-memory store, used by tests
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    // Feed operations

    pub async fn insert_feed(
        &self,
        url: String,
        subscribed: i64,
        new: bool,
    ) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO Feeds (url, subscribed, new) VALUES (?1, ?2, ?3)",
                    params![url, subscribed, new],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn feed(&self, url: String) -> Result<Option<Feed>, StoreError> {
        let feed = self
            .conn
            .call(move |conn| {
                let feed = conn
                    .query_row(
                        "SELECT url, name, image, link, description, dirname, subscribed,
                                lastUpdated, notify, new, lastHash
                         FROM Feeds WHERE url = ?1",
                        params![url],
                        |row| feed_from_row(row),
                    )
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn all_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT url, name, image, link, description, dirname, subscribed,
                            lastUpdated, notify, new, lastHash
                     FROM Feeds ORDER BY name",
                )?;
                let feeds = stmt
                    .query_map([], |row| feed_from_row(row))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn subscribed_urls(&self) -> Result<Vec<String>, StoreError> {
        let urls = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT url FROM Feeds ORDER BY name")?;
                let urls = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(urls)
            })
            .await?;
        Ok(urls)
    }

    /// Remove a feed and everything hanging off it
    pub async fn delete_feed(&self, url: String) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM Entries WHERE feed = ?1", params![url])?;
                tx.execute("DELETE FROM Authors WHERE feed = ?1", params![url])?;
                tx.execute("DELETE FROM Enclosures WHERE feed = ?1", params![url])?;
                tx.execute("DELETE FROM Chapters WHERE feed = ?1", params![url])?;
                tx.execute("DELETE FROM Queue WHERE feed = ?1", params![url])?;
                tx.execute("DELETE FROM Feeds WHERE url = ?1", params![url])?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Rewrite a feed URL everywhere, used when the sync server asks us
    /// to use a different canonical URL
    pub async fn rename_feed_url(&self, old: String, new: String) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE Feeds SET url = ?1 WHERE url = ?2",
                    params![new, old],
                )?;
                for table in ["Entries", "Authors", "Enclosures", "Chapters", "Queue"] {
                    tx.execute(
                        &format!("UPDATE {table} SET feed = ?1 WHERE feed = ?2"),
                        params![new, old],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn all_dirnames(&self) -> Result<Vec<String>, StoreError> {
        let names = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT dirname FROM Feeds WHERE dirname != ''")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await?;
        Ok(names)
    }

    pub async fn feed_snapshot(&self, url: String) -> Result<Option<FeedSnapshot>, StoreError> {
        let snapshot = self
            .conn
            .call(move |conn| {
                let feed = conn
                    .query_row(
                        "SELECT url, name, image, link, description, dirname, subscribed,
                                lastUpdated, notify, new, lastHash
                         FROM Feeds WHERE url = ?1",
                        params![url],
                        |row| feed_from_row(row),
                    )
                    .optional()?;
                let Some(feed) = feed else {
                    return Ok(None);
                };

                let mut stmt = conn.prepare(
                    "SELECT feed, id, title, content, created, updated, link, read, new,
                            hasEnclosure, image
                     FROM Entries WHERE feed = ?1",
                )?;
                let entries = stmt
                    .query_map(params![url], |row| entry_from_row(row))?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut stmt = conn
                    .prepare("SELECT feed, id, name, uri, email FROM Authors WHERE feed = ?1")?;
                let authors = stmt
                    .query_map(params![url], |row| author_from_row(row))?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut stmt = conn.prepare(
                    "SELECT feed, id, duration, size, title, type, url, playposition, downloaded
                     FROM Enclosures WHERE feed = ?1",
                )?;
                let enclosures = stmt
                    .query_map(params![url], |row| enclosure_from_row(row))?
                    .collect::<Result<Vec<_>, _>>()?;

                let mut stmt = conn.prepare(
                    "SELECT feed, id, start, title, link, image FROM Chapters WHERE feed = ?1",
                )?;
                let chapters = stmt
                    .query_map(params![url], |row| chapter_from_row(row))?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(Some(FeedSnapshot {
                    feed,
                    entries,
                    authors,
                    enclosures,
                    chapters,
                }))
            })
            .await?;
        Ok(snapshot)
    }

    /// Apply one feed refresh atomically. A failure anywhere rolls the
    /// whole feed back.
    pub async fn apply_feed_update(&self, changes: FeedChangeSet) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let url = &changes.feed_url;

                if let Some(name) = &changes.name {
                    tx.execute(
                        "UPDATE Feeds SET name = ?1 WHERE url = ?2",
                        params![name, url],
                    )?;
                }
                if let Some(image) = &changes.image {
                    tx.execute(
                        "UPDATE Feeds SET image = ?1 WHERE url = ?2",
                        params![image, url],
                    )?;
                }
                if let Some(link) = &changes.link {
                    tx.execute(
                        "UPDATE Feeds SET link = ?1 WHERE url = ?2",
                        params![link, url],
                    )?;
                }
                if let Some(description) = &changes.description {
                    tx.execute(
                        "UPDATE Feeds SET description = ?1 WHERE url = ?2",
                        params![description, url],
                    )?;
                }
                if let Some(dirname) = &changes.dirname {
                    tx.execute(
                        "UPDATE Feeds SET dirname = ?1 WHERE url = ?2",
                        params![dirname, url],
                    )?;
                }

                for entry in &changes.insert_entries {
                    tx.execute(
                        "INSERT INTO Entries (feed, id, title, content, created, updated, link,
                                              read, new, hasEnclosure, image)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                        params![
                            entry.feed,
                            entry.id,
                            entry.title,
                            entry.content,
                            entry.created,
                            entry.updated,
                            entry.link,
                            entry.read,
                            entry.new,
                            entry.has_enclosure,
                            entry.image,
                        ],
                    )?;
                }
                for entry in &changes.update_entries {
                    tx.execute(
                        "UPDATE Entries SET title = ?1, content = ?2, created = ?3, updated = ?4,
                                            link = ?5, hasEnclosure = ?6, image = ?7
                         WHERE feed = ?8 AND id = ?9",
                        params![
                            entry.title,
                            entry.content,
                            entry.created,
                            entry.updated,
                            entry.link,
                            entry.has_enclosure,
                            entry.image,
                            entry.feed,
                            entry.id,
                        ],
                    )?;
                }

                for author in &changes.insert_authors {
                    tx.execute(
                        "INSERT INTO Authors (feed, id, name, uri, email)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![author.feed, author.entry_id, author.name, author.uri, author.email],
                    )?;
                }
                for author in &changes.update_authors {
                    tx.execute(
                        "UPDATE Authors SET uri = ?1, email = ?2
                         WHERE feed = ?3 AND id = ?4 AND name = ?5",
                        params![author.uri, author.email, author.feed, author.entry_id, author.name],
                    )?;
                }
                for (entry_id, name) in &changes.delete_authors {
                    tx.execute(
                        "DELETE FROM Authors WHERE feed = ?1 AND id = ?2 AND name = ?3",
                        params![url, entry_id, name],
                    )?;
                }

                for enclosure in &changes.insert_enclosures {
                    tx.execute(
                        "INSERT INTO Enclosures (feed, id, duration, size, title, type, url,
                                                 playposition, downloaded)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            enclosure.feed,
                            enclosure.entry_id,
                            enclosure.duration,
                            enclosure.size,
                            enclosure.title,
                            enclosure.mime_type,
                            enclosure.url,
                            enclosure.play_position,
                            enclosure.downloaded.to_db(),
                        ],
                    )?;
                }
                for enclosure in &changes.update_enclosures {
                    tx.execute(
                        "UPDATE Enclosures SET duration = ?1, size = ?2, title = ?3, type = ?4,
                                               url = ?5
                         WHERE feed = ?6 AND id = ?7",
                        params![
                            enclosure.duration,
                            enclosure.size,
                            enclosure.title,
                            enclosure.mime_type,
                            enclosure.url,
                            enclosure.feed,
                            enclosure.entry_id,
                        ],
                    )?;
                }
                for entry_id in &changes.reset_enclosures {
                    tx.execute(
                        "UPDATE Enclosures SET playposition = 0, downloaded = 0
                         WHERE feed = ?1 AND id = ?2",
                        params![url, entry_id],
                    )?;
                }
                for entry_id in &changes.delete_enclosures {
                    tx.execute(
                        "DELETE FROM Enclosures WHERE feed = ?1 AND id = ?2",
                        params![url, entry_id],
                    )?;
                }

                for chapter in &changes.insert_chapters {
                    tx.execute(
                        "INSERT INTO Chapters (feed, id, start, title, link, image)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            chapter.feed,
                            chapter.entry_id,
                            chapter.start,
                            chapter.title,
                            chapter.link,
                            chapter.image,
                        ],
                    )?;
                }
                for chapter in &changes.update_chapters {
                    tx.execute(
                        "UPDATE Chapters SET title = ?1, link = ?2, image = ?3
                         WHERE feed = ?4 AND id = ?5 AND start = ?6",
                        params![
                            chapter.title,
                            chapter.link,
                            chapter.image,
                            chapter.feed,
                            chapter.entry_id,
                            chapter.start,
                        ],
                    )?;
                }
                for (entry_id, start) in &changes.delete_chapters {
                    tx.execute(
                        "DELETE FROM Chapters WHERE feed = ?1 AND id = ?2 AND start = ?3",
                        params![url, entry_id, start],
                    )?;
                }

                tx.execute(
                    "UPDATE Feeds SET lastUpdated = ?1, lastHash = ?2 WHERE url = ?3",
                    params![changes.last_updated, changes.last_hash, url],
                )?;
                if changes.clear_new {
                    tx.execute("UPDATE Feeds SET new = 0 WHERE url = ?1", params![url])?;
                }

                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Entry and enclosure state

    pub async fn find_entry_by_id(&self, id: String) -> Result<Option<Entry>, StoreError> {
        let entry = self
            .conn
            .call(move |conn| {
                let entry = conn
                    .query_row(
                        "SELECT feed, id, title, content, created, updated, link, read, new,
                                hasEnclosure, image
                         FROM Entries WHERE id = ?1",
                        params![id],
                        |row| entry_from_row(row),
                    )
                    .optional()?;
                Ok(entry)
            })
            .await?;
        Ok(entry)
    }

    pub async fn find_entry_by_enclosure_url(
        &self,
        url: String,
    ) -> Result<Option<Entry>, StoreError> {
        let entry = self
            .conn
            .call(move |conn| {
                let entry = conn
                    .query_row(
                        "SELECT e.feed, e.id, e.title, e.content, e.created, e.updated, e.link,
                                e.read, e.new, e.hasEnclosure, e.image
                         FROM Entries e JOIN Enclosures c ON e.feed = c.feed AND e.id = c.id
                         WHERE c.url = ?1",
                        params![url],
                        |row| entry_from_row(row),
                    )
                    .optional()?;
                Ok(entry)
            })
            .await?;
        Ok(entry)
    }

    pub async fn enclosure(
        &self,
        feed: String,
        entry_id: String,
    ) -> Result<Option<Enclosure>, StoreError> {
        let enclosure = self
            .conn
            .call(move |conn| {
                let enclosure = conn
                    .query_row(
                        "SELECT feed, id, duration, size, title, type, url, playposition,
                                downloaded
                         FROM Enclosures WHERE feed = ?1 AND id = ?2",
                        params![feed, entry_id],
                        |row| enclosure_from_row(row),
                    )
                    .optional()?;
                Ok(enclosure)
            })
            .await?;
        Ok(enclosure)
    }

    /// Set the read flag of an entry. A read entry leaves the playback
    /// queue in the same transaction.
    pub async fn mark_entry_read(
        &self,
        feed: String,
        entry_id: String,
        read: bool,
    ) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE Entries SET read = ?1, new = 0 WHERE feed = ?2 AND id = ?3",
                    params![read, feed, entry_id],
                )?;
                if read {
                    tx.execute(
                        "DELETE FROM Queue WHERE feed = ?1 AND id = ?2",
                        params![feed, entry_id],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn mark_entry_unread(
        &self,
        feed: String,
        entry_id: String,
    ) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE Entries SET read = 0, new = 1 WHERE feed = ?1 AND id = ?2",
                    params![feed, entry_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set_play_position(
        &self,
        feed: String,
        entry_id: String,
        position: i64,
    ) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE Enclosures SET playposition = ?1 WHERE feed = ?2 AND id = ?3",
                    params![position, feed, entry_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Append an entry to the playback queue unless it is already queued
    pub async fn enqueue_entry(&self, feed: String, entry_id: String) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                let next: i64 = conn.query_row(
                    "SELECT COALESCE(MAX(listnr), -1) + 1 FROM Queue",
                    [],
                    |row| row.get(0),
                )?;
                conn.execute(
                    "INSERT OR IGNORE INTO Queue (listnr, feed, id, playing)
                     VALUES (?1, ?2, ?3, 0)",
                    params![next, feed, entry_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn queued_entry_ids(&self) -> Result<Vec<(String, String)>, StoreError> {
        let ids = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT feed, id FROM Queue ORDER BY listnr")?;
                let ids = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    /// Playback state of every enclosure, joined with its read flag.
    /// Feeds the push-all sync mode.
    pub async fn all_local_episode_states(&self) -> Result<Vec<LocalEpisodeState>, StoreError> {
        let states = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.feed, c.url, c.id, c.playposition, c.duration, e.read
                     FROM Enclosures c JOIN Entries e ON c.feed = e.feed AND c.id = e.id",
                )?;
                let states = stmt
                    .query_map([], |row| {
                        Ok(LocalEpisodeState {
                            feed_url: row.get(0)?,
                            enclosure_url: row.get(1)?,
                            entry_id: row.get(2)?,
                            position: row.get(3)?,
                            duration: row.get(4)?,
                            read: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(states)
            })
            .await?;
        Ok(states)
    }

    // Sync bookkeeping

    pub async fn sync_timestamp(&self, label: String) -> Result<i64, StoreError> {
        let ts = self
            .conn
            .call(move |conn| {
                let ts = conn
                    .query_row(
                        "SELECT timestamp FROM SyncTimestamps WHERE syncservice = ?1",
                        params![label],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(ts.unwrap_or(0))
            })
            .await?;
        Ok(ts)
    }

    pub async fn set_sync_timestamp(&self, label: String, timestamp: i64) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO SyncTimestamps (syncservice, timestamp) VALUES (?1, ?2)
                     ON CONFLICT(syncservice) DO UPDATE SET timestamp = excluded.timestamp",
                    params![label, timestamp],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn clear_sync_timestamps(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute("DELETE FROM SyncTimestamps", [])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn feed_actions(&self) -> Result<Vec<FeedAction>, StoreError> {
        let actions = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT url, action, timestamp FROM FeedActions")?;
                let actions = stmt
                    .query_map([], |row| {
                        let action: String = row.get(1)?;
                        Ok((row.get::<_, String>(0)?, action, row.get::<_, i64>(2)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(actions)
            })
            .await?;
        Ok(actions
            .into_iter()
            .filter_map(|(url, action, timestamp)| {
                SubscriptionAction::parse(&action).map(|action| FeedAction {
                    url,
                    action,
                    timestamp,
                })
            })
            .collect())
    }

    pub async fn add_feed_action(&self, action: FeedAction) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO FeedActions (url, action, timestamp) VALUES (?1, ?2, ?3)",
                    params![action.url, action.action.as_str(), action.timestamp],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete exactly the given rows; anything logged since stays queued
    pub async fn remove_feed_actions(&self, actions: Vec<FeedAction>) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for action in &actions {
                    tx.execute(
                        "DELETE FROM FeedActions
                         WHERE url = ?1 AND action = ?2 AND timestamp = ?3",
                        params![action.url, action.action.as_str(), action.timestamp],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn episode_actions(&self) -> Result<Vec<EpisodeAction>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT podcast, url, id, action, started, position, total, timestamp
                     FROM EpisodeActions",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                            row.get::<_, i64>(7)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(
                |(podcast, url, id, action, started, position, total, timestamp)| {
                    EpisodeActionKind::parse(&action).map(|action| EpisodeAction {
                        podcast,
                        url,
                        id,
                        action,
                        started,
                        position,
                        total,
                        timestamp,
                    })
                },
            )
            .collect())
    }

    pub async fn add_episode_actions(
        &self,
        actions: Vec<EpisodeAction>,
    ) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for action in &actions {
                    tx.execute(
                        "INSERT INTO EpisodeActions
                             (podcast, url, id, action, started, position, total, timestamp)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            action.podcast,
                            action.url,
                            action.id,
                            action.action.as_str(),
                            action.started,
                            action.position,
                            action.total,
                            action.timestamp,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete exactly the given rows; anything logged since stays queued
    pub async fn remove_episode_actions(
        &self,
        actions: Vec<EpisodeAction>,
    ) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for action in &actions {
                    tx.execute(
                        "DELETE FROM EpisodeActions
                         WHERE podcast = ?1 AND url = ?2 AND id = ?3 AND action = ?4
                           AND started = ?5 AND position = ?6 AND total = ?7 AND timestamp = ?8",
                        params![
                            action.podcast,
                            action.url,
                            action.id,
                            action.action.as_str(),
                            action.started,
                            action.position,
                            action.total,
                            action.timestamp,
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Error log

    pub async fn log_error(&self, entry: ErrorLogEntry) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO ErrorLog (timestamp, context, url, id, code, message)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        entry.timestamp,
                        entry.context,
                        entry.url,
                        entry.id,
                        entry.code,
                        entry.message,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn recent_errors(&self, limit: usize) -> Result<Vec<ErrorLogEntry>, StoreError> {
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, context, url, id, code, message
                     FROM ErrorLog ORDER BY timestamp DESC LIMIT ?1",
                )?;
                let entries = stmt
                    .query_map(params![limit as i64], |row| {
                        Ok(ErrorLogEntry {
                            timestamp: row.get(0)?,
                            context: row.get(1)?,
                            url: row.get(2)?,
                            id: row.get(3)?,
                            code: row.get(4)?,
                            message: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }
}

fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
    Ok(Feed {
        url: row.get(0)?,
        name: row.get(1)?,
        image: row.get(2)?,
        link: row.get(3)?,
        description: row.get(4)?,
        dirname: row.get(5)?,
        subscribed: row.get(6)?,
        last_updated: row.get(7)?,
        notify: row.get(8)?,
        new: row.get(9)?,
        last_hash: row.get(10)?,
    })
}

fn entry_from_row(row: &Row) -> rusqlite::Result<Entry> {
    Ok(Entry {
        feed: row.get(0)?,
        id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        created: row.get(4)?,
        updated: row.get(5)?,
        link: row.get(6)?,
        read: row.get(7)?,
        new: row.get(8)?,
        has_enclosure: row.get(9)?,
        image: row.get(10)?,
    })
}

fn author_from_row(row: &Row) -> rusqlite::Result<Author> {
    Ok(Author {
        feed: row.get(0)?,
        entry_id: row.get(1)?,
        name: row.get(2)?,
        uri: row.get(3)?,
        email: row.get(4)?,
    })
}

fn enclosure_from_row(row: &Row) -> rusqlite::Result<Enclosure> {
    Ok(Enclosure {
        feed: row.get(0)?,
        entry_id: row.get(1)?,
        duration: row.get(2)?,
        size: row.get(3)?,
        title: row.get(4)?,
        mime_type: row.get(5)?,
        url: row.get(6)?,
        play_position: row.get(7)?,
        downloaded: DownloadStatus::from_db(row.get(8)?),
    })
}

fn chapter_from_row(row: &Row) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        feed: row.get(0)?,
        entry_id: row.get(1)?,
        start: row.get(2)?,
        title: row.get(3)?,
        link: row.get(4)?,
        image: row.get(5)?,
    })
}
