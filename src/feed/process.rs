// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::error::FeedError;
use crate::feed::dirname::{generate_feed_dirname, sanitize_dirname};
use crate::feed::fetch::{content_hash, fetch_feed_bytes};
use crate::feed::parse::{EntryData, FeedData, parse_feed};
use crate::http::HttpClient;
use crate::storage::{
    Author, Chapter, DownloadStatus, Enclosure, Entry, FeedChangeSet, FeedSnapshot, Repository,
};

/// Behavior knobs for feed processing
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Entries of a freshly subscribed feed start unread
    pub mark_unread_on_new_feed: bool,
    /// Where enclosure files live, one subdirectory per feed
    pub enclosure_dir: PathBuf,
}

/// What a single feed refresh did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Feed bytes hashed identical to the previous run
    Unchanged,
    /// Feed was reconciled; carries (entry id, title) of inserted entries
    Updated { new_entries: Vec<(String, String)> },
}

/// A deferred filesystem fixup for an enclosure whose metadata drifted
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileOp {
    Rename { from: PathBuf, to: PathBuf },
    Delete(PathBuf),
}

/// Fetch one feed and reconcile it into the store.
///
/// Unchanged content (same SHA-256 as the stored hash) short-circuits
/// before parsing, unless the feed still awaits its first processing.
/// All row changes for the feed commit in a single transaction.
pub async fn refresh_feed<C: HttpClient + ?Sized>(
    client: &C,
    repo: &Repository,
    url: &str,
    options: &ProcessOptions,
) -> Result<RefreshOutcome, FeedError> {
    let snapshot = repo
        .feed_snapshot(url.to_string())
        .await
        .map_err(|e| FeedError::Store {
            url: url.to_string(),
            source: e,
        })?
        .ok_or_else(|| FeedError::UnknownFeed {
            url: url.to_string(),
        })?;

    let bytes = fetch_feed_bytes(client, url).await?;
    let hash = content_hash(&bytes);
    if hash == snapshot.feed.last_hash && !snapshot.feed.new {
        debug!(url, "feed content unchanged, skipping");
        return Ok(RefreshOutcome::Unchanged);
    }

    let data = parse_feed(&bytes, url)?;

    // The download directory follows the display name: regenerate it
    // when the name changed, when it was never set, or on the first
    // processing of a fresh subscription
    let needs_dirname = snapshot.feed.dirname.is_empty()
        || snapshot.feed.new
        || data.name != snapshot.feed.name;
    let dirname = if needs_dirname && sanitize_dirname(&data.name) != snapshot.feed.dirname {
        let mut taken: HashSet<String> = repo
            .all_dirnames()
            .await
            .map_err(|e| FeedError::Store {
                url: url.to_string(),
                source: e,
            })?
            .into_iter()
            .collect();
        taken.remove(&snapshot.feed.dirname);
        let generated = generate_feed_dirname(&data.name, &taken, &options.enclosure_dir);
        (generated != snapshot.feed.dirname).then_some(generated)
    } else {
        None
    };

    // Relocate already-downloaded files before the rows commit, so a
    // failed move leaves the store pointing at the old directory
    if let Some(new_dirname) = &dirname {
        if !snapshot.feed.dirname.is_empty() {
            let from = options.enclosure_dir.join(&snapshot.feed.dirname);
            let to = options.enclosure_dir.join(new_dirname);
            if from.exists() {
                debug!(?from, ?to, "renaming feed download directory");
                std::fs::rename(&from, &to).map_err(|source| FeedError::StorageMove {
                    from,
                    to,
                    source,
                })?;
            }
        }
    }

    let diff = diff_feed(
        &snapshot,
        &data,
        dirname,
        hash,
        Utc::now().timestamp(),
        options.mark_unread_on_new_feed,
        &options.enclosure_dir,
    );

    let new_entries = diff.new_entries;
    repo.apply_feed_update(diff.changes)
        .await
        .map_err(|e| FeedError::Store {
            url: url.to_string(),
            source: e,
        })?;

    // Filesystem fixups only after the rows committed
    for op in diff.file_ops {
        match op {
            FileOp::Rename { from, to } => {
                if from.exists() {
                    if let Err(e) = std::fs::rename(&from, &to) {
                        debug!(?from, ?to, error = %e, "enclosure rename failed");
                    }
                }
            }
            FileOp::Delete(path) => {
                if path.exists() {
                    if let Err(e) = std::fs::remove_file(&path) {
                        debug!(?path, error = %e, "stale enclosure delete failed");
                    }
                }
            }
        }
    }

    Ok(RefreshOutcome::Updated { new_entries })
}

struct DiffOutput {
    changes: FeedChangeSet,
    file_ops: Vec<FileOp>,
    new_entries: Vec<(String, String)>,
}

/// Pure field-by-field diff of a parsed feed against the stored snapshot
fn diff_feed(
    snapshot: &FeedSnapshot,
    data: &FeedData,
    dirname: Option<String>,
    hash: String,
    now: i64,
    mark_unread_on_new_feed: bool,
    enclosure_dir: &Path,
) -> DiffOutput {
    let feed_url = &snapshot.feed.url;
    let is_new_feed = snapshot.feed.new;
    let effective_dirname = dirname
        .clone()
        .unwrap_or_else(|| snapshot.feed.dirname.clone());

    let mut changes = FeedChangeSet {
        feed_url: feed_url.clone(),
        dirname,
        last_updated: now,
        last_hash: hash,
        clear_new: true,
        ..Default::default()
    };
    let mut file_ops = Vec::new();
    let mut new_entries = Vec::new();

    if data.name != snapshot.feed.name {
        changes.name = Some(data.name.clone());
    }
    if data.image != snapshot.feed.image {
        changes.image = Some(data.image.clone());
    }
    if data.link != snapshot.feed.link {
        changes.link = Some(data.link.clone());
    }
    if data.description != snapshot.feed.description {
        changes.description = Some(data.description.clone());
    }

    let existing_entries: HashMap<&str, &Entry> = snapshot
        .entries
        .iter()
        .map(|e| (e.id.as_str(), e))
        .collect();
    let existing_enclosures: HashMap<&str, &Enclosure> = snapshot
        .enclosures
        .iter()
        .map(|e| (e.entry_id.as_str(), e))
        .collect();

    // Feed-level authors live under the empty entry id
    diff_authors(&mut changes, snapshot, feed_url, "", &data.authors);

    for entry in &data.entries {
        let has_enclosure = !entry.enclosures.is_empty();

        match existing_entries.get(entry.id.as_str()) {
            None => {
                // A brand-new feed starts quiet; only later additions count
                // as "new" and notify
                let read = is_new_feed && !mark_unread_on_new_feed;
                let new = !is_new_feed;
                if new {
                    new_entries.push((entry.id.clone(), entry.title.clone()));
                }
                changes.insert_entries.push(Entry {
                    feed: feed_url.clone(),
                    id: entry.id.clone(),
                    title: entry.title.clone(),
                    content: entry.content.clone(),
                    created: entry.created,
                    updated: entry.updated,
                    link: entry.link.clone(),
                    read,
                    new,
                    has_enclosure,
                    image: entry.image.clone(),
                });
            }
            Some(existing) => {
                let changed = existing.title != entry.title
                    || existing.content != entry.content
                    || existing.created != entry.created
                    || existing.updated != entry.updated
                    || existing.link != entry.link
                    || existing.has_enclosure != has_enclosure
                    || existing.image != entry.image;
                if changed {
                    changes.update_entries.push(Entry {
                        feed: feed_url.clone(),
                        id: entry.id.clone(),
                        title: entry.title.clone(),
                        content: entry.content.clone(),
                        created: entry.created,
                        updated: entry.updated,
                        link: entry.link.clone(),
                        read: existing.read,
                        new: existing.new,
                        has_enclosure,
                        image: entry.image.clone(),
                    });
                }
            }
        }

        diff_authors(&mut changes, snapshot, feed_url, &entry.id, &entry.authors);
        diff_chapters(&mut changes, snapshot, feed_url, entry);
        diff_enclosure(
            &mut changes,
            &mut file_ops,
            existing_enclosures.get(entry.id.as_str()).copied(),
            feed_url,
            entry,
            &effective_dirname,
            enclosure_dir,
        );
    }

    DiffOutput {
        changes,
        file_ops,
        new_entries,
    }
}

fn diff_authors(
    changes: &mut FeedChangeSet,
    snapshot: &FeedSnapshot,
    feed_url: &str,
    entry_id: &str,
    parsed: &[crate::feed::parse::AuthorData],
) {
    let existing: HashMap<&str, &Author> = snapshot
        .authors
        .iter()
        .filter(|a| a.entry_id == entry_id)
        .map(|a| (a.name.as_str(), a))
        .collect();

    let mut seen = HashSet::new();
    for author in parsed {
        if author.name.is_empty() || !seen.insert(author.name.as_str()) {
            continue;
        }
        match existing.get(author.name.as_str()) {
            None => changes.insert_authors.push(Author {
                feed: feed_url.to_string(),
                entry_id: entry_id.to_string(),
                name: author.name.clone(),
                uri: author.uri.clone(),
                email: author.email.clone(),
            }),
            Some(current) => {
                if current.uri != author.uri || current.email != author.email {
                    changes.update_authors.push(Author {
                        feed: feed_url.to_string(),
                        entry_id: entry_id.to_string(),
                        name: author.name.clone(),
                        uri: author.uri.clone(),
                        email: author.email.clone(),
                    });
                }
            }
        }
    }

    for name in existing.keys() {
        if !seen.contains(name) {
            changes
                .delete_authors
                .push((entry_id.to_string(), name.to_string()));
        }
    }
}

fn diff_chapters(
    changes: &mut FeedChangeSet,
    snapshot: &FeedSnapshot,
    feed_url: &str,
    entry: &EntryData,
) {
    let existing: HashMap<i64, &Chapter> = snapshot
        .chapters
        .iter()
        .filter(|c| c.entry_id == entry.id)
        .map(|c| (c.start, c))
        .collect();

    let mut seen = HashSet::new();
    for chapter in &entry.chapters {
        if !seen.insert(chapter.start) {
            continue;
        }
        match existing.get(&chapter.start) {
            None => changes.insert_chapters.push(Chapter {
                feed: feed_url.to_string(),
                entry_id: entry.id.clone(),
                start: chapter.start,
                title: chapter.title.clone(),
                link: chapter.link.clone(),
                image: chapter.image.clone(),
            }),
            Some(current) => {
                if current.title != chapter.title
                    || current.link != chapter.link
                    || current.image != chapter.image
                {
                    changes.update_chapters.push(Chapter {
                        feed: feed_url.to_string(),
                        entry_id: entry.id.clone(),
                        start: chapter.start,
                        title: chapter.title.clone(),
                        link: chapter.link.clone(),
                        image: chapter.image.clone(),
                    });
                }
            }
        }
    }

    for start in existing.keys() {
        if !seen.contains(start) {
            changes.delete_chapters.push((entry.id.clone(), *start));
        }
    }
}

fn diff_enclosure(
    changes: &mut FeedChangeSet,
    file_ops: &mut Vec<FileOp>,
    existing: Option<&Enclosure>,
    feed_url: &str,
    entry: &EntryData,
    dirname: &str,
    enclosure_dir: &Path,
) {
    // Only the first enclosure of an entry is tracked
    let parsed = entry.enclosures.first();

    match (existing, parsed) {
        (None, None) => {}
        (None, Some(parsed)) => changes.insert_enclosures.push(Enclosure {
            feed: feed_url.to_string(),
            entry_id: entry.id.clone(),
            duration: parsed.duration,
            size: parsed.size,
            title: parsed.title.clone(),
            mime_type: parsed.mime_type.clone(),
            url: parsed.url.clone(),
            play_position: 0,
            downloaded: DownloadStatus::NotDownloaded,
        }),
        (Some(existing), None) => {
            changes.delete_enclosures.push(entry.id.clone());
            file_ops.push(FileOp::Delete(enclosure_file_path(
                enclosure_dir,
                dirname,
                &existing.title,
                &existing.url,
            )));
        }
        (Some(current), Some(parsed)) => {
            let changed = current.duration != parsed.duration
                || current.size != parsed.size
                || current.title != parsed.title
                || current.mime_type != parsed.mime_type
                || current.url != parsed.url;
            if !changed {
                return;
            }

            if current.url != parsed.url {
                // The file on disk no longer matches anything the feed
                // references; drop it and start over
                changes.reset_enclosures.push(entry.id.clone());
                file_ops.push(FileOp::Delete(enclosure_file_path(
                    enclosure_dir,
                    dirname,
                    &current.title,
                    &current.url,
                )));
            } else if current.title != parsed.title {
                file_ops.push(FileOp::Rename {
                    from: enclosure_file_path(enclosure_dir, dirname, &current.title, &current.url),
                    to: enclosure_file_path(enclosure_dir, dirname, &parsed.title, &parsed.url),
                });
            }

            changes.update_enclosures.push(Enclosure {
                feed: feed_url.to_string(),
                entry_id: entry.id.clone(),
                duration: parsed.duration,
                size: parsed.size,
                title: parsed.title.clone(),
                mime_type: parsed.mime_type.clone(),
                url: parsed.url.clone(),
                play_position: current.play_position,
                downloaded: current.downloaded,
            });
        }
    }
}

/// Where an enclosure file lives on disk
fn enclosure_file_path(enclosure_dir: &Path, dirname: &str, title: &str, url: &str) -> PathBuf {
    let stem = sanitize_dirname(title);
    let extension = url
        .rsplit('/')
        .next()
        .and_then(|segment| segment.split('?').next())
        .and_then(|filename| filename.rsplit_once('.').map(|(_, ext)| ext))
        .filter(|ext| !ext.is_empty() && ext.len() <= 5);

    let filename = match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    };
    enclosure_dir.join(dirname).join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::parse::{AuthorData, ChapterData, EnclosureData};
    use crate::storage::Feed;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct MockHttpClient {
        responses: Mutex<Vec<Bytes>>,
    }

    impl MockHttpClient {
        fn new(bodies: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(
                    bodies
                        .into_iter()
                        .rev()
                        .map(|body| Bytes::copy_from_slice(body.as_bytes()))
                        .collect(),
                ),
            }
        }
    }

    impl MockHttpClient {
        fn next_body(&self) -> Bytes {
            let mut responses = self.responses.lock().unwrap();
            responses.pop().unwrap_or_default()
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get(
            &self,
            _url: &str,
            _auth: Option<&crate::http::BasicAuth>,
        ) -> Result<crate::http::HttpResponse, reqwest::Error> {
            Ok(crate::http::HttpResponse {
                status: 200,
                body: self.next_body(),
            })
        }

        async fn post_json(
            &self,
            _url: &str,
            _body: &serde_json::Value,
            _auth: Option<&crate::http::BasicAuth>,
        ) -> Result<crate::http::HttpResponse, reqwest::Error> {
            Ok(crate::http::HttpResponse {
                status: 200,
                body: self.next_body(),
            })
        }
    }

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Tech News</title>
    <description>Weekly tech news</description>
    <link>https://example.com</link>
    <item>
      <title>Episode 1</title>
      <guid>ep-1</guid>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep1.mp3" length="1000" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    fn make_snapshot(url: &str, new: bool) -> FeedSnapshot {
        FeedSnapshot {
            feed: Feed {
                url: url.to_string(),
                name: String::new(),
                image: String::new(),
                link: String::new(),
                description: String::new(),
                dirname: "Tech News".to_string(),
                subscribed: 0,
                last_updated: 0,
                notify: false,
                new,
                last_hash: String::new(),
            },
            entries: Vec::new(),
            authors: Vec::new(),
            enclosures: Vec::new(),
            chapters: Vec::new(),
        }
    }

    fn make_entry_data(id: &str, title: &str) -> EntryData {
        EntryData {
            id: id.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn options(dir: &Path) -> ProcessOptions {
        ProcessOptions {
            mark_unread_on_new_feed: false,
            enclosure_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn refresh_inserts_entries_and_stores_hash() {
        let dir = tempdir().unwrap();
        let repo = Repository::open_in_memory().await.unwrap();
        let url = "https://example.com/feed.xml";
        repo.insert_feed(url.to_string(), 100, true).await.unwrap();

        let client = MockHttpClient::new(vec![SAMPLE_FEED]);
        let outcome = refresh_feed(&client, &repo, url, &options(dir.path()))
            .await
            .unwrap();

        // First processing of a new feed inserts quietly
        assert_eq!(
            outcome,
            RefreshOutcome::Updated {
                new_entries: vec![]
            }
        );

        let snapshot = repo.feed_snapshot(url.to_string()).await.unwrap().unwrap();
        assert_eq!(snapshot.feed.name, "Tech News");
        assert_eq!(snapshot.feed.last_hash, content_hash(SAMPLE_FEED.as_bytes()));
        assert!(!snapshot.feed.new);
        assert_eq!(snapshot.entries.len(), 1);
        assert!(snapshot.entries[0].read);
        assert!(!snapshot.entries[0].new);
        assert_eq!(snapshot.enclosures.len(), 1);
        assert_eq!(snapshot.enclosures[0].url, "https://example.com/ep1.mp3");
    }

    #[tokio::test]
    async fn refresh_skips_unchanged_content() {
        let dir = tempdir().unwrap();
        let repo = Repository::open_in_memory().await.unwrap();
        let url = "https://example.com/feed.xml";
        repo.insert_feed(url.to_string(), 100, true).await.unwrap();

        let client = MockHttpClient::new(vec![SAMPLE_FEED, SAMPLE_FEED]);
        let opts = options(dir.path());
        refresh_feed(&client, &repo, url, &opts).await.unwrap();
        let outcome = refresh_feed(&client, &repo, url, &opts).await.unwrap();

        assert_eq!(outcome, RefreshOutcome::Unchanged);
    }

    #[tokio::test]
    async fn refresh_flags_entries_added_later() {
        let dir = tempdir().unwrap();
        let repo = Repository::open_in_memory().await.unwrap();
        let url = "https://example.com/feed.xml";
        repo.insert_feed(url.to_string(), 100, true).await.unwrap();

        let updated_feed = SAMPLE_FEED.replace(
            "</channel>",
            r#"<item>
      <title>Episode 2</title>
      <guid>ep-2</guid>
      <enclosure url="https://example.com/ep2.mp3" length="1000" type="audio/mpeg"/>
    </item>
  </channel>"#,
        );

        let client = MockHttpClient::new(vec![SAMPLE_FEED, &updated_feed]);
        let opts = options(dir.path());
        refresh_feed(&client, &repo, url, &opts).await.unwrap();
        let outcome = refresh_feed(&client, &repo, url, &opts).await.unwrap();

        assert_eq!(
            outcome,
            RefreshOutcome::Updated {
                new_entries: vec![("ep-2".to_string(), "Episode 2".to_string())]
            }
        );

        let entry = repo
            .find_entry_by_id("ep-2".to_string())
            .await
            .unwrap()
            .unwrap();
        assert!(entry.new);
        assert!(!entry.read);
    }

    #[tokio::test]
    async fn renamed_feed_moves_its_download_directory() {
        let dir = tempdir().unwrap();
        let repo = Repository::open_in_memory().await.unwrap();
        let url = "https://example.com/feed.xml";
        repo.insert_feed(url.to_string(), 100, true).await.unwrap();

        let renamed_feed = SAMPLE_FEED.replace("Tech News", "Fresh News");
        let client = MockHttpClient::new(vec![SAMPLE_FEED, &renamed_feed]);
        let opts = options(dir.path());
        refresh_feed(&client, &repo, url, &opts).await.unwrap();

        // Simulate a downloaded episode under the old directory
        let old_dir = dir.path().join("Tech News");
        std::fs::create_dir_all(&old_dir).unwrap();
        std::fs::write(old_dir.join("Episode 1.mp3"), b"audio").unwrap();

        refresh_feed(&client, &repo, url, &opts).await.unwrap();

        let snapshot = repo.feed_snapshot(url.to_string()).await.unwrap().unwrap();
        assert_eq!(snapshot.feed.dirname, "Fresh News");
        assert!(!old_dir.exists());
        assert!(dir.path().join("Fresh News/Episode 1.mp3").exists());
    }

    #[tokio::test]
    async fn unchanged_name_keeps_the_existing_dirname() {
        let dir = tempdir().unwrap();
        let repo = Repository::open_in_memory().await.unwrap();
        let url = "https://example.com/feed.xml";
        repo.insert_feed(url.to_string(), 100, true).await.unwrap();

        let more_content = SAMPLE_FEED.replace("Weekly tech news", "Weekly tech news!");
        let client = MockHttpClient::new(vec![SAMPLE_FEED, &more_content]);
        let opts = options(dir.path());
        refresh_feed(&client, &repo, url, &opts).await.unwrap();

        // The directory existing on disk must not force a " (1)" suffix
        std::fs::create_dir_all(dir.path().join("Tech News")).unwrap();
        refresh_feed(&client, &repo, url, &opts).await.unwrap();

        let snapshot = repo.feed_snapshot(url.to_string()).await.unwrap().unwrap();
        assert_eq!(snapshot.feed.dirname, "Tech News");
    }

    #[tokio::test]
    async fn refresh_on_unknown_feed_is_an_error() {
        let dir = tempdir().unwrap();
        let repo = Repository::open_in_memory().await.unwrap();
        let client = MockHttpClient::new(vec![SAMPLE_FEED]);

        let result = refresh_feed(&client, &repo, "https://nowhere.invalid/feed.xml", &options(dir.path())).await;
        assert!(matches!(result, Err(FeedError::UnknownFeed { .. })));
    }

    // Pure diff behavior

    #[test]
    fn diff_updates_only_changed_feed_fields() {
        let dir = tempdir().unwrap();
        let mut snapshot = make_snapshot("https://example.com/f", false);
        snapshot.feed.name = "Old Name".to_string();
        snapshot.feed.link = "https://example.com".to_string();

        let data = FeedData {
            url: snapshot.feed.url.clone(),
            name: "New Name".to_string(),
            link: "https://example.com".to_string(),
            ..Default::default()
        };

        let diff = diff_feed(&snapshot, &data, None, "h".into(), 1, false, dir.path());
        assert_eq!(diff.changes.name, Some("New Name".to_string()));
        assert!(diff.changes.link.is_none());
        assert!(diff.changes.description.is_none());
    }

    #[test]
    fn diff_entry_update_preserves_read_state() {
        let dir = tempdir().unwrap();
        let mut snapshot = make_snapshot("https://example.com/f", false);
        snapshot.entries.push(Entry {
            feed: snapshot.feed.url.clone(),
            id: "ep-1".to_string(),
            title: "Old Title".to_string(),
            content: String::new(),
            created: 10,
            updated: 10,
            link: String::new(),
            read: true,
            new: false,
            has_enclosure: false,
            image: String::new(),
        });

        let mut data = FeedData {
            url: snapshot.feed.url.clone(),
            ..Default::default()
        };
        let mut entry = make_entry_data("ep-1", "New Title");
        entry.created = 10;
        entry.updated = 10;
        data.entries.push(entry);

        let diff = diff_feed(&snapshot, &data, None, "h".into(), 1, false, dir.path());
        assert!(diff.changes.insert_entries.is_empty());
        assert_eq!(diff.changes.update_entries.len(), 1);
        assert!(diff.changes.update_entries[0].read);
        assert!(diff.new_entries.is_empty());
    }

    #[test]
    fn diff_identical_entry_produces_no_update() {
        let dir = tempdir().unwrap();
        let mut snapshot = make_snapshot("https://example.com/f", false);
        snapshot.entries.push(Entry {
            feed: snapshot.feed.url.clone(),
            id: "ep-1".to_string(),
            title: "Title".to_string(),
            content: String::new(),
            created: 0,
            updated: 0,
            link: String::new(),
            read: false,
            new: false,
            has_enclosure: false,
            image: String::new(),
        });

        let mut data = FeedData {
            url: snapshot.feed.url.clone(),
            ..Default::default()
        };
        data.entries.push(make_entry_data("ep-1", "Title"));

        let diff = diff_feed(&snapshot, &data, None, "h".into(), 1, false, dir.path());
        assert!(diff.changes.update_entries.is_empty());
    }

    #[test]
    fn diff_authors_insert_update_delete() {
        let dir = tempdir().unwrap();
        let mut snapshot = make_snapshot("https://example.com/f", false);
        snapshot.entries.push(Entry {
            feed: snapshot.feed.url.clone(),
            id: "ep-1".to_string(),
            title: "T".to_string(),
            content: String::new(),
            created: 0,
            updated: 0,
            link: String::new(),
            read: false,
            new: false,
            has_enclosure: false,
            image: String::new(),
        });
        snapshot.authors.push(Author {
            feed: snapshot.feed.url.clone(),
            entry_id: "ep-1".to_string(),
            name: "Alice".to_string(),
            uri: String::new(),
            email: "old@example.com".to_string(),
        });
        snapshot.authors.push(Author {
            feed: snapshot.feed.url.clone(),
            entry_id: "ep-1".to_string(),
            name: "Bob".to_string(),
            uri: String::new(),
            email: String::new(),
        });

        let mut data = FeedData {
            url: snapshot.feed.url.clone(),
            ..Default::default()
        };
        let mut entry = make_entry_data("ep-1", "T");
        entry.authors = vec![
            AuthorData {
                name: "Alice".to_string(),
                uri: String::new(),
                email: "new@example.com".to_string(),
            },
            AuthorData {
                name: "Carol".to_string(),
                uri: String::new(),
                email: String::new(),
            },
        ];
        data.entries.push(entry);

        let diff = diff_feed(&snapshot, &data, None, "h".into(), 1, false, dir.path());
        assert_eq!(diff.changes.insert_authors.len(), 1);
        assert_eq!(diff.changes.insert_authors[0].name, "Carol");
        assert_eq!(diff.changes.update_authors.len(), 1);
        assert_eq!(diff.changes.update_authors[0].email, "new@example.com");
        assert_eq!(
            diff.changes.delete_authors,
            vec![("ep-1".to_string(), "Bob".to_string())]
        );
    }

    #[test]
    fn diff_chapters_keyed_by_start() {
        let dir = tempdir().unwrap();
        let mut snapshot = make_snapshot("https://example.com/f", false);
        snapshot.entries.push(Entry {
            feed: snapshot.feed.url.clone(),
            id: "ep-1".to_string(),
            title: "T".to_string(),
            content: String::new(),
            created: 0,
            updated: 0,
            link: String::new(),
            read: false,
            new: false,
            has_enclosure: false,
            image: String::new(),
        });
        snapshot.chapters.push(Chapter {
            feed: snapshot.feed.url.clone(),
            entry_id: "ep-1".to_string(),
            start: 0,
            title: "Intro".to_string(),
            link: String::new(),
            image: String::new(),
        });
        snapshot.chapters.push(Chapter {
            feed: snapshot.feed.url.clone(),
            entry_id: "ep-1".to_string(),
            start: 300,
            title: "Dropped".to_string(),
            link: String::new(),
            image: String::new(),
        });

        let mut data = FeedData {
            url: snapshot.feed.url.clone(),
            ..Default::default()
        };
        let mut entry = make_entry_data("ep-1", "T");
        entry.chapters = vec![
            ChapterData {
                start: 0,
                title: "Introduction".to_string(),
                link: String::new(),
                image: String::new(),
            },
            ChapterData {
                start: 120,
                title: "News".to_string(),
                link: String::new(),
                image: String::new(),
            },
        ];
        data.entries.push(entry);

        let diff = diff_feed(&snapshot, &data, None, "h".into(), 1, false, dir.path());
        assert_eq!(diff.changes.insert_chapters.len(), 1);
        assert_eq!(diff.changes.insert_chapters[0].start, 120);
        assert_eq!(diff.changes.update_chapters.len(), 1);
        assert_eq!(diff.changes.update_chapters[0].title, "Introduction");
        assert_eq!(
            diff.changes.delete_chapters,
            vec![("ep-1".to_string(), 300)]
        );
    }

    #[test]
    fn diff_enclosure_url_change_resets_state_and_deletes_file() {
        let dir = tempdir().unwrap();
        let mut snapshot = make_snapshot("https://example.com/f", false);
        snapshot.entries.push(Entry {
            feed: snapshot.feed.url.clone(),
            id: "ep-1".to_string(),
            title: "T".to_string(),
            content: String::new(),
            created: 0,
            updated: 0,
            link: String::new(),
            read: false,
            new: false,
            has_enclosure: true,
            image: String::new(),
        });
        snapshot.enclosures.push(Enclosure {
            feed: snapshot.feed.url.clone(),
            entry_id: "ep-1".to_string(),
            duration: 100,
            size: 1000,
            title: "Ep".to_string(),
            mime_type: "audio/mpeg".to_string(),
            url: "https://example.com/old.mp3".to_string(),
            play_position: 42,
            downloaded: DownloadStatus::Downloaded,
        });

        let mut data = FeedData {
            url: snapshot.feed.url.clone(),
            ..Default::default()
        };
        let mut entry = make_entry_data("ep-1", "T");
        entry.enclosures = vec![EnclosureData {
            duration: 100,
            size: 1000,
            title: "Ep".to_string(),
            mime_type: "audio/mpeg".to_string(),
            url: "https://example.com/new.mp3".to_string(),
        }];
        data.entries.push(entry);

        let diff = diff_feed(&snapshot, &data, None, "h".into(), 1, false, dir.path());
        assert_eq!(diff.changes.reset_enclosures, vec!["ep-1".to_string()]);
        assert_eq!(diff.changes.update_enclosures.len(), 1);
        assert_eq!(
            diff.changes.update_enclosures[0].url,
            "https://example.com/new.mp3"
        );
        assert!(matches!(diff.file_ops[0], FileOp::Delete(_)));
    }

    #[test]
    fn diff_enclosure_title_change_renames_file() {
        let dir = tempdir().unwrap();
        let mut snapshot = make_snapshot("https://example.com/f", false);
        snapshot.entries.push(Entry {
            feed: snapshot.feed.url.clone(),
            id: "ep-1".to_string(),
            title: "T".to_string(),
            content: String::new(),
            created: 0,
            updated: 0,
            link: String::new(),
            read: false,
            new: false,
            has_enclosure: true,
            image: String::new(),
        });
        snapshot.enclosures.push(Enclosure {
            feed: snapshot.feed.url.clone(),
            entry_id: "ep-1".to_string(),
            duration: 100,
            size: 1000,
            title: "Old Title".to_string(),
            mime_type: "audio/mpeg".to_string(),
            url: "https://example.com/ep.mp3".to_string(),
            play_position: 0,
            downloaded: DownloadStatus::Downloaded,
        });

        let mut data = FeedData {
            url: snapshot.feed.url.clone(),
            ..Default::default()
        };
        let mut entry = make_entry_data("ep-1", "T");
        entry.enclosures = vec![EnclosureData {
            duration: 100,
            size: 1000,
            title: "New Title".to_string(),
            mime_type: "audio/mpeg".to_string(),
            url: "https://example.com/ep.mp3".to_string(),
        }];
        data.entries.push(entry);

        let diff = diff_feed(&snapshot, &data, None, "h".into(), 1, false, dir.path());
        assert!(diff.changes.reset_enclosures.is_empty());
        match &diff.file_ops[0] {
            FileOp::Rename { from, to } => {
                assert!(from.ends_with("Tech News/Old Title.mp3"));
                assert!(to.ends_with("Tech News/New Title.mp3"));
            }
            other => panic!("expected rename, got {other:?}"),
        }
    }

    #[test]
    fn enclosure_path_derives_extension_from_url() {
        let path = enclosure_file_path(
            Path::new("/data"),
            "Tech News",
            "Episode: One",
            "https://example.com/audio/ep1.mp3?token=xyz",
        );
        assert_eq!(path, Path::new("/data/Tech News/Episode One.mp3"));
    }
}
