// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use url::Url;

use crate::error::FeedError;
use crate::feed::psc::extract_chapters;

/// A parsed feed, reduced to the fields the store tracks
#[derive(Debug, Clone, Default)]
pub struct FeedData {
    pub url: String,
    pub name: String,
    pub image: String,
    pub link: String,
    pub description: String,
    pub authors: Vec<AuthorData>,
    pub entries: Vec<EntryData>,
}

/// A parsed feed entry
#[derive(Debug, Clone, Default)]
pub struct EntryData {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Publication time, epoch seconds UTC
    pub created: i64,
    /// Last modification time, epoch seconds UTC
    pub updated: i64,
    pub link: String,
    pub image: String,
    pub authors: Vec<AuthorData>,
    pub enclosures: Vec<EnclosureData>,
    pub chapters: Vec<ChapterData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorData {
    pub name: String,
    pub uri: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnclosureData {
    pub duration: i64,
    pub size: i64,
    pub title: String,
    pub mime_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterData {
    /// Offset into the episode, seconds
    pub start: i64,
    pub title: String,
    pub link: String,
    pub image: String,
}

/// Parse RSS or Atom bytes into a [`FeedData`].
///
/// Entries without an id fall back to their link; entries with neither
/// are skipped. Entry content prefers the longer of the full content
/// body and the summary. Root-relative image paths are resolved
/// against the feed URL.
pub fn parse_feed(bytes: &[u8], feed_url: &str) -> Result<FeedData, FeedError> {
    let parsed = feed_rs::parser::parse(bytes)?;
    let mut chapter_map = extract_chapters(bytes);

    let name = parsed.title.map(|t| t.content).unwrap_or_default();
    let image = resolve_image(
        parsed
            .logo
            .map(|i| i.uri)
            .or_else(|| parsed.icon.map(|i| i.uri))
            .unwrap_or_default(),
        feed_url,
    );
    let link = parsed
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();
    let description = parsed.description.map(|t| t.content).unwrap_or_default();
    let authors = parsed.authors.iter().map(author_data).collect();

    let entries = parsed
        .entries
        .into_iter()
        .filter_map(|entry| parse_entry(entry, feed_url, &mut chapter_map))
        .collect();

    Ok(FeedData {
        url: feed_url.to_string(),
        name,
        image,
        link,
        description,
        authors,
        entries,
    })
}

fn parse_entry(
    entry: feed_rs::model::Entry,
    feed_url: &str,
    chapter_map: &mut HashMap<String, Vec<ChapterData>>,
) -> Option<EntryData> {
    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();

    let id = if entry.id.is_empty() {
        link.clone()
    } else {
        entry.id.clone()
    };
    if id.is_empty() {
        return None;
    }

    let title = entry.title.map(|t| t.content).unwrap_or_default();

    // Prefer whichever of content body and summary carries more text
    let body = entry.content.and_then(|c| c.body).unwrap_or_default();
    let summary = entry.summary.map(|t| t.content).unwrap_or_default();
    let content = if body.len() >= summary.len() {
        body
    } else {
        summary
    };

    let created = entry.published.map(|dt| dt.timestamp()).unwrap_or(0);
    let updated = entry.updated.map(|dt| dt.timestamp()).unwrap_or(created);

    let image = resolve_image(
        entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.first())
            .next()
            .map(|t| t.image.uri.clone())
            .unwrap_or_default(),
        feed_url,
    );

    let authors = entry.authors.iter().map(author_data).collect();

    // Chapters were scanned from the raw XML keyed by guid or link
    let chapters = chapter_map
        .remove(&id)
        .or_else(|| chapter_map.remove(&link))
        .unwrap_or_default();

    let mut enclosures = Vec::new();
    for media in &entry.media {
        let media_title = media
            .title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_else(|| title.clone());
        let media_duration = media.duration.map(|d| d.as_secs() as i64).unwrap_or(0);
        for content in &media.content {
            let Some(url) = content.url.as_ref() else {
                continue;
            };
            enclosures.push(EnclosureData {
                duration: content
                    .duration
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(media_duration),
                size: content.size.map(|s| s as i64).unwrap_or(0),
                title: media_title.clone(),
                mime_type: content
                    .content_type
                    .as_ref()
                    .map(|m| m.essence().to_string())
                    .unwrap_or_default(),
                url: url.to_string(),
            });
        }
    }

    Some(EntryData {
        id,
        title,
        content,
        created,
        updated,
        link,
        image,
        authors,
        enclosures,
        chapters,
    })
}

fn author_data(person: &feed_rs::model::Person) -> AuthorData {
    AuthorData {
        name: person.name.clone(),
        uri: person.uri.clone().unwrap_or_default(),
        email: person.email.clone().unwrap_or_default(),
    }
}

/// Feeds sometimes carry root-relative artwork paths; resolve them
/// against the feed URL so the store only holds absolute URLs
fn resolve_image(image: String, feed_url: &str) -> String {
    if !image.starts_with('/') {
        return image;
    }
    match Url::parse(feed_url).and_then(|base| base.join(&image)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => image,
    }
}
