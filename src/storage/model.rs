// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// A subscribed feed row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub url: String,
    pub name: String,
    pub image: String,
    pub link: String,
    pub description: String,
    pub dirname: String,
    pub subscribed: i64,
    pub last_updated: i64,
    pub notify: bool,
    pub new: bool,
    pub last_hash: String,
}

/// A single feed entry row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub feed: String,
    pub id: String,
    pub title: String,
    pub content: String,
    pub created: i64,
    pub updated: i64,
    pub link: String,
    pub read: bool,
    pub new: bool,
    pub has_enclosure: bool,
    pub image: String,
}

/// An author row; `entry_id` is empty for feed-level authors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub feed: String,
    pub entry_id: String,
    pub name: String,
    pub uri: String,
    pub email: String,
}

/// Download state of an enclosure file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    #[default]
    NotDownloaded,
    Downloading,
    PartiallyDownloaded,
    Downloaded,
}

impl DownloadStatus {
    pub fn to_db(self) -> i64 {
        match self {
            DownloadStatus::NotDownloaded => 0,
            DownloadStatus::Downloading => 1,
            DownloadStatus::PartiallyDownloaded => 2,
            DownloadStatus::Downloaded => 3,
        }
    }

    pub fn from_db(value: i64) -> Self {
        match value {
            1 => DownloadStatus::Downloading,
            2 => DownloadStatus::PartiallyDownloaded,
            3 => DownloadStatus::Downloaded,
            _ => DownloadStatus::NotDownloaded,
        }
    }
}

/// The enclosure attached to an entry; at most one per entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub feed: String,
    pub entry_id: String,
    pub duration: i64,
    pub size: i64,
    pub title: String,
    pub mime_type: String,
    pub url: String,
    pub play_position: i64,
    pub downloaded: DownloadStatus,
}

/// A chapter mark within an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub feed: String,
    pub entry_id: String,
    pub start: i64,
    pub title: String,
    pub link: String,
    pub image: String,
}

/// A local subscription change waiting to be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedAction {
    pub url: String,
    pub action: SubscriptionAction,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    Add,
    Remove,
}

impl SubscriptionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionAction::Add => "add",
            SubscriptionAction::Remove => "remove",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "add" => Some(SubscriptionAction::Add),
            "remove" => Some(SubscriptionAction::Remove),
            _ => None,
        }
    }
}

/// What happened to an episode, locally or on another device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EpisodeActionKind {
    Play,
    Download,
    Delete,
    New,
}

impl EpisodeActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EpisodeActionKind::Play => "play",
            EpisodeActionKind::Download => "download",
            EpisodeActionKind::Delete => "delete",
            EpisodeActionKind::New => "new",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "play" => Some(EpisodeActionKind::Play),
            "download" => Some(EpisodeActionKind::Download),
            "delete" => Some(EpisodeActionKind::Delete),
            "new" => Some(EpisodeActionKind::New),
            _ => None,
        }
    }
}

/// An episode action, either recorded locally for upload or received
/// from the sync server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeAction {
    /// Feed URL
    pub podcast: String,
    /// Enclosure URL
    pub url: String,
    /// Entry id
    pub id: String,
    pub action: EpisodeActionKind,
    /// Playback start position in seconds; only meaningful for play
    pub started: i64,
    /// Playback position in seconds; only meaningful for play
    pub position: i64,
    /// Total duration in seconds; only meaningful for play
    pub total: i64,
    /// When the action happened, epoch seconds UTC
    pub timestamp: i64,
}

/// A recorded failure
#[derive(Debug, Clone)]
pub struct ErrorLogEntry {
    pub timestamp: i64,
    pub context: String,
    pub url: String,
    pub id: String,
    pub code: i64,
    pub message: String,
}

/// Local playback state of one enclosure, used to seed push-all sync
#[derive(Debug, Clone)]
pub struct LocalEpisodeState {
    pub feed_url: String,
    pub enclosure_url: String,
    pub entry_id: String,
    pub position: i64,
    pub duration: i64,
    pub read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_status_round_trips() {
        for status in [
            DownloadStatus::NotDownloaded,
            DownloadStatus::Downloading,
            DownloadStatus::PartiallyDownloaded,
            DownloadStatus::Downloaded,
        ] {
            assert_eq!(DownloadStatus::from_db(status.to_db()), status);
        }
    }

    #[test]
    fn unknown_download_status_maps_to_not_downloaded() {
        assert_eq!(DownloadStatus::from_db(42), DownloadStatus::NotDownloaded);
    }

    #[test]
    fn subscription_action_parses() {
        assert_eq!(
            SubscriptionAction::parse("add"),
            Some(SubscriptionAction::Add)
        );
        assert_eq!(
            SubscriptionAction::parse("remove"),
            Some(SubscriptionAction::Remove)
        );
        assert_eq!(SubscriptionAction::parse("bogus"), None);
    }
}
