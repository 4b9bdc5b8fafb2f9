pub mod model;
pub mod repository;
pub mod schema;

pub use model::{
    Author, Chapter, DownloadStatus, Enclosure, Entry, EpisodeAction, EpisodeActionKind,
    ErrorLogEntry, Feed, FeedAction, LocalEpisodeState, SubscriptionAction,
};
pub use repository::{FeedChangeSet, FeedSnapshot, Repository};
