mod dirname;
mod fetch;
mod parse;
mod process;
mod psc;
mod time;

pub use dirname::{generate_feed_dirname, sanitize_dirname};
pub use fetch::{content_hash, fetch_feed_bytes};
pub use parse::{AuthorData, ChapterData, EnclosureData, EntryData, FeedData, parse_feed};
pub use process::{ProcessOptions, RefreshOutcome, refresh_feed};
pub use time::parse_clock_duration;
