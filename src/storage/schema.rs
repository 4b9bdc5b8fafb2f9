pub const SCHEMA: &str = r#"
-- subscribed feeds
CREATE TABLE IF NOT EXISTS Feeds (
    url TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    image TEXT NOT NULL DEFAULT '',
    link TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    dirname TEXT NOT NULL DEFAULT '',
    subscribed INTEGER NOT NULL DEFAULT 0,
    lastUpdated INTEGER NOT NULL DEFAULT 0,
    notify INTEGER NOT NULL DEFAULT 0,
    new INTEGER NOT NULL DEFAULT 0,
    lastHash TEXT NOT NULL DEFAULT ''
);

-- feed entries
CREATE TABLE IF NOT EXISTS Entries (
    feed TEXT NOT NULL,
    id TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    created INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    link TEXT NOT NULL DEFAULT '',
    read INTEGER NOT NULL DEFAULT 0,
    new INTEGER NOT NULL DEFAULT 0,
    hasEnclosure INTEGER NOT NULL DEFAULT 0,
    image TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (feed, id)
);

CREATE INDEX IF NOT EXISTS idx_entries_feed ON Entries(feed);
CREATE INDEX IF NOT EXISTS idx_entries_created ON Entries(created DESC);

-- entry- and feed-level authors; id is empty for feed-level rows
CREATE TABLE IF NOT EXISTS Authors (
    feed TEXT NOT NULL,
    id TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT '',
    uri TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_authors_feed_id ON Authors(feed, id);

-- one enclosure per entry
CREATE TABLE IF NOT EXISTS Enclosures (
    feed TEXT NOT NULL,
    id TEXT NOT NULL,
    duration INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL DEFAULT 0,
    title TEXT NOT NULL DEFAULT '',
    type TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL DEFAULT '',
    playposition INTEGER NOT NULL DEFAULT 0,
    downloaded INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (feed, id)
);

-- chapter marks per entry
CREATE TABLE IF NOT EXISTS Chapters (
    feed TEXT NOT NULL,
    id TEXT NOT NULL,
    start INTEGER NOT NULL DEFAULT 0,
    title TEXT NOT NULL DEFAULT '',
    link TEXT NOT NULL DEFAULT '',
    image TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_chapters_feed_id ON Chapters(feed, id);

-- playback queue
CREATE TABLE IF NOT EXISTS Queue (
    listnr INTEGER NOT NULL,
    feed TEXT NOT NULL,
    id TEXT NOT NULL,
    playing INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (feed, id)
);

-- per-phase server watermarks
CREATE TABLE IF NOT EXISTS SyncTimestamps (
    syncservice TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL DEFAULT 0
);

-- local subscription changes awaiting upload
CREATE TABLE IF NOT EXISTS FeedActions (
    url TEXT NOT NULL,
    action TEXT NOT NULL,
    timestamp INTEGER NOT NULL DEFAULT 0
);

-- local episode actions awaiting upload
CREATE TABLE IF NOT EXISTS EpisodeActions (
    podcast TEXT NOT NULL,
    url TEXT NOT NULL,
    id TEXT NOT NULL,
    action TEXT NOT NULL,
    started INTEGER NOT NULL DEFAULT 0,
    position INTEGER NOT NULL DEFAULT 0,
    total INTEGER NOT NULL DEFAULT 0,
    timestamp INTEGER NOT NULL DEFAULT 0
);

-- failures kept for later inspection
CREATE TABLE IF NOT EXISTS ErrorLog (
    timestamp INTEGER NOT NULL DEFAULT 0,
    context TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL DEFAULT '',
    id TEXT NOT NULL DEFAULT '',
    code INTEGER NOT NULL DEFAULT 0,
    message TEXT NOT NULL DEFAULT ''
);
"#;
