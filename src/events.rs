// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tokio::sync::broadcast;

/// Events emitted while refreshing feeds and running sync jobs.
///
/// Consumers subscribe through [`EventBus::subscribe`]; a lagging or absent
/// consumer never blocks the engine.
#[derive(Debug, Clone)]
pub enum Event {
    /// A batch refresh started
    RefreshStarted { total: usize },

    /// A single feed is being fetched
    FeedStarted { url: String },

    /// A feed finished processing
    FeedFinished { url: String, outcome: FeedOutcome },

    /// A batch refresh finished
    RefreshFinished {
        updated: usize,
        unchanged: usize,
        failed: usize,
    },

    /// A new entry appeared in a feed that has notifications enabled
    NewEntry {
        feed_url: String,
        entry_id: String,
        title: String,
    },

    /// A sync job moved to a new phase
    SyncPhase { phase: String },

    /// A sync job finished
    SyncFinished { success: bool },

    /// An error was recorded in the error log
    ErrorLogged { context: String, message: String },
}

/// Outcome of refreshing one feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Feed content changed and was reconciled into the store
    Updated { new_entries: usize },
    /// Feed bytes hashed identical to the last run; nothing to do
    Unchanged,
    /// Fetch or processing failed
    Failed { message: String },
}

/// Broadcast bus carrying [`Event`]s to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Emit an event. Having no subscribers is fine.
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
