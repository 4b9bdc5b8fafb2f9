// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{HashMap, HashSet};

use crate::storage::{EpisodeAction, EpisodeActionKind};

/// Maximum number of episode actions per upload request
pub const MAX_EPISODE_UPLOADS: usize = 30;

/// Merge slot for an action. Download and delete contradict each other
/// and therefore share a slot, so only the newest of the two survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Play,
    DownloadDelete,
    New,
}

fn slot_of(kind: EpisodeActionKind) -> Slot {
    match kind {
        EpisodeActionKind::Play => Slot::Play,
        EpisodeActionKind::Download | EpisodeActionKind::Delete => Slot::DownloadDelete,
        EpisodeActionKind::New => Slot::New,
    }
}

fn episode_key(action: &EpisodeAction) -> String {
    if action.id.is_empty() {
        action.url.clone()
    } else {
        action.id.clone()
    }
}

/// Newest-wins merge of episode actions, one slot per episode and
/// action family
#[derive(Debug, Default)]
pub struct ActionMerger {
    map: HashMap<(String, Slot), EpisodeAction>,
}

impl ActionMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the action only if it is at least as new as what the slot
    /// already holds. Equal timestamps favor the later arrival, which
    /// makes replaying a page idempotent.
    pub fn add_if_newer(&mut self, action: EpisodeAction) {
        let key = (episode_key(&action), slot_of(action.action));
        match self.map.get(&key) {
            Some(existing) if existing.timestamp > action.timestamp => {}
            _ => {
                self.map.insert(key, action);
            }
        }
    }

    /// Drop entries that lost to a strictly newer action in another
    /// slot of the same episode
    pub fn remove_conflicts(&mut self) {
        let mut newest: HashMap<String, i64> = HashMap::new();
        for ((episode, _), action) in &self.map {
            let entry = newest.entry(episode.clone()).or_insert(action.timestamp);
            if action.timestamp > *entry {
                *entry = action.timestamp;
            }
        }
        self.map
            .retain(|(episode, _), action| action.timestamp >= newest[episode]);
    }

    /// True when this set holds a strictly newer action for the same
    /// episode and slot
    pub fn supersedes(&self, action: &EpisodeAction) -> bool {
        let key = (episode_key(action), slot_of(action.action));
        self.map
            .get(&key)
            .is_some_and(|held| held.timestamp > action.timestamp)
    }

    /// Drop every action that a strictly newer action in the same slot
    /// of `other` supersedes. Ties survive on both sides.
    pub fn drop_older_than(&mut self, other: &ActionMerger) {
        self.map.retain(|key, action| {
            other
                .map
                .get(key)
                .is_none_or(|rival| action.timestamp >= rival.timestamp)
        });
    }

    /// All surviving actions, ordered by timestamp
    pub fn into_actions(self) -> Vec<EpisodeAction> {
        let mut actions: Vec<EpisodeAction> = self.map.into_values().collect();
        actions.sort_by_key(|a| a.timestamp);
        actions
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Remove URLs that appear on both sides; an add followed by a remove
/// (or vice versa) cancels out
pub fn remove_cancelling_pairs(
    add: Vec<String>,
    remove: Vec<String>,
) -> (Vec<String>, Vec<String>) {
    let add_set: HashSet<&String> = add.iter().collect();
    let remove_set: HashSet<String> = remove
        .iter()
        .filter(|url| add_set.contains(url))
        .cloned()
        .collect();

    let kept_add = add
        .iter()
        .filter(|url| !remove_set.contains(*url))
        .cloned()
        .collect();
    let kept_remove = remove
        .into_iter()
        .filter(|url| !remove_set.contains(url))
        .collect();
    (kept_add, kept_remove)
}

/// Only play actions carry state the protocol can express; everything
/// else stays local
pub fn uploadable_actions(actions: &[EpisodeAction]) -> Vec<EpisodeAction> {
    actions
        .iter()
        .filter(|a| a.action == EpisodeActionKind::Play)
        .cloned()
        .collect()
}

/// Advance a watermark from a server timestamp. The server value plus
/// one is used so the same instant is not fetched again; values that
/// would not exceed 1 are meaningless and skipped.
pub fn next_watermark(server_timestamp: i64) -> Option<i64> {
    let next = server_timestamp + 1;
    (next > 1).then_some(next)
}
