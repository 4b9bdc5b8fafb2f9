// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{Event, EventBus, FeedOutcome};
use crate::feed::{ProcessOptions, RefreshOutcome, refresh_feed};
use crate::http::HttpClient;
use crate::storage::{ErrorLogEntry, Repository};

/// Options for a batch feed refresh
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Maximum number of feeds refreshed in parallel
    pub max_concurrent: usize,
    pub process: ProcessOptions,
    /// Mutual exclusion between batch runs. Clones share the flag, so
    /// every caller that must not overlap clones the same options.
    pub guard: RefreshGuard,
}

/// Admission flag for batch refreshes: at most one run per guard is
/// active at a time, a second request is a no-op.
#[derive(Debug, Clone, Default)]
pub struct RefreshGuard {
    active: Arc<AtomicBool>,
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_acquire(&self) -> Option<RefreshRun> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then(|| RefreshRun {
                active: Arc::clone(&self.active),
            })
    }
}

struct RefreshRun {
    active: Arc<AtomicBool>,
}

impl Drop for RefreshRun {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Result of a batch feed refresh
#[derive(Debug, Clone, Default)]
pub struct RefreshResult {
    /// Feeds whose content changed and was reconciled
    pub updated: usize,
    /// Feeds skipped via the content-hash short-circuit
    pub unchanged: usize,
    /// Feeds that failed to fetch or process
    pub failed: usize,
    /// Details of failed feeds (url, error message)
    pub failed_feeds: Vec<(String, String)>,
}

/// Refresh many feeds concurrently.
///
/// Individual feed failures are recorded in the error log and reported
/// through the bus; they never abort the batch. Cancelling the token
/// stops new feeds from starting and interrupts in-flight fetches.
/// While a run holding the same guard is active, further calls return
/// an empty result without doing anything.
pub async fn refresh_feeds<C: HttpClient + Clone + 'static>(
    client: &C,
    repo: &Arc<Repository>,
    urls: Vec<String>,
    options: &RefreshOptions,
    bus: &EventBus,
    cancel: &CancellationToken,
) -> RefreshResult {
    let Some(_run) = options.guard.try_acquire() else {
        debug!("a batch refresh is already running, ignoring request");
        return RefreshResult::default();
    };

    bus.emit(Event::RefreshStarted { total: urls.len() });

    // Slot pool: limits concurrency and hands out stable worker ids
    let (slot_tx, slot_rx) = tokio::sync::mpsc::channel(options.max_concurrent.max(1));
    for slot in 0..options.max_concurrent.max(1) {
        let _ = slot_tx.send(slot).await;
    }
    let slot_rx = Arc::new(Mutex::new(slot_rx));

    let updated = Arc::new(AtomicUsize::new(0));
    let unchanged = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let failed_feeds = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();

    for url in urls {
        if cancel.is_cancelled() {
            debug!("refresh cancelled, not starting remaining feeds");
            break;
        }

        let Some(slot) = slot_rx.lock().await.recv().await else {
            break;
        };

        let slot_tx = slot_tx.clone();
        let client = client.clone();
        let repo = repo.clone();
        let bus = bus.clone();
        let cancel = cancel.clone();
        let process_options = options.process.clone();
        let updated = updated.clone();
        let unchanged = unchanged.clone();
        let failed = failed.clone();
        let failed_feeds = failed_feeds.clone();

        let handle = tokio::spawn(async move {
            bus.emit(Event::FeedStarted { url: url.clone() });

            let result = tokio::select! {
                result = refresh_feed(&client, &repo, &url, &process_options) => Some(result),
                _ = cancel.cancelled() => None,
            };

            match result {
                Some(Ok(RefreshOutcome::Updated { new_entries })) => {
                    updated.fetch_add(1, Ordering::SeqCst);

                    let notify = matches!(
                        repo.feed(url.clone()).await,
                        Ok(Some(feed)) if feed.notify
                    );
                    if notify {
                        for (entry_id, title) in &new_entries {
                            bus.emit(Event::NewEntry {
                                feed_url: url.clone(),
                                entry_id: entry_id.clone(),
                                title: title.clone(),
                            });
                        }
                    }

                    bus.emit(Event::FeedFinished {
                        url: url.clone(),
                        outcome: FeedOutcome::Updated {
                            new_entries: new_entries.len(),
                        },
                    });
                }
                Some(Ok(RefreshOutcome::Unchanged)) => {
                    unchanged.fetch_add(1, Ordering::SeqCst);
                    bus.emit(Event::FeedFinished {
                        url: url.clone(),
                        outcome: FeedOutcome::Unchanged,
                    });
                }
                Some(Err(e)) => {
                    warn!(url, error = %e, "feed refresh failed");
                    failed.fetch_add(1, Ordering::SeqCst);
                    failed_feeds.lock().await.push((url.clone(), e.to_string()));

                    if let Err(log_err) = repo
                        .log_error(ErrorLogEntry {
                            timestamp: Utc::now().timestamp(),
                            context: "feed-update".to_string(),
                            url: url.clone(),
                            id: String::new(),
                            code: 0,
                            message: e.to_string(),
                        })
                        .await
                    {
                        warn!(error = %log_err, "could not record refresh failure");
                    }
                    bus.emit(Event::ErrorLogged {
                        context: "feed-update".to_string(),
                        message: e.to_string(),
                    });
                    bus.emit(Event::FeedFinished {
                        url: url.clone(),
                        outcome: FeedOutcome::Failed {
                            message: e.to_string(),
                        },
                    });
                }
                None => {
                    debug!(url, "feed refresh interrupted by cancellation");
                }
            }

            let _ = slot_tx.send(slot).await;
        });

        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.await;
    }

    let result = RefreshResult {
        updated: updated.load(Ordering::SeqCst),
        unchanged: unchanged.load(Ordering::SeqCst),
        failed: failed.load(Ordering::SeqCst),
        failed_feeds: failed_feeds.lock().await.clone(),
    };

    bus.emit(Event::RefreshFinished {
        updated: result.updated,
        unchanged: result.unchanged,
        failed: result.failed,
    });

    result
}
