// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::events::{Event, EventBus};
use crate::http::HttpClient;
use crate::refresh::{RefreshOptions, refresh_feeds};
use crate::storage::{EpisodeAction, EpisodeActionKind, FeedAction, Repository, SubscriptionAction};
use crate::sync::actions::{
    ActionMerger, MAX_EPISODE_UPLOADS, next_watermark, remove_cancelling_pairs,
    uploadable_actions,
};
use crate::sync::client::{GpodderClient, Provider};

/// Watermark labels in the SyncTimestamps table
pub const SUBSCRIPTION_TIMESTAMP: &str = "syncsubscriptions";
pub const EPISODE_TIMESTAMP: &str = "syncepisodes";
pub const UPLOAD_SUBSCRIPTION_TIMESTAMP: &str = "uploadsyncsubscriptions";
pub const UPLOAD_EPISODE_TIMESTAMP: &str = "uploadsyncepisodes";

/// A server timestamp this close to now means we caught up and can stop
/// paging episode actions
const EPISODE_PAGE_SLACK_SECS: i64 = 10;
/// Hard cap on episode-action pages per job, in case the server never
/// reports a current timestamp
const MAX_EPISODE_PAGES: usize = 100;

/// The steps a sync job moves through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Started,
    SubscriptionDownload,
    SubscriptionUpload,
    SubscriptionFetch,
    EpisodeDownload,
    ApplyEpisodeActions,
    EpisodeUpload,
    Finished,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Started => "started",
            SyncPhase::SubscriptionDownload => "subscription-download",
            SyncPhase::SubscriptionUpload => "subscription-upload",
            SyncPhase::SubscriptionFetch => "subscription-fetch",
            SyncPhase::EpisodeDownload => "episode-download",
            SyncPhase::ApplyEpisodeActions => "apply-episode-actions",
            SyncPhase::EpisodeUpload => "episode-upload",
            SyncPhase::Finished => "finished",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Finished)
    }
}

/// Check that a phase change follows the job order. A quick job only
/// uploads, so it skips every download and apply step.
pub fn validate_transition(from: SyncPhase, to: SyncPhase, quick: bool) -> bool {
    use SyncPhase::*;
    if quick {
        matches!(
            (from, to),
            (Started, SubscriptionUpload) | (SubscriptionUpload, EpisodeUpload) | (EpisodeUpload, Finished)
        )
    } else {
        matches!(
            (from, to),
            (Started, SubscriptionDownload)
                | (SubscriptionDownload, SubscriptionUpload)
                | (SubscriptionUpload, SubscriptionFetch)
                | (SubscriptionFetch, EpisodeDownload)
                | (EpisodeDownload, ApplyEpisodeActions)
                | (ApplyEpisodeActions, EpisodeUpload)
                | (EpisodeUpload, Finished)
        )
    }
}

/// Account and server parameters for one job
#[derive(Debug, Clone)]
pub struct SyncAccount {
    pub provider: Provider,
    pub base_url: String,
    pub username: String,
    pub device_id: String,
    pub password: String,
}

/// Options for one sync job
#[derive(Debug, Clone)]
pub struct SyncJobOptions {
    /// Upload-only job: skip downloads and local application
    pub quick: bool,
    /// Keep going with local data when the subscription download fails
    pub force: bool,
    /// Positions this close to the end count as played
    pub completion_threshold_secs: i64,
    /// Used to fetch feeds the server subscribed elsewhere
    pub refresh: RefreshOptions,
}

/// What a finished job did
#[derive(Debug, Clone, Default)]
pub struct SyncJobReport {
    pub subscriptions_added: usize,
    pub subscriptions_removed: usize,
    pub actions_applied: usize,
    pub actions_uploaded: usize,
}

struct PhaseTracker<'a> {
    current: SyncPhase,
    quick: bool,
    bus: &'a EventBus,
    cancel: &'a CancellationToken,
}

impl<'a> PhaseTracker<'a> {
    fn new(quick: bool, bus: &'a EventBus, cancel: &'a CancellationToken) -> Self {
        bus.emit(Event::SyncPhase {
            phase: SyncPhase::Started.as_str().to_string(),
        });
        Self {
            current: SyncPhase::Started,
            quick,
            bus,
            cancel,
        }
    }

    /// Move to the next phase. Phase boundaries double as abort
    /// checkpoints, so a cancelled job stops before its next phase.
    fn advance(&mut self, to: SyncPhase) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            info!(phase = self.current.as_str(), "sync aborted");
            return Err(SyncError::Aborted);
        }
        if !validate_transition(self.current, to, self.quick) {
            return Err(SyncError::PhaseFailed {
                phase: self.current.as_str().to_string(),
                message: format!("invalid transition to {}", to.as_str()),
            });
        }
        info!(phase = to.as_str(), "sync phase");
        self.current = to;
        self.bus.emit(Event::SyncPhase {
            phase: to.as_str().to_string(),
        });
        Ok(())
    }
}

/// Run one sync job against the configured server.
///
/// A full job downloads subscription changes, uploads local ones,
/// fetches newly added feeds, downloads and applies episode actions,
/// then uploads pending local actions. A quick job only uploads.
/// Cancelling the token aborts the job at the next phase boundary.
pub async fn run_sync_job<C: HttpClient + Clone + 'static>(
    http: &C,
    repo: &Arc<Repository>,
    account: &SyncAccount,
    options: &SyncJobOptions,
    bus: &EventBus,
    cancel: &CancellationToken,
) -> Result<SyncJobReport, SyncError> {
    let client = GpodderClient::new(
        http,
        account.provider,
        &account.base_url,
        &account.username,
        &account.device_id,
        &account.password,
    );

    let mut report = SyncJobReport::default();
    let mut tracker = PhaseTracker::new(options.quick, bus, cancel);
    let mut added_feeds = Vec::new();
    let mut first_sync = false;

    if !options.quick {
        // Decided before the download phase stores a watermark
        first_sync = repo
            .sync_timestamp(SUBSCRIPTION_TIMESTAMP.to_string())
            .await?
            == 0;

        tracker.advance(SyncPhase::SubscriptionDownload)?;
        added_feeds = match download_subscriptions(&client, repo, &mut report).await {
            Ok(added) => added,
            Err(e) if options.force => {
                warn!(error = %e, "subscription download failed, forced sync continues with local data");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
    }

    tracker.advance(SyncPhase::SubscriptionUpload)?;
    upload_subscriptions(&client, repo, first_sync).await?;

    if !options.quick {
        tracker.advance(SyncPhase::SubscriptionFetch)?;
        if !added_feeds.is_empty() {
            refresh_feeds(http, repo, added_feeds, &options.refresh, bus, cancel).await;
        }

        tracker.advance(SyncPhase::EpisodeDownload)?;
        let mut remote_actions = download_episode_actions(&client, repo).await?;

        tracker.advance(SyncPhase::ApplyEpisodeActions)?;
        resolve_against_local(repo, &mut remote_actions).await?;
        report.actions_applied =
            apply_episode_actions(repo, remote_actions, options.completion_threshold_secs)
                .await?;
    }

    tracker.advance(SyncPhase::EpisodeUpload)?;
    report.actions_uploaded = upload_episode_actions(&client, repo).await?;

    tracker.advance(SyncPhase::Finished)?;
    Ok(report)
}

async fn download_subscriptions<C: HttpClient + ?Sized>(
    client: &GpodderClient<'_, C>,
    repo: &Repository,
    report: &mut SyncJobReport,
) -> Result<Vec<String>, SyncError> {
    let since = repo.sync_timestamp(SUBSCRIPTION_TIMESTAMP.to_string()).await?;
    let delta = client.download_subscription_changes(since).await?;
    let (add, remove) = remove_cancelling_pairs(delta.add, delta.remove);

    let local: HashSet<String> = repo.subscribed_urls().await?.into_iter().collect();
    let now = Utc::now().timestamp();

    // Existence decides subscription conflicts: an add we already have
    // and a remove we never had are both no-ops
    let mut added = Vec::new();
    for url in add {
        if !local.contains(&url) {
            repo.insert_feed(url.clone(), now, true).await?;
            added.push(url);
            report.subscriptions_added += 1;
        }
    }
    for url in remove {
        if local.contains(&url) {
            repo.delete_feed(url).await?;
            report.subscriptions_removed += 1;
        }
    }

    store_watermark(repo, SUBSCRIPTION_TIMESTAMP, delta.timestamp).await?;
    Ok(added)
}

async fn upload_subscriptions<C: HttpClient + ?Sized>(
    client: &GpodderClient<'_, C>,
    repo: &Repository,
    bootstrap: bool,
) -> Result<(), SyncError> {
    let pending = repo.feed_actions().await?;
    if pending.is_empty() && !bootstrap {
        return Ok(());
    }

    let mut add: Vec<String> = pending
        .iter()
        .filter(|a| a.action == SubscriptionAction::Add)
        .map(|a| a.url.clone())
        .collect();
    let remove: Vec<String> = pending
        .iter()
        .filter(|a| a.action == SubscriptionAction::Remove)
        .map(|a| a.url.clone())
        .collect();

    // The server has never seen this client: every current
    // subscription counts as a pending add
    if bootstrap {
        let known: HashSet<String> = add.iter().cloned().collect();
        for url in repo.subscribed_urls().await? {
            if !known.contains(&url) {
                add.push(url);
            }
        }
    }

    let (add, remove) = remove_cancelling_pairs(add, remove);

    if !add.is_empty() || !remove.is_empty() {
        let result = client.upload_subscription_changes(&add, &remove).await?;

        for (old, new) in result.update_urls {
            if !new.is_empty() && new != old {
                debug!(%old, %new, "server rewrote subscription url");
                repo.rename_feed_url(old, new).await?;
            }
        }

        store_watermark(repo, UPLOAD_SUBSCRIPTION_TIMESTAMP, result.timestamp).await?;
    }

    // Everything pending was either uploaded or cancelled itself out
    repo.remove_feed_actions(pending).await?;
    Ok(())
}

async fn download_episode_actions<C: HttpClient + ?Sized>(
    client: &GpodderClient<'_, C>,
    repo: &Repository,
) -> Result<ActionMerger, SyncError> {
    let mut since = repo.sync_timestamp(EPISODE_TIMESTAMP.to_string()).await?;
    let mut merger = ActionMerger::new();
    let mut last_timestamp = 0;

    // The server pages implicitly: keep asking "since" until it reports
    // a timestamp close to now or stops sending actions
    for _ in 0..MAX_EPISODE_PAGES {
        let page = client.download_episode_actions(since).await?;
        let received = page.actions.len();
        for action in page.actions {
            merger.add_if_newer(action);
        }
        last_timestamp = page.timestamp;

        let now = Utc::now().timestamp();
        if received == 0 || (now - page.timestamp).abs() <= EPISODE_PAGE_SLACK_SECS {
            break;
        }
        since = page.timestamp;
    }

    merger.remove_conflicts();
    debug!(actions = merger.len(), "merged remote episode actions");

    store_watermark(repo, EPISODE_TIMESTAMP, last_timestamp).await?;
    Ok(merger)
}

/// Cross-resolve remote actions against local pending ones: per
/// episode and slot held on both sides, the strictly older side is
/// dropped. A losing remote action leaves the merge set; a losing
/// local action is deleted from the pending store so it never uploads.
async fn resolve_against_local(
    repo: &Repository,
    remote: &mut ActionMerger,
) -> Result<(), SyncError> {
    let pending = repo.episode_actions().await?;
    if pending.is_empty() {
        return Ok(());
    }

    let mut local = ActionMerger::new();
    for action in &pending {
        local.add_if_newer(action.clone());
    }

    let lost: Vec<EpisodeAction> = pending
        .into_iter()
        .filter(|action| remote.supersedes(action))
        .collect();
    remote.drop_older_than(&local);

    if !lost.is_empty() {
        debug!(count = lost.len(), "local pending actions superseded by remote");
        repo.remove_episode_actions(lost).await?;
    }
    Ok(())
}

/// Position within `threshold` of the end counts as played. The
/// server-reported total wins; the stored enclosure duration is the
/// fallback.
pub fn is_completed(position: i64, total: i64, stored_duration: i64, threshold: i64) -> bool {
    let reference = if total > 0 { total } else { stored_duration };
    reference > 0 && position >= reference - threshold
}

async fn apply_episode_actions(
    repo: &Repository,
    merger: ActionMerger,
    completion_threshold: i64,
) -> Result<usize, SyncError> {
    let mut applied = 0;

    for action in merger.into_actions() {
        let entry = if action.id.is_empty() {
            repo.find_entry_by_enclosure_url(action.url.clone()).await?
        } else {
            match repo.find_entry_by_id(action.id.clone()).await? {
                Some(entry) => Some(entry),
                None => repo.find_entry_by_enclosure_url(action.url.clone()).await?,
            }
        };
        let Some(entry) = entry else {
            debug!(url = action.url, "episode action for unknown entry, skipping");
            continue;
        };

        match action.action {
            EpisodeActionKind::Play => {
                let stored_duration = repo
                    .enclosure(entry.feed.clone(), entry.id.clone())
                    .await?
                    .map(|e| e.duration)
                    .unwrap_or(0);

                if is_completed(action.position, action.total, stored_duration, completion_threshold)
                {
                    repo.mark_entry_read(entry.feed.clone(), entry.id.clone(), true)
                        .await?;
                    repo.set_play_position(entry.feed, entry.id, 0).await?;
                } else if action.position > 0 {
                    repo.set_play_position(entry.feed.clone(), entry.id.clone(), action.position)
                        .await?;
                    repo.enqueue_entry(entry.feed, entry.id).await?;
                } else {
                    repo.set_play_position(entry.feed, entry.id, 0).await?;
                }
            }
            EpisodeActionKind::Delete => {
                repo.mark_entry_read(entry.feed, entry.id, true).await?;
            }
            EpisodeActionKind::New => {
                repo.mark_entry_unread(entry.feed, entry.id).await?;
            }
            EpisodeActionKind::Download => {
                // The protocol cannot say which device holds the file,
                // so downloads are not mirrored locally
                debug!(id = entry.id, "ignoring remote download action");
            }
        }
        applied += 1;
    }

    Ok(applied)
}

async fn upload_episode_actions<C: HttpClient + ?Sized>(
    client: &GpodderClient<'_, C>,
    repo: &Repository,
) -> Result<usize, SyncError> {
    let pending = repo.episode_actions().await?;
    if pending.is_empty() {
        return Ok(0);
    }

    let uploads = uploadable_actions(&pending);
    let mut last_timestamp = 0;
    for batch in uploads.chunks(MAX_EPISODE_UPLOADS) {
        last_timestamp = client.upload_episode_actions(batch).await?;
    }

    repo.remove_episode_actions(pending).await?;
    store_watermark(repo, UPLOAD_EPISODE_TIMESTAMP, last_timestamp).await?;
    Ok(uploads.len())
}

/// Persist a watermark from a server timestamp. Watermarks only move
/// forward and only when the +1 value clears the floor.
async fn store_watermark(
    repo: &Repository,
    label: &str,
    server_timestamp: i64,
) -> Result<(), SyncError> {
    if let Some(next) = next_watermark(server_timestamp) {
        let current = repo.sync_timestamp(label.to_string()).await?;
        if next > current {
            repo.set_sync_timestamp(label.to_string(), next).await?;
        } else {
            warn!(label, next, current, "watermark would move backwards, keeping current");
        }
    }
    Ok(())
}

/// Log a local subscription change for the next upload phase
pub async fn record_feed_action(
    repo: &Repository,
    url: &str,
    action: SubscriptionAction,
) -> Result<(), SyncError> {
    repo.add_feed_action(FeedAction {
        url: url.to_string(),
        action,
        timestamp: Utc::now().timestamp(),
    })
    .await?;
    Ok(())
}
