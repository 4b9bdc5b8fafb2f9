// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::SyncError;
use crate::events::{Event, EventBus};
use crate::http::HttpClient;
use crate::storage::{
    EpisodeAction, EpisodeActionKind, ErrorLogEntry, Repository, SubscriptionAction,
};
use crate::sync::client::GpodderClient;
use crate::sync::credentials::{CredentialStore, resolve_password};
use crate::sync::job::{
    SyncAccount, SyncJobOptions, SyncJobReport, record_feed_action, run_sync_job,
};

/// How a requested sync should behave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Full two-way sync
    Regular,
    /// Upload-only sync
    Quick,
    /// Drop all watermarks, then run a full sync from scratch
    Force,
    /// Upload the local play state of every episode, then quick sync
    PushAll,
}

/// A sync currently in flight, tracked so later requests can be
/// rejected or take over
struct ActiveSync {
    quick: bool,
    cancel: CancellationToken,
}

/// Serializes sync jobs and owns the account glue between the config,
/// the keyring and the job runner. At most one full sync runs at a
/// time; a full sync requested while a quick sync is in flight aborts
/// the quick sync and takes its place. Quick sync requests are
/// rejected while anything else is running.
pub struct SyncCoordinator {
    repo: Arc<Repository>,
    bus: EventBus,
    running: std::sync::Mutex<Option<ActiveSync>>,
    busy: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(repo: Arc<Repository>, bus: EventBus) -> Self {
        Self {
            repo,
            bus,
            running: std::sync::Mutex::new(None),
            busy: Mutex::new(()),
        }
    }

    /// Verify credentials against the server, register this device and
    /// persist everything. On gpodder.net the device is created if it
    /// does not exist yet and linked with the other devices of the
    /// account so they share one subscription group.
    pub async fn login<C: HttpClient>(
        &self,
        http: &C,
        config: &mut Config,
        server: &str,
        username: &str,
        password: &str,
    ) -> Result<(), SyncError> {
        let client = GpodderClient::new(
            http,
            config.sync.provider,
            server,
            username,
            "",
            password,
        );
        client.login().await?;

        let devices = client.devices().await?;
        let device_id = select_device_id(&config.sync.device_id);
        let device_name = if config.sync.device_name.is_empty() {
            device_id.clone()
        } else {
            config.sync.device_name.clone()
        };
        client.update_device(&device_id, &device_name).await?;

        let mut ids: Vec<String> = devices.iter().map(|d| d.id.clone()).collect();
        if !ids.contains(&device_id) {
            ids.push(device_id.clone());
        }
        client.link_devices(&ids).await?;

        CredentialStore::set(username, server, password)?;

        config.sync.enabled = true;
        config.sync.server = server.to_string();
        config.sync.username = username.to_string();
        config.sync.device_id = device_id;
        config.sync.device_name = device_name;
        config.sync.password = None;
        config.save().map_err(|e| SyncError::PhaseFailed {
            phase: "login".to_string(),
            message: e.to_string(),
        })?;

        info!(username, server, "sync account configured");
        Ok(())
    }

    /// Disable sync and drop the stored password. Keyring trouble is
    /// logged rather than surfaced; the account is gone either way.
    pub async fn logout(&self, config: &mut Config) -> Result<(), SyncError> {
        if let Err(e) = CredentialStore::delete(&config.sync.username, &config.sync.server) {
            warn!(error = %e, "could not remove password from keyring");
        }
        self.repo.clear_sync_timestamps().await?;

        config.sync.enabled = false;
        config.sync.username = String::new();
        config.sync.device_id = String::new();
        config.sync.password = None;
        config.save().map_err(|e| SyncError::PhaseFailed {
            phase: "logout".to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Run one sync job in the requested mode
    pub async fn request_sync<C: HttpClient + Clone + 'static>(
        &self,
        http: &C,
        config: &mut Config,
        mode: SyncMode,
        options: SyncJobOptions,
    ) -> Result<SyncJobReport, SyncError> {
        if !config.sync.enabled {
            return Err(SyncError::NotConfigured);
        }
        let cancel = self.admit(mode)?;

        let result = self.run_job(http, config, mode, options, &cancel).await;
        self.release(mode);

        match &result {
            Ok(report) => {
                info!(
                    added = report.subscriptions_added,
                    removed = report.subscriptions_removed,
                    applied = report.actions_applied,
                    uploaded = report.actions_uploaded,
                    "sync finished"
                );
                self.bus.emit(Event::SyncFinished { success: true });
            }
            Err(SyncError::Aborted) => {
                info!("sync aborted, a full sync took over");
                self.bus.emit(Event::SyncFinished { success: false });
            }
            Err(e) => {
                self.repo
                    .log_error(ErrorLogEntry {
                        timestamp: Utc::now().timestamp(),
                        context: "sync".to_string(),
                        url: config.sync.server.clone(),
                        id: String::new(),
                        code: 0,
                        message: e.to_string(),
                    })
                    .await?;
                self.bus.emit(Event::SyncFinished { success: false });
            }
        }
        result
    }

    /// Decide whether a request in `mode` may start. A full sync takes
    /// over a running quick sync by cancelling it; everything else is
    /// first come, first served.
    fn admit(&self, mode: SyncMode) -> Result<CancellationToken, SyncError> {
        let quick = mode == SyncMode::Quick;
        let mut slot = self.running_slot();
        match slot.as_ref() {
            Some(active) if quick || !active.quick => return Err(SyncError::AlreadyRunning),
            Some(active) => active.cancel.cancel(),
            None => {}
        }
        let cancel = CancellationToken::new();
        *slot = Some(ActiveSync {
            quick,
            cancel: cancel.clone(),
        });
        Ok(cancel)
    }

    /// Free the slot, unless a full sync already replaced the quick
    /// sync that is releasing
    fn release(&self, mode: SyncMode) {
        let quick = mode == SyncMode::Quick;
        let mut slot = self.running_slot();
        if slot.as_ref().is_some_and(|active| active.quick == quick) {
            *slot = None;
        }
    }

    fn running_slot(&self) -> std::sync::MutexGuard<'_, Option<ActiveSync>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn run_job<C: HttpClient + Clone + 'static>(
        &self,
        http: &C,
        config: &mut Config,
        mode: SyncMode,
        options: SyncJobOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncJobReport, SyncError> {
        // Admission already limits concurrency; this lock only makes a
        // taking-over full sync wait until the cancelled quick sync has
        // actually wound down
        let _serial = self.busy.lock().await;

        let password = resolve_password(config)?;
        let account = SyncAccount {
            provider: config.sync.provider,
            base_url: config.sync.server.clone(),
            username: config.sync.username.clone(),
            device_id: config.sync.device_id.clone(),
            password,
        };

        let mut options = options;
        match mode {
            SyncMode::Regular => {}
            SyncMode::Quick => options.quick = true,
            SyncMode::Force => {
                debug!("forced sync, dropping all watermarks");
                self.repo.clear_sync_timestamps().await?;
                options.quick = false;
                options.force = true;
            }
            SyncMode::PushAll => {
                self.seed_play_actions().await?;
                options.quick = true;
            }
        }

        run_sync_job(http, &self.repo, &account, &options, &self.bus, cancel).await
    }

    /// Add a feed locally and queue the subscription for upload
    pub async fn subscribe(&self, config: &Config, url: &str) -> Result<(), SyncError> {
        self.repo
            .insert_feed(url.to_string(), Utc::now().timestamp(), true)
            .await?;
        if config.sync.enabled {
            record_feed_action(&self.repo, url, SubscriptionAction::Add).await?;
        }
        Ok(())
    }

    /// Remove a feed locally and queue the removal for upload
    pub async fn unsubscribe(&self, config: &Config, url: &str) -> Result<(), SyncError> {
        self.repo.delete_feed(url.to_string()).await?;
        if config.sync.enabled {
            record_feed_action(&self.repo, url, SubscriptionAction::Remove).await?;
        }
        Ok(())
    }

    /// Turn the local play state of every episode into pending play
    /// actions, so the next upload mirrors this device onto the server
    async fn seed_play_actions(&self) -> Result<(), SyncError> {
        let states = self.repo.all_local_episode_states().await?;
        let now = Utc::now().timestamp();

        let mut actions = Vec::new();
        for state in states {
            let (position, total) = if state.read {
                (state.duration, state.duration)
            } else if state.position > 0 {
                (state.position, state.duration)
            } else {
                continue;
            };
            actions.push(EpisodeAction {
                podcast: state.feed_url,
                url: state.enclosure_url,
                id: state.entry_id,
                action: EpisodeActionKind::Play,
                started: 0,
                position,
                total,
                timestamp: now,
            });
        }

        debug!(count = actions.len(), "seeded play actions from local state");
        if !actions.is_empty() {
            self.repo.add_episode_actions(actions).await?;
        }
        Ok(())
    }
}

/// Keep a previously configured device id, otherwise mint one unique
/// to this installation
fn select_device_id(configured: &str) -> String {
    if configured.is_empty() {
        format!("castsync-{:x}", Utc::now().timestamp())
    } else {
        configured.to_string()
    }
}
