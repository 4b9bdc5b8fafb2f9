// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use castsync::feed::ProcessOptions;
use castsync::sync::SyncJobOptions;
use castsync::{
    Config, Event, EventBus, FeedOutcome, RefreshGuard, RefreshOptions, Repository, ReqwestClient,
    SyncCoordinator, SyncMode, refresh_feeds,
};

/// Podcast feed synchronization engine
#[derive(Parser, Debug)]
#[command(name = "castsync")]
#[command(about = "Synchronize podcast feeds and playback state")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch all subscribed feeds and reconcile them into the store
    Refresh,

    /// Run a sync job against the configured gpodder server
    Sync {
        /// Upload-only sync, skip downloads
        #[arg(long, conflicts_with_all = ["force", "push_all"])]
        quick: bool,

        /// Drop all watermarks and sync from scratch
        #[arg(long, conflicts_with = "push_all")]
        force: bool,

        /// Upload the play state of every local episode
        #[arg(long)]
        push_all: bool,
    },

    /// Configure a sync account and register this device
    Login {
        /// Server base URL; empty uses the provider default
        #[arg(long, default_value = "")]
        server: String,

        username: String,

        /// Password; read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Disable sync and remove the stored password
    Logout,

    /// List devices registered on the sync server
    Devices,

    /// Subscribe to a feed
    Subscribe { url: String },

    /// Unsubscribe from a feed
    Unsubscribe { url: String },

    /// List subscribed feeds
    List,

    /// Show recently recorded errors
    Errors {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = Config::load().context("Failed to load configuration")?;
    let repo = Arc::new(
        Repository::open(&config.db_path)
            .await
            .context("Failed to open the feed store")?,
    );
    let client = ReqwestClient::new();
    let bus = EventBus::new();
    let printer = spawn_event_printer(&bus);

    match args.command {
        Command::Refresh => {
            let urls = repo.subscribed_urls().await?;
            let result = refresh_feeds(
                &client,
                &repo,
                urls,
                &refresh_options(&config),
                &bus,
                &CancellationToken::new(),
            )
            .await;

            println!(
                "Refreshed {} feeds: {} updated, {} unchanged, {} failed",
                result.updated + result.unchanged + result.failed,
                result.updated,
                result.unchanged,
                result.failed,
            );
            for (url, message) in &result.failed_feeds {
                eprintln!("  {url}: {message}");
            }
            if result.failed > 0 && result.updated + result.unchanged == 0 {
                std::process::exit(1);
            }
        }

        Command::Sync {
            quick,
            force,
            push_all,
        } => {
            let mode = if push_all {
                SyncMode::PushAll
            } else if force {
                SyncMode::Force
            } else if quick {
                SyncMode::Quick
            } else {
                SyncMode::Regular
            };

            let coordinator = SyncCoordinator::new(repo.clone(), bus.clone());
            let options = SyncJobOptions {
                quick: false,
                force: false,
                completion_threshold_secs: config.completion_threshold_secs as i64,
                refresh: refresh_options(&config),
            };
            let report = coordinator
                .request_sync(&client, &mut config, mode, options)
                .await
                .context("Sync failed")?;

            println!(
                "Sync finished: {} subscriptions added, {} removed, {} actions applied, {} uploaded",
                report.subscriptions_added,
                report.subscriptions_removed,
                report.actions_applied,
                report.actions_uploaded,
            );
        }

        Command::Login {
            server,
            username,
            password,
        } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password()?,
            };
            let coordinator = SyncCoordinator::new(repo.clone(), bus.clone());
            coordinator
                .login(&client, &mut config, &server, &username, &password)
                .await
                .context("Login failed")?;
            println!("Logged in as {username}, device {}", config.sync.device_id);
        }

        Command::Logout => {
            let coordinator = SyncCoordinator::new(repo.clone(), bus.clone());
            coordinator
                .logout(&mut config)
                .await
                .context("Logout failed")?;
            println!("Sync disabled");
        }

        Command::Devices => {
            if !config.sync.enabled {
                anyhow::bail!("No sync account is configured");
            }
            let password = castsync::sync::credentials::resolve_password(&mut config)?;
            let gpodder = castsync::sync::GpodderClient::new(
                &client,
                config.sync.provider,
                &config.sync.server,
                &config.sync.username,
                &config.sync.device_id,
                &password,
            );
            for device in gpodder.devices().await? {
                let marker = if device.id == config.sync.device_id {
                    " (this device)"
                } else {
                    ""
                };
                println!("{}\t{}{marker}", device.id, device.caption);
            }
        }

        Command::Subscribe { url } => {
            let coordinator = SyncCoordinator::new(repo.clone(), bus.clone());
            coordinator.subscribe(&config, &url).await?;
            println!("Subscribed to {url}");
        }

        Command::Unsubscribe { url } => {
            let coordinator = SyncCoordinator::new(repo.clone(), bus.clone());
            coordinator.unsubscribe(&config, &url).await?;
            println!("Unsubscribed from {url}");
        }

        Command::List => {
            for feed in repo.all_feeds().await? {
                let name = if feed.name.is_empty() {
                    feed.url.as_str()
                } else {
                    feed.name.as_str()
                };
                println!("{name}\t{}", feed.url);
            }
        }

        Command::Errors { limit } => {
            for entry in repo.recent_errors(limit).await? {
                println!(
                    "{}\t[{}]\t{}\t{}",
                    entry.timestamp, entry.context, entry.url, entry.message
                );
            }
        }
    }

    drop(bus);
    let _ = printer.await;
    Ok(())
}

fn refresh_options(config: &Config) -> RefreshOptions {
    RefreshOptions {
        max_concurrent: config.update_concurrency,
        guard: RefreshGuard::new(),
        process: ProcessOptions {
            mark_unread_on_new_feed: config.mark_unread_on_new_feed,
            enclosure_dir: config.enclosure_dir.clone(),
        },
    }
}

fn prompt_password() -> Result<String> {
    eprint!("Password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Print progress to stderr while commands run. Ends once every bus
/// handle is dropped.
fn spawn_event_printer(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Event::FeedFinished { url, outcome }) => match outcome {
                    FeedOutcome::Updated { new_entries } if new_entries > 0 => {
                        eprintln!("  {url}: {new_entries} new");
                    }
                    FeedOutcome::Failed { message } => {
                        eprintln!("  {url}: failed ({message})");
                    }
                    _ => {}
                },
                Ok(Event::SyncPhase { phase }) => {
                    eprintln!("  sync: {phase}");
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
