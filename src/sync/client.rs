// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;

use crate::error::SyncError;
use crate::http::{BasicAuth, HttpClient, HttpResponse};
use crate::storage::{EpisodeAction, EpisodeActionKind};

/// Which kind of gpodder-compatible server to talk to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// gpodder.net or another server speaking its REST API
    #[default]
    GPodderNet,
    /// Nextcloud with the gpoddersync app
    GPodderNextcloud,
}

impl Provider {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::GPodderNet => "https://gpodder.net",
            Provider::GPodderNextcloud => "",
        }
    }
}

/// Server-side subscription changes since a watermark
#[derive(Debug, Clone, Default)]
pub struct SubscriptionDelta {
    pub add: Vec<String>,
    pub remove: Vec<String>,
    pub timestamp: i64,
}

/// Result of uploading subscription changes
#[derive(Debug, Clone, Default)]
pub struct SubscriptionUploadResult {
    pub timestamp: i64,
    /// Pairs of (uploaded url, rewritten url) the server wants us to use
    pub update_urls: Vec<(String, String)>,
}

/// One page of server-side episode actions
#[derive(Debug, Clone, Default)]
pub struct EpisodeActionPage {
    pub actions: Vec<EpisodeAction>,
    pub timestamp: i64,
}

/// A registered device on the sync server
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Client for one account on a gpodder-compatible server.
///
/// URL shapes and payloads differ per provider; everything else is
/// shared. All requests carry HTTP Basic auth.
pub struct GpodderClient<'a, C: HttpClient + ?Sized> {
    http: &'a C,
    provider: Provider,
    base_url: String,
    username: String,
    device_id: String,
    auth: BasicAuth,
}

impl<'a, C: HttpClient + ?Sized> GpodderClient<'a, C> {
    pub fn new(
        http: &'a C,
        provider: Provider,
        base_url: &str,
        username: &str,
        device_id: &str,
        password: &str,
    ) -> Self {
        let base = if base_url.is_empty() {
            provider.default_base_url().to_string()
        } else {
            base_url.trim_end_matches('/').to_string()
        };
        Self {
            http,
            provider,
            base_url: base,
            username: username.to_string(),
            device_id: device_id.to_string(),
            auth: BasicAuth {
                username: username.to_string(),
                password: password.to_string(),
            },
        }
    }

    /// Verify the credentials. gpodder.net has a dedicated login
    /// endpoint; Nextcloud gets a harmless read to check credentials.
    pub async fn login(&self) -> Result<(), SyncError> {
        match self.provider {
            Provider::GPodderNet => {
                let url = format!(
                    "{}/api/2/auth/{}/login.json",
                    self.base_url, self.username
                );
                let response = self.post(&url, &json!({})).await?;
                self.check_status(&url, &response)?;
                Ok(())
            }
            Provider::GPodderNextcloud => {
                let url = format!(
                    "{}/index.php/apps/gpoddersync/subscriptions?since=0",
                    self.base_url
                );
                let response = self.get(&url).await?;
                self.check_status(&url, &response)?;
                Ok(())
            }
        }
    }

    /// List devices registered for this account (gpodder.net only)
    pub async fn devices(&self) -> Result<Vec<Device>, SyncError> {
        if self.provider != Provider::GPodderNet {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/2/devices/{}.json", self.base_url, self.username);
        let response = self.get(&url).await?;
        self.check_status(&url, &response)?;
        parse_body(&url, &response.body)
    }

    /// Create or rename a device (gpodder.net only)
    pub async fn update_device(&self, id: &str, caption: &str) -> Result<(), SyncError> {
        if self.provider != Provider::GPodderNet {
            return Ok(());
        }
        let url = format!(
            "{}/api/2/devices/{}/{}.json",
            self.base_url, self.username, id
        );
        let body = json!({ "caption": caption, "type": "laptop" });
        let response = self.post(&url, &body).await?;
        self.check_status(&url, &response)?;
        Ok(())
    }

    /// Put all given devices into one synchronization group
    /// (gpodder.net only)
    pub async fn link_devices(&self, device_ids: &[String]) -> Result<(), SyncError> {
        if self.provider != Provider::GPodderNet || device_ids.len() < 2 {
            return Ok(());
        }
        let url = format!(
            "{}/api/2/sync-devices/{}.json",
            self.base_url, self.username
        );
        let body = json!({ "synchronize": [device_ids] });
        let response = self.post(&url, &body).await?;
        self.check_status(&url, &response)?;
        Ok(())
    }

    pub async fn download_subscription_changes(
        &self,
        since: i64,
    ) -> Result<SubscriptionDelta, SyncError> {
        let url = match self.provider {
            Provider::GPodderNet => format!(
                "{}/api/2/subscriptions/{}/{}.json?since={}",
                self.base_url, self.username, self.device_id, since
            ),
            Provider::GPodderNextcloud => format!(
                "{}/index.php/apps/gpoddersync/subscriptions?since={}",
                self.base_url, since
            ),
        };
        let response = self.get(&url).await?;
        self.check_status(&url, &response)?;

        let wire: SubscriptionDeltaWire = parse_body(&url, &response.body)?;
        Ok(SubscriptionDelta {
            add: wire.add,
            remove: wire.remove,
            timestamp: wire.timestamp,
        })
    }

    pub async fn upload_subscription_changes(
        &self,
        add: &[String],
        remove: &[String],
    ) -> Result<SubscriptionUploadResult, SyncError> {
        let url = match self.provider {
            Provider::GPodderNet => format!(
                "{}/api/2/subscriptions/{}/{}.json",
                self.base_url, self.username, self.device_id
            ),
            Provider::GPodderNextcloud => format!(
                "{}/index.php/apps/gpoddersync/subscription_change/create",
                self.base_url
            ),
        };
        let body = json!({ "add": add, "remove": remove });
        let response = self.post(&url, &body).await?;
        self.check_status(&url, &response)?;

        let wire: SubscriptionUploadWire = parse_body(&url, &response.body)?;
        Ok(SubscriptionUploadResult {
            timestamp: wire.timestamp,
            update_urls: wire.update_urls,
        })
    }

    pub async fn download_episode_actions(
        &self,
        since: i64,
    ) -> Result<EpisodeActionPage, SyncError> {
        let url = match self.provider {
            Provider::GPodderNet => format!(
                "{}/api/2/episodes/{}.json?since={}&aggregated=true",
                self.base_url, self.username, since
            ),
            Provider::GPodderNextcloud => format!(
                "{}/index.php/apps/gpoddersync/episode_action?since={}",
                self.base_url, since
            ),
        };
        let response = self.get(&url).await?;
        self.check_status(&url, &response)?;

        let wire: EpisodeActionPageWire = parse_body(&url, &response.body)?;
        let actions = wire
            .actions
            .into_iter()
            .filter_map(wire_action_to_model)
            .collect();
        Ok(EpisodeActionPage {
            actions,
            timestamp: wire.timestamp,
        })
    }

    /// Upload one batch of episode actions; callers are responsible for
    /// keeping batches within the server limit
    pub async fn upload_episode_actions(
        &self,
        actions: &[EpisodeAction],
    ) -> Result<i64, SyncError> {
        let url = match self.provider {
            Provider::GPodderNet => {
                format!("{}/api/2/episodes/{}.json", self.base_url, self.username)
            }
            Provider::GPodderNextcloud => format!(
                "{}/index.php/apps/gpoddersync/episode_action/create",
                self.base_url
            ),
        };

        let body: Vec<serde_json::Value> = actions
            .iter()
            .map(|action| {
                let mut obj = json!({
                    "podcast": action.podcast,
                    "episode": action.url,
                    "device": self.device_id,
                    "action": action.action.as_str(),
                    "timestamp": format_action_timestamp(action.timestamp),
                });
                if action.action == EpisodeActionKind::Play {
                    obj["started"] = json!(action.started);
                    obj["position"] = json!(action.position);
                    obj["total"] = json!(action.total);
                }
                obj
            })
            .collect();

        let response = self.post(&url, &serde_json::Value::Array(body)).await?;
        self.check_status(&url, &response)?;

        let wire: EpisodeUploadWire = parse_body(&url, &response.body)?;
        Ok(wire.timestamp)
    }

    async fn get(&self, url: &str) -> Result<HttpResponse, SyncError> {
        self.http
            .get(url, Some(&self.auth))
            .await
            .map_err(|e| SyncError::RequestFailed {
                url: url.to_string(),
                source: e,
            })
    }

    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, SyncError> {
        self.http
            .post_json(url, body, Some(&self.auth))
            .await
            .map_err(|e| SyncError::RequestFailed {
                url: url.to_string(),
                source: e,
            })
    }

    fn check_status(&self, url: &str, response: &HttpResponse) -> Result<(), SyncError> {
        match response.status {
            200..=299 => Ok(()),
            401 | 403 => Err(SyncError::Unauthorized {
                username: self.username.clone(),
            }),
            status => Err(SyncError::ServerStatus {
                url: url.to_string(),
                status,
            }),
        }
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, SyncError> {
    serde_json::from_slice(body).map_err(|e| SyncError::MalformedResponse {
        url: url.to_string(),
        source: e,
    })
}

#[derive(Debug, Deserialize)]
struct SubscriptionDeltaWire {
    #[serde(default)]
    add: Vec<String>,
    #[serde(default)]
    remove: Vec<String>,
    #[serde(default)]
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct SubscriptionUploadWire {
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    update_urls: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct EpisodeActionPageWire {
    #[serde(default)]
    actions: Vec<WireEpisodeAction>,
    #[serde(default)]
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct WireEpisodeAction {
    #[serde(default)]
    podcast: String,
    #[serde(default)]
    episode: String,
    #[serde(default)]
    guid: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    started: i64,
    #[serde(default)]
    position: i64,
    #[serde(default)]
    total: i64,
}

#[derive(Debug, Deserialize)]
struct EpisodeUploadWire {
    #[serde(default)]
    timestamp: i64,
}

fn wire_action_to_model(wire: WireEpisodeAction) -> Option<EpisodeAction> {
    let action = EpisodeActionKind::parse(&wire.action.to_lowercase())?;
    Some(EpisodeAction {
        podcast: wire.podcast,
        url: wire.episode,
        id: wire.guid,
        action,
        started: wire.started,
        position: wire.position,
        total: wire.total,
        timestamp: parse_action_timestamp(&wire.timestamp).unwrap_or(0),
    })
}

/// Parse `2024-01-02T03:04:05`, tolerating a fractional-seconds suffix
/// and a trailing `Z`
pub fn parse_action_timestamp(value: &str) -> Option<i64> {
    let value = value.trim().trim_end_matches('Z');
    let value = value.split('.').next()?;
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// Format an epoch timestamp the way the servers expect: ISO-8601 UTC
/// with the trailing `Z` removed
pub fn format_action_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;

    struct RecordingClient {
        requests: Mutex<Vec<(String, Option<serde_json::Value>)>>,
        responses: Mutex<Vec<(u16, String)>>,
    }

    impl RecordingClient {
        fn new(responses: Vec<(u16, &str)>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .rev()
                        .map(|(status, body)| (status, body.to_string()))
                        .collect(),
                ),
            }
        }

        fn next_response(&self) -> (u16, String) {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or((200, "{}".to_string()))
        }

        fn recorded(&self) -> Vec<(String, Option<serde_json::Value>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for RecordingClient {
        async fn get(
            &self,
            url: &str,
            _auth: Option<&BasicAuth>,
        ) -> Result<HttpResponse, reqwest::Error> {
            self.requests.lock().unwrap().push((url.to_string(), None));
            let (status, body) = self.next_response();
            Ok(HttpResponse {
                status,
                body: Bytes::from(body),
            })
        }

        async fn post_json(
            &self,
            url: &str,
            body: &serde_json::Value,
            _auth: Option<&BasicAuth>,
        ) -> Result<HttpResponse, reqwest::Error> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), Some(body.clone())));
            let (status, body) = self.next_response();
            Ok(HttpResponse {
                status,
                body: Bytes::from(body),
            })
        }
    }

    fn make_client(http: &RecordingClient, provider: Provider) -> GpodderClient<'_, RecordingClient> {
        GpodderClient::new(http, provider, "", "alice", "dev-1", "secret")
    }

    #[tokio::test]
    async fn gpodder_subscription_download_url_and_parse() {
        let http = RecordingClient::new(vec![(
            200,
            r#"{"add": ["https://a.example/feed"], "remove": [], "timestamp": 1234}"#,
        )]);
        let client = make_client(&http, Provider::GPodderNet);

        let delta = client.download_subscription_changes(77).await.unwrap();
        assert_eq!(delta.add, vec!["https://a.example/feed"]);
        assert_eq!(delta.timestamp, 1234);

        let requests = http.recorded();
        assert_eq!(
            requests[0].0,
            "https://gpodder.net/api/2/subscriptions/alice/dev-1.json?since=77"
        );
    }

    #[tokio::test]
    async fn nextcloud_urls_use_the_app_prefix() {
        let http = RecordingClient::new(vec![(200, r#"{"actions": [], "timestamp": 0}"#)]);
        let client = GpodderClient::new(
            &http,
            Provider::GPodderNextcloud,
            "https://cloud.example/",
            "alice",
            "dev-1",
            "secret",
        );

        client.download_episode_actions(5).await.unwrap();
        let requests = http.recorded();
        assert_eq!(
            requests[0].0,
            "https://cloud.example/index.php/apps/gpoddersync/episode_action?since=5"
        );
    }

    #[tokio::test]
    async fn upload_subscriptions_sends_add_remove_payload() {
        let http = RecordingClient::new(vec![(
            200,
            r#"{"timestamp": 99, "update_urls": [["http://old", "http://new"]]}"#,
        )]);
        let client = make_client(&http, Provider::GPodderNet);

        let result = client
            .upload_subscription_changes(
                &["http://a".to_string()],
                &["http://b".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(result.timestamp, 99);
        assert_eq!(
            result.update_urls,
            vec![("http://old".to_string(), "http://new".to_string())]
        );

        let requests = http.recorded();
        let body = requests[0].1.as_ref().unwrap();
        assert_eq!(body["add"][0], "http://a");
        assert_eq!(body["remove"][0], "http://b");
    }

    #[tokio::test]
    async fn upload_play_action_carries_positions_and_chopped_timestamp() {
        let http = RecordingClient::new(vec![(200, r#"{"timestamp": 50}"#)]);
        let client = make_client(&http, Provider::GPodderNet);

        let action = EpisodeAction {
            podcast: "https://a.example/feed".to_string(),
            url: "https://a.example/ep.mp3".to_string(),
            id: "ep-1".to_string(),
            action: EpisodeActionKind::Play,
            started: 0,
            position: 120,
            total: 600,
            timestamp: 1704164645, // 2024-01-02T03:04:05Z
        };
        let ts = client.upload_episode_actions(&[action]).await.unwrap();
        assert_eq!(ts, 50);

        let requests = http.recorded();
        let body = requests[0].1.as_ref().unwrap();
        assert_eq!(body[0]["action"], "play");
        assert_eq!(body[0]["position"], 120);
        assert_eq!(body[0]["timestamp"], "2024-01-02T03:04:05");
        assert_eq!(body[0]["device"], "dev-1");
    }

    #[tokio::test]
    async fn unauthorized_status_maps_to_unauthorized() {
        let http = RecordingClient::new(vec![(401, "{}")]);
        let client = make_client(&http, Provider::GPodderNet);

        let result = client.login().await;
        assert!(matches!(result, Err(SyncError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn server_error_maps_to_status() {
        let http = RecordingClient::new(vec![(500, "oops")]);
        let client = make_client(&http, Provider::GPodderNet);

        let result = client.download_subscription_changes(0).await;
        assert!(matches!(
            result,
            Err(SyncError::ServerStatus { status: 500, .. })
        ));
    }

    #[test]
    fn action_timestamp_parse_strips_fraction_and_zone() {
        assert_eq!(
            parse_action_timestamp("2024-01-02T03:04:05.678Z"),
            Some(1704164645)
        );
        assert_eq!(
            parse_action_timestamp("2024-01-02T03:04:05"),
            Some(1704164645)
        );
        assert_eq!(parse_action_timestamp("not a date"), None);
    }

    #[test]
    fn action_timestamp_round_trips_without_zone_suffix() {
        let formatted = format_action_timestamp(1704164645);
        assert_eq!(formatted, "2024-01-02T03:04:05");
        assert!(!formatted.ends_with('Z'));
        assert_eq!(parse_action_timestamp(&formatted), Some(1704164645));
    }
}
