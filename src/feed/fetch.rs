// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Bytes, FeedError> {
    Url::parse(url)?;
    let response = client
        .get(url, None)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;
    if !(200..300).contains(&response.status) {
        return Err(FeedError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }
    Ok(response.body)
}

/// SHA-256 of the raw feed bytes, hex-encoded.
///
/// Compared against the stored hash to skip reprocessing unchanged feeds.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}
