// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::Path;

/// Maximum length of a generated feed directory name
const MAX_DIRNAME_LENGTH: usize = 200;

/// Check if a character may appear in a feed directory name
fn is_valid_dirname_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '(' | ')' | '-')
}

/// Sanitize a feed title into a directory name.
///
/// Disallowed characters are removed, whitespace runs collapse into a
/// single space, and the result is trimmed and length-capped. Titles
/// that sanitize to nothing become `Noname`.
pub fn sanitize_dirname(title: &str) -> String {
    let kept: String = title.chars().filter(|c| is_valid_dirname_char(*c)).collect();

    let simplified = kept.split_whitespace().collect::<Vec<_>>().join(" ");

    let capped: String = simplified.chars().take(MAX_DIRNAME_LENGTH).collect();
    let trimmed = capped.trim();

    if trimmed.is_empty() {
        "Noname".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Generate a unique directory name for a feed.
///
/// Starts from the sanitized title and appends ` (n)` until the name
/// collides with neither an existing store dirname nor a directory on
/// disk under `base_dir`.
pub fn generate_feed_dirname(
    title: &str,
    taken: &HashSet<String>,
    base_dir: &Path,
) -> String {
    let base = sanitize_dirname(title);

    let mut candidate = base.clone();
    let mut suffix = 0u32;
    while taken.contains(&candidate) || base_dir.join(&candidate).exists() {
        suffix += 1;
        candidate = format!("{base} ({suffix})");
    }
    candidate
}
