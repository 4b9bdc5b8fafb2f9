// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Parse a clock-style duration like `1:02:03` or `02:03.500` into whole
/// seconds. Fractional parts are truncated; at most three colon-separated
/// groups are accepted.
pub fn parse_clock_duration(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    let mut acc: i64 = 0;
    for part in parts {
        let whole = part.split('.').next().unwrap_or("");
        let n: i64 = whole.parse().ok()?;
        acc = n + acc * 60;
    }
    Some(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hours_minutes_seconds() {
        assert_eq!(parse_clock_duration("1:02:03"), Some(3723));
    }

    #[test]
    fn truncates_fractional_seconds() {
        assert_eq!(parse_clock_duration("02:03.500"), Some(123));
    }

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(parse_clock_duration("90"), Some(90));
        assert_eq!(parse_clock_duration("90.9"), Some(90));
    }

    #[test]
    fn rejects_junk() {
        assert_eq!(parse_clock_duration(""), None);
        assert_eq!(parse_clock_duration("abc"), None);
        assert_eq!(parse_clock_duration("1:2:3:4"), None);
    }
}
