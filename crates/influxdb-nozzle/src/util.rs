// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Utility functions shared by the configuration layer and the line protocol encoder.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// Parses an operator supplied list setting.
///
/// The value is first read as a JSON array of strings (`["ip", "job"]`). If that fails, it is
/// split on commas with surrounding whitespace removed (`ip, job`). Empty items are dropped.
///
/// # Examples
///
/// ```
/// use influxdb_nozzle::util::parse_list;
///
/// assert_eq!(parse_list(r#"["ip","job"]"#), vec!["ip", "job"]);
/// assert_eq!(parse_list("ip , job"), vec!["ip", "job"]);
/// assert!(parse_list("").is_empty());
/// ```
pub fn parse_list(raw: &str) -> Vec<String> {
    if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
        return items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
    }

    tracing::debug!("List setting is not a JSON array, splitting on commas: '{}'", raw);
    list_delimiter()
        .split(raw.trim())
        .map(|item| item.trim_matches(|c| c == '"' || c == '[' || c == ']'))
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn list_delimiter() -> &'static Regex {
    static DELIMITER: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    DELIMITER.get_or_init(|| Regex::new(r"\s*,\s*").expect("invalid list delimiter pattern"))
}

/// Escapes a measurement name for line protocol: commas and spaces are backslash escaped.
///
/// Line breaks cannot be represented and are replaced with an (escaped) space.
pub fn escape_measurement(value: &str) -> Cow<'_, str> {
    escape_identifier(value, &[',', ' '])
}

/// Escapes a tag key or tag value for line protocol.
///
/// Commas, equals signs and spaces are backslash escaped and line breaks become escaped spaces.
/// Values without any of those characters are returned unchanged without allocating.
pub fn escape_tag(value: &str) -> Cow<'_, str> {
    escape_identifier(value, &[',', '=', ' '])
}

/// Escapes the contents of a double-quoted string field value.
pub fn escape_string_field(value: &str) -> Cow<'_, str> {
    if !value.contains(['"', '\\']) {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 4);
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    Cow::Owned(escaped)
}

fn is_line_break(ch: char) -> bool {
    ch == '\n' || ch == '\r'
}

/// A backslash consumes the character after it when the line is parsed, so a run of backslashes
/// that precedes a delimiter or ends the value is padded to an even length. Otherwise the
/// delimiter after it would be swallowed.
fn escape_identifier<'a>(value: &'a str, special: &[char]) -> Cow<'a, str> {
    if !value.contains(|c: char| special.contains(&c) || is_line_break(c) || c == '\\') {
        return Cow::Borrowed(value);
    }

    let mut escaped = String::with_capacity(value.len() + 4);
    let mut chars = value
        .chars()
        .map(|c| if is_line_break(c) { ' ' } else { c })
        .peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let mut run = 1;
            while chars.next_if_eq(&'\\').is_some() {
                run += 1;
            }
            let before_delimiter = chars.peek().map_or(true, |next| special.contains(next));
            if before_delimiter && run % 2 == 1 {
                run += 1;
            }
            escaped.extend(std::iter::repeat('\\').take(run));
            continue;
        }
        if special.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    Cow::Owned(escaped)
}
