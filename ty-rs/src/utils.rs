//! Shared utilities for the ty-rs CLI

use chrono::{Local, TimeZone};
use humansize::{DECIMAL, format_size};

/// Format file size in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes, DECIMAL)
}

/// Format an archive timestamp
pub fn format_timestamp(timestamp: u32) -> String {
    if timestamp == 0 {
        "N/A".to_string()
    } else {
        match Local.timestamp_opt(i64::from(timestamp), 0) {
            chrono::LocalResult::Single(datetime) => {
                datetime.format("%Y-%m-%d %H:%M:%S").to_string()
            }
            _ => "Invalid timestamp".to_string(),
        }
    }
}

/// Match a file name against a pattern with `*` wildcards
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name = name.to_lowercase();
    let pattern = pattern.to_lowercase();

    if !pattern.contains('*') {
        return name.contains(&pattern);
    }

    let mut rest = name.as_str();
    let anchored_start = !pattern.starts_with('*');
    for (i, part) in pattern.split('*').filter(|p| !p.is_empty()).enumerate() {
        match rest.find(part) {
            Some(pos) => {
                if i == 0 && anchored_start && pos != 0 {
                    return false;
                }
                rest = &rest[pos + part.len()..];
            }
            None => return false,
        }
    }
    if !pattern.ends_with('*') {
        if let Some(last) = pattern.split('*').filter(|p| !p.is_empty()).next_back() {
            return name.ends_with(last);
        }
    }
    true
}
