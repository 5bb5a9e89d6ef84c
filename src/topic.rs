//! Topic name and topic filter handling
//!
//! Implements standard topic-filter semantics: `+` matches exactly one level,
//! `#` matches the remaining levels (including the parent level itself), and
//! wildcards never match topics whose first level starts with `$`.

use crate::error::SessionError;
use std::fmt;

/// A validated topic filter, possibly containing `+`/`#` wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    raw: String,
}

impl TopicFilter {
    /// Parse and validate a topic filter.
    ///
    /// Fails when the filter is empty, contains a NUL byte, uses `+` as part
    /// of a level rather than a whole level, or places `#` anywhere but as the
    /// final whole level.
    pub fn parse(filter: &str) -> Result<Self, SessionError> {
        if filter.is_empty() {
            return Err(SessionError::invalid_topic(filter, "empty filter"));
        }
        if filter.contains('\0') {
            return Err(SessionError::invalid_topic(filter, "contains NUL byte"));
        }

        let levels: Vec<&str> = filter.split('/').collect();
        let last = levels.len() - 1;
        for (i, level) in levels.iter().enumerate() {
            if level.contains('+') && *level != "+" {
                return Err(SessionError::invalid_topic(
                    filter,
                    "'+' must occupy an entire level",
                ));
            }
            if level.contains('#') {
                if *level != "#" {
                    return Err(SessionError::invalid_topic(
                        filter,
                        "'#' must occupy an entire level",
                    ));
                }
                if i != last {
                    return Err(SessionError::invalid_topic(
                        filter,
                        "'#' must be the final level",
                    ));
                }
            }
        }

        Ok(Self {
            raw: filter.to_string(),
        })
    }

    /// The filter text as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this filter contains a `+` or `#` wildcard.
    pub fn has_wildcards(&self) -> bool {
        self.raw
            .split('/')
            .any(|level| level == "+" || level == "#")
    }

    /// Match an inbound topic name against this filter.
    pub fn matches(&self, topic: &str) -> bool {
        // Topics starting with '$' are not matched by wildcards at the root
        // level (MQTT-4.7.2-1).
        if topic.starts_with('$') && (self.raw.starts_with('+') || self.raw.starts_with('#')) {
            return false;
        }

        let mut filter_levels = self.raw.split('/');
        let mut topic_levels = topic.split('/');

        loop {
            match (filter_levels.next(), topic_levels.next()) {
                // '#' covers the remaining levels and the parent level itself.
                (Some("#"), _) => return true,
                (Some("+"), Some(_)) => continue,
                (Some(f), Some(t)) if f == t => continue,
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Validate a topic name used as a publish target.
///
/// Publish topics must be non-empty and must not contain wildcards or NUL.
pub fn validate_topic_name(topic: &str) -> Result<(), SessionError> {
    if topic.is_empty() {
        return Err(SessionError::invalid_topic(topic, "empty topic"));
    }
    if topic.contains('\0') {
        return Err(SessionError::invalid_topic(topic, "contains NUL byte"));
    }
    if topic.contains('+') || topic.contains('#') {
        return Err(SessionError::invalid_topic(
            topic,
            "wildcards are not allowed in a publish topic",
        ));
    }
    Ok(())
}
