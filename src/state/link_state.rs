//! Link type and checking state definitions
//!
//! A link is created `Unchecked` when its run is materialized and moves to
//! `Checked` exactly once.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a URL plays in a catalog record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Landing page of the object at the data provider
    ShownAt,

    /// Direct link to the media file
    ShownBy,
}

impl LinkType {
    /// Converts the link type to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::ShownAt => "shown_at",
            Self::ShownBy => "shown_by",
        }
    }

    /// Parses a link type from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "shown_at" => Some(Self::ShownAt),
            "shown_by" => Some(Self::ShownBy),
            _ => None,
        }
    }

    /// Returns all link types in creation order
    pub fn all_types() -> [Self; 2] {
        [Self::ShownAt, Self::ShownBy]
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Outcome of checking a link
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CheckingResult {
    /// Not probed yet
    #[default]
    Unchecked,

    /// Probed; `error` is None when the link was reachable
    Checked {
        error: Option<String>,
        checked_at: DateTime<Utc>,
    },
}

impl CheckingResult {
    /// Builds a result from the nullable storage columns
    ///
    /// A row without `checked_at` is unchecked regardless of `error`.
    pub fn from_columns(error: Option<String>, checked_at: Option<DateTime<Utc>>) -> Self {
        match checked_at {
            Some(checked_at) => Self::Checked { error, checked_at },
            None => Self::Unchecked,
        }
    }

    pub fn is_checked(&self) -> bool {
        matches!(self, Self::Checked { .. })
    }

    /// Returns true if the link was checked and found unreachable
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Checked { error: Some(_), .. })
    }

    /// Returns the recorded error message, if any
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Checked { error, .. } => error.as_deref(),
            Self::Unchecked => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_type_db_string() {
        assert_eq!(LinkType::ShownAt.to_db_string(), "shown_at");
        assert_eq!(LinkType::ShownBy.to_db_string(), "shown_by");
        assert_eq!(LinkType::from_db_string("shown_by"), Some(LinkType::ShownBy));
        assert_eq!(LinkType::from_db_string("is_shown_at"), None);
    }

    #[test]
    fn test_link_type_display() {
        assert_eq!(format!("{}", LinkType::ShownAt), "shown_at");
    }

    #[test]
    fn test_from_columns_without_timestamp_is_unchecked() {
        let result = CheckingResult::from_columns(Some("stale".to_string()), None);
        assert_eq!(result, CheckingResult::Unchecked);
        assert!(!result.is_checked());
    }

    #[test]
    fn test_checked_failure() {
        let result = CheckingResult::from_columns(Some("HTTP 404".to_string()), Some(Utc::now()));
        assert!(result.is_checked());
        assert!(result.is_failure());
        assert_eq!(result.error(), Some("HTTP 404"));
    }

    #[test]
    fn test_checked_success() {
        let result = CheckingResult::from_columns(None, Some(Utc::now()));
        assert!(result.is_checked());
        assert!(!result.is_failure());
        assert_eq!(result.error(), None);
    }
}
