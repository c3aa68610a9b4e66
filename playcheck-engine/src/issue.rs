//! Closed issue taxonomy and the substring classifier that maps raw error
//! messages onto it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    LoadTimeout,
    ActionTimeout,
    ActionFailed,
    ScreenshotFailed,
    LogFailed,
    BrowserCrash,
    SelectorNotFound,
    HeadlessIncompatibility,
    TotalTimeout,
}

impl IssueType {
    pub const ALL: [Self; 9] = [
        Self::LoadTimeout,
        Self::ActionTimeout,
        Self::ActionFailed,
        Self::ScreenshotFailed,
        Self::LogFailed,
        Self::BrowserCrash,
        Self::SelectorNotFound,
        Self::HeadlessIncompatibility,
        Self::TotalTimeout,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoadTimeout => "load_timeout",
            Self::ActionTimeout => "action_timeout",
            Self::ActionFailed => "action_failed",
            Self::ScreenshotFailed => "screenshot_failed",
            Self::LogFailed => "log_failed",
            Self::BrowserCrash => "browser_crash",
            Self::SelectorNotFound => "selector_not_found",
            Self::HeadlessIncompatibility => "headless_incompatibility",
            Self::TotalTimeout => "total_timeout",
        }
    }

    /// Penalty weight used by the heuristic scorer.
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::BrowserCrash | Self::TotalTimeout => 0.5,
            Self::LoadTimeout => 0.4,
            Self::ActionTimeout => 0.2,
            Self::SelectorNotFound => 0.15,
            Self::ActionFailed | Self::HeadlessIncompatibility => 0.1,
            Self::ScreenshotFailed | Self::LogFailed => 0.05,
        }
    }

    /// Issues that mean the page itself stopped being trustworthy.
    #[must_use]
    pub const fn breaks_stability(self) -> bool {
        matches!(self, Self::BrowserCrash)
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_index: Option<usize>,
}

impl Issue {
    pub fn new(issue_type: IssueType, description: impl Into<String>) -> Self {
        Self {
            issue_type,
            description: description.into(),
            timestamp: Utc::now(),
            action_index: None,
        }
    }

    #[must_use]
    pub fn at_action(mut self, index: usize) -> Self {
        self.action_index = Some(index);
        self
    }
}

/// Where an error was raised, which decides how timeouts are labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    Load,
    Action,
}

const TIMEOUT_PHRASES: &[&str] = &["timeout", "timed out"];
const CRASH_PHRASES: &[&str] = &[
    "crash",
    "target closed",
    "session deleted",
    "disconnected",
    "econnrefused",
    "connection refused",
    "transport closed",
];
const NOT_FOUND_PHRASES: &[&str] = &[
    "not found",
    "no such element",
    "could not find",
    "unable to locate",
];
const HEADLESS_PHRASES: &[&str] = &["headless"];
const SCREENSHOT_PHRASES: &[&str] = &["screenshot"];
const LOG_PHRASES: &[&str] = &["console log", "log capture", "logs"];

/// Map an error message onto the taxonomy. Rules are checked in order and
/// the first match wins; reordering them changes classification.
#[must_use]
pub fn classify(message: &str, context: ErrorContext) -> IssueType {
    let lower = message.to_lowercase();
    let matches_any = |phrases: &[&str]| phrases.iter().any(|p| lower.contains(p));

    if matches_any(TIMEOUT_PHRASES) {
        return match context {
            ErrorContext::Load => IssueType::LoadTimeout,
            ErrorContext::Action => IssueType::ActionTimeout,
        };
    }
    if matches_any(CRASH_PHRASES) {
        return IssueType::BrowserCrash;
    }
    if matches_any(NOT_FOUND_PHRASES) {
        return IssueType::SelectorNotFound;
    }
    if matches_any(HEADLESS_PHRASES) {
        return IssueType::HeadlessIncompatibility;
    }
    if matches_any(SCREENSHOT_PHRASES) {
        return IssueType::ScreenshotFailed;
    }
    if matches_any(LOG_PHRASES) {
        return IssueType::LogFailed;
    }
    IssueType::ActionFailed
}
