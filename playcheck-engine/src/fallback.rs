//! Fallback chain resolution for interactive targets.
//!
//! A target like "Start" can be described to the backend many ways. The
//! phrasings are generated up front as an ordered list so the resolution
//! order is a plain value that can be inspected and tested, then tried one
//! at a time until the backend returns a handle.

use std::future::Future;
use std::time::Duration;

use crate::capability::Handle;

const PHRASE_TEMPLATES: &[(&str, bool)] = &[
    ("find", true),
    ("find", false),
    ("locate", true),
    ("locate", false),
    ("click", true),
    ("click", false),
];

struct RoleSynonyms {
    keywords: &'static [&'static str],
    phrasings: &'static [&'static str],
}

const ROLE_SYNONYMS: &[RoleSynonyms] = &[
    RoleSynonyms {
        keywords: &["start", "play", "begin"],
        phrasings: &[
            "start button",
            "play button",
            "begin button",
            "start game button",
        ],
    },
    RoleSynonyms {
        keywords: &["restart", "again", "retry"],
        phrasings: &[
            "restart button",
            "play again button",
            "retry button",
            "try again button",
        ],
    },
    RoleSynonyms {
        keywords: &["pause", "menu"],
        phrasings: &["pause button", "menu button", "pause menu"],
    },
];

/// Lowercase, collapse whitespace and drop a leading article.
#[must_use]
pub fn normalize_target(target: &str) -> String {
    let collapsed = target
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .strip_prefix("the ")
        .map_or(collapsed.clone(), str::to_string)
}

fn push_unique(list: &mut Vec<String>, candidate: String) {
    if !list.contains(&candidate) {
        list.push(candidate);
    }
}

/// Ordered, deduplicated phrasings to try when locating `target`.
#[must_use]
pub fn click_strategies(target: &str) -> Vec<String> {
    let normalized = normalize_target(target);
    let mut strategies = Vec::new();
    if normalized.is_empty() {
        return strategies;
    }

    for (verb, with_article) in PHRASE_TEMPLATES {
        let phrase = if *with_article {
            format!("{verb} the {normalized}")
        } else {
            format!("{verb} {normalized}")
        };
        push_unique(&mut strategies, phrase);
    }

    for role in ROLE_SYNONYMS {
        if role.keywords.iter().any(|kw| normalized.contains(kw)) {
            for phrasing in role.phrasings {
                push_unique(&mut strategies, (*phrasing).to_string());
            }
        }
    }

    strategies
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found {
        handle: Handle,
        strategy_index: usize,
        candidate: String,
    },
    NotFound {
        tried: Vec<String>,
    },
}

impl Resolution {
    #[must_use]
    pub fn handle(&self) -> Option<&Handle> {
        match self {
            Self::Found { handle, .. } => Some(handle),
            Self::NotFound { .. } => None,
        }
    }
}

/// Try each strategy in order and return the first handle found.
///
/// `locate` errors count as an empty result for that strategy.
pub async fn resolve<F, Fut>(
    strategies: &[String],
    timeout: Duration,
    mut locate: F,
) -> Resolution
where
    F: FnMut(String, Duration) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<Handle>>>,
{
    for (strategy_index, candidate) in strategies.iter().enumerate() {
        match locate(candidate.clone(), timeout).await {
            Ok(handles) => {
                if let Some(handle) = handles.into_iter().next() {
                    log::debug!("resolved '{candidate}' via strategy {strategy_index}");
                    return Resolution::Found {
                        handle,
                        strategy_index,
                        candidate: candidate.clone(),
                    };
                }
                log::debug!("strategy '{candidate}' returned no candidates");
            }
            Err(err) => {
                log::debug!("strategy '{candidate}' failed: {err:#}");
            }
        }
    }
    Resolution::NotFound {
        tried: strategies.to_vec(),
    }
}
