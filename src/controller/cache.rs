//! Reuse of a previously evaluated session prefix.

use std::fmt;

use crate::tokens::{SessionCache, Token};

/// Skips the leading pending tokens that the session cache already holds,
/// advancing `n_past` past them. The first mismatch truncates the cache to the
/// matched prefix, which ends matching for the rest of the session.
///
/// Returns the number of tokens removed from `pending`.
pub fn reuse_session_prefix(cache: &mut SessionCache, pending: &mut Vec<Token>, n_past: &mut usize) -> usize {
    if !cache.is_pending() {
        return 0;
    }

    let mut matched = 0;
    for &token in pending.iter() {
        if cache.next_expected() != Some(token) {
            cache.truncate_to_consumed();
            break;
        }

        *n_past += 1;
        cache.advance();
        matched += 1;

        if !cache.is_pending() {
            break;
        }
    }

    pending.drain(..matched);
    matched
}

/// How much of a loaded session agrees with the fresh prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Similarity {
    Exact,
    Low { matched: usize, total: usize },
    Partial { matched: usize, total: usize },
}

impl Similarity {
    pub fn classify(matched: usize, total: usize) -> Self {
        if matched >= total {
            Similarity::Exact
        } else if matched < total / 2 {
            Similarity::Low { matched, total }
        } else {
            Similarity::Partial { matched, total }
        }
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Similarity::Exact => write!(f, "session file has exact match for prompt!"),
            Similarity::Low { matched, total } => write!(
                f,
                "session file has low similarity to prompt ({matched} / {total} tokens); will mostly be reevaluated"
            ),
            Similarity::Partial { matched, total } => {
                write!(f, "session file matches {matched} / {total} tokens of prompt")
            }
        }
    }
}
