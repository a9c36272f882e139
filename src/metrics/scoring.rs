//! Heuristic response scoring.
//!
//! A score is `base + Σ delta` over the indicators, clamped to
//! [`MIN_SCORE`]..=[`MAX_SCORE`]. Every indicator is recorded in the trace,
//! matched or not, so a score can always be explained after the fact.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{MAX_SCORE, MIN_SCORE};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorMatch {
    pub name: String,
    pub matched: bool,
    pub delta: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTrace {
    pub base_score: i32,
    pub indicators: Vec<IndicatorMatch>,
    pub final_score: i32,
}

impl ScoreTrace {
    pub fn new(base_score: i32) -> Self {
        Self {
            base_score,
            ..Default::default()
        }
    }

    /// Records an indicator contributing `delta` when `matched`.
    pub fn push(&mut self, name: impl Into<String>, matched: bool, delta: i32) {
        self.indicators.push(IndicatorMatch {
            name: name.into(),
            matched,
            delta: if matched { delta } else { 0 },
        });
    }

    pub fn extend(&mut self, indicators: impl IntoIterator<Item = IndicatorMatch>) {
        self.indicators.extend(indicators);
    }

    /// Computes and stores the clamped final score.
    pub fn finish(mut self) -> Self {
        let raw = self.base_score + self.indicators.iter().map(|i| i.delta).sum::<i32>();
        self.final_score = raw.clamp(MIN_SCORE, MAX_SCORE);
        self
    }
}

/// Phrases that count once if any of them appears.
pub(crate) struct IndicatorGroup {
    pub name: &'static str,
    pub members: &'static [&'static str],
}

/// `group:<name>` indicators worth +1 each when any member occurs in `lower`.
pub(crate) fn match_groups(lower: &str, groups: &[IndicatorGroup]) -> Vec<IndicatorMatch> {
    groups
        .iter()
        .map(|group| {
            let matched = group.members.iter().any(|m| lower.contains(m));
            IndicatorMatch {
                name: format!("group:{}", group.name),
                matched,
                delta: if matched { 1 } else { 0 },
            }
        })
        .collect()
}

/// `negative:<phrase>` indicators worth -1 each.
pub(crate) fn match_negative_indicators(lower: &str, phrases: &[&str]) -> Vec<IndicatorMatch> {
    phrases
        .iter()
        .map(|phrase| {
            let matched = lower.contains(phrase);
            IndicatorMatch {
                name: format!("negative:{}", phrase),
                matched,
                delta: if matched { -1 } else { 0 },
            }
        })
        .collect()
}

/// A regex compiled on first use.
///
/// Patterns are literals; one that fails to compile matches nothing.
pub(crate) struct LazyRegex {
    pattern: &'static str,
    cell: OnceLock<Option<Regex>>,
}

impl LazyRegex {
    pub const fn new(pattern: &'static str) -> Self {
        Self {
            pattern,
            cell: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Option<&Regex> {
        self.cell
            .get_or_init(|| Regex::new(self.pattern).ok())
            .as_ref()
    }

    pub fn count(&self, text: &str) -> usize {
        self.get().map(|re| re.find_iter(text).count()).unwrap_or(0)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.get().map(|re| re.is_match(text)).unwrap_or(false)
    }
}

/// Orders candidates best first and keeps at most `max`.
pub(crate) fn take_best(mut candidates: Vec<super::Sample>, max: usize) -> Vec<super::Sample> {
    candidates.sort_by(|a, b| b.selection_score.total_cmp(&a.selection_score));
    candidates.truncate(max);
    candidates
}
