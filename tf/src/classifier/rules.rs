//! Deterministic classification rules
//!
//! Cheap checks that run before (and as fallback after) the external
//! classifier. A rule only fires when the message is unambiguous for the
//! trip's current stage; anything uncertain is left for the classifier.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use super::{DateRange, Intent, StageContext};
use crate::domain::Stage;

static ISO_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})\s*(?:to|-|–|through|/)\s*(\d{4}-\d{2}-\d{2})")
        .unwrap_or_else(|e| panic!("invalid ISO range regex: {}", e))
});

static SLASH_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})/(\d{1,2})\s*(?:to|-|–|through)\s*(\d{1,2})/(\d{1,2})")
        .unwrap_or_else(|e| panic!("invalid slash range regex: {}", e))
});

const FLEXIBLE_PHRASES: &[&str] = &[
    "whenever",
    "flexible",
    "any time",
    "anytime",
    "any week",
    "works for me whenever",
];

/// Try to resolve the intent without calling the classifier.
///
/// Returns `None` when the message needs real language understanding.
pub fn fast_intent(ctx: &StageContext, text: &str) -> Option<Intent> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(Intent::Conversational);
    }

    // A bare option number while a poll is open can only be a ballot.
    if !ctx.poll_options.is_empty() && vote_index(trimmed).is_some() {
        return Some(Intent::CastVote);
    }

    // An explicit date range reads as availability in any pre-lock stage.
    if matches!(ctx.stage, Stage::Gathering | Stage::Planning | Stage::VotingDestination | Stage::VotingDates)
        && parse_range(trimmed).is_some()
    {
        return Some(Intent::ProvideAvailability);
    }

    if ctx.stage == Stage::Gathering && looks_like_name(trimmed) {
        return Some(Intent::ProvideName);
    }

    None
}

/// Parse a 1-based poll option index from a bare digit message
pub fn vote_index(text: &str) -> Option<usize> {
    let trimmed = text.trim().trim_end_matches(['.', '!']);
    if trimmed.len() == 1
        && let Some(d) = trimmed.chars().next().and_then(|c| c.to_digit(10))
        && d >= 1
    {
        return Some(d as usize);
    }
    None
}

/// Parse an explicit date range out of free text.
///
/// Handles ISO pairs ("2025-03-15 to 2025-03-22") and month/day pairs
/// ("3/15-3/22", resolved to the next occurrence of that start date).
/// Flexible phrases ("whenever works") parse as a flexible range anchored
/// at today.
pub fn parse_range(text: &str) -> Option<DateRange> {
    parse_range_at(text, chrono::Utc::now().date_naive())
}

/// [`parse_range`] with an explicit "today" for month/day year resolution
pub fn parse_range_at(text: &str, today: NaiveDate) -> Option<DateRange> {
    if let Some(caps) = ISO_RANGE.captures(text) {
        let start = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
        let end = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d").ok()?;
        if end >= start {
            return Some(DateRange { start, end, flexible: false });
        }
        return None;
    }

    if let Some(caps) = SLASH_RANGE.captures(text) {
        let start_month: u32 = caps[1].parse().ok()?;
        let start_day: u32 = caps[2].parse().ok()?;
        let end_month: u32 = caps[3].parse().ok()?;
        let end_day: u32 = caps[4].parse().ok()?;

        let mut year = today.year();
        let mut start = NaiveDate::from_ymd_opt(year, start_month, start_day)?;
        if start < today {
            year += 1;
            start = NaiveDate::from_ymd_opt(year, start_month, start_day)?;
        }
        // An end month before the start month wraps into the next year.
        let end_year = if end_month < start_month { year + 1 } else { year };
        let end = NaiveDate::from_ymd_opt(end_year, end_month, end_day)?;
        if end >= start {
            return Some(DateRange { start, end, flexible: false });
        }
        return None;
    }

    if is_flexible(text) {
        return Some(DateRange { start: today, end: today, flexible: true });
    }

    None
}

/// Whether the text signals date flexibility rather than a concrete range
pub fn is_flexible(text: &str) -> bool {
    let lower = text.to_lowercase();
    FLEXIBLE_PHRASES.iter().any(|p| lower.contains(p))
}

/// Whether a message plausibly is just someone's name.
///
/// One or two capitalized alphabetic words, no digits, no sentence
/// punctuation. Deliberately conservative: false negatives go to the
/// classifier, false positives would silently rename people.
pub fn looks_like_name(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || words.len() > 2 {
        return false;
    }
    words.iter().all(|w| {
        let mut chars = w.chars();
        chars.next().is_some_and(|c| c.is_uppercase())
            && w.chars().all(|c| c.is_alphabetic() || c == '\'' || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(stage: Stage, poll_options: Vec<String>) -> StageContext {
        StageContext {
            stage,
            member_count: 3,
            suggestion_count: 0,
            availability_count: 0,
            vote_count: 0,
            poll_options,
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_bare_digit_during_poll_is_a_vote() {
        let poll = ctx(Stage::VotingDestination, vec!["tokyo".into(), "lisbon".into()]);
        assert_eq!(fast_intent(&poll, "2"), Some(Intent::CastVote));
        assert_eq!(fast_intent(&poll, " 1 "), Some(Intent::CastVote));
        assert_eq!(fast_intent(&poll, "1!"), Some(Intent::CastVote));
    }

    #[test]
    fn test_digit_without_open_poll_is_not_a_vote() {
        let no_poll = ctx(Stage::Planning, vec![]);
        assert_eq!(fast_intent(&no_poll, "2"), None);
    }

    #[test]
    fn test_zero_is_not_a_vote_index() {
        assert_eq!(vote_index("0"), None);
        assert_eq!(vote_index("12"), None);
        assert_eq!(vote_index("x"), None);
    }

    #[test]
    fn test_iso_range() {
        let range = parse_range_at("2025-03-15 to 2025-03-22", date("2025-01-01")).unwrap();
        assert_eq!(range.start, date("2025-03-15"));
        assert_eq!(range.end, date("2025-03-22"));
        assert!(!range.flexible);
    }

    #[test]
    fn test_iso_range_backwards_rejected() {
        assert!(parse_range_at("2025-03-22 to 2025-03-15", date("2025-01-01")).is_none());
    }

    #[test]
    fn test_slash_range_resolves_to_next_occurrence() {
        let range = parse_range_at("I could do 3/15-3/22", date("2025-06-01")).unwrap();
        assert_eq!(range.start, date("2026-03-15"));
        assert_eq!(range.end, date("2026-03-22"));
    }

    #[test]
    fn test_slash_range_wrapping_year_end() {
        let range = parse_range_at("12/28 to 1/3", date("2025-06-01")).unwrap();
        assert_eq!(range.start, date("2025-12-28"));
        assert_eq!(range.end, date("2026-01-03"));
    }

    #[test]
    fn test_flexible_phrase() {
        let today = date("2025-06-01");
        let range = parse_range_at("whenever works for me", today).unwrap();
        assert!(range.flexible);
        assert_eq!(range.start, today);
    }

    #[test]
    fn test_date_range_reads_as_availability() {
        let planning = ctx(Stage::Planning, vec![]);
        assert_eq!(
            fast_intent(&planning, "2025-03-15 to 2025-03-22"),
            Some(Intent::ProvideAvailability)
        );
    }

    #[test]
    fn test_short_token_in_gathering_is_a_name() {
        let gathering = ctx(Stage::Gathering, vec![]);
        assert_eq!(fast_intent(&gathering, "Priya"), Some(Intent::ProvideName));
        assert_eq!(fast_intent(&gathering, "Mary-Jane Watson"), Some(Intent::ProvideName));
        // Full sentences defer to the classifier.
        assert_eq!(fast_intent(&gathering, "hey everyone, so excited"), None);
        // Same token outside gathering defers too.
        let planning = ctx(Stage::Planning, vec![]);
        assert_eq!(fast_intent(&planning, "Priya"), None);
    }

    #[test]
    fn test_empty_message_is_conversational() {
        let gathering = ctx(Stage::Gathering, vec![]);
        assert_eq!(fast_intent(&gathering, "   "), Some(Intent::Conversational));
    }
}
