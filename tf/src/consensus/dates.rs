//! Date-window overlap resolution
//!
//! Pure function from availability records to presentable date options.
//! Flexible entries never constrain the intersection; a conflict (empty
//! intersection) is reported as an empty vec, and the caller presents
//! per-member availability for manual resolution instead of failing.

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::domain::{DateAvailability, DateWindow};

/// Overlap spans up to this many days become a single option
const SINGLE_OPTION_MAX_DAYS: i64 = 7;

/// Overlap spans beyond this many days split into three chunks
const TRIPLE_CHUNK_MIN_DAYS: i64 = 90;

/// Synthetic default when every member is flexible: lead time and span
const DEFAULT_LEAD_DAYS: i64 = 30;
const DEFAULT_SPAN_DAYS: i64 = 7;

/// One candidate travel window.
///
/// Carries structured dates plus a display string. Poll closing references
/// `window` / `key()`; the display string is for humans and is never
/// parsed back into dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateOption {
    pub window: DateWindow,
    pub display: String,
}

impl DateOption {
    fn new(start: NaiveDate, end: NaiveDate) -> Self {
        let window = DateWindow::new(start, end);
        let display = if start.format("%Y %m").to_string() == end.format("%Y %m").to_string() {
            format!("{} - {}", start.format("%b %d"), end.format("%d, %Y"))
        } else {
            format!("{} - {}", start.format("%b %d"), end.format("%b %d, %Y"))
        };
        Self { window, display }
    }

    /// Stable machine key for ballots, `start/end` in ISO form
    pub fn key(&self) -> String {
        self.window.key()
    }
}

/// Resolve availabilities into date options.
///
/// - all entries flexible → one synthetic default window
/// - disjoint constrained entries → empty (conflict)
/// - overlap ≤ 7 days → one option spanning it
/// - longer overlaps → 2 contiguous chunks (3 beyond 90 days), gapless,
///   non-overlapping, covering the full window
pub fn resolve(availabilities: &[DateAvailability]) -> Vec<DateOption> {
    if availabilities.is_empty() {
        return Vec::new();
    }

    let constrained: Vec<&DateAvailability> = availabilities.iter().filter(|a| !a.flexible).collect();

    if constrained.is_empty() {
        // Everyone is flexible; propose something rather than failing.
        let start = Utc::now().date_naive() + Duration::days(DEFAULT_LEAD_DAYS);
        let end = start + Duration::days(DEFAULT_SPAN_DAYS);
        debug!(%start, %end, "resolve: all entries flexible, synthesizing default window");
        return vec![DateOption::new(start, end)];
    }

    // Intersection of constrained entries (non-empty here by construction).
    let (Some(start), Some(end)) = (
        constrained.iter().map(|a| a.start).max(),
        constrained.iter().map(|a| a.end).min(),
    ) else {
        return Vec::new();
    };

    if start > end {
        debug!(%start, %end, "resolve: empty intersection, availability conflict");
        return Vec::new();
    }

    let span_days = (end - start).num_days();
    if span_days <= SINGLE_OPTION_MAX_DAYS {
        return vec![DateOption::new(start, end)];
    }

    let chunks: i64 = if span_days > TRIPLE_CHUNK_MIN_DAYS { 3 } else { 2 };
    let total_days = span_days + 1; // inclusive day count
    let base = total_days / chunks;

    debug!(%start, %end, span_days, chunks, "resolve: splitting overlap into chunks");

    let mut options = Vec::with_capacity(chunks as usize);
    let mut chunk_start = start;
    for i in 0..chunks {
        let chunk_end = if i == chunks - 1 {
            end // last chunk absorbs the remainder
        } else {
            chunk_start + Duration::days(base - 1)
        };
        options.push(DateOption::new(chunk_start, chunk_end));
        chunk_start = chunk_end + Duration::days(1);
    }
    options
}
