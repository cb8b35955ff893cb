//! Per-user question quota for inquiry mode.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::flow::Session;

/// Real-world UTC offsets, in whole hours.
pub const UTC_OFFSET_HOURS_RANGE: std::ops::RangeInclusive<i32> = -12..=14;

/// How the quota window resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaWindow {
    /// Resets once this long has passed since the first question of the window.
    Rolling(Duration),
    /// Resets at local midnight for the given UTC offset.
    CalendarDay { utc_offset_hours: i32 },
}

impl QuotaWindow {
    /// Whether a window opened at `start` is over at `now`.
    pub fn has_elapsed(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Rolling(length) => {
                let length = chrono::Duration::from_std(*length).unwrap_or(chrono::Duration::MAX);
                now.signed_duration_since(start) >= length
            }
            Self::CalendarDay { utc_offset_hours } => {
                let offset = utc_offset_hours
                    .checked_mul(3600)
                    .and_then(FixedOffset::east_opt)
                    .unwrap_or_else(|| {
                        tracing::warn!(utc_offset_hours, "UTC offset out of range; using UTC");
                        Utc.fix()
                    });
                start.with_timezone(&offset).date_naive() != now.with_timezone(&offset).date_naive()
            }
        }
    }
}

/// Whether the user may ask another question right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaState {
    Ok,
    Exceeded,
}

/// Result of charging one question against the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed {
        remaining: u32,
        /// `remaining` hit a milestone; tell the user.
        notify: bool,
    },
    Exceeded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaPolicy {
    pub limit: u32,
    pub window: QuotaWindow,
    /// Remaining counts that trigger a "questions remaining" notice.
    pub milestones: Vec<u32>,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            limit: 15,
            window: QuotaWindow::Rolling(Duration::from_secs(24 * 60 * 60)),
            milestones: vec![10, 5],
        }
    }
}

impl QuotaPolicy {
    /// Clear the counter when the window is over.
    pub fn refresh(&self, session: &mut Session, now: DateTime<Utc>) {
        if let Some(start) = session.query_window_start
            && self.window.has_elapsed(start, now)
        {
            session.query_count = 0;
            session.query_window_start = None;
        }
    }

    pub fn state(&self, session: &Session, now: DateTime<Utc>) -> QuotaState {
        let expired = session
            .query_window_start
            .is_some_and(|start| self.window.has_elapsed(start, now));
        if !expired && session.query_count >= self.limit {
            QuotaState::Exceeded
        } else {
            QuotaState::Ok
        }
    }

    /// Charge one question. At the limit nothing is incremented.
    pub fn consume(&self, session: &mut Session, now: DateTime<Utc>) -> QuotaDecision {
        self.refresh(session, now);
        if self.state(session, now) == QuotaState::Exceeded {
            return QuotaDecision::Exceeded;
        }
        session.query_count += 1;
        if session.query_window_start.is_none() {
            session.query_window_start = Some(now);
        }
        let remaining = self.limit - session.query_count;
        QuotaDecision::Allowed {
            remaining,
            notify: self.milestones.contains(&remaining),
        }
    }
}
