//! Session analytics: derived chart datasets computed from a snapshot of sessions.
//!
//! Each transform is a single pass over the input and independent of the others,
//! so callers only pay for the views they render. Sessions still in progress
//! contribute zero minutes everywhere.

use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};

use crate::model::{BookId, ReadingSession};
use crate::organize::{day_label, week_label};
use crate::time::Zone;

/// Radar charts stay readable with at most this many spokes.
pub const RADAR_LIMIT: usize = 10;

/// Pages and minutes summed under one date or week key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateBucket {
    pub key: String,
    pub total_pages: u64,
    pub total_duration_minutes: i64,
}

/// One `(duration, pages)` point per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScatterPoint {
    pub duration_minutes: i64,
    pub pages_read: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadarPoint {
    pub label: String,
    pub duration_minutes: i64,
    pub pages_read: u32,
    pub notes_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookDuration {
    pub book_id: BookId,
    pub label: String,
    pub total_duration_minutes: i64,
}

/// Every chart dataset at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsView {
    pub daily: Vec<AggregateBucket>,
    pub weekly: Vec<AggregateBucket>,
    pub scatter: Vec<ScatterPoint>,
    pub radar: Vec<RadarPoint>,
    pub per_book: Vec<BookDuration>,
}

impl AnalyticsView {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scatter.is_empty()
    }
}

#[must_use]
pub fn aggregate(sessions: &[ReadingSession], zone: Zone) -> AnalyticsView {
    let view = AnalyticsView {
        daily: daily_rollup(sessions, zone),
        weekly: weekly_rollup(sessions, zone),
        scatter: scatter_points(sessions),
        radar: radar_metrics(sessions),
        per_book: book_durations(sessions),
    };
    tracing::debug!(
        sessions = sessions.len(),
        days = view.daily.len(),
        books = view.per_book.len(),
        "Computed session analytics"
    );
    view
}

/// Sessions belonging to one book, in input order.
#[must_use]
pub fn filter_by_book(sessions: &[ReadingSession], book_id: BookId) -> Vec<ReadingSession> {
    sessions
        .iter()
        .filter(|s| s.book_id() == book_id)
        .cloned()
        .collect()
}

#[derive(Default)]
struct Totals {
    pages: u64,
    minutes: i64,
}

impl Totals {
    fn add(&mut self, session: &ReadingSession) {
        self.pages += u64::from(session.pages_read().unwrap_or(0));
        self.minutes += session.duration_minutes();
    }
}

/// Totals per local calendar date of `start_time`, oldest first.
#[must_use]
pub fn daily_rollup(sessions: &[ReadingSession], zone: Zone) -> Vec<AggregateBucket> {
    let mut days: BTreeMap<NaiveDate, Totals> = BTreeMap::new();
    for session in sessions {
        days.entry(zone.date_of(session.start_time()))
            .or_default()
            .add(session);
    }
    days.into_iter()
        .map(|(date, totals)| AggregateBucket {
            key: day_label(date),
            total_pages: totals.pages,
            total_duration_minutes: totals.minutes,
        })
        .collect()
}

/// Totals per ISO week of `start_time`, oldest first.
#[must_use]
pub fn weekly_rollup(sessions: &[ReadingSession], zone: Zone) -> Vec<AggregateBucket> {
    // Keyed by (iso year, week) so ordering is chronological, labelled by any date in it.
    let mut weeks: BTreeMap<(i32, u32), (NaiveDate, Totals)> = BTreeMap::new();
    for session in sessions {
        let date = zone.date_of(session.start_time());
        let iso = date.iso_week();
        weeks
            .entry((iso.year(), iso.week()))
            .or_insert_with(|| (date, Totals::default()))
            .1
            .add(session);
    }
    weeks
        .into_values()
        .map(|(date, totals)| AggregateBucket {
            key: week_label(date),
            total_pages: totals.pages,
            total_duration_minutes: totals.minutes,
        })
        .collect()
}

#[must_use]
pub fn scatter_points(sessions: &[ReadingSession]) -> Vec<ScatterPoint> {
    sessions
        .iter()
        .map(|s| ScatterPoint {
            duration_minutes: s.duration_minutes(),
            pages_read: s.pages_read().unwrap_or(0),
        })
        .collect()
}

/// The first `RADAR_LIMIT` sessions in input order, labelled `S1`, `S2`, ...
#[must_use]
pub fn radar_metrics(sessions: &[ReadingSession]) -> Vec<RadarPoint> {
    sessions
        .iter()
        .take(RADAR_LIMIT)
        .enumerate()
        .map(|(i, s)| RadarPoint {
            label: format!("S{}", i + 1),
            duration_minutes: s.duration_minutes(),
            pages_read: s.pages_read().unwrap_or(0),
            notes_length: s.notes_length(),
        })
        .collect()
}

/// Minutes per book in first-appearance order.
///
/// The label is the first book title seen for the book, or `Book <id>`.
#[must_use]
pub fn book_durations(sessions: &[ReadingSession]) -> Vec<BookDuration> {
    let mut out: Vec<BookDuration> = Vec::new();
    let mut titled: Vec<bool> = Vec::new();
    let mut index: HashMap<BookId, usize> = HashMap::new();
    for session in sessions {
        let book_id = session.book_id();
        let i = match index.get(&book_id) {
            Some(&i) => i,
            None => {
                index.insert(book_id, out.len());
                out.push(BookDuration {
                    book_id,
                    label: format!("Book {book_id}"),
                    total_duration_minutes: 0,
                });
                titled.push(false);
                out.len() - 1
            }
        };
        if !titled[i] {
            if let Some(title) = session.book_title() {
                out[i].label = title.to_owned();
                titled[i] = true;
            }
        }
        out[i].total_duration_minutes += session.duration_minutes();
    }
    out
}
