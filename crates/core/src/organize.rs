//! Session list organizer: filter, sort and group one page of sessions for display.
//!
//! Everything here is a pure function of its inputs. Grouping is layered on top
//! of whatever page the caller fetched, so a day or week bucket only reflects the
//! sessions present on that page.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ReadingSession;
use crate::time::Zone;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OrganizeError {
    #[error("unknown sort order `{0}` (expected asc or desc)")]
    UnknownSortOrder(String),

    #[error("unknown date filter `{0}` (expected all, 7d or 30d)")]
    UnknownDateFilter(String),

    #[error("unknown grouping `{0}` (expected none, day or week)")]
    UnknownGroupBy(String),

    #[error("page numbers start at 1")]
    InvalidPage,

    #[error("page size must be > 0")]
    InvalidPageSize,
}

//
// ─── OPTIONS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DateFilter {
    #[default]
    All,
    Last7Days,
    Last30Days,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupBy {
    #[default]
    None,
    Day,
    Week,
}

impl DateFilter {
    /// Look-back window, or `None` for no filtering.
    #[must_use]
    pub fn window(self) -> Option<Duration> {
        match self {
            DateFilter::All => None,
            DateFilter::Last7Days => Some(Duration::days(7)),
            DateFilter::Last30Days => Some(Duration::days(30)),
        }
    }
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl DateFilter {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DateFilter::All => "all",
            DateFilter::Last7Days => "7d",
            DateFilter::Last30Days => "30d",
        }
    }
}

impl GroupBy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GroupBy::None => "none",
            GroupBy::Day => "day",
            GroupBy::Week => "week",
        }
    }
}

impl FromStr for SortOrder {
    type Err = OrganizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(OrganizeError::UnknownSortOrder(s.to_owned())),
        }
    }
}

impl FromStr for DateFilter {
    type Err = OrganizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "7d" => Ok(Self::Last7Days),
            "30d" => Ok(Self::Last30Days),
            _ => Err(OrganizeError::UnknownDateFilter(s.to_owned())),
        }
    }
}

impl FromStr for GroupBy {
    type Err = OrganizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            _ => Err(OrganizeError::UnknownGroupBy(s.to_owned())),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display parameters chosen by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrganizeOptions {
    pub sort: SortOrder,
    pub filter: DateFilter,
    pub group_by: GroupBy,
}

//
// ─── PAGINATION ────────────────────────────────────────────────────────────────
//

/// Position of the organized rows within the server-side collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    number: u32,
    size: u32,
    total_count: u64,
}

impl PageInfo {
    /// # Errors
    ///
    /// Returns `OrganizeError::InvalidPage` for page 0 and
    /// `OrganizeError::InvalidPageSize` for an empty page size.
    pub fn new(number: u32, size: u32, total_count: u64) -> Result<Self, OrganizeError> {
        if number == 0 {
            return Err(OrganizeError::InvalidPage);
        }
        if size == 0 {
            return Err(OrganizeError::InvalidPageSize);
        }
        Ok(Self {
            number,
            size,
            total_count,
        })
    }

    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    #[must_use]
    pub fn total_pages(&self) -> u64 {
        self.total_count.div_ceil(u64::from(self.size))
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        u64::from(self.number) < self.total_pages()
    }
}

//
// ─── VIEW ──────────────────────────────────────────────────────────────────────
//

/// A labelled run of sessions. The label is empty when grouping is off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGroup {
    pub label: String,
    pub sessions: Vec<ReadingSession>,
}

/// Display-ready page of sessions.
///
/// Groups appear in the order their first session appears in the sorted rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub groups: Vec<SessionGroup>,
    pub page: PageInfo,
}

impl SessionView {
    #[must_use]
    pub fn group(&self, label: &str) -> Option<&SessionGroup> {
        self.groups.iter().find(|g| g.label == label)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.sessions.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All sessions in display order.
    #[must_use]
    pub fn flatten(&self) -> Vec<ReadingSession> {
        self.groups
            .iter()
            .flat_map(|g| g.sessions.iter().cloned())
            .collect()
    }
}

//
// ─── TRANSFORMS ────────────────────────────────────────────────────────────────
//

/// Filter, sort and group `sessions` for display.
#[must_use]
pub fn organize(
    sessions: &[ReadingSession],
    options: &OrganizeOptions,
    page: PageInfo,
    now: DateTime<Utc>,
    zone: Zone,
) -> SessionView {
    let mut rows = filter_by_range(sessions, options.filter, now);
    sort_sessions(&mut rows, options.sort);
    let groups = group_sessions(rows, options.group_by, zone);

    tracing::debug!(
        input = sessions.len(),
        groups = groups.len(),
        sort = %options.sort,
        filter = %options.filter,
        group_by = %options.group_by,
        "Organized session page"
    );

    SessionView { groups, page }
}

/// Keep sessions whose start lies in `[now - window, now]`.
#[must_use]
pub fn filter_by_range(
    sessions: &[ReadingSession],
    filter: DateFilter,
    now: DateTime<Utc>,
) -> Vec<ReadingSession> {
    match filter.window() {
        None => sessions.to_vec(),
        Some(window) => {
            let from = now - window;
            sessions
                .iter()
                .filter(|s| s.start_time() >= from && s.start_time() <= now)
                .cloned()
                .collect()
        }
    }
}

/// Stable sort by start time; equal starts keep their input order.
pub fn sort_sessions(sessions: &mut [ReadingSession], order: SortOrder) {
    match order {
        SortOrder::Asc => sessions.sort_by(|a, b| a.start_time().cmp(&b.start_time())),
        SortOrder::Desc => sessions.sort_by(|a, b| b.start_time().cmp(&a.start_time())),
    }
}

/// Partition already-ordered sessions into labelled groups.
#[must_use]
pub fn group_sessions(
    sessions: Vec<ReadingSession>,
    group_by: GroupBy,
    zone: Zone,
) -> Vec<SessionGroup> {
    let label_of: fn(NaiveDate) -> String = match group_by {
        GroupBy::None => {
            return vec![SessionGroup {
                label: String::new(),
                sessions,
            }];
        }
        GroupBy::Day => day_label,
        GroupBy::Week => week_label,
    };

    let mut groups: Vec<SessionGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for session in sessions {
        let label = label_of(zone.date_of(session.start_time()));
        match index.get(&label) {
            Some(&i) => groups[i].sessions.push(session),
            None => {
                index.insert(label.clone(), groups.len());
                groups.push(SessionGroup {
                    label,
                    sessions: vec![session],
                });
            }
        }
    }
    groups
}

/// `YYYY-MM-DD`
#[must_use]
pub fn day_label(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `Week <n> - <year>` using the ISO week-year, so 2025-12-29 is `Week 1 - 2026`.
#[must_use]
pub fn week_label(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("Week {} - {}", iso.week(), iso.year())
}
