//! Month and ISO-week buckets over a list of sessions.
//!
//! Buckets borrow from the session list and hold no state of their own; call
//! [`group_sessions`] again whenever the list changes.

use crate::model::{Session, TimeEntry};
use crate::stats::{basic_stats, trimmed_mean};
use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct WeekGroup<'a> {
    /// `YYYY-Www`, using the ISO week-year
    pub key: String,
    pub iso_year: i32,
    pub week: u32,
    /// Monday 00:00:00.000, local wall clock
    pub start: NaiveDateTime,
    /// Sunday 23:59:59.999, local wall clock
    pub end: NaiveDateTime,
    /// Newest first
    pub sessions: Vec<&'a Session>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthGroup<'a> {
    /// `YYYY-MM`
    pub key: String,
    pub year: i32,
    /// 1-based
    pub month: u32,
    /// Newest first
    pub sessions: Vec<&'a Session>,
    /// Newest first by start date
    pub weeks: Vec<WeekGroup<'a>>,
}

impl<'a> WeekGroup<'a> {
    pub fn stats(&self) -> GroupStats {
        group_stats(&self.sessions)
    }
}

impl<'a> MonthGroup<'a> {
    pub fn stats(&self) -> GroupStats {
        group_stats(&self.sessions)
    }
}

/// Aggregate view over every solve in a bucket
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GroupStats {
    pub count: usize,
    pub session_count: usize,
    pub best: Option<u64>,
    pub worst: Option<u64>,
    pub average: Option<f64>,
    pub ao5: Option<f64>,
    pub ao12: Option<f64>,
}

/// Bucket stats. A bucket spans several sessions, so Ao5/Ao12 take the most
/// recent solves by timestamp rather than per-session insertion order.
pub fn group_stats(sessions: &[&Session]) -> GroupStats {
    let mut entries: Vec<&TimeEntry> = sessions.iter().flat_map(|s| &s.times).collect();
    let times: Vec<u64> = entries.iter().map(|e| e.time).collect();

    let Some(basic) = basic_stats(&times) else {
        return GroupStats {
            session_count: sessions.len(),
            ..Default::default()
        };
    };

    // stable, so tied timestamps keep list order
    entries.sort_by_key(|e| Reverse(e.timestamp));
    let newest_first: Vec<u64> = entries.iter().map(|e| e.time).collect();
    let recent = |n: usize| newest_first.get(..n).and_then(trimmed_mean);

    GroupStats {
        count: basic.count,
        session_count: sessions.len(),
        best: Some(basic.best),
        worst: Some(basic.worst),
        average: Some(basic.average),
        ao5: recent(5),
        ao12: recent(12),
    }
}

pub fn month_key(year: i32, month: u32) -> String {
    format!("{}-{:02}", year, month)
}

pub fn week_key(iso_year: i32, week: u32) -> String {
    format!("{}-W{:02}", iso_year, week)
}

/// Monday of the week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Group by local calendar month and ISO week
pub fn group_sessions(sessions: &[Session]) -> Vec<MonthGroup<'_>> {
    group_sessions_in(sessions, &Local)
}

pub fn group_sessions_in<'a, Tz: TimeZone>(sessions: &'a [Session], tz: &Tz) -> Vec<MonthGroup<'a>> {
    let mut ordered: Vec<&Session> = sessions.iter().collect();
    ordered.sort_by_key(|s| Reverse((s.created_ms(), s.id)));

    let mut months: BTreeMap<(i32, u32), MonthGroup<'a>> = BTreeMap::new();

    for session in ordered {
        let local = local_datetime(session.created_ms(), tz);
        let (year, month) = (local.year(), local.month());
        let iso = local.date().iso_week();

        let group = months.entry((year, month)).or_insert_with(|| MonthGroup {
            key: month_key(year, month),
            year,
            month,
            sessions: Vec::new(),
            weeks: Vec::new(),
        });
        group.sessions.push(session);

        let key = week_key(iso.year(), iso.week());
        match group.weeks.iter_mut().find(|w| w.key == key) {
            Some(week) => week.sessions.push(session),
            None => {
                let monday = week_start(local.date());
                let start = monday.and_time(NaiveTime::MIN);
                let end = start + Duration::days(7) - Duration::milliseconds(1);
                group.weeks.push(WeekGroup {
                    key,
                    iso_year: iso.year(),
                    week: iso.week(),
                    start,
                    end,
                    sessions: vec![session],
                });
            }
        }
    }

    months
        .into_values()
        .rev()
        .map(|mut group| {
            group.weeks.sort_by(|a, b| b.start.cmp(&a.start));
            group
        })
        .collect()
}

fn local_datetime<Tz: TimeZone>(ms: i64, tz: &Tz) -> NaiveDateTime {
    match tz.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.naive_local(),
        None => DateTime::<Utc>::from_timestamp_millis(ms)
            .unwrap_or_default()
            .naive_utc(),
    }
}
