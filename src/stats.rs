//! Solve statistics over plain sequences of millisecond times.
//!
//! Every function here is pure. Input order is recording order: the last
//! element is the most recent solve.

use crate::model::{Session, TimeEntry};
use crate::util::mean;
use itertools::Itertools;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicStats {
    pub best: u64,
    pub worst: u64,
    /// Arithmetic mean, unrounded
    pub average: f64,
    pub count: usize,
}

pub fn basic_stats(times: &[u64]) -> Option<BasicStats> {
    let sorted: Vec<u64> = times.iter().copied().sorted().collect();
    let (best, worst) = (*sorted.first()?, *sorted.last()?);
    let average = mean(&as_f64(times))?;

    Some(BasicStats {
        best,
        worst,
        average,
        count: times.len(),
    })
}

/// Sort the window, drop the single best and single worst value and average
/// the rest. Windows shorter than three have nothing left to average.
pub fn trimmed_mean(window: &[u64]) -> Option<f64> {
    if window.len() < 3 {
        return None;
    }
    let sorted: Vec<u64> = window.iter().copied().sorted().collect();
    mean(&as_f64(&sorted[1..sorted.len() - 1]))
}

/// Trimmed mean of the `n` most recent times.
///
/// Larger windows still drop exactly one time from each end; this is not
/// the WCA rule for averages of 12 or more.
pub fn average_of_n(times: &[u64], n: usize) -> Option<f64> {
    if n == 0 || times.len() < n {
        return None;
    }
    trimmed_mean(&times[times.len() - n..])
}

/// Lowest trimmed mean over every contiguous window of `n` times
pub fn best_average_of_n(times: &[u64], n: usize) -> Option<f64> {
    if n == 0 || times.len() < n {
        return None;
    }
    times
        .windows(n)
        .filter_map(trimmed_mean)
        .fold(None, |best: Option<f64>, avg| {
            Some(best.map_or(avg, |b| b.min(avg)))
        })
}

pub fn ao5(times: &[u64]) -> Option<f64> {
    average_of_n(times, 5)
}

pub fn ao12(times: &[u64]) -> Option<f64> {
    average_of_n(times, 12)
}

pub fn best_ao5(times: &[u64]) -> Option<f64> {
    best_average_of_n(times, 5)
}

pub fn best_ao12(times: &[u64]) -> Option<f64> {
    best_average_of_n(times, 12)
}

/// Everything shown for a single session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStats {
    pub basic: Option<BasicStats>,
    pub ao5: Option<f64>,
    pub ao12: Option<f64>,
    pub best_ao5: Option<f64>,
    pub best_ao12: Option<f64>,
}

pub fn session_stats(session: &Session) -> SessionStats {
    let times = session.time_values();
    SessionStats {
        basic: basic_stats(&times),
        ao5: ao5(&times),
        ao12: ao12(&times),
        best_ao5: best_ao5(&times),
        best_ao12: best_ao12(&times),
    }
}

/// Stats over solves recorded within a trailing window of days
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowStats {
    pub count: usize,
    pub best: Option<u64>,
    pub worst: Option<u64>,
    pub average: Option<f64>,
}

pub fn window_stats<'a, I>(entries: I, days: u32, now_ms: i64) -> WindowStats
where
    I: IntoIterator<Item = &'a TimeEntry>,
{
    let cutoff = now_ms - days as i64 * DAY_MS;
    let times: Vec<u64> = entries
        .into_iter()
        .filter(|e| e.timestamp >= cutoff)
        .map(|e| e.time)
        .collect();

    match basic_stats(&times) {
        Some(s) => WindowStats {
            count: s.count,
            best: Some(s.best),
            worst: Some(s.worst),
            average: Some(s.average),
        },
        None => WindowStats::default(),
    }
}

pub fn daily_stats(sessions: &[Session], now_ms: i64) -> WindowStats {
    window_stats(sessions.iter().flat_map(|s| &s.times), 1, now_ms)
}

pub fn weekly_stats(sessions: &[Session], now_ms: i64) -> WindowStats {
    window_stats(sessions.iter().flat_map(|s| &s.times), 7, now_ms)
}

pub fn monthly_stats(sessions: &[Session], now_ms: i64) -> WindowStats {
    window_stats(sessions.iter().flat_map(|s| &s.times), 30, now_ms)
}

fn as_f64(times: &[u64]) -> Vec<f64> {
    times.iter().map(|&t| t as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube_mode::CubeMode;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn basic_stats_of_empty_is_none() {
        assert_eq!(basic_stats(&[]), None);
    }

    #[test]
    fn basic_stats_scenario() {
        let s = basic_stats(&[1000, 2000, 3000, 4000, 5000]).unwrap();
        assert_eq!(
            s,
            BasicStats {
                best: 1000,
                worst: 5000,
                average: 3000.0,
                count: 5
            }
        );
    }

    #[test]
    fn average_is_not_rounded() {
        let s = basic_stats(&[1000, 1001]).unwrap();
        assert_eq!(s.average, 1000.5);
    }

    #[test]
    fn ao5_drops_best_and_worst() {
        assert_eq!(ao5(&[1000, 2000, 3000, 4000, 5000]), Some(3000.0));
        assert_eq!(ao5(&[5000, 1000, 4000, 2000, 3000]), Some(3000.0));
    }

    #[test]
    fn ao5_uses_most_recent_window() {
        // the old 100ms solve falls outside the last five
        assert_eq!(ao5(&[100, 9000, 1000, 2000, 3000, 8000]), Some(13000.0 / 3.0));
    }

    #[test]
    fn ao12_drops_only_one_each_side() {
        let times: Vec<u64> = (1..=12).map(|i| i * 1000).collect();
        // 2000..=11000 averages to 6500
        assert_eq!(ao12(&times), Some(6500.0));
    }

    #[test]
    fn averages_need_enough_times() {
        assert_eq!(ao5(&[1, 2, 3, 4]), None);
        assert_eq!(best_ao5(&[1, 2, 3, 4]), None);
        assert_eq!(ao12(&[1; 11]), None);
        assert_eq!(best_ao12(&[1; 11]), None);
        assert_eq!(average_of_n(&[1, 2, 3], 0), None);
        assert_eq!(average_of_n(&[1, 2], 2), None);
    }

    #[test]
    fn best_average_slides_over_every_window() {
        let times = [9000, 1000, 1000, 1000, 1000, 1000, 9000, 9000];
        assert_eq!(best_ao5(&times), Some(1000.0));
        assert_eq!(ao5(&times), Some(11000.0 / 3.0));
    }

    #[test]
    fn properties_hold_for_random_input() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let len = rng.gen_range(1..40);
            let times: Vec<u64> = (0..len).map(|_| rng.gen_range(0..120_000)).collect();
            let s = basic_stats(&times).unwrap();
            assert!(times.iter().all(|&t| s.best <= t && t <= s.worst));

            for n in [5, 12] {
                match (average_of_n(&times, n), best_average_of_n(&times, n)) {
                    (Some(recent), Some(best)) => {
                        let window = &times[times.len() - n..];
                        let lo = *window.iter().min().unwrap() as f64;
                        let hi = *window.iter().max().unwrap() as f64;
                        assert!(lo <= recent && recent <= hi);
                        assert!(best <= recent);
                        assert!(s.best as f64 <= best && best <= s.worst as f64);
                    }
                    (None, None) => assert!(times.len() < n),
                    other => panic!("inconsistent averages: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn window_stats_filters_by_timestamp() {
        let now = 100 * DAY_MS;
        let entries = vec![
            TimeEntry::new(5000, now - DAY_MS / 2, None),
            TimeEntry::new(7000, now - 3 * DAY_MS, None),
            TimeEntry::new(9000, now - 20 * DAY_MS, None),
            TimeEntry::new(1000, now - 40 * DAY_MS, None),
        ];
        let mut session = Session::new(1, "Session 1", 0, CubeMode::Three);
        session.times = entries;
        let sessions = vec![session];

        let day = daily_stats(&sessions, now);
        assert_eq!(day.count, 1);
        assert_eq!(day.best, Some(5000));

        let week = weekly_stats(&sessions, now);
        assert_eq!(week.count, 2);
        assert_eq!(week.average, Some(6000.0));

        let month = monthly_stats(&sessions, now);
        assert_eq!(month.count, 3);
        assert_eq!(month.worst, Some(9000));

        assert_eq!(window_stats(&Vec::<TimeEntry>::new(), 7, now), WindowStats::default());
    }

    #[test]
    fn session_stats_bundle() {
        let mut session = Session::new(1, "Session 1", 0, CubeMode::Three);
        for (i, t) in [1000, 2000, 3000, 4000, 5000].into_iter().enumerate() {
            session.times.push(TimeEntry::new(t, i as i64, None));
        }
        let s = session_stats(&session);
        assert_eq!(s.basic.map(|b| b.count), Some(5));
        assert_eq!(s.ao5, Some(3000.0));
        assert_eq!(s.best_ao5, Some(3000.0));
        assert_eq!(s.ao12, None);
    }
}
