use crate::cube_mode::CubeMode;
use crate::scramble::generate_scramble;
use crate::settings::TimerSettings;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};

/// Receives finished solves
pub trait SolveRecorder {
    fn record_solve(&mut self, elapsed_ms: u64, scramble: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    /// Pressed, hold threshold not reached yet
    Holding,
    Ready,
    Inspection,
    Countdown,
    Running,
    Stopped,
}

/// The solve timer.
///
/// Every input carries the instant it happened at, so the machine never
/// reads a clock itself. Phase durations are measured from the instant the
/// phase began.
#[derive(Debug)]
pub struct Timer {
    phase: TimerPhase,
    /// Phase to return to when a hold is let go too early
    held_from: TimerPhase,
    phase_started: Option<Instant>,
    settings: TimerSettings,
    mode: CubeMode,
    hold_threshold: Duration,
    scramble: String,
    last_solve_ms: Option<u64>,
    rng: StdRng,
}

impl Timer {
    pub fn new(settings: TimerSettings, mode: CubeMode, hold_threshold: Duration) -> Self {
        Self::with_rng(settings, mode, hold_threshold, StdRng::from_entropy())
    }

    pub fn with_rng(
        settings: TimerSettings,
        mode: CubeMode,
        hold_threshold: Duration,
        rng: StdRng,
    ) -> Self {
        let mut timer = Self {
            phase: TimerPhase::Idle,
            held_from: TimerPhase::Idle,
            phase_started: None,
            settings,
            mode,
            hold_threshold,
            scramble: String::new(),
            last_solve_ms: None,
            rng,
        };
        timer.new_scramble();
        timer
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn scramble(&self) -> &str {
        &self.scramble
    }

    pub fn mode(&self) -> CubeMode {
        self.mode
    }

    pub fn last_solve_ms(&self) -> Option<u64> {
        self.last_solve_ms
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            TimerPhase::Inspection | TimerPhase::Countdown | TimerPhase::Running
        )
    }

    pub fn new_scramble(&mut self) {
        self.scramble = generate_scramble(self.mode, self.settings.scramble_move_count, &mut self.rng);
    }

    /// Change category. Ignored while a solve is in progress.
    pub fn set_mode(&mut self, mode: CubeMode) {
        if self.is_active() || self.mode == mode {
            return;
        }
        self.mode = mode;
        self.new_scramble();
    }

    pub fn set_settings(&mut self, settings: TimerSettings) {
        let regenerate = settings.scramble_move_count != self.settings.scramble_move_count;
        self.settings = settings;
        if regenerate && !self.is_active() {
            self.new_scramble();
        }
    }

    pub fn press(&mut self, now: Instant) {
        match self.phase {
            TimerPhase::Idle | TimerPhase::Stopped => {
                self.held_from = self.phase;
                self.enter(TimerPhase::Holding, now);
                // without a hold, a tap on a finished solve only clears it
                if self.hold_threshold.is_zero() && self.held_from == TimerPhase::Idle {
                    self.enter(TimerPhase::Ready, now);
                }
            }
            _ => {}
        }
    }

    pub fn release(&mut self, now: Instant, recorder: &mut dyn SolveRecorder) {
        match self.phase {
            TimerPhase::Holding => {
                // a short tap on a finished solve clears it
                self.phase = TimerPhase::Idle;
                self.phase_started = None;
                if self.held_from == TimerPhase::Stopped {
                    self.last_solve_ms = None;
                }
            }
            TimerPhase::Ready => self.launch(now),
            TimerPhase::Inspection | TimerPhase::Countdown => self.cancel(),
            TimerPhase::Running => {
                let elapsed = self.elapsed_ms(now);
                self.phase = TimerPhase::Stopped;
                self.phase_started = None;
                self.last_solve_ms = Some(elapsed);
                recorder.record_solve(elapsed, &self.scramble);
                self.new_scramble();
            }
            TimerPhase::Stopped => {
                self.phase = TimerPhase::Idle;
                self.last_solve_ms = None;
            }
            TimerPhase::Idle => {}
        }
    }

    /// Advance time-driven transitions
    pub fn tick(&mut self, now: Instant) {
        loop {
            let Some(started) = self.phase_started else {
                return;
            };
            let due = match self.phase {
                TimerPhase::Holding => started + self.hold_threshold,
                TimerPhase::Inspection => started + self.inspection_duration(),
                TimerPhase::Countdown => started + self.countdown_duration(),
                _ => return,
            };
            if now < due {
                return;
            }
            match self.phase {
                TimerPhase::Holding => self.enter(TimerPhase::Ready, due),
                TimerPhase::Inspection => self.after_inspection(due),
                _ => self.enter(TimerPhase::Running, due),
            }
        }
    }

    /// Solve time so far while running, the recorded time once stopped
    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        match (self.phase, self.phase_started) {
            (TimerPhase::Running, Some(start)) => {
                now.saturating_duration_since(start).as_millis() as u64
            }
            (TimerPhase::Stopped, _) => self.last_solve_ms.unwrap_or(0),
            _ => 0,
        }
    }

    pub fn inspection_remaining(&self, now: Instant) -> Option<Duration> {
        match (self.phase, self.phase_started) {
            (TimerPhase::Inspection, Some(start)) => Some(
                self.inspection_duration()
                    .saturating_sub(now.saturating_duration_since(start)),
            ),
            _ => None,
        }
    }

    /// Whole seconds left before the launch, counting down to 1
    pub fn countdown_remaining_secs(&self, now: Instant) -> Option<u64> {
        match (self.phase, self.phase_started) {
            (TimerPhase::Countdown, Some(start)) => {
                let elapsed = now.saturating_duration_since(start).as_secs();
                Some((self.settings.launch_countdown_seconds as u64).saturating_sub(elapsed))
            }
            _ => None,
        }
    }

    fn launch(&mut self, now: Instant) {
        if self.settings.inspection_enabled {
            self.enter(TimerPhase::Inspection, now);
        } else {
            self.after_inspection(now);
        }
    }

    fn after_inspection(&mut self, at: Instant) {
        if self.settings.launch_countdown_enabled {
            self.enter(TimerPhase::Countdown, at);
        } else {
            self.enter(TimerPhase::Running, at);
        }
    }

    fn cancel(&mut self) {
        self.phase = TimerPhase::Idle;
        self.phase_started = None;
        self.new_scramble();
    }

    fn enter(&mut self, phase: TimerPhase, at: Instant) {
        self.phase = phase;
        self.phase_started = Some(at);
    }

    fn inspection_duration(&self) -> Duration {
        Duration::from_secs(self.settings.inspection_seconds as u64)
    }

    fn countdown_duration(&self) -> Duration {
        Duration::from_secs(self.settings.launch_countdown_seconds as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[derive(Default)]
    struct Recorded(Vec<(u64, String)>);

    impl SolveRecorder for Recorded {
        fn record_solve(&mut self, elapsed_ms: u64, scramble: &str) {
            self.0.push((elapsed_ms, scramble.to_string()));
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn timer(settings: TimerSettings, hold: u64) -> Timer {
        Timer::with_rng(settings, CubeMode::Three, ms(hold), StdRng::seed_from_u64(11))
    }

    fn bare() -> TimerSettings {
        TimerSettings {
            inspection_enabled: false,
            launch_countdown_enabled: false,
            ..TimerSettings::default()
        }
    }

    #[test]
    fn short_hold_does_not_arm() {
        let t0 = Instant::now();
        let mut t = timer(bare(), 500);
        let mut rec = Recorded::default();

        t.press(t0);
        assert_eq!(t.phase(), TimerPhase::Holding);
        t.tick(t0 + ms(300));
        assert_eq!(t.phase(), TimerPhase::Holding);
        t.release(t0 + ms(400), &mut rec);
        assert_eq!(t.phase(), TimerPhase::Idle);
        assert!(rec.0.is_empty());
    }

    #[test]
    fn full_solve_without_inspection() {
        let t0 = Instant::now();
        let mut t = timer(bare(), 500);
        let mut rec = Recorded::default();
        let scramble = t.scramble().to_string();

        t.press(t0);
        t.tick(t0 + ms(500));
        assert_eq!(t.phase(), TimerPhase::Ready);
        t.release(t0 + ms(800), &mut rec);
        assert_eq!(t.phase(), TimerPhase::Running);

        for i in 1..=100 {
            t.tick(t0 + ms(800 + i * 10));
        }
        assert_eq!(t.elapsed_ms(t0 + ms(1_800)), 1_000);

        t.release(t0 + ms(13_145), &mut rec);
        assert_eq!(t.phase(), TimerPhase::Stopped);
        assert_eq!(rec.0, vec![(12_345, scramble.clone())]);
        assert_eq!(t.last_solve_ms(), Some(12_345));
        assert_eq!(t.elapsed_ms(t0 + ms(99_999)), 12_345);
        assert_ne!(t.scramble(), scramble);
    }

    #[test]
    fn tap_after_stop_resets_to_idle() {
        let t0 = Instant::now();
        let mut t = timer(bare(), 500);
        let mut rec = Recorded::default();
        t.press(t0);
        t.tick(t0 + ms(600));
        t.release(t0 + ms(600), &mut rec);
        t.release(t0 + ms(5_600), &mut rec);
        assert_eq!(t.phase(), TimerPhase::Stopped);

        t.press(t0 + ms(7_000));
        t.release(t0 + ms(7_100), &mut rec);
        assert_eq!(t.phase(), TimerPhase::Idle);
        assert_eq!(t.last_solve_ms(), None);
    }

    #[test]
    fn zero_hold_tap_after_stop_resets_before_next_attempt() {
        let t0 = Instant::now();
        let mut t = timer(bare(), 0);
        let mut rec = Recorded::default();
        t.press(t0);
        t.release(t0, &mut rec);
        t.press(t0 + ms(4_000));
        t.release(t0 + ms(4_000), &mut rec);
        assert_eq!(t.phase(), TimerPhase::Stopped);

        t.press(t0 + ms(6_000));
        t.release(t0 + ms(6_000), &mut rec);
        assert_eq!(t.phase(), TimerPhase::Idle);
        assert_eq!(t.last_solve_ms(), None);

        t.press(t0 + ms(7_000));
        assert_eq!(t.phase(), TimerPhase::Ready);
        t.release(t0 + ms(7_000), &mut rec);
        assert_eq!(t.phase(), TimerPhase::Running);
        assert_eq!(rec.0.len(), 1);
    }

    #[test]
    fn inspection_flows_into_countdown_then_running() {
        let t0 = Instant::now();
        let settings = TimerSettings {
            inspection_seconds: 15,
            launch_countdown_seconds: 5,
            ..TimerSettings::default()
        };
        let mut t = timer(settings, 0);
        let mut rec = Recorded::default();

        t.press(t0);
        assert_eq!(t.phase(), TimerPhase::Ready);
        t.release(t0, &mut rec);
        assert_eq!(t.phase(), TimerPhase::Inspection);
        assert_eq!(t.inspection_remaining(t0 + ms(4_000)), Some(ms(11_000)));

        t.tick(t0 + ms(15_000));
        assert_eq!(t.phase(), TimerPhase::Countdown);
        assert_eq!(t.countdown_remaining_secs(t0 + ms(15_000)), Some(5));
        assert_eq!(t.countdown_remaining_secs(t0 + ms(17_500)), Some(3));

        t.tick(t0 + ms(20_000));
        assert_eq!(t.phase(), TimerPhase::Running);
        assert_eq!(t.elapsed_ms(t0 + ms(21_000)), 1_000);
    }

    #[test]
    fn late_tick_runs_from_expiry_instant() {
        let t0 = Instant::now();
        let settings = TimerSettings {
            inspection_seconds: 5,
            launch_countdown_seconds: 1,
            ..TimerSettings::default()
        };
        let mut t = timer(settings, 0);
        let mut rec = Recorded::default();
        t.press(t0);
        t.release(t0, &mut rec);

        // one tick far past both deadlines
        t.tick(t0 + ms(8_000));
        assert_eq!(t.phase(), TimerPhase::Running);
        assert_eq!(t.elapsed_ms(t0 + ms(8_000)), 2_000);
    }

    #[test]
    fn tap_during_inspection_or_countdown_cancels() {
        let t0 = Instant::now();
        let mut rec = Recorded::default();

        let mut t = timer(TimerSettings::default(), 0);
        let first = t.scramble().to_string();
        t.press(t0);
        t.release(t0, &mut rec);
        t.press(t0 + ms(2_000));
        t.release(t0 + ms(2_000), &mut rec);
        assert_eq!(t.phase(), TimerPhase::Idle);
        assert_ne!(t.scramble(), first);

        let mut t = timer(
            TimerSettings {
                inspection_enabled: false,
                ..TimerSettings::default()
            },
            0,
        );
        t.press(t0);
        t.release(t0, &mut rec);
        assert_eq!(t.phase(), TimerPhase::Countdown);
        t.release(t0 + ms(1_000), &mut rec);
        assert_eq!(t.phase(), TimerPhase::Idle);
        assert!(rec.0.is_empty());
    }

    #[test]
    fn countdown_only_when_inspection_disabled() {
        let t0 = Instant::now();
        let mut rec = Recorded::default();
        let mut t = timer(
            TimerSettings {
                inspection_enabled: false,
                launch_countdown_seconds: 3,
                ..TimerSettings::default()
            },
            0,
        );
        t.press(t0);
        t.release(t0, &mut rec);
        t.tick(t0 + ms(2_990));
        assert_eq!(t.phase(), TimerPhase::Countdown);
        t.tick(t0 + ms(3_000));
        assert_eq!(t.phase(), TimerPhase::Running);
    }

    #[test]
    fn mode_changes_wait_for_idle() {
        let t0 = Instant::now();
        let mut rec = Recorded::default();
        let mut t = timer(bare(), 0);
        t.set_mode(CubeMode::SquareOne);
        assert!(t.scramble().starts_with('('));

        t.press(t0);
        t.release(t0, &mut rec);
        assert_matches!(t.phase(), TimerPhase::Running);
        t.set_mode(CubeMode::Three);
        assert_eq!(t.mode(), CubeMode::SquareOne);
    }

    #[test]
    fn move_count_setting_applies_to_next_scramble() {
        let mut t = timer(bare(), 0);
        t.set_settings(TimerSettings {
            scramble_move_count: 12,
            ..bare()
        });
        assert_eq!(t.scramble().split(' ').count(), 12);
    }
}
