use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Unified event type consumed by the timer loop
#[derive(Clone, Debug)]
pub enum TimerEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// What a key means to the timer screen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerInput {
    Press,
    Release,
    /// Press immediately followed by release, for terminals that do not
    /// report key releases
    Tap,
    NewScramble,
    Quit,
}

/// Translate a key event. `reports_release` is whether the terminal sends
/// release events for held keys.
pub fn timer_input(key: &KeyEvent, reports_release: bool) -> Option<TimerInput> {
    if key.kind == KeyEventKind::Repeat {
        return None;
    }
    let released = key.kind == KeyEventKind::Release;

    match key.code {
        KeyCode::Char(' ') if reports_release && released => Some(TimerInput::Release),
        KeyCode::Char(' ') if reports_release => Some(TimerInput::Press),
        KeyCode::Char(' ') if !released => Some(TimerInput::Tap),
        _ if released => None,
        KeyCode::Esc | KeyCode::Char('q') => Some(TimerInput::Quit),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(TimerInput::Quit)
        }
        KeyCode::Char('n') => Some(TimerInput::NewScramble),
        _ => None,
    }
}

/// Where key and resize events come from
pub trait TimerEventSource: Send + 'static {
    /// Waits at most `timeout`; `Err(Timeout)` means nothing arrived.
    fn recv_timeout(&self, timeout: Duration) -> Result<TimerEvent, RecvTimeoutError>;
}

/// Reads crossterm events on a background thread
pub struct CrosstermEventSource {
    rx: Receiver<TimerEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let ev = match event::read() {
                Ok(CtEvent::Key(key)) => TimerEvent::Key(key),
                Ok(CtEvent::Resize(_, _)) => TimerEvent::Resize,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "terminal event stream closed");
                    break;
                }
            };
            if tx.send(ev).is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<TimerEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Redraw cadence for the timer screen
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Constant redraw cadence
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Channel-fed event source for tests and scripted input
pub struct ChannelEventSource {
    rx: Receiver<TimerEvent>,
}

impl ChannelEventSource {
    pub fn new(rx: Receiver<TimerEvent>) -> Self {
        Self { rx }
    }
}

impl TimerEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<TimerEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the timer one event/tick at a time
pub struct Runner<E: TimerEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: TimerEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Next input, or `Tick` once the redraw interval passes without one
    pub fn step(&self) -> TimerEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                TimerEvent::Tick
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode, kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn idle_step_yields_tick() {
        let (_tx, rx) = mpsc::channel();
        let runner = Runner::new(
            ChannelEventSource::new(rx),
            FixedTicker::new(Duration::from_millis(1)),
        );
        assert_matches!(runner.step(), TimerEvent::Tick);
    }

    #[test]
    fn queued_key_is_delivered_before_tick() {
        let (tx, rx) = mpsc::channel();
        tx.send(TimerEvent::Resize).unwrap();
        let runner = Runner::new(
            ChannelEventSource::new(rx),
            FixedTicker::new(Duration::from_millis(10)),
        );
        assert_matches!(runner.step(), TimerEvent::Resize);
    }

    #[test]
    fn space_maps_to_press_and_release_when_reported() {
        let down = key(KeyCode::Char(' '), KeyEventKind::Press);
        let up = key(KeyCode::Char(' '), KeyEventKind::Release);
        let held = key(KeyCode::Char(' '), KeyEventKind::Repeat);

        assert_eq!(timer_input(&down, true), Some(TimerInput::Press));
        assert_eq!(timer_input(&up, true), Some(TimerInput::Release));
        assert_eq!(timer_input(&held, true), None);
    }

    #[test]
    fn space_is_a_tap_without_release_events() {
        let down = key(KeyCode::Char(' '), KeyEventKind::Press);
        assert_eq!(timer_input(&down, false), Some(TimerInput::Tap));
    }

    #[test]
    fn other_keys() {
        assert_eq!(
            timer_input(&key(KeyCode::Esc, KeyEventKind::Press), false),
            Some(TimerInput::Quit)
        );
        assert_eq!(
            timer_input(&key(KeyCode::Char('n'), KeyEventKind::Press), true),
            Some(TimerInput::NewScramble)
        );
        assert_eq!(
            timer_input(&key(KeyCode::Char('q'), KeyEventKind::Release), true),
            None
        );
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(timer_input(&ctrl_c, false), Some(TimerInput::Quit));
        assert_eq!(
            timer_input(&key(KeyCode::Char('x'), KeyEventKind::Press), false),
            None
        );
    }
}
