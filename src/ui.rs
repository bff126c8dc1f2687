use std::time::Instant;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
    Frame,
};

use crate::stats::session_stats;
use crate::store::SessionStore;
use crate::timer::{Timer, TimerPhase};
use crate::util::{format_opt, format_time};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;

/// Big readout for the current phase and the colour it is drawn in
fn headline(timer: &Timer, now: Instant) -> (String, Color) {
    match timer.phase() {
        TimerPhase::Idle => (
            format_time(timer.last_solve_ms().unwrap_or(0) as f64),
            Color::White,
        ),
        TimerPhase::Holding => ("hold...".to_string(), Color::Red),
        TimerPhase::Ready => ("release to start".to_string(), Color::Green),
        TimerPhase::Inspection => {
            let left = timer.inspection_remaining(now).unwrap_or_default();
            (
                format!("inspection {}", left.as_secs_f64().ceil() as u64),
                Color::Yellow,
            )
        }
        TimerPhase::Countdown => (
            format!("starting in {}", timer.countdown_remaining_secs(now).unwrap_or(0)),
            Color::Yellow,
        ),
        TimerPhase::Running => (format_time(timer.elapsed_ms(now) as f64), Color::Cyan),
        TimerPhase::Stopped => (format_time(timer.elapsed_ms(now) as f64), Color::Green),
    }
}

pub fn render_timer(f: &mut Frame, timer: &Timer, store: &SessionStore, now: Instant) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().add_modifier(Modifier::DIM);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(f.area());

    let mut header = vec![Line::from(vec![
        Span::styled("cubik  ", bold),
        Span::styled(timer.mode().label(), Style::default().fg(Color::Magenta)),
    ])];
    if let Some(session) = store.current_session() {
        let stats = session_stats(session);
        header.push(Line::from(format!(
            "{}  ({} solves)",
            session.name,
            session.times.len()
        )));
        header.push(Line::styled(
            format!(
                "best {}  ao5 {}  ao12 {}",
                format_opt(stats.basic.map(|b| b.best as f64)),
                format_opt(stats.ao5),
                format_opt(stats.ao12)
            ),
            dim,
        ));
    }
    f.render_widget(Paragraph::new(header), chunks[0]);

    let scramble = Paragraph::new(Span::styled(timer.scramble(), bold))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(scramble, chunks[1]);

    let (text, colour) = headline(timer, now);
    let readout = Paragraph::new(Span::styled(text, bold.fg(colour))).alignment(Alignment::Center);
    f.render_widget(readout, chunks[2]);

    let help = Paragraph::new(Span::styled(
        "space: start/stop   n: new scramble   q: quit",
        dim.add_modifier(Modifier::ITALIC),
    ))
    .alignment(Alignment::Center);
    f.render_widget(help, chunks[3]);
}
