use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags},
    execute,
    terminal::{self, disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use cubik::{
    app_dirs::AppDirs,
    config::{Backend, Config, ConfigStore, FileConfigStore},
    cube_mode::CubeMode,
    grouping::{group_sessions, GroupStats},
    model::Session,
    persistence::{JsonFileStore, PersistentStore, SqliteStore},
    runtime::{
        timer_input, CrosstermEventSource, FixedTicker, Runner, TimerEvent, TimerInput,
    },
    scramble::random_scramble,
    settings::TimerSettingsPatch,
    stats::{daily_stats, monthly_stats, session_stats, weekly_stats, WindowStats},
    store::SessionStore,
    timer::Timer,
    ui::render_timer,
    util::{format_opt, format_time},
    TICK_RATE_MS,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use serde::Serialize;
use std::{
    error::Error,
    io::{self, stdin, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// speedcubing timer with sessions, scrambles and rolling averages
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "A speedcubing timer for the terminal. Solves are grouped into sessions per puzzle category, a new session starts automatically after a long break, and every session tracks best, worst, Ao5 and Ao12."
)]
pub struct Cli {
    /// directory holding session data
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,

    /// storage backend
    #[clap(long, value_enum, global = true)]
    backend: Option<Backend>,

    /// config file to use instead of the default location
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// sessions file written by an older version, imported into a fresh store
    #[clap(long, global = true)]
    legacy_file: Option<PathBuf>,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// run the interactive timer (default)
    Timer {
        /// puzzle category to time
        #[clap(short, long)]
        mode: Option<CubeMode>,
    },
    /// print a scramble
    Scramble {
        /// puzzle category, defaults to the selected one
        #[clap(short, long)]
        mode: Option<CubeMode>,
        /// number of moves, defaults to the configured count
        #[clap(short = 'n', long)]
        moves: Option<u32>,
    },
    /// record a solve, e.g. `12.34` or `1:02.50`
    Add {
        #[clap(value_parser = parse_time_ms)]
        time: u64,
        #[clap(short, long)]
        scramble: Option<String>,
    },
    /// list sessions by month and week
    Sessions {
        /// only show sessions of this category
        #[clap(short, long)]
        mode: Option<CubeMode>,
    },
    /// solves and statistics of a session, the current one by default
    Stats { session: Option<i64> },
    /// start a new empty session
    NewSession {
        /// number used in the session name
        #[clap(short, long)]
        number: Option<u32>,
    },
    /// rename a session
    Rename { session: i64, name: String },
    /// delete a session
    Delete { session: i64 },
    /// delete a solve, numbered as shown by `stats`
    DeleteTime { session: i64, solve: usize },
    /// move a solve to the end of another session
    MoveTime { from: i64, solve: usize, to: i64 },
    /// make a session current
    Select { session: i64 },
    /// show or select the puzzle category
    Mode { mode: Option<CubeMode> },
    /// show or change timer settings
    Settings {
        #[clap(long)]
        inspection: Option<bool>,
        #[clap(long)]
        inspection_seconds: Option<f64>,
        #[clap(long)]
        countdown: Option<bool>,
        #[clap(long)]
        countdown_seconds: Option<f64>,
        #[clap(long)]
        moves: Option<f64>,
        #[clap(long)]
        auto_session_hours: Option<f64>,
    },
    /// write a session's solves as CSV
    Export {
        session: Option<i64>,
        /// output file, stdout when omitted
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// import sessions written by an older version into a fresh store
    Migrate { file: PathBuf },
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config_store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let config = config_store.load();
    init_tracing(&config.log_filter);

    let backend = cli.backend.unwrap_or(config.backend);
    let data_dir = cli.data_dir.clone().or_else(|| config.data_dir.clone());
    let path = AppDirs::store_path(backend, data_dir.as_deref())
        .ok_or("could not determine a data directory")?;
    tracing::debug!(%backend, path = %path.display(), "opening session store");

    let mut store = SessionStore::open(open_backend(backend, &path)?);

    if let Some(legacy) = cli.legacy_file.as_ref().or(config.legacy_file.as_ref()) {
        store.migrate_legacy_data(&JsonFileStore::with_path(legacy));
    }

    let result = run(cli.command, &mut store, &config);
    store.flush();
    result
}

fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn open_backend(backend: Backend, path: &Path) -> Result<Arc<dyn PersistentStore>, Box<dyn Error>> {
    Ok(match backend {
        Backend::Json => Arc::new(JsonFileStore::with_path(path)),
        Backend::Sqlite => Arc::new(SqliteStore::open(path)?),
    })
}

fn run(
    command: Option<Command>,
    store: &mut SessionStore,
    config: &Config,
) -> Result<(), Box<dyn Error>> {
    match command.unwrap_or(Command::Timer { mode: None }) {
        Command::Timer { mode } => {
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }
            if let Some(mode) = mode {
                store.update_preferred_cube_mode(mode);
            }
            store.roll_over_if_idle();
            run_timer(store, Duration::from_millis(config.hold_threshold_ms))?;
        }
        Command::Scramble { mode, moves } => {
            let mode = mode.unwrap_or(store.preferred_cube_mode());
            let moves = moves.unwrap_or(store.timer_settings().scramble_move_count);
            println!("{}", random_scramble(mode, moves));
        }
        Command::Add { time, scramble } => {
            store.roll_over_if_idle();
            let id = store.add_time(time, scramble);
            let session = store.session(id).ok_or("solve was not recorded")?;
            println!(
                "{}  -> {} ({} solves)",
                format_time(time as f64),
                session.name,
                session.times.len()
            );
        }
        Command::Sessions { mode } => print_sessions(store, mode),
        Command::Stats { session } => {
            let session = resolve_session(store, session)?;
            print_stats(store, session);
        }
        Command::NewSession { number } => {
            let id = store.create_session(number);
            if let Some(s) = store.session(id) {
                println!("{}  {}  [{}]", s.id, s.name, s.cube_mode.short_label());
            }
        }
        Command::Rename { session, name } => {
            if !store.rename_session(session, name) {
                return Err(no_session(session));
            }
        }
        Command::Delete { session } => {
            if !store.delete_session(session) {
                return Err(no_session(session));
            }
        }
        Command::DeleteTime { session, solve } => {
            let index = solve_index(solve)?;
            if !store.delete_time(session, index) {
                return Err(format!("no solve #{solve} in session {session}").into());
            }
        }
        Command::MoveTime { from, solve, to } => {
            let index = solve_index(solve)?;
            if !store.move_time(from, index, to) {
                return Err(format!("cannot move solve #{solve} from {from} to {to}").into());
            }
        }
        Command::Select { session } => {
            if !store.set_current_session(session) {
                return Err(no_session(session));
            }
            if let Some(mode) = store.current_session().map(|s| s.cube_mode) {
                if mode != store.preferred_cube_mode() {
                    store.update_preferred_cube_mode(mode);
                }
            }
        }
        Command::Mode { mode: Some(mode) } => {
            store.update_preferred_cube_mode(mode);
            println!("{}", mode.label());
        }
        Command::Mode { mode: None } => {
            let selected = store.preferred_cube_mode();
            for mode in CubeMode::ALL {
                let marker = if mode == selected { "*" } else { " " };
                println!("{} {:<9} {}", marker, mode.id(), mode.label());
            }
        }
        Command::Settings {
            inspection,
            inspection_seconds,
            countdown,
            countdown_seconds,
            moves,
            auto_session_hours,
        } => {
            let patch = TimerSettingsPatch {
                inspection_enabled: inspection,
                inspection_seconds,
                launch_countdown_enabled: countdown,
                launch_countdown_seconds: countdown_seconds,
                scramble_move_count: moves,
                auto_session_after_hours: auto_session_hours,
            };
            if !patch.is_empty() {
                store.update_timer_settings(&patch);
            }
            println!("{}", serde_json::to_string_pretty(&store.timer_settings())?);
        }
        Command::Export { session, output } => {
            let session = resolve_session(store, session)?;
            match output {
                Some(path) => export_csv(session, std::fs::File::create(path)?)?,
                None => export_csv(session, io::stdout().lock())?,
            }
        }
        Command::Migrate { file } => {
            if store.migrate_legacy_data(&JsonFileStore::with_path(&file)) {
                println!("imported {} sessions", store.sessions().len());
            } else {
                println!("nothing imported: the store already has data or the file is empty");
            }
        }
    }
    Ok(())
}

fn no_session(id: i64) -> Box<dyn Error> {
    format!("no session with id {id}").into()
}

fn solve_index(solve: usize) -> Result<usize, Box<dyn Error>> {
    solve
        .checked_sub(1)
        .ok_or_else(|| "solve numbers start at 1".into())
}

fn resolve_session(store: &SessionStore, id: Option<i64>) -> Result<&Session, Box<dyn Error>> {
    match id {
        Some(id) => store.session(id).ok_or_else(|| no_session(id)),
        None => store
            .current_session()
            .ok_or_else(|| "there is no current session".into()),
    }
}

/// Parse `ss.cc`, `m:ss.cc` or `h:mm:ss.cc` into milliseconds
fn parse_time_ms(raw: &str) -> Result<u64, String> {
    let invalid = || format!("`{raw}` is not a time like 12.34 or 1:02.50");
    let mut seconds = 0.0;
    for part in raw.trim().split(':') {
        let value: f64 = part.parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }
        seconds = seconds * 60.0 + value;
    }
    Ok((seconds * 1000.0).round() as u64)
}

fn group_line(stats: &GroupStats) -> String {
    format!(
        "{} sessions, {} solves, best {}, ao5 {}, ao12 {}",
        stats.session_count,
        stats.count,
        format_opt(stats.best.map(|b| b as f64)),
        format_opt(stats.ao5),
        format_opt(stats.ao12),
    )
}

fn print_sessions(store: &SessionStore, mode: Option<CubeMode>) {
    let sessions: Vec<Session> = store
        .sessions()
        .iter()
        .filter(|s| mode.map_or(true, |m| s.cube_mode == m))
        .cloned()
        .collect();
    let current = store.current_session_id();

    for month in group_sessions(&sessions) {
        println!("{}  ({})", month.key, group_line(&month.stats()));
        for week in &month.weeks {
            println!(
                "  {}  {} - {}  ({})",
                week.key,
                week.start.format("%b %d"),
                week.end.format("%b %d"),
                group_line(&week.stats())
            );
            for s in &week.sessions {
                let marker = if Some(s.id) == current { "*" } else { " " };
                let stats = session_stats(s);
                println!(
                    "   {} {}  {:<16} [{}]  {} solves  best {}  ao5 {}",
                    marker,
                    s.id,
                    s.name,
                    s.cube_mode.short_label(),
                    s.times.len(),
                    format_opt(stats.basic.map(|b| b.best as f64)),
                    format_opt(stats.ao5),
                );
            }
        }
    }
}

fn window_line(label: &str, w: &WindowStats) -> String {
    format!(
        "{:<6} {:>4} solves  best {}  avg {}",
        label,
        w.count,
        format_opt(w.best.map(|b| b as f64)),
        format_opt(w.average),
    )
}

fn print_stats(store: &SessionStore, session: &Session) {
    println!(
        "{}  {}  [{}]",
        session.id,
        session.name,
        session.cube_mode.label()
    );
    for (i, entry) in session.times.iter().enumerate() {
        let when = chrono::DateTime::from_timestamp_millis(entry.timestamp)
            .map(|d| d.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:>4}. {:>9}  {}  {}",
            i + 1,
            format_time(entry.time as f64),
            when,
            entry.scramble.as_deref().unwrap_or("")
        );
    }

    let stats = session_stats(session);
    if let Some(basic) = stats.basic {
        println!();
        println!(
            "best {}  worst {}  mean {}",
            format_time(basic.best as f64),
            format_time(basic.worst as f64),
            format_time(basic.average)
        );
    }
    println!(
        "ao5 {}  ao12 {}  best ao5 {}  best ao12 {}",
        format_opt(stats.ao5),
        format_opt(stats.ao12),
        format_opt(stats.best_ao5),
        format_opt(stats.best_ao12)
    );

    let same_mode: Vec<Session> = store
        .sessions_for_mode(session.cube_mode)
        .into_iter()
        .cloned()
        .collect();
    let now = chrono::Utc::now().timestamp_millis();
    println!();
    println!("{}", window_line("day", &daily_stats(&same_mode, now)));
    println!("{}", window_line("week", &weekly_stats(&same_mode, now)));
    println!("{}", window_line("month", &monthly_stats(&same_mode, now)));
}

#[derive(Serialize)]
struct CsvSolve<'a> {
    solve: usize,
    time_ms: u64,
    time: String,
    timestamp: String,
    scramble: &'a str,
}

fn export_csv<W: Write>(session: &Session, out: W) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_writer(out);
    for (i, entry) in session.times.iter().enumerate() {
        wtr.serialize(CsvSolve {
            solve: i + 1,
            time_ms: entry.time,
            time: format_time(entry.time as f64),
            timestamp: cubik::model::iso_timestamp(entry.timestamp),
            scramble: entry.scramble.as_deref().unwrap_or(""),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn run_timer(store: &mut SessionStore, hold_threshold: Duration) -> Result<(), Box<dyn Error>> {
    let reports_release = terminal::supports_keyboard_enhancement().unwrap_or(false);
    let hold = if reports_release {
        hold_threshold
    } else {
        Duration::ZERO
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    if reports_release {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )?;
    }
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.hide_cursor()?;

    let result = timer_loop(&mut terminal, store, hold, reports_release);

    if reports_release {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn timer_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    store: &mut SessionStore,
    hold: Duration,
    reports_release: bool,
) -> Result<(), Box<dyn Error>> {
    let mut timer = Timer::new(store.timer_settings(), store.preferred_cube_mode(), hold);
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let now = Instant::now();
    terminal.draw(|f| render_timer(f, &timer, store, now))?;

    loop {
        let event = runner.step();
        let now = Instant::now();
        match event {
            TimerEvent::Tick => {
                timer.tick(now);
                if store.poll_remote() {
                    timer.set_settings(store.timer_settings());
                }
            }
            TimerEvent::Resize => terminal.autoresize()?,
            TimerEvent::Key(key) => match timer_input(&key, reports_release) {
                Some(TimerInput::Press) => timer.press(now),
                Some(TimerInput::Release) => timer.release(now, store),
                Some(TimerInput::Tap) => {
                    timer.press(now);
                    timer.release(now, store);
                }
                Some(TimerInput::NewScramble) if !timer.is_active() => timer.new_scramble(),
                Some(TimerInput::Quit) => break,
                _ => {}
            },
        }
        terminal.draw(|f| render_timer(f, &timer, store, now))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubik::model::TimeEntry;

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::parse_from(["cubik", "--backend", "sqlite", "add", "1:02.5", "-s", "R U"]);
        assert_eq!(cli.backend, Some(Backend::Sqlite));
        match cli.command {
            Some(Command::Add { time, scramble }) => {
                assert_eq!(time, 62_500);
                assert_eq!(scramble.as_deref(), Some("R U"));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from(["cubik", "scramble", "--mode", "pyraminx", "-n", "12"]);
        assert!(matches!(
            cli.command,
            Some(Command::Scramble {
                mode: Some(CubeMode::Pyraminx),
                moves: Some(12)
            })
        ));
    }

    #[test]
    fn cli_debug_asserts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_solve_times() {
        assert_eq!(parse_time_ms("12.34"), Ok(12_340));
        assert_eq!(parse_time_ms("1:02.50"), Ok(62_500));
        assert_eq!(parse_time_ms("1:00:00"), Ok(3_600_000));
        assert!(parse_time_ms("abc").is_err());
        assert!(parse_time_ms("-3").is_err());
        assert!(parse_time_ms("1::2").is_err());
    }

    #[test]
    fn solve_numbers_are_one_based() {
        assert_eq!(solve_index(1).unwrap(), 0);
        assert!(solve_index(0).is_err());
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let mut session = Session::new(1, "Session 1", 0, CubeMode::Three);
        session
            .times
            .push(TimeEntry::new(12_345, 1_704_067_200_000, Some("R U".into())));
        let mut buf = Vec::new();
        export_csv(&session, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("solve,time_ms,time,timestamp,scramble"));
        assert_eq!(
            lines.next(),
            Some("1,12345,0:12.34,2024-01-01T00:00:00.000Z,R U")
        );
    }
}
