// Store, stats and timer core shared by the binary and the integration tests.
pub mod app_dirs;
pub mod config;
pub mod cube_mode;
pub mod grouping;
pub mod model;
pub mod persistence;
pub mod runtime;
pub mod scramble;
pub mod settings;
pub mod stats;
pub mod store;
pub mod timer;
pub mod ui;
pub mod util;

/// Interval between timer redraws
pub const TICK_RATE_MS: u64 = 10;
