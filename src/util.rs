// RPLA: Generation and Execution of RPL Attack Experiments on Simulated Sensor Networks
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Utility module collection of functions

use std::{env, path::Path};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use lazy_static::lazy_static;
use log::LevelFilter;

/// Logging configuration picked up from the working directory, if present.
pub const LOG_CONFIG: &str = "log4rs.yml";

lazy_static! {
    /// All progress bars are drawn through this, so that log lines are printed above them.
    static ref PROGRESS: MultiProgress = MultiProgress::new();
}

/// Initialize logging. Without increased verbosity, `log4rs.yml` is used when it exists in the
/// working directory. Otherwise, log to the terminal with `pretty_env_logger`, at a level given by
/// `verbosity` (0: info, 1: debug, 2+: trace) and refined by `RUST_LOG`.
pub fn init_logging(verbosity: u8) {
    if verbosity == 0 && Path::new(LOG_CONFIG).exists() {
        match log4rs::init_file(LOG_CONFIG, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("Cannot load {LOG_CONFIG}, logging to the terminal: {e}"),
        }
    }

    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(level);
    if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let logger = builder.build();
    let max_level = logger.filter();
    match LogWrapper::new(PROGRESS.clone(), logger).try_init() {
        Ok(()) => log::set_max_level(max_level),
        Err(e) => eprintln!("Cannot initialize logging: {e}"),
    }
}

/// Progress bar over `len` experiments, printing the current experiment as message.
pub fn progress_bar(len: usize) -> ProgressBar {
    let style = ProgressStyle::with_template("[{bar:40}] {pos:>3}/{len:3} {msg}, elapsed: {elapsed}")
        .map(|s| s.progress_chars("##-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    PROGRESS.add(ProgressBar::new(len as u64).with_style(style))
}
