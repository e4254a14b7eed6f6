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
//! Command line interface of the RPL attacks framework.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use rpl_attacks::{
    commands::{self, TaskContext},
    config::Config,
    util,
};
use rpla_utils::{
    fs_utils::expand_user,
    process::{CommandRunner, DryRunRunner, SystemRunner},
};

#[derive(Parser, Debug)]
#[command(name = "rpla", about, long_about = None)]
struct Args {
    /// Configuration file [default: `$RPLA_CONFIG` or `~/.rpl-attacks.conf`]
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Only log the external commands instead of executing them
    #[arg(long)]
    dry_run: bool,
    /// Increase the log level (`-v` for debug, `-vv` for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Task to execute, see `rpla list`
    task: String,
    /// Positional parameters and `key=value` pairs of the task
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    util::init_logging(args.verbose);

    let config_path = args
        .config
        .map(expand_user)
        .unwrap_or_else(Config::default_path);
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        // a broken configuration file can still be replaced
        Err(e) if args.task == "config" => {
            log::warn!("{e}");
            Config::default()
        }
        Err(e) => return Err(e).context("Cannot load the configuration, run `rpla config` first"),
    };
    log::debug!("{config:?}");

    let runner: Box<dyn CommandRunner> = if args.dry_run {
        Box::new(DryRunRunner)
    } else {
        Box::new(SystemRunner)
    };
    let mut ctx = TaskContext {
        config,
        config_path,
        runner,
    };
    commands::dispatch(&mut ctx, &args.task, &args.args)
        .await
        .with_context(|| format!("Task `{}` failed", args.task))
}
