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
//! Module to create, build, run and remove single experiments.
//!
//! An experiment lives in its own folder below the experiments folder:
//!
//! ```text
//! <experiments_folder>/<name>/
//! ├── Makefile
//! ├── simulation_with_malicious.csc
//! ├── simulation_without_malicious.csc
//! ├── motes/      compiled root, sensor and malicious firmwares
//! ├── data/       raw simulation output
//! └── results/
//! ```

pub mod campaign;
pub mod make;
pub mod rpl_swap;

pub use campaign::*;
pub use make::*;

use std::{
    io,
    path::{Path, PathBuf},
};

use rpla_utils::{
    fs_utils::{remove_files, remove_folder},
    process::{CommandRunner, Invocation, ProcessError},
};

use crate::{
    config::Config,
    parameters::{validate_name, Target, ValidationError},
};

pub const MOTES: &str = "motes";
pub const DATA: &str = "data";
pub const RESULTS: &str = "results";
/// Log files left behind by Cooja after a headless run.
pub const COOJA_LOGS: [&str; 2] = ["COOJA.log", "COOJA.testlog"];

#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Experiment {0:?} does not exist, make it first")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Location of a named experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Experiment {
    pub name: String,
    pub path: PathBuf,
}

impl Experiment {
    pub fn new(config: &Config, name: &str) -> Result<Self, ValidationError> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            path: config.experiment_folder(name),
        })
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    pub fn motes(&self) -> PathBuf {
        self.path.join(MOTES)
    }

    pub fn data(&self) -> PathBuf {
        self.path.join(DATA)
    }

    pub fn results(&self) -> PathBuf {
        self.path.join(RESULTS)
    }

    /// Compiled firmware of a mote (`root`, `sensor` or `malicious`) for the given target.
    pub fn binary(&self, mote: &str, target: Target) -> PathBuf {
        self.path.join(binary_name(mote, target))
    }

    /// Invocation of `make` within the experiment folder.
    pub fn make(&self, rule: impl Into<String>) -> Invocation {
        Invocation::new("make").arg(rule).current_dir(&self.path)
    }
}

/// Path of a compiled mote firmware relative to the experiment folder, e.g. `motes/root.z1`.
pub fn binary_name(mote: &str, target: Target) -> String {
    format!("{MOTES}/{mote}.{target}")
}

/// Sources that root and sensor firmwares are compiled from, relative to the experiment folder.
pub const COMMON_SOURCES: [&str; 3] = ["motes/root.c", "motes/sensor.c", "motes/project-conf.h"];

/// Root and sensor firmwares compiled earlier in the same batch. Later experiments of the batch
/// copy them instead of compiling them again, as long as they target the same platform and
/// their rendered root and sensor sources are identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltBinaries {
    /// Experiment folder holding the binaries.
    pub path: PathBuf,
    pub target: Target,
    /// Rendered [`COMMON_SOURCES`] the binaries were compiled from.
    pub sources: Vec<String>,
}

impl BuiltBinaries {
    /// The binaries, relative to the experiment folder.
    pub fn files(&self) -> [String; 2] {
        [
            binary_name("root", self.target),
            binary_name("sensor", self.target),
        ]
    }

    /// Whether the binaries can be used for an experiment on `target` whose rendered common
    /// sources are `sources`, i.e., they were built from the same input and are still there.
    pub fn reusable_for(&self, target: Target, sources: &[String]) -> bool {
        self.target == target
            && self.sources == sources
            && self.files().iter().all(|f| self.path.join(f).is_file())
    }
}

/// Read the rendered [`COMMON_SOURCES`] of the experiment at `path`. Missing files read as empty.
pub fn common_sources(path: &Path) -> io::Result<Vec<String>> {
    COMMON_SOURCES
        .iter()
        .map(|f| match std::fs::read_to_string(path.join(f)) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        })
        .collect()
}

/// Remove the folder of the experiment `name`, if it exists.
pub fn clean(config: &Config, name: &str) -> Result<(), ExperimentError> {
    let experiment = Experiment::new(config, name)?;
    log::debug!(" > Cleaning folder {:?}...", experiment.path);
    remove_folder(&experiment.path)?;
    Ok(())
}

/// Run both simulations of the experiment `name` (without, then with the malicious mote) with
/// Cooja in headless mode.
pub async fn run(
    config: &Config,
    runner: &mut dyn CommandRunner,
    name: &str,
) -> Result<(), ExperimentError> {
    log::info!("PROCESSING EXPERIMENT '{name}'");
    let experiment = existing(config, name)?;
    log::debug!(" > Running both simulations (with and without the malicious mote)...");
    runner
        .run(&experiment.make("run-without-malicious"))
        .await?;
    runner.run(&experiment.make("run-with-malicious")).await?;
    remove_files(&experiment.path, COOJA_LOGS)?;
    Ok(())
}

/// Open the simulation of the experiment `name` in the Cooja GUI.
pub async fn cooja(
    config: &Config,
    runner: &mut dyn CommandRunner,
    name: &str,
    with_malicious: bool,
) -> Result<(), ExperimentError> {
    log::info!("STARTING COOJA WITH EXPERIMENT '{name}'");
    let experiment = existing(config, name)?;
    std::fs::create_dir_all(experiment.data())?;
    let rule = if with_malicious {
        "cooja-with-malicious"
    } else {
        "cooja-without-malicious"
    };
    runner
        .run(&experiment.make(rule).interactive())
        .await?;
    Ok(())
}

fn existing(config: &Config, name: &str) -> Result<Experiment, ExperimentError> {
    let experiment = Experiment::new(config, name)?;
    if !experiment.exists() {
        return Err(ExperimentError::NotFound(experiment.path));
    }
    Ok(experiment)
}

/// Check that `path` contains the layout of a made experiment for `target`.
pub fn check_layout(path: &Path, target: Target) -> Vec<String> {
    let mut missing: Vec<String> = [MOTES, DATA, RESULTS]
        .into_iter()
        .filter(|dir| !path.join(dir).is_dir())
        .map(|dir| format!("{dir}/"))
        .collect();
    missing.extend(
        ["root", "sensor", "malicious"]
            .into_iter()
            .map(|mote| binary_name(mote, target))
            .filter(|bin| !path.join(bin).is_file()),
    );
    missing
}
