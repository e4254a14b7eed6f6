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
//! One-time setup of Cooja and of the MSP430 toolchain, and a self-test of the framework.
//!
//! The sources of Cooja are not patched: the add-ons are copied into its `apps` folder,
//! registered in `~/.cooja.user.properties`, and Cooja is rebuilt.

use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use serde_json::Map;

use rpla_utils::{
    fs_utils::copy_folder,
    other::is_yes,
    process::{CommandRunner, Invocation, ProcessError},
};

use crate::{
    config::Config,
    experiments::{check_layout, clean, make, ExperimentError, MakeError},
    parameters::Target,
};

/// Cooja add-on taking screenshots of the network visualizer.
pub const VISUALIZER_ADDON: &str = "visualizer_screenshot";
/// Version of `msp430-gcc` supporting the extended memory of the MSP430X motes.
pub const MSP430_EXPECTED_VERSION: &str = "msp430-gcc (GCC) 4.7.0 20120322";
pub const MSP430_UPGRADE_SCRIPT: &str = "upgrade-msp430.sh";
pub const MSP430_PATH_EXPORT: &str = "export PATH=/usr/local/msp430/bin:$PATH";
/// Project directories of a stock Cooja installation.
const DEFAULT_PROJECTDIRS: &str = "[APPS_DIR]/mrm;[APPS_DIR]/mspsim;[APPS_DIR]/avrora;\
                                   [APPS_DIR]/serial_socket;[APPS_DIR]/collect-view;\
                                   [APPS_DIR]/powertracker";
/// Name of the experiment made by the self-test.
pub const TEST_EXPERIMENT: &str = "test-simulation";

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Make(#[from] MakeError),
    #[error(transparent)]
    Experiment(#[from] ExperimentError),
    #[error("Test experiment is incomplete, missing: {0}")]
    IncompleteTest(String),
}

fn io_err(path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> SetupError {
    let path = path.as_ref().to_path_buf();
    move |source| SetupError::Io { path, source }
}

/// What to do when `msp430-gcc` is outdated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum UpgradePolicy {
    /// Ask on the terminal.
    #[default]
    Ask,
    Yes,
    No,
}

/// State of the MSP430 toolchain after the setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Msp430Status {
    UpToDate,
    Upgraded,
    Outdated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupReport {
    /// The Cooja add-ons were installed during this setup.
    pub addons_installed: bool,
    pub msp430: Msp430Status,
}

/// Install the Cooja add-ons (once, recorded by a marker file) and check the version of
/// `msp430-gcc`, upgrading it according to `policy`.
pub async fn setup(
    config: &Config,
    runner: &mut dyn CommandRunner,
    policy: UpgradePolicy,
) -> Result<SetupReport, SetupError> {
    let marker = config.setup_marker();
    let addons_installed = if marker.exists() {
        log::info!("COOJA ADD-ONS ALREADY INSTALLED");
        false
    } else {
        log::info!("INSTALLING COOJA ADD-ONS");
        install_cooja_addons(config, runner).await?;
        fs::write(&marker, "").map_err(io_err(&marker))?;
        true
    };
    let msp430 = check_msp430(config, runner, policy).await?;
    Ok(SetupReport {
        addons_installed,
        msp430,
    })
}

async fn install_cooja_addons(
    config: &Config,
    runner: &mut dyn CommandRunner,
) -> Result<(), SetupError> {
    let cooja = config.cooja_folder();
    let visualizer = cooja.join("apps").join(VISUALIZER_ADDON);
    if !visualizer.exists() {
        let src = config.addons_folder().join(VISUALIZER_ADDON);
        copy_folder(&src, &visualizer).map_err(io_err(&src))?;
    }
    let properties = config.cooja_user_properties();
    register_cooja_app(&properties, VISUALIZER_ADDON).map_err(io_err(&properties))?;

    let ant_clean = Invocation::new("ant").arg("clean").current_dir(&cooja);
    let out = runner.execute(&ant_clean).await?;
    if !out.is_success() {
        log::warn!("`ant clean` failed in {cooja:?}, continuing");
    }
    runner
        .run(&Invocation::new("ant").arg("jar").current_dir(&cooja))
        .await?;
    Ok(())
}

/// Add `[APPS_DIR]/<app>` to the project directories of the Cooja user properties. Returns
/// `false` if it was already registered.
pub fn register_cooja_app(properties: &Path, app: &str) -> io::Result<bool> {
    let content = match fs::read_to_string(properties) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    let entry = format!("[APPS_DIR]/{app}");
    let mut found = false;
    let mut registered = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| match line.strip_prefix("DEFAULT_PROJECTDIRS=") {
            Some(dirs) => {
                found = true;
                if dirs.split(';').any(|d| d == entry) {
                    registered = true;
                    line.to_string()
                } else {
                    format!("{line};{entry}")
                }
            }
            None => line.to_string(),
        })
        .collect();
    if registered {
        return Ok(false);
    }
    if !found {
        lines.push(format!("DEFAULT_PROJECTDIRS={DEFAULT_PROJECTDIRS};{entry}"));
    }
    fs::write(properties, lines.join("\n") + "\n")?;
    Ok(true)
}

async fn check_msp430(
    config: &Config,
    runner: &mut dyn CommandRunner,
    policy: UpgradePolicy,
) -> Result<Msp430Status, SetupError> {
    let version = match runner.execute(&Invocation::new("msp430-gcc").arg("--version")).await {
        Ok(out) => out.stdout,
        Err(e) => {
            log::debug!("{e}");
            String::new()
        }
    };
    if version.contains(MSP430_EXPECTED_VERSION) {
        log::info!("LIBRARY msp430-gcc IS UP-TO-DATE (4.7.0)");
        return Ok(Msp430Status::UpToDate);
    }

    let upgrade = match policy {
        UpgradePolicy::Yes => true,
        UpgradePolicy::No => false,
        UpgradePolicy::Ask => ask(
            "In order to extend msp430x memory support, it is necessary to upgrade msp430-gcc.\n\
             Would you like to upgrade it now ? (yes|no) [default: no] ",
        ),
    };
    if !upgrade {
        log::info!("UPGRADE OF LIBRARY msp430-gcc ABORTED");
        log::warn!("You may experience problems of mote memory size at compilation");
        return Ok(Msp430Status::Outdated);
    }

    log::info!("UPGRADING msp430-gcc TO VERSION 4.7.0");
    log::warn!(" > Upgrade now starts, this may take up to 30 minutes...");
    let scripts = config.scripts_folder();
    runner
        .run(
            &Invocation::new("sudo")
                .arg(format!("./{MSP430_UPGRADE_SCRIPT}"))
                .current_dir(&scripts)
                .interactive(),
        )
        .await?;
    runner
        .run(
            &Invocation::new("sudo")
                .args(["rm", "-r", "tmp/"])
                .current_dir(&scripts)
                .interactive(),
        )
        .await?;
    let profile = config.shell_profile();
    register_path_in_profile(&profile).map_err(io_err(&profile))?;
    Ok(Msp430Status::Upgraded)
}

fn ask(question: &str) -> bool {
    prompt(question, &mut io::stdin().lock(), &mut io::stdout())
}

/// Write `question` to `output` and read a yes/no answer from `input`. Anything but a yes,
/// including a failed read, is a no.
fn prompt(question: &str, input: &mut impl BufRead, output: &mut impl Write) -> bool {
    if let Err(e) = write!(output, "{question}").and_then(|_| output.flush()) {
        log::warn!("Cannot show the prompt: {e}");
    }
    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(_) => is_yes(&answer),
        Err(e) => {
            log::warn!("Cannot read the answer: {e}");
            false
        }
    }
}

/// Append the MSP430 toolchain to the `PATH` in the shell profile, once. Returns `false` if it
/// was already there.
pub fn register_path_in_profile(profile: &Path) -> io::Result<bool> {
    let content = match fs::read_to_string(profile) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    if content.lines().any(|l| l.trim() == MSP430_PATH_EXPORT) {
        return Ok(false);
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(profile)?;
    if !content.is_empty() && !content.ends_with('\n') {
        writeln!(file)?;
    }
    writeln!(file, "{MSP430_PATH_EXPORT}")?;
    Ok(true)
}

/// Set the framework up, then make the test experiment with default parameters and check that
/// all of its motes were built.
pub async fn test(
    config: &Config,
    runner: &mut dyn CommandRunner,
    policy: UpgradePolicy,
) -> Result<PathBuf, SetupError> {
    setup(config, runner, policy).await?;
    clean(config, TEST_EXPERIMENT)?;
    let report = make(config, runner, TEST_EXPERIMENT, &Map::new(), &mut None).await?;
    let missing = check_layout(&report.path, Target::default());
    if !missing.is_empty() {
        return Err(SetupError::IncompleteTest(missing.join(", ")));
    }
    log::info!("TEST EXPERIMENT MADE SUCCESSFULLY AT {:?}", report.path);
    Ok(report.path)
}
