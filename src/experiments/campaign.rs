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
//! Module that makes and runs all experiments of a simulation campaign.
//!
//! A campaign is described by a JSON manifest mapping experiment names to their parameters:
//!
//! ```json
//! {
//!   "exp1": {"target": "sky", "mtype": "1"},
//!   "exp2": {"target": "sky", "mtype": "2"}
//! }
//! ```

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde_json::Value;

use rpla_utils::{fs_utils::expand_user, other::get_timestamp, process::CommandRunner};

use super::{clean, make, run, BuiltBinaries, ExperimentError, MakeError};
use crate::{config::Config, parameters::RawParameters, template::MANIFEST_TEMPLATE, util};

/// Experiments of a campaign, by name.
pub type Manifest = BTreeMap<String, RawParameters>;

pub const DEFAULT_MANIFEST: &str = "experiments";
pub const DEFAULT_NEW_MANIFEST: &str = "my_simulation";
pub const DEFAULT_FULL_CAMPAIGN: &str = "rpl-attacks";

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("Cannot access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cannot parse manifest {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Manifest {path:?} is not an object of experiments")]
    NotAnObject { path: PathBuf },
    #[error("Parameters of experiment `{name}` must be an object")]
    InvalidEntry { name: String },
    #[error("Manifest {0:?} already exists, not overwriting it")]
    AlreadyExists(PathBuf),
    #[error("Cannot make experiment `{name}`: {source}")]
    Make {
        name: String,
        #[source]
        source: MakeError,
    },
    #[error("Experiment `{name}`: {source}")]
    Experiment {
        name: String,
        #[source]
        source: ExperimentError,
    },
}

/// Outcome of making all experiments of a campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignReport {
    /// Experiments that were made.
    pub made: Vec<String>,
    /// Experiments that were rejected, with the reason.
    pub skipped: Vec<(String, String)>,
}

/// Resolve the path of a manifest: a bare name refers to a file in the experiments folder, and
/// `.json` is appended when no extension is given.
pub fn resolve_manifest_path(config: &Config, exp_file: &str) -> PathBuf {
    let mut path = expand_user(exp_file);
    if path.extension().is_none() {
        path.set_extension("json");
    }
    let is_bare = path
        .parent()
        .map(|p| p.as_os_str().is_empty())
        .unwrap_or(true);
    if is_bare {
        config.experiments_folder.join(path)
    } else {
        path
    }
}

/// Load the experiments of the manifest at `path`.
pub fn get_experiments(path: &Path) -> Result<Manifest, CampaignError> {
    let content = fs::read_to_string(path).map_err(|source| CampaignError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| CampaignError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Object(entries) = value else {
        return Err(CampaignError::NotAnObject {
            path: path.to_path_buf(),
        });
    };
    entries
        .into_iter()
        .map(|(name, params)| match params {
            Value::Object(params) => Ok((name, params)),
            Value::Null => Ok((name, RawParameters::new())),
            _ => Err(CampaignError::InvalidEntry { name }),
        })
        .collect()
}

/// Make all experiments of the manifest `exp_file`, removing existing experiments of the same
/// name first. Experiments with an invalid name or invalid parameters are skipped; any other
/// error stops the campaign.
pub async fn make_all(
    config: &Config,
    runner: &mut dyn CommandRunner,
    exp_file: &str,
) -> Result<CampaignReport, CampaignError> {
    let path = resolve_manifest_path(config, exp_file);
    let experiments = get_experiments(&path)?;
    log::info!(
        "MAKING {} EXPERIMENTS OF CAMPAIGN {path:?} ({})",
        experiments.len(),
        get_timestamp()
    );

    let bar = util::progress_bar(experiments.len());
    let mut reuse: Option<BuiltBinaries> = None;
    let mut report = CampaignReport::default();
    for (name, params) in experiments {
        bar.set_message(name.clone());
        match clean(config, &name) {
            Ok(()) => {}
            Err(ExperimentError::Validation(e)) => {
                log::error!("Skipping experiment '{name}': {e}");
                report.skipped.push((name, e.to_string()));
                bar.inc(1);
                continue;
            }
            Err(source) => {
                bar.abandon();
                return Err(CampaignError::Experiment { name, source });
            }
        }
        match make(config, runner, &name, &params, &mut reuse).await {
            Ok(_) => report.made.push(name),
            Err(e) if e.is_rejection() => {
                log::error!("Skipping experiment '{name}': {e}");
                report.skipped.push((name, e.to_string()));
            }
            Err(source) => {
                bar.abandon();
                return Err(CampaignError::Make { name, source });
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(report)
}

/// Run all experiments of the manifest `exp_file`. Returns the names of the experiments run.
pub async fn run_all(
    config: &Config,
    runner: &mut dyn CommandRunner,
    exp_file: &str,
) -> Result<Vec<String>, CampaignError> {
    let path = resolve_manifest_path(config, exp_file);
    let experiments = get_experiments(&path)?;
    log::info!(
        "RUNNING {} EXPERIMENTS OF CAMPAIGN {path:?} ({})",
        experiments.len(),
        get_timestamp()
    );

    let bar = util::progress_bar(experiments.len());
    let mut done = Vec::new();
    for name in experiments.into_keys() {
        bar.set_message(name.clone());
        if let Err(source) = run(config, runner, &name).await {
            bar.abandon();
            return Err(CampaignError::Experiment { name, source });
        }
        done.push(name);
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(done)
}

/// Create a new campaign manifest at `exp_file` from the manifest template.
pub fn prepare(config: &Config, exp_file: &str) -> Result<PathBuf, CampaignError> {
    let path = resolve_manifest_path(config, exp_file);
    log::info!("CREATING NEW EXPERIMENT CAMPAIGN AT {path:?}");
    if path.exists() {
        return Err(CampaignError::AlreadyExists(path));
    }
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| CampaignError::Io { path, source }
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let template = config.templates_folder().join(MANIFEST_TEMPLATE);
    fs::copy(&template, &path).map_err(io_error(&template))?;
    Ok(path)
}

/// Prepare the campaign `exp_file` unless it already exists, then make and run all of its
/// experiments.
pub async fn rip_my_slip(
    config: &Config,
    runner: &mut dyn CommandRunner,
    exp_file: &str,
) -> Result<CampaignReport, CampaignError> {
    if !resolve_manifest_path(config, exp_file).exists() {
        prepare(config, exp_file)?;
    }
    let report = make_all(config, runner, exp_file).await?;
    for name in &report.made {
        run(config, runner, name)
            .await
            .map_err(|source| CampaignError::Experiment {
                name: name.clone(),
                source,
            })?;
    }
    Ok(report)
}
