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
//! Materialization of an experiment: render its templates and compile its motes.

use std::{io, path::PathBuf};

use rpla_utils::{
    fs_utils::{copy_files, get_path, remove_files, remove_folder},
    process::{CommandRunner, Invocation, ProcessError},
};

use super::{common_sources, rpl_swap::RplSwap, BuiltBinaries, Experiment, DATA, MOTES, RESULTS};
use crate::{
    config::Config,
    parameters::{validated_parameters, RawParameters, Target, ValidationError},
    template::{render_templates, TemplateError, TemplateStaging, MALICIOUS_SOURCE},
};

#[derive(Debug, thiserror::Error)]
pub enum MakeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("External library {0:?} does not exist")]
    MissingExternalLibrary(PathBuf),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl MakeError {
    /// Errors raised before anything was created or built. These only concern the experiment at
    /// hand, all others concern the whole environment.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            MakeError::Validation(_) | MakeError::MissingExternalLibrary(_)
        )
    }
}

/// Summary of a made experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeReport {
    pub path: PathBuf,
    pub target: Target,
    /// The root and sensor binaries were copied from an earlier experiment.
    pub reused_binaries: bool,
    /// The malicious mote compiled successfully.
    pub malicious_built: bool,
}

/// Files produced by a Contiki build next to the firmware.
fn build_artifacts(target: Target) -> [String; 4] {
    [
        format!("contiki-{target}.a"),
        format!("contiki-{target}.map"),
        "symbols.c".to_string(),
        "symbols.h".to_string(),
    ]
}

fn remove_build_artifacts(experiment: &Experiment, target: Target) -> io::Result<()> {
    remove_files(&experiment.path, build_artifacts(target))?;
    remove_folder(experiment.path.join(format!("obj_{target}")))
}

fn build(experiment: &Experiment, mote: &str, target: Target) -> Invocation {
    experiment
        .make(format!("{MOTES}/{mote}"))
        .arg(format!("TARGET={target}"))
}

/// Create the experiment `name` from `raw` parameters: render its templates, then compile its
/// root, sensor and malicious motes.
///
/// Root and sensor binaries are taken from `reuse` when it holds binaries for the same target,
/// compiled from the same rendered sources; otherwise they are compiled and `reuse` is updated
/// to point at them. A failure to compile
/// the malicious mote is logged, but does not fail the experiment.
pub async fn make(
    config: &Config,
    runner: &mut dyn CommandRunner,
    name: &str,
    raw: &RawParameters,
    reuse: &mut Option<BuiltBinaries>,
) -> Result<MakeReport, MakeError> {
    log::info!("CREATING EXPERIMENT '{name}'");
    log::debug!(" > Validating parameters...");
    let experiment = Experiment::new(config, name)?;
    let templates_folder = config.templates_folder();
    let params = validated_parameters(raw, &templates_folder)?;
    if let Some(ext_lib) = &params.ext_lib {
        if !ext_lib.is_dir() {
            log::error!("External library {ext_lib:?} does not exist!");
            return Err(MakeError::MissingExternalLibrary(ext_lib.clone()));
        }
    }
    let target = params.target;

    log::debug!(" > Creating simulation...");
    for dir in [MOTES, DATA, RESULTS] {
        get_path(&experiment.path, [dir])?;
    }
    let mut ctx = params.context();
    ctx.insert("contiki".to_string(), config.contiki_folder.display().to_string());
    ctx.insert("cooja".to_string(), config.cooja_folder().display().to_string());
    let staging = TemplateStaging::stage(&templates_folder, &params.mtype)?;
    render_templates(&templates_folder, &experiment.path, &ctx)?;
    staging.unstage()?;

    log::debug!(" > Making motes...");
    let sources = common_sources(&experiment.path)?;
    let reused_binaries = match reuse.as_ref().filter(|b| b.reusable_for(target, &sources)) {
        Some(built) => {
            log::debug!(" > Reusing root and sensor binaries from {:?}", built.path);
            copy_files(&built.path, &experiment.path, built.files().map(|f| (f.clone(), f)))?;
            true
        }
        None => {
            runner.run(&build(&experiment, "root", target)).await?;
            runner.run(&build(&experiment, "sensor", target)).await?;
            remove_build_artifacts(&experiment, target)?;
            *reuse = Some(BuiltBinaries {
                path: experiment.path.clone(),
                target,
                sources,
            });
            false
        }
    };
    remove_files(&experiment.path, ["motes/root.c", "motes/sensor.c"])?;

    let malicious_built = make_malicious(config, runner, &experiment, &params.ext_lib, target).await?;

    log::debug!(" > Rebuilding Cooja...");
    let cooja = config.cooja_folder();
    runner
        .run(&Invocation::new("ant").arg("clean").current_dir(&cooja))
        .await?;
    runner
        .run(&Invocation::new("ant").arg("jar").current_dir(&cooja))
        .await?;

    Ok(MakeReport {
        path: experiment.path,
        target,
        reused_binaries,
        malicious_built,
    })
}

/// Compile the malicious mote, with the external RPL library if one is given. Returns whether
/// the compilation succeeded.
async fn make_malicious(
    config: &Config,
    runner: &mut dyn CommandRunner,
    experiment: &Experiment,
    ext_lib: &Option<PathBuf>,
    target: Target,
) -> Result<bool, MakeError> {
    let swap = match ext_lib {
        Some(ext_lib) => Some(RplSwap::install(
            &config.rpl_folder(),
            ext_lib,
            &experiment.path.join(".tmp"),
        )?),
        None => None,
    };

    let built = match runner.run(&build(experiment, "malicious", target)).await {
        Ok(_) => true,
        Err(e) => {
            log::error!("{e}");
            false
        }
    };

    if let Some(swap) = swap {
        swap.restore()?;
    }
    remove_build_artifacts(experiment, target)?;
    remove_files(&experiment.path, [MALICIOUS_SOURCE])?;
    Ok(built)
}

#[cfg(test)]
mod test {
    use std::fs;

    use serde_json::json;

    use super::*;
    use crate::test::{raw, Fixture, RecordingRunner};

    #[tokio::test]
    async fn make_experiment() {
        let fixture = Fixture::new();
        let mut runner = RecordingRunner::new();
        let mut reuse = None;

        let report = make(
            &fixture.config,
            &mut runner,
            "exp",
            &raw(json!({"target": "sky", "mtype": 1, "n": 5})),
            &mut reuse,
        )
        .await
        .unwrap();

        assert!(!report.reused_binaries);
        assert!(report.malicious_built);
        assert_eq!(
            runner.command_lines(),
            vec![
                "make motes/root TARGET=sky",
                "make motes/sensor TARGET=sky",
                "make motes/malicious TARGET=sky",
                "ant clean",
                "ant jar",
            ]
        );
        assert_eq!(runner.invocations[3].cwd, Some(fixture.config.cooja_folder()));

        let path = &report.path;
        assert_eq!(reuse.as_ref().map(|b| &b.path), Some(path));
        assert!(crate::experiments::check_layout(path, Target::Sky).is_empty());
        for leftover in [
            "contiki-sky.a",
            "contiki-sky.map",
            "symbols.c",
            "symbols.h",
            "obj_sky",
            "motes/root.c",
            "motes/sensor.c",
            "motes/malicious.c",
        ] {
            assert!(!path.join(leftover).exists(), "{leftover} was not removed");
        }

        let with = fs::read_to_string(path.join("simulation_with_malicious.csc")).unwrap();
        let without = fs::read_to_string(path.join("simulation_without_malicious.csc")).unwrap();
        assert!(with.contains("<motetype_identifier>malicious</motetype_identifier>"));
        assert!(!without.contains("<motetype_identifier>malicious</motetype_identifier>"));
        assert_eq!(with.matches("<motetype_identifier>sensor</motetype_identifier>").count(), 5);

        let makefile = fs::read_to_string(path.join("Makefile")).unwrap();
        assert!(makefile.contains(&fixture.config.contiki_folder.display().to_string()));
        fixture.assert_templates_pristine();
    }

    #[tokio::test]
    async fn reuse_binaries_of_same_target() {
        let fixture = Fixture::new();
        let mut runner = RecordingRunner::new();
        let mut reuse = None;
        let sky = raw(json!({"target": "sky"}));

        make(&fixture.config, &mut runner, "a", &sky, &mut reuse)
            .await
            .unwrap();
        runner.invocations.clear();

        let report = make(&fixture.config, &mut runner, "b", &sky, &mut reuse)
            .await
            .unwrap();
        assert!(report.reused_binaries);
        assert_eq!(
            runner.command_lines(),
            vec!["make motes/malicious TARGET=sky", "ant clean", "ant jar"]
        );
        assert!(report.path.join("motes/root.sky").is_file());
        assert!(report.path.join("motes/sensor.sky").is_file());
        // the reuse source stays the first experiment
        assert_eq!(reuse.unwrap().path, fixture.config.experiment_folder("a"));
    }

    #[tokio::test]
    async fn rebuild_for_other_target() {
        let fixture = Fixture::new();
        let mut runner = RecordingRunner::new();
        let mut reuse = None;

        make(&fixture.config, &mut runner, "a", &raw(json!({"target": "sky"})), &mut reuse)
            .await
            .unwrap();
        let report = make(&fixture.config, &mut runner, "b", &raw(json!({"target": "z1"})), &mut reuse)
            .await
            .unwrap();
        assert!(!report.reused_binaries);
        assert!(runner
            .command_lines()
            .contains(&"make motes/root TARGET=z1".to_string()));
        assert_eq!(reuse.unwrap().target, Target::Z1);
    }

    #[tokio::test]
    async fn rebuild_for_other_network_size() {
        let fixture = Fixture::new();
        let mut runner = RecordingRunner::new();
        let mut reuse = None;

        make(&fixture.config, &mut runner, "a", &raw(json!({"target": "sky", "n": 5})), &mut reuse)
            .await
            .unwrap();
        let report = make(
            &fixture.config,
            &mut runner,
            "b",
            &raw(json!({"target": "sky", "n": 50, "debug": true})),
            &mut reuse,
        )
        .await
        .unwrap();
        assert!(!report.reused_binaries);
        let root_builds = runner
            .command_lines()
            .iter()
            .filter(|l| l.starts_with("make motes/root"))
            .count();
        assert_eq!(root_builds, 2);
        assert_eq!(reuse.unwrap().path, report.path);
        let conf = fs::read_to_string(report.path.join("motes/project-conf.h")).unwrap();
        assert!(conf.contains("#define UIP_CONF_MAX_ROUTES 51"));
    }

    #[tokio::test]
    async fn invalid_parameters_abort_early() {
        let fixture = Fixture::new();
        let mut runner = RecordingRunner::new();
        let mut reuse = None;

        for bad in [json!({"target": "bogus"}), json!({"mtype": "42"})] {
            let err = make(&fixture.config, &mut runner, "bad", &raw(bad), &mut reuse)
                .await
                .unwrap_err();
            assert!(matches!(err, MakeError::Validation(_)));
            assert!(err.is_rejection());
        }
        assert!(runner.invocations.is_empty());
        assert!(!fixture.config.experiment_folder("bad").exists());
        fixture.assert_templates_pristine();
    }

    #[tokio::test]
    async fn missing_external_library() {
        let fixture = Fixture::new();
        let mut runner = RecordingRunner::new();
        let missing = fixture.root().join("no-such-lib");
        let err = make(
            &fixture.config,
            &mut runner,
            "exp",
            &raw(json!({"ext_lib": missing})),
            &mut None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MakeError::MissingExternalLibrary(_)));
        assert!(runner.invocations.is_empty());
        assert!(!fixture.config.experiment_folder("exp").exists());
    }

    #[tokio::test]
    async fn root_build_failure_is_fatal() {
        let fixture = Fixture::new();
        let mut runner = RecordingRunner::new().failing("motes/root");
        let mut reuse = None;
        let err = make(&fixture.config, &mut runner, "exp", &Default::default(), &mut reuse)
            .await
            .unwrap_err();
        assert!(matches!(err, MakeError::Process(_)));
        assert!(!err.is_rejection());
        assert_eq!(runner.invocations.len(), 1);
        assert!(reuse.is_none());
        fixture.assert_templates_pristine();
    }

    #[tokio::test]
    async fn malicious_build_failure_is_tolerated() {
        let fixture = Fixture::new();
        let ext_lib = fixture.external_rpl_library();
        let mut runner = RecordingRunner::new().failing("motes/malicious");
        let report = make(
            &fixture.config,
            &mut runner,
            "exp",
            &raw(json!({"ext_lib": ext_lib})),
            &mut None,
        )
        .await
        .unwrap();
        assert!(!report.malicious_built);
        assert_eq!(runner.command_lines().last().unwrap(), "ant jar");
        fixture.assert_rpl_pristine();
        assert!(!report.path.join(".tmp").exists());
    }
}
