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
//! Table of the tasks available on the command line.
//!
//! A task is invoked as `rpla <task> [positional...] [key=value...]`. Positional arguments fill
//! the declared parameters of the task in order, `key=value` pairs fill them by name. Tasks that
//! accept free parameters (`make`) collect all other pairs, with values parsed as JSON when
//! possible and taken as plain strings otherwise.

use std::{collections::BTreeMap, future::Future, path::PathBuf, pin::Pin, str::FromStr};

use itertools::Itertools;
use serde_json::Value;

use rpla_utils::process::CommandRunner;

use crate::{
    config::{Config, ConfigError, DEFAULT_CONTIKI_FOLDER, DEFAULT_EXPERIMENTS_FOLDER},
    experiments::{
        self, CampaignError, ExperimentError, MakeError, DEFAULT_FULL_CAMPAIGN, DEFAULT_MANIFEST,
        DEFAULT_NEW_MANIFEST,
    },
    parameters::RawParameters,
    setup::{self, SetupError, UpgradePolicy},
};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Experiment(#[from] ExperimentError),
    #[error(transparent)]
    Make(#[from] MakeError),
    #[error(transparent)]
    Campaign(#[from] CampaignError),
    #[error(transparent)]
    Setup(#[from] SetupError),
}

/// Everything a task works with.
pub struct TaskContext {
    pub config: Config,
    /// Configuration file, written by the `config` task.
    pub config_path: PathBuf,
    pub runner: Box<dyn CommandRunner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Text,
    /// `true`/`false`, `yes`/`no` or `1`/`0`.
    Flag,
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    /// `None` for required parameters.
    pub default: Option<&'static str>,
    pub kind: ParamKind,
}

const fn required(name: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        default: None,
        kind: ParamKind::Text,
    }
}

const fn optional(name: &'static str, default: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        default: Some(default),
        kind: ParamKind::Text,
    }
}

const fn flag(name: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        default: Some("false"),
        kind: ParamKind::Flag,
    }
}

pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TaskError>> + 'a>>;
pub type Handler = for<'a> fn(&'a mut TaskContext, TaskArgs) -> TaskFuture<'a>;

pub struct TaskSpec {
    pub name: &'static str,
    pub about: &'static str,
    pub params: &'static [ParamSpec],
    /// Collect unknown `key=value` pairs as free parameters.
    pub free_params: bool,
    pub handler: Handler,
}

/// Arguments of a task after parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskArgs {
    values: BTreeMap<&'static str, String>,
    /// Free parameters, only for tasks accepting them.
    pub extra: RawParameters,
}

impl TaskArgs {
    pub fn get(&self, name: &str) -> Result<&str, TaskError> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| TaskError::Usage(format!("Missing parameter `{name}`")))
    }

    pub fn flag(&self, name: &str) -> Result<bool, TaskError> {
        parse_flag(self.get(name)?)
            .ok_or_else(|| TaskError::Usage(format!("Parameter `{name}` must be a boolean")))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

pub const TASKS: &[TaskSpec] = &[
    TaskSpec {
        name: "clean",
        about: "Remove the folder of an experiment",
        params: &[required("name")],
        free_params: false,
        handler: clean_task,
    },
    TaskSpec {
        name: "cooja",
        about: "Open an experiment in the Cooja GUI",
        params: &[required("name"), flag("with_malicious")],
        free_params: false,
        handler: cooja_task,
    },
    TaskSpec {
        name: "make",
        about: "Create an experiment and compile its motes; other key=value pairs are its parameters",
        params: &[required("name")],
        free_params: true,
        handler: make_task,
    },
    TaskSpec {
        name: "run",
        about: "Run both simulations of an experiment",
        params: &[required("name")],
        free_params: false,
        handler: run_task,
    },
    TaskSpec {
        name: "make_all",
        about: "Make all experiments of a campaign",
        params: &[optional("exp_file", DEFAULT_MANIFEST)],
        free_params: false,
        handler: make_all_task,
    },
    TaskSpec {
        name: "run_all",
        about: "Run all experiments of a campaign",
        params: &[optional("exp_file", DEFAULT_MANIFEST)],
        free_params: false,
        handler: run_all_task,
    },
    TaskSpec {
        name: "prepare",
        about: "Create a new campaign from the campaign template",
        params: &[optional("exp_file", DEFAULT_NEW_MANIFEST)],
        free_params: false,
        handler: prepare_task,
    },
    TaskSpec {
        name: "rip_my_slip",
        about: "Prepare a campaign if needed, then make and run all of its experiments",
        params: &[optional("exp_file", DEFAULT_FULL_CAMPAIGN)],
        free_params: false,
        handler: rip_my_slip_task,
    },
    TaskSpec {
        name: "config",
        about: "Write the configuration file",
        params: &[
            optional("contiki_folder", DEFAULT_CONTIKI_FOLDER),
            optional("experiments_folder", DEFAULT_EXPERIMENTS_FOLDER),
        ],
        free_params: false,
        handler: config_task,
    },
    TaskSpec {
        name: "setup",
        about: "Install the Cooja add-ons and check msp430-gcc (upgrade: ask, yes or no)",
        params: &[optional("upgrade", "ask")],
        free_params: false,
        handler: setup_task,
    },
    TaskSpec {
        name: "test",
        about: "Set up the framework and make a test experiment",
        params: &[optional("upgrade", "ask")],
        free_params: false,
        handler: test_task,
    },
    TaskSpec {
        name: "list",
        about: "List the available tasks",
        params: &[],
        free_params: false,
        handler: list_task,
    },
];

pub fn find_task(name: &str) -> Result<&'static TaskSpec, TaskError> {
    TASKS.iter().find(|t| t.name == name).ok_or_else(|| {
        TaskError::Usage(format!(
            "Unknown task `{name}`, expected one of: {}",
            TASKS.iter().map(|t| t.name).join(", ")
        ))
    })
}

/// Assign the command line arguments `args` to the parameters of `task`.
pub fn parse_task_args(task: &TaskSpec, args: &[String]) -> Result<TaskArgs, TaskError> {
    let mut parsed = TaskArgs::default();
    let mut positional = task.params.iter();

    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            let Some(param) = positional.find(|p| !parsed.values.contains_key(p.name)) else {
                return Err(TaskError::Usage(format!(
                    "Too many arguments for task `{}`: {arg:?}",
                    task.name
                )));
            };
            parsed.values.insert(param.name, arg.clone());
            continue;
        };
        let key = key.trim();
        if let Some(param) = task.params.iter().find(|p| p.name == key) {
            if parsed.values.insert(param.name, value.to_string()).is_some() {
                return Err(TaskError::Usage(format!("Parameter `{key}` given twice")));
            }
        } else if task.free_params {
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
            if parsed.extra.insert(key.to_string(), value).is_some() {
                return Err(TaskError::Usage(format!("Parameter `{key}` given twice")));
            }
        } else {
            return Err(TaskError::Usage(format!(
                "Unknown parameter `{key}` for task `{}`",
                task.name
            )));
        }
    }

    for param in task.params {
        match (parsed.values.get(param.name), param.default) {
            (None, Some(default)) => {
                parsed.values.insert(param.name, default.to_string());
            }
            (None, None) => {
                return Err(TaskError::Usage(format!(
                    "Missing parameter `{}` for task `{}`",
                    param.name, task.name
                )))
            }
            (Some(value), _) => {
                if param.kind == ParamKind::Flag && parse_flag(value).is_none() {
                    return Err(TaskError::Usage(format!(
                        "Parameter `{}` must be a boolean, got {value:?}",
                        param.name
                    )));
                }
            }
        }
    }
    Ok(parsed)
}

/// Execute the task `name` with the command line arguments `args`.
pub async fn dispatch(ctx: &mut TaskContext, name: &str, args: &[String]) -> Result<(), TaskError> {
    let task = find_task(name)?;
    let args = parse_task_args(task, args)?;
    log::trace!("executing task `{name}` with {args:?}");
    (task.handler)(ctx, args).await
}

/// Help text listing every task with its parameters.
pub fn usage() -> String {
    TASKS
        .iter()
        .map(|task| {
            let params = task
                .params
                .iter()
                .map(|p| match p.default {
                    Some(default) => format!("[{}={default}]", p.name),
                    None => format!("<{}>", p.name),
                })
                .chain(task.free_params.then(|| "[key=value...]".to_string()))
                .join(" ");
            format!("{:<12} {:<48} {}", task.name, params, task.about)
        })
        .join("\n")
}

fn upgrade_policy(args: &TaskArgs) -> Result<UpgradePolicy, TaskError> {
    let value = args.get("upgrade")?;
    UpgradePolicy::from_str(value)
        .map_err(|_| TaskError::Usage(format!("Invalid upgrade policy {value:?}, expected ask, yes or no")))
}

fn clean_task(ctx: &mut TaskContext, args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        experiments::clean(&ctx.config, args.get("name")?)?;
        Ok(())
    })
}

fn cooja_task(ctx: &mut TaskContext, args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        let with_malicious = args.flag("with_malicious")?;
        experiments::cooja(&ctx.config, ctx.runner.as_mut(), args.get("name")?, with_malicious).await?;
        Ok(())
    })
}

fn make_task(ctx: &mut TaskContext, args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        let report = experiments::make(
            &ctx.config,
            ctx.runner.as_mut(),
            args.get("name")?,
            &args.extra,
            &mut None,
        )
        .await?;
        if !report.malicious_built {
            log::warn!("The malicious mote of {:?} could not be compiled", report.path);
        }
        Ok(())
    })
}

fn run_task(ctx: &mut TaskContext, args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        experiments::run(&ctx.config, ctx.runner.as_mut(), args.get("name")?).await?;
        Ok(())
    })
}

fn make_all_task(ctx: &mut TaskContext, args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        let report = experiments::make_all(&ctx.config, ctx.runner.as_mut(), args.get("exp_file")?).await?;
        log::info!(
            "Made {} experiments, skipped {}",
            report.made.len(),
            report.skipped.len()
        );
        Ok(())
    })
}

fn run_all_task(ctx: &mut TaskContext, args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        experiments::run_all(&ctx.config, ctx.runner.as_mut(), args.get("exp_file")?).await?;
        Ok(())
    })
}

fn prepare_task(ctx: &mut TaskContext, args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        let path = experiments::prepare(&ctx.config, args.get("exp_file")?)?;
        log::info!("Campaign created at {path:?}, edit it and run `rpla make_all`");
        Ok(())
    })
}

fn rip_my_slip_task(ctx: &mut TaskContext, args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        experiments::rip_my_slip(&ctx.config, ctx.runner.as_mut(), args.get("exp_file")?).await?;
        Ok(())
    })
}

fn config_task(ctx: &mut TaskContext, args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        log::info!("CREATING CONFIGURATION FILE AT {:?}", ctx.config_path);
        let contiki_folder = args.get("contiki_folder")?;
        let experiments_folder = args.get("experiments_folder")?;
        Config::write(&ctx.config_path, contiki_folder, experiments_folder)?;
        ctx.config = Config::load(&ctx.config_path)?;
        Ok(())
    })
}

fn setup_task(ctx: &mut TaskContext, args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        let policy = upgrade_policy(&args)?;
        setup::setup(&ctx.config, ctx.runner.as_mut(), policy).await?;
        Ok(())
    })
}

fn test_task(ctx: &mut TaskContext, args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        let policy = upgrade_policy(&args)?;
        setup::test(&ctx.config, ctx.runner.as_mut(), policy).await?;
        Ok(())
    })
}

fn list_task(_ctx: &mut TaskContext, _args: TaskArgs) -> TaskFuture<'_> {
    Box::pin(async move {
        println!("{}", usage());
        Ok(())
    })
}
