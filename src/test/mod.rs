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
//! Test fixtures: a scratch framework/Contiki/experiments tree and a command runner that records
//! invocations and fakes the builds instead of calling the real toolchain.
//!
//! Use the following command to see the log output of the tests:
//!
//! ```shell
//! RUST_LOG=debug cargo test -- --nocapture --test-threads 1
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde_json::Value;

use rpla_utils::{
    fs_utils::{copy_folder, list_files},
    process::{CommandOutput, CommandRunner, Invocation, ProcessError},
};

use crate::{config::Config, parameters::RawParameters};

mod campaign;

/// Content of the original RPL library of the scratch Contiki tree.
pub const ORIGINAL_RPL: [(&str, &str); 2] = [("rpl.c", "/* original rpl */"), ("rpl-dag.c", "/* original dag */")];

pub fn raw(value: Value) -> RawParameters {
    match value {
        Value::Object(map) => map,
        v => panic!("parameters must be an object, got {v}"),
    }
}

/// Scratch environment, removed when dropped.
pub struct Fixture {
    tmp: tempfile::TempDir,
    pub config: Config,
}

impl Fixture {
    /// Framework folder with a copy of the real templates and add-ons, a Contiki tree with an RPL
    /// library and a Cooja folder, an empty experiments folder and a home folder.
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let config = Config {
            contiki_folder: root.join("contiki"),
            experiments_folder: root.join("Experiments"),
            framework_folder: root.join("framework"),
            home_folder: root.join("home"),
        };

        let sources = Path::new(env!("CARGO_MANIFEST_DIR"));
        copy_folder(sources.join("templates"), config.templates_folder()).unwrap();
        copy_folder(sources.join("addons"), config.addons_folder()).unwrap();
        fs::create_dir_all(config.scripts_folder()).unwrap();

        fs::create_dir_all(config.rpl_folder()).unwrap();
        for (file, content) in ORIGINAL_RPL {
            fs::write(config.rpl_folder().join(file), content).unwrap();
        }
        fs::create_dir_all(config.cooja_folder().join("apps")).unwrap();
        fs::create_dir_all(&config.experiments_folder).unwrap();
        fs::create_dir_all(&config.home_folder).unwrap();

        Self { tmp, config }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    /// An external RPL library, with a file that the original one does not have.
    pub fn external_rpl_library(&self) -> PathBuf {
        let ext = self.root().join("attack-rpl");
        fs::create_dir_all(&ext).unwrap();
        fs::write(ext.join("rpl.c"), "/* attack rpl */").unwrap();
        fs::write(ext.join("rpl-attack.c"), "/* attack */").unwrap();
        ext
    }

    /// Write a campaign manifest in the experiments folder and return its name.
    pub fn manifest(&self, name: &str, content: Value) -> String {
        let path = self.config.experiments_folder.join(format!("{name}.json"));
        fs::write(path, serde_json::to_string_pretty(&content).unwrap()).unwrap();
        name.to_string()
    }

    /// The templates folder holds exactly the files shipped with the framework.
    pub fn assert_templates_pristine(&self) {
        let shipped = list_files(Path::new(env!("CARGO_MANIFEST_DIR")).join("templates")).unwrap();
        assert_eq!(list_files(self.config.templates_folder()).unwrap(), shipped);
    }

    /// The RPL library of Contiki is the original one.
    pub fn assert_rpl_pristine(&self) {
        let rpl = self.config.rpl_folder();
        let mut expected: Vec<PathBuf> = ORIGINAL_RPL.iter().map(|(f, _)| PathBuf::from(f)).collect();
        expected.sort();
        assert_eq!(list_files(&rpl).unwrap(), expected);
        for (file, content) in ORIGINAL_RPL {
            assert_eq!(fs::read_to_string(rpl.join(file)).unwrap(), content);
        }
    }
}

type Hook = Box<dyn FnMut(&Invocation) + Send>;

/// Runner recording all invocations. Builds of motes (`make motes/<mote> TARGET=<target>`) create
/// the firmware and the usual build artifacts in the working directory.
#[derive(Default)]
pub struct RecordingRunner {
    pub invocations: Vec<Invocation>,
    /// Invocations whose command line contains one of these fail.
    failing: Vec<String>,
    /// Standard output of invocations whose program matches.
    stdout: Vec<(String, String)>,
    hook: Option<Hook>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, pattern: &str) -> Self {
        self.failing.push(pattern.to_string());
        self
    }

    pub fn with_stdout(mut self, program: &str, stdout: &str) -> Self {
        self.stdout.push((program.to_string(), stdout.to_string()));
        self
    }

    /// Call `hook` on every invocation, before it is executed.
    pub fn with_hook(mut self, hook: impl FnMut(&Invocation) + Send + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.invocations.iter().map(Invocation::command_line).collect()
    }

    fn fake_build(invocation: &Invocation) {
        let (Some(cwd), [rule, target]) = (&invocation.cwd, invocation.args.as_slice()) else {
            return;
        };
        let (Some(mote), Some(target)) = (rule.strip_prefix("motes/"), target.strip_prefix("TARGET="))
        else {
            return;
        };
        fs::write(cwd.join(format!("motes/{mote}.{target}")), "firmware").unwrap();
        for artifact in [
            format!("contiki-{target}.a"),
            format!("contiki-{target}.map"),
            "symbols.c".to_string(),
            "symbols.h".to_string(),
        ] {
            fs::write(cwd.join(artifact), "").unwrap();
        }
        fs::create_dir_all(cwd.join(format!("obj_{target}"))).unwrap();
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn execute(&mut self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        self.invocations.push(invocation.clone());
        if let Some(hook) = self.hook.as_mut() {
            hook(invocation);
        }
        let command_line = invocation.command_line();
        if self.failing.iter().any(|p| command_line.contains(p.as_str())) {
            return Ok(CommandOutput::exited(2).with_stderr("make: *** [fake] Error 1"));
        }
        if invocation.program == "make" {
            Self::fake_build(invocation);
        }
        let stdout = self
            .stdout
            .iter()
            .find(|(program, _)| *program == invocation.program)
            .map(|(_, stdout)| stdout.clone())
            .unwrap_or_default();
        Ok(CommandOutput::exited(0).with_stdout(stdout))
    }
}
