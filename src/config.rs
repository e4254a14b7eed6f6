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
//! Framework configuration: where Contiki is installed and where experiments are created.
//!
//! The configuration file (by default `~/.rpl-attacks.conf`) looks like this:
//!
//! ```text
//! [RPL Attacks Framework Configuration]
//! contiki_folder = ~/contiki
//! experiments_folder = ~/Experiments
//! ```

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use lazy_static::lazy_static;
use regex::Regex;

use rpla_utils::fs_utils::expand_user;

pub const CONFIG_HEADER: &str = "[RPL Attacks Framework Configuration]";
pub const DEFAULT_CONFIG_FILE: &str = "~/.rpl-attacks.conf";
/// Environment variable overwriting the location of the configuration file.
pub const CONFIG_ENV_VAR: &str = "RPLA_CONFIG";
pub const DEFAULT_CONTIKI_FOLDER: &str = "~/contiki";
pub const DEFAULT_EXPERIMENTS_FOLDER: &str = "~/Experiments";

/// Marker file recording that the Cooja add-ons were installed.
pub const SETUP_MARKER: &str = ".cooja_addons_installed";

lazy_static! {
    static ref SECTION: Regex = Regex::new(r"^\[(?P<name>[^\]]*)\]$").unwrap();
    static ref ENTRY: Regex =
        Regex::new(r"^(?P<key>[A-Za-z_][A-Za-z0-9_]*)\s*[=:]\s*(?P<value>.*?)$").unwrap();
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot access configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed line {line} in configuration file: {content:?}")]
    Malformed { line: usize, content: String },
}

/// Resolved configuration of the framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the Contiki checkout (including Cooja in `tools/cooja`).
    pub contiki_folder: PathBuf,
    /// Folder in which experiments and campaign manifests are created.
    pub experiments_folder: PathBuf,
    /// Folder holding `templates/`, `addons/` and `scripts/`.
    pub framework_folder: PathBuf,
    /// Home folder of the user, used for `~/.cooja.user.properties` and the shell profile.
    pub home_folder: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            contiki_folder: expand_user(DEFAULT_CONTIKI_FOLDER),
            experiments_folder: expand_user(DEFAULT_EXPERIMENTS_FOLDER),
            framework_folder: PathBuf::from(env!("CARGO_MANIFEST_DIR")),
            home_folder: expand_user("~"),
        }
    }
}

impl Config {
    /// Location of the configuration file, honoring `RPLA_CONFIG`.
    pub fn default_path() -> PathBuf {
        match env::var_os(CONFIG_ENV_VAR) {
            Some(path) => expand_user(PathBuf::from(path)),
            None => expand_user(DEFAULT_CONFIG_FILE),
        }
    }

    /// Load the configuration from `path`. A missing file yields the default configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => {
                log::debug!("Loading configuration from {path:?}");
                Self::parse(&content)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No configuration file at {path:?}, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse the content of a configuration file. Keys that are not set keep their default.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if SECTION.is_match(line) {
                continue;
            }
            let Some(caps) = ENTRY.captures(line) else {
                return Err(ConfigError::Malformed {
                    line: i + 1,
                    content: line.to_string(),
                });
            };
            let value = expand_user(caps["value"].trim());
            match &caps["key"] {
                "contiki_folder" => config.contiki_folder = value,
                "experiments_folder" => config.experiments_folder = value,
                "framework_folder" => config.framework_folder = value,
                key => log::warn!("Ignoring unknown configuration key `{key}`"),
            }
        }
        Ok(config)
    }

    /// Write a configuration file at `path`, overwriting any existing one.
    pub fn write(
        path: impl AsRef<Path>,
        contiki_folder: &str,
        experiments_folder: &str,
    ) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = format!(
            "{CONFIG_HEADER}\ncontiki_folder = {contiki_folder}\nexperiments_folder = {experiments_folder}\n"
        );
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(path, content).map_err(io_error)
    }

    pub fn cooja_folder(&self) -> PathBuf {
        self.contiki_folder.join("tools").join("cooja")
    }

    /// The RPL implementation of Contiki, replaced when an experiment uses an external library.
    pub fn rpl_folder(&self) -> PathBuf {
        self.contiki_folder.join("core").join("net").join("rpl")
    }

    pub fn templates_folder(&self) -> PathBuf {
        self.framework_folder.join("templates")
    }

    pub fn addons_folder(&self) -> PathBuf {
        self.framework_folder.join("addons")
    }

    pub fn scripts_folder(&self) -> PathBuf {
        self.framework_folder.join("scripts")
    }

    pub fn setup_marker(&self) -> PathBuf {
        self.framework_folder.join(SETUP_MARKER)
    }

    pub fn cooja_user_properties(&self) -> PathBuf {
        self.home_folder.join(".cooja.user.properties")
    }

    pub fn shell_profile(&self) -> PathBuf {
        self.home_folder.join(".bashrc")
    }

    pub fn experiment_folder(&self, name: &str) -> PathBuf {
        self.experiments_folder.join(name)
    }
}
