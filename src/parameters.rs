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
//! Validation of experiment parameters.
//!
//! Parameters come either from a campaign manifest or from `key=value` arguments on the command
//! line, and are collected into a JSON object before being validated here.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::IntoEnumIterator;

use rpla_utils::fs_utils::expand_user;

use crate::topology::Layout;

/// Raw, not yet validated parameters of an experiment.
pub type RawParameters = Map<String, Value>;

pub const MAX_SENSORS: usize = 100;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
/// Mote platforms for which Contiki can build firmwares that Cooja is able to emulate.
pub enum Target {
    Sky,
    #[default]
    Z1,
    Wismote,
}

impl Target {
    /// Cooja mote type class emulating this platform.
    pub fn cooja_mote_type(&self) -> &'static str {
        match self {
            Target::Sky => "org.contikios.cooja.mspmote.SkyMoteType",
            Target::Z1 => "org.contikios.cooja.mspmote.Z1MoteType",
            Target::Wismote => "org.contikios.cooja.mspmote.WismoteMoteType",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid experiment name {0:?}, it must be a single folder name")]
    InvalidName(String),
    #[error("Unknown target {given:?}, expected one of: {available}")]
    UnknownTarget { given: String, available: String },
    #[error("Unknown malicious mote type {given:?}, expected one of: {available}")]
    UnknownMaliciousType { given: String, available: String },
    #[error("Parameter `{key}` must be {expected}, got {value}")]
    InvalidValue {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("Cannot list the malicious mote templates: {0}")]
    Templates(String),
}

/// Validated parameters of a single experiment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameters {
    pub target: Target,
    /// Selects the template `motes/malicious-<mtype>.c`.
    pub mtype: String,
    /// Replacement for Contiki's RPL library, used only for the malicious mote.
    pub ext_lib: Option<PathBuf>,
    pub title: String,
    pub goal: String,
    pub notes: String,
    /// Simulation duration in seconds.
    pub duration: u64,
    /// Number of sensors (excluding the root and the malicious mote).
    pub n: usize,
    /// Transmission range in meters.
    pub tx_range: f64,
    /// Interference range in meters.
    pub int_range: f64,
    /// Side of the square area in which the motes are placed, in meters.
    pub area_side: f64,
    pub debug: bool,
    /// Free-form parameters, passed to the templates as they are.
    pub extra: BTreeMap<String, Value>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            target: Target::default(),
            mtype: "1".to_string(),
            ext_lib: None,
            title: "Default title".to_string(),
            goal: String::new(),
            notes: String::new(),
            duration: 300,
            n: 10,
            tx_range: 50.0,
            int_range: 100.0,
            area_side: 100.0,
            debug: false,
            extra: BTreeMap::new(),
        }
    }
}

const KNOWN_KEYS: [&str; 12] = [
    "target",
    "mtype",
    "ext_lib",
    "title",
    "goal",
    "notes",
    "duration",
    "n",
    "tx_range",
    "int_range",
    "area_side",
    "debug",
];

/// Check that `name` can be used as the folder of an experiment.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(c)), None) if c == name => Ok(()),
        _ => Err(ValidationError::InvalidName(name.to_string())),
    }
}

/// List the available malicious mote variants, i.e., the `<mtype>` of every
/// `motes/malicious-<mtype>.c` in the templates folder.
pub fn malicious_variants(templates_folder: &Path) -> Result<Vec<String>, ValidationError> {
    let pattern = templates_folder.join("motes").join("malicious-*.c");
    let paths = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| ValidationError::Templates(e.to_string()))?;
    Ok(paths
        .filter_map(Result::ok)
        .filter_map(|p| {
            p.file_stem()?
                .to_str()?
                .strip_prefix("malicious-")
                .map(str::to_string)
        })
        .sorted()
        .collect())
}

/// Validate the raw parameters of an experiment, filling in defaults for missing ones.
pub fn validated_parameters(
    raw: &RawParameters,
    templates_folder: &Path,
) -> Result<Parameters, ValidationError> {
    let mut params = Parameters::default();

    if let Some(target) = get_string(raw, "target")? {
        params.target = Target::from_str(&target).map_err(|_| ValidationError::UnknownTarget {
            given: target.clone(),
            available: Target::iter().join(", "),
        })?;
    }

    if let Some(mtype) = get_string(raw, "mtype")? {
        params.mtype = mtype;
    }
    let variants = malicious_variants(templates_folder)?;
    if !variants.contains(&params.mtype) {
        return Err(ValidationError::UnknownMaliciousType {
            given: params.mtype,
            available: variants.join(", "),
        });
    }

    params.ext_lib = get_string(raw, "ext_lib")?.map(expand_user);
    if let Some(title) = get_string(raw, "title")? {
        params.title = title;
    }
    if let Some(goal) = get_string(raw, "goal")? {
        params.goal = goal;
    }
    if let Some(notes) = get_string(raw, "notes")? {
        params.notes = notes;
    }
    if let Some(debug) = get_bool(raw, "debug")? {
        params.debug = debug;
    }

    if let Some(duration) = get_number::<u64>(raw, "duration", "a positive integer")? {
        // the simulation script counts in milliseconds
        if duration == 0 || duration.checked_mul(1000).is_none() {
            return Err(invalid("duration", "a positive integer", &raw["duration"]));
        }
        params.duration = duration;
    }
    if let Some(n) = get_number::<usize>(raw, "n", "a number of sensors between 1 and 100")? {
        if !(1..=MAX_SENSORS).contains(&n) {
            return Err(invalid("n", "a number of sensors between 1 and 100", &raw["n"]));
        }
        params.n = n;
    }
    if let Some(tx_range) = get_finite(raw, "tx_range", "a positive range")? {
        if tx_range <= 0.0 {
            return Err(invalid("tx_range", "a positive range", &raw["tx_range"]));
        }
        params.tx_range = tx_range;
    }
    if let Some(int_range) = get_finite(raw, "int_range", "a positive range")? {
        params.int_range = int_range;
    }
    if params.int_range < params.tx_range {
        return Err(ValidationError::InvalidValue {
            key: "int_range",
            expected: "at least as large as `tx_range`",
            value: params.int_range.to_string(),
        });
    }
    if let Some(area_side) = get_finite(raw, "area_side", "a positive length")? {
        if area_side <= 0.0 {
            return Err(invalid("area_side", "a positive length", &raw["area_side"]));
        }
        params.area_side = area_side;
    }

    params.extra = raw
        .iter()
        .filter(|(k, _)| !KNOWN_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(params)
}

impl Parameters {
    /// Variables available to the templates of an experiment. `with_malicious` is `false`; it is
    /// only enabled for the simulation including the malicious mote.
    pub fn context(&self) -> BTreeMap<String, String> {
        let layout = Layout::grid(self.n, self.tx_range, self.area_side);
        let mut ctx: BTreeMap<String, String> = self
            .extra
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => (k.clone(), s.clone()),
                v => (k.clone(), v.to_string()),
            })
            .collect();
        let mut set = |k: &str, v: String| {
            ctx.insert(k.to_string(), v);
        };
        set("target", self.target.to_string());
        set("mote_type", self.target.cooja_mote_type().to_string());
        set("mtype", self.mtype.clone());
        set(
            "ext_lib",
            self.ext_lib
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        );
        set("title", self.title.clone());
        set("goal", self.goal.clone());
        set("notes", self.notes.clone());
        set("duration", self.duration.to_string());
        set("duration_ms", self.duration.saturating_mul(1000).to_string());
        set("n", self.n.to_string());
        set("n_motes", (self.n + 1).to_string());
        set("malicious_id", layout.malicious.id.to_string());
        set("tx_range", self.tx_range.to_string());
        set("int_range", self.int_range.to_string());
        set("area_side", self.area_side.to_string());
        set("debug", self.debug.to_string());
        set("with_malicious", false.to_string());
        set("root_mote", layout.root.to_xml("root"));
        set(
            "sensor_motes",
            layout.sensors.iter().map(|m| m.to_xml("sensor")).join("\n"),
        );
        set("malicious_mote", layout.malicious.to_xml("malicious"));
        ctx
    }
}

fn invalid(key: &'static str, expected: &'static str, value: &Value) -> ValidationError {
    ValidationError::InvalidValue {
        key,
        expected,
        value: value.to_string(),
    }
}

/// Strings are taken as they are, numbers and booleans are converted to their textual form.
fn get_string(raw: &RawParameters, key: &'static str) -> Result<Option<String>, ValidationError> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(v.to_string())),
        Some(v) => Err(invalid(key, "a string", v)),
    }
}

/// Numbers may be given either as JSON numbers or as numeric strings.
fn get_number<T: FromStr>(
    raw: &RawParameters,
    key: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ValidationError> {
    let text = match raw.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(v) => return Err(invalid(key, expected, v)),
    };
    text.parse()
        .map(Some)
        .map_err(|_| invalid(key, expected, &raw[key]))
}

/// Like [`get_number`], but rejects `NaN` and infinite values.
fn get_finite(
    raw: &RawParameters,
    key: &'static str,
    expected: &'static str,
) -> Result<Option<f64>, ValidationError> {
    match get_number::<f64>(raw, key, expected)? {
        Some(v) if !v.is_finite() => Err(invalid(key, expected, &raw[key])),
        v => Ok(v),
    }
}

fn get_bool(raw: &RawParameters, key: &'static str) -> Result<Option<bool>, ValidationError> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(v @ Value::String(s)) => match s.to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            _ => Err(invalid(key, "a boolean", v)),
        },
        Some(v @ Value::Number(n)) => match n.as_u64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(invalid(key, "a boolean", v)),
        },
        Some(v) => Err(invalid(key, "a boolean", v)),
    }
}
