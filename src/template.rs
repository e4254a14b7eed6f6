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
//! Rendering of the experiment templates.
//!
//! Templates support two constructs:
//!
//! - `{{ name }}` is replaced by the value of the variable `name`.
//! - `{% if name %}...{% else %}...{% endif %}` keeps the first branch if `name` is truthy (not
//!   empty, `false` or `0`), and the (optional) second one otherwise. Blocks cannot be nested.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use rpla_utils::fs_utils::{copy_files, list_files, remove_files};

/// Template context: variable name to value.
pub type Context = BTreeMap<String, String>;

/// Base simulation descriptor, staged twice (with and without the malicious mote).
pub const SIMULATION: &str = "simulation.csc";
pub const SIMULATION_WITH_MALICIOUS: &str = "simulation_with_malicious.csc";
pub const SIMULATION_WITHOUT_MALICIOUS: &str = "simulation_without_malicious.csc";
/// Staged malicious mote source, selected among `motes/malicious-<mtype>.c`.
pub const MALICIOUS_SOURCE: &str = "motes/malicious.c";
/// Template of a campaign manifest, used by `prepare`.
pub const MANIFEST_TEMPLATE: &str = "experiments.json";

lazy_static! {
    static ref IF_BLOCK: Regex = Regex::new(
        r"(?s)\{%\s*if\s+(?P<name>[A-Za-z_]\w*)\s*%\}(?P<then>.*?)(?:\{%\s*else\s*%\}(?P<otherwise>.*?))?\{%\s*endif\s*%\}"
    )
    .unwrap();
    static ref VARIABLE: Regex = Regex::new(r"\{\{\s*(?P<name>[A-Za-z_]\w*)\s*\}\}").unwrap();
    static ref STRAY_TAG: Regex = Regex::new(r"\{%.*?%\}").unwrap();
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unknown variable `{name}` in template {template}")]
    UnknownVariable { name: String, template: String },
    #[error("Unbalanced tag `{tag}` in template {template}")]
    Unbalanced { tag: String, template: String },
}

fn io_err(path: impl AsRef<Path>) -> impl FnOnce(io::Error) -> TemplateError {
    let path = path.as_ref().to_path_buf();
    move |source| TemplateError::Io { path, source }
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "false" | "0")
}

fn lookup<'a>(ctx: &'a Context, caps: &Captures, template: &str) -> Result<&'a str, TemplateError> {
    ctx.get(&caps["name"])
        .map(String::as_str)
        .ok_or_else(|| TemplateError::UnknownVariable {
            name: caps["name"].to_string(),
            template: template.to_string(),
        })
}

/// Render the template `source`. `template` names the template in error messages.
pub fn render(source: &str, ctx: &Context, template: &str) -> Result<String, TemplateError> {
    // conditional blocks first
    let mut branched = String::with_capacity(source.len());
    let mut last = 0;
    for caps in IF_BLOCK.captures_iter(source) {
        let block = caps.get(0).unwrap();
        branched.push_str(&source[last..block.start()]);
        let branch = if is_truthy(lookup(ctx, &caps, template)?) {
            caps.name("then")
        } else {
            caps.name("otherwise")
        };
        branched.push_str(branch.map(|m| m.as_str()).unwrap_or_default());
        last = block.end();
    }
    branched.push_str(&source[last..]);

    if let Some(tag) = STRAY_TAG.find(&branched) {
        return Err(TemplateError::Unbalanced {
            tag: tag.as_str().to_string(),
            template: template.to_string(),
        });
    }

    // then variables
    let mut rendered = String::with_capacity(branched.len());
    let mut last = 0;
    for caps in VARIABLE.captures_iter(&branched) {
        let var = caps.get(0).unwrap();
        rendered.push_str(&branched[last..var.start()]);
        rendered.push_str(lookup(ctx, &caps, template)?);
        last = var.end();
    }
    rendered.push_str(&branched[last..]);
    Ok(rendered)
}

/// Whether a file of the templates folder is rendered into each experiment. Staging sources and
/// the manifest template are not.
pub fn is_rendered(rel: &Path) -> bool {
    if rel == Path::new(SIMULATION) || rel == Path::new(MANIFEST_TEMPLATE) {
        return false;
    }
    let is_variant = rel.parent() == Some(Path::new("motes"))
        && rel
            .file_name()
            .and_then(|f| f.to_str())
            .is_some_and(|f| f.starts_with("malicious-") && f.ends_with(".c"));
    !is_variant
}

/// Render every template of `templates_folder` into `dest`, keeping relative paths. Returns the
/// rendered files, relative to `dest`.
pub fn render_templates(
    templates_folder: &Path,
    dest: &Path,
    ctx: &Context,
) -> Result<Vec<PathBuf>, TemplateError> {
    let files = list_files(templates_folder).map_err(io_err(templates_folder))?;
    let mut rendered = Vec::new();
    for rel in files.into_iter().filter(|rel| is_rendered(rel)) {
        let src = templates_folder.join(&rel);
        let source = fs::read_to_string(&src).map_err(io_err(&src))?;

        let content = if rel == Path::new(SIMULATION_WITH_MALICIOUS) {
            let mut ctx = ctx.clone();
            ctx.insert("with_malicious".to_string(), true.to_string());
            render(&source, &ctx, &rel.to_string_lossy())?
        } else {
            render(&source, ctx, &rel.to_string_lossy())?
        };

        let dst = dest.join(&rel);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        fs::write(&dst, content).map_err(io_err(&dst))?;
        log::trace!("rendered {rel:?} into {dest:?}");
        rendered.push(rel);
    }
    Ok(rendered)
}

/// Files copied into the shared templates folder for the rendering of one experiment. The
/// staged files are removed when the staging is dropped, which brings the templates folder back
/// to its base state.
#[derive(Debug)]
pub struct TemplateStaging {
    templates_folder: PathBuf,
    staged: Vec<&'static str>,
}

impl TemplateStaging {
    /// Stage the malicious mote variant `mtype` and both simulation descriptors.
    pub fn stage(templates_folder: &Path, mtype: &str) -> Result<Self, TemplateError> {
        let mut staging = Self {
            templates_folder: templates_folder.to_path_buf(),
            staged: Vec::new(),
        };
        let variant = format!("motes/malicious-{mtype}.c");
        for (src, dst) in [
            (variant.as_str(), MALICIOUS_SOURCE),
            (SIMULATION, SIMULATION_WITHOUT_MALICIOUS),
            (SIMULATION, SIMULATION_WITH_MALICIOUS),
        ] {
            copy_files(templates_folder, templates_folder, [(src, dst)])
                .map_err(io_err(templates_folder.join(src)))?;
            staging.staged.push(dst);
        }
        Ok(staging)
    }

    /// Remove the staged files, reporting errors.
    pub fn unstage(mut self) -> Result<(), TemplateError> {
        let staged = std::mem::take(&mut self.staged);
        remove_files(&self.templates_folder, staged).map_err(io_err(&self.templates_folder))
    }
}

impl Drop for TemplateStaging {
    fn drop(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        if let Err(e) = remove_files(&self.templates_folder, self.staged.drain(..)) {
            log::error!("Cannot clean the templates folder: {e}");
        }
    }
}
