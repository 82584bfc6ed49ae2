//! Terraform subcommands run by the orchestrator

use crate::deploy::command::CommandLine;

/// Saved plan file, relative to the workspace
pub const PLAN_FILE: &str = "tfplan";

fn terraform() -> CommandLine {
    CommandLine::new("terraform")
}

pub fn init() -> CommandLine {
    terraform().args(["init", "-input=false", "-no-color"])
}

/// Human-readable plan
pub fn plan() -> CommandLine {
    terraform().args(["plan", "-input=false", "-no-color"])
}

/// Plan saved to `file` for `show -json`
pub fn plan_to_file(file: &str) -> CommandLine {
    terraform()
        .args(["plan", "-input=false", "-no-color"])
        .arg(format!("-out={}", file))
}

pub fn show_json(file: &str) -> CommandLine {
    terraform().args(["show", "-json"]).arg(file)
}

pub fn apply() -> CommandLine {
    terraform().args(["apply", "-auto-approve", "-input=false", "-no-color"])
}

pub fn destroy() -> CommandLine {
    terraform().args(["destroy", "-auto-approve", "-input=false", "-no-color"])
}
