//! Terraform output parsing
//!
//! Scrapes the one-line summary Terraform prints at the end of plan, apply
//! and destroy. A miss is absence of data, not an error.

use std::sync::LazyLock;

use openapi_server::models::TerraformSummary;
use regex::Regex;

static PLAN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Plan:\s+(\d+)\s+to add,\s+(\d+)\s+to change,\s+(\d+)\s+to destroy")
        .expect("plan regex is valid")
});

static APPLY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Apply complete! Resources:\s+(\d+)\s+added,\s+(\d+)\s+changed,\s+(\d+)\s+destroyed")
        .expect("apply regex is valid")
});

static DESTROY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Destroy complete! Resources:\s+(\d+)\s+destroyed").expect("destroy regex is valid")
});

/// Parse the first summary line found scanning top-down.
///
/// On a single line the plan shape is tried first, then apply, then destroy.
pub fn parse_summary(stdout: &str) -> Option<TerraformSummary> {
    stdout.lines().find_map(parse_line)
}

fn parse_line(line: &str) -> Option<TerraformSummary> {
    if let Some(caps) = PLAN_REGEX.captures(line) {
        return Some(TerraformSummary::Plan {
            to_add: count(&caps, 1)?,
            to_change: count(&caps, 2)?,
            to_destroy: count(&caps, 3)?,
        });
    }

    if let Some(caps) = APPLY_REGEX.captures(line) {
        return Some(TerraformSummary::Apply {
            added: count(&caps, 1)?,
            changed: count(&caps, 2)?,
            destroyed: count(&caps, 3)?,
        });
    }

    if let Some(caps) = DESTROY_REGEX.captures(line) {
        return Some(TerraformSummary::Destroy {
            destroyed: count(&caps, 1)?,
        });
    }

    None
}

fn count(caps: &regex::Captures<'_>, index: usize) -> Option<u64> {
    caps.get(index)?.as_str().parse().ok()
}
