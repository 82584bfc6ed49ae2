//! Git and filesystem commands run against a project's checkout

use crate::deploy::command::CommandLine;

/// Branch used when the project names none
pub const DEFAULT_BRANCH: &str = "main";

/// Exits 0 when `name` is a directory of the current one
pub fn directory_exists(name: &str) -> CommandLine {
    CommandLine::new("test").arg("-d").arg(name)
}

pub fn fetch(branch: &str) -> CommandLine {
    CommandLine::new("git").args(["fetch", "origin"]).arg(branch)
}

pub fn reset_hard(branch: &str) -> CommandLine {
    CommandLine::new("git")
        .args(["reset", "--hard"])
        .arg(format!("origin/{}", branch))
}

pub fn clean() -> CommandLine {
    CommandLine::new("git").args(["clean", "-fd"])
}

/// Non-hidden directories at the top of the current one, one `./name` per line
pub fn list_folders() -> CommandLine {
    CommandLine::new("find").args([
        ".", "-mindepth", "1", "-maxdepth", "1", "-type", "d", "!", "-name", ".*",
    ])
}

pub fn remove_directory(name: &str) -> CommandLine {
    CommandLine::new("rm").args(["-rf", "--"]).arg(name)
}

/// Folder names from `list_folders` output, sorted
pub fn parse_folders(output: &str) -> Vec<String> {
    let mut folders: Vec<String> = output
        .lines()
        .map(|line| line.trim().trim_start_matches("./").trim_end_matches('/'))
        .filter(|name| !name.is_empty() && !name.starts_with('.') && !name.contains('/'))
        .map(str::to_string)
        .collect();
    folders.sort();
    folders.dedup();
    folders
}
