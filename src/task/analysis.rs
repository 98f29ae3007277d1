use std::fmt::{self, Write};

use super::Task;

/// One line per task: name, what it does, and what it waits for.
pub fn describe_tasks<A: fmt::Display>(tasks: &[Task<A>]) -> String {
    let width = tasks.iter().map(|t| t.name.len()).max().unwrap_or(0);
    let mut out = String::new();

    for task in tasks {
        let _ = write!(out, "{:width$}  {}", task.name, task.action, width = width);
        if !task.is_leaf() {
            let _ = write!(out, " (after {})", task.dependencies.join(", "));
        }
        out.push('\n');
    }

    out
}

/// Tasks that run to completion before `entry` starts but are not listed
/// as its direct dependencies.
pub fn transitive_only<'a, A>(tasks: &'a [Task<A>], order: &'a [String], entry: &str) -> Vec<&'a str> {
    let direct: Vec<&str> = tasks
        .iter()
        .find(|t| t.name == entry)
        .map(|t| t.dependencies.iter().map(String::as_str).collect())
        .unwrap_or_default();

    order
        .iter()
        .map(String::as_str)
        .filter(|name| *name != entry && !direct.contains(name))
        .collect()
}
