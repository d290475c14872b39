//! Prerequisite resolution: depth-first topological ordering with cycle and
//! unknown-reference detection.

use std::collections::HashMap;

use super::registry::Orchestrator;
use crate::error::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Resolve the union of the prerequisite closures of `requested` into an
/// execution order in which every task follows all of its prerequisites.
///
/// Prerequisites are visited in declaration order and requested names in the
/// order given, so the result is deterministic. Each task appears once.
///
/// # Errors
///
/// Returns [`TaskError::UnknownTask`] if a requested name or any reachable
/// prerequisite is not registered, or [`TaskError::CyclicDependency`] with
/// the offending path (e.g. `a -> b -> a`).
pub fn resolve(registry: &Orchestrator, requested: &[&str]) -> Result<Vec<String>, TaskError> {
    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut path: Vec<String> = Vec::new();
    let mut order = Vec::new();
    for name in requested {
        visit(registry, name, None, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit(
    registry: &Orchestrator,
    name: &str,
    required_by: Option<&str>,
    marks: &mut HashMap<String, Mark>,
    path: &mut Vec<String>,
    order: &mut Vec<String>,
) -> Result<(), TaskError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => return Err(TaskError::CyclicDependency(cycle_path(path, name))),
        None => {}
    }
    let task = registry.get(name).ok_or_else(|| TaskError::UnknownTask {
        name: name.to_string(),
        required_by: required_by.map(str::to_string),
    })?;

    marks.insert(name.to_string(), Mark::Visiting);
    path.push(name.to_string());
    for prerequisite in task.prerequisites() {
        visit(registry, prerequisite, Some(name), marks, path, order)?;
    }
    path.pop();
    marks.insert(name.to_string(), Mark::Done);
    order.push(name.to_string());
    Ok(())
}

/// Render the cycle closed by revisiting `name`: the tail of `path` starting
/// at `name`, followed by `name` again.
fn cycle_path(path: &[String], name: &str) -> String {
    let start = path.iter().position(|p| p == name).unwrap_or(0);
    let mut cycle: Vec<&str> = path.iter().skip(start).map(String::as_str).collect();
    cycle.push(name);
    cycle.join(" -> ")
}
