use std::collections::{HashMap, HashSet, VecDeque};

use super::Task;
use crate::error::GraphError;

#[derive(Debug, PartialEq, Eq)]
pub struct ExecutionLevel {
    pub level: usize,
    pub task_names: Vec<String>,
}

pub fn validate_tasks<A>(tasks: &[Task<A>]) -> Result<(), GraphError> {
    let mut names: HashSet<&str> = HashSet::new();
    for task in tasks {
        if !names.insert(task.name.as_str()) {
            return Err(GraphError::Duplicate(task.name.clone()));
        }
    }

    for task in tasks {
        for dep in &task.dependencies {
            if dep == &task.name {
                return Err(GraphError::SelfDependency(task.name.clone()));
            }
            if !names.contains(dep.as_str()) {
                return Err(GraphError::Dangling {
                    task: task.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    detect_cycles(tasks)
}

/// Every task reachable from `target` through dependency edges, `target`
/// included. The caller guarantees `target` exists.
pub fn required_tasks<'a, A>(tasks: &'a [Task<A>], target: &'a str) -> HashSet<&'a str> {
    let task_map: HashMap<&str, &Task<A>> = tasks.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut needed = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(target);

    while let Some(current) = queue.pop_front() {
        if !needed.insert(current) {
            continue;
        }

        if let Some(task) = task_map.get(current) {
            for dep in &task.dependencies {
                if !needed.contains(dep.as_str()) {
                    queue.push_back(dep.as_str());
                }
            }
        }
    }

    needed
}

/// Groups `tasks` so that every task sits one level above its deepest
/// dependency. Within a level, declaration order is kept.
pub fn calculate_dependency_levels<'a, A: 'a>(
    tasks: impl IntoIterator<Item = &'a Task<A>>,
) -> Vec<ExecutionLevel> {
    let tasks: Vec<&Task<A>> = tasks.into_iter().collect();
    let task_map: HashMap<&str, &Task<A>> = tasks.iter().map(|t| (t.name.as_str(), *t)).collect();
    let mut levels: HashMap<String, usize> = HashMap::new();

    for task in &tasks {
        calculate_task_level(&task.name, &task_map, &mut levels);
    }

    let mut execution_levels: Vec<ExecutionLevel> = Vec::new();
    for task in &tasks {
        let level = levels[&task.name];
        match execution_levels.iter_mut().find(|el| el.level == level) {
            Some(el) => el.task_names.push(task.name.clone()),
            None => execution_levels.push(ExecutionLevel {
                level,
                task_names: vec![task.name.clone()],
            }),
        }
    }

    execution_levels.sort_by_key(|el| el.level);
    execution_levels
}

fn calculate_task_level<A>(
    task_name: &str,
    task_map: &HashMap<&str, &Task<A>>,
    levels: &mut HashMap<String, usize>,
) -> usize {
    if let Some(&level) = levels.get(task_name) {
        return level;
    }

    let Some(task) = task_map.get(task_name) else {
        levels.insert(task_name.to_string(), 0);
        return 0;
    };

    let level = task
        .dependencies
        .iter()
        .map(|dep| calculate_task_level(dep, task_map, levels) + 1)
        .max()
        .unwrap_or(0);

    levels.insert(task_name.to_string(), level);
    level
}

fn detect_cycles<A>(tasks: &[Task<A>]) -> Result<(), GraphError> {
    let task_map: HashMap<&str, &Task<A>> = tasks.iter().map(|t| (t.name.as_str(), t)).collect();
    let mut finished = HashSet::new();

    for task in tasks {
        let mut path = Vec::new();
        if let Some(cycle) = find_cycle(&task.name, &task_map, &mut finished, &mut path) {
            return Err(GraphError::Cycle(cycle));
        }
    }

    Ok(())
}

fn find_cycle(
    task_name: &str,
    task_map: &HashMap<&str, &Task<impl Sized>>,
    finished: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    if let Some(start) = path.iter().position(|name| name == task_name) {
        let mut cycle = path[start..].to_vec();
        cycle.push(task_name.to_string());
        return Some(cycle);
    }

    if finished.contains(task_name) {
        return None;
    }

    path.push(task_name.to_string());

    if let Some(task) = task_map.get(task_name) {
        for dep in &task.dependencies {
            if let Some(cycle) = find_cycle(dep, task_map, finished, path) {
                return Some(cycle);
            }
        }
    }

    path.pop();
    finished.insert(task_name.to_string());

    None
}
