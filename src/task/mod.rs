pub mod analysis;
pub mod dependency;
pub mod graph;
pub mod table;

pub use analysis::{describe_tasks, transitive_only};
pub use graph::{Executor, TaskGraph};
pub use table::{Action, task_table};

/// A named unit of work. `A` describes what running it means; the graph
/// itself only cares about names and dependency edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task<A> {
    pub name: String,
    pub dependencies: Vec<String>,
    pub action: A,
}

impl<A> Task<A> {
    pub fn new(name: &str, dependencies: &[&str], action: A) -> Self {
        Self {
            name: name.to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            action,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.dependencies.is_empty()
    }
}
